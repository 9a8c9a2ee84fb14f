use std::time::Duration;

/// Formats exactly, without going through floating point.
pub fn duration_str(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;

    format!(
        "{hours:0width$}:{:02}:{:02}.{:03}",
        (secs % 3600) / 60,
        secs % 60,
        duration.subsec_millis(),
        width = if hours >= 100 { 0 } else { 2 }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_str() {
        assert_eq!(
            duration_str(Duration::from_nanos(261_224_490)),
            "00:00:00.261"
        );
        assert_eq!(
            duration_str(Duration::from_millis(3_723_500)),
            "01:02:03.500"
        );
        assert_eq!(
            duration_str(Duration::from_secs(360_000)),
            "100:00:00.000"
        );
    }
}
