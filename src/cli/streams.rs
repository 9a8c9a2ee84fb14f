use anyhow::Result;
use indicatif::MultiProgress;

use audioinfo::process::pages::PageDemuxer;
use audioinfo::structs::page::CAPTURE_PATTERN;

use super::command::{Cli, OutputFormat, StreamsArgs};
use super::report::{StreamReport, StreamSetReport, display_issues, print_yaml};
use super::{fail_level, row, spinner, tracked};
use crate::input::InputReader;

pub fn cmd_streams(args: &StreamsArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let input = InputReader::new(&args.input)?;
    let report = list_streams(input, args, cli, multi)?;

    match args.output {
        OutputFormat::Text => display_stream_set(&report),
        OutputFormat::Yaml => print_yaml(&report)?,
    }

    Ok(())
}

fn list_streams(
    mut input: InputReader,
    args: &StreamsArgs,
    cli: &Cli,
    multi: Option<&MultiProgress>,
) -> Result<StreamSetReport> {
    let name = input.name().to_string();
    log::info!("Listing Ogg streams: {name}");

    if input.sniff(CAPTURE_PATTERN.len())? != CAPTURE_PATTERN {
        log::warn!("{name} does not start with an Ogg page");
    }

    let mut demuxer = PageDemuxer::default();
    demuxer.set_fail_level(fail_level(cli));
    demuxer.set_verify_checksums(!args.no_verify_checksums);

    let pb = spinner(multi, &name)?;
    let result = demuxer.parse_streams(tracked(input, pb.as_ref()), &name);
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let set = result?;
    log::info!(
        "{name}: {} logical streams in {} pages",
        set.len(),
        set.pages
    );

    Ok(StreamSetReport::from(&set))
}

fn display_stream_set(report: &StreamSetReport) {
    println!();
    println!("Ogg Stream Information");
    println!("======================");
    println!();

    println!("Physical Stream");
    row("Name", &report.name);
    row("Pages", report.pages);
    row("Logical streams", report.streams.len());
    row("Complete", !report.incomplete);
    println!();

    for stream in &report.streams {
        display_stream(stream);
    }

    println!("Unattributed Issues");
    display_issues(&report.issues);
    println!();
}

pub(super) fn display_stream(stream: &StreamReport) {
    println!("Stream {:#010X}", stream.serial);
    row("Codec", stream.codec);
    if let Some(vendor) = &stream.vendor {
        row("Vendor", vendor);
    }
    row("Channels", stream.channels);
    row("Sampling rate", format!("{} Hz", stream.sample_rate));
    if let Some(bitrate) = stream.nominal_bitrate {
        row("Nominal bit rate", kbps(bitrate));
    }
    row("Pages", stream.pages);
    row("Payload", format!("{} bytes", stream.payload_bytes));
    if let Some(duration) = &stream.duration {
        row("Duration", duration);
    }
    if let Some(duration) = &stream.payload_duration {
        row("Duration (bit count)", duration);
    }
    if let Some(bitrate) = stream.average_bitrate {
        row("Average bit rate", kbps(bitrate));
    }
    row("End of stream", stream.closed);
    row("Complete", !stream.incomplete);
    println!();

    println!("  Issues");
    display_issues(&stream.issues);
    println!();
}

pub(super) fn kbps(bits_per_second: u32) -> String {
    format!("{:.1} kbps", bits_per_second as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use clap::Parser as ClapParser;

    use super::*;
    use crate::cli::command::Commands;

    #[test]
    fn test_not_ogg() {
        let cli = Cli::try_parse_from(["audioinfo", "streams", "mem"]).unwrap();
        let Commands::Streams(ref args) = cli.command else {
            panic!("expected streams");
        };

        let input = InputReader::from_reader(Cursor::new(vec![0u8; 64]), "mem");
        let err = list_streams(input, args, &cli, None).unwrap_err();
        assert!(err.to_string().contains("could not find a single page"));
    }

    #[test]
    fn test_kbps() {
        assert_eq!(kbps(128_000), "128.0 kbps");
        assert_eq!(kbps(96_500), "96.5 kbps");
    }
}
