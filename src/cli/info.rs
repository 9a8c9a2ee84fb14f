use anyhow::Result;
use indicatif::MultiProgress;

use audioinfo::process::frames::FrameParser;
use audioinfo::process::pages::PageDemuxer;
use audioinfo::structs::page::CAPTURE_PATTERN;
use audioinfo::utils::errors::AudioFormat;

use super::command::{Cli, InfoArgs, InputFormat, OutputFormat};
use super::report::{InfoReport, MpegReport, OggReport, display_issues, print_yaml};
use super::streams::{display_stream, kbps};
use super::{fail_level, row, spinner, tracked};
use crate::input::InputReader;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let mut failed = 0;

    for path in &args.inputs {
        let result = InputReader::new(path).and_then(|input| inspect(input, args, cli, multi));

        match result {
            Ok(report) => match args.output {
                OutputFormat::Text => display_report(&report),
                OutputFormat::Yaml => print_yaml(&report)?,
            },
            Err(e) if cli.strict => return Err(e),
            Err(e) => {
                log::error!("{e:#}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!(
            "{failed} of {} inputs could not be inspected",
            args.inputs.len()
        );
    }

    Ok(())
}

/// Picks the container from the first bytes. Anything that is not Ogg goes to
/// the frame scanner, which tolerates tags and leading garbage.
fn detect_format(prefix: &[u8]) -> AudioFormat {
    if prefix.starts_with(CAPTURE_PATTERN) {
        AudioFormat::Ogg
    } else {
        AudioFormat::Mpeg
    }
}

fn inspect(
    mut input: InputReader,
    args: &InfoArgs,
    cli: &Cli,
    multi: Option<&MultiProgress>,
) -> Result<InfoReport> {
    let format = match args.format {
        InputFormat::Auto => detect_format(&input.sniff(CAPTURE_PATTERN.len())?),
        InputFormat::Mpeg => AudioFormat::Mpeg,
        InputFormat::Ogg => AudioFormat::Ogg,
    };

    let name = input.name().to_string();
    log::info!("Analyzing {format} stream: {name}");
    if input.is_pipe() {
        log::debug!("Reading {name} sequentially from a pipe");
    }

    let pb = spinner(multi, &name)?;
    let source = tracked(input, pb.as_ref());

    let result = match format {
        AudioFormat::Mpeg => {
            let mut parser = FrameParser::default();
            parser.set_fail_level(fail_level(cli));
            parser
                .parse(source, &name)
                .map(|info| InfoReport::Mpeg(MpegReport::from(&info)))
        }
        AudioFormat::Ogg => {
            let mut demuxer = PageDemuxer::default();
            demuxer.set_fail_level(fail_level(cli));
            demuxer.set_verify_checksums(!args.no_verify_checksums);
            demuxer
                .parse(source, &name)
                .map(|stream| InfoReport::Ogg(OggReport::new(&name, &stream)))
        }
    };

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    Ok(result?)
}

fn display_report(report: &InfoReport) {
    match report {
        InfoReport::Mpeg(report) => display_mpeg(report),
        InfoReport::Ogg(report) => {
            println!();
            println!("Ogg Stream Information");
            println!("======================");
            println!();
            row("Name", &report.name);
            println!();
            display_stream(&report.stream);
        }
    }
}

fn display_mpeg(report: &MpegReport) {
    println!();
    println!("MPEG Audio Information");
    println!("======================");
    println!();

    println!("Stream Information");
    row("Name", &report.name);
    row("Version", &report.version);
    row("Layer", &report.layer);
    row("Channel mode", &report.channel_mode);
    row("Channels", report.channels);
    row("Sampling rate", format!("{} Hz", report.sample_rate));
    for tag in &report.id3v2 {
        row("Leading tag", tag);
    }
    if let Some(tag) = &report.trailing_tag {
        row("Trailing tag", tag);
    }
    println!();

    println!("Analysis Summary");
    row("Frames processed", report.frames);
    row("Samples", report.samples);
    row("Duration", &report.duration);
    if let Some(bitrate) = report.average_bitrate {
        row("Average bit rate", kbps(bitrate));
    }
    row("Complete", !report.incomplete);
    println!();

    println!("Issues");
    display_issues(&report.issues);
    println!();
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use clap::Parser as ClapParser;

    use super::*;
    use crate::cli::command::Commands;

    /// MPEG-1 Layer III, 128 kbps, 44.1 kHz, no padding.
    fn mpeg_frames(count: usize) -> Vec<u8> {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        frame.repeat(count)
    }

    fn info_cli(extra: &[&str]) -> Cli {
        let mut argv = vec!["audioinfo", "info", "mem"];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).unwrap()
    }

    fn info_args(cli: &Cli) -> &InfoArgs {
        match &cli.command {
            Commands::Info(args) => args,
            _ => panic!("expected info"),
        }
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(b"OggS"), AudioFormat::Ogg);
        assert_eq!(detect_format(b"ID3\x04"), AudioFormat::Mpeg);
        assert_eq!(detect_format(&[0xFF, 0xFB, 0x90, 0x00]), AudioFormat::Mpeg);
        assert_eq!(detect_format(b""), AudioFormat::Mpeg);
    }

    #[test]
    fn test_inspect_mpeg() -> Result<()> {
        let cli = info_cli(&[]);
        let input = InputReader::from_reader(Cursor::new(mpeg_frames(3)), "mem");

        let InfoReport::Mpeg(report) = inspect(input, info_args(&cli), &cli, None)? else {
            panic!("expected an MPEG report");
        };
        assert_eq!(report.name, "mem");
        assert_eq!(report.frames, 3);
        assert_eq!(report.samples, 3456);
        assert_eq!(report.duration, "00:00:00.078");
        assert_eq!(report.sample_rate, 44100);
        assert!(!report.incomplete);
        assert!(report.issues.is_empty());
        Ok(())
    }

    #[test]
    fn test_inspect_truncated_strict() {
        let mut bytes = mpeg_frames(3);
        bytes.truncate(1000);

        let lenient = info_cli(&[]);
        let input = InputReader::from_reader(Cursor::new(bytes.clone()), "mem");
        let report = inspect(input, info_args(&lenient), &lenient, None).unwrap();
        let InfoReport::Mpeg(report) = report else {
            panic!("expected an MPEG report");
        };
        assert!(report.incomplete);
        assert_eq!(report.frames, 2);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, "EOF");

        let strict = Cli::try_parse_from(["audioinfo", "--strict", "info", "mem"]).unwrap();
        let input = InputReader::from_reader(Cursor::new(bytes), "mem");
        assert!(inspect(input, info_args(&strict), &strict, None).is_err());
    }

    #[test]
    fn test_forced_format() {
        let cli = info_cli(&["--format", "ogg"]);
        let input = InputReader::from_reader(Cursor::new(mpeg_frames(3)), "mem");

        let err = inspect(input, info_args(&cli), &cli, None).unwrap_err();
        assert!(err.to_string().contains("Ogg"));
    }
}
