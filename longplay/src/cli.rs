use std::path::PathBuf;

use clap::{builder::ValueParser, value_parser, Arg, ArgAction, Command};
use longplay_core::request::{DEFAULT_OUTPUT, DEFAULT_PROMPT};

/// Parse a human-friendly duration string into whole seconds.
///
/// Supported suffixes are `s` (seconds), `m` (minutes), and `h` (hours), and
/// components may be chained, such as `"3m45s"` or `"1h15m"`. A bare number
/// is read as seconds. The total must be greater than zero and fit in `u32`.
pub fn parse_duration_secs(value: &str) -> Result<u32, String> {
    let input = value.trim();
    if input.is_empty() {
        return Err("duration cannot be empty".into());
    }

    if input.bytes().all(|b| b.is_ascii_digit()) {
        let secs: u64 = input.parse().map_err(|_| "duration is too large".to_owned())?;
        return finish(secs);
    }

    let mut total_secs: u64 = 0;
    let mut index = 0;
    let bytes = input.as_bytes();
    let len = bytes.len();
    let invalid = || format!("invalid duration '{value}'");

    while index < len {
        let start = index;
        while index < len && bytes[index].is_ascii_digit() {
            index += 1;
        }

        if start == index {
            return Err(invalid());
        }

        let number = input[start..index].parse::<u64>().map_err(|_| invalid())?;

        if index >= len {
            return Err(invalid());
        }

        let factor = match bytes[index] {
            b's' => 1u64,
            b'm' => 60,
            b'h' => 3_600,
            _ => return Err(invalid()),
        };
        index += 1;

        let component = number
            .checked_mul(factor)
            .ok_or_else(|| "duration is too large".to_owned())?;
        total_secs = total_secs
            .checked_add(component)
            .ok_or_else(|| "duration is too large".to_owned())?;
    }

    finish(total_secs)
}

fn finish(total_secs: u64) -> Result<u32, String> {
    if total_secs == 0 {
        return Err("duration must be greater than zero".into());
    }
    u32::try_from(total_secs).map_err(|_| "duration is too large".to_owned())
}

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .about("Generate long-form music by stitching segmented MusicGen inference")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("prompt")
                .value_name("PROMPT")
                .help("Text description of the music to generate")
                .default_value(DEFAULT_PROMPT),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("DURATION")
                .help("Total track length (e.g. 225, 3m45s)")
                .default_value("3m45s")
                .value_parser(ValueParser::new(parse_duration_secs)),
        )
        .arg(
            Arg::new("segment")
                .short('s')
                .long("segment")
                .value_name("DURATION")
                .help("Length of each generated segment; values above 29s fall back to 28s")
                .default_value("28s")
                .value_parser(ValueParser::new(parse_duration_secs)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Path of the WAV file to write")
                .default_value(DEFAULT_OUTPUT)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("model-dir")
                .short('m')
                .long("model-dir")
                .value_name("DIR")
                .help("Directory holding the MusicGen ONNX export (remembered for later runs)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .help("Fix the sampling seed for reproducible output")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Print the segmentation plan without loading any model")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("inspect")
                .long("inspect")
                .help("List each ONNX graph's inputs and outputs, then exit")
                .action(ArgAction::SetTrue),
        )
}
