// tools/canbits_cli/main.rs
//
// Command-line front end for the canbits codec.
//
//   canbits_cli decode frames.txt
//   canbits_cli decode --json < frames.txt
//   canbits_cli encode --id 0x123 0xAB 0xCD
//   canbits_cli encode --id 0x1ABCDEF --rtr --glossary

use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use canbits::frame::{MAX_DATA_LEN, MAX_EXTENDED_ID};
use canbits::glossary::field_glossary;
use canbits::{decode_stream, encode_message, logging, CodecConfig, CodecError, LogicalMessage};

/// Bit-level CAN 2.0 A/B frame codec
#[derive(Parser)]
#[command(name = "canbits_cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user canbits.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log decoder activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write the log to a timestamped file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a text stream of frame bits
    Decode {
        /// Input file; stdin when omitted or "-"
        file: Option<PathBuf>,

        /// Print the frame reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Encode a message into its stuffed bit string
    Encode {
        /// Identifier, decimal or 0x hex (0 to 0x1FFFFFFF)
        #[arg(long, value_parser = parse_identifier)]
        id: u32,

        /// Send a remote request (no data)
        #[arg(long)]
        rtr: bool,

        /// Use 29-bit framing even for identifiers that fit in 11 bits
        #[arg(long)]
        extended: bool,

        /// Append a description of each frame field
        #[arg(long)]
        glossary: bool,

        /// Data bytes, decimal or 0x hex (at most 8)
        #[arg(value_parser = parse_byte)]
        data: Vec<u8>,
    },
}

/// Parse `123` or `0x7b`.
fn parse_number(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed.map_err(|_| format!("'{}' is not a decimal or 0x hexadecimal number", text))
}

fn parse_identifier(text: &str) -> Result<u32, String> {
    let value = parse_number(text)?;
    if value > MAX_EXTENDED_ID as u64 {
        return Err(format!(
            "identifier {} is out of range (maximum 0x{:x})",
            text, MAX_EXTENDED_ID
        ));
    }
    Ok(value as u32)
}

fn parse_byte(text: &str) -> Result<u8, String> {
    let value = parse_number(text)?;
    u8::try_from(value).map_err(|_| format!("data byte {} is out of range (0-255)", text))
}

fn load_config(path: Option<&Path>) -> Result<CodecConfig, CodecError> {
    match path {
        Some(path) => CodecConfig::load(path),
        None => CodecConfig::load_or_default(),
    }
}

fn read_input(file: Option<&Path>) -> Result<String, CodecError> {
    match file {
        Some(path) if path != Path::new("-") => Ok(std::fs::read_to_string(path)?),
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn run(cli: Cli) -> Result<(), CodecError> {
    logging::set_enabled(cli.verbose);
    if let Some(dir) = &cli.log_dir {
        logging::init_file_logging(dir)?;
    }
    let result = execute(cli.command, cli.config.as_deref());
    logging::stop_file_logging();
    result
}

fn execute(command: Commands, config_path: Option<&Path>) -> Result<(), CodecError> {
    let config = load_config(config_path)?;

    match command {
        Commands::Decode { file, json } => {
            let text = read_input(file.as_deref())?;
            let reports = decode_stream(&text, &config);
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else if reports.is_empty() {
                println!("No frames found");
            } else {
                for report in &reports {
                    println!("{}\n", report);
                }
            }
        }
        Commands::Encode {
            id,
            rtr,
            extended,
            glossary,
            data,
        } => {
            let msg = build_message(id, rtr, extended, data)?;
            let frame = encode_message(&msg, &config)?;
            println!("{}", frame);
            if glossary {
                println!("\n{}", field_glossary(msg.is_extended, config.stuff_trigger));
            }
        }
    }
    Ok(())
}

/// Message for the `encode` command. Data on a remote request is an error
/// here rather than being dropped.
fn build_message(
    id: u32,
    rtr: bool,
    extended: bool,
    data: Vec<u8>,
) -> Result<LogicalMessage, CodecError> {
    if data.len() > MAX_DATA_LEN {
        return Err(CodecError::TooMuchData(data.len()));
    }
    if rtr && !data.is_empty() {
        return Err(CodecError::RemoteRequestWithData(data.len()));
    }
    if extended {
        LogicalMessage::extended(id, rtr, data)
    } else {
        LogicalMessage::new(id, rtr, data)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_forms() {
        assert_eq!(parse_number("123"), Ok(123));
        assert_eq!(parse_number("0x7b"), Ok(123));
        assert_eq!(parse_number("0X7B"), Ok(123));
        assert!(parse_number("7b").is_err());
        assert!(parse_byte("0x100").is_err());
        assert!(parse_identifier("0x20000000").is_err());
    }

    #[test]
    fn test_remote_request_with_data_is_rejected() {
        let err = build_message(0x123, true, false, vec![0xAB]).unwrap_err();
        assert!(matches!(err, CodecError::RemoteRequestWithData(1)));
        assert!(err.is_input_error());

        let msg = build_message(0x123, true, false, vec![]).unwrap();
        assert!(msg.is_remote_request);
    }

    #[test]
    fn test_extended_flag_forces_extended_framing() {
        let msg = build_message(0x12, false, true, vec![1, 2]).unwrap();
        assert!(msg.is_extended);
        assert_eq!(msg.data, vec![1, 2]);
        assert!(matches!(
            build_message(0x12, false, false, vec![0; 9]),
            Err(CodecError::TooMuchData(9))
        ));
    }
}
