//! Card Protocol CLI Example
//!
//! Sends raw extended-length APDUs to a card through the native PC/SC
//! transport.
//!
//! # Prerequisites
//!
//! - A reader with an extended-length capable card (e.g. a Pico FIDO key)
//! - PC/SC daemon running (built-in on macOS/Windows, `pcscd` on Linux)
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `list [filter]` | List readers, optionally filtered by name |
//! | `select` | SELECT the FIDO applet |
//! | `apdu <header> <p1> <p2> [data]` | Send an APDU; `header` is `INS` or `CLA INS` in hex |
//!
//! # Examples
//!
//! ```bash
//! cargo run --example card-cli --features pcsc -- list
//! cargo run --example card-cli --features pcsc -- select
//! cargo run --example card-cli --features pcsc -- apdu 8010 00 00
//! ```

#![expect(unused_crate_dependencies, reason = "needed for CLI example")]

use std::env;

use card_protocol_core::card::{ApduChannel, Command, PcscTransport};
use card_protocol_core::{Error, Result};

/// FIDO applet AID.
const FIDO_AID: [u8; 8] = [0xA0, 0x00, 0x00, 0x06, 0x47, 0x2F, 0x00, 0x01];

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return;
    }

    let result = match args[1].as_str() {
        "list" => cmd_list(args.get(2).map(String::as_str)),
        "select" => cmd_select(),
        "apdu" => cmd_apdu(&args[2..]),
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_help();
            Ok(())
        }
    };

    if let Err(e) = result {
        match e.status_word() {
            Some(sw) => eprintln!("Card returned {sw}"),
            None => eprintln!("Error: {e}"),
        }
    }
}

fn print_help() {
    println!(
        r"Card Protocol CLI

USAGE:
    card-cli <COMMAND>

COMMANDS:
    list [filter]                 List smart card readers
    select                        Select the FIDO applet
    apdu <header> <p1> <p2> [data]  Send an APDU (hex arguments)
    help                          Show this help message
"
    );
}

fn cmd_list(filter: Option<&str>) -> Result<()> {
    let readers = PcscTransport::list_readers(filter)?;

    if readers.is_empty() {
        println!("No readers found.");
    } else {
        for (i, reader) in readers.iter().enumerate() {
            println!("  [{}] {}", i + 1, reader);
        }
    }
    Ok(())
}

fn cmd_select() -> Result<()> {
    let mut transport = PcscTransport::connect(None)?;
    println!("Reader: {}", transport.reader());

    let command = Command::new(0xA4, 0x04, 0x00).with_data(FIDO_AID);
    let response = ApduChannel::new().send(&mut transport, &command)?;

    println!("Applet version: {}", String::from_utf8_lossy(&response));
    Ok(())
}

fn cmd_apdu(args: &[String]) -> Result<()> {
    let [header, p1, p2, rest @ ..] = args else {
        return Err(Error::InvalidCommand(
            "usage: apdu <header> <p1> <p2> [data]".to_string(),
        ));
    };

    let mut command = Command::prefixed(parse_hex(header)?, parse_byte(p1)?, parse_byte(p2)?);
    if let Some(data) = rest.first() {
        command = command.with_data(parse_hex(data)?);
    }

    let mut transport = PcscTransport::connect(None)?;
    let response = ApduChannel::new().send(&mut transport, &command)?;

    println!("{}", hex::encode(response));
    Ok(())
}

fn parse_hex(arg: &str) -> Result<Vec<u8>> {
    hex::decode(arg.trim_start_matches("0x"))
        .map_err(|e| Error::InvalidCommand(format!("bad hex {arg:?}: {e}")))
}

fn parse_byte(arg: &str) -> Result<u8> {
    match parse_hex(arg)?.as_slice() {
        [b] => Ok(*b),
        _ => Err(Error::InvalidCommand(format!("expected one byte, got {arg:?}"))),
    }
}
