// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

// Pacelink: stream a file to a small receiver over serial with receiver-driven pause/resume
mod config;
mod flow;
mod header;
mod protocol;
mod serial;
mod streamer;
mod transfer;

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use serial::RealSerialPort;
use transfer::{TransferFsm, TransferOptions};

#[derive(Parser)]
#[command(name = "pacelink")]
#[command(about = "Send a file to a serial receiver that paces the transfer", long_about = None)]
struct Cli {
    /// File to send
    file: PathBuf,

    /// Item identifier; its first byte is sent in the header
    item_id: String,

    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = protocol::DEFAULT_BAUD)]
    baud: u32,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, default_value = "8", value_name = "BITS")]
    data_bits: u8,

    /// Parity (none, odd, or even)
    #[arg(long, default_value = "none")]
    parity: String,

    /// Stop bits (1 or 2)
    #[arg(long, default_value = "1", value_name = "BITS")]
    stop_bits: u8,

    /// Milliseconds to wait after opening the port; the receiver resets on open
    #[arg(long, value_name = "MS", default_value_t = protocol::DEFAULT_SETTLE.as_millis() as u64)]
    settle_ms: u64,

    /// Milliseconds of inbound silence after the last send before exiting
    #[arg(long, value_name = "MS", default_value_t = protocol::DEFAULT_LINGER.as_millis() as u64)]
    linger_ms: u64,

    /// Enable debug output
    #[arg(long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { LevelFilter::DEBUG } else { LevelFilter::INFO })
        .with_target(false)
        .init();

    let data_bits = match config::parse_data_bits(cli.data_bits) {
        Ok(db) => db,
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let parity = match config::parse_parity(&cli.parity) {
        Ok(p) => p,
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let stop_bits = match config::parse_stop_bits(cli.stop_bits) {
        Ok(sb) => sb,
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let item_id = match config::item_id_byte(&cli.item_id) {
        Ok(id) => id,
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let payload = match config::load_payload(&cli.file) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Opening serial port: {}", cli.port);
    info!("Settings: {} baud, {:?}, {:?}, {:?}", cli.baud, data_bits, parity, stop_bits);

    let serial_port = match RealSerialPort::open(&cli.port, cli.baud, data_bits, parity, stop_bits) {
        Ok(port) => port,
        Err(e) => {
            error!("Failed to open serial port: {}", e);
            std::process::exit(1);
        }
    };

    let options = TransferOptions {
        settle: Duration::from_millis(cli.settle_ms),
        linger: Duration::from_millis(cli.linger_ms),
    };

    info!("Sending file: {}", cli.file.display());
    let fsm = TransferFsm::new(Box::new(serial_port), payload, item_id, options);
    if let Err(e) = transfer::run_transfer(fsm) {
        error!("Send failed: {}", e);
        std::process::exit(1);
    }
    info!("Transfer finished");
}
