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

use tracing::{debug, warn};
use crate::protocol::{HEADER_LEN, MAX_PAYLOAD_LEN};
use crate::serial::SerialPort;

/// Header written once, ahead of the first payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHeader {
    pub item_id: u8,
    pub length: u32,
}

impl TransferHeader {
    /// Lengths above 24 bits are truncated; callers validate the payload size first.
    pub fn new(item_id: u8, length: usize) -> Self {
        if length > MAX_PAYLOAD_LEN {
            warn!("length {} does not fit in 24 bits, header will be truncated", length);
        }

        TransferHeader {
            item_id,
            length: (length & MAX_PAYLOAD_LEN) as u32,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let [_, hi, mid, lo] = self.length.to_be_bytes();
        [self.item_id, hi, mid, lo]
    }
}

pub fn send_header(serial: &mut dyn SerialPort, header: &TransferHeader) -> std::io::Result<()> {
    let bytes = header.encode();
    serial.write_all(&bytes)?;
    serial.drain()?;
    debug!("Sent header: {:02X?}", bytes);
    Ok(())
}
