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

use std::path::{Path, PathBuf};
use serialport::{DataBits, Parity, StopBits};
use thiserror::Error;
use crate::protocol::MAX_PAYLOAD_LEN;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Item id must not be empty")]
    EmptyItemId,

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error("File is {len} bytes; the header can describe at most {max}", max = MAX_PAYLOAD_LEN)]
    PayloadTooLarge { len: usize },

    #[error("Invalid data bits: {0}. Must be 5, 6, 7, or 8")]
    DataBits(u8),

    #[error("Invalid parity: {0}. Must be 'none', 'odd', or 'even'")]
    Parity(String),

    #[error("Invalid stop bits: {0}. Must be 1 or 2")]
    StopBits(u8),
}

pub fn parse_data_bits(bits: u8) -> Result<DataBits, ConfigError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(ConfigError::DataBits(bits)),
    }
}

pub fn parse_parity(parity: &str) -> Result<Parity, ConfigError> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(ConfigError::Parity(parity.to_string())),
    }
}

pub fn parse_stop_bits(bits: u8) -> Result<StopBits, ConfigError> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(ConfigError::StopBits(bits)),
    }
}

/// The header carries only the first byte of the item id
pub fn item_id_byte(item_id: &str) -> Result<u8, ConfigError> {
    item_id.bytes().next().ok_or(ConfigError::EmptyItemId)
}

/// Read the whole file up front so nothing touches the port if it is unusable
pub fn load_payload(path: &Path) -> Result<Vec<u8>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let payload = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ConfigError::PayloadTooLarge { len: payload.len() });
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_byte() {
        assert_eq!(item_id_byte("A").unwrap(), b'A');
        assert_eq!(item_id_byte("sensor-7").unwrap(), b's');
        assert!(matches!(item_id_byte(""), Err(ConfigError::EmptyItemId)));
    }

    #[test]
    fn test_line_settings() {
        assert_eq!(parse_data_bits(8).unwrap(), DataBits::Eight);
        assert!(matches!(parse_data_bits(9), Err(ConfigError::DataBits(9))));
        assert_eq!(parse_parity("EVEN").unwrap(), Parity::Even);
        assert!(parse_parity("mark").is_err());
        assert_eq!(parse_stop_bits(2).unwrap(), StopBits::Two);
        assert!(parse_stop_bits(3).is_err());
    }

    #[test]
    fn test_load_payload() {
        let path = std::env::temp_dir().join("pacelink_load_payload.bin");
        std::fs::write(&path, [10u8, 20, 30]).unwrap();
        assert_eq!(load_payload(&path).unwrap(), vec![10, 20, 30]);
        std::fs::remove_file(&path).ok();

        let missing = std::env::temp_dir().join("pacelink_missing.bin");
        assert!(matches!(load_payload(&missing), Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_payload_too_large() {
        let path = std::env::temp_dir().join("pacelink_too_large.bin");
        std::fs::write(&path, vec![0u8; MAX_PAYLOAD_LEN + 1]).unwrap();
        assert!(matches!(
            load_payload(&path),
            Err(ConfigError::PayloadTooLarge { len }) if len == MAX_PAYLOAD_LEN + 1
        ));
        std::fs::remove_file(&path).ok();
    }
}
