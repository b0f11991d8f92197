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

//! Pacelink wire constants

use std::time::Duration;

/// Size of the transfer header: item id byte followed by a 24-bit length
pub const HEADER_LEN: usize = 4;

/// Number of inbound bytes that make up one control group
pub const CONTROL_GROUP_LEN: usize = 3;

/// Largest payload the 24-bit length field can describe
pub const MAX_PAYLOAD_LEN: usize = 0xFF_FFFF;

/// Default line speed of the receiver firmware
pub const DEFAULT_BAUD: u32 = 57600;

/// Time to wait after opening the port; the receiver resets on open
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(2000);

/// Quiet period after the last invocation before the transfer is considered finished
pub const DEFAULT_LINGER: Duration = Duration::from_millis(2000);

/// Poll interval while paused and waiting for a resume group
pub const PAUSE_POLL: Duration = Duration::from_millis(500);
