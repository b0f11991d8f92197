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

//! Receiver-driven flow control
//!
//! The receiver talks back in groups of three bytes. While the sender is
//! sending, a complete group is a bare pause marker and its value is thrown
//! away. While paused, a complete group is a big-endian resume offset into
//! the payload. There is no resynchronisation marker: a lost inbound byte
//! shifts every later group for the rest of the transfer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::warn;
use crate::protocol::CONTROL_GROUP_LEN;

// ============================================================================
// Control Group Accumulator
// ============================================================================

/// Fixed-size accumulator for one inbound control group
#[derive(Debug, Default)]
pub struct ControlGroup {
    value: u32,
    filled: usize,
}

impl ControlGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a byte, most significant first. Returns the 24-bit value and
    /// resets once the group is complete.
    pub fn push(&mut self, byte: u8) -> Option<u32> {
        self.value = (self.value << 8) | u32::from(byte);
        self.filled += 1;

        if self.filled < CONTROL_GROUP_LEN {
            return None;
        }

        let value = self.value;
        self.value = 0;
        self.filled = 0;
        Some(value)
    }

    /// Bytes accumulated towards the current group
    pub fn pending(&self) -> usize {
        self.filled
    }
}

// ============================================================================
// Send State
// ============================================================================

#[derive(Debug)]
struct GateInner {
    sending: AtomicBool,
    epoch: AtomicU64,
}

/// Shared send/pause state.
///
/// Only [`FlowDecoder`] flips the gate. Streamers hold a [`StreamTicket`]
/// taken when they start; reopening the gate begins a new epoch, which
/// revokes every ticket handed out before it.
#[derive(Debug, Clone)]
pub struct SendGate {
    inner: Arc<GateInner>,
}

/// Permission for one streaming invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTicket {
    epoch: u64,
}

impl SendGate {
    pub fn new() -> Self {
        SendGate {
            inner: Arc::new(GateInner {
                sending: AtomicBool::new(true),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_sending(&self) -> bool {
        self.inner.sending.load(Ordering::Acquire)
    }

    pub fn ticket(&self) -> StreamTicket {
        StreamTicket { epoch: self.inner.epoch.load(Ordering::Acquire) }
    }

    /// True while the gate is open and no resume has happened since `ticket` was taken
    pub fn permits(&self, ticket: &StreamTicket) -> bool {
        self.is_sending() && self.inner.epoch.load(Ordering::Acquire) == ticket.epoch
    }

    /// Sending -> paused. Returns false if already paused.
    pub(crate) fn close(&self) -> bool {
        self.inner.sending
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Paused -> sending, starting a new epoch. Returns false, leaving the
    /// epoch and every live ticket untouched, if already sending.
    pub(crate) fn open(&self) -> bool {
        if self.is_sending() {
            return false;
        }

        // Bump the epoch first so no stale ticket sees the gate open
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.inner.sending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for SendGate {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Decoder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    Pause,
    Resume(usize),
}

/// Turns the inbound byte stream into pause/resume events
#[derive(Debug)]
pub struct FlowDecoder {
    group: ControlGroup,
    gate: SendGate,
}

impl FlowDecoder {
    pub fn new(gate: SendGate) -> Self {
        FlowDecoder {
            group: ControlGroup::new(),
            gate,
        }
    }

    pub fn gate(&self) -> &SendGate {
        &self.gate
    }

    /// Bytes received towards the next control group
    pub fn pending(&self) -> usize {
        self.group.pending()
    }

    pub fn on_inbound_byte(&mut self, byte: u8) -> Option<FlowEvent> {
        let value = self.group.push(byte)?;

        if self.gate.close() {
            Some(FlowEvent::Pause)
        } else if self.gate.open() {
            Some(FlowEvent::Resume(value as usize))
        } else {
            // Only the decoder flips the gate, so one of the two always succeeds
            warn!("Control group 0x{:06X} arrived while the gate was changing", value);
            None
        }
    }

    /// Decode a chunk of inbound bytes; partial groups carry over to the next call
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<FlowEvent> {
        bytes.iter().filter_map(|&b| self.on_inbound_byte(b)).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_group_big_endian() {
        let mut group = ControlGroup::new();
        assert_eq!(group.push(0x01), None);
        assert_eq!(group.push(0x02), None);
        assert_eq!(group.pending(), 2);
        assert_eq!(group.push(0x03), Some(0x010203));
        assert_eq!(group.pending(), 0);

        assert_eq!(group.push(0xFF), None);
        assert_eq!(group.push(0xFF), None);
        assert_eq!(group.push(0xFF), Some(0xFF_FFFF));

        // Accumulator is reset, no bits leak into the next group
        group.push(0);
        group.push(0);
        assert_eq!(group.push(7), Some(7));
    }

    #[test]
    fn test_toggle_symmetry() {
        let gate = SendGate::new();
        let mut decoder = FlowDecoder::new(gate.clone());
        assert!(gate.is_sending());

        assert_eq!(decoder.feed(&[9, 9, 9]), vec![FlowEvent::Pause]);
        assert!(!gate.is_sending());

        assert_eq!(decoder.feed(&[0, 1, 2]), vec![FlowEvent::Resume(0x0102)]);
        assert!(gate.is_sending());
    }

    #[test]
    fn test_pause_value_is_discarded() {
        let gate = SendGate::new();
        let mut decoder = FlowDecoder::new(gate.clone());

        assert_eq!(decoder.feed(&[0, 0, 42]), vec![FlowEvent::Pause]);
        assert_eq!(decoder.feed(&[0, 0, 3]), vec![FlowEvent::Resume(3)]);
    }

    #[test]
    fn test_framing_across_chunks() {
        let inbound = [1u8, 1, 1, 0, 0, 3, 2, 2, 2, 0, 1, 0];
        let expected = vec![
            FlowEvent::Pause,
            FlowEvent::Resume(3),
            FlowEvent::Pause,
            FlowEvent::Resume(256),
        ];

        for chunk_size in 1..=inbound.len() {
            let gate = SendGate::new();
            let mut decoder = FlowDecoder::new(gate.clone());
            let mut events = Vec::new();
            for chunk in inbound.chunks(chunk_size) {
                events.extend(decoder.feed(chunk));
            }
            assert_eq!(events, expected, "chunk size {}", chunk_size);
            assert!(gate.is_sending());
        }
    }

    #[test]
    fn test_partial_group_persists() {
        let gate = SendGate::new();
        let mut decoder = FlowDecoder::new(gate.clone());

        assert!(decoder.feed(&[1, 1]).is_empty());
        assert_eq!(decoder.pending(), 2);
        assert!(gate.is_sending());

        assert_eq!(decoder.feed(&[1, 0]), vec![FlowEvent::Pause]);
        assert_eq!(decoder.pending(), 1);
        assert!(!gate.is_sending());
    }

    #[test]
    fn test_reopen_revokes_old_tickets() {
        let gate = SendGate::new();
        let mut decoder = FlowDecoder::new(gate.clone());

        let first = gate.ticket();
        assert!(gate.permits(&first));

        decoder.feed(&[0, 0, 0]);
        assert!(!gate.permits(&first));

        decoder.feed(&[0, 0, 0]);
        let second = gate.ticket();
        assert!(gate.permits(&second));
        assert!(!gate.permits(&first));
    }

    #[test]
    fn test_gate_compare_and_set() {
        let gate = SendGate::new();
        let ticket = gate.ticket();
        assert!(!gate.open());
        assert!(gate.permits(&ticket), "failed open must not revoke tickets");
        assert!(gate.close());
        assert!(!gate.close());
        assert!(gate.open());
        assert!(gate.is_sending());
    }
}
