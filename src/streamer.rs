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

//! Byte-at-a-time payload streaming
//!
//! Each call to [`stream`] is one invocation starting at a caller-supplied
//! offset. Nothing is remembered between invocations: after a pause the
//! receiver names the offset and a fresh invocation starts there.

use tracing::{debug, trace};
use crate::flow::SendGate;
use crate::serial::SerialPort;

#[derive(Debug)]
pub enum StreamOutcome {
    /// Every byte from the starting offset to the end of the payload was drained
    Completed { sent: usize },
    /// The gate closed (or a newer invocation took over) before `position` was written
    Halted { position: usize },
    /// Writing or draining the byte at `position` failed; the rest of this invocation is dropped
    Failed { position: usize, error: std::io::Error },
}

/// Emit `payload[from..]` one byte at a time.
///
/// Each byte is drained before the next is written, so at most one byte is
/// ever in flight. `between` runs ahead of every gate check, including the
/// one for the first byte, and is where buffered inbound control bytes get
/// decoded; its errors end the invocation and are returned as `Err`.
///
/// An offset at or past the end of the payload completes with nothing sent.
pub fn stream<F>(
    serial: &mut dyn SerialPort,
    payload: &[u8],
    from: usize,
    gate: &SendGate,
    mut between: F,
) -> std::io::Result<StreamOutcome>
where
    F: FnMut(&mut dyn SerialPort) -> std::io::Result<()>,
{
    let ticket = gate.ticket();
    let remaining = payload.get(from..).unwrap_or_default();
    debug!("Streaming {} bytes from offset {}", remaining.len(), from);

    for (i, &byte) in remaining.iter().enumerate() {
        let position = from + i;

        between(serial)?;
        if !gate.permits(&ticket) {
            debug!("Halted before byte {}", position);
            return Ok(StreamOutcome::Halted { position });
        }

        if let Err(error) = serial.write_all(&[byte]).and_then(|_| serial.drain()) {
            return Ok(StreamOutcome::Failed { position, error });
        }
        trace!("Sent byte {}: 0x{:02X}", position, byte);
    }

    Ok(StreamOutcome::Completed { sent: remaining.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowDecoder;
    use crate::serial::{Incoming, MockSerialPort};

    const PAYLOAD: [u8; 5] = [10, 20, 30, 40, 50];

    fn no_poll(_: &mut dyn SerialPort) -> std::io::Result<()> {
        Ok(())
    }

    #[test]
    fn test_full_send() {
        let mut mock = MockSerialPort::new(vec![], PAYLOAD.to_vec());
        let gate = SendGate::new();

        let mut polls = 0;
        let outcome = stream(&mut mock, &PAYLOAD, 0, &gate, |_| {
            polls += 1;
            Ok(())
        })
        .expect("stream");

        assert!(matches!(outcome, StreamOutcome::Completed { sent: 5 }));
        assert_eq!(polls, 5);
    }

    #[test]
    fn test_from_offset() {
        let mut mock = MockSerialPort::new(vec![], vec![40, 50]);
        let gate = SendGate::new();

        let outcome = stream(&mut mock, &PAYLOAD, 3, &gate, no_poll).expect("stream");
        assert!(matches!(outcome, StreamOutcome::Completed { sent: 2 }));
    }

    #[test]
    fn test_offset_past_end_completes_empty() {
        let mut mock = MockSerialPort::new(vec![], vec![]);
        let gate = SendGate::new();

        let outcome = stream(&mut mock, &PAYLOAD, 5, &gate, no_poll).expect("stream");
        assert!(matches!(outcome, StreamOutcome::Completed { sent: 0 }));

        let outcome = stream(&mut mock, &PAYLOAD, 0x00FF_FFFF, &gate, no_poll).expect("stream");
        assert!(matches!(outcome, StreamOutcome::Completed { sent: 0 }));
    }

    #[test]
    fn test_pause_halts_after_drained_byte() {
        // Pause group becomes readable once 10 and 20 have gone out
        let mut mock = MockSerialPort::new(vec![Incoming::after(2, &[1, 1, 1])], vec![10, 20]);
        let gate = SendGate::new();
        let mut decoder = FlowDecoder::new(gate.clone());

        let outcome = stream(&mut mock, &PAYLOAD, 0, &gate, |serial| {
            let mut buf = [0u8; 8];
            while serial.bytes_to_read()? > 0 {
                let n = serial.read_timeout(&mut buf, std::time::Duration::ZERO)?;
                decoder.feed(&buf[..n]);
            }
            Ok(())
        })
        .expect("stream");

        assert!(matches!(outcome, StreamOutcome::Halted { position: 2 }));
        assert!(!gate.is_sending());
    }

    #[test]
    fn test_closed_gate_emits_nothing() {
        let mut mock = MockSerialPort::new(vec![], vec![]);
        let gate = SendGate::new();
        gate.close();

        let outcome = stream(&mut mock, &PAYLOAD, 0, &gate, no_poll).expect("stream");
        assert!(matches!(outcome, StreamOutcome::Halted { position: 0 }));
    }

    #[test]
    fn test_superseded_invocation_halts() {
        let mut mock = MockSerialPort::new(vec![Incoming::after(1, &[0, 0, 0, 0, 0, 4])], vec![10]);
        let gate = SendGate::new();
        let mut decoder = FlowDecoder::new(gate.clone());

        // Pause and resume arrive together; the gate ends up open but this invocation is stale
        let outcome = stream(&mut mock, &PAYLOAD, 0, &gate, |serial| {
            let mut buf = [0u8; 8];
            while serial.bytes_to_read()? > 0 {
                let n = serial.read_timeout(&mut buf, std::time::Duration::ZERO)?;
                decoder.feed(&buf[..n]);
            }
            Ok(())
        })
        .expect("stream");

        assert!(gate.is_sending());
        assert!(matches!(outcome, StreamOutcome::Halted { position: 1 }));
    }

    #[test]
    fn test_write_error_aborts_invocation() {
        let mut mock = MockSerialPort::new(vec![], vec![10, 20]).fail_write_at(2);
        let gate = SendGate::new();

        let outcome = stream(&mut mock, &PAYLOAD, 0, &gate, no_poll).expect("stream");
        match outcome {
            StreamOutcome::Failed { position, error } => {
                assert_eq!(position, 2);
                assert_eq!(error.kind(), std::io::ErrorKind::BrokenPipe);
            }
            other => panic!("Expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_buffered_pause_stops_first_byte() {
        // Pause group already waiting before the invocation starts
        let mut mock = MockSerialPort::new(vec![Incoming::now(&[1, 1, 1])], vec![]);
        let gate = SendGate::new();
        let mut decoder = FlowDecoder::new(gate.clone());

        let outcome = stream(&mut mock, &PAYLOAD, 0, &gate, |serial| {
            let mut buf = [0u8; 8];
            while serial.bytes_to_read()? > 0 {
                let n = serial.read_timeout(&mut buf, std::time::Duration::ZERO)?;
                decoder.feed(&buf[..n]);
            }
            Ok(())
        })
        .expect("stream");

        assert!(matches!(outcome, StreamOutcome::Halted { position: 0 }));
        assert!(!gate.is_sending());
    }

    #[test]
    fn test_hook_error_propagates() {
        let mut mock = MockSerialPort::new(vec![], vec![]);
        let gate = SendGate::new();

        let result = stream(&mut mock, &PAYLOAD, 0, &gate, |_| {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "read failed"))
        });
        assert!(result.is_err());
    }
}
