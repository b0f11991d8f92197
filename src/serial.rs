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

use std::io::{Read, Write};
use std::time::Duration;
use serialport::{SerialPort as SerialPortTrait, DataBits, Parity, StopBits};

// ============================================================================
// SerialPort Trait
// ============================================================================

/// Trait for the byte channel the pacelink sender drives
pub trait SerialPort: Send {
    /// Queue bytes for transmission without waiting for them to leave the UART
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Block until every queued byte has been physically transmitted
    fn drain(&mut self) -> std::io::Result<()>;

    /// Number of inbound bytes that can be read without blocking
    fn bytes_to_read(&mut self) -> std::io::Result<u32>;

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize>;
}

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// Real serial port implementation that wraps the serialport crate
pub struct RealSerialPort {
    port: Box<dyn SerialPortTrait>,
}

impl RealSerialPort {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(RealSerialPort { port })
    }
}

impl SerialPort for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buf)
    }

    fn drain(&mut self) -> std::io::Result<()> {
        // tcdrain on POSIX, FlushFileBuffers on Windows
        self.port.flush()
    }

    fn bytes_to_read(&mut self) -> std::io::Result<u32> {
        self.port.bytes_to_read().map_err(std::io::Error::other)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        self.port.set_timeout(timeout).map_err(std::io::Error::other)?;
        self.port.read(buf)
    }
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

/// One scripted inbound event for [`MockSerialPort`]
#[cfg(test)]
pub enum Incoming {
    /// Bytes that become readable once `after` bytes have been written (or attempted)
    Chunk { after: usize, bytes: Vec<u8> },
    /// A single read that times out
    Silence,
}

#[cfg(test)]
impl Incoming {
    pub fn after(after: usize, bytes: &[u8]) -> Self {
        Incoming::Chunk { after, bytes: bytes.to_vec() }
    }

    pub fn now(bytes: &[u8]) -> Self {
        Incoming::after(0, bytes)
    }
}

#[cfg(test)]
pub struct MockSerialPort {
    script: std::collections::VecDeque<Incoming>,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
    // A write is queued but has not been drained yet
    in_flight: bool,
    // Fail the write that would land at this offset of the write log
    fail_at: Option<usize>,
    // Bytes handed to write_all, failed writes included
    attempted: usize,
}

#[cfg(test)]
impl MockSerialPort {
    pub fn new(script: Vec<Incoming>, expected_writes: Vec<u8>) -> Self {
        MockSerialPort {
            script: script.into(),
            write_log: Vec::new(),
            expected_writes,
            in_flight: false,
            fail_at: None,
            attempted: 0,
        }
    }

    pub fn fail_write_at(mut self, offset: usize) -> Self {
        self.fail_at = Some(offset);
        self
    }

    fn released(&self) -> Option<usize> {
        match self.script.front() {
            Some(Incoming::Chunk { after, bytes }) if self.attempted >= *after => Some(bytes.len()),
            _ => None,
        }
    }
}

#[cfg(test)]
impl SerialPort for MockSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        assert!(
            !self.in_flight,
            "MockSerialPort write issued before previous write drained (log so far: {:02X?})",
            self.write_log
        );

        self.attempted += buf.len();

        if self.fail_at == Some(self.write_log.len()) {
            self.fail_at = None;
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "Mock write failure"
            ));
        }

        self.write_log.extend_from_slice(buf);
        self.in_flight = true;
        Ok(())
    }

    fn drain(&mut self) -> std::io::Result<()> {
        self.in_flight = false;
        Ok(())
    }

    fn bytes_to_read(&mut self) -> std::io::Result<u32> {
        Ok(self.released().unwrap_or(0) as u32)
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> std::io::Result<usize> {
        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "Mock timeout");

        if matches!(self.script.front(), Some(Incoming::Silence)) {
            self.script.pop_front();
            return Err(timeout);
        }

        // Out of responses, or next chunk not due yet = timeout
        let Some(available) = self.released() else {
            return Err(timeout);
        };

        let n = available.min(buf.len());
        if let Some(Incoming::Chunk { bytes, .. }) = self.script.front_mut() {
            buf[..n].copy_from_slice(&bytes[..n]);
            bytes.drain(..n);
            if bytes.is_empty() {
                self.script.pop_front();
            }
        }

        Ok(n)
    }
}

#[cfg(test)]
impl Drop for MockSerialPort {
    fn drop(&mut self) {
        assert!(
            self.script.is_empty(),
            "MockSerialPort dropped with {} unconsumed inbound events (wrote {} bytes)",
            self.script.len(),
            self.write_log.len()
        );

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockSerialPort write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}
