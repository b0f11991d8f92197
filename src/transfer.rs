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

use std::marker::PhantomData;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use crate::flow::{FlowDecoder, FlowEvent, SendGate};
use crate::header::{send_header, TransferHeader};
use crate::protocol::{DEFAULT_LINGER, DEFAULT_SETTLE, PAUSE_POLL};
use crate::serial::SerialPort;
use crate::streamer::{self, StreamOutcome};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The last streaming invocation hit a write error and the receiver never resumed
    #[error("Transfer aborted: {0}")]
    Aborted(#[source] std::io::Error),

    #[error("Transfer complete")]
    TransferComplete,
}

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Delay after opening the port before the header goes out
    pub settle: Duration,
    /// Inbound silence after the last invocation that ends the transfer
    pub linger: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        TransferOptions {
            settle: DEFAULT_SETTLE,
            linger: DEFAULT_LINGER,
        }
    }
}

// ============================================================================
// States
// ============================================================================

pub struct Settle;
pub struct SendHeader;
pub struct Streaming;
pub struct Paused;
pub struct Lingering;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct TransferFsm<State> {
    state: PhantomData<State>,
    serial: Box<dyn SerialPort>,
    payload: Vec<u8>,
    item_id: u8,
    decoder: FlowDecoder,
    resume_from: usize,
    last_failure: Option<std::io::Error>,
    options: TransferOptions,
}

// ============================================================================
// Trait
// ============================================================================

pub trait TransferState: Send {
    fn step(self: Box<Self>) -> Result<Box<dyn TransferState>, TransferError>;
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<S> TransferFsm<S> {
    fn transition<T>(self) -> Box<TransferFsm<T>> {
        Box::new(TransferFsm {
            state: PhantomData,
            serial: self.serial,
            payload: self.payload,
            item_id: self.item_id,
            decoder: self.decoder,
            resume_from: self.resume_from,
            last_failure: self.last_failure,
            options: self.options,
        })
    }

    fn io_error(&self, e: std::io::Error) -> TransferError {
        let type_name = std::any::type_name::<S>();
        let state_name = type_name.split("::").last().unwrap_or(type_name);
        TransferError::Io(std::io::Error::new(
            e.kind(),
            format!("{} (in state: {})", e, state_name)
        ))
    }

    /// Pick the next state once a batch of control events has been applied
    fn route(mut self, resume: Option<usize>) -> Box<dyn TransferState> {
        if let Some(offset) = resume {
            self.resume_from = offset;
            self.transition::<Streaming>() as Box<dyn TransferState>
        } else if !self.decoder.gate().is_sending() {
            self.transition::<Paused>() as Box<dyn TransferState>
        } else {
            self.transition::<Lingering>() as Box<dyn TransferState>
        }
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl TransferState for TransferFsm<Settle> {
    fn step(self: Box<Self>) -> Result<Box<dyn TransferState>, TransferError> {
        let fsm = *self;
        info!("open... waiting {} ms", fsm.options.settle.as_millis());
        std::thread::sleep(fsm.options.settle);
        let next = fsm.transition::<SendHeader>();
        Ok(next as Box<dyn TransferState>)
    }
}

impl TransferState for TransferFsm<SendHeader> {
    fn step(self: Box<Self>) -> Result<Box<dyn TransferState>, TransferError> {
        let mut fsm = *self;
        let header = TransferHeader::new(fsm.item_id, fsm.payload.len());
        info!("length {}", fsm.payload.len());
        info!("id {}", fsm.item_id as char);

        if let Err(e) = send_header(fsm.serial.as_mut(), &header) {
            return Err(fsm.io_error(e));
        }

        fsm.resume_from = 0;
        let next = fsm.transition::<Streaming>();
        Ok(next as Box<dyn TransferState>)
    }
}

impl TransferState for TransferFsm<Streaming> {
    fn step(self: Box<Self>) -> Result<Box<dyn TransferState>, TransferError> {
        let mut fsm = *self;
        let gate = fsm.decoder.gate().clone();
        let decoder = &mut fsm.decoder;
        let mut events = Vec::new();

        let result = streamer::stream(fsm.serial.as_mut(), &fsm.payload, fsm.resume_from, &gate, |serial| {
            events.extend(read_available(serial, decoder)?);
            Ok(())
        });

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => return Err(fsm.io_error(e)),
        };

        match outcome {
            StreamOutcome::Completed { sent } => {
                info!("sent file");
                debug!("{} bytes from offset {}", sent, fsm.resume_from);
                fsm.last_failure = None;
            }
            StreamOutcome::Halted { position } => {
                debug!("Stopped at byte {}", position);
            }
            StreamOutcome::Failed { position, error: e } => {
                error!("Write failed at byte {}: {}", position, e);
                fsm.last_failure = Some(e);
            }
        }

        let resume = apply_events(&events, &gate);
        Ok(fsm.route(resume))
    }
}

impl TransferState for TransferFsm<Paused> {
    fn step(self: Box<Self>) -> Result<Box<dyn TransferState>, TransferError> {
        let mut fsm = *self;

        // No timeout here: the receiver holds us off for as long as it likes
        let mut buf = [0u8; 64];
        match fsm.serial.read_timeout(&mut buf, PAUSE_POLL) {
            Ok(n) => {
                let events = fsm.decoder.feed(&buf[..n]);
                let resume = apply_events(&events, fsm.decoder.gate());
                Ok(fsm.route(resume))
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                Ok(Box::new(fsm) as Box<dyn TransferState>)
            }
            Err(e) => Err(fsm.io_error(e)),
        }
    }
}

impl TransferState for TransferFsm<Lingering> {
    fn step(self: Box<Self>) -> Result<Box<dyn TransferState>, TransferError> {
        let mut fsm = *self;

        let mut buf = [0u8; 64];
        match fsm.serial.read_timeout(&mut buf, fsm.options.linger) {
            Ok(n) => {
                let events = fsm.decoder.feed(&buf[..n]);
                let resume = apply_events(&events, fsm.decoder.gate());
                Ok(fsm.route(resume))
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                if fsm.decoder.pending() > 0 {
                    debug!("Dropping {} bytes of an incomplete control group", fsm.decoder.pending());
                }
                match fsm.last_failure.take() {
                    Some(e) => Err(TransferError::Aborted(e)),
                    None => Err(TransferError::TransferComplete),
                }
            }
            Err(e) => Err(fsm.io_error(e)),
        }
    }
}

// ============================================================================
// Constructor & Runner
// ============================================================================

impl TransferFsm<Settle> {
    pub fn new(serial: Box<dyn SerialPort>, payload: Vec<u8>, item_id: u8, options: TransferOptions) -> Box<dyn TransferState> {
        Box::new(TransferFsm {
            state: PhantomData::<Settle>,
            serial,
            payload,
            item_id,
            decoder: FlowDecoder::new(SendGate::new()),
            resume_from: 0,
            last_failure: None,
            options,
        })
    }
}

/// Drive the state machine until the transfer completes or fails
pub fn run_transfer(mut state: Box<dyn TransferState>) -> Result<(), TransferError> {
    loop {
        match state.step() {
            Ok(next_state) => state = next_state,
            Err(TransferError::TransferComplete) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Decode whatever inbound bytes are already buffered, without blocking
fn read_available(serial: &mut dyn SerialPort, decoder: &mut FlowDecoder) -> std::io::Result<Vec<FlowEvent>> {
    let mut events = Vec::new();
    let mut buf = [0u8; 64];

    while serial.bytes_to_read()? > 0 {
        match serial.read_timeout(&mut buf, Duration::from_millis(1)) {
            Ok(n) => events.extend(decoder.feed(&buf[..n])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => return Err(e),
        }
    }

    Ok(events)
}

/// Log the events and return the offset to restart from, if the last of them left us sending
fn apply_events(events: &[FlowEvent], gate: &SendGate) -> Option<usize> {
    let mut resume = None;

    for event in events {
        match event {
            FlowEvent::Pause => {
                info!("pausing send");
                resume = None;
            }
            FlowEvent::Resume(offset) => {
                info!("resuming send from: {}", offset);
                resume = Some(*offset);
            }
        }
    }

    resume.filter(|_| gate.is_sending())
}

// ============================================================================
// Tests
// ============================================================================
