//! Outbound Radio Command Queue
//!
//! Every command the core issues to the radio goes through one bounded FIFO
//! queue, paced by transport credits: the transport grants a credit each
//! time it acknowledges a prior dispatch (command-status or command-complete),
//! and the queue consumes one credit per dispatch. Ordering matters at the
//! protocol level (accept-connection must reach the radio before the channel
//! creates that follow it), so dispatch is strictly first-in first-out.

use crate::domain::models::BdAddr;
use crate::infrastructure::bluetooth::transport::{RadioTransport, TransportError};
use std::collections::VecDeque;
use tracing::trace;

/// Maximum number of commands held while waiting for credits.
pub const QUEUE_CAPACITY: usize = 64;

/// One outbound radio operation. Immutable once enqueued; the queue owns it
/// until it is handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCommand {
    SetPowerMode(bool),
    ReadLocalAddress,
    Disconnect {
        handle: u16,
        reason: u8,
    },
    StartInquiry {
        lap: [u8; 3],
        duration: u8,
        max_responses: u8,
    },
    AcceptConnection {
        addr: BdAddr,
    },
    CreateChannel {
        addr: BdAddr,
        psm: u16,
    },
    RemoteNameRequest {
        addr: BdAddr,
        page_scan_repetition_mode: u8,
        clock_offset: u16,
    },
    PinCodeReply {
        addr: BdAddr,
        pin: [u8; 6],
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity. Command issuance is paced by the state
    /// machines, so hitting this is a local bug, not a radio condition.
    #[error("command queue is full ({0} commands pending)")]
    Full(usize),
}

/// Credit-gated FIFO of [`RadioCommand`]s.
pub struct CommandQueue {
    pending: VecDeque<RadioCommand>,
    credits: u32,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::with_capacity(QUEUE_CAPACITY),
            credits: 1,
        }
    }

    /// Append a command to the tail. The caller is expected to `drain`
    /// afterwards so nothing is held longer than necessary.
    pub fn enqueue(&mut self, cmd: RadioCommand) -> Result<(), QueueError> {
        if self.pending.len() >= QUEUE_CAPACITY {
            return Err(QueueError::Full(self.pending.len()));
        }
        trace!(?cmd, "queueing radio command");
        self.pending.push_back(cmd);
        Ok(())
    }

    /// Credits granted by a transport acknowledgment.
    pub fn grant_credits(&mut self, n: u32) {
        self.credits = self.credits.saturating_add(n);
    }

    /// Dispatch from the head while credits remain, one credit per command.
    /// A dispatch failure is a transport failure surfaced to the caller; the
    /// command is not re-queued.
    pub fn drain(&mut self, transport: &mut dyn RadioTransport) -> Result<(), TransportError> {
        while self.credits > 0 {
            let Some(cmd) = self.pending.pop_front() else {
                break;
            };
            self.credits -= 1;
            trace!(?cmd, credits = self.credits, "dispatching radio command");
            transport.send_command(&cmd)?;
        }
        Ok(())
    }

    /// Drop everything pending and restore the initial single credit. Used
    /// when the radio reports ready or halting.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.credits = 1;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn credits(&self) -> u32 {
        self.credits
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
