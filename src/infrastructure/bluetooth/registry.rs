//! Connection Registry
//!
//! A fixed table of candidate and established links, one per pad slot. The
//! slot index is the only long-lived handle the rest of the system sees.

use crate::domain::models::{BdAddr, MAX_PADS};
use crate::infrastructure::bluetooth::command::{CommandQueue, RadioCommand};
use crate::infrastructure::bluetooth::REASON_REMOTE_TERMINATED;
use crate::pads::PadPort;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Empty,
    Connecting,
    Connected,
}

/// One candidate or established radio link. Address arrives before the
/// handle on outbound connects and after it on inbound ones, so both stay
/// optional until known.
#[derive(Debug, Clone, Default)]
pub struct Connection {
    pub addr: Option<BdAddr>,
    pub handle: Option<u16>,
    pub control_cid: Option<u16>,
    pub interrupt_cid: Option<u16>,
    pub page_scan_repetition_mode: u8,
    pub clock_offset: u16,
    pub state: ConnectionState,
}

impl Connection {
    pub fn is_empty(&self) -> bool {
        self.state == ConnectionState::Empty
    }

    fn matches(&self, handle: Option<u16>, addr: Option<BdAddr>) -> bool {
        if self.is_empty() {
            return false;
        }
        // A key only rules a connection out when both sides carry it and the
        // values differ; a side missing the field is a wildcard.
        let handle_ok = match (handle, self.handle) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        let addr_ok = match (addr, self.addr) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        // At least one key must have matched by value, not by wildcard.
        let anchored = matches!((handle, self.handle), (Some(a), Some(b)) if a == b)
            || matches!((addr, self.addr), (Some(a), Some(b)) if a == b);
        handle_ok && addr_ok && anchored
    }
}

pub struct ConnectionRegistry {
    slots: [Connection; MAX_PADS],
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Connection::default()),
        }
    }

    /// First free slot, or None when the registry is full. Callers drop new
    /// discovery results in that case; nothing is ever evicted.
    pub fn find_empty(&self) -> Option<usize> {
        self.slots.iter().position(Connection::is_empty)
    }

    /// The unique connection matching the supplied keys, treating a field
    /// absent on either side as a wildcard.
    pub fn find_by(&self, handle: Option<u16>, addr: Option<BdAddr>) -> Option<usize> {
        self.slots.iter().position(|c| c.matches(handle, addr))
    }

    /// The connection owning the given channel id, on either channel.
    pub fn find_by_channel(&self, cid: u16) -> Option<usize> {
        self.slots.iter().position(|c| {
            !c.is_empty() && (c.control_cid == Some(cid) || c.interrupt_cid == Some(cid))
        })
    }

    pub fn get(&self, slot: usize) -> &Connection {
        &self.slots[slot]
    }

    pub fn get_mut(&mut self, slot: usize) -> &mut Connection {
        &mut self.slots[slot]
    }

    pub fn open_slots(&self) -> Vec<usize> {
        (0..MAX_PADS).filter(|&i| !self.slots[i].is_empty()).collect()
    }

    /// Tear a connection down at our request: ask the radio to drop the link
    /// if one exists, then zero the slot and release its driver and sink
    /// entry. The disconnect reason is the fixed "remote user terminated"
    /// code the radio expects.
    pub fn close(&mut self, slot: usize, queue: &mut CommandQueue, pads: &mut PadPort) {
        let conn = &self.slots[slot];
        if conn.is_empty() {
            return;
        }
        debug!(slot, addr = ?conn.addr, "closing connection");
        if let Some(handle) = conn.handle {
            if let Err(e) = queue.enqueue(RadioCommand::Disconnect {
                handle,
                reason: REASON_REMOTE_TERMINATED,
            }) {
                warn!(slot, error = %e, "could not queue disconnect");
            }
        }
        self.release(slot, pads);
    }

    /// Zero a slot after the link is already gone (transport reported the
    /// disconnect); no further radio command is issued.
    pub fn release(&mut self, slot: usize, pads: &mut PadPort) {
        self.slots[slot] = Connection::default();
        pads.release(slot);
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
