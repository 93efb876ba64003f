//! Pad Drivers
//!
//! One driver is bound per connected device, selected by matching the
//! reported device name against a static table. The driver owns the
//! per-device protocol state; everything it may touch during a call is
//! handed to it through a [`PadLink`], so drivers never hold transport
//! references across calls.

pub mod sink;
pub mod wiimote;

use crate::domain::models::{BdAddr, RumbleEffect, MAX_PADS};
use crate::infrastructure::bluetooth::transport::{RadioTransport, TransportError};
use sink::SharedSink;
use tracing::{debug, info, warn};

/// HID transaction prefix for output reports on the data channel.
const HID_OUTPUT_PREFIX: u8 = 0xa2;

#[derive(Debug, thiserror::Error)]
pub enum PadError {
    #[error("pad slot {0} is already bound")]
    SlotBound(usize),
    #[error("no free pad slot")]
    NoFreeSlot,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Device types the dispatch table can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadKind {
    Wiimote,
}

/// Static ordered device table; the first entry whose substring appears in
/// the reported name wins. Matching is a pure function with no side effects.
const DEVICE_TABLE: &[(&str, PadKind)] = &[("Nintendo RVL-CNT-01", PadKind::Wiimote)];

pub fn bind(name: &str) -> Option<PadKind> {
    DEVICE_TABLE
        .iter()
        .find(|(needle, _)| name.contains(needle))
        .map(|(_, kind)| *kind)
}

/// Link information for a pad whose connection was established outside the
/// discovery pipeline (the platform handed us an already-open device).
#[derive(Debug, Clone, Copy)]
pub struct RawConnection {
    pub addr: BdAddr,
    pub handle: u16,
    pub control_cid: u16,
    pub interrupt_cid: u16,
}

/// What a driver may touch during one call: the transport for channel
/// writes, the link endpoints, the shared sink, and its slot.
pub struct PadLink<'a> {
    pub transport: &'a mut dyn RadioTransport,
    pub handle: u16,
    pub interrupt_cid: u16,
    pub sink: &'a SharedSink,
    pub slot: usize,
}

impl PadLink<'_> {
    /// Send one HID output report over the interrupt channel.
    pub fn send_report(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(HID_OUTPUT_PREFIX);
        frame.extend_from_slice(payload);
        self.transport
            .send_channel_data(self.handle, self.interrupt_cid, &frame)
    }

    /// Write this slot's decoded sample into the sink.
    pub fn write_sink(&self, sample: crate::domain::models::PadSample) {
        if let Ok(mut sink) = self.sink.lock() {
            sink.set(self.slot, sample);
        }
    }
}

/// The per-device capability set. Bound once per connection.
pub trait PadDriver: Send {
    /// Kick off the device handshake. Called once when the driver is bound.
    fn connect(&mut self, link: PadLink<'_>) -> Result<(), PadError>;

    /// Driver-side teardown; the link may already be dead, so no writes.
    fn disconnect(&mut self);

    /// One inbound data frame from the device.
    fn handle_packet(&mut self, link: PadLink<'_>, data: &[u8]);

    /// Returns false when the device has no rumble or is not ready for it.
    fn set_rumble(&mut self, link: PadLink<'_>, effect: RumbleEffect, strength: u8) -> bool;
}

fn new_driver(kind: PadKind, slot: usize) -> Box<dyn PadDriver> {
    match kind {
        PadKind::Wiimote => Box::new(wiimote::WiimoteDriver::new(slot)),
    }
}

struct BoundPad {
    driver: Box<dyn PadDriver>,
    handle: u16,
    interrupt_cid: u16,
}

/// The slot-indexed facade the surrounding system talks to: bound drivers
/// plus the shared input sink.
pub struct PadPort {
    slots: [Option<BoundPad>; MAX_PADS],
    sink: SharedSink,
}

impl PadPort {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            sink,
        }
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    pub fn is_bound(&self, slot: usize) -> bool {
        slot < MAX_PADS && self.slots[slot].is_some()
    }

    /// Bind a driver of the given kind to a specific slot and run its
    /// connect handshake. Used by the discovery pipeline, where the slot is
    /// the connection's registry index.
    pub fn bind_slot(
        &mut self,
        slot: usize,
        kind: PadKind,
        raw: RawConnection,
        transport: &mut dyn RadioTransport,
    ) -> Result<(), PadError> {
        if slot >= MAX_PADS {
            return Err(PadError::NoFreeSlot);
        }
        if self.slots[slot].is_some() {
            return Err(PadError::SlotBound(slot));
        }
        let mut driver = new_driver(kind, slot);
        driver.connect(PadLink {
            transport,
            handle: raw.handle,
            interrupt_cid: raw.interrupt_cid,
            sink: &self.sink,
            slot,
        })?;
        self.slots[slot] = Some(BoundPad {
            driver,
            handle: raw.handle,
            interrupt_cid: raw.interrupt_cid,
        });
        info!(slot, ?kind, addr = %raw.addr, "pad bound");
        Ok(())
    }

    /// Match a name against the device table and bind the first free slot.
    /// Returns the assigned slot, or None when the name is unrecognized or
    /// every slot is taken.
    pub fn bind_and_connect(
        &mut self,
        name: &str,
        raw: RawConnection,
        transport: &mut dyn RadioTransport,
    ) -> Option<usize> {
        let kind = bind(name)?;
        let slot = self.slots.iter().position(Option::is_none)?;
        match self.bind_slot(slot, kind, raw, transport) {
            Ok(()) => Some(slot),
            Err(e) => {
                warn!(slot, name, error = %e, "pad bind failed");
                None
            }
        }
    }

    /// Drop the driver and zero the sink entry for a slot.
    pub fn release(&mut self, slot: usize) {
        if slot >= MAX_PADS {
            return;
        }
        if let Some(mut pad) = self.slots[slot].take() {
            pad.driver.disconnect();
            debug!(slot, "pad released");
        }
        if let Ok(mut sink) = self.sink.lock() {
            sink.clear(slot);
        }
    }

    /// Hand a raw data frame to the bound driver. Frames for unbound slots
    /// are dropped.
    pub fn deliver_packet(&mut self, slot: usize, transport: &mut dyn RadioTransport, data: &[u8]) {
        if slot >= MAX_PADS {
            return;
        }
        let sink = self.sink.clone();
        if let Some(pad) = self.slots[slot].as_mut() {
            pad.driver.handle_packet(
                PadLink {
                    transport,
                    handle: pad.handle,
                    interrupt_cid: pad.interrupt_cid,
                    sink: &sink,
                    slot,
                },
                data,
            );
        }
    }

    pub fn rumble(
        &mut self,
        slot: usize,
        transport: &mut dyn RadioTransport,
        effect: RumbleEffect,
        strength: u8,
    ) -> bool {
        if slot >= MAX_PADS {
            return false;
        }
        let sink = self.sink.clone();
        match self.slots[slot].as_mut() {
            Some(pad) => pad.driver.set_rumble(
                PadLink {
                    transport,
                    handle: pad.handle,
                    interrupt_cid: pad.interrupt_cid,
                    sink: &sink,
                    slot,
                },
                effect,
                strength,
            ),
            None => false,
        }
    }

    pub fn read_buttons(&self, slot: usize) -> u32 {
        self.sink.lock().map(|s| s.buttons(slot)).unwrap_or(0)
    }

    pub fn read_axis(&self, slot: usize, index: usize) -> i16 {
        self.sink.lock().map(|s| s.axis(slot, index)).unwrap_or(0)
    }
}
