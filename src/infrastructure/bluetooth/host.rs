//! Radio Host
//!
//! The event-driven controller for the radio as a whole: inquiry, channel
//! establishment, naming, PIN exchange and disconnection. Per-device
//! handshakes live in the bound pad drivers; this module only decides which
//! connection an event belongs to and what to ask the radio next. All of it
//! runs on the I/O thread and never blocks.

use crate::domain::models::{BdAddr, RumbleEffect};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::command::{CommandQueue, RadioCommand};
use crate::infrastructure::bluetooth::events::RadioEvent;
use crate::infrastructure::bluetooth::registry::{ConnectionRegistry, ConnectionState};
use crate::infrastructure::bluetooth::transport::{RadioTransport, TransportError};
use crate::infrastructure::bluetooth::{INQUIRY_LAP_GIAC, PSM_HID_CONTROL, PSM_HID_INTERRUPT};
use crate::pads::sink::SharedSink;
use crate::pads::{PadPort, RawConnection};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RadioState {
    Idle,
    Discovering,
}

pub struct RadioHost<T: RadioTransport> {
    transport: T,
    queue: CommandQueue,
    registry: ConnectionRegistry,
    pads: PadPort,
    settings: Settings,
    state: RadioState,
    local_addr: Option<BdAddr>,
    inquiry_restarts: u32,
}

impl<T: RadioTransport> RadioHost<T> {
    pub fn new(transport: T, settings: Settings, sink: SharedSink) -> Self {
        Self {
            transport,
            queue: CommandQueue::new(),
            registry: ConnectionRegistry::new(),
            pads: PadPort::new(sink),
            settings,
            state: RadioState::Idle,
            local_addr: None,
            inquiry_restarts: 0,
        }
    }

    /// Process one inbound radio event. The only error that escapes is a
    /// transport failure while flushing the command queue; protocol-level
    /// failures are contained to their connection.
    pub fn handle_event(&mut self, event: RadioEvent) -> Result<(), TransportError> {
        match event {
            RadioEvent::Ready => self.on_ready()?,
            RadioEvent::Halting => self.on_halting()?,
            RadioEvent::CommandStatus { credits } | RadioEvent::CommandComplete { credits } => {
                self.queue.grant_credits(u32::from(credits));
                self.queue.drain(&mut self.transport)?;
            }
            RadioEvent::LocalAddress(addr) => {
                debug!(%addr, "local radio address");
                self.local_addr = Some(addr);
            }
            RadioEvent::InquiryResult {
                addr,
                page_scan_repetition_mode,
                clock_offset,
            } => self.on_inquiry_result(addr, page_scan_repetition_mode, clock_offset)?,
            RadioEvent::InquiryComplete { success } => self.on_inquiry_complete(success)?,
            RadioEvent::IncomingConnection { addr, handle } => {
                self.on_incoming_connection(addr, handle)?
            }
            RadioEvent::ChannelOpened {
                success,
                addr,
                handle,
                psm,
                cid,
            } => self.on_channel_opened(success, addr, handle, psm, cid)?,
            RadioEvent::RemoteNameComplete {
                success,
                addr,
                name,
            } => self.on_remote_name_complete(success, addr, &name)?,
            RadioEvent::PinCodeRequest { addr } => {
                // Always answered immediately with the protocol PIN: the
                // device's own address reversed. Automation, not security.
                debug!(%addr, "answering pin request");
                self.submit(RadioCommand::PinCodeReply {
                    addr,
                    pin: addr.reversed(),
                })?;
            }
            RadioEvent::DisconnectionComplete { handle } => {
                match self.registry.find_by(Some(handle), None) {
                    Some(slot) => {
                        info!(slot, handle, "link disconnected");
                        self.registry.release(slot, &mut self.pads);
                    }
                    None => trace!(handle, "disconnection for unknown handle ignored"),
                }
            }
            RadioEvent::DataPacket { cid, data } => match self.registry.find_by_channel(cid) {
                Some(slot) => self.pads.deliver_packet(slot, &mut self.transport, &data),
                None => trace!(cid, "data packet for unknown channel dropped"),
            },
        }
        Ok(())
    }

    fn on_ready(&mut self) -> Result<(), TransportError> {
        info!("radio ready");
        self.queue.reset();
        self.inquiry_restarts = 0;
        // Listeners must be re-registered after every power cycle, before
        // any device tries to connect back in.
        self.transport.register_listener(PSM_HID_CONTROL)?;
        self.transport.register_listener(PSM_HID_INTERRUPT)?;
        self.submit(RadioCommand::ReadLocalAddress)?;
        self.start_inquiry()?;
        Ok(())
    }

    fn on_halting(&mut self) -> Result<(), TransportError> {
        info!("radio halting, closing all connections");
        for slot in self.registry.open_slots() {
            self.registry.close(slot, &mut self.queue, &mut self.pads);
        }
        self.queue.drain(&mut self.transport)?;
        self.queue.reset();
        self.state = RadioState::Idle;
        Ok(())
    }

    fn start_inquiry(&mut self) -> Result<(), TransportError> {
        self.state = RadioState::Discovering;
        self.submit(RadioCommand::StartInquiry {
            lap: INQUIRY_LAP_GIAC,
            duration: self.settings.inquiry_duration,
            max_responses: self.settings.inquiry_max_responses,
        })
    }

    fn on_inquiry_result(
        &mut self,
        addr: BdAddr,
        page_scan_repetition_mode: u8,
        clock_offset: u16,
    ) -> Result<(), TransportError> {
        if let Some(slot) = self.registry.find_by(None, Some(addr)) {
            // A repeat result for a device we are already working on; just
            // refresh the page metadata for the name request.
            let conn = self.registry.get_mut(slot);
            conn.page_scan_repetition_mode = page_scan_repetition_mode;
            conn.clock_offset = clock_offset;
            return Ok(());
        }
        let Some(slot) = self.registry.find_empty() else {
            // Registry full: new candidates are dropped, never evicted.
            debug!(%addr, "no free slot, dropping inquiry result");
            return Ok(());
        };
        info!(slot, %addr, "inquiry result, opening channels");
        let conn = self.registry.get_mut(slot);
        conn.addr = Some(addr);
        conn.page_scan_repetition_mode = page_scan_repetition_mode;
        conn.clock_offset = clock_offset;
        conn.state = ConnectionState::Connecting;

        // Control first, interrupt second; the radio cares about the order.
        self.submit(RadioCommand::CreateChannel {
            addr,
            psm: PSM_HID_CONTROL,
        })?;
        self.submit(RadioCommand::CreateChannel {
            addr,
            psm: PSM_HID_INTERRUPT,
        })
    }

    fn on_inquiry_complete(&mut self, success: bool) -> Result<(), TransportError> {
        if self.state != RadioState::Discovering {
            return Ok(());
        }
        if !success {
            warn!("inquiry round failed");
        }
        if self.settings.restart_inquiry && self.inquiry_restarts < self.settings.max_inquiry_restarts
        {
            self.inquiry_restarts += 1;
            debug!(round = self.inquiry_restarts, "restarting inquiry");
            self.start_inquiry()
        } else {
            debug!("inquiry finished, going idle");
            self.state = RadioState::Idle;
            Ok(())
        }
    }

    fn on_incoming_connection(&mut self, addr: BdAddr, handle: u16) -> Result<(), TransportError> {
        if self.registry.find_by(Some(handle), Some(addr)).is_some() {
            trace!(%addr, "incoming connection for known device");
            return Ok(());
        }
        let Some(slot) = self.registry.find_empty() else {
            debug!(%addr, "no free slot for incoming connection");
            return Ok(());
        };
        info!(slot, %addr, handle, "incoming connection");
        let conn = self.registry.get_mut(slot);
        conn.addr = Some(addr);
        conn.handle = Some(handle);
        conn.state = ConnectionState::Connecting;

        // Accept must reach the radio before the channel creates behind it.
        self.submit(RadioCommand::AcceptConnection { addr })?;
        self.submit(RadioCommand::CreateChannel {
            addr,
            psm: PSM_HID_CONTROL,
        })?;
        self.submit(RadioCommand::CreateChannel {
            addr,
            psm: PSM_HID_INTERRUPT,
        })
    }

    fn on_channel_opened(
        &mut self,
        success: bool,
        addr: BdAddr,
        handle: u16,
        psm: u16,
        cid: u16,
    ) -> Result<(), TransportError> {
        let Some(slot) = self.registry.find_by(Some(handle), Some(addr)) else {
            trace!(%addr, handle, "channel opened for unknown connection");
            return Ok(());
        };
        if !success {
            warn!(slot, %addr, psm, "channel open failed, closing connection");
            return self.close_slot(slot);
        }
        let conn = self.registry.get_mut(slot);
        conn.handle = Some(handle);
        match psm {
            PSM_HID_CONTROL => conn.control_cid = Some(cid),
            PSM_HID_INTERRUPT => conn.interrupt_cid = Some(cid),
            other => {
                trace!(slot, psm = other, "channel on unexpected psm");
                return Ok(());
            }
        }
        if conn.control_cid.is_some() && conn.interrupt_cid.is_some() {
            debug!(slot, %addr, "both channels open, requesting name");
            let psrm = conn.page_scan_repetition_mode;
            let clock_offset = conn.clock_offset;
            self.submit(RadioCommand::RemoteNameRequest {
                addr,
                page_scan_repetition_mode: psrm,
                clock_offset,
            })?;
        }
        Ok(())
    }

    fn on_remote_name_complete(
        &mut self,
        success: bool,
        addr: BdAddr,
        name: &str,
    ) -> Result<(), TransportError> {
        let Some(slot) = self.registry.find_by(None, Some(addr)) else {
            trace!(%addr, "name reply for unknown connection");
            return Ok(());
        };
        if !success {
            warn!(slot, %addr, "remote name request failed, closing connection");
            return self.close_slot(slot);
        }
        let conn = self.registry.get(slot);
        let (Some(handle), Some(control_cid), Some(interrupt_cid)) =
            (conn.handle, conn.control_cid, conn.interrupt_cid)
        else {
            warn!(slot, "name reply before channels settled, closing");
            return self.close_slot(slot);
        };
        let raw = RawConnection {
            addr,
            handle,
            control_cid,
            interrupt_cid,
        };
        let Some(kind) = crate::pads::bind(name) else {
            info!(slot, %addr, name, "unrecognized device, dropping");
            return self.close_slot(slot);
        };
        match self.pads.bind_slot(slot, kind, raw, &mut self.transport) {
            Ok(()) => {
                self.registry.get_mut(slot).state = ConnectionState::Connected;
                info!(slot, name, "device connected");
                Ok(())
            }
            Err(e) => {
                warn!(slot, name, error = %e, "driver connect failed, closing");
                self.close_slot(slot)
            }
        }
    }

    fn close_slot(&mut self, slot: usize) -> Result<(), TransportError> {
        self.registry.close(slot, &mut self.queue, &mut self.pads);
        self.queue.drain(&mut self.transport)
    }

    /// Enqueue and immediately flush as far as credits allow.
    fn submit(&mut self, cmd: RadioCommand) -> Result<(), TransportError> {
        if let Err(e) = self.queue.enqueue(cmd) {
            // Overfilling the queue means the pacing logic is broken; there
            // is no protocol-level recovery for it.
            warn!(error = %e, "command dropped");
            return Ok(());
        }
        self.queue.drain(&mut self.transport)
    }

    // --- surface exposed to the surrounding system -----------------------

    /// Bind a driver for a connection established outside the discovery
    /// pipeline. Returns the assigned slot.
    pub fn bind_and_connect(&mut self, name: &str, raw: RawConnection) -> Option<usize> {
        self.pads.bind_and_connect(name, raw, &mut self.transport)
    }

    /// Tear down one slot at the caller's request.
    pub fn disconnect(&mut self, slot: usize) {
        if slot >= crate::domain::models::MAX_PADS {
            return;
        }
        self.registry.close(slot, &mut self.queue, &mut self.pads);
        if let Err(e) = self.queue.drain(&mut self.transport) {
            warn!(slot, error = %e, "flush after disconnect failed");
        }
    }

    /// Hand a raw data frame directly to a slot's driver.
    pub fn deliver_packet(&mut self, slot: usize, data: &[u8]) {
        self.pads.deliver_packet(slot, &mut self.transport, data);
    }

    pub fn rumble(&mut self, slot: usize, effect: RumbleEffect, strength: u8) -> bool {
        self.pads.rumble(slot, &mut self.transport, effect, strength)
    }

    pub fn read_buttons(&self, slot: usize) -> u32 {
        self.pads.read_buttons(slot)
    }

    pub fn read_axis(&self, slot: usize, index: usize) -> i16 {
        self.pads.read_axis(slot, index)
    }

    pub fn sink(&self) -> &SharedSink {
        self.pads.sink()
    }

    /// The local adapter address, once the radio has reported it.
    pub fn local_addr(&self) -> Option<BdAddr> {
        self.local_addr
    }

    /// Ask the radio to change power state. The ready/halting events drive
    /// the actual state transitions when the radio reports back.
    pub fn set_power(&mut self, on: bool) {
        if let Err(e) = self.submit(RadioCommand::SetPowerMode(on)) {
            warn!(error = %e, "power command failed");
        }
    }

    /// Halting teardown invoked by the service on shutdown.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.on_halting() {
            warn!(error = %e, "teardown flush failed");
        }
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[cfg(test)]
    pub(crate) fn pads(&self) -> &PadPort {
        &self.pads
    }

    #[cfg(test)]
    pub(crate) fn queue(&self) -> &CommandQueue {
        &self.queue
    }
}
