//! Inbound Radio Events
//!
//! Everything the transport can tell the core, already decoded into typed
//! notifications. The transport's own event loop produces these; the core
//! consumes them on its I/O thread and never blocks waiting for one.

use crate::domain::models::BdAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// The radio finished powering up and can take commands.
    Ready,
    /// The radio is going down; every connection must be torn down.
    Halting,
    /// Command-status acknowledgment; grants queue credits.
    CommandStatus { credits: u8 },
    /// Command-complete acknowledgment; grants queue credits.
    CommandComplete { credits: u8 },
    /// Reply payload of a read-local-address command.
    LocalAddress(BdAddr),
    /// One discovered candidate. The page metadata must be captured for the
    /// later remote-name request.
    InquiryResult {
        addr: BdAddr,
        page_scan_repetition_mode: u8,
        clock_offset: u16,
    },
    /// The current inquiry round finished.
    InquiryComplete { success: bool },
    /// A device opened a connection towards us (press-to-sync pads do this).
    IncomingConnection { addr: BdAddr, handle: u16 },
    /// A logical channel finished opening, successfully or not. Carries both
    /// handle and address: outbound connects know the address first, inbound
    /// ones the handle, and registry lookup wildcards the missing one.
    ChannelOpened {
        success: bool,
        addr: BdAddr,
        handle: u16,
        psm: u16,
        cid: u16,
    },
    /// Result of a remote-name request.
    RemoteNameComplete {
        success: bool,
        addr: BdAddr,
        name: String,
    },
    /// The device is asking for a PIN; answered immediately, no user input.
    PinCodeRequest { addr: BdAddr },
    /// A link went down, whether we asked for it or not.
    DisconnectionComplete { handle: u16 },
    /// Raw payload received on an open channel.
    DataPacket { cid: u16, data: Vec<u8> },
}
