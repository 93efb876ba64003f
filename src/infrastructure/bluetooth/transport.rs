//! Radio Transport Boundary
//!
//! The core never touches HCI or L2CAP plumbing directly. An embedder
//! implements [`RadioTransport`] over whatever radio stack the platform
//! provides and feeds decoded [`RadioEvent`]s back in through the service's
//! event sender.

use crate::infrastructure::bluetooth::command::RadioCommand;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("radio transport rejected the operation: {0}")]
    Rejected(String),
    #[error("radio transport is unavailable")]
    Unavailable,
}

/// The opaque command side of the radio.
pub trait RadioTransport: Send {
    /// Issue one radio command. Called only by the command queue, which
    /// paces issuance with transport credits.
    fn send_command(&mut self, cmd: &RadioCommand) -> Result<(), TransportError>;

    /// Write a data frame to an open channel on a link.
    fn send_channel_data(&mut self, handle: u16, cid: u16, data: &[u8])
        -> Result<(), TransportError>;

    /// (Re)register an inbound listener for a PSM. Done on every radio-ready
    /// so device-initiated channels find their way in after a power cycle.
    fn register_listener(&mut self, psm: u16) -> Result<(), TransportError>;
}
