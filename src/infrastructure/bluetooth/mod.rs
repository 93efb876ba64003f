//! Bluetooth Module
//!
//! Discovery, pairing and connection management for wireless pads.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      RadioService                        │
//! │   (dedicated I/O thread - public API for the embedder)   │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │ RadioEvent
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                       RadioHost                          │
//! │  (discovery / channel bring-up / naming / PIN / routing) │
//! └───────┬──────────────────┬──────────────────┬───────────┘
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//! ┌──────────────┐  ┌──────────────────┐  ┌───────────────┐
//! │ CommandQueue │  │ ConnectionRegistry│ │   PadPort     │
//! │ credit-gated │  │  fixed slots,     │ │ bound drivers │
//! │    FIFO      │  │  (handle, addr)   │ │ + input sink  │
//! └──────────────┘  └──────────────────┘  └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`command`] - Outbound command variants and the credit-gated queue
//! - [`events`] - Typed inbound notifications from the transport
//! - [`transport`] - The opaque radio boundary trait
//! - [`registry`] - Fixed-capacity connection table
//! - [`host`] - The event-driven discovery and pairing controller
//! - [`service`] - I/O thread lifecycle and cross-thread surface

pub mod command;
pub mod events;
pub mod host;
pub mod registry;
pub mod service;
pub mod transport;

// Re-export the service for convenience
pub use service::RadioService;

/// L2CAP PSM of the HID control channel.
pub const PSM_HID_CONTROL: u16 = 0x11;

/// L2CAP PSM of the HID interrupt (data) channel.
pub const PSM_HID_INTERRUPT: u16 = 0x13;

/// General inquiry access code, in the byte order the radio expects.
pub const INQUIRY_LAP_GIAC: [u8; 3] = [0x33, 0x8b, 0x9e];

/// Disconnect reason code: remote user terminated the connection.
pub const REASON_REMOTE_TERMINATED: u8 = 0x13;
