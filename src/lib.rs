//! Wireless game-controller pairing and connection.
//!
//! This crate discovers nearby Bluetooth HID pads, brings up their control
//! and interrupt channels, runs the per-device handshake (including
//! expansion-accessory detection and calibration) and routes decoded
//! button/axis state into a per-slot input sink for the rest of the input
//! system to poll.
//!
//! The radio itself is opaque: an embedder implements
//! [`RadioTransport`](infrastructure::bluetooth::transport::RadioTransport)
//! over the platform's stack and feeds decoded events back in through the
//! [`EventSender`](infrastructure::bluetooth::service::EventSender) returned
//! by [`RadioService::start`](infrastructure::bluetooth::service::RadioService::start).

pub mod domain;
pub mod infrastructure;
pub mod pads;

pub use domain::models::{BdAddr, PadSample, RumbleEffect, MAX_PADS};
pub use domain::settings::{Settings, SettingsService};
pub use infrastructure::bluetooth::command::{CommandQueue, QueueError, RadioCommand};
pub use infrastructure::bluetooth::events::RadioEvent;
pub use infrastructure::bluetooth::host::RadioHost;
pub use infrastructure::bluetooth::registry::{Connection, ConnectionRegistry, ConnectionState};
pub use infrastructure::bluetooth::service::{EventSender, RadioService};
pub use infrastructure::bluetooth::transport::{RadioTransport, TransportError};
pub use infrastructure::logging::init_logger;
pub use pads::sink::{InputStateSink, SharedSink};
pub use pads::{PadDriver, PadError, PadKind, PadLink, PadPort, RawConnection};
