//! Radio Service
//!
//! Owns the dedicated I/O thread everything in this subsystem runs on. The
//! transport's event loop feeds [`RadioEvent`]s in through an [`EventSender`];
//! control-plane requests (power, rumble, disconnect) arrive on the same
//! merged channel from arbitrary threads. Shutdown is acknowledged: `stop`
//! joins the thread before returning, so no event processing can race with
//! teardown. Input reads never cross the thread; they go through the shared
//! sink.

use crate::domain::models::RumbleEffect;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::events::RadioEvent;
use crate::infrastructure::bluetooth::host::RadioHost;
use crate::infrastructure::bluetooth::transport::RadioTransport;
use crate::pads::sink::{shared_sink, SharedSink};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

enum ServiceMessage {
    Radio(RadioEvent),
    Power(bool),
    Rumble {
        slot: usize,
        effect: RumbleEffect,
        strength: u8,
    },
    Disconnect {
        slot: usize,
    },
    Shutdown,
}

/// Cloneable handle the transport's event loop uses to deliver radio events.
#[derive(Clone)]
pub struct EventSender(mpsc::UnboundedSender<ServiceMessage>);

impl EventSender {
    pub fn send(&self, event: RadioEvent) {
        if self.0.send(ServiceMessage::Radio(event)).is_err() {
            warn!("radio event dropped, service is gone");
        }
    }
}

pub struct RadioService {
    tx: mpsc::UnboundedSender<ServiceMessage>,
    thread: Option<JoinHandle<()>>,
    sink: SharedSink,
}

impl RadioService {
    /// Spawn the I/O thread around a transport. Returns the service handle
    /// and the sender the transport event loop should deliver into.
    pub fn start<T: RadioTransport + 'static>(
        transport: T,
        settings: Settings,
    ) -> anyhow::Result<(Self, EventSender)> {
        let sink = shared_sink();
        let (tx, rx) = mpsc::unbounded_channel();
        let host = RadioHost::new(transport, settings, sink.clone());

        let thread = std::thread::Builder::new()
            .name("padlink-io".into())
            .spawn(move || run_loop(host, rx))?;

        let sender = EventSender(tx.clone());
        Ok((
            Self {
                tx,
                thread: Some(thread),
                sink,
            },
            sender,
        ))
    }

    /// Ask the radio to power up. The state machines start working once the
    /// transport reports ready.
    pub fn power_on(&self) {
        let _ = self.tx.send(ServiceMessage::Power(true));
    }

    pub fn power_off(&self) {
        let _ = self.tx.send(ServiceMessage::Power(false));
    }

    /// Request rumble on a slot. Returns false when the service is already
    /// gone; the driver-level result is not waited for.
    pub fn rumble(&self, slot: usize, effect: RumbleEffect, strength: u8) -> bool {
        self.tx
            .send(ServiceMessage::Rumble {
                slot,
                effect,
                strength,
            })
            .is_ok()
    }

    pub fn disconnect(&self, slot: usize) {
        let _ = self.tx.send(ServiceMessage::Disconnect { slot });
    }

    pub fn read_buttons(&self, slot: usize) -> u32 {
        self.sink.lock().map(|s| s.buttons(slot)).unwrap_or(0)
    }

    pub fn read_axis(&self, slot: usize, index: usize) -> i16 {
        self.sink.lock().map(|s| s.axis(slot, index)).unwrap_or(0)
    }

    pub fn sink(&self) -> SharedSink {
        self.sink.clone()
    }

    /// Stop the I/O thread and wait for it to acknowledge by exiting.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.tx.send(ServiceMessage::Shutdown);
            if thread.join().is_err() {
                error!("radio I/O thread panicked");
            }
        }
    }
}

impl Drop for RadioService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop<T: RadioTransport>(
    mut host: RadioHost<T>,
    mut rx: mpsc::UnboundedReceiver<ServiceMessage>,
) {
    info!("radio I/O thread running");
    while let Some(msg) = rx.blocking_recv() {
        match msg {
            ServiceMessage::Radio(event) => {
                if let Err(e) = host.handle_event(event) {
                    error!(error = %e, "transport failure while processing event");
                }
            }
            ServiceMessage::Power(on) => host.set_power(on),
            ServiceMessage::Rumble {
                slot,
                effect,
                strength,
            } => {
                host.rumble(slot, effect, strength);
            }
            ServiceMessage::Disconnect { slot } => host.disconnect(slot),
            ServiceMessage::Shutdown => break,
        }
    }
    host.shutdown();
    info!("radio I/O thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::command::RadioCommand;
    use crate::infrastructure::bluetooth::transport::TransportError;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Transport whose command log outlives the service thread.
    struct SharedTransport(Arc<Mutex<Vec<RadioCommand>>>);

    impl RadioTransport for SharedTransport {
        fn send_command(&mut self, cmd: &RadioCommand) -> Result<(), TransportError> {
            self.0.lock().unwrap().push(cmd.clone());
            Ok(())
        }

        fn send_channel_data(
            &mut self,
            _handle: u16,
            _cid: u16,
            _data: &[u8],
        ) -> Result<(), TransportError> {
            Ok(())
        }

        fn register_listener(&mut self, _psm: u16) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn wait_for(log: &Arc<Mutex<Vec<RadioCommand>>>, pred: impl Fn(&[RadioCommand]) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if pred(&log.lock().unwrap()) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("service did not issue the expected commands in time");
    }

    #[test]
    fn test_power_request_reaches_the_radio() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (service, _events) =
            RadioService::start(SharedTransport(log.clone()), Settings::default()).unwrap();

        service.power_on();
        wait_for(&log, |cmds| {
            cmds.iter()
                .any(|c| matches!(c, RadioCommand::SetPowerMode(true)))
        });
        service.stop();
    }

    #[test]
    fn test_ready_event_starts_discovery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (service, events) =
            RadioService::start(SharedTransport(log.clone()), Settings::default()).unwrap();

        events.send(RadioEvent::Ready);
        events.send(RadioEvent::CommandComplete { credits: 4 });
        wait_for(&log, |cmds| {
            cmds.iter()
                .any(|c| matches!(c, RadioCommand::StartInquiry { .. }))
        });

        assert_eq!(service.read_buttons(0), 0);
        service.stop();
    }

    #[test]
    fn test_stop_joins_and_sender_outlives_quietly() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (service, events) =
            RadioService::start(SharedTransport(log.clone()), Settings::default()).unwrap();
        service.stop();

        // Late events after shutdown are dropped, not a panic.
        events.send(RadioEvent::Ready);
    }
}
