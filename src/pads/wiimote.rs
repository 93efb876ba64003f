//! Wiimote Driver
//!
//! Per-device initialization and steady-state input reporting, including the
//! nested expansion-controller sub-protocol: detect an attached accessory,
//! identify it, read its calibration block, then switch the pad into
//! button+expansion reporting. Transitions are driven entirely by inbound
//! reports; waiting is a state, never a blocking call. The machine tolerates
//! duplicate reports and mid-session attach/detach without disturbing the
//! slot's LED assignment.

use crate::domain::models::{hat, PadSample};
use crate::pads::{PadDriver, PadError, PadLink};
use tracing::{debug, info, trace, warn};

// Output report ids.
const RPT_RUMBLE: u8 = 0x10;
const RPT_LEDS: u8 = 0x11;
const RPT_REPORTING_MODE: u8 = 0x12;
const RPT_STATUS_REQUEST: u8 = 0x15;
const RPT_WRITE_MEMORY: u8 = 0x16;
const RPT_READ_MEMORY: u8 = 0x17;

// Input report ids.
const RPT_STATUS: u8 = 0x20;
const RPT_READ_REPLY: u8 = 0x21;
const RPT_BUTTONS: u8 = 0x30;
const RPT_BUTTONS_EXT: u8 = 0x32;

// Reporting modes requested in steady state.
const MODE_BUTTONS: u8 = 0x30;
const MODE_BUTTONS_EXT: u8 = 0x32;

/// HID transaction prefix on inbound data frames.
const HID_INPUT_PREFIX: u8 = 0xa1;

/// Status report flag: an expansion is plugged into the pad.
const STATUS_FLAG_EXPANSION: u8 = 0x02;

// Expansion register block. Writing 0x55 then 0x00 below enables the
// accessory in unencrypted mode; the id and calibration are then readable.
const EXT_ENABLE_ADDR_1: u32 = 0x04a4_00f0;
const EXT_ENABLE_VALUE_1: u8 = 0x55;
const EXT_ENABLE_ADDR_2: u32 = 0x04a4_00fb;
const EXT_ENABLE_VALUE_2: u8 = 0x00;
const EXT_ID_ADDR: u32 = 0x04a4_00fc;
const EXT_ID_LEN: u16 = 4;
const EXT_CAL_ADDR: u32 = 0x04a4_0020;
const EXT_CAL_LEN: u16 = 16;

/// Identifier of the classic controller accessory.
const CLASSIC_ID: [u8; 4] = [0xa4, 0x20, 0x01, 0x01];

/// All decodable core buttons. The wire representation is active-low, so
/// decoding is a bitwise NOT masked by this.
pub const CORE_BUTTON_MASK: u16 = 0x1f9f;

/// All decodable classic-controller buttons, same active-low convention.
pub const CLASSIC_BUTTON_MASK: u16 = 0xfeff;

// Classic d-pad bits within the decoded 16-bit expansion button word.
const CLASSIC_DPAD_RIGHT: u16 = 0x8000;
const CLASSIC_DPAD_DOWN: u16 = 0x4000;
const CLASSIC_DPAD_LEFT: u16 = 0x0002;
const CLASSIC_DPAD_UP: u16 = 0x0001;

/// LED pattern per slot; slots past the table get no distinguishing LED.
const LED_PATTERNS: [u8; 4] = [0x10, 0x20, 0x40, 0x80];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    #[default]
    Uninitialized,
    /// A status request is out; the next status report decides the path.
    AwaitingStatus,
    /// Presence known, nothing usable attached; steady reporting requested
    /// but the first input frame has not arrived yet.
    NoExpansion,
    /// Expansion enabled; waiting for the identifier read-back.
    AwaitingExpansionId,
    /// Expansion identified; waiting for the calibration block.
    AwaitingCalibration,
    SteadyButtons,
    SteadyButtonsExpansion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionType {
    ClassicController,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisCalibration {
    pub min: u8,
    pub center: u8,
    pub max: u8,
}

/// Per-axis min/center/max for the expansion sticks: left X/Y (6-bit),
/// right X/Y (5-bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickCalibration {
    pub axes: [AxisCalibration; 4],
}

impl Default for StickCalibration {
    fn default() -> Self {
        let left = AxisCalibration {
            min: 0,
            center: 32,
            max: 63,
        };
        let right = AxisCalibration {
            min: 0,
            center: 16,
            max: 31,
        };
        Self {
            axes: [left, left, right, right],
        }
    }
}

impl StickCalibration {
    /// Parse the 16-byte calibration block: (max, min, center) triplets for
    /// each of the four axes. An all-0xFF block is the factory "unset"
    /// sentinel; a degenerate axis also falls back to defaults.
    pub fn parse(block: &[u8]) -> Self {
        if block.len() < 12 || block.iter().all(|&b| b == 0xff) {
            return Self::default();
        }
        let axis = |i: usize| AxisCalibration {
            max: block[i * 3],
            min: block[i * 3 + 1],
            center: block[i * 3 + 2],
        };
        let parsed = Self {
            axes: [axis(0), axis(1), axis(2), axis(3)],
        };
        if parsed
            .axes
            .iter()
            .any(|a| a.max <= a.min || a.center < a.min || a.center > a.max)
        {
            return Self::default();
        }
        parsed
    }
}

/// Normalize a raw stick value against its own half-ranges: the center maps
/// to exactly zero, min/max saturate to the signed 16-bit limits.
pub fn normalize_axis(raw: u8, cal: AxisCalibration) -> i16 {
    let raw = i32::from(raw);
    let center = i32::from(cal.center);
    let span = if raw >= center {
        i32::from(cal.max) - center
    } else {
        center - i32::from(cal.min)
    };
    if span <= 0 {
        return 0;
    }
    let frac = (raw - center) as f32 / span as f32;
    (frac.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

/// What one transition wants done: outbound report payloads and at most one
/// sink write. The caller applies them; the state machine never touches the
/// transport itself.
enum Effect {
    Report(Vec<u8>),
    Sample(PadSample),
}

pub struct WiimoteDriver {
    slot: usize,
    state: HandshakeState,
    /// Attachment presence as last reported by the device.
    expansion_attached: bool,
    /// Identified accessory, once the id read-back matched.
    expansion: Option<ExpansionType>,
    calibration: StickCalibration,
    /// The LED assignment is issued exactly once per connection, surviving
    /// any re-entry into the status poll.
    leds_assigned: bool,
    rumble_on: bool,
}

impl WiimoteDriver {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            state: HandshakeState::Uninitialized,
            expansion_attached: false,
            expansion: None,
            calibration: StickCalibration::default(),
            leds_assigned: false,
            rumble_on: false,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn expansion(&self) -> Option<ExpansionType> {
        self.expansion
    }

    fn rumble_bit(&self) -> u8 {
        self.rumble_on as u8
    }

    fn report_leds(&self, leds: u8) -> Vec<u8> {
        vec![RPT_LEDS, leds | self.rumble_bit()]
    }

    fn report_status_request(&self) -> Vec<u8> {
        vec![RPT_STATUS_REQUEST, self.rumble_bit()]
    }

    fn report_mode(&self, mode: u8) -> Vec<u8> {
        vec![RPT_REPORTING_MODE, self.rumble_bit(), mode]
    }

    fn report_write_memory(&self, addr: u32, data: &[u8]) -> Vec<u8> {
        let mut out = vec![
            RPT_WRITE_MEMORY,
            ((addr >> 24) as u8 & 0xfe) | self.rumble_bit(),
            (addr >> 16) as u8,
            (addr >> 8) as u8,
            addr as u8,
            data.len() as u8,
        ];
        let mut block = [0u8; 16];
        block[..data.len()].copy_from_slice(data);
        out.extend_from_slice(&block);
        out
    }

    fn report_read_memory(&self, addr: u32, len: u16) -> Vec<u8> {
        vec![
            RPT_READ_MEMORY,
            ((addr >> 24) as u8 & 0xfe) | self.rumble_bit(),
            (addr >> 16) as u8,
            (addr >> 8) as u8,
            addr as u8,
            (len >> 8) as u8,
            len as u8,
        ]
    }

    /// Entry step: clear the LEDs and ask for a status report.
    fn begin(&mut self) -> Vec<Effect> {
        self.state = HandshakeState::AwaitingStatus;
        vec![
            Effect::Report(self.report_leds(0x00)),
            Effect::Report(self.report_status_request()),
        ]
    }

    /// One transition of the handshake machine for an inbound report
    /// payload (transaction prefix already stripped).
    fn advance(&mut self, payload: &[u8]) -> Vec<Effect> {
        match payload.first() {
            Some(&RPT_STATUS) => self.on_status(payload),
            Some(&RPT_READ_REPLY) => self.on_read_reply(payload),
            Some(&RPT_BUTTONS) | Some(&RPT_BUTTONS_EXT) => self.on_buttons(payload),
            Some(&id) => {
                trace!(slot = self.slot, report = id, "ignoring unhandled report");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Status reports re-evaluate attachment presence from any state.
    fn on_status(&mut self, payload: &[u8]) -> Vec<Effect> {
        if payload.len() < 4 {
            warn!(slot = self.slot, "short status report");
            return Vec::new();
        }
        let attached = payload[3] & STATUS_FLAG_EXPANSION != 0;
        let mut fx = Vec::new();

        match (attached, self.expansion_attached) {
            (true, false) => {
                debug!(slot = self.slot, "expansion attached, enabling");
                self.expansion_attached = true;
                fx.push(Effect::Report(
                    self.report_write_memory(EXT_ENABLE_ADDR_1, &[EXT_ENABLE_VALUE_1]),
                ));
                fx.push(Effect::Report(
                    self.report_write_memory(EXT_ENABLE_ADDR_2, &[EXT_ENABLE_VALUE_2]),
                ));
                fx.push(Effect::Report(self.report_read_memory(EXT_ID_ADDR, EXT_ID_LEN)));
                self.state = HandshakeState::AwaitingExpansionId;
            }
            (false, true) => {
                debug!(slot = self.slot, "expansion detached");
                self.expansion_attached = false;
                self.expansion = None;
                self.calibration = StickCalibration::default();
                fx.push(Effect::Report(self.report_status_request()));
                self.state = HandshakeState::AwaitingStatus;
            }
            _ => {
                // Presence unchanged. A duplicate while the expansion
                // sub-protocol is still in flight must not restart it.
                if matches!(
                    self.state,
                    HandshakeState::AwaitingExpansionId | HandshakeState::AwaitingCalibration
                ) {
                    trace!(slot = self.slot, "duplicate status mid-handshake");
                } else {
                    self.enter_steady(self.expansion.is_some(), &mut fx);
                }
            }
        }
        fx
    }

    fn on_read_reply(&mut self, payload: &[u8]) -> Vec<Effect> {
        if payload.len() < 7 {
            warn!(slot = self.slot, "short memory-read reply");
            return Vec::new();
        }
        let error = payload[3] & 0x0f;
        let data = &payload[6..];
        let mut fx = Vec::new();

        match self.state {
            HandshakeState::AwaitingExpansionId => {
                if error == 0 && data.len() >= 4 && data[..4] == CLASSIC_ID {
                    debug!(slot = self.slot, "classic controller identified");
                    fx.push(Effect::Report(
                        self.report_read_memory(EXT_CAL_ADDR, EXT_CAL_LEN),
                    ));
                    self.state = HandshakeState::AwaitingCalibration;
                } else {
                    // Unknown accessory: run without it rather than stall.
                    debug!(slot = self.slot, "unrecognized expansion id, ignoring accessory");
                    self.expansion = None;
                    fx.push(Effect::Report(self.report_mode(MODE_BUTTONS)));
                    self.state = HandshakeState::NoExpansion;
                }
            }
            HandshakeState::AwaitingCalibration => {
                self.calibration = if error == 0 {
                    StickCalibration::parse(data)
                } else {
                    StickCalibration::default()
                };
                self.expansion = Some(ExpansionType::ClassicController);
                self.enter_steady(true, &mut fx);
            }
            _ => {
                trace!(slot = self.slot, "unexpected memory-read reply");
            }
        }
        fx
    }

    fn on_buttons(&mut self, payload: &[u8]) -> Vec<Effect> {
        match self.state {
            HandshakeState::NoExpansion => {
                // First input frame after the no-expansion fallback.
                let mut fx = Vec::new();
                self.assign_leds(&mut fx);
                self.state = HandshakeState::SteadyButtons;
                self.decode(payload, &mut fx);
                return fx;
            }
            HandshakeState::SteadyButtons | HandshakeState::SteadyButtonsExpansion => {}
            _ => return Vec::new(),
        }
        let mut fx = Vec::new();
        self.decode(payload, &mut fx);
        fx
    }

    fn decode(&self, payload: &[u8], fx: &mut Vec<Effect>) {
        if payload.len() < 3 {
            return;
        }
        let raw = u16::from_be_bytes([payload[1], payload[2]]);
        let mut sample = PadSample {
            buttons: u32::from(!raw & CORE_BUTTON_MASK),
            ..Default::default()
        };

        if self.state == HandshakeState::SteadyButtonsExpansion
            && payload[0] == RPT_BUTTONS_EXT
            && payload.len() >= 9
        {
            self.decode_classic(&payload[3..9], &mut sample);
        }
        fx.push(Effect::Sample(sample));
    }

    /// Decode the 6-byte classic-controller block: packed sticks plus two
    /// active-low button bytes.
    fn decode_classic(&self, ext: &[u8], sample: &mut PadSample) {
        let lx = ext[0] & 0x3f;
        let ly = ext[1] & 0x3f;
        let rx = ((ext[0] & 0xc0) >> 3) | ((ext[1] & 0xc0) >> 5) | ((ext[2] & 0x80) >> 7);
        let ry = ext[2] & 0x1f;

        let raw = u16::from_be_bytes([ext[4], ext[5]]);
        let pressed = !raw & CLASSIC_BUTTON_MASK;
        sample.buttons |= u32::from(pressed) << 16;

        sample.axes = [
            normalize_axis(lx, self.calibration.axes[0]),
            normalize_axis(ly, self.calibration.axes[1]),
            normalize_axis(rx, self.calibration.axes[2]),
            normalize_axis(ry, self.calibration.axes[3]),
        ];

        if pressed & CLASSIC_DPAD_UP != 0 {
            sample.hat |= hat::UP;
        }
        if pressed & CLASSIC_DPAD_DOWN != 0 {
            sample.hat |= hat::DOWN;
        }
        if pressed & CLASSIC_DPAD_LEFT != 0 {
            sample.hat |= hat::LEFT;
        }
        if pressed & CLASSIC_DPAD_RIGHT != 0 {
            sample.hat |= hat::RIGHT;
        }
    }

    /// Enter a steady state: LED assignment once per connection, then the
    /// matching reporting-mode request.
    fn enter_steady(&mut self, with_expansion: bool, fx: &mut Vec<Effect>) {
        self.assign_leds(fx);
        let mode = if with_expansion {
            MODE_BUTTONS_EXT
        } else {
            MODE_BUTTONS
        };
        fx.push(Effect::Report(self.report_mode(mode)));
        self.state = if with_expansion {
            HandshakeState::SteadyButtonsExpansion
        } else {
            HandshakeState::SteadyButtons
        };
    }

    fn assign_leds(&mut self, fx: &mut Vec<Effect>) {
        if self.leds_assigned {
            return;
        }
        self.leds_assigned = true;
        if let Some(&pattern) = LED_PATTERNS.get(self.slot) {
            fx.push(Effect::Report(self.report_leds(pattern)));
        }
    }

    fn apply(&self, effects: Vec<Effect>, link: &mut PadLink<'_>) -> Result<(), PadError> {
        for effect in effects {
            match effect {
                Effect::Report(payload) => link.send_report(&payload)?,
                Effect::Sample(sample) => link.write_sink(sample),
            }
        }
        Ok(())
    }
}

impl PadDriver for WiimoteDriver {
    fn connect(&mut self, mut link: PadLink<'_>) -> Result<(), PadError> {
        info!(slot = self.slot, "starting wiimote handshake");
        let fx = self.begin();
        self.apply(fx, &mut link)
    }

    fn disconnect(&mut self) {
        debug!(slot = self.slot, "wiimote driver torn down");
        self.state = HandshakeState::Uninitialized;
    }

    fn handle_packet(&mut self, mut link: PadLink<'_>, data: &[u8]) {
        if data.len() < 2 || data[0] != HID_INPUT_PREFIX {
            trace!(slot = self.slot, "dropping non-input frame");
            return;
        }
        let fx = self.advance(&data[1..]);
        if let Err(e) = self.apply(fx, &mut link) {
            warn!(slot = self.slot, error = %e, "failed to apply handshake effects");
        }
    }

    fn set_rumble(
        &mut self,
        mut link: PadLink<'_>,
        _effect: crate::domain::models::RumbleEffect,
        strength: u8,
    ) -> bool {
        self.rumble_on = strength > 0;
        link.send_report(&[RPT_RUMBLE, self.rumble_bit()]).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RumbleEffect;
    use crate::infrastructure::bluetooth::transport::testing::MockTransport;
    use crate::pads::sink::{shared_sink, SharedSink};

    fn link<'a>(transport: &'a mut MockTransport, sink: &'a SharedSink) -> PadLink<'a> {
        PadLink {
            transport,
            handle: 0x0b,
            interrupt_cid: 0x41,
            sink,
            slot: 0,
        }
    }

    fn status_frame(attached: bool) -> Vec<u8> {
        let flags = if attached { STATUS_FLAG_EXPANSION } else { 0x00 };
        vec![0xa1, RPT_STATUS, 0xff, 0xff, flags, 0x00, 0x00, 0x50]
    }

    fn read_reply_frame(addr_lo: u16, data: &[u8]) -> Vec<u8> {
        let mut frame = vec![
            0xa1,
            RPT_READ_REPLY,
            0xff,
            0xff,
            ((data.len() as u8 - 1) << 4),
            (addr_lo >> 8) as u8,
            addr_lo as u8,
        ];
        frame.extend_from_slice(data);
        frame
    }

    fn buttons_frame(b0: u8, b1: u8) -> Vec<u8> {
        vec![0xa1, RPT_BUTTONS, b0, b1]
    }

    fn buttons_ext_frame(b0: u8, b1: u8, ext: [u8; 6]) -> Vec<u8> {
        let mut frame = vec![0xa1, RPT_BUTTONS_EXT, b0, b1];
        frame.extend_from_slice(&ext);
        frame.extend_from_slice(&[0x00, 0x00]); // pad to 8 expansion bytes
        frame
    }

    fn connected_driver(transport: &mut MockTransport, sink: &SharedSink) -> WiimoteDriver {
        let mut driver = WiimoteDriver::new(0);
        driver.connect(link(transport, sink)).unwrap();
        driver
    }

    /// Calibration block matching the documented round-trip: min 5,
    /// center 32, max 55 on every axis.
    fn test_calibration_block() -> Vec<u8> {
        let mut block = Vec::new();
        for _ in 0..4 {
            block.extend_from_slice(&[55, 5, 32]); // max, min, center
        }
        block.extend_from_slice(&[0x00; 4]);
        block
    }

    #[test]
    fn test_connect_clears_leds_and_requests_status() {
        let mut transport = MockTransport::new();
        let sink = shared_sink();
        let driver = connected_driver(&mut transport, &sink);

        assert_eq!(driver.state(), HandshakeState::AwaitingStatus);
        let reports = transport.reports();
        assert_eq!(reports[0], vec![RPT_LEDS, 0x00]);
        assert_eq!(reports[1], vec![RPT_STATUS_REQUEST, 0x00]);
    }

    #[test]
    fn test_status_without_expansion_goes_steady_with_led() {
        let mut transport = MockTransport::new();
        let sink = shared_sink();
        let mut driver = connected_driver(&mut transport, &sink);

        driver.handle_packet(link(&mut transport, &sink), &status_frame(false));

        assert_eq!(driver.state(), HandshakeState::SteadyButtons);
        let reports = transport.reports();
        // Slot 0's LED pattern, then the buttons-only reporting request.
        assert!(reports.contains(&vec![RPT_LEDS, 0x10]));
        assert!(reports.contains(&vec![RPT_REPORTING_MODE, 0x00, MODE_BUTTONS]));
    }

    #[test]
    fn test_expansion_path_reaches_steady_with_expansion() {
        let mut transport = MockTransport::new();
        let sink = shared_sink();
        let mut driver = connected_driver(&mut transport, &sink);

        driver.handle_packet(link(&mut transport, &sink), &status_frame(true));
        assert_eq!(driver.state(), HandshakeState::AwaitingExpansionId);
        {
            let reports = transport.reports();
            // Two-step enable, then the id read.
            assert_eq!(reports[2][0], RPT_WRITE_MEMORY);
            assert_eq!(reports[2][6], EXT_ENABLE_VALUE_1);
            assert_eq!(reports[3][0], RPT_WRITE_MEMORY);
            assert_eq!(reports[4][0], RPT_READ_MEMORY);
        }

        driver.handle_packet(
            link(&mut transport, &sink),
            &read_reply_frame(0x00fc, &CLASSIC_ID),
        );
        assert_eq!(driver.state(), HandshakeState::AwaitingCalibration);

        driver.handle_packet(
            link(&mut transport, &sink),
            &read_reply_frame(0x0020, &test_calibration_block()),
        );
        assert_eq!(driver.state(), HandshakeState::SteadyButtonsExpansion);
        assert_eq!(driver.expansion(), Some(ExpansionType::ClassicController));
        let reports = transport.reports();
        assert!(reports.contains(&vec![RPT_REPORTING_MODE, 0x00, MODE_BUTTONS_EXT]));
        assert!(reports.contains(&vec![RPT_LEDS, 0x10]));
    }

    #[test]
    fn test_duplicate_status_mid_handshake_is_idempotent() {
        let mut transport = MockTransport::new();
        let sink = shared_sink();
        let mut driver = connected_driver(&mut transport, &sink);

        driver.handle_packet(link(&mut transport, &sink), &status_frame(true));
        let sent = transport.reports().len();

        // Same status again before the id reply: no new side effects, same
        // state.
        driver.handle_packet(link(&mut transport, &sink), &status_frame(true));
        assert_eq!(driver.state(), HandshakeState::AwaitingExpansionId);
        assert_eq!(transport.reports().len(), sent);
    }

    #[test]
    fn test_led_assigned_only_once() {
        let mut transport = MockTransport::new();
        let sink = shared_sink();
        let mut driver = connected_driver(&mut transport, &sink);

        driver.handle_packet(link(&mut transport, &sink), &status_frame(false));
        // A later status report mid-steady re-evaluates presence but must
        // not repeat the LED command.
        driver.handle_packet(link(&mut transport, &sink), &status_frame(false));
        assert_eq!(driver.state(), HandshakeState::SteadyButtons);

        let led_commands = transport
            .reports()
            .iter()
            .filter(|r| r[0] == RPT_LEDS && r[1] == 0x10)
            .count();
        assert_eq!(led_commands, 1);
    }

    #[test]
    fn test_unrecognized_expansion_falls_back_to_buttons() {
        let mut transport = MockTransport::new();
        let sink = shared_sink();
        let mut driver = connected_driver(&mut transport, &sink);

        driver.handle_packet(link(&mut transport, &sink), &status_frame(true));
        driver.handle_packet(
            link(&mut transport, &sink),
            &read_reply_frame(0x00fc, &[0xde, 0xad, 0xbe, 0xef]),
        );

        assert_eq!(driver.state(), HandshakeState::NoExpansion);
        assert_eq!(driver.expansion(), None);
        assert!(transport
            .reports()
            .contains(&vec![RPT_REPORTING_MODE, 0x00, MODE_BUTTONS]));

        // The first input frame completes the steady transition and assigns
        // the LED.
        driver.handle_packet(link(&mut transport, &sink), &buttons_frame(0xff, 0xff));
        assert_eq!(driver.state(), HandshakeState::SteadyButtons);
        assert!(transport.reports().contains(&vec![RPT_LEDS, 0x10]));
    }

    #[test]
    fn test_detach_reenters_status_poll_without_touching_leds() {
        let mut transport = MockTransport::new();
        let sink = shared_sink();
        let mut driver = connected_driver(&mut transport, &sink);

        driver.handle_packet(link(&mut transport, &sink), &status_frame(true));
        driver.handle_packet(
            link(&mut transport, &sink),
            &read_reply_frame(0x00fc, &CLASSIC_ID),
        );
        driver.handle_packet(
            link(&mut transport, &sink),
            &read_reply_frame(0x0020, &test_calibration_block()),
        );
        assert_eq!(driver.state(), HandshakeState::SteadyButtonsExpansion);

        // Expansion unplugged mid-session.
        driver.handle_packet(link(&mut transport, &sink), &status_frame(false));
        assert_eq!(driver.state(), HandshakeState::AwaitingStatus);
        assert_eq!(driver.expansion(), None);

        // The follow-up status settles into buttons-only steady state with
        // no second LED assignment.
        driver.handle_packet(link(&mut transport, &sink), &status_frame(false));
        assert_eq!(driver.state(), HandshakeState::SteadyButtons);
        let led_commands = transport
            .reports()
            .iter()
            .filter(|r| r[0] == RPT_LEDS && r[1] == 0x10)
            .count();
        assert_eq!(led_commands, 1);
    }

    #[test]
    fn test_axis_normalization_roundtrip() {
        let cal = AxisCalibration {
            min: 5,
            center: 32,
            max: 55,
        };
        assert_eq!(normalize_axis(32, cal), 0);
        assert_eq!(normalize_axis(55, cal), i16::MAX);
        assert_eq!(normalize_axis(5, cal), -i16::MAX);
        assert!(normalize_axis(40, cal) > 0);
        assert!(normalize_axis(20, cal) < 0);
        // Out-of-range raws saturate instead of overflowing.
        assert_eq!(normalize_axis(60, cal), i16::MAX);
        assert_eq!(normalize_axis(0, cal), -i16::MAX);
    }

    #[test]
    fn test_sentinel_calibration_falls_back_to_defaults() {
        assert_eq!(StickCalibration::parse(&[0xff; 16]), StickCalibration::default());
        // Degenerate axis spans also fall back.
        let mut block = test_calibration_block();
        block[0] = 5; // max == min on the first axis
        assert_eq!(StickCalibration::parse(&block), StickCalibration::default());
    }

    #[test]
    fn test_buttons_decode_is_active_low() {
        let mut transport = MockTransport::new();
        let sink = shared_sink();
        let mut driver = connected_driver(&mut transport, &sink);
        driver.handle_packet(link(&mut transport, &sink), &status_frame(false));

        // All wire bits high: nothing pressed.
        driver.handle_packet(link(&mut transport, &sink), &buttons_frame(0xff, 0xff));
        assert_eq!(sink.lock().unwrap().buttons(0), 0);

        // All wire bits low: every decodable button pressed.
        driver.handle_packet(link(&mut transport, &sink), &buttons_frame(0x00, 0x00));
        assert_eq!(sink.lock().unwrap().buttons(0), u32::from(CORE_BUTTON_MASK));
    }

    #[test]
    fn test_classic_sticks_decode_through_calibration() {
        let mut transport = MockTransport::new();
        let sink = shared_sink();
        let mut driver = connected_driver(&mut transport, &sink);

        driver.handle_packet(link(&mut transport, &sink), &status_frame(true));
        driver.handle_packet(
            link(&mut transport, &sink),
            &read_reply_frame(0x00fc, &CLASSIC_ID),
        );
        driver.handle_packet(
            link(&mut transport, &sink),
            &read_reply_frame(0x0020, &test_calibration_block()),
        );

        // Left stick at the calibrated center, everything released.
        let ext = [32, 32, 0x90, 0x00, 0xff, 0xff];
        driver.handle_packet(
            link(&mut transport, &sink),
            &buttons_ext_frame(0xff, 0xff, ext),
        );

        let sample = sink.lock().unwrap().sample(0);
        assert_eq!(sample.axes[0], 0);
        assert_eq!(sample.axes[1], 0);
        assert_eq!(sample.buttons, 0);
        assert_eq!(sample.hat, 0);
    }

    #[test]
    fn test_classic_dpad_sets_hat_bits() {
        let mut transport = MockTransport::new();
        let sink = shared_sink();
        let mut driver = connected_driver(&mut transport, &sink);

        driver.handle_packet(link(&mut transport, &sink), &status_frame(true));
        driver.handle_packet(
            link(&mut transport, &sink),
            &read_reply_frame(0x00fc, &CLASSIC_ID),
        );
        driver.handle_packet(
            link(&mut transport, &sink),
            &read_reply_frame(0x0020, &test_calibration_block()),
        );

        // D-pad up is byte 5 bit 0, active low.
        let ext = [32, 32, 0x90, 0x00, 0xff, 0xfe];
        driver.handle_packet(
            link(&mut transport, &sink),
            &buttons_ext_frame(0xff, 0xff, ext),
        );

        let sample = sink.lock().unwrap().sample(0);
        assert_eq!(sample.hat & hat::UP, hat::UP);
        assert_ne!(sample.buttons, 0);
    }

    #[test]
    fn test_rumble_bit_rides_every_report() {
        let mut transport = MockTransport::new();
        let sink = shared_sink();
        let mut driver = connected_driver(&mut transport, &sink);

        assert!(driver.set_rumble(link(&mut transport, &sink), RumbleEffect::Strong, 0xff));
        let reports = transport.reports();
        assert_eq!(reports.last().unwrap(), &vec![RPT_RUMBLE, 0x01]);

        // Subsequent reports carry the rumble bit in their first payload
        // byte.
        driver.handle_packet(link(&mut transport, &sink), &status_frame(false));
        let reports = transport.reports();
        let mode = reports.iter().find(|r| r[0] == RPT_REPORTING_MODE).unwrap();
        assert_eq!(mode[1], 0x01);
    }
}
