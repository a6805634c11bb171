//! Startech single-output KVM protocol
//!
//! Developed against an SV431DVIUDDM 4-port KVM. The device has one physical
//! output and no status query; everything we learn about it arrives
//! unsolicited. It replies `ERROR` to anything it does not understand, which
//! doubles as our liveness handshake: a deliberately invalid command is sent
//! at start and the first `ERROR` back proves the right device is on the
//! other end of the cable. It prints a firmware banner when it boots and a
//! `CH<n>` line whenever the active channel changes (including front-panel
//! button presses).

use crate::error::ParseError;

/// Deliberately invalid command sent at start to provoke the first `ERROR`
pub const BOOTSTRAP_PROBE: &str = "HI!";

/// Marker identifying the firmware banner line
const VERSION_MARKER: &str = "F/W Version";

/// Compose the channel-select command for an input name
pub fn select_command(input: &str) -> String {
    format!("CH{input}")
}

/// Lifecycle phase of the KVM connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KvmPhase {
    /// Probe sent, waiting for the handshake `ERROR`
    #[default]
    Initializing,
    /// Handshake complete; the device is live
    Running,
}

/// Events surfaced to the driver while lines are consumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvmEvent {
    /// The handshake `ERROR` arrived; the device is operational
    HandshakeComplete,
    /// An `ERROR` after the handshake, or an unparseable channel report
    Fault {
        /// What the device printed
        message: String,
    },
    /// The boot banner identified the device
    NameIdentified {
        /// Display name, e.g. "Startech.com SV431DVIUDDM H2K B4.1"
        name: String,
    },
    /// The active channel changed
    ChannelChanged {
        /// 1-based channel number
        channel: u8,
    },
}

/// Streaming state machine for Startech KVM console output
#[derive(Debug, Default)]
pub struct KvmState {
    phase: KvmPhase,
    display_name: Option<String>,
    active_channel: Option<u8>,
}

impl KvmState {
    /// Create a state machine in the initializing phase
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> KvmPhase {
        self.phase
    }

    /// Display name once the boot banner has been seen
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Currently selected channel, if the device has reported one
    pub fn active_channel(&self) -> Option<u8> {
        self.active_channel
    }

    /// Consume one reassembled line of device output
    pub fn process_line(&mut self, raw: &str) -> Option<KvmEvent> {
        let msg = raw.trim();

        if msg == "ERROR" {
            if self.phase == KvmPhase::Initializing {
                // The probe did its job: the device answered.
                self.phase = KvmPhase::Running;
                return Some(KvmEvent::HandshakeComplete);
            }
            return Some(KvmEvent::Fault {
                message: msg.to_string(),
            });
        }

        if msg.contains(VERSION_MARKER) {
            return self.read_banner(msg);
        }

        if msg.len() == 3 && msg.starts_with("CH") {
            return match parse_channel(&msg[2..]) {
                Ok(channel) => {
                    self.active_channel = Some(channel);
                    Some(KvmEvent::ChannelChanged { channel })
                }
                Err(err) => Some(KvmEvent::Fault {
                    message: err.to_string(),
                }),
            };
        }

        None
    }

    /// Parse the boot banner, e.g. `SV431DVIUDDM F/W Version :H2K B4.1`
    ///
    /// The banner is the only time the device identifies itself, and only the
    /// exact 5-token shape is trusted.
    fn read_banner(&mut self, msg: &str) -> Option<KvmEvent> {
        let fields: Vec<&str> = msg.split_whitespace().collect();
        if fields.len() != 5 {
            return None;
        }

        let model = fields[0];
        let version = fields[3..].join(" ").replacen(':', "", 1);
        let name = format!("Startech.com {model} {version}");
        self.display_name = Some(name.clone());
        Some(KvmEvent::NameIdentified { name })
    }
}

fn parse_channel(digits: &str) -> Result<u8, ParseError> {
    digits
        .parse()
        .map_err(|_| ParseError::InvalidChannel(digits.to_string()))
}
