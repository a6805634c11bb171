//! Virtual Startech KVM
//!
//! Reproduces the console behavior of an SV431DVIUDDM-class KVM: it prints a
//! firmware banner when it boots, answers `ERROR` to anything it does not
//! understand, and reports `CH<n>` when the active channel changes, whether
//! commanded over serial or "pressed" on the front panel.

use tracing::debug;

/// A simulated Startech single-output KVM
#[derive(Debug)]
pub struct VirtualKvm {
    model: String,
    firmware: String,
    channel: u8,
    num_channels: u8,
    received: Vec<String>,
}

impl VirtualKvm {
    /// Create a KVM with the given channel count, starting on channel 1
    pub fn new(model: impl Into<String>, firmware: impl Into<String>, num_channels: u8) -> Self {
        Self {
            model: model.into(),
            firmware: firmware.into(),
            channel: 1,
            num_channels,
            received: Vec::new(),
        }
    }

    /// The 4-port KVM the original system ran on
    pub fn sv431() -> Self {
        Self::new("SV431DVIUDDM", "H2K B4.1", 4)
    }

    /// The banner printed at boot
    ///
    /// Shaped exactly as the hardware prints it: five whitespace tokens with
    /// the colon glued to the version.
    pub fn boot_banner(&self) -> String {
        format!("{} F/W Version :{}", self.model, self.firmware)
    }

    /// Currently selected channel
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Every command line the KVM has received
    pub fn received_commands(&self) -> &[String] {
        &self.received
    }

    /// Simulate a front-panel channel press; returns the unsolicited report
    pub fn press_channel(&mut self, channel: u8) -> Vec<String> {
        if channel == 0 || channel > self.num_channels {
            return Vec::new();
        }
        self.channel = channel;
        vec![format!("CH{channel}")]
    }

    /// Process one command line and return the reply lines
    pub fn process_command(&mut self, line: &str) -> Vec<String> {
        self.received.push(line.to_string());
        debug!(command = line, "virtual kvm command");

        if let Some(digits) = line.strip_prefix("CH") {
            if let Ok(channel) = digits.parse::<u8>() {
                if channel >= 1 && channel <= self.num_channels {
                    self.channel = channel;
                    return vec![format!("CH{channel}")];
                }
            }
        }

        vec!["ERROR".to_string()]
    }
}
