//! Server settings
//!
//! One JSON document holds the device list and the layout table. The
//! defaults reproduce the desk this system was built for (a 4x4 Blustream
//! matrix and a 4-port Startech KVM shared by three computers), so a first
//! run works without a settings file and writes one to edit.

use std::fs;
use std::io;
use std::path::PathBuf;

use kvm_core::{Action, Computer, DeviceConfig, Directions, Layout};
use kvm_protocol::DeviceFamily;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Devices to drive, one serial connection each
    pub devices: Vec<DeviceConfig>,
    /// Computers and their per-edge switching actions
    pub layout: Layout,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            devices: vec![
                DeviceConfig {
                    name: "Blustream".to_string(),
                    short_name: "matrix".to_string(),
                    family: DeviceFamily::Matrix,
                    serial_path: "/dev/ttyUSB0".to_string(),
                    baud_rate: 57_600,
                    swap_timeout_ms: 5_000,
                    settle_delay_ms: 500,
                },
                DeviceConfig {
                    name: "Startech SV431DVIUDDM".to_string(),
                    short_name: "kvm".to_string(),
                    family: DeviceFamily::Single,
                    serial_path: "/dev/ttyUSB1".to_string(),
                    baud_rate: 115_200,
                    swap_timeout_ms: 5_000,
                    settle_delay_ms: 500,
                },
            ],
            layout: default_layout(),
        }
    }
}

impl Settings {
    /// Platform config file path, e.g. `~/.config/kvm-server/settings.json`
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kvm-server").join("settings.json"))
    }

    /// Load settings from the config file, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            warn!("no config directory on this platform; using default settings");
            return Self::default();
        };

        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    info!(path = %path.display(), "loaded settings");
                    settings
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "could not parse settings; using defaults");
                    Self::default()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no settings file; using defaults");
                Self::default()
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "could not read settings; using defaults");
                Self::default()
            }
        }
    }

    /// Write the settings to the config file
    pub fn save(&self) -> io::Result<()> {
        let Some(path) = Self::config_path() else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no config directory on this platform",
            ));
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        info!(path = %path.display(), "saved settings");
        Ok(())
    }
}

/// The original three-computer desk layout
fn default_layout() -> Layout {
    let matrix = |token: &str| Action {
        driver: "matrix".to_string(),
        action: token.to_string(),
    };
    let kvm = |channel: &str| Action {
        driver: "kvm".to_string(),
        action: channel.to_string(),
    };

    Layout::new(vec![
        Computer {
            name: "work-computer".to_string(),
            directions: Directions {
                right: vec![kvm("1")],
                ..Default::default()
            },
        },
        Computer {
            name: "home-computer".to_string(),
            directions: Directions {
                left: vec![kvm("2")],
                right: vec![matrix("01-03"), matrix("02-04"), kvm("4")],
                ..Default::default()
            },
        },
        Computer {
            name: "streaming-computer".to_string(),
            directions: Directions {
                left: vec![matrix("01-01"), matrix("02-02"), kvm("2")],
                ..Default::default()
            },
        },
    ])
}
