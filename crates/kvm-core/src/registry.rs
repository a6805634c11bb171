//! Device registry
//!
//! The set of drivers is small and fixed at startup, so lookup is a linear
//! scan by short name. The registry is plain owned data handed to whoever
//! needs it; there is deliberately no global driver list.

use tracing::warn;

use crate::driver::{Driver, DriverStatus};
use crate::error::RegistryError;

/// Short-name → driver lookup table
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    drivers: Vec<Driver>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a driver; short names must be unique
    pub fn register(&mut self, driver: Driver) -> Result<(), RegistryError> {
        if self.find(driver.short_name()).is_some() {
            return Err(RegistryError::DuplicateShortName(
                driver.short_name().to_string(),
            ));
        }
        self.drivers.push(driver);
        Ok(())
    }

    /// Find a driver by the short name layouts refer to it with
    pub fn find(&self, short_name: &str) -> Option<&Driver> {
        self.drivers
            .iter()
            .find(|driver| driver.short_name() == short_name)
    }

    /// All registered drivers, in registration order
    pub fn drivers(&self) -> &[Driver] {
        &self.drivers
    }

    /// Start every registered driver, logging the ones that fail
    ///
    /// One device failing to open leaves the others untouched.
    pub fn start_all(&mut self) {
        for driver in &mut self.drivers {
            let initiated = driver.start();
            if !initiated {
                if let Some(err) = driver.last_error() {
                    warn!(driver = %driver.short_name(), %err, "driver failed to start");
                }
            }
        }
    }

    /// Re-issue the status query on every driver that supports one
    pub async fn refresh_all(&self) {
        for driver in &self.drivers {
            driver.refresh_status().await;
        }
    }

    /// Stop every registered driver
    pub async fn shutdown_all(&self) {
        for driver in &self.drivers {
            driver.shutdown().await;
        }
    }

    /// Status snapshots of every driver, for serialization
    pub fn statuses(&self) -> Vec<DriverStatus> {
        self.drivers.iter().map(Driver::status).collect()
    }
}
