//! Application context
//!
//! The registry and layout are built once at startup and passed around
//! explicitly; the transport layer gets a reference to this context instead
//! of reaching into globals.

use tracing::info;

use crate::error::LayoutError;
use crate::layout::{Direction, Layout};
use crate::registry::DeviceRegistry;

/// Everything the serving layer needs, explicitly constructed at startup
#[derive(Debug)]
pub struct AppContext {
    pub registry: DeviceRegistry,
    pub layout: Layout,
}

impl AppContext {
    /// Assemble the context from its parts
    pub fn new(registry: DeviceRegistry, layout: Layout) -> Self {
        Self { registry, layout }
    }

    /// Handle an edge-trigger event: look up the actions for the device and
    /// direction, dispatch them in order, and report how many ran
    ///
    /// The returned count is the acknowledgement value the transport layer
    /// relays back so the client can reset its edge debounce.
    pub async fn apply_edge_trigger(
        &self,
        device: &str,
        direction: Direction,
    ) -> Result<usize, LayoutError> {
        let actions = self.layout.find_actions(device, direction)?;
        info!(
            device,
            direction = direction.name(),
            actions = actions.len(),
            "edge trigger"
        );
        self.layout.effect(&self.registry, actions).await;
        Ok(actions.len())
    }
}
