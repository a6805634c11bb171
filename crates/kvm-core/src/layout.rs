//! Layout engine
//!
//! A layout maps (computer, edge direction) to the ordered list of switching
//! actions that move the desk to that computer: typically a couple of matrix
//! routes plus a KVM channel select. The table is built once from
//! configuration and never mutated; dispatch goes through the
//! [`DeviceRegistry`] so the layout holds no driver references of its own.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use kvm_protocol::DeviceFamily;

use crate::error::LayoutError;
use crate::registry::DeviceRegistry;

/// Screen edge that triggered a switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Top,
    Bottom,
}

impl Direction {
    /// Lowercase wire name of the direction
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Top => "top",
            Direction::Bottom => "bottom",
        }
    }
}

impl FromStr for Direction {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "top" => Ok(Direction::Top),
            "bottom" => Ok(Direction::Bottom),
            other => Err(LayoutError::UnknownDirection(other.to_string())),
        }
    }
}

/// One switching step: which driver, and the device-specific command token
///
/// Matrix tokens are `"<output>-<input>"`; single-output tokens are the bare
/// input name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Short name of the target driver
    pub driver: String,
    /// Device-specific command token
    pub action: String,
}

/// Per-direction action lists for one computer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directions {
    #[serde(default)]
    pub left: Vec<Action>,
    #[serde(default)]
    pub right: Vec<Action>,
    #[serde(default)]
    pub top: Vec<Action>,
    #[serde(default)]
    pub bottom: Vec<Action>,
}

/// A computer (or other device) that the desk can switch to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Computer {
    /// Name the edge detector reports for this machine
    pub name: String,
    /// Actions per screen edge
    #[serde(default)]
    pub directions: Directions,
}

impl Computer {
    fn actions(&self, direction: Direction) -> &[Action] {
        match direction {
            Direction::Left => &self.directions.left,
            Direction::Right => &self.directions.right,
            Direction::Top => &self.directions.top,
            Direction::Bottom => &self.directions.bottom,
        }
    }
}

/// Static (computer, direction) → actions table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub computers: Vec<Computer>,
}

impl Layout {
    /// Build a layout from its computer list
    pub fn new(computers: Vec<Computer>) -> Self {
        Self { computers }
    }

    /// Actions to perform when the mouse leaves `name`'s screen toward
    /// `direction`
    ///
    /// An unknown computer is an error; a known computer with nothing
    /// configured for that edge yields an empty list, which is a valid
    /// result: the trigger simply has no effect there.
    pub fn find_actions(&self, name: &str, direction: Direction) -> Result<&[Action], LayoutError> {
        let computer = self
            .computers
            .iter()
            .find(|computer| computer.name == name)
            .ok_or_else(|| LayoutError::DeviceNotFound(name.to_string()))?;
        Ok(computer.actions(direction))
    }

    /// Dispatch actions in order to their drivers
    ///
    /// A no-op on an empty list. Unknown drivers and malformed matrix tokens
    /// are skipped silently; ordering across actions relies on each driver
    /// serializing its own requests, not on any barrier here.
    pub async fn effect(&self, registry: &DeviceRegistry, actions: &[Action]) {
        if actions.is_empty() {
            return;
        }

        for item in actions {
            let Some(driver) = registry.find(&item.driver) else {
                debug!(driver = %item.driver, "no driver for action; skipping");
                continue;
            };

            match driver.family() {
                DeviceFamily::Single => {
                    driver.set_single_output(&item.action).await;
                }
                DeviceFamily::Matrix => {
                    let Some((output, input)) = split_matrix_token(&item.action) else {
                        debug!(token = %item.action, "malformed matrix token; skipping");
                        continue;
                    };
                    driver.set_matrix_output(output, input).await;
                }
            }
        }
    }
}

/// Split a matrix token on its single hyphen into (output, input)
fn split_matrix_token(token: &str) -> Option<(&str, &str)> {
    let (output, input) = token.split_once('-')?;
    if output.is_empty() || input.is_empty() || input.contains('-') {
        return None;
    }
    Some((output, input))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The desk this system was originally built for: a matrix feeding two
    /// monitors plus a 4-port KVM
    fn example_layout() -> Layout {
        Layout::new(vec![
            Computer {
                name: "work-computer".to_string(),
                directions: Directions {
                    right: vec![Action {
                        driver: "kvm".to_string(),
                        action: "1".to_string(),
                    }],
                    ..Default::default()
                },
            },
            Computer {
                name: "home-computer".to_string(),
                directions: Directions {
                    left: vec![Action {
                        driver: "kvm".to_string(),
                        action: "2".to_string(),
                    }],
                    right: vec![
                        Action {
                            driver: "matrix".to_string(),
                            action: "01-03".to_string(),
                        },
                        Action {
                            driver: "matrix".to_string(),
                            action: "02-04".to_string(),
                        },
                        Action {
                            driver: "kvm".to_string(),
                            action: "4".to_string(),
                        },
                    ],
                    ..Default::default()
                },
            },
            Computer {
                name: "streaming-computer".to_string(),
                directions: Directions {
                    left: vec![
                        Action {
                            driver: "matrix".to_string(),
                            action: "01-01".to_string(),
                        },
                        Action {
                            driver: "matrix".to_string(),
                            action: "02-02".to_string(),
                        },
                        Action {
                            driver: "kvm".to_string(),
                            action: "2".to_string(),
                        },
                    ],
                    ..Default::default()
                },
            },
        ])
    }

    #[test]
    fn test_find_actions_ordered() {
        let layout = example_layout();
        let actions = layout.find_actions("home-computer", Direction::Right).unwrap();

        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0].driver, "matrix");
        assert_eq!(actions[0].action, "01-03");
        assert_eq!(actions[1].driver, "matrix");
        assert_eq!(actions[1].action, "02-04");
        assert_eq!(actions[2].driver, "kvm");
        assert_eq!(actions[2].action, "4");
    }

    #[test]
    fn test_unknown_device_is_an_error() {
        let layout = example_layout();
        let err = layout
            .find_actions("unknown-device", Direction::Left)
            .unwrap_err();
        assert_eq!(err, LayoutError::DeviceNotFound("unknown-device".to_string()));
    }

    #[test]
    fn test_unconfigured_direction_is_empty_not_an_error() {
        let layout = example_layout();
        let actions = layout.find_actions("work-computer", Direction::Top).unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn test_effect_on_empty_list_is_a_noop() {
        let layout = example_layout();
        let registry = DeviceRegistry::new();
        layout.effect(&registry, &[]).await;
    }

    #[tokio::test]
    async fn test_effect_skips_unknown_drivers() {
        let layout = example_layout();
        let registry = DeviceRegistry::new();
        let actions = layout
            .find_actions("home-computer", Direction::Right)
            .unwrap()
            .to_vec();
        // No drivers registered: every action is skipped without error
        layout.effect(&registry, &actions).await;
    }

    #[test]
    fn test_matrix_token_splitting() {
        assert_eq!(split_matrix_token("01-03"), Some(("01", "03")));
        assert_eq!(split_matrix_token("0103"), None);
        assert_eq!(split_matrix_token("-03"), None);
        assert_eq!(split_matrix_token("01-"), None);
        assert_eq!(split_matrix_token("01-02-03"), None);
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("left".parse::<Direction>(), Ok(Direction::Left));
        assert_eq!("bottom".parse::<Direction>(), Ok(Direction::Bottom));
        assert!("diagonal".parse::<Direction>().is_err());
        assert_eq!(Direction::Right.name(), "right");
    }

    #[test]
    fn test_layout_round_trips_through_json() {
        let layout = example_layout();
        let json = serde_json::to_string(&layout).unwrap();
        let parsed: Layout = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, layout);
    }
}
