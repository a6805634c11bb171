//! Integration tests for the driver engine
//!
//! These drive real `Driver` instances over `tokio::io::duplex()` against
//! the virtual devices from `kvm-sim`, end to end: line reassembly, the
//! protocol state machines, the swap gate, and layout dispatch.

use std::sync::Arc;
use std::time::Duration;

use kvm_core::{
    Action, AppContext, Computer, DeviceConfig, DeviceRegistry, Direction, Directions, Driver,
    DriverStatus, Layout, SwapOutcome,
};
use kvm_protocol::DeviceFamily;
use kvm_sim::{run_virtual_kvm, run_virtual_matrix, VirtualKvm, VirtualMatrix};
use tokio::sync::Mutex;

mod helpers {
    use super::*;

    pub fn matrix_config() -> DeviceConfig {
        DeviceConfig {
            name: "Blustream".to_string(),
            short_name: "matrix".to_string(),
            family: DeviceFamily::Matrix,
            serial_path: "[sim]".to_string(),
            baud_rate: 57_600,
            swap_timeout_ms: 400,
            settle_delay_ms: 10,
        }
    }

    pub fn kvm_config() -> DeviceConfig {
        DeviceConfig {
            name: "Startech SV431DVIUDDM".to_string(),
            short_name: "kvm".to_string(),
            family: DeviceFamily::Single,
            serial_path: "[sim]".to_string(),
            baud_rate: 115_200,
            swap_timeout_ms: 400,
            settle_delay_ms: 10,
        }
    }

    /// Start a matrix driver wired to a virtual matrix
    pub fn start_matrix(matrix: VirtualMatrix) -> (Driver, Arc<Mutex<VirtualMatrix>>) {
        let (host, device) = tokio::io::duplex(4096);
        let matrix = Arc::new(Mutex::new(matrix));
        tokio::spawn(run_virtual_matrix(device, Arc::clone(&matrix)));

        let mut driver = Driver::new(matrix_config());
        assert!(driver.start_with_io(host));
        (driver, matrix)
    }

    /// Start a KVM driver wired to a virtual KVM
    pub fn start_kvm(kvm: VirtualKvm) -> (Driver, Arc<Mutex<VirtualKvm>>) {
        let (host, device) = tokio::io::duplex(4096);
        let kvm = Arc::new(Mutex::new(kvm));
        tokio::spawn(run_virtual_kvm(device, Arc::clone(&kvm)));

        let mut driver = Driver::new(kvm_config());
        assert!(driver.start_with_io(host));
        (driver, kvm)
    }

    /// Block until a driver status snapshot satisfies the predicate
    pub async fn wait_for_status<F>(driver: &Driver, mut predicate: F)
    where
        F: FnMut(&DriverStatus) -> bool,
    {
        let mut rx = driver.watch_status();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if predicate(&rx.borrow_and_update()) {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .expect("status condition not reached in time");
    }

    pub fn example_layout() -> Layout {
        Layout::new(vec![Computer {
            name: "home-computer".to_string(),
            directions: Directions {
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
        }])
    }
}

use helpers::*;

// ============================================================================
// Matrix driver
// ============================================================================

#[tokio::test]
async fn test_matrix_startup_ingests_status() {
    let (driver, _matrix) = start_matrix(VirtualMatrix::cmx44ab());
    wait_for_status(&driver, |status| status.running).await;

    let status = driver.status();
    assert_eq!(status.name, "Blustream CMX44AB v1.08");
    assert_eq!(driver.driver_name(), "Blustream CMX44AB v1.08");
    assert_eq!(status.inputs.len(), 4);
    assert_eq!(status.outputs.len(), 4);
    assert!(!status.has_error);
    assert!(driver.last_error().is_none());
}

#[tokio::test]
async fn test_matrix_swap_blocks_until_confirmed() {
    let (driver, matrix) = start_matrix(VirtualMatrix::cmx44ab());
    wait_for_status(&driver, |status| status.running).await;

    let outcome = driver.set_matrix_output("01", "02").await;
    assert_eq!(outcome, SwapOutcome::Completed);
    assert!(!driver.status().switching);

    let matrix = matrix.lock().await;
    assert_eq!(matrix.route(1), Some(2));
    assert!(matrix
        .received_commands()
        .contains(&"OUT01FR02".to_string()));
}

#[tokio::test]
async fn test_second_swap_rejected_while_first_pending() {
    let mut sim = VirtualMatrix::cmx44ab();
    sim.set_confirm_swaps(false);
    let (driver, matrix) = start_matrix(sim);
    wait_for_status(&driver, |status| status.running).await;

    let driver = Arc::new(driver);
    let first = {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move { driver.set_matrix_output("01", "02").await })
    };
    wait_for_status(&driver, |status| status.switching).await;

    // Second request while the first is unresolved: silent no-op
    let second = driver.set_matrix_output("02", "03").await;
    assert_eq!(second, SwapOutcome::Rejected);

    // The device never confirms; the deadline releases the gate
    let first = first.await.expect("first swap task");
    assert_eq!(first, SwapOutcome::TimedOut);
    assert!(!driver.status().switching);

    // Exactly one routing command went out
    let sent: Vec<String> = matrix
        .lock()
        .await
        .received_commands()
        .iter()
        .filter(|command| command.starts_with("OUT"))
        .cloned()
        .collect();
    assert_eq!(sent, vec!["OUT01FR02".to_string()]);

    // And the driver accepts new swaps after the gate was released
    let mut confirmed = matrix.lock().await;
    confirmed.set_confirm_swaps(true);
    drop(confirmed);
    let outcome = driver.set_matrix_output("02", "03").await;
    assert_eq!(outcome, SwapOutcome::Completed);
}

#[tokio::test]
async fn test_unresolved_target_is_silent_noop() {
    let (driver, matrix) = start_matrix(VirtualMatrix::cmx44ab());
    wait_for_status(&driver, |status| status.running).await;

    let outcome = driver.set_matrix_output("09", "01").await;
    assert_eq!(outcome, SwapOutcome::Rejected);
    assert!(!driver.status().switching);

    let sent = matrix.lock().await;
    assert!(!sent
        .received_commands()
        .iter()
        .any(|command| command.starts_with("OUT")));
}

#[tokio::test]
async fn test_matrix_refresh_picks_up_input_changes() {
    let (driver, matrix) = start_matrix(VirtualMatrix::cmx44ab());
    wait_for_status(&driver, |status| status.running).await;
    assert!(driver.status().inputs[1].active);

    matrix.lock().await.set_input_connected(2, false);
    driver.refresh_status().await;
    wait_for_status(&driver, |status| {
        status.inputs.get(1).is_some_and(|input| !input.active)
    })
    .await;

    // Tables update in place: same port count, new activity
    assert_eq!(driver.status().inputs.len(), 4);
}

#[tokio::test]
async fn test_matrix_connection_lost_recorded() {
    let (host, device) = tokio::io::duplex(4096);
    let mut driver = Driver::new(matrix_config());
    assert!(driver.start_with_io(host));

    drop(device);
    wait_for_status(&driver, |status| {
        status
            .last_error
            .as_deref()
            .is_some_and(|err| err.contains("connection lost"))
    })
    .await;

    let status = driver.status();
    assert!(!status.running);
    assert!(status.has_error);
}

// ============================================================================
// KVM driver
// ============================================================================

#[tokio::test]
async fn test_kvm_handshake_error_means_running() {
    let (driver, _kvm) = start_kvm(VirtualKvm::sv431());
    wait_for_status(&driver, |status| status.running).await;

    let status = driver.status();
    assert!(!status.has_error, "handshake ERROR is not a fault");
    assert_eq!(status.name, "Startech.com SV431DVIUDDM H2K B4.1");
}

#[tokio::test]
async fn test_kvm_channel_select_is_fire_and_forget() {
    let (driver, kvm) = start_kvm(VirtualKvm::sv431());
    wait_for_status(&driver, |status| status.running).await;

    driver.set_single_output("4").await;
    wait_for_status(&driver, |status| status.active_channel == Some(4)).await;

    let kvm = kvm.lock().await;
    assert_eq!(kvm.channel(), 4);
    assert!(kvm.received_commands().contains(&"CH4".to_string()));
}

#[tokio::test]
async fn test_kvm_later_error_is_a_fault() {
    let (driver, _kvm) = start_kvm(VirtualKvm::sv431());
    wait_for_status(&driver, |status| status.running).await;

    // Channel 9 does not exist; the device answers ERROR, and this time it
    // counts
    driver.set_single_output("9").await;
    wait_for_status(&driver, |status| status.has_error).await;
    assert!(driver.status().running);
}

// ============================================================================
// Full stack: registry + layout + context
// ============================================================================

#[tokio::test]
async fn test_edge_trigger_switches_the_desk() {
    let (matrix_driver, matrix) = start_matrix(VirtualMatrix::cmx44ab());
    let (kvm_driver, kvm) = start_kvm(VirtualKvm::sv431());
    wait_for_status(&matrix_driver, |status| status.running).await;
    wait_for_status(&kvm_driver, |status| status.running).await;

    let mut registry = DeviceRegistry::new();
    registry.register(matrix_driver).unwrap();
    registry.register(kvm_driver).unwrap();
    let context = AppContext::new(registry, example_layout());

    let count = context
        .apply_edge_trigger("home-computer", Direction::Right)
        .await
        .unwrap();
    assert_eq!(count, 3);

    // Matrix swaps block until confirmed, so the routes are already set;
    // the channel select is fire-and-forget, so wait for its report
    let matrix = matrix.lock().await;
    assert_eq!(matrix.route(1), Some(3));
    assert_eq!(matrix.route(2), Some(4));

    let kvm_driver = context.registry.find("kvm").unwrap();
    wait_for_status(kvm_driver, |status| status.active_channel == Some(4)).await;
    assert_eq!(kvm.lock().await.channel(), 4);
}

#[tokio::test]
async fn test_edge_trigger_unknown_device_fails() {
    let context = AppContext::new(DeviceRegistry::new(), example_layout());
    let result = context
        .apply_edge_trigger("unknown-device", Direction::Left)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_drivers_on_different_devices_switch_in_parallel() {
    let (matrix_driver, _matrix) = start_matrix(VirtualMatrix::cmx44ab());
    let (kvm_driver, _kvm) = start_kvm(VirtualKvm::sv431());
    wait_for_status(&matrix_driver, |status| status.running).await;
    wait_for_status(&kvm_driver, |status| status.running).await;

    let (outcome, ()) = tokio::join!(
        matrix_driver.set_matrix_output("01", "02"),
        kvm_driver.set_single_output("2"),
    );
    assert_eq!(outcome, SwapOutcome::Completed);
}

#[tokio::test]
async fn test_registry_status_snapshots_serialize() {
    let (driver, _matrix) = start_matrix(VirtualMatrix::cmx44ab());
    wait_for_status(&driver, |status| status.running).await;

    let mut registry = DeviceRegistry::new();
    registry.register(driver).unwrap();

    let json = serde_json::to_value(registry.statuses()).unwrap();
    assert_eq!(json[0]["name"], "Blustream CMX44AB v1.08");
    assert_eq!(json[0]["family"], "matrix");
    assert_eq!(json[0]["inputs"].as_array().unwrap().len(), 4);
    assert_eq!(json[0]["outputs"][0]["source"], "01");
}
