//! Hot-reload behavior: valid documents activate, invalid documents are
//! rejected and the previous configuration stays in force.

use std::sync::{mpsc, Mutex};
use std::time::Duration;
use strata_policy::{ConfigWatcher, StrataConfig};

fn write_config(path: &std::path::Path, body: &str) {
    std::fs::write(path, body).unwrap();
}

#[test]
fn reload_delivers_validated_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strata.toml");
    write_config(&path, "version = 1\n");

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let _watcher = ConfigWatcher::start(path.clone(), 50, move |config: StrataConfig| {
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(config.coordinator.max_attempts);
        }
    })
    .unwrap();

    write_config(&path, "[coordinator]\nmax_attempts = 7\n");

    let max_attempts = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("reload callback not invoked");
    assert_eq!(max_attempts, 7);
}

#[test]
fn invalid_config_never_reaches_callback() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strata.toml");
    write_config(&path, "version = 1\n");

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let _watcher = ConfigWatcher::start(path.clone(), 50, move |config: StrataConfig| {
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(config.validation.max_reflection_cycles);
        }
    })
    .unwrap();

    // Schema violation: zero reflection cycles.
    write_config(&path, "[validation]\nmax_reflection_cycles = 0\n");
    assert!(rx.recv_timeout(Duration::from_millis(700)).is_err());

    // A following valid write still comes through.
    write_config(&path, "[validation]\nmax_reflection_cycles = 2\n");
    let cycles = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("valid config after invalid one was not delivered");
    assert_eq!(cycles, 2);
}
