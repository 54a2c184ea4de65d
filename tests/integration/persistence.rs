//! Cycles over the on-disk JSON stores.
//!
//! Each invocation of the binary opens its own store handles, so these
//! tests open separate handles on one data directory to stand in for
//! separate runs.

use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

use gruve::clock::ManualClock;
use gruve::config::{AppConfig, SettingsConfig};
use gruve::engine::lock::{LockState, SwitchLock};
use gruve::settings::{Settings, IS_LOCKED};
use gruve::storage::{JsonFileStore, KeyValueStore, SETTINGS_DOCUMENT};
use gruve::types::Coin;

use crate::mock_rig::START;

struct DataDir(PathBuf);

impl DataDir {
    fn new() -> Self {
        let mut p = std::env::temp_dir();
        p.push(format!("gruve_persist_{}", uuid::Uuid::new_v4()));
        Self(p)
    }

    fn settings(&self) -> Arc<JsonFileStore> {
        Arc::new(JsonFileStore::open(&self.0, SETTINGS_DOCUMENT).unwrap())
    }
}

impl Drop for DataDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[test]
fn test_lock_visible_across_store_handles() {
    let dir = DataDir::new();
    let clock = Arc::new(ManualClock::at_epoch_secs(START));
    let first = SwitchLock::new(dir.settings(), clock.clone(), None);
    let second = SwitchLock::new(dir.settings(), clock, None);

    let guard = first.try_acquire().unwrap().expect("first run takes the lock");
    assert!(second.try_acquire().unwrap().is_none());
    assert!(second.is_locked().unwrap());

    guard.release().unwrap();
    assert!(!second.is_locked().unwrap());
    assert!(second.try_acquire().unwrap().is_some());
}

#[test]
fn test_racing_runs_never_share_the_lock() {
    const ROUNDS: usize = 200;
    let dir = DataDir::new();
    let barrier = Arc::new(Barrier::new(2));

    let runs: Vec<_> = (0..2)
        .map(|_| {
            let lock = SwitchLock::new(
                dir.settings(),
                Arc::new(ManualClock::at_epoch_secs(START)),
                None,
            );
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut won = Vec::with_capacity(ROUNDS);
                for _ in 0..ROUNDS {
                    barrier.wait();
                    let guard = lock.try_acquire().unwrap();
                    won.push(guard.is_some());
                    // Both attempts are in before the winner lets go.
                    barrier.wait();
                    if let Some(guard) = guard {
                        guard.release().unwrap();
                    }
                    barrier.wait();
                }
                won
            })
        })
        .collect();

    let results: Vec<Vec<bool>> = runs.into_iter().map(|h| h.join().unwrap()).collect();
    for round in 0..ROUNDS {
        let winners = results.iter().filter(|r| r[round]).count();
        assert_eq!(winners, 1, "round {round}: {winners} holders");
    }
}

#[test]
fn test_lease_survives_concurrent_settings_writes() {
    let dir = DataDir::new();
    let writer_store = dir.settings();
    let writer = thread::spawn(move || {
        for i in 0..300 {
            writer_store.set("last_switch", json!(START + i)).unwrap();
        }
    });

    let store = dir.settings();
    let lock = SwitchLock::new(store.clone(), Arc::new(ManualClock::at_epoch_secs(START)), None);
    for _ in 0..100 {
        let guard = lock.try_acquire().unwrap().expect("no other lock holder");
        match lock.state().unwrap() {
            LockState::Leased(lease) => assert_eq!(lease.token, guard.token()),
            other => panic!("lease lost: {other:?}"),
        }
        guard.release().unwrap();
    }
    writer.join().unwrap();

    assert_eq!(store.get("last_switch").unwrap(), Some(json!(START + 299)));
    assert_eq!(store.get(IS_LOCKED).unwrap(), Some(json!(false)));
}

#[test]
fn test_state_survives_reopen() {
    let dir = DataDir::new();
    {
        let settings = Settings::new(dir.settings());
        settings
            .set_current_coin(&Coin {
                tag: "ZEC".into(),
                algorithm: "Equihash".into(),
                profitability: 142.5,
                lagging: false,
            })
            .unwrap();
        settings.set_last_switch(START).unwrap();
    }

    let settings = Settings::new(dir.settings());
    let coin = settings.current_coin().unwrap().unwrap();
    assert_eq!(coin.tag, "ZEC");
    assert_eq!(coin.profitability, 142.5);
    assert_eq!(settings.last_switch().unwrap(), START);
}

#[test]
fn test_startup_settings_rewritten_each_start() {
    let dir = DataDir::new();
    let store = dir.settings();
    let settings = Settings::new(store.clone());

    settings.apply_startup(&SettingsConfig::default()).unwrap();
    assert_eq!(settings.switch_threshold().unwrap(), 25.0);

    // Operator edits the file between runs; the next start puts config back.
    store.set("switch_threshold", json!(5)).unwrap();
    let cfg: AppConfig = toml::from_str(
        r#"
        [settings]
        switch_threshold = 15.0
        mine_duration = 7200
        whattomine_url = "https://whattomine.com/coins?eth=true"
        "#,
    )
    .unwrap();
    Settings::new(dir.settings())
        .apply_startup(&cfg.settings)
        .unwrap();

    assert_eq!(settings.switch_threshold().unwrap(), 15.0);
    assert_eq!(settings.mine_duration().unwrap(), 7200);
    assert_eq!(
        settings.feed_url().unwrap().as_deref(),
        Some("https://whattomine.com/coins.json?eth=true")
    );
}

#[test]
fn test_unlock_clears_stale_flag() {
    let dir = DataDir::new();
    let store = dir.settings();
    store.set(IS_LOCKED, json!(true)).unwrap();

    let lock = SwitchLock::new(store.clone(), Arc::new(ManualClock::at_epoch_secs(START)), None);
    assert!(lock.try_acquire().unwrap().is_none());

    lock.force_clear().unwrap();
    assert_eq!(dir.settings().get(IS_LOCKED).unwrap(), Some(json!(false)));
}
