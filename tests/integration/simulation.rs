//! Multi-cycle simulation.
//!
//! Drives the engine through several hours of simulated time with a
//! changing feed and checks the switch history it produces.

use serde_json::json;

use gruve::engine::lock::SwitchLock;
use gruve::engine::Decision;
use gruve::settings::IS_LOCKED;
use gruve::storage::KeyValueStore;
use gruve::types::Coin;

use crate::mock_rig::{MockRig, START};

#[tokio::test]
async fn test_day_of_switching() {
    let rig = MockRig::new(None);
    rig.feed.set(&[
        ("ETH", "Ethash", 100.0, false),
        ("ETC", "Ethash", 90.0, false),
        ("ZEC", "Equihash", 80.0, false),
    ]);

    // First cycle: nothing recorded yet, start on the best coin.
    assert!(rig.engine.evaluate_and_switch().await.unwrap());
    assert_eq!(rig.current_tag().as_deref(), Some("ETH"));
    assert_eq!(rig.process.calls(), vec!["disallow", "stop", "allow"]);

    // ZEC jumps ahead, but ETH's hour is not up yet.
    rig.feed.set(&[
        ("ETH", "Ethash", 100.0, false),
        ("ZEC", "Equihash", 140.0, false),
    ]);
    rig.clock.advance_secs(1800);
    assert!(matches!(
        rig.engine.evaluate().await.unwrap(),
        Decision::Dwelling { .. }
    ));

    // Hour passed, but the cached feed (fetched at START) expired long ago;
    // the fresh fetch shows ZEC ahead by 40 points.
    rig.clock.advance_secs(1800);
    let d = rig.engine.evaluate().await.unwrap();
    assert!(d.is_switch(), "expected switch, got {d}");
    assert_eq!(rig.current_tag().as_deref(), Some("ZEC"));

    let conf = std::fs::read_to_string(&rig.local_conf).unwrap();
    assert_eq!(
        conf,
        "globalminer ewbf-zcash\r\n\
         maxgputemp 85\r\n\
         proxywallet t1zec\r\n\
         proxypool1 zec.pool:3333\r\n"
    );

    // ETH recovers slightly: within threshold of the ZEC snapshot (140).
    rig.feed.set(&[
        ("ETH", "Ethash", 160.0, false),
        ("ZEC", "Equihash", 90.0, false),
    ]);
    rig.clock.advance_secs(3600);
    assert!(matches!(
        rig.engine.evaluate().await.unwrap(),
        Decision::BelowThreshold { .. }
    ));

    let notes = rig.notifier.messages();
    assert_eq!(notes.len(), 2);
    assert!(notes[0].starts_with("Starting on ETH"));
    assert!(notes[1].contains("switching to ZEC (40.0% more profitable)"));
    assert_eq!(rig.lock_value(), Some(json!(false)));
}

#[tokio::test]
async fn test_feed_is_cached_between_cycles() {
    let rig = MockRig::new(None);
    rig.feed.set(&[("ETH", "Ethash", 100.0, false)]);
    rig.settings
        .set_current_coin(&Coin {
            tag: "ETH".into(),
            algorithm: "Ethash".into(),
            profitability: 100.0,
            lagging: false,
        })
        .unwrap();

    for _ in 0..5 {
        rig.engine.evaluate().await.unwrap();
        rig.clock.advance_secs(60);
    }
    // Five cycles inside the 300 s cache window share one fetch.
    assert_eq!(rig.feed.fetches(), 1);

    rig.clock.advance_secs(300);
    rig.engine.evaluate().await.unwrap();
    assert_eq!(rig.feed.fetches(), 2);
}

#[tokio::test]
async fn test_feed_outage_blocks_switching_until_recovery() {
    let rig = MockRig::new(None);
    rig.feed.set(&[("ETC", "Ethash", 200.0, false)]);
    rig.feed.set_error("connection refused");

    assert!(matches!(
        rig.engine.evaluate().await.unwrap(),
        Decision::NoCandidate { .. }
    ));
    assert!(rig.current_tag().is_none());

    rig.feed.clear_error();
    assert!(rig.engine.evaluate_and_switch().await.unwrap());
    assert_eq!(rig.current_tag().as_deref(), Some("ETC"));
}

#[tokio::test]
async fn test_overlapping_invocations_serialised() {
    let rig = MockRig::new(None);
    rig.feed.set(&[("ETH", "Ethash", 100.0, false)]);

    // A second invocation holds the lock (e.g. slow restart in progress).
    let other = SwitchLock::new(rig.settings_store.clone(), rig.clock.clone(), None);
    let held = other.try_acquire().unwrap().unwrap();

    assert_eq!(rig.engine.evaluate().await.unwrap(), Decision::LockHeld);
    assert!(rig.process.calls().is_empty());

    held.release().unwrap();
    assert!(rig.engine.evaluate_and_switch().await.unwrap());
}

#[tokio::test]
async fn test_crashed_run_recovers_with_lease_ttl() {
    let rig = MockRig::new(Some(900));
    rig.feed.set(&[("ETH", "Ethash", 100.0, false)]);

    let crashed = SwitchLock::new(rig.settings_store.clone(), rig.clock.clone(), Some(900));
    std::mem::forget(crashed.try_acquire().unwrap().unwrap());

    assert_eq!(rig.engine.evaluate().await.unwrap(), Decision::LockHeld);
    rig.clock.advance_secs(900);
    assert!(rig.engine.evaluate_and_switch().await.unwrap());
}

#[tokio::test]
async fn test_crashed_run_without_ttl_needs_operator() {
    let rig = MockRig::new(None);
    rig.feed.set(&[("ETH", "Ethash", 100.0, false)]);
    // Flag left behind by an older install.
    rig.settings_store.set(IS_LOCKED, json!(1)).unwrap();

    rig.clock.advance_secs(7 * 24 * 3600);
    assert_eq!(rig.engine.evaluate().await.unwrap(), Decision::LockHeld);

    rig.settings_store.set(IS_LOCKED, json!(false)).unwrap();
    assert!(rig.engine.evaluate_and_switch().await.unwrap());
    assert!(rig.settings.last_switch().unwrap() >= START);
}

#[tokio::test]
async fn test_non_numeric_feed_leaves_state_readable() {
    let rig = MockRig::new(None);
    rig.settings
        .set_current_coin(&Coin {
            tag: "ETH".into(),
            algorithm: "Ethash".into(),
            profitability: 100.0,
            lagging: false,
        })
        .unwrap();
    rig.feed.set(&[
        ("ETC", "Ethash", f64::NAN, false),
        ("ETH", "Ethash", 100.0, false),
    ]);

    assert!(matches!(
        rig.engine.evaluate().await.unwrap(),
        Decision::NoCandidate { .. }
    ));
    assert!(rig.process.calls().is_empty());
    assert_eq!(rig.settings.current_coin().unwrap().unwrap().profitability, 100.0);

    // A sane feed on the next cycle is evaluated normally.
    rig.feed.set(&[
        ("ETC", "Ethash", 150.0, false),
        ("ETH", "Ethash", 100.0, false),
    ]);
    assert!(rig.engine.evaluate_and_switch().await.unwrap());
    assert_eq!(rig.current_tag().as_deref(), Some("ETC"));
}
