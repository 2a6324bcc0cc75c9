//! Integration tests for the guided calibration workflow
//!
//! These tests drive the calibration procedure the way the device loop
//! does: button state through `service`, raw samples through
//! `process_sample` (the engine forwards them to the procedure while it is
//! collecting), and persistence through the real FileStore.

use std::time::Duration;

use keybed_engine::{
    AppConfig, EventDrainer, EventQueue, FileStore, KeyId, KeybedEngine, MidiEvent, TableNoteMap,
    Transport, UiInput,
};

struct NullTransport;

impl Transport for NullTransport {
    fn send(&mut self, _event: &MidiEvent) {}
    fn flush(&mut self) {}
}

#[derive(Default)]
struct CountingTransport {
    count: u32,
}

impl Transport for CountingTransport {
    fn send(&mut self, _event: &MidiEvent) {
        self.count += 1;
    }
    fn flush(&mut self) {}
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.keys.key_count = 4;
    config
}

fn engine_with_file(config: AppConfig, path: &std::path::Path) -> (KeybedEngine, EventDrainer) {
    let (producer, drainer) = EventQueue::with_capacity(config.queue.capacity);
    let note_map = Box::new(TableNoteMap::linear(config.keys.key_count, 60));
    (
        KeybedEngine::new(config, note_map, Box::new(FileStore::new(path)), producer),
        drainer,
    )
}

fn down(hold_ms: u32) -> UiInput {
    UiInput {
        is_down: true,
        hold_elapsed_ms: hold_ms,
    }
}

fn up(hold_ms: u32) -> UiInput {
    UiInput {
        is_down: false,
        hold_elapsed_ms: hold_ms,
    }
}

/// Arm the procedure and run the collection window with every key resting
/// at its entry in `rest_levels`
fn collect_rest(engine: &mut KeybedEngine, rest_levels: &[u16], now_ms: &mut u64) {
    let cfg = AppConfig::default();
    engine.service(*now_ms, down(cfg.calibration.arm_hold_ms));
    *now_ms += 10;
    engine.service(*now_ms, up(cfg.calibration.arm_release_ms));

    // Feed resting samples during the collection window
    let mut t_us = *now_ms * 1_000;
    for _ in 0..20 {
        for (idx, &rest) in rest_levels.iter().enumerate() {
            engine.process_sample(KeyId::new(idx as u16), rest, t_us);
            t_us += 100;
        }
    }
    *now_ms += cfg.calibration.collect_window_ms as u64 + 100;
    engine.service(*now_ms, up(1_000));
}

/// Press one key to `peak` and back while capture is active
fn capture_press(engine: &mut KeybedEngine, key: KeyId, rest: u16, peak: u16, now_ms: u64) {
    let mut t_us = now_ms * 1_000;
    let mut level = rest as i32;
    let step = 20;
    while level < peak as i32 {
        level = (level + step).min(peak as i32);
        engine.process_sample(key, level as u16, t_us);
        t_us += 200;
    }
    while level > rest as i32 {
        level = (level - step).max(rest as i32);
        engine.process_sample(key, level as u16, t_us);
        t_us += 200;
    }
}

/// Second button press plus the finish hold
fn finish(engine: &mut KeybedEngine, now_ms: &mut u64) {
    let cfg = AppConfig::default();
    engine.service(*now_ms, down(0));
    *now_ms += cfg.calibration.finish_hold_ms as u64;
    engine.service(*now_ms, down(cfg.calibration.finish_hold_ms));
}

#[test]
fn test_guided_run_learns_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thresholds.json");
    let cfg = config();
    let (mut engine, mut drainer) = engine_with_file(cfg.clone(), &path);

    let rest_levels = [620u16, 630, 615, 625];
    let mut now_ms = 0u64;
    collect_rest(&mut engine, &rest_levels, &mut now_ms);

    // Rest levels became the new lows (median + margin)
    for (idx, &rest) in rest_levels.iter().enumerate() {
        let th = engine.thresholds(KeyId::new(idx as u16)).unwrap();
        assert_eq!(th.low, rest + cfg.calibration.low_margin);
    }

    // Press keys 0 and 1 during capture; leave 2 and 3 alone
    now_ms += 10;
    capture_press(&mut engine, KeyId::new(0), 630, 980, now_ms);
    capture_press(&mut engine, KeyId::new(1), 640, 940, now_ms + 100);
    let high2_before = engine.thresholds(KeyId::new(2)).unwrap().high;

    now_ms += 500;
    finish(&mut engine, &mut now_ms);

    // Touched keys got a peak-derived high; untouched kept theirs
    let th0 = engine.thresholds(KeyId::new(0)).unwrap();
    assert!(
        th0.high < 980 && th0.high > 900,
        "high {} should derive from peak 980",
        th0.high
    );
    let th1 = engine.thresholds(KeyId::new(1)).unwrap();
    assert!(
        th1.high < 940 && th1.high > 860,
        "high {} should derive from peak 940",
        th1.high
    );
    assert_eq!(engine.thresholds(KeyId::new(2)).unwrap().high, high2_before);

    // The table survives a restart bit-identically
    let (engine2, _drainer2) = engine_with_file(cfg, &path);
    for idx in 0..4u16 {
        assert_eq!(
            engine2.thresholds(KeyId::new(idx)),
            engine.thresholds(KeyId::new(idx))
        );
    }

    // Scanning kept running throughout: drain whatever the capture presses
    // produced without error
    let mut transport = NullTransport;
    drainer.drain(Duration::from_millis(10), &mut transport);
}

#[test]
fn test_gamma_round_trips_through_storage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thresholds.json");
    let cfg = config();
    let (mut engine, _drainer) = engine_with_file(cfg.clone(), &path);
    engine.set_gamma(1.3);

    let mut now_ms = 0u64;
    collect_rest(&mut engine, &[620, 620, 620, 620], &mut now_ms);
    now_ms += 10;
    finish(&mut engine, &mut now_ms);

    let (engine2, _drainer2) = engine_with_file(cfg, &path);
    assert!((engine2.gamma() - 1.3).abs() < 1e-6);
}

#[test]
fn test_aborted_run_changes_nothing_and_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thresholds.json");
    let cfg = config();
    let (mut engine, _drainer) = engine_with_file(cfg.clone(), &path);

    let before: Vec<_> = (0..4u16)
        .map(|idx| engine.thresholds(KeyId::new(idx)))
        .collect();

    let mut now_ms = 0u64;
    collect_rest(&mut engine, &[600, 600, 600, 600], &mut now_ms);
    now_ms += 10;
    capture_press(&mut engine, KeyId::new(0), 610, 950, now_ms);

    // Second press, but released before the finish hold
    engine.service(now_ms + 100, down(0));
    engine.service(now_ms + 200, up(0));

    let after: Vec<_> = (0..4u16)
        .map(|idx| engine.thresholds(KeyId::new(idx)))
        .collect();
    assert_eq!(before, after, "aborted run must restore all thresholds");
    assert!(!path.exists(), "aborted run must not write the blob");

    // A fresh engine sees no stored table and uses defaults
    let (engine2, _drainer2) = engine_with_file(cfg.clone(), &path);
    assert_eq!(
        engine2.thresholds(KeyId::new(0)).unwrap().low,
        cfg.calibration.default_low
    );
}

#[test]
fn test_collection_does_not_pause_note_processing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thresholds.json");
    let cfg = config();
    let (mut engine, mut drainer) = engine_with_file(cfg.clone(), &path);

    // Arm and enter the collection window
    engine.service(0, down(cfg.calibration.arm_hold_ms));
    engine.service(10, up(cfg.calibration.arm_release_ms));

    // A stroke played mid-collection still sounds
    let mut t_us = 20_000u64;
    for raw in [700u16, 750, 760, 850, 920, 930, 890, 880, 730, 720] {
        engine.process_sample(KeyId::new(3), raw, t_us);
        t_us += 100;
    }

    let mut transport = CountingTransport::default();
    while !drainer.is_empty() {
        drainer.drain(Duration::from_millis(10), &mut transport);
    }
    assert_eq!(transport.count, 2, "note-on and note-off during collection");
}
