use std::collections::BTreeSet;
use std::fs;

use anyhow::anyhow;
use otapack_core::{PackageInfo, VersionState};

use super::*;

fn test_layout() -> UpdateLayout {
    let mut path = std::env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    path.push(format!(
        "otapack-store-tests-{}-{}",
        std::process::id(),
        nanos
    ));
    UpdateLayout::new(path)
}

fn pkg(release_id: &str, hash: &str) -> PackageInfo {
    PackageInfo {
        release_id: release_id.to_string(),
        hash: hash.to_string(),
        relative_path: format!("updates/{hash}/index.bundle"),
    }
}

#[test]
fn layout_paths_match_documented_contract() {
    let layout = UpdateLayout::new("/data/otapack");
    assert_eq!(layout.state_path(), layout.root().join("state.json"));
    assert_eq!(layout.updates_dir(), layout.root().join("updates"));
    assert_eq!(
        layout.package_dir("abc123"),
        layout.root().join("updates").join("abc123")
    );
    assert_eq!(
        UpdateLayout::entry_relative_path("abc123", "index.bundle"),
        "updates/abc123/index.bundle"
    );
    assert_eq!(
        layout.resolve("updates/abc123/index.bundle"),
        layout.root().join("updates/abc123/index.bundle")
    );
}

#[test]
fn load_without_record_is_empty_state() {
    let layout = test_layout();
    let store = StateStore::new(layout.clone());
    assert_eq!(store.load(), VersionState::default());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn save_then_load_round_trips() {
    let layout = test_layout();
    let store = StateStore::new(layout.clone());

    let state = VersionState {
        current_package: Some(pkg("r2", "def")),
        previous_package: Some(pkg("r1", "abc")),
        failed_boot_count: 1,
        ..VersionState::default()
    };
    store.save(&state).expect("must save state");
    assert_eq!(store.load(), state);

    // No temp file may survive a completed save.
    assert!(!layout.state_tmp_path().exists());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn corrupt_record_loads_as_empty() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    fs::write(layout.state_path(), b"{not json at all").expect("must write garbage");

    let store = StateStore::new(layout.clone());
    assert_eq!(store.load(), VersionState::default());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn wrong_schema_version_loads_as_empty() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    fs::write(
        layout.state_path(),
        b"{\"schemaVersion\":99,\"failedBootCount\":7}",
    )
    .expect("must write record");

    let store = StateStore::new(layout.clone());
    assert_eq!(store.load(), VersionState::default());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn type_mismatch_loads_as_empty() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    fs::write(
        layout.state_path(),
        b"{\"schemaVersion\":1,\"failedBootCount\":\"two\"}",
    )
    .expect("must write record");

    let store = StateStore::new(layout.clone());
    assert_eq!(store.load(), VersionState::default());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn save_creates_root_when_absent() {
    let layout = test_layout();
    let store = StateStore::new(layout.clone());
    store
        .save(&VersionState::default())
        .expect("must create root and save");
    assert!(layout.state_path().is_file());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn record_new_package_demotes_current_and_resets_counter() {
    let layout = test_layout();
    let machine = StateMachine::new(StateStore::new(layout.clone()));

    machine.record_new_package(pkg("r1", "abc")).expect("must record r1");
    machine
        .store()
        .update(|state| state.failed_boot_count = 1)
        .expect("must bump counter");
    let state = machine.record_new_package(pkg("r2", "def")).expect("must record r2");

    assert_eq!(state.current_package, Some(pkg("r2", "def")));
    assert_eq!(state.previous_package, Some(pkg("r1", "abc")));
    assert_eq!(state.failed_boot_count, 0);
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn current_and_previous_never_equal_across_transitions() {
    let layout = test_layout();
    let machine = StateMachine::new(StateStore::new(layout.clone()));

    machine.record_new_package(pkg("r1", "abc")).expect("record r1");
    machine.record_new_package(pkg("r1", "abc")).expect("record r1 again");
    let state = machine.state();
    assert_eq!(state.current_package, Some(pkg("r1", "abc")));
    assert!(state.previous_package.is_none());

    machine.record_new_package(pkg("r2", "def")).expect("record r2");
    machine.revert_to_previous_package().expect("revert");
    machine.revert_to_previous_package().expect("revert past the end");
    let state = machine.state();
    assert!(state.current_package.is_none());
    assert!(state.previous_package.is_none());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn revert_without_previous_clears_current() {
    let layout = test_layout();
    let machine = StateMachine::new(StateStore::new(layout.clone()));

    machine.record_new_package(pkg("r1", "abc")).expect("record r1");
    let state = machine.revert_to_previous_package().expect("must revert");
    assert!(state.current_package.is_none());
    assert!(state.previous_package.is_none());
    assert_eq!(state.failed_boot_count, 0);
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn revert_restores_previous_and_clears_slot() {
    let layout = test_layout();
    let machine = StateMachine::new(StateStore::new(layout.clone()));

    machine.record_new_package(pkg("r1", "abc")).expect("record r1");
    machine.record_new_package(pkg("r2", "def")).expect("record r2");
    machine
        .store()
        .update(|state| state.failed_boot_count = 2)
        .expect("simulate failed boots");

    let state = machine.revert_to_previous_package().expect("must revert");
    assert_eq!(state.current_package, Some(pkg("r1", "abc")));
    assert!(state.previous_package.is_none());
    assert_eq!(state.failed_boot_count, 0);
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn failed_boot_counter_increments_and_resets() {
    let layout = test_layout();
    let machine = StateMachine::new(StateStore::new(layout.clone()));
    machine.record_new_package(pkg("r1", "abc")).expect("record r1");

    assert_eq!(machine.record_failed_boot().expect("first failure"), 1);
    assert_eq!(machine.record_failed_boot().expect("second failure"), 2);

    // The counter operations must not disturb the package slots.
    let state = machine.state();
    assert_eq!(state.current_package, Some(pkg("r1", "abc")));

    machine.reset_boot_status().expect("must reset");
    assert_eq!(machine.state().failed_boot_count, 0);
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn pending_update_records_and_clears() {
    let layout = test_layout();
    let machine = StateMachine::new(StateStore::new(layout.clone()));

    machine
        .record_pending_update(pkg("r1", "abc"), false)
        .expect("record pending");
    machine
        .record_pending_update(pkg("r2", "def"), true)
        .expect("replace pending");

    let state = machine.state();
    let pending = state.pending_update.expect("pending must exist");
    assert_eq!(pending.package, pkg("r2", "def"));
    assert!(pending.is_mandatory);
    assert!(state.current_package.is_none());

    machine.clear_pending_update().expect("clear pending");
    assert!(machine.state().pending_update.is_none());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn switch_to_version_promotes_and_clears_matching_pending() {
    let layout = test_layout();
    let machine = StateMachine::new(StateStore::new(layout.clone()));

    machine.record_new_package(pkg("r1", "abc")).expect("record r1");
    machine
        .record_pending_update(pkg("r2", "def"), false)
        .expect("record pending");

    let state = machine.switch_to_version(pkg("r2", "def")).expect("must switch");
    assert_eq!(state.current_package, Some(pkg("r2", "def")));
    assert_eq!(state.previous_package, Some(pkg("r1", "abc")));
    assert!(state.pending_update.is_none());
    assert_eq!(state.failed_boot_count, 0);
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn switch_to_version_keeps_unrelated_pending() {
    let layout = test_layout();
    let machine = StateMachine::new(StateStore::new(layout.clone()));

    machine
        .record_pending_update(pkg("r3", "fff"), false)
        .expect("record pending");
    let state = machine.switch_to_version(pkg("r2", "def")).expect("must switch");
    assert_eq!(
        state.pending_update.map(|pending| pending.package),
        Some(pkg("r3", "fff"))
    );
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn reset_state_returns_to_empty() {
    let layout = test_layout();
    let machine = StateMachine::new(StateStore::new(layout.clone()));

    machine.record_new_package(pkg("r1", "abc")).expect("record r1");
    machine
        .record_pending_update(pkg("r2", "def"), true)
        .expect("record pending");

    let state = machine.reset_state().expect("must reset");
    assert_eq!(state, VersionState::default());
    assert_eq!(machine.state(), VersionState::default());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn materialize_verifies_entry_file() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    let store = PackageStore::new(layout.clone());

    store
        .materialize("abc", "index.bundle", |dest| {
            fs::write(dest.join("index.bundle"), b"bundle")?;
            Ok(())
        })
        .expect("must materialize");

    assert!(store.exists("abc"));
    assert!(store.verify_entry_file("abc", "index.bundle"));
    assert!(!store.verify_entry_file("abc", "other.bundle"));
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn materialize_removes_partial_dir_on_producer_failure() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    let store = PackageStore::new(layout.clone());

    let err = store
        .materialize("abc", "index.bundle", |dest| {
            fs::write(dest.join("partial.txt"), b"half written")?;
            Err(anyhow!("producer exploded"))
        })
        .expect_err("must fail");
    assert!(err.to_string().contains("producer exploded"));
    assert!(!store.exists("abc"));
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn materialize_rejects_missing_entry_file() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    let store = PackageStore::new(layout.clone());

    let err = store
        .materialize("abc", "index.bundle", |dest| {
            fs::write(dest.join("something-else.txt"), b"content")?;
            Ok(())
        })
        .expect_err("must fail without entry file");
    assert!(err.to_string().contains("entry file"));
    assert!(!store.exists("abc"));
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn materialize_replaces_stale_directory() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    let store = PackageStore::new(layout.clone());

    let stale = layout.package_dir("abc");
    fs::create_dir_all(&stale).expect("must create stale dir");
    fs::write(stale.join("leftover.txt"), b"old").expect("must write leftover");

    store
        .materialize("abc", "index.bundle", |dest| {
            fs::write(dest.join("index.bundle"), b"fresh")?;
            Ok(())
        })
        .expect("must rebuild");

    assert!(!stale.join("leftover.txt").exists());
    assert!(store.verify_entry_file("abc", "index.bundle"));
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn garbage_collect_keeps_only_keep_set() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    let store = PackageStore::new(layout.clone());

    for key in ["aaa", "bbb", "ccc"] {
        store
            .materialize(key, "index.bundle", |dest| {
                fs::write(dest.join("index.bundle"), key)?;
                Ok(())
            })
            .expect("must materialize");
    }

    let keep: BTreeSet<String> = ["aaa".to_string(), "ccc".to_string()].into();
    let removed = store.garbage_collect(&keep).expect("must collect");
    assert_eq!(removed, vec!["bbb".to_string()]);
    assert!(store.exists("aaa"));
    assert!(!store.exists("bbb"));
    assert!(store.exists("ccc"));
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn garbage_collect_on_missing_updates_dir_is_noop() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    let removed = store
        .garbage_collect(&BTreeSet::new())
        .expect("must tolerate missing dir");
    assert!(removed.is_empty());
    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn save_surfaces_io_error_when_root_is_a_file() {
    let layout = test_layout();
    fs::write(layout.root(), b"not a directory").expect("must create blocking file");

    let store = StateStore::new(layout.clone());
    let err = store
        .save(&VersionState::default())
        .expect_err("save must fail once the retry is exhausted");
    assert!(matches!(err, StoreError::Io { .. }));

    // Reads against the same broken root still degrade to empty state.
    assert_eq!(store.load(), VersionState::default());
    let _ = fs::remove_file(layout.root());
}
