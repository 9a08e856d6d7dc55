//! Device protection across resets and explicit toggles.

use std::sync::atomic::Ordering;

use storage_testing::fixtures::{
    FixtureBuilder, blank_disk, cdrom, disk, live_backing_loop, luks_device,
};
use storage_types::GIB;

fn is_protected(fixture: &storage_testing::fixtures::Fixture, name: &str) -> bool {
    fixture
        .model
        .devicetree()
        .resolve_device(name)
        .map(|cell| cell.read().protected)
        .unwrap_or(false)
}

fn live_media_nodes() -> Vec<storage_model::DeviceNode> {
    let mut usb = blank_disk("sdb", 14 * GIB);
    usb.format.kind = Some("iso9660".to_string());
    usb.format.exists = true;

    vec![
        blank_disk("sda", 500 * GIB),
        usb,
        live_backing_loop("loop0", "sdb"),
        cdrom("sr0"),
    ]
}

#[test]
fn reset_protects_cdroms_iso_devices_and_the_live_chain() {
    let mut fixture = FixtureBuilder::new(live_media_nodes()).build();
    fixture.reset();

    assert!(is_protected(&fixture, "sr0"), "cdrom must be protected");
    assert!(is_protected(&fixture, "sdb"), "iso9660 device and live parent");
    assert!(is_protected(&fixture, "loop0"), "live backing device");
    assert!(!is_protected(&fixture, "sda"));

    // Teardown must have skipped every protected device.
    let torn_down = fixture.scanner.torn_down_names();
    assert!(torn_down.contains(&"sda".to_string()));
    assert!(!torn_down.contains(&"sr0".to_string()));
    assert!(!torn_down.contains(&"sdb".to_string()));
    assert!(!torn_down.contains(&"loop0".to_string()));
}

#[test]
fn requested_protection_survives_another_reset() {
    let mut fixture = FixtureBuilder::new(vec![
        blank_disk("sda", 500 * GIB),
        blank_disk("sdb", 500 * GIB),
    ])
    .build();
    fixture.reset();

    fixture.model.protect_devices(vec!["sda".to_string()]);
    assert!(is_protected(&fixture, "sda"));

    fixture.reset();
    assert!(is_protected(&fixture, "sda"), "reset must not clear protection");
    assert!(!is_protected(&fixture, "sdb"));
}

#[test]
fn protect_devices_applies_the_symmetric_difference() {
    let mut fixture = FixtureBuilder::new(vec![
        blank_disk("sda", 500 * GIB),
        blank_disk("sdb", 500 * GIB),
        blank_disk("sdc", 500 * GIB),
    ])
    .build();
    fixture.reset();

    fixture
        .model
        .protect_devices(vec!["sda".to_string(), "sdb".to_string()]);
    assert!(is_protected(&fixture, "sda"));
    assert!(is_protected(&fixture, "sdb"));

    fixture
        .model
        .protect_devices(vec!["sdb".to_string(), "sdc".to_string()]);
    assert!(!is_protected(&fixture, "sda"), "dropped from the set");
    assert!(is_protected(&fixture, "sdb"), "kept in the set");
    assert!(is_protected(&fixture, "sdc"), "newly added");

    assert_eq!(
        fixture.model.protected_devices(),
        vec!["sdb".to_string(), "sdc".to_string()]
    );
}

#[test]
fn unresolvable_specs_are_skipped_silently() {
    let mut fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)]).build();
    fixture.reset();

    fixture
        .model
        .protect_devices(vec!["sda".to_string(), "ghost".to_string()]);
    assert!(is_protected(&fixture, "sda"));
    assert_eq!(fixture.model.protected_devices().len(), 2);

    // A reset with the stale spec still present must not fail either.
    fixture.reset();
    assert!(is_protected(&fixture, "sda"));
}

#[test]
fn failed_scan_propagates_from_reset() {
    let mut fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)]).build();
    fixture.scanner.fail_next_scan.store(true, Ordering::SeqCst);

    assert!(fixture.model.reset(false).is_err());
}

#[test]
fn luks_passphrases_are_cached_across_resets() {
    let mut fixture = FixtureBuilder::new(vec![
        disk("sda", 500 * GIB),
        luks_device("luks-root", "sda", "hunter2"),
    ])
    .build();

    fixture.reset();
    // The cache fills from the populated tree on the following reset.
    fixture.reset();

    assert_eq!(
        fixture.model.saved_passphrases().get("luks-root"),
        Some(&"hunter2".to_string())
    );
}
