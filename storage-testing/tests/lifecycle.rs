//! Defaults, bootloader singleton lifetime and validation-before-
//! mutation on the setters.

use std::sync::atomic::Ordering;

use storage_testing::fixtures::{FixtureBuilder, blank_disk};
use storage_types::GIB;

#[test]
fn invalid_luks_version_is_rejected_before_any_mutation() {
    let mut fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)]).build();
    assert_eq!(fixture.model.default_luks_version(), "luks2");

    assert!(fixture.model.set_default_luks_version("luks9").is_err());
    assert_eq!(fixture.model.default_luks_version(), "luks2");

    fixture.model.set_default_luks_version("luks1").unwrap();
    assert_eq!(fixture.model.default_luks_version(), "luks1");
}

#[test]
fn unknown_default_fstype_is_rejected() {
    let mut fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)]).build();

    assert!(fixture.model.set_default_fstype("ntfs-3g").is_err());
    assert_eq!(fixture.model.default_fstype(), "ext4");

    fixture.model.set_default_fstype("xfs").unwrap();
    assert_eq!(fixture.model.default_fstype(), "xfs");
}

#[test]
fn bootloader_is_built_lazily_and_dropped_on_reset() {
    let mut fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)]).build();
    assert_eq!(fixture.bootloader_factory.created.load(Ordering::SeqCst), 0);

    fixture.model.bootloader();
    fixture.model.bootloader();
    assert_eq!(fixture.bootloader_factory.created.load(Ordering::SeqCst), 1);

    fixture.reset();
    fixture.model.bootloader();
    assert_eq!(
        fixture.bootloader_factory.created.load(Ordering::SeqCst),
        2,
        "a reset must rebuild the singleton on next access"
    );
}

#[test]
fn boot_fstype_is_limited_to_stage2_capable_types() {
    let mut fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)]).build();

    // ext4 is in the mock bootloader's stage2 list.
    assert_eq!(fixture.model.get_fstype(Some("/boot")), "ext4");
    assert_eq!(fixture.model.get_fstype(Some("/var")), "ext4");

    // btrfs is not; /boot falls back to the first stage2 type.
    fixture.model.set_default_fstype("btrfs").unwrap();
    assert_eq!(fixture.model.get_fstype(Some("/var")), "btrfs");
    assert_eq!(fixture.model.get_fstype(Some("/boot")), "ext4");
}

#[test]
fn copies_do_not_share_the_bootloader_singleton() {
    let mut fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)]).build();
    fixture.reset();

    fixture.model.bootloader();
    let baseline = fixture.bootloader_factory.created.load(Ordering::SeqCst);

    let mut copy = fixture.model.copy();
    copy.bootloader();
    assert_eq!(
        fixture.bootloader_factory.created.load(Ordering::SeqCst),
        baseline + 1,
        "the copy must build its own bootloader"
    );
}
