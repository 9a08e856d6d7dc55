//! Free-space aggregation: filesystem totals, composite-volume
//! deduplication and the raw vs reclaimable split.

use storage_model::Format;
use storage_testing::fixtures::{
    FixtureBuilder, blank_disk, disk, partition, planned_partition, subvolume, volume,
};
use storage_types::{DiskLabelKind, GIB};

const POOL_FREE: u64 = 10_000_000_000;

#[test]
fn sibling_subvolumes_count_their_volume_once() {
    let mut member = partition("sda1", "sda", 480 * GIB, "btrfs", None);
    member.format.free = 0;

    let mut fixture = FixtureBuilder::new(vec![
        disk("sda", 500 * GIB),
        member,
        volume("fedora", &["sda1"], POOL_FREE),
        subvolume("root", "fedora", POOL_FREE, "/"),
        subvolume("usr", "fedora", POOL_FREE, "/usr"),
    ])
    .build();
    fixture.reset();

    assert_eq!(
        fixture.model.get_file_system_free_space(&["/", "/usr"]),
        POOL_FREE,
        "the shared pool must not be counted twice"
    );
}

#[test]
fn planned_filesystems_use_the_estimate() {
    let mut fixture = FixtureBuilder::new(vec![
        disk("sda", 500 * GIB),
        planned_partition("sda2", "sda", 50 * GIB, "ext4", Some("/")),
    ])
    .build();
    fixture.reset();

    let expected = Format {
        kind: Some("ext4".to_string()),
        ..Format::default()
    }
    .free_space_estimate(50 * GIB);

    assert_eq!(fixture.model.get_file_system_free_space(&["/"]), expected);
}

#[test]
fn unknown_mount_points_contribute_nothing() {
    let mut fixture = FixtureBuilder::new(vec![
        disk("sda", 500 * GIB),
        partition("sda2", "sda", 480 * GIB, "ext4", Some("/")),
    ])
    .build();
    fixture.reset();

    assert_eq!(fixture.model.get_file_system_free_space(&["/var/games"]), 0);
}

#[test]
fn raw_and_reclaimable_space_are_reported_separately() {
    let mut target = disk("sda", 500 * GIB);
    target.raw_free = 5 * GIB;
    target.reclaimable_free = 3 * GIB;

    let mut fixture = FixtureBuilder::new(vec![target]).build();
    fixture.reset();

    assert_eq!(fixture.model.get_disk_free_space(None), 5 * GIB);
    assert_eq!(fixture.model.get_disk_reclaimable_space(None), 3 * GIB);
}

#[test]
fn uninitialized_disks_pass_the_label_filter() {
    let mut fresh = blank_disk("sdb", 250 * GIB);
    fresh.raw_free = 250 * GIB;

    let mut fixture = FixtureBuilder::new(vec![fresh]).build();
    fixture.reset();

    assert_eq!(fixture.model.get_disk_free_space(None), 250 * GIB);
}

#[test]
fn foreign_disk_labels_are_skipped_on_common_platforms() {
    if !cfg!(any(target_arch = "x86_64", target_arch = "aarch64")) {
        return;
    }

    let mut sun_disk = disk("sdd", 500 * GIB);
    sun_disk.format.label_type = Some(DiskLabelKind::Sun);
    sun_disk.raw_free = 100 * GIB;

    let mut supported = disk("sda", 500 * GIB);
    supported.raw_free = 7 * GIB;

    let mut fixture = FixtureBuilder::new(vec![sun_disk, supported]).build();
    fixture.reset();

    assert_eq!(fixture.model.get_disk_free_space(None), 7 * GIB);
}
