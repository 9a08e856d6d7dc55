//! Escrow certificate caching and container name suggestions.

use storage_model::StorageConfig;
use storage_testing::fixtures::{FixtureBuilder, blank_disk};
use storage_types::GIB;

#[test]
fn escrow_certificates_are_fetched_once_per_url() {
    let mut fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)]).build();

    let url = "https://escrow.example.com/site.crt";
    let first = fixture.model.get_escrow_certificate(url).unwrap();
    let second = fixture.model.get_escrow_certificate(url).unwrap();

    assert_eq!(first, second);
    assert!(first.is_some());
    assert_eq!(fixture.escrow.request_count(), 1);

    fixture
        .model
        .get_escrow_certificate("https://escrow.example.com/other.crt")
        .unwrap();
    assert_eq!(fixture.escrow.request_count(), 2);
}

#[test]
fn empty_escrow_url_yields_nothing_and_no_download() {
    let mut fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)]).build();

    assert_eq!(fixture.model.get_escrow_certificate("").unwrap(), None);
    assert_eq!(fixture.escrow.request_count(), 0);
}

#[test]
fn container_names_take_the_first_dns_label_lowercased() {
    let fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)])
        .hostname(Some("Web01.Example.COM"), None)
        .build();

    assert_eq!(
        fixture.model.container_name_template(Some("fedora")),
        "fedora_web01"
    );
}

#[test]
fn placeholder_hostnames_fall_back_to_the_live_one() {
    let fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)])
        .hostname(Some("localhost.localdomain"), Some("backup.lan"))
        .build();

    assert_eq!(
        fixture.model.container_name_template(Some("fedora")),
        "fedora_backup"
    );
}

#[test]
fn without_any_hostname_the_prefix_stands_alone() {
    let fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)])
        .hostname(Some("localhost"), Some(""))
        .build();

    assert_eq!(
        fixture.model.container_name_template(Some("fedora")),
        "fedora"
    );
    assert_eq!(fixture.model.container_name_template(None), "");
}

#[test]
fn hostnames_are_reduced_to_safe_device_characters() {
    let fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)])
        .hostname(Some("my host!.lan"), None)
        .build();

    assert_eq!(
        fixture.model.container_name_template(Some("fedora")),
        "fedora_myhost"
    );
}

#[test]
fn image_installations_get_an_image_suffix() {
    let config = StorageConfig {
        is_image: true,
        ..StorageConfig::default()
    };

    let fixture = FixtureBuilder::new(vec![blank_disk("sda", 500 * GIB)])
        .config(config)
        .hostname(Some("builder.lan"), None)
        .build();

    assert_eq!(
        fixture.model.container_name_template(Some("fedora")),
        "fedora_builder_image"
    );
}
