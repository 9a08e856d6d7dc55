//! Load a device layout, drive the storage model through a reset and
//! print what an installer would see.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

use storage_testing::fixtures::FixtureBuilder;
use storage_testing::layout;

use storage_model::DEFAULT_FREE_SPACE_MOUNT_POINTS;
use storage_types::bytes_to_pretty;

#[derive(Parser)]
#[command(name = "storage-sim", about = "Inspect a simulated storage layout")]
struct Args {
    /// Layout name under resources/layouts
    #[arg(long, default_value = "two-disk")]
    layout: String,

    /// Restrict the installation to these disks
    #[arg(long)]
    select: Vec<String>,

    /// Emit machine-readable JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    layout: String,
    usable_disks: Vec<DiskReport>,
    mountpoints: Vec<String>,
    fs_free_space: u64,
    disk_free_space: u64,
    disk_reclaimable_space: u64,
    roots: Vec<String>,
}

#[derive(Serialize)]
struct DiskReport {
    name: String,
    size: u64,
    protected: bool,
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let spec = layout::load_by_name(&args.layout)?;

    let mut fixture = FixtureBuilder::from_layout(spec).build();
    fixture.model.reset(false)?;

    if !args.select.is_empty() {
        fixture.model.select_disks(&args.select);
    }

    let model = &fixture.model;
    let report = Report {
        layout: args.layout,
        usable_disks: model
            .usable_disks()
            .iter()
            .map(|cell| {
                let device = cell.read();
                DiskReport {
                    name: device.name.clone(),
                    size: device.size,
                    protected: device.protected,
                }
            })
            .collect(),
        mountpoints: model.mountpoints().keys().cloned().collect(),
        fs_free_space: model.get_file_system_free_space(DEFAULT_FREE_SPACE_MOUNT_POINTS),
        disk_free_space: model.get_disk_free_space(None),
        disk_reclaimable_space: model.get_disk_reclaimable_space(None),
        roots: model.roots().iter().map(|root| root.name.clone()).collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("layout: {}", report.layout);
    println!("usable disks:");
    for disk in &report.usable_disks {
        println!("  {:<12} {}", disk.name, bytes_to_pretty(&disk.size, false));
    }
    println!("mountpoints: {}", report.mountpoints.join(" "));
    println!(
        "fs free space (/ and /usr): {}",
        bytes_to_pretty(&report.fs_free_space, true)
    );
    println!(
        "disk free: {}  reclaimable: {}",
        bytes_to_pretty(&report.disk_free_space, false),
        bytes_to_pretty(&report.disk_reclaimable_space, false)
    );
    if !report.roots.is_empty() {
        println!("existing installations: {}", report.roots.join(", "));
    }

    Ok(())
}
