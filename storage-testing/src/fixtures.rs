//! Device-node builders and a model fixture wired to the mocks.

use std::sync::Arc;

use storage_model::{
    Collaborators, DeviceNode, DeviceNodeKind, FormatNode, StorageConfig, StorageModel,
};
use storage_types::{GIB, MIB};
use uuid::Uuid;

use crate::layout::LayoutSpec;
use crate::mock::{
    FixedHostname, MockBootloaderFactory, MockEscrowFetcher, MockMountOps, MockRootFinder,
    MockScanner, RootBlueprint,
};

fn node(name: &str, kind: DeviceNodeKind) -> DeviceNode {
    DeviceNode {
        name: name.to_string(),
        path: None,
        size: 0,
        kind,
        parents: Vec::new(),
        media_present: true,
        hidden: false,
        protected: false,
        format: FormatNode::default(),
        raw_free: 0,
        reclaimable_free: 0,
        backing_file: None,
        volume: None,
        req_disks: Vec::new(),
        has_parted: false,
    }
}

/// A disk with an existing GPT label.
pub fn disk(name: &str, size: u64) -> DeviceNode {
    DeviceNode {
        size,
        format: FormatNode {
            kind: Some("disklabel".to_string()),
            exists: true,
            label_type: Some(storage_types::DiskLabelKind::Gpt),
            ..FormatNode::default()
        },
        ..node(name, DeviceNodeKind::Disk)
    }
}

/// An uninitialized disk, no label at all.
pub fn blank_disk(name: &str, size: u64) -> DeviceNode {
    DeviceNode {
        size,
        ..node(name, DeviceNodeKind::Disk)
    }
}

/// An unformatted DASD; scans with size 0.
pub fn dasd(name: &str) -> DeviceNode {
    node(name, DeviceNodeKind::Dasd)
}

pub fn cdrom(name: &str) -> DeviceNode {
    DeviceNode {
        size: 700 * MIB,
        format: FormatNode {
            kind: Some("iso9660".to_string()),
            exists: true,
            ..FormatNode::default()
        },
        ..node(name, DeviceNodeKind::Cdrom)
    }
}

/// An existing formatted partition with a live table handle.
pub fn partition(
    name: &str,
    parent: &str,
    size: u64,
    fs: &str,
    mountpoint: Option<&str>,
) -> DeviceNode {
    DeviceNode {
        size,
        parents: vec![parent.to_string()],
        req_disks: vec![parent.to_string()],
        has_parted: true,
        format: FormatNode {
            kind: Some(fs.to_string()),
            exists: true,
            free: size / 2,
            mountpoint: mountpoint.map(str::to_string),
            uuid: Some(Uuid::new_v4()),
            ..FormatNode::default()
        },
        ..node(name, DeviceNodeKind::Partition)
    }
}

/// A partition whose filesystem does not exist yet.
pub fn planned_partition(
    name: &str,
    parent: &str,
    size: u64,
    fs: &str,
    mountpoint: Option<&str>,
) -> DeviceNode {
    let mut planned = partition(name, parent, size, fs, mountpoint);
    planned.format.exists = false;
    planned.format.free = 0;
    planned.format.uuid = None;
    planned.has_parted = false;
    planned
}

pub fn swap_partition(name: &str, parent: &str, size: u64) -> DeviceNode {
    DeviceNode {
        size,
        parents: vec![parent.to_string()],
        req_disks: vec![parent.to_string()],
        has_parted: true,
        format: FormatNode {
            kind: Some("swap".to_string()),
            exists: true,
            uuid: Some(Uuid::new_v4()),
            ..FormatNode::default()
        },
        ..node(name, DeviceNodeKind::Partition)
    }
}

/// A composite btrfs volume over the given members.
pub fn volume(name: &str, members: &[&str], free: u64) -> DeviceNode {
    DeviceNode {
        size: free * 2,
        parents: members.iter().map(|member| member.to_string()).collect(),
        format: FormatNode {
            kind: Some("btrfs".to_string()),
            exists: true,
            free,
            ..FormatNode::default()
        },
        ..node(name, DeviceNodeKind::Volume)
    }
}

/// A subvolume of a composite volume, sharing its backing free space.
pub fn subvolume(name: &str, volume_name: &str, free: u64, mountpoint: &str) -> DeviceNode {
    DeviceNode {
        size: free,
        parents: vec![volume_name.to_string()],
        volume: Some(volume_name.to_string()),
        format: FormatNode {
            kind: Some("btrfs".to_string()),
            exists: true,
            free,
            mountpoint: Some(mountpoint.to_string()),
            ..FormatNode::default()
        },
        ..node(name, DeviceNodeKind::Subvolume)
    }
}

pub fn luks_device(name: &str, parent: &str, passphrase: &str) -> DeviceNode {
    DeviceNode {
        size: 100 * GIB,
        parents: vec![parent.to_string()],
        format: FormatNode {
            kind: Some("luks".to_string()),
            exists: true,
            luks_version: Some("luks2".to_string()),
            passphrase: Some(passphrase.to_string()),
            ..FormatNode::default()
        },
        ..node(name, DeviceNodeKind::Luks)
    }
}

/// The loop device backing a live installation medium.
pub fn live_backing_loop(name: &str, parent: &str) -> DeviceNode {
    DeviceNode {
        size: 4 * GIB,
        parents: vec![parent.to_string()],
        backing_file: Some("/run/initramfs/squashed.img".to_string()),
        format: FormatNode {
            kind: Some("ext4".to_string()),
            exists: true,
            mountpoint: Some("/run/initramfs/live".to_string()),
            ..FormatNode::default()
        },
        ..node(name, DeviceNodeKind::Loop)
    }
}

/// A storage model wired to recording mocks.
pub struct Fixture {
    pub model: StorageModel,
    pub scanner: Arc<MockScanner>,
    pub mount_ops: Arc<MockMountOps>,
    pub escrow: Arc<MockEscrowFetcher>,
    pub bootloader_factory: Arc<MockBootloaderFactory>,
}

impl Fixture {
    /// Reset the model once, as the installer control loop does at
    /// startup.
    pub fn reset(&mut self) {
        self.model.reset(false).expect("reset should succeed");
    }

    pub fn usable_names(&self) -> Vec<String> {
        self.model
            .usable_disks()
            .iter()
            .map(|cell| cell.name())
            .collect()
    }
}

pub struct FixtureBuilder {
    nodes: Vec<DeviceNode>,
    config: StorageConfig,
    hostname: FixedHostname,
    roots: Vec<RootBlueprint>,
}

impl FixtureBuilder {
    pub fn new(nodes: Vec<DeviceNode>) -> Self {
        Self {
            nodes,
            config: StorageConfig::default(),
            hostname: FixedHostname::default(),
            roots: Vec::new(),
        }
    }

    pub fn from_layout(spec: LayoutSpec) -> Self {
        Self::new(spec.devices).config(spec.config)
    }

    pub fn config(mut self, config: StorageConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hostname(mut self, configured: Option<&str>, live: Option<&str>) -> Self {
        self.hostname = FixedHostname {
            configured: configured.map(str::to_string),
            live: live.map(str::to_string),
        };
        self
    }

    pub fn roots(mut self, roots: Vec<RootBlueprint>) -> Self {
        self.roots = roots;
        self
    }

    pub fn build(self) -> Fixture {
        let scanner = Arc::new(MockScanner::new(self.nodes));
        let mount_ops = Arc::new(MockMountOps::default());
        let escrow = Arc::new(MockEscrowFetcher::default());
        let bootloader_factory = Arc::new(MockBootloaderFactory::default());

        let collaborators = Collaborators {
            scanner: scanner.clone(),
            root_finder: Arc::new(MockRootFinder {
                blueprints: self.roots,
            }),
            format_registry: Arc::new(storage_model::BuiltinFormatRegistry),
            bootloader_factory: bootloader_factory.clone(),
            mount_ops: mount_ops.clone(),
            escrow: escrow.clone(),
            hostname_source: Arc::new(self.hostname),
        };

        let model = StorageModel::new(self.config, collaborators)
            .expect("fixture configuration should be valid");

        Fixture {
            model,
            scanner,
            mount_ops,
            escrow,
            bootloader_factory,
        }
    }
}
