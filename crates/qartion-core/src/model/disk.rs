/// Disk and partition records — the normalised tree every platform parser
/// produces.
///
/// Both maps are insertion-ordered so the UI shows disks and partitions in
/// the same order the platform utility enumerated them.
use indexmap::IndexMap;
use serde::Serialize;

/// Ordered mapping from partition id to partition.
pub type PartitionMap = IndexMap<String, Partition>;

/// Ordered mapping from disk id to disk.
pub type DiskMap = IndexMap<String, Disk>;

/// A physical (or synthetic) disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Disk {
    /// Platform id (`disk0`, diskpart `Disk ID`, WMI index) or a generated UUID.
    pub id: String,
    /// Human-readable label, e.g. the media name.
    pub name: String,
    /// Total capacity in bytes. Not required to equal the sum of partitions.
    pub size: u64,
    /// Platform type string such as `NVMe` or `USB`. Often empty.
    pub kind: String,
    pub partitions: PartitionMap,
}

impl Disk {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            kind: String::new(),
            partitions: PartitionMap::new(),
        }
    }

    /// Insert a partition keyed by its id. A repeated id replaces the earlier
    /// entry in place, keeping its original position.
    pub fn insert_partition(&mut self, partition: Partition) {
        self.partitions.insert(partition.id.clone(), partition);
    }
}

/// A partition or volume. Container volumes nest further entries in
/// `sub_partitions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub id: String,
    /// Volume label. May be empty.
    pub name: String,
    pub size: u64,
    /// Device node or platform handle used to mount, e.g. `disk2s1`.
    /// Empty on platforms that mount by id alone.
    pub device: String,
    /// Empty when not mounted, otherwise an absolute path or `X:\` root.
    pub mount_point: String,
    pub sub_partitions: PartitionMap,
}

impl Partition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            ..Default::default()
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn with_mount_point(mut self, mount_point: impl Into<String>) -> Self {
        self.mount_point = mount_point.into();
        self
    }

    /// `true` when the partition has a non-empty mount point.
    pub fn is_mounted(&self) -> bool {
        !self.mount_point.is_empty()
    }

    /// Label to show when `name` is empty.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}
