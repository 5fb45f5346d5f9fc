/// Topology builder — assembles parsed records into the Disk → Partition
/// tree, and flattens that tree for direct lookup by partition id.
///
/// Secondary lookups (macOS `diskutil info`, per-disk `detail disk`) are
/// passed in as closures so the builder stays free of process plumbing and
/// can be exercised with canned records. A failed lookup never drops data:
/// the entity keeps what the listing already told us and an [`Issue`] is
/// recorded.
use crate::config::VolumeGrouping;
use crate::error::{InventoryError, Result};
use crate::model::{Disk, DiskMap, Issue, Partition, PartitionMap, Snapshot};
use crate::parser::diskpart::{DiskDetail, ListDiskRow, DISK_ID_KEY};
use crate::parser::diskutil::{ContainerRecord, DiskInfo, ListEntry};
use crate::parser::wmi::{DiskDriveRecord, PartitionLink, VolumeRecord};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Name of the synthetic disk holding volumes no physical disk claims.
pub const UNASSIGNED_DISK_NAME: &str = "Unassigned volumes";

/// Output of a build step: the tree plus the problems met on the way.
#[derive(Debug, Default)]
pub struct Built {
    pub disks: DiskMap,
    pub volumes: PartitionMap,
    pub issues: Vec<Issue>,
}

fn synthetic_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── macOS ───────────────────────────────────────────────────────────────────

/// Build the tree from `diskutil list` entries.
///
/// `info` runs `diskutil info` for a device. It supplies each disk's display
/// name and resolves each APFS container's physical store to its whole
/// disk. Disks are keyed by device identifier, so two disks with the same
/// media name stay separate.
pub fn build_diskutil<F>(entries: Vec<ListEntry>, mut info: F) -> Built
where
    F: FnMut(&str) -> Result<DiskInfo>,
{
    let mut built = Built::default();
    let mut containers = Vec::new();
    // Partition device → owning disk id, for stores whose lookup fails.
    let mut owner_of: HashMap<String, String> = HashMap::new();

    for entry in entries {
        let record = match entry {
            ListEntry::Disk(record) => record,
            ListEntry::Container(container) => {
                containers.push(container);
                continue;
            }
        };

        let id = if record.device.is_empty() {
            synthetic_id()
        } else {
            record.device.clone()
        };
        let mut disk = Disk::new(id.clone(), record.device.clone(), record.size);
        disk.kind = record.content;

        match info(&record.device) {
            Ok(details) => {
                if !details.media_name.is_empty() {
                    disk.name = details.media_name;
                }
                if disk.size == 0 {
                    disk.size = details.total_size;
                }
            }
            Err(e) => {
                warn!("diskutil info {} failed: {e}", record.device);
                built.issues.push(Issue::new(format!("info {}", record.device), &e));
            }
        }
        if disk.name.is_empty() {
            disk.name = id.clone();
        }

        for partition in record.partitions {
            let partition = partition.into_partition();
            if !partition.device.is_empty() {
                owner_of.insert(partition.device.clone(), id.clone());
            }
            disk.insert_partition(partition);
        }
        built.disks.insert(id, disk);
    }

    for container in containers {
        attach_container(&mut built, container, &owner_of, &mut info);
    }
    built
}

/// Nest a container's volumes under the partition backing it.
fn attach_container<F>(
    built: &mut Built,
    container: ContainerRecord,
    owner_of: &HashMap<String, String>,
    info: &mut F,
) where
    F: FnMut(&str) -> Result<DiskInfo>,
{
    let store = container.physical_stores.first().cloned().unwrap_or_default();

    let parent = if store.is_empty() {
        None
    } else {
        match info(&store) {
            Ok(details) if built.disks.contains_key(&details.parent_whole_disk) => {
                Some(details.parent_whole_disk)
            }
            Ok(_) => owner_of.get(&store).cloned(),
            Err(e) => {
                warn!("diskutil info {store} failed: {e}");
                built.issues.push(Issue::new(format!("info {store}"), &e));
                owner_of.get(&store).cloned()
            }
        }
    };

    let volumes: PartitionMap = container
        .volumes
        .into_iter()
        .map(|v| {
            let p = v.into_partition();
            (p.id.clone(), p)
        })
        .collect();

    let disk = match parent {
        Some(id) => built.disks.get_mut(&id),
        None => None,
    };
    let Some(disk) = disk else {
        debug!("Container {} has no known parent disk", container.device);
        let id = if container.device.is_empty() {
            synthetic_id()
        } else {
            container.device.clone()
        };
        let mut disk = Disk::new(id.clone(), id.clone(), container.size);
        disk.kind = "APFS Container".into();
        disk.partitions = volumes;
        built.disks.insert(id, disk);
        return;
    };

    match disk.partitions.values().position(|p| p.device == store) {
        Some(i) => {
            if let Some((_, backing)) = disk.partitions.get_index_mut(i) {
                backing.sub_partitions.extend(volumes);
            }
        }
        None => disk.partitions.extend(volumes),
    }
}

// ── Windows: diskpart ───────────────────────────────────────────────────────

/// Build the tree from `list disk` rows plus one `detail disk` per row.
pub fn build_diskpart<F>(rows: &[ListDiskRow], mut detail: F) -> Built
where
    F: FnMut(u32) -> Result<DiskDetail>,
{
    let mut built = Built::default();

    for row in rows {
        let fallback_id = format!("Disk {}", row.number);
        let details = match detail(row.number) {
            Ok(d) if d.field(DISK_ID_KEY).is_empty() => {
                // diskpart prints its errors on stdout with exit code 0.
                let e = InventoryError::parse(
                    format!("diskpart detail disk {}", row.number),
                    "no Disk ID in output",
                );
                warn!("detail disk {}: {e}", row.number);
                built.issues.push(Issue::new(format!("detail disk {}", row.number), &e));
                d
            }
            Ok(d) => d,
            Err(e) => {
                warn!("detail disk {} failed: {e}", row.number);
                built.issues.push(Issue::new(format!("detail disk {}", row.number), &e));
                DiskDetail::default()
            }
        };

        // Uninitialised disks all report the same zero signature.
        let mut id = details.field(DISK_ID_KEY).to_string();
        if id.is_empty() || built.disks.contains_key(&id) {
            id = fallback_id.clone();
        }
        let name = if details.name.is_empty() {
            fallback_id
        } else {
            details.name.clone()
        };

        let mut disk = Disk::new(id.clone(), name, row.size);
        disk.kind = details.field("Type").to_string();
        for volume in details.volumes {
            disk.insert_partition(
                Partition::new(volume.number, volume.name, volume.size)
                    .with_mount_point(volume.mount_point),
            );
        }
        built.disks.insert(id, disk);
    }
    built
}

// ── Windows: management queries ─────────────────────────────────────────────

/// Build the tree from CIM volume/disk records.
///
/// In [`VolumeGrouping::Linked`] mode volumes are placed under the disk whose
/// partitions list the volume's device id (or drive root) among their
/// access paths; anything unclaimed lands on one synthetic disk. In
/// [`VolumeGrouping::Standalone`] mode only the flat volume map is filled.
pub fn build_management(
    drives: &[DiskDriveRecord],
    volumes: &[VolumeRecord],
    links: &[PartitionLink],
    grouping: VolumeGrouping,
) -> Built {
    let mut built = Built::default();

    if grouping == VolumeGrouping::Standalone {
        built.volumes = volumes
            .iter()
            .map(|v| (v.device_id.clone(), volume_partition(v)))
            .collect();
        return built;
    }

    // Lower-cased access path → disk number.
    let disk_of: HashMap<String, u32> = links
        .iter()
        .flat_map(|link| {
            link.access_paths
                .iter()
                .map(move |path| (path.to_ascii_lowercase(), link.disk_number))
        })
        .collect();

    for drive in drives {
        let id = drive.index.to_string();
        let name = if drive.model.is_empty() {
            format!("Disk {}", drive.index)
        } else {
            drive.model.clone()
        };
        built.disks.insert(id.clone(), Disk::new(id, name, drive.size));
    }

    let mut unassigned = Disk::new(synthetic_id(), UNASSIGNED_DISK_NAME, 0);
    for volume in volumes {
        let owner_id = disk_of
            .get(&volume.device_id.to_ascii_lowercase())
            .or_else(|| disk_of.get(&volume.mount_point().to_ascii_lowercase()))
            .map(u32::to_string)
            .unwrap_or_default();
        match built.disks.get_mut(&owner_id) {
            Some(disk) => disk.insert_partition(volume_partition(volume)),
            None => {
                unassigned.size += volume.capacity;
                unassigned.insert_partition(volume_partition(volume));
            }
        }
    }
    if !unassigned.partitions.is_empty() {
        built.disks.insert(unassigned.id.clone(), unassigned);
    }
    built
}

fn volume_partition(volume: &VolumeRecord) -> Partition {
    Partition::new(volume.device_id.clone(), volume.label.clone(), volume.capacity)
        .with_device(volume.device_id.clone())
        .with_mount_point(volume.mount_point())
}

// ── Flattening ──────────────────────────────────────────────────────────────

/// One partition in the flattened view of a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct FlatEntry<'a> {
    /// Owning disk, `None` for standalone volumes.
    pub disk_id: Option<&'a str>,
    /// 0 for top-level partitions, 1 for container volumes, …
    pub depth: u16,
    pub partition: &'a Partition,
}

/// Depth-first list of every partition in the snapshot, nested entries and
/// standalone volumes included, in display order.
pub fn flatten(snapshot: &Snapshot) -> Vec<FlatEntry<'_>> {
    let mut out = Vec::new();
    for disk in snapshot.disks.values() {
        push_all(&mut out, Some(disk.id.as_str()), &disk.partitions, 0);
    }
    push_all(&mut out, None, &snapshot.standalone_volumes, 0);
    out
}

fn push_all<'a>(
    out: &mut Vec<FlatEntry<'a>>,
    disk_id: Option<&'a str>,
    partitions: &'a PartitionMap,
    depth: u16,
) {
    for partition in partitions.values() {
        out.push(FlatEntry {
            disk_id,
            depth,
            partition,
        });
        push_all(out, disk_id, &partition.sub_partitions, depth + 1);
    }
}

/// An owned lookup result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub disk_id: Option<String>,
    pub partition: Partition,
}

/// O(1) lookup of any partition in a snapshot by id.
#[derive(Debug, Clone, Default)]
pub struct EntryIndex {
    entries: HashMap<String, Entry>,
}

impl EntryIndex {
    /// Index every flattened entry. When an id repeats (ids are only unique
    /// per parent map), the first occurrence wins.
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut entries = HashMap::new();
        for flat in flatten(snapshot) {
            if entries.contains_key(&flat.partition.id) {
                warn!("Duplicate partition id {} in index", flat.partition.id);
                continue;
            }
            entries.insert(
                flat.partition.id.clone(),
                Entry {
                    disk_id: flat.disk_id.map(str::to_string),
                    partition: flat.partition.clone(),
                },
            );
        }
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
