/// Parser for macOS `diskutil list -plist` and `diskutil info -plist`.
///
/// The list output has one entry per whole disk under
/// `AllDisksAndPartitions`. Entries come in two shapes:
///
/// - a **disk**: `DeviceIdentifier`, `Size`, `Partitions`, …
/// - an **APFS container**: additionally `APFSPhysicalStores` and
///   `APFSVolumes`; it is backed by a partition of some other disk.
///
/// Shapes are told apart by which named keys are present, never by how many
/// keys a dictionary has, so an extra field in a new macOS release does not
/// flip a record into the wrong branch.
use crate::error::{InventoryError, Result};
use crate::model::Partition;
use plist::{Dictionary, Value};
use std::io::Cursor;
use tracing::warn;

/// Partition content type of NTFS/exFAT partitions created by Boot Camp or
/// Windows.
pub const MICROSOFT_BASIC_DATA: &str = "Microsoft Basic Data";

/// Top-level record of `diskutil list -plist`, in listing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEntry {
    Disk(DiskRecord),
    Container(ContainerRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRecord {
    /// `disk0`, `disk2`, …
    pub device: String,
    pub size: u64,
    /// Partition scheme, e.g. `GUID_partition_scheme`.
    pub content: String,
    pub partitions: Vec<PartitionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Synthesized container disk, e.g. `disk3`.
    pub device: String,
    pub size: u64,
    /// Backing partitions, e.g. `disk0s2`.
    pub physical_stores: Vec<String>,
    pub volumes: Vec<PartitionRecord>,
}

/// A partition (or APFS volume) record, classified by its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionRecord {
    /// `Content == "Microsoft Basic Data"`. Its label is the last component
    /// of the path diskutil reports for it.
    ForeignData {
        id: String,
        device: String,
        mount_point: String,
        name: String,
        size: u64,
    },
    Mounted {
        id: String,
        device: String,
        name: String,
        mount_point: String,
        size: u64,
    },
    Unmounted {
        id: String,
        device: String,
        name: String,
        size: u64,
    },
}

impl PartitionRecord {
    pub fn id(&self) -> &str {
        match self {
            Self::ForeignData { id, .. } | Self::Mounted { id, .. } | Self::Unmounted { id, .. } => id,
        }
    }

    pub fn into_partition(self) -> Partition {
        match self {
            Self::ForeignData { id, device, mount_point, name, size }
            | Self::Mounted { id, device, name, mount_point, size } => Partition::new(id, name, size)
                .with_device(device)
                .with_mount_point(mount_point),
            Self::Unmounted { id, device, name, size } => {
                Partition::new(id, name, size).with_device(device)
            }
        }
    }
}

/// Fields of `diskutil info -plist <device>` the inventory uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskInfo {
    pub device_identifier: String,
    /// Vendor/model string, e.g. `APPLE SSD AP0512Q`.
    pub media_name: String,
    pub mount_point: String,
    /// Whole disk owning this device, e.g. `disk0` for `disk0s2`.
    pub parent_whole_disk: String,
    pub total_size: u64,
}

/// Parse `diskutil list -plist` output (XML or binary).
pub fn parse_list(bytes: &[u8]) -> Result<Vec<ListEntry>> {
    let root = read_dictionary(bytes, "diskutil list")?;
    let all = root
        .get("AllDisksAndPartitions")
        .and_then(Value::as_array)
        .ok_or_else(|| InventoryError::parse("diskutil list", "missing AllDisksAndPartitions"))?;

    let mut entries = Vec::with_capacity(all.len());
    for value in all {
        let Some(dict) = value.as_dictionary() else {
            warn!("Skipping non-dictionary diskutil entry");
            continue;
        };
        entries.push(classify_entry(dict));
    }
    Ok(entries)
}

/// Parse `diskutil info -plist <device>` output.
pub fn parse_info(bytes: &[u8]) -> Result<DiskInfo> {
    let dict = read_dictionary(bytes, "diskutil info")?;
    Ok(DiskInfo {
        device_identifier: string(&dict, "DeviceIdentifier"),
        media_name: first_string(&dict, &["MediaName", "IORegistryEntryName"]),
        mount_point: string(&dict, "MountPoint"),
        parent_whole_disk: string(&dict, "ParentWholeDisk"),
        total_size: first_unsigned(&dict, &["TotalSize", "Size"]),
    })
}

fn read_dictionary(bytes: &[u8], what: &str) -> Result<Dictionary> {
    let value = Value::from_reader(Cursor::new(bytes)).map_err(|e| InventoryError::parse(what, e))?;
    value
        .into_dictionary()
        .ok_or_else(|| InventoryError::parse(what, "top level is not a dictionary"))
}

fn classify_entry(dict: &Dictionary) -> ListEntry {
    let device = string(dict, "DeviceIdentifier");
    let size = unsigned(dict, "Size");

    if dict.contains_key("APFSVolumes") || dict.contains_key("APFSPhysicalStores") {
        let physical_stores = array_of_dicts(dict, "APFSPhysicalStores")
            .map(|store| string(store, "DeviceIdentifier"))
            .filter(|id| !id.is_empty())
            .collect();
        let volumes = array_of_dicts(dict, "APFSVolumes").map(classify_partition).collect();
        ListEntry::Container(ContainerRecord {
            device,
            size,
            physical_stores,
            volumes,
        })
    } else {
        let partitions = array_of_dicts(dict, "Partitions").map(classify_partition).collect();
        ListEntry::Disk(DiskRecord {
            device,
            size,
            content: string(dict, "Content"),
            partitions,
        })
    }
}

fn classify_partition(dict: &Dictionary) -> PartitionRecord {
    let device = string(dict, "DeviceIdentifier");
    let size = unsigned(dict, "Size");
    let (id, id_as_mount) = pick_id(dict, &device);
    let mount_point = match string(dict, "MountPoint") {
        m if m.is_empty() => id_as_mount.unwrap_or_default(),
        m => m,
    };

    if string(dict, "Content") == MICROSOFT_BASIC_DATA {
        let name = match mount_point.rsplit('/').next() {
            Some(last) if !last.is_empty() => last.to_string(),
            _ => string(dict, "VolumeName"),
        };
        return PartitionRecord::ForeignData {
            id,
            device,
            mount_point,
            name,
            size,
        };
    }

    let name = string(dict, "VolumeName");
    if mount_point.is_empty() {
        PartitionRecord::Unmounted { id, device, name, size }
    } else {
        PartitionRecord::Mounted {
            id,
            device,
            name,
            mount_point,
            size,
        }
    }
}

/// Choose the partition id: `DiskUUID`, then `VolumeUUID`, then the device.
///
/// Some diskutil versions put the mount path where the first id field is
/// expected. An absolute path there is returned as the mount point and the
/// id comes from the next candidate.
fn pick_id(dict: &Dictionary, device: &str) -> (String, Option<String>) {
    let mut mount = None;
    for key in ["DiskUUID", "VolumeUUID"] {
        let candidate = string(dict, key);
        if candidate.is_empty() {
            continue;
        }
        if candidate.starts_with('/') {
            mount.get_or_insert(candidate);
            continue;
        }
        return (candidate, mount);
    }
    (device.to_string(), mount)
}

fn array_of_dicts<'a>(dict: &'a Dictionary, key: &str) -> impl Iterator<Item = &'a Dictionary> {
    dict.get(key)
        .and_then(Value::as_array)
        .map(|a| a.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_dictionary)
}

fn string(dict: &Dictionary, key: &str) -> String {
    dict.get(key)
        .and_then(Value::as_string)
        .unwrap_or_default()
        .to_string()
}

fn first_string(dict: &Dictionary, keys: &[&str]) -> String {
    keys.iter()
        .map(|k| string(dict, k))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn unsigned(dict: &Dictionary, key: &str) -> u64 {
    dict.get(key)
        .and_then(Value::as_unsigned_integer)
        .unwrap_or_default()
}

fn first_unsigned(dict: &Dictionary, keys: &[&str]) -> u64 {
    keys.iter()
        .map(|k| unsigned(dict, k))
        .find(|&n| n > 0)
        .unwrap_or_default()
}
