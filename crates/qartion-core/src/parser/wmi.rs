/// Parser for PowerShell `Format-List` output of CIM/WMI queries.
///
/// Records are separated by blank lines; each field is `Name : Value` with
/// the name starting in column 0. Long values wrap onto indented
/// continuation lines, which are appended to the previous field.
use super::Record;
use tracing::debug;

/// `Win32_Volume` query used for volume enumeration and mount re-query.
pub const VOLUME_QUERY: &str = "Get-CimInstance -ClassName Win32_Volume | Format-List -Property \
     Label,DriveLetter,DeviceID,SystemVolume,Capacity,FreeSpace,FileSystem | Out-String -Width 4096";

/// `Win32_DiskDrive` query for physical disks.
pub const DISK_QUERY: &str = "Get-CimInstance -ClassName Win32_DiskDrive | Format-List -Property \
     Index,Model,Size,DeviceID | Out-String -Width 4096";

/// Disk-number ↔ access-path cross reference.
pub const PARTITION_QUERY: &str = "Get-Partition | Format-List -Property \
     DiskNumber,PartitionNumber,AccessPaths | Out-String -Width 4096";

/// A `Win32_Volume` instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeRecord {
    /// `\\?\Volume{…}\`, the handle `mountvol` accepts.
    pub device_id: String,
    pub label: String,
    /// Bare letter (`C`), empty when none is assigned.
    pub drive_letter: String,
    pub capacity: u64,
    pub free_space: u64,
    pub file_system: String,
    pub system_volume: bool,
}

impl VolumeRecord {
    /// `C:\` style root, or empty.
    pub fn mount_point(&self) -> String {
        if self.drive_letter.is_empty() {
            String::new()
        } else {
            format!("{}:\\", self.drive_letter)
        }
    }
}

/// A `Win32_DiskDrive` instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskDriveRecord {
    pub index: u32,
    pub model: String,
    pub size: u64,
    /// `\\.\PHYSICALDRIVE0`
    pub device_id: String,
}

/// A `Get-Partition` row linking a disk number to volume access paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionLink {
    pub disk_number: u32,
    pub partition_number: u32,
    pub access_paths: Vec<String>,
}

/// Split `Format-List` output into ordered records.
pub fn parse_records(output: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current = Record::new();
    let mut last_key: Option<String> = None;

    for line in output.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            last_key = None;
            continue;
        }

        let continuation = line.starts_with(char::is_whitespace);
        if continuation {
            if let Some(value) = last_key.as_ref().and_then(|k| current.get_mut(k)) {
                value.push_str(line.trim());
                continue;
            }
        }

        match line.split_once(':') {
            Some((key, value)) => {
                let key = key.trim().to_string();
                current.insert(key.clone(), value.trim().to_string());
                last_key = Some(key);
            }
            None => debug!("Ignoring line without a field name: {line:?}"),
        }
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

/// Parse the volume query. Volumes with no filesystem, label or capacity
/// (unformatted or placeholder entries) are dropped.
/// `true` when at least one record carries `key`.
///
/// PowerShell reports cmdlet errors as text, which still splits into
/// `Name : Value` pairs; checking for the query's own key tells a real
/// result apart from an error message.
pub fn has_records(output: &str, key: &str) -> bool {
    parse_records(output).iter().any(|r| r.contains_key(key))
}

pub fn parse_volumes(output: &str) -> Vec<VolumeRecord> {
    parse_records(output)
        .iter()
        .map(|r| VolumeRecord {
            device_id: field(r, "DeviceID"),
            label: field(r, "Label"),
            drive_letter: field(r, "DriveLetter").trim_end_matches(':').to_string(),
            capacity: number(r, "Capacity"),
            free_space: number(r, "FreeSpace"),
            file_system: field(r, "FileSystem"),
            system_volume: field(r, "SystemVolume").eq_ignore_ascii_case("true"),
        })
        .filter(|v| !(v.file_system.is_empty() && v.label.is_empty() && v.capacity == 0))
        .filter(|v| !v.device_id.is_empty())
        .collect()
}

pub fn parse_disk_drives(output: &str) -> Vec<DiskDriveRecord> {
    parse_records(output)
        .iter()
        .filter(|r| r.contains_key("Index"))
        .map(|r| DiskDriveRecord {
            index: number(r, "Index") as u32,
            model: field(r, "Model"),
            size: number(r, "Size"),
            device_id: field(r, "DeviceID"),
        })
        .collect()
}

pub fn parse_partition_links(output: &str) -> Vec<PartitionLink> {
    parse_records(output)
        .iter()
        .filter(|r| r.contains_key("DiskNumber"))
        .map(|r| PartitionLink {
            disk_number: number(r, "DiskNumber") as u32,
            partition_number: number(r, "PartitionNumber") as u32,
            access_paths: parse_list_value(&field(r, "AccessPaths")),
        })
        .collect()
}

/// `{C:\, \\?\Volume{…}\}` → `["C:\", "\\?\Volume{…}\"]`.
fn parse_list_value(value: &str) -> Vec<String> {
    let inner = value.trim();
    let inner = inner.strip_prefix('{').unwrap_or(inner);
    let inner = inner.strip_suffix('}').unwrap_or(inner);
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "...")
        .map(str::to_string)
        .collect()
}

fn field(record: &Record, key: &str) -> String {
    record.get(key).cloned().unwrap_or_default()
}

fn number(record: &Record, key: &str) -> u64 {
    record
        .get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_default()
}
