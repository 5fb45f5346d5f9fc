/// End-to-end inventory tests.
///
/// These drive the public `Inventory` facade through every discovery
/// strategy with a canned `CommandRunner` that replays captured utility
/// output from `tests/fixtures/`. Parsing, tree assembly, issue recording,
/// indexing and mounting all run exactly as they do against real processes;
/// only the process launch is replaced.
use parking_lot::Mutex;
use qartion_core::config::{Settings, VolumeGrouping, WindowsStrategy};
use qartion_core::error::{InventoryError, RunError};
use qartion_core::model::{Partition, Platform, Snapshot, SnapshotStatus};
use qartion_core::mount::{choose_drive_letter, MountOutcome};
use qartion_core::parser::{diskpart, diskutil, wmi};
use qartion_core::runner::{CommandRunner, Invocation};
use qartion_core::topology::{flatten, UNASSIGNED_DISK_NAME};
use qartion_core::Inventory;
use std::collections::HashMap;

// ── Helpers ──────────────────────────────────────────────────────────────────

const DISKUTIL_LIST: &str = include_str!("fixtures/diskutil_list.plist");
const INFO_DISK0: &str = include_str!("fixtures/diskutil_info_disk0.plist");
const INFO_DISK1: &str = include_str!("fixtures/diskutil_info_disk1.plist");
const INFO_DISK1S2: &str = include_str!("fixtures/diskutil_info_disk1s2.plist");

const LIST_DISK: &str = include_str!("fixtures/diskpart_list_disk.txt");
const DETAIL_DISK0: &str = include_str!("fixtures/diskpart_detail_disk0.txt");
const DETAIL_DISK1: &str = include_str!("fixtures/diskpart_detail_disk1.txt");

const WMI_VOLUMES: &str = include_str!("fixtures/wmi_volumes.txt");
const WMI_DISKS: &str = include_str!("fixtures/wmi_disk_drives.txt");
const WMI_PARTITIONS: &str = include_str!("fixtures/wmi_partitions.txt");

/// Replays stdout keyed by command line. Unknown commands fail as if the
/// utility exited non-zero.
#[derive(Default)]
struct Canned {
    outputs: HashMap<String, Result<Vec<u8>, RunError>>,
    calls: Mutex<Vec<Invocation>>,
}

impl Canned {
    fn with(mut self, invocation: Invocation, output: &str) -> Self {
        self.outputs
            .insert(invocation.command_line(), Ok(output.as_bytes().to_vec()));
        self
    }

    fn failing(mut self, invocation: Invocation, error: RunError) -> Self {
        self.outputs.insert(invocation.command_line(), Err(error));
        self
    }

    fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }
}

impl CommandRunner for Canned {
    fn run(&self, invocation: &Invocation) -> Result<Vec<u8>, RunError> {
        self.calls.lock().push(invocation.clone());
        let line = invocation.command_line();
        match self.outputs.get(&line) {
            Some(result) => result.clone(),
            None => Err(RunError::NonZeroExit {
                program: line,
                code: Some(1),
                stderr: "unexpected command".into(),
            }),
        }
    }
}

fn diskutil(args: &[&str]) -> Invocation {
    Invocation::new("diskutil", args.iter().copied())
}

fn mac_runner() -> Canned {
    Canned::default()
        .with(diskutil(&["list", "-plist"]), DISKUTIL_LIST)
        .with(diskutil(&["info", "-plist", "disk0"]), INFO_DISK0)
        .with(diskutil(&["info", "-plist", "disk1"]), INFO_DISK1)
        .with(diskutil(&["info", "-plist", "disk1s2"]), INFO_DISK1S2)
}

fn diskpart_runner() -> Canned {
    Canned::default()
        .with(Invocation::diskpart_script(&["list disk"]), LIST_DISK)
        .with(Invocation::diskpart_script(&["select disk 0", "detail disk"]), DETAIL_DISK0)
        .with(Invocation::diskpart_script(&["select disk 1", "detail disk"]), DETAIL_DISK1)
}

fn management_runner() -> Canned {
    Canned::default()
        .with(Invocation::powershell(wmi::VOLUME_QUERY), WMI_VOLUMES)
        .with(Invocation::powershell(wmi::DISK_QUERY), WMI_DISKS)
        .with(Invocation::powershell(wmi::PARTITION_QUERY), WMI_PARTITIONS)
}

/// Depth-first layout keyed by disk name, so synthetic disk ids drop out.
fn layout(snapshot: &Snapshot) -> Vec<(String, u16, Partition)> {
    flatten(snapshot)
        .into_iter()
        .map(|e| {
            let disk = e
                .disk_id
                .and_then(|id| snapshot.disks.get(id))
                .map(|d| d.name.clone())
                .unwrap_or_default();
            (disk, e.depth, e.partition.clone())
        })
        .collect()
}

/// Disk keys in order, minus the synthetic unassigned disk.
fn real_disk_ids(snapshot: &Snapshot) -> Vec<&str> {
    snapshot
        .disks
        .values()
        .filter(|d| d.name != UNASSIGNED_DISK_NAME)
        .map(|d| d.id.as_str())
        .collect()
}

fn settings(strategy: WindowsStrategy, grouping: VolumeGrouping) -> Settings {
    let mut settings = Settings::default();
    settings.windows_strategy = strategy;
    settings.volume_grouping = grouping;
    settings
}

// ── macOS ────────────────────────────────────────────────────────────────────

/// One 500107862016-byte disk with "Macintosh HD" (unmounted) and "Data"
/// (mounted at /Volumes/Data), in listing order.
#[test]
fn diskutil_listing_builds_ordered_tree() {
    let inv = Inventory::with_platform(Settings::default(), mac_runner(), Platform::MacOs);
    let snapshot = inv.refresh().expect("refresh");

    assert_eq!(snapshot.status(), SnapshotStatus::Complete);
    let ids: Vec<&str> = snapshot.disks.keys().map(String::as_str).collect();
    assert_eq!(ids, ["disk0", "disk1"]);

    let disk = &snapshot.disks["disk0"];
    assert_eq!(disk.size, 500_107_862_016);
    assert_eq!(disk.name, "Samsung Portable SSD T7");

    let parts: Vec<_> = disk.partitions.values().collect();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "Macintosh HD");
    assert_eq!(parts[0].size, 200_000_000_000);
    assert!(!parts[0].is_mounted());
    assert_eq!(parts[1].name, "Data");
    assert_eq!(parts[1].size, 300_000_000_000);
    assert_eq!(parts[1].mount_point, "/Volumes/Data");
}

#[test]
fn apfs_volumes_nest_under_their_physical_store() {
    let inv = Inventory::with_platform(Settings::default(), mac_runner(), Platform::MacOs);
    let snapshot = inv.refresh().expect("refresh");

    let internal = &snapshot.disks["disk1"];
    assert_eq!(internal.name, "APPLE SSD AP0256Q");
    let store = &internal.partitions["A5A5A5A5-0000-4000-8000-000000000002"];
    let names: Vec<&str> = store.sub_partitions.values().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Macintosh SSD", "Data"]);
    assert_eq!(
        store.sub_partitions["C0C0C0C0-0000-4000-8000-000000000001"].mount_point,
        "/"
    );
}

/// Every partition in the listing, nested container volumes included,
/// appears exactly once when flattened.
#[test]
fn flatten_yields_one_entry_per_listed_partition() {
    let inv = Inventory::with_platform(Settings::default(), mac_runner(), Platform::MacOs);
    let snapshot = inv.refresh().expect("refresh");

    let flat = flatten(&snapshot);
    assert_eq!(flat.len(), 6);
    let nested: Vec<&str> = flat
        .iter()
        .filter(|e| e.depth == 1)
        .map(|e| e.partition.id.as_str())
        .collect();
    assert_eq!(
        nested,
        [
            "C0C0C0C0-0000-4000-8000-000000000001",
            "C0C0C0C0-0000-4000-8000-000000000005"
        ]
    );

    let index = inv.index();
    assert_eq!(index.len(), 6);
    let entry = index.get("C0C0C0C0-0000-4000-8000-000000000005").expect("indexed");
    assert_eq!(entry.disk_id.as_deref(), Some("disk1"));
    assert_eq!(entry.partition.mount_point, "/System/Volumes/Data");
}

#[test]
fn parsing_is_deterministic() {
    let first = diskutil::parse_list(DISKUTIL_LIST.as_bytes()).expect("parse");
    let second = diskutil::parse_list(DISKUTIL_LIST.as_bytes()).expect("parse");
    assert_eq!(first, second);

    let a = Inventory::with_platform(Settings::default(), mac_runner(), Platform::MacOs)
        .refresh()
        .expect("refresh");
    let b = Inventory::with_platform(Settings::default(), mac_runner(), Platform::MacOs)
        .refresh()
        .expect("refresh");
    assert_eq!(a.disks, b.disks);
    assert_eq!(layout(&a), layout(&b));
}

/// A failed name lookup keeps the disk, its size and partitions, and marks
/// the snapshot partial.
#[test]
fn info_failure_is_recorded_not_dropped() {
    let runner = mac_runner().failing(
        diskutil(&["info", "-plist", "disk0"]),
        RunError::NonZeroExit {
            program: "diskutil".into(),
            code: Some(1),
            stderr: "Could not find disk".into(),
        },
    );
    let inv = Inventory::with_platform(Settings::default(), runner, Platform::MacOs);
    let snapshot = inv.refresh().expect("refresh");

    assert_eq!(snapshot.status(), SnapshotStatus::Partial);
    assert_eq!(snapshot.issues.len(), 1);
    assert_eq!(snapshot.issues[0].subject, "info disk0");

    let disk = &snapshot.disks["disk0"];
    assert_eq!(disk.name, "disk0");
    assert_eq!(disk.size, 500_107_862_016);
    assert_eq!(disk.partitions.len(), 2);
}

#[test]
fn mount_failure_returns_original_partition() {
    let runner = mac_runner().failing(
        diskutil(&["mount", "disk0s1"]),
        RunError::NonZeroExit {
            program: "diskutil".into(),
            code: Some(1),
            stderr: "Volume on disk0s1 failed to mount".into(),
        },
    );
    let inv = Inventory::with_platform(Settings::default(), runner, Platform::MacOs);
    let snapshot = inv.refresh().expect("refresh");
    let original = snapshot.disks["disk0"].partitions["6A1B2C3D-0000-4000-8000-000000000001"].clone();

    let (ok, returned) = inv.mount(&original).into_parts();
    assert!(!ok);
    assert_eq!(returned, original);

    let mount_call = inv
        .runner()
        .calls()
        .into_iter()
        .find(|c| c.args.first().map(String::as_str) == Some("mount"))
        .expect("mount attempted");
    assert!(mount_call.elevated);
}

#[test]
fn mount_by_id_reads_back_mount_point() {
    let info = INFO_DISK0
        .replace("<string>disk0</string>", "<string>disk0s1</string>")
        .replace(
            "<key>MountPoint</key>\n\t<string></string>",
            "<key>MountPoint</key>\n\t<string>/Volumes/Macintosh HD</string>",
        );
    let runner = mac_runner()
        .with(diskutil(&["mount", "disk0s1"]), "Volume Macintosh HD on disk0s1 mounted\n")
        .with(
            diskutil(&["info", "-plist", "6A1B2C3D-0000-4000-8000-000000000001"]),
            &info,
        );
    let inv = Inventory::with_platform(Settings::default(), runner, Platform::MacOs);
    inv.refresh().expect("refresh");

    let outcome = inv
        .mount_by_id("6A1B2C3D-0000-4000-8000-000000000001")
        .expect("known id");
    assert!(outcome.succeeded());
    assert_eq!(outcome.partition().mount_point, "/Volumes/Macintosh HD");
}

/// A partition that already has a mount point is handed back as is; no
/// mount command runs.
#[test]
fn ensure_mounted_skips_mounted_partition() {
    let inv = Inventory::with_platform(Settings::default(), mac_runner(), Platform::MacOs);
    inv.refresh().expect("refresh");
    let before = inv.runner().calls().len();

    let outcome = inv
        .ensure_mounted("6A1B2C3D-0000-4000-8000-000000000002")
        .expect("known id");
    match outcome {
        MountOutcome::Mounted(partition) => assert_eq!(partition.mount_point, "/Volumes/Data"),
        MountOutcome::Failed { error, .. } => panic!("unexpected failure: {error}"),
    }
    assert_eq!(inv.runner().calls().len(), before);
}

#[test]
fn ensure_mounted_mounts_unmounted_partition() {
    let runner = mac_runner().with(
        diskutil(&["mount", "disk0s1"]),
        "Volume Macintosh HD on disk0s1 mounted\n",
    );
    let inv = Inventory::with_platform(Settings::default(), runner, Platform::MacOs);
    inv.refresh().expect("refresh");

    // The read-back is not canned, so the mount itself is reported failed,
    // but only after the elevated mount command was issued.
    let outcome = inv
        .ensure_mounted("6A1B2C3D-0000-4000-8000-000000000001")
        .expect("known id");
    assert!(!outcome.succeeded());
    assert!(inv
        .runner()
        .calls()
        .iter()
        .any(|c| c.command_line() == "diskutil mount disk0s1" && c.elevated));

    assert!(matches!(
        inv.ensure_mounted("no-such-id"),
        Err(InventoryError::MountFailed(_))
    ));
}

#[test]
fn listing_failure_is_an_error() {
    let runner = Canned::default().failing(
        diskutil(&["list", "-plist"]),
        RunError::ExecutableNotFound("diskutil".into()),
    );
    let inv = Inventory::with_platform(Settings::default(), runner, Platform::MacOs);
    assert!(matches!(inv.refresh(), Err(InventoryError::UtilityUnavailable(_))));
    assert!(inv.current().is_empty());
}

// ── Windows: diskpart ────────────────────────────────────────────────────────

/// Detail outputs with different preambles and field counts parse the same
/// way; volume rows are found by their table header.
#[test]
fn diskpart_details_of_varying_length() {
    let inv = Inventory::with_platform(
        settings(WindowsStrategy::Diskpart, VolumeGrouping::Linked),
        diskpart_runner(),
        Platform::Windows,
    );
    let snapshot = inv.refresh().expect("refresh");
    assert_eq!(snapshot.status(), SnapshotStatus::Complete);

    let ids: Vec<&str> = snapshot.disks.keys().map(String::as_str).collect();
    assert_eq!(ids, ["{3C1B4C8E-6D2A-4F0B-9E1A-2B3C4D5E6F70}", "00000000"]);

    let nvme = &snapshot.disks["{3C1B4C8E-6D2A-4F0B-9E1A-2B3C4D5E6F70}"];
    assert_eq!(nvme.name, "Samsung SSD 970 EVO Plus 500GB");
    assert_eq!(nvme.kind, "NVMe");
    assert_eq!(nvme.size, 476_000_000_000);
    let names: Vec<&str> = nvme.partitions.values().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Windows", "Recovery", "Volume 2"]);
    assert_eq!(nvme.partitions["0"].mount_point, "C:\\");
    assert!(!nvme.partitions["2"].is_mounted());

    let usb = &snapshot.disks["00000000"];
    assert_eq!(usb.name, "SanDisk Ultra USB Device");
    assert_eq!(usb.partitions["3"].mount_point, "E:\\");
    assert_eq!(usb.partitions["3"].size, 14_000_000_000);

    assert!(inv.runner().calls().iter().all(|c| c.elevated));
}

#[test]
fn diskpart_detail_failure_keeps_disk_row() {
    let runner = diskpart_runner().failing(
        Invocation::diskpart_script(&["select disk 1", "detail disk"]),
        RunError::TimedOut {
            program: "cmd.exe".into(),
            timeout: std::time::Duration::from_secs(30),
        },
    );
    let inv = Inventory::with_platform(
        settings(WindowsStrategy::Diskpart, VolumeGrouping::Linked),
        runner,
        Platform::Windows,
    );
    let snapshot = inv.refresh().expect("refresh");

    assert_eq!(snapshot.status(), SnapshotStatus::Partial);
    let fallback = &snapshot.disks["Disk 1"];
    assert_eq!(fallback.size, 14_000_000_000);
    assert!(fallback.partitions.is_empty());
}

/// diskpart exits 0 and prints errors on stdout; a detail reply with no
/// `Disk ID` is an issue, not a silently complete disk.
#[test]
fn diskpart_error_text_in_detail_is_an_issue() {
    let runner = Canned::default()
        .with(Invocation::diskpart_script(&["list disk"]), LIST_DISK)
        .with(
            Invocation::diskpart_script(&["select disk 0", "detail disk"]),
            "Virtual Disk Service error:\nThe device is not ready.\n",
        )
        .with(
            Invocation::diskpart_script(&["select disk 1", "detail disk"]),
            "The disk you specified is not valid.\n",
        );
    let inv = Inventory::with_platform(
        settings(WindowsStrategy::Diskpart, VolumeGrouping::Linked),
        runner,
        Platform::Windows,
    );
    let snapshot = inv.refresh().expect("refresh");

    assert_eq!(snapshot.status(), SnapshotStatus::Partial);
    assert_eq!(snapshot.issues.len(), 2);
    let disks: Vec<(&str, &str, u64)> = snapshot
        .disks
        .values()
        .map(|d| (d.id.as_str(), d.name.as_str(), d.size))
        .collect();
    assert_eq!(
        disks,
        [("Disk 0", "Disk 0", 476_000_000_000), ("Disk 1", "Disk 1", 14_000_000_000)]
    );
}

#[test]
fn diskpart_parsing_is_deterministic() {
    assert_eq!(diskpart::parse_list_disk(LIST_DISK), diskpart::parse_list_disk(LIST_DISK));
    assert_eq!(
        diskpart::parse_detail_disk(DETAIL_DISK0),
        diskpart::parse_detail_disk(DETAIL_DISK0)
    );

    let refresh = || {
        Inventory::with_platform(
            settings(WindowsStrategy::Diskpart, VolumeGrouping::Linked),
            diskpart_runner(),
            Platform::Windows,
        )
        .refresh()
        .expect("refresh")
    };
    let (a, b) = (refresh(), refresh());
    assert!(a.disks.keys().eq(b.disks.keys()));
    assert_eq!(layout(&a), layout(&b));
}

// ── Windows: management queries ──────────────────────────────────────────────

#[test]
fn linked_grouping_places_volumes_under_disks() {
    let inv = Inventory::with_platform(
        settings(WindowsStrategy::Management, VolumeGrouping::Linked),
        management_runner(),
        Platform::Windows,
    );
    let snapshot = inv.refresh().expect("refresh");

    assert_eq!(snapshot.disks.len(), 3);
    assert!(snapshot.standalone_volumes.is_empty());

    let labels: Vec<&str> = snapshot.disks["0"]
        .partitions
        .values()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(labels, ["Windows", "", "Recovery"]);
    assert_eq!(snapshot.disks["0"].name, "Samsung SSD 970 EVO Plus 500GB");

    let usb: Vec<&str> = snapshot.disks["1"]
        .partitions
        .values()
        .map(|p| p.mount_point.as_str())
        .collect();
    assert_eq!(usb, ["E:\\"]);

    let orphans = snapshot
        .disks
        .values()
        .find(|d| d.name == UNASSIGNED_DISK_NAME)
        .expect("unassigned disk");
    assert_eq!(orphans.partitions.len(), 1);
    assert_eq!(orphans.partitions.values().next().map(|p| p.name.as_str()), Some("Backup VHD"));
}

#[test]
fn standalone_grouping_lists_volumes_flat() {
    let inv = Inventory::with_platform(
        settings(WindowsStrategy::Management, VolumeGrouping::Standalone),
        management_runner(),
        Platform::Windows,
    );
    let snapshot = inv.refresh().expect("refresh");

    assert!(snapshot.disks.is_empty());
    assert_eq!(snapshot.standalone_volumes.len(), 5);
    assert_eq!(flatten(&snapshot).len(), 5);
    assert!(flatten(&snapshot).iter().all(|e| e.disk_id.is_none()));
    assert_eq!(inv.runner().calls().len(), 1);
}

#[test]
fn management_refresh_is_deterministic() {
    let refresh = |grouping| {
        Inventory::with_platform(
            settings(WindowsStrategy::Management, grouping),
            management_runner(),
            Platform::Windows,
        )
        .refresh()
        .expect("refresh")
    };

    let (a, b) = (refresh(VolumeGrouping::Standalone), refresh(VolumeGrouping::Standalone));
    assert!(a.standalone_volumes.keys().eq(b.standalone_volumes.keys()));
    assert_eq!(layout(&a), layout(&b));

    // The unassigned disk gets a fresh id on every refresh.
    let (a, b) = (refresh(VolumeGrouping::Linked), refresh(VolumeGrouping::Linked));
    assert_eq!(real_disk_ids(&a), real_disk_ids(&b));
    assert_eq!(layout(&a), layout(&b));
}

/// A cmdlet error printed instead of records fails the refresh rather than
/// producing an empty, complete snapshot.
#[test]
fn volume_query_error_text_is_a_parse_failure() {
    let runner = management_runner().with(
        Invocation::powershell(wmi::VOLUME_QUERY),
        "Get-CimInstance : Access denied\r\nAt line:1 char:1\r\n",
    );
    let inv = Inventory::with_platform(
        settings(WindowsStrategy::Management, VolumeGrouping::Standalone),
        runner,
        Platform::Windows,
    );
    assert!(matches!(inv.refresh(), Err(InventoryError::ParseFailed { .. })));
    assert_eq!(inv.current().status(), SnapshotStatus::Pending);
}

#[test]
fn disk_query_error_text_is_an_issue() {
    let runner = management_runner().with(
        Invocation::powershell(wmi::DISK_QUERY),
        "Get-CimInstance : Access denied\r\nAt line:1 char:1\r\n",
    );
    let inv = Inventory::with_platform(
        settings(WindowsStrategy::Management, VolumeGrouping::Linked),
        runner,
        Platform::Windows,
    );
    let snapshot = inv.refresh().expect("refresh");

    assert_eq!(snapshot.status(), SnapshotStatus::Partial);
    assert_eq!(snapshot.issues.len(), 1);
    assert_eq!(snapshot.issues[0].subject, "disk drives");
}

#[test]
fn missing_partition_query_degrades_to_unassigned() {
    let runner = management_runner().failing(
        Invocation::powershell(wmi::PARTITION_QUERY),
        RunError::Cancelled("powershell.exe".into()),
    );
    let inv = Inventory::with_platform(
        settings(WindowsStrategy::Management, VolumeGrouping::Linked),
        runner,
        Platform::Windows,
    );
    let snapshot = inv.refresh().expect("refresh");

    assert_eq!(snapshot.status(), SnapshotStatus::Partial);
    assert_eq!(snapshot.issues[0].subject, "partitions");
    let orphans = snapshot
        .disks
        .values()
        .find(|d| d.name == UNASSIGNED_DISK_NAME)
        .expect("unassigned disk");
    assert_eq!(orphans.partitions.len(), 5);
}

/// The chosen letter is never one already in use by the snapshot.
#[test]
fn chosen_drive_letter_is_free_in_snapshot() {
    let inv = Inventory::with_platform(
        settings(WindowsStrategy::Management, VolumeGrouping::Linked),
        management_runner(),
        Platform::Windows,
    );
    let snapshot = inv.refresh().expect("refresh");
    let known = snapshot.mount_points();
    assert_eq!(known.len(), 3);

    let letter = choose_drive_letter(&known).expect("free letter");
    assert_eq!(letter, 'D');
    assert!(known.iter().all(|m| !m.starts_with(letter)));

    let mut crowded = known.clone();
    crowded.extend(('D'..='Y').map(|c| format!("{c}:\\")));
    let letter = choose_drive_letter(&crowded).expect("free letter");
    assert!(crowded.iter().all(|m| !m.to_uppercase().starts_with(letter)));
    assert_eq!(letter, 'A');
}
