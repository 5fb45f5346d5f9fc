/// Inventory service — the facade a frontend talks to.
///
/// Holds the settings, a [`CommandRunner`] and the most recent
/// [`Snapshot`]. A refresh picks the strategy for the host platform, runs the
/// top-level listing (whose failure aborts the refresh), then the secondary
/// lookups (whose failures are recorded on the snapshot) and swaps the new
/// snapshot in.
use crate::config::{Settings, VolumeGrouping, WindowsStrategy};
use crate::error::{InventoryError, Result};
use crate::model::{Issue, Partition, Platform, Snapshot};
use crate::mount::{self, MountController, MountOutcome};
use crate::parser::{diskpart, diskutil, wmi};
use crate::runner::{CommandRunner, Invocation, SystemRunner};
use crate::topology::{self, Built, EntryIndex};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A snapshot that readers can hold on to while a refresh replaces it.
pub type SharedSnapshot = Arc<Snapshot>;

/// Platform family of the running binary.
pub fn detect_platform() -> Platform {
    Platform::current()
}

pub struct Inventory<R> {
    settings: Settings,
    runner: R,
    platform: Platform,
    snapshot: RwLock<SharedSnapshot>,
}

impl Inventory<SystemRunner> {
    /// Inventory backed by real processes, bounded by the configured
    /// command timeout.
    pub fn system(settings: Settings) -> Self {
        let runner = SystemRunner::new(settings.command_timeout());
        Self::new(settings, runner)
    }
}

impl<R: CommandRunner> Inventory<R> {
    pub fn new(settings: Settings, runner: R) -> Self {
        Self::with_platform(settings, runner, detect_platform())
    }

    /// Inventory for an explicit platform, regardless of the host.
    pub fn with_platform(settings: Settings, runner: R, platform: Platform) -> Self {
        Self {
            settings,
            runner,
            platform,
            snapshot: RwLock::new(Arc::new(Snapshot::pending(platform))),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// The last snapshot. Until the first successful refresh this is an
    /// empty snapshot with [`SnapshotStatus::Pending`](crate::model::SnapshotStatus::Pending).
    pub fn current(&self) -> SharedSnapshot {
        Arc::clone(&*self.snapshot.read())
    }

    /// Id → entry index over the current snapshot.
    pub fn index(&self) -> EntryIndex {
        EntryIndex::build(&self.current())
    }

    /// Re-enumerate disks and partitions.
    ///
    /// On `Err` the previous snapshot is kept.
    pub fn refresh(&self) -> Result<SharedSnapshot> {
        let started = Instant::now();
        let built = match self.platform {
            Platform::MacOs => self.discover_diskutil()?,
            Platform::Windows => match self.settings.windows_strategy {
                WindowsStrategy::Diskpart => self.discover_diskpart()?,
                WindowsStrategy::Management => self.discover_management()?,
            },
            Platform::Other => {
                return Err(InventoryError::UnsupportedPlatform(
                    std::env::consts::OS.to_string(),
                ))
            }
        };

        let mut snapshot = Snapshot::new(self.platform);
        snapshot.disks = built.disks;
        snapshot.standalone_volumes = built.volumes;
        snapshot.issues = built.issues;

        info!(
            "Refresh complete: {} disks, {} partitions, {} issues in {:.2?}",
            snapshot.disks.len(),
            topology::flatten(&snapshot).len(),
            snapshot.issues.len(),
            started.elapsed()
        );

        let snapshot = Arc::new(snapshot);
        *self.snapshot.write() = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    /// Mount `partition`, choosing drive letters against the current
    /// snapshot's mount points. The held snapshot is not modified; refresh
    /// to pick up the change.
    pub fn mount(&self, partition: &Partition) -> MountOutcome {
        let known = self.current().mount_points();
        MountController::new(&self.runner, self.platform, self.settings.windows_strategy)
            .mount(partition, &known)
    }

    /// Mount the partition with id `id` from the current snapshot.
    pub fn mount_by_id(&self, id: &str) -> Result<MountOutcome> {
        let index = self.index();
        let entry = index
            .get(id)
            .ok_or_else(|| InventoryError::MountFailed(format!("unknown partition id {id}")))?;
        Ok(self.mount(&entry.partition))
    }

    /// Make the partition with id `id` ready to open.
    ///
    /// A partition that already has a mount point is returned as
    /// [`MountOutcome::Mounted`] without running anything; otherwise it is
    /// mounted first. The caller opens the resulting mount point.
    pub fn ensure_mounted(&self, id: &str) -> Result<MountOutcome> {
        let index = self.index();
        let entry = index
            .get(id)
            .ok_or_else(|| InventoryError::MountFailed(format!("unknown partition id {id}")))?;
        if entry.partition.is_mounted() {
            debug!("{id} is already mounted at {}", entry.partition.mount_point);
            return Ok(MountOutcome::Mounted(entry.partition.clone()));
        }
        Ok(self.mount(&entry.partition))
    }

    /// Show `path` in the platform file browser.
    pub fn open(&self, path: &str) -> Result<()> {
        mount::open(path)
    }

    // ── Strategies ──────────────────────────────────────────────────────

    fn discover_diskutil(&self) -> Result<Built> {
        let listing = self
            .runner
            .run(&Invocation::new("diskutil", ["list", "-plist"]))?;
        let entries = diskutil::parse_list(&listing)?;

        Ok(topology::build_diskutil(entries, |device| {
            let bytes = self
                .runner
                .run(&Invocation::new("diskutil", ["info", "-plist", device]))?;
            diskutil::parse_info(&bytes)
        }))
    }

    fn discover_diskpart(&self) -> Result<Built> {
        let listing = self
            .runner
            .run_text(&Invocation::diskpart_script(&["list disk"]).elevated())?;
        let rows = diskpart::parse_list_disk(&listing);
        if rows.is_empty() && !listing.contains("Disk ###") {
            return Err(InventoryError::parse("diskpart list disk", "no disk table in output"));
        }

        Ok(topology::build_diskpart(&rows, |number| {
            let select = format!("select disk {number}");
            let text = self.runner.run_text(
                &Invocation::diskpart_script(&[select.as_str(), "detail disk"]).elevated(),
            )?;
            Ok(diskpart::parse_detail_disk(&text))
        }))
    }

    fn discover_management(&self) -> Result<Built> {
        let text = self
            .runner
            .run_text(&Invocation::powershell(wmi::VOLUME_QUERY))?;
        if !wmi::has_records(&text, "DeviceID") {
            return Err(InventoryError::parse("Win32_Volume", "no volume records in output"));
        }
        let volumes = wmi::parse_volumes(&text);

        let grouping = self.settings.volume_grouping;
        if grouping == VolumeGrouping::Standalone {
            return Ok(topology::build_management(&[], &volumes, &[], grouping));
        }

        let mut issues = Vec::new();
        let drives = self
            .secondary(wmi::DISK_QUERY, "disk drives", "Index", &mut issues)
            .map(|text| wmi::parse_disk_drives(&text))
            .unwrap_or_default();
        let links = self
            .secondary(wmi::PARTITION_QUERY, "partitions", "DiskNumber", &mut issues)
            .map(|text| wmi::parse_partition_links(&text))
            .unwrap_or_default();

        let mut built = topology::build_management(&drives, &volumes, &links, grouping);
        built.issues.extend(issues);
        Ok(built)
    }

    /// Run a secondary PowerShell query. A failure, or output without any
    /// record carrying `key`, becomes an issue.
    fn secondary(
        &self,
        query: &str,
        subject: &str,
        key: &str,
        issues: &mut Vec<Issue>,
    ) -> Option<String> {
        let error = match self.runner.run_text(&Invocation::powershell(query)) {
            Ok(text) if wmi::has_records(&text, key) => return Some(text),
            Ok(_) => InventoryError::parse(subject, format!("no records with {key} in output")),
            Err(e) => InventoryError::from(e),
        };
        warn!("Query for {subject} failed: {error}");
        issues.push(Issue::new(subject, &error));
        None
    }
}
