/// Mount controller — mounts a partition with the platform utility, then
/// re-queries the system for the mount point it actually got.
///
/// A mount never mutates the caller's partition. On success the returned
/// partition is a copy carrying the new mount point; on failure the original
/// is handed back unchanged together with the reason.
use crate::config::WindowsStrategy;
use crate::error::{InventoryError, Result};
use crate::model::{Partition, Platform};
use crate::parser::{diskpart, diskutil, wmi};
use crate::runner::{CommandRunner, Invocation};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time allowed for an elevated mount, which may sit on an administrator
/// password prompt well past the usual command timeout.
pub const ELEVATED_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of a mount request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted(Partition),
    Failed {
        partition: Partition,
        error: InventoryError,
    },
}

impl MountOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Mounted(_))
    }

    pub fn partition(&self) -> &Partition {
        match self {
            Self::Mounted(partition) | Self::Failed { partition, .. } => partition,
        }
    }

    /// `(success, partition)`: the updated partition on success, the
    /// untouched original otherwise.
    pub fn into_parts(self) -> (bool, Partition) {
        match self {
            Self::Mounted(partition) => (true, partition),
            Self::Failed { partition, .. } => (false, partition),
        }
    }
}

pub struct MountController<R> {
    runner: R,
    platform: Platform,
    strategy: WindowsStrategy,
}

impl<R: CommandRunner> MountController<R> {
    pub fn new(runner: R, platform: Platform, strategy: WindowsStrategy) -> Self {
        Self {
            runner,
            platform,
            strategy,
        }
    }

    /// Mount `partition`. `known_mount_points` is every mount point in the
    /// current snapshot, used to pick a free drive letter.
    ///
    /// Already-mounted partitions are not special-cased; callers check
    /// [`Partition::is_mounted`] first.
    pub fn mount(&self, partition: &Partition, known_mount_points: &[String]) -> MountOutcome {
        info!("Mounting {} ({})", partition.display_name(), partition.id);
        let result = match self.platform {
            Platform::MacOs => self.mount_diskutil(partition),
            Platform::Windows => match self.strategy {
                WindowsStrategy::Diskpart => self.mount_diskpart(partition),
                WindowsStrategy::Management => self.mount_mountvol(partition, known_mount_points),
            },
            Platform::Other => Err(InventoryError::UnsupportedPlatform(
                std::env::consts::OS.to_string(),
            )),
        };

        match result {
            Ok(mount_point) if !mount_point.is_empty() => {
                info!("Mounted {} at {mount_point}", partition.id);
                MountOutcome::Mounted(partition.clone().with_mount_point(mount_point))
            }
            Ok(_) => {
                warn!("Mount of {} reported success but no mount point appeared", partition.id);
                MountOutcome::Failed {
                    partition: partition.clone(),
                    error: InventoryError::MountFailed(format!(
                        "{} has no mount point after mounting",
                        partition.id
                    )),
                }
            }
            Err(error) => {
                warn!("Mount of {} failed: {error}", partition.id);
                MountOutcome::Failed {
                    partition: partition.clone(),
                    error,
                }
            }
        }
    }

    fn mount_diskutil(&self, partition: &Partition) -> Result<String> {
        let device = handle(partition);
        self.runner
            .run(
                &Invocation::new("diskutil", ["mount", device])
                    .elevated()
                    .with_timeout(ELEVATED_TIMEOUT),
            )?;

        let bytes = self
            .runner
            .run(&Invocation::new("diskutil", ["info", "-plist", partition.id.as_str()]))?;
        Ok(diskutil::parse_info(&bytes)?.mount_point)
    }

    fn mount_diskpart(&self, partition: &Partition) -> Result<String> {
        let select = format!("select volume {}", partition.id);
        self.runner
            .run(
                &Invocation::diskpart_script(&[select.as_str(), "assign"])
                    .elevated()
                    .with_timeout(ELEVATED_TIMEOUT),
            )?;

        let listing = self
            .runner
            .run_text(&Invocation::diskpart_script(&["list volume"]).elevated())?;
        let mount_point = diskpart::parse_volume_table(&listing)
            .into_iter()
            .find(|row| row.number == partition.id)
            .map(|row| row.mount_point)
            .unwrap_or_default();
        Ok(mount_point)
    }

    fn mount_mountvol(&self, partition: &Partition, known: &[String]) -> Result<String> {
        let letter = choose_drive_letter(known)
            .ok_or_else(|| InventoryError::MountFailed("no free drive letter".into()))?;
        let root = format!("{letter}:\\");
        debug!("Assigning {root} to {}", partition.id);
        self.runner
            .run(&Invocation::new("mountvol", [root.as_str(), handle(partition)]).elevated())?;

        let listing = self.runner.run_text(&Invocation::powershell(wmi::VOLUME_QUERY))?;
        let mount_point = wmi::parse_volumes(&listing)
            .into_iter()
            .find(|v| v.device_id.eq_ignore_ascii_case(&partition.id))
            .map(|v| v.mount_point())
            .unwrap_or_default();
        Ok(mount_point)
    }
}

/// Device node if the partition has one, else its id.
fn handle(partition: &Partition) -> &str {
    if partition.device.is_empty() {
        &partition.id
    } else {
        &partition.device
    }
}

/// First drive letter in `D..=Z`, then `A..=C`, that is not already the root
/// of a known mount point. Comparison is case-insensitive.
pub fn choose_drive_letter(known_mount_points: &[String]) -> Option<char> {
    let used: HashSet<char> = known_mount_points
        .iter()
        .filter_map(|m| drive_letter_of(m))
        .collect();
    ('D'..='Z').chain('A'..='C').find(|c| !used.contains(c))
}

fn drive_letter_of(mount_point: &str) -> Option<char> {
    let mut chars = mount_point.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => Some(letter.to_ascii_uppercase()),
        _ => None,
    }
}

/// Show `path` in the platform file browser. Returns once the browser has
/// been launched.
pub fn open(path: &str) -> Result<()> {
    debug!("Opening {path}");
    open::that_detached(path)
        .map_err(|e| InventoryError::UtilityExecutionFailed(format!("open {path}: {e}")))
}
