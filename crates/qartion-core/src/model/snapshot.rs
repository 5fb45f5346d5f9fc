/// Immutable result of one inventory refresh.
///
/// A snapshot carries the disk tree together with every non-fatal problem
/// hit while building it, so a partially built tree is never mistaken for a
/// complete one.
use super::disk::{DiskMap, PartitionMap};
use crate::error::InventoryError;
use chrono::{DateTime, Local};
use serde::Serialize;

/// Host platform family the inventory talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MacOs,
    Windows,
    Other,
}

impl Platform {
    /// Detect the platform this binary was compiled for.
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            _ => Self::Other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::MacOs => "macOS",
            Self::Windows => "Windows",
            Self::Other => "unsupported",
        }
    }
}

/// A non-fatal failure recorded during a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// What was being looked up, e.g. `info disk2`.
    pub subject: String,
    pub message: String,
}

impl Issue {
    pub fn new(subject: impl Into<String>, error: &InventoryError) -> Self {
        Self {
            subject: subject.into(),
            message: error.to_string(),
        }
    }
}

/// Overall quality of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    /// No refresh has succeeded yet.
    Pending,
    Complete,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub platform: Platform,
    pub disks: DiskMap,
    /// Volumes listed without disk grouping. Only filled in standalone mode.
    pub standalone_volumes: PartitionMap,
    pub issues: Vec<Issue>,
    pub taken_at: DateTime<Local>,
    #[serde(skip)]
    refreshed: bool,
}

impl Snapshot {
    /// An empty refresh result, to be filled in by discovery.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            disks: DiskMap::new(),
            standalone_volumes: PartitionMap::new(),
            issues: Vec::new(),
            taken_at: Local::now(),
            refreshed: true,
        }
    }

    /// Placeholder held before the first refresh.
    pub fn pending(platform: Platform) -> Self {
        Self {
            refreshed: false,
            ..Self::new(platform)
        }
    }

    /// `true` when neither disks nor standalone volumes were found.
    pub fn is_empty(&self) -> bool {
        self.disks.is_empty() && self.standalone_volumes.is_empty()
    }

    pub fn status(&self) -> SnapshotStatus {
        if !self.refreshed {
            return SnapshotStatus::Pending;
        }
        match (self.issues.is_empty(), self.is_empty()) {
            (true, _) => SnapshotStatus::Complete,
            (false, false) => SnapshotStatus::Partial,
            (false, true) => SnapshotStatus::Failed,
        }
    }

    /// Every non-empty mount point currently known, across disks and
    /// standalone volumes, nested entries included.
    pub fn mount_points(&self) -> Vec<String> {
        crate::topology::flatten(self)
            .into_iter()
            .filter(|entry| entry.partition.is_mounted())
            .map(|entry| entry.partition.mount_point.clone())
            .collect()
    }
}
