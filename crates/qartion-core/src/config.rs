/// Read-only application settings.
///
/// The settings file is owned by the UI layer; the core only reads the
/// values that change how disks are discovered. A missing or malformed
/// file falls back to defaults so a bad edit never blocks a refresh.
use crate::error::{InventoryError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default file name, resolved relative to the working directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Default per-invocation timeout for external utilities.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// How Windows volumes are presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeGrouping {
    /// Volumes grouped under their owning physical disk.
    #[default]
    Linked,
    /// One flat list of volumes, no disk grouping.
    Standalone,
}

/// Which Windows data source to query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowsStrategy {
    /// Scripted `diskpart` sessions. Needs an elevated process.
    Diskpart,
    /// WMI/CIM queries through PowerShell.
    #[default]
    Management,
}

/// Icon set selected in the UI. Index order matches the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IconTheme {
    Windows,
    MacOs,
    Linux,
}

impl IconTheme {
    pub fn from_index(index: u64) -> Option<Self> {
        match index {
            0 => Some(Self::Windows),
            1 => Some(Self::MacOs),
            2 => Some(Self::Linux),
            _ => None,
        }
    }

    /// Theme matching the host OS, used when the settings file has none.
    pub fn for_os(os: &str) -> Self {
        match os {
            "macos" => Self::MacOs,
            "linux" => Self::Linux,
            _ => Self::Windows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub volume_grouping: VolumeGrouping,
    pub windows_strategy: WindowsStrategy,
    pub command_timeout_secs: u64,
    /// Raw index as written by the settings window.
    icon_theme: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume_grouping: VolumeGrouping::default(),
            windows_strategy: WindowsStrategy::default(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            icon_theme: None,
        }
    }
}

impl Settings {
    /// Parse settings from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings =
            serde_json::from_str(text).map_err(|e| InventoryError::Config(e.to_string()))?;
        if settings.command_timeout_secs == 0 {
            return Err(InventoryError::Config(
                "commandTimeoutSecs must be greater than zero".into(),
            ));
        }
        Ok(settings)
    }

    /// Load settings from `path`, falling back to defaults (with a warning)
    /// when the file is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text).unwrap_or_else(|e| {
                tracing::warn!("Ignoring {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Cannot read {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Selected icon theme, or the host default when unset or out of range.
    pub fn icon_theme(&self) -> IconTheme {
        self.icon_theme
            .and_then(IconTheme::from_index)
            .unwrap_or_else(|| IconTheme::for_os(std::env::consts::OS))
    }
}
