/// Qartion Core — disk discovery, output parsing, and mount control.
///
/// This crate contains all business logic with zero UI dependencies. It
/// shells out to the platform's disk utilities, parses their output into a
/// normalised Disk → Partition tree, and mounts partitions on request.
///
/// # Modules
///
/// - [`runner`] — Bounded, cancellable external command execution with elevation.
/// - [`parser`] — `diskutil` plist, `diskpart` table, and PowerShell record parsers.
/// - [`topology`] — Tree assembly per platform, flattening, and the id index.
/// - [`mount`] — Mounting, drive-letter selection, and opening in the file browser.
/// - [`inventory`] — The facade that refreshes and holds the current snapshot.
/// - [`model`] — Disk, partition, and snapshot types.
/// - [`config`] — Read-only settings file.
/// - [`platform`] — Host privilege checks.
pub mod config;
pub mod error;
pub mod inventory;
pub mod model;
pub mod mount;
pub mod parser;
pub mod platform;
pub mod runner;
pub mod topology;

pub use error::{InventoryError, RunError};
pub use inventory::Inventory;
