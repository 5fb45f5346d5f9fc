/// Data model for the disk inventory.
///
/// Re-exports the disk/partition tree, the refresh snapshot, and size helpers.
pub mod disk;
pub mod size;
pub mod snapshot;

pub use disk::{Disk, DiskMap, Partition, PartitionMap};
pub use snapshot::{Issue, Platform, Snapshot, SnapshotStatus};
