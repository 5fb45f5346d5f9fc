/// Host capability checks used by the command runner.
pub mod permissions;

pub use permissions::is_elevated;
