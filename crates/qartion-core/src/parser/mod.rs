/// Output parsers — turn raw utility output into intermediate records.
///
/// Parsers never run commands and never build the final tree; they only
/// recognise record shapes. Missing fields default to empty/zero, and a
/// record that cannot be recognised is skipped with a warning. Only output
/// whose overall shape is wrong (not a plist, no table at all) is an error.
///
/// - [`diskutil`] — macOS `diskutil list/info -plist` property lists.
/// - [`diskpart`] — Windows `diskpart` text tables and `key : value` blocks.
/// - [`wmi`] — Windows PowerShell `Format-List` records.
pub mod diskpart;
pub mod diskutil;
pub mod wmi;

use indexmap::IndexMap;

/// A flat, ordered `key → value` record from text output.
pub type Record = IndexMap<String, String>;
