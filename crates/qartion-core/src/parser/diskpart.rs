/// Parser for Windows `diskpart` output.
///
/// Three outputs are understood:
///
/// - `list disk` — one fixed-column row per disk.
/// - `detail disk` — a block of `key : value` lines, the disk model printed
///   as a bare title line directly above `Disk ID`, then a volume table.
/// - `list volume` — just the volume table.
///
/// The volume table is located by its `Volume ###` header and `----`
/// separator and read until the next blank line or header, so the parser
/// does not depend on how many lines diskpart prints before it.
use super::Record;
use crate::model::size::parse_size;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

/// Prompt diskpart prints before each command's output when fed by a pipe.
const PROMPT: &str = "DISKPART>";

/// Key whose value is the disk GUID/signature. The disk's display name is
/// the title line immediately above it.
pub const DISK_ID_KEY: &str = "Disk ID";

const VOLUME_TYPES: &[&str] = &[
    "Partition", "Simple", "Mirror", "Stripe", "Spanned", "RAID-5", "Unknown", "No Fs",
    "Removable", "DVD-ROM", "CD-ROM",
];
const FILE_SYSTEMS: &[&str] = &[
    "FAT32", "NTFS", "exFAT", "UDF", "ReFS", "FAT", "RAW", "CDFS", "DFS",
];
const HEALTH_STATUSES: &[&str] = &[
    "Healthy", "Healthy (System)", "Healthy (Active)", "Healthy (Boot)", "Failed",
    "Failed (Errors)", "Failed (Offline)", "Failed (Validation)", "Failed (Other)",
    "Formatting", "Resynching", "No Media", "Unusable",
];
const INFO_FLAGS: &[&str] = &[
    "Hidden", "System", "Active", "Boot", "Crash Dump", "Page File", "Primary Partition",
    "Logical Drive", "No Drive Letter", "Read-only", "Offline",
];

static LIST_DISK_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Disk\s+(\d+)\s+([A-Za-z]+)\s+(\d+\s+\w+)\s+(\d+\s+\w+)").expect("valid regex")
});
static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z \-]*?)\s*:\s*(.*)$").expect("valid regex")
});
static COLUMN_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));
static SIZE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?\s*[KMGT]?B$").expect("valid regex"));

/// A row of `list disk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDiskRow {
    pub number: u32,
    /// `Online`, `Offline`, `No Media`, …
    pub status: String,
    pub size: u64,
    pub free: u64,
}

/// A row of a volume table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeRow {
    /// Volume number as printed (`"3"`), the handle for `select volume`.
    pub number: String,
    /// `X:\` when a drive letter is assigned, else empty.
    pub mount_point: String,
    /// Label, or `Volume N` when the volume has none.
    pub name: String,
    pub size: u64,
}

/// Everything `detail disk` reports about one disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskDetail {
    pub fields: Record,
    /// Title line printed above `Disk ID`, usually the disk model.
    pub name: String,
    pub volumes: Vec<VolumeRow>,
}

impl DiskDetail {
    pub fn field(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or_default()
    }
}

/// Parse `list disk` output.
pub fn parse_list_disk(output: &str) -> Vec<ListDiskRow> {
    output
        .lines()
        .filter_map(|line| LIST_DISK_ROW.captures(line))
        .filter_map(|caps| {
            let number = caps[1].parse().ok()?;
            Some(ListDiskRow {
                number,
                status: caps[2].to_string(),
                size: parse_size(&caps[3]),
                free: parse_size(&caps[4]),
            })
        })
        .collect()
}

/// Parse `select disk N` + `detail disk` output.
pub fn parse_detail_disk(output: &str) -> DiskDetail {
    let lines: Vec<&str> = output.lines().map(strip_prompt).collect();
    let tables = find_volume_tables(&lines);
    let in_table = |i: usize| tables.iter().any(|t| t.contains(&i));

    let mut detail = DiskDetail::default();
    for (i, line) in lines.iter().enumerate() {
        if in_table(i) {
            continue;
        }
        let Some(caps) = KEY_VALUE.captures(line) else {
            continue;
        };
        let key = caps[1].trim().to_string();
        let value = caps[2].trim().to_string();
        if key == DISK_ID_KEY {
            detail.name = lines[..i]
                .iter()
                .rev()
                .map(|l| l.trim())
                .find(|l| !l.is_empty())
                .unwrap_or_default()
                .to_string();
        }
        detail.fields.insert(key, value);
    }

    detail.volumes = tables
        .into_iter()
        .flat_map(|range| lines[range].iter().filter_map(|l| parse_volume_row(l)))
        .collect();
    detail
}

/// Parse any output containing volume tables (`list volume`, `detail disk`).
pub fn parse_volume_table(output: &str) -> Vec<VolumeRow> {
    let lines: Vec<&str> = output.lines().map(strip_prompt).collect();
    find_volume_tables(&lines)
        .into_iter()
        .flat_map(|range| lines[range].iter().filter_map(|l| parse_volume_row(l)))
        .collect()
}

fn strip_prompt(line: &str) -> &str {
    match line.trim_start().strip_prefix(PROMPT) {
        Some(rest) => rest,
        None => line,
    }
}

fn is_header(line: &str) -> bool {
    line.trim_start().starts_with("Volume ###")
}

fn is_separator(line: &str) -> bool {
    let t = line.trim();
    t.starts_with("---") && t.chars().all(|c| c == '-' || c == ' ')
}

/// Line ranges holding table rows (header and separator excluded).
fn find_volume_tables(lines: &[&str]) -> Vec<std::ops::Range<usize>> {
    let mut tables = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if !is_header(lines[i]) {
            i += 1;
            continue;
        }
        let mut start = i + 1;
        if lines.get(start).is_some_and(|l| is_separator(l)) {
            start += 1;
        }
        let mut end = start;
        while end < lines.len() && !lines[end].trim().is_empty() && !is_header(lines[end]) {
            end += 1;
        }
        tables.push(start..end);
        i = end;
    }
    tables
}

fn parse_volume_row(line: &str) -> Option<VolumeRow> {
    let line = line.trim().trim_start_matches('*').trim();
    let mut row = VolumeRow::default();

    for token in COLUMN_GAP.split(line).map(str::trim).filter(|t| !t.is_empty()) {
        if let Some(number) = token.strip_prefix("Volume ") {
            if row.number.is_empty() && number.trim().chars().all(|c| c.is_ascii_digit()) {
                row.number = number.trim().to_string();
                continue;
            }
        }
        if token.len() == 1 && token.chars().all(|c| c.is_ascii_alphabetic()) {
            row.mount_point = format!("{}:\\", token.to_ascii_uppercase());
            continue;
        }
        if is_known_label(token) {
            continue;
        }
        if SIZE_TOKEN.is_match(token) {
            row.size = parse_size(token);
            continue;
        }
        if row.name.is_empty() {
            row.name = token.to_string();
        }
    }

    if row.number.is_empty() {
        warn!("Skipping volume row without a number: {line:?}");
        return None;
    }
    if row.name.is_empty() {
        row.name = format!("Volume {}", row.number);
    }
    Some(row)
}

fn is_known_label(token: &str) -> bool {
    [VOLUME_TYPES, FILE_SYSTEMS, HEALTH_STATUSES, INFO_FLAGS]
        .iter()
        .any(|set| set.iter().any(|known| known.eq_ignore_ascii_case(token)))
}
