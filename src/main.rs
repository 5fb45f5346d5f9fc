//! Qartion — disk and partition inventory with on-demand mounting.
//!
//! Thin binary entry point. All logic lives in the `qartion-core` crate.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use qartion_core::config::{Settings, SETTINGS_FILE};
use qartion_core::model::size::format_size;
use qartion_core::model::Snapshot;
use qartion_core::mount::MountOutcome;
use qartion_core::topology::flatten;
use qartion_core::Inventory;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "qartion", version, about = "List disks and partitions, mount them on request")]
struct Cli {
    /// Settings file to read.
    #[arg(long, global = true, default_value = SETTINGS_FILE)]
    config: PathBuf,

    /// Log every external command.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the disk tree.
    List {
        /// Emit the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Mount the partition with the given id (if needed) and open it.
    Mount { id: String },
    /// Open a mount point in the file browser.
    Open { path: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load_or_default(&cli.config);
    let inventory = Inventory::system(settings);
    tracing::debug!("Qartion starting on {}", inventory.platform().label());

    match cli.command {
        Command::List { json } => {
            let snapshot = inventory.refresh().context("disk refresh failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&*snapshot)?);
            } else {
                print_tree(&snapshot);
            }
        }
        Command::Mount { id } => {
            inventory.refresh().context("disk refresh failed")?;
            match inventory.ensure_mounted(&id)? {
                MountOutcome::Mounted(partition) => {
                    println!("{} mounted at {}", partition.display_name(), partition.mount_point);
                    inventory.open(&partition.mount_point)?;
                }
                MountOutcome::Failed { partition, error } => {
                    bail!("could not mount {}: {error}", partition.display_name());
                }
            }
        }
        Command::Open { path } => inventory.open(&path)?,
    }

    Ok(())
}

fn print_tree(snapshot: &Snapshot) {
    let mut current_disk = None;
    for entry in flatten(snapshot) {
        if entry.disk_id != current_disk {
            current_disk = entry.disk_id;
            match entry.disk_id.and_then(|id| snapshot.disks.get(id)) {
                Some(disk) => println!("{}  {}  [{}]", disk.name, format_size(disk.size), disk.id),
                None => println!("Volumes"),
            }
        }
        let indent = "  ".repeat(usize::from(entry.depth) + 1);
        let p = entry.partition;
        let mount = if p.is_mounted() { p.mount_point.as_str() } else { "-" };
        println!("{indent}{}  {}  {mount}  [{}]", p.display_name(), format_size(p.size), p.id);
    }
    // Disks with no partitions never show up in the flattened list.
    for disk in snapshot.disks.values().filter(|d| d.partitions.is_empty()) {
        println!("{}  {}  [{}]", disk.name, format_size(disk.size), disk.id);
    }
    for issue in &snapshot.issues {
        eprintln!("warning: {}: {}", issue.subject, issue.message);
    }
}
