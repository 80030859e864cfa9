//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use remora_core::{AppliedEntry, EntryTag, MirrorEvent, MirrorStatus};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a mirror event
    pub fn print_event(&self, event: &MirrorEvent) {
        match self.format {
            OutputFormat::Human => match event {
                MirrorEvent::StatusChanged(status) => {
                    println!("[{}]", status_label(*status));
                }
                MirrorEvent::FullSyncComplete(entries) => {
                    println!("✓ Full sync complete ({} entries)", entries.len());
                    for entry in entries {
                        println!("  {}", entry_line(entry));
                    }
                }
                MirrorEvent::ChangesApplied(entries) => {
                    println!("✓ Applied {} change(s)", entries.len());
                    for entry in entries {
                        println!("  {}", entry_line(entry));
                    }
                }
                MirrorEvent::Error(message) => {
                    eprintln!("✗ {}", message);
                }
            },
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(event).unwrap());
            }
            OutputFormat::Quiet => match event {
                // Scripting mode: one path per applied entry, nothing else
                MirrorEvent::FullSyncComplete(entries)
                | MirrorEvent::ChangesApplied(entries) => {
                    for entry in entries {
                        println!("{}", entry.path_display);
                    }
                }
                _ => {}
            },
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// One-line human description of an applied entry
fn entry_line(entry: &AppliedEntry) -> String {
    match entry.tag {
        EntryTag::File => format!("+ {}", entry.path_display),
        EntryTag::Folder => format!("+ {}/", entry.path_display),
        EntryTag::Deleted => format!("- {}", entry.path_display),
    }
}

fn status_label(status: MirrorStatus) -> &'static str {
    match status {
        MirrorStatus::Initializing => "initializing",
        MirrorStatus::FullSync => "full sync",
        MirrorStatus::Watching => "watching",
        MirrorStatus::BackingOff => "backing off",
    }
}
