//! The cache command: inspect and clear the local dependency store

use crate::bundler::DirStore;
use crate::bundler::store::StoreError;
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::{RbupError, RbupResult};
use crate::ui::{self, UiContext};
use chrono::Utc;
use std::path::PathBuf;

pub async fn execute(args: CacheArgs, config: &Config) -> RbupResult<()> {
    let ui = UiContext::detect();

    match args.action {
        CacheAction::List { format, cache_dir } => {
            let store = DirStore::new(store_root(cache_dir, config));
            list(&ui, &store, format)
        }
        CacheAction::Clear { yes, cache_dir } => {
            let store = DirStore::new(store_root(cache_dir, config));
            clear(&ui, &store, yes)
        }
    }
}

fn store_root(override_dir: Option<PathBuf>, config: &Config) -> PathBuf {
    override_dir.unwrap_or_else(|| config.cache.store_dir())
}

fn list(ui: &UiContext, store: &DirStore, format: OutputFormat) -> RbupResult<()> {
    let mut entries = store.entries().map_err(store_error)?;
    entries.sort_by(|a, b| b.meta.saved_at.cmp(&a.meta.saved_at));

    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "key": e.meta.key,
                        "saved_at": e.meta.saved_at,
                        "size_bytes": archive_size(e),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.meta.key);
            }
        }
        OutputFormat::Table => {
            if entries.is_empty() {
                ui::step_info(ui, "No cache entries");
                return Ok(());
            }
            println!("{:<72} {:>10} {:>10}", "KEY", "SIZE", "AGE");
            for entry in &entries {
                let age = Utc::now() - entry.meta.saved_at;
                println!(
                    "{:<72} {:>10} {:>10}",
                    truncate(&entry.meta.key, 72),
                    format_bytes(archive_size(entry)),
                    format_age(age.num_hours()),
                );
            }
        }
    }
    Ok(())
}

fn clear(ui: &UiContext, store: &DirStore, yes: bool) -> RbupResult<()> {
    if !yes {
        ui::step_warn(ui, "Pass --yes to remove all saved cache entries");
        return Ok(());
    }

    let removed = store.clear().map_err(store_error)?;
    ui::outro_success(ui, &format!("Removed {removed} cache entries"));
    Ok(())
}

fn store_error(e: StoreError) -> RbupError {
    RbupError::Internal(format!("cache store: {e}"))
}

fn archive_size(entry: &crate::bundler::store::StoreEntry) -> u64 {
    std::fs::metadata(&entry.archive).map(|m| m.len()).unwrap_or(0)
}

/// Format bytes as human-readable size (e.g., "1.5 GB")
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn format_age(hours: i64) -> String {
    if hours >= 48 {
        format!("{}d", hours / 24)
    } else if hours >= 1 {
        format!("{hours}h")
    } else {
        "<1h".to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max - 3])
    }
}
