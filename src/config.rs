//! Engine settings and command-line interface.
//!
//! The RAM budget of a processed dataset is resolved in this order:
//!
//! 1. an explicit value passed in [`crate::OpenOptions`]
//! 2. the `PROCESSED_RASTER_ALLOWED_RAM_USAGE` environment variable
//! 3. 40% of the physical memory of the machine
//! 4. 1 GiB when the physical memory cannot be queried
//!
//! # Environment Variables
//!
//! - `PROCESSED_RASTER_ALLOWED_RAM_USAGE` - RAM budget such as `500MB`,
//!   `2G`, `1048576` or `10%`
//! - `PROCESSED_RASTER_BLOCK_CACHE` - Cached blocks per band (default: 64)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sysinfo::System;
use tracing::{debug, warn};

// =============================================================================
// Default Values
// =============================================================================

/// Environment variable overriding the RAM budget.
pub const RAM_BUDGET_ENV: &str = "PROCESSED_RASTER_ALLOWED_RAM_USAGE";

/// Default number of cached blocks per output band.
pub const DEFAULT_BLOCK_CACHE_BLOCKS: usize = 64;

/// Share of physical memory used when no budget is configured.
pub const DEFAULT_RAM_FRACTION: f64 = 0.4;

/// Budget used when physical memory is unknown.
pub const FALLBACK_RAM_BUDGET: u64 = 1024 * 1024 * 1024;

// =============================================================================
// Memory Sizes
// =============================================================================

/// Total physical memory in bytes, if it can be queried.
pub fn physical_memory() -> Option<u64> {
    let mut system = System::new();
    system.refresh_memory();
    Some(system.total_memory()).filter(|&total| total > 0)
}

/// Parse a byte size such as `512`, `64K`, `500MB`, `2G` or `10%`.
///
/// Units are binary (`1K` = 1024 bytes). Percentages are taken of the
/// physical memory.
pub fn parse_memory_size(text: &str) -> Result<u64, String> {
    parse_memory_size_with_total(text, physical_memory())
}

/// [`parse_memory_size`] against a known amount of physical memory.
pub fn parse_memory_size_with_total(text: &str, total: Option<u64>) -> Result<u64, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty memory size".to_string());
    }

    if let Some(percent) = text.strip_suffix('%') {
        let percent: f64 = percent
            .trim()
            .parse()
            .map_err(|_| format!("invalid percentage '{}'", text))?;
        if !(0.0..=100.0).contains(&percent) {
            return Err(format!("percentage out of range '{}'", text));
        }
        let total = total.ok_or_else(|| {
            format!("cannot resolve '{}': physical memory is unknown", text)
        })?;
        return Ok((total as f64 * percent / 100.0) as u64);
    }

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid memory size '{}'", text))?;

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        "T" | "TB" => 1024 * 1024 * 1024 * 1024,
        _ => return Err(format!("unknown unit in memory size '{}'", text)),
    };

    Ok((number * multiplier as f64) as u64)
}

/// The RAM budget used when none is given explicitly.
pub fn default_ram_budget() -> u64 {
    if let Ok(value) = std::env::var(RAM_BUDGET_ENV) {
        match parse_memory_size(&value) {
            Ok(bytes) => {
                debug!(budget = bytes, source = RAM_BUDGET_ENV, "Using configured RAM budget");
                return bytes;
            }
            Err(e) => warn!(error = %e, "Ignoring invalid {}", RAM_BUDGET_ENV),
        }
    }

    match physical_memory() {
        Some(total) => (total as f64 * DEFAULT_RAM_FRACTION) as u64,
        None => FALLBACK_RAM_BUDGET,
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// procraster - Inspect and render processed rasters.
///
/// A processed raster is a JSON description of a source raster and a chain
/// of pixel algorithms applied to it on demand.
#[derive(Parser, Debug, Clone)]
#[command(name = "procraster")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// RAM budget for working buffers (e.g. 500MB, 2G, 10%).
    ///
    /// Defaults to 40% of physical memory.
    #[arg(long, global = true, env = RAM_BUDGET_ENV)]
    pub ram_budget: Option<String>,

    /// Number of cached blocks per output band.
    #[arg(long, global = true, default_value_t = DEFAULT_BLOCK_CACHE_BLOCKS, env = "PROCESSED_RASTER_BLOCK_CACHE")]
    pub block_cache: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

impl Settings {
    /// Validate the settings and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.block_cache == 0 {
            return Err("block_cache must be greater than 0".to_string());
        }
        if let Some(ref budget) = self.ram_budget {
            let bytes = parse_memory_size(budget)?;
            if bytes == 0 {
                return Err("ram_budget must be greater than 0".to_string());
            }
        }
        Ok(())
    }

    /// The explicit RAM budget in bytes, if one was given.
    pub fn ram_budget_bytes(&self) -> Result<Option<u64>, String> {
        self.ram_budget
            .as_deref()
            .map(parse_memory_size)
            .transpose()
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Describe a processed raster.
    Info(InfoArgs),

    /// Compute a processed raster and write it to a file.
    Render(RenderArgs),

    /// List registered algorithms.
    Algorithms,
}

/// Arguments of `info`.
#[derive(Args, Debug, Clone)]
pub struct InfoArgs {
    /// Processed raster description (JSON).
    pub config: PathBuf,

    /// Print the retained configuration as JSON instead.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Arguments of `render`.
#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Processed raster description (JSON).
    pub config: PathBuf,

    /// Output file. Byte rasters with 1 to 4 bands are written as PNG,
    /// anything else as raw pixel-interleaved samples.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Render overview level N instead of the full resolution raster.
    #[arg(long)]
    pub overview: Option<usize>,
}

// =============================================================================
// Tests
// =============================================================================
