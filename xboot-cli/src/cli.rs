// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "xboot")]
#[command(about = "Reprogram Ingenic XBurst devices over USB")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Force a specific device variant instead of auto-detecting it
    #[arg(long, global = true, value_name = "VARIANT")]
    pub force_variant: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Bootstrap pipeline inputs, shared by `bootstrap` and by `read`/`write`
/// (which run the pipeline themselves when the device isn't already
/// running firmware-stage vendor code).
#[derive(clap::Args, Clone)]
pub struct BootstrapArgs {
    /// DDR configuration blob (if omitted, one is built from the embedded
    /// parameter database, or a variant-keyed default file, for the
    /// detected/forced variant)
    #[arg(long, value_name = "FILE")]
    pub ddr_config: Option<PathBuf>,

    /// Second-stage program loader image (if omitted, falls back to a
    /// variant-keyed default path)
    #[arg(long, value_name = "FILE")]
    pub spl: Option<PathBuf>,

    /// U-Boot (or vendor burner) image (if omitted, falls back to a
    /// variant-keyed default path)
    #[arg(long, value_name = "FILE")]
    pub uboot: Option<PathBuf>,

    /// Skip staging a DDR configuration blob (DRAM already configured)
    #[arg(long)]
    pub skip_ddr: bool,

    /// Override the address U-Boot is staged to and started from
    #[arg(long, value_name = "ADDR")]
    pub uboot_address: Option<String>,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// List attached devices and their detected stage/variant
    List,

    /// Run the DDR config -> SPL -> U-Boot bootstrap pipeline
    Bootstrap {
        #[command(flatten)]
        bootstrap: BootstrapArgs,
    },

    /// Read the full flash contents from a device, bootstrapping it first
    /// if it isn't already running firmware-stage vendor code
    Read {
        /// Destination file
        #[arg(value_name = "FILE")]
        out: PathBuf,

        #[command(flatten)]
        bootstrap: BootstrapArgs,
    },

    /// Write an image to flash on a device, bootstrapping it first if it
    /// isn't already running firmware-stage vendor code
    Write {
        /// Source image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Flash start address
        #[arg(long, value_name = "ADDR", default_value = "0x0")]
        start_addr: String,

        /// Number of partitions to record in the partition marker
        #[arg(long, default_value = "1")]
        partitions: u32,

        /// Erase the target region (wait out the device's erase cycle)
        /// before writing
        #[arg(long)]
        erase: bool,

        #[command(flatten)]
        bootstrap: BootstrapArgs,
    },
}

pub(crate) fn parse_addr(s: &str) -> Result<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Ok(u32::from_str_radix(hex, 16)?)
    } else {
        Ok(s.parse()?)
    }
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::List => commands::list(),
        Commands::Bootstrap { bootstrap } => {
            commands::bootstrap(&bootstrap, cli.force_variant.as_deref())
        }
        Commands::Read { out, bootstrap } => {
            commands::read(&out, &bootstrap, cli.force_variant.as_deref())
        }
        Commands::Write {
            file,
            start_addr,
            partitions,
            erase,
            bootstrap,
        } => {
            let start_addr = parse_addr(&start_addr)?;
            commands::write(&file, start_addr, partitions, erase, &bootstrap, cli.force_variant.as_deref())
        }
    }
}
