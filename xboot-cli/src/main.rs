// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line tool for reprogramming Ingenic XBurst devices over USB.
//!
//! Usage:
//!   xboot list
//!   xboot bootstrap --spl spl.bin --uboot uboot.bin
//!   xboot read firmware.bin
//!   xboot write firmware.bin --start-addr 0x0

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    cli::run(args)
}
