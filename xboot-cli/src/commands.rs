// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations wiring `xboot-common` to the terminal.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusb::{Context as UsbContext, UsbContext as _};

use xboot_common::bootstrap::BootstrapOptions;
use xboot_common::{
    classify, read_flash, run_bootstrap, scan_devices, write_flash, FileBundleSource,
    RusbTransport, Stage, Transport, Variant,
};

use crate::cli::{parse_addr, BootstrapArgs};

const BULK_OUT_EP: u8 = 0x01;
const BULK_IN_EP: u8 = 0x81;

fn progress_bar(total: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn open_first_device(context: &UsbContext, force_variant: Option<&str>) -> Result<(RusbTransport, Variant, Stage)> {
    let found = scan_devices(context)?;
    let info = found.first().context("no matching device found")?;

    let rusb_device = context
        .devices()?
        .iter()
        .find(|d| d.bus_number() == info.bus && d.address() == info.address)
        .context("device vanished between scan and open")?;

    let mut transport = RusbTransport::open(&rusb_device, info.vendor_id, info.product_id)?;

    let mut buf = [0u8; 16];
    let n = transport
        .control_in(Stage::Bootrom, 0x08, 0, 0, &mut buf)
        .or_else(|_| {
            transport.claim_interface()?;
            transport.control_in(Stage::Bootrom, 0x08, 0, 0, &mut buf)
        })?;
    let raw_magic = String::from_utf8_lossy(&buf[..n]).trim_matches('\0').to_string();
    let (stage, detected_variant) = classify(&raw_magic);

    let variant = match force_variant {
        Some(v) => Variant::from_str(v).map_err(|e| anyhow::anyhow!(e.to_string()))?,
        None => detected_variant,
    };

    println!("device at {}:{} — magic {:?}, stage {:?}, variant {}", info.bus, info.address, raw_magic, stage, variant);
    Ok((transport, variant, stage))
}

/// List attached devices and their detected stage/variant.
pub fn list() -> Result<()> {
    let context = UsbContext::new()?;
    let found = scan_devices(&context)?;
    if found.is_empty() {
        println!("no devices found");
        return Ok(());
    }
    for info in found {
        println!(
            "bus {:03} addr {:03}  {:04x}:{:04x}",
            info.bus, info.address, info.vendor_id, info.product_id
        );
    }
    Ok(())
}

fn bootstrap_options(bootstrap: &BootstrapArgs, force_variant: Option<&str>) -> Result<BootstrapOptions> {
    let uboot_address_override = bootstrap.uboot_address.as_deref().map(parse_addr).transpose()?;
    Ok(BootstrapOptions {
        skip_ddr: bootstrap.skip_ddr,
        uboot_address_override,
        force_variant: force_variant
            .map(Variant::from_str)
            .transpose()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
    })
}

/// Runs the bootstrap pipeline if the device isn't already past it; a
/// no-op (beyond a log line) for a device already in firmware stage.
fn ensure_firmware_stage(
    transport: &mut RusbTransport,
    variant: Variant,
    stage: Stage,
    bootstrap: &BootstrapArgs,
    force_variant: Option<&str>,
) -> Result<()> {
    if stage == Stage::Firmware {
        return Ok(());
    }
    println!("device is not yet running firmware-stage code; bootstrapping first...");
    let bundle = FileBundleSource::new(
        bootstrap.ddr_config.clone(),
        bootstrap.spl.clone(),
        bootstrap.uboot.clone(),
    );
    let opts = bootstrap_options(bootstrap, force_variant)?;
    run_bootstrap(transport, &bundle, variant, &opts, BULK_OUT_EP)?;
    println!("bootstrap complete.");
    Ok(())
}

/// Run the DDR -> SPL -> U-Boot bootstrap pipeline.
pub fn bootstrap(bootstrap: &BootstrapArgs, force_variant: Option<&str>) -> Result<()> {
    let context = UsbContext::new()?;
    let (mut transport, variant, _stage) = open_first_device(&context, force_variant)?;

    let bundle = FileBundleSource::new(
        bootstrap.ddr_config.clone(),
        bootstrap.spl.clone(),
        bootstrap.uboot.clone(),
    );
    let opts = bootstrap_options(bootstrap, force_variant)?;

    println!("starting bootstrap for {variant}...");
    run_bootstrap(&mut transport, &bundle, variant, &opts, BULK_OUT_EP)?;
    println!("bootstrap complete.");
    Ok(())
}

/// Read the full flash contents from a device, bootstrapping it first if
/// it isn't already running firmware-stage vendor code.
pub fn read(out: &Path, bootstrap: &BootstrapArgs, force_variant: Option<&str>) -> Result<()> {
    let context = UsbContext::new()?;
    let (mut transport, variant, stage) = open_first_device(&context, force_variant)?;

    ensure_firmware_stage(&mut transport, variant, stage, bootstrap, force_variant)?;

    let pb = progress_bar(16 * 1024 * 1024)?;
    let mut cb = |done: u64, total: u64| {
        pb.set_length(total);
        pb.set_position(done);
    };
    let data = read_flash(&mut transport, variant, BULK_OUT_EP, BULK_IN_EP, Some(&mut cb))?;
    pb.finish_with_message("read complete");

    fs::write(out, &data).with_context(|| format!("failed to write {}", out.display()))?;
    println!("wrote {} bytes to {}", data.len(), out.display());
    Ok(())
}

/// Write an image to flash on a device, bootstrapping it first if it
/// isn't already running firmware-stage vendor code.
pub fn write(
    file: &Path,
    start_addr: u32,
    partitions: u32,
    erase: bool,
    bootstrap: &BootstrapArgs,
    force_variant: Option<&str>,
) -> Result<()> {
    let context = UsbContext::new()?;
    let (mut transport, variant, stage) = open_first_device(&context, force_variant)?;

    ensure_firmware_stage(&mut transport, variant, stage, bootstrap, force_variant)?;

    let data = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let pb = progress_bar(data.len() as u64)?;
    let mut cb = |done: u64, total: u64| {
        pb.set_length(total);
        pb.set_position(done);
    };

    write_flash(&mut transport, variant, &data, start_addr, partitions, erase, BULK_OUT_EP, BULK_IN_EP, Some(&mut cb))?;
    pb.finish_with_message("write complete");
    println!("wrote {} bytes from {}", data.len(), file.display());
    Ok(())
}
