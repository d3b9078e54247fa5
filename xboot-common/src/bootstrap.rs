// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The bootstrap pipeline (§4.D): DDR configuration, SPL, then U-Boot,
//! each staged into SRAM/SDRAM and started in turn. Variant dictates both
//! the post-SPL stabilization strategy and whether `FLUSH_CACHE` is
//! skipped before handoff.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::bundle::FirmwareBundleSource;
use crate::ddr::{build_ddr_binary, default_chip_for, lookup_platform};
use crate::error::{Error, Result};
use crate::usb::transport::requests;
use crate::usb::{protocol, Transport};
use crate::variant::{Stage, Variant};

/// SRAM load address for the DDR config blob and SPL.
pub const SRAM_LOAD_ADDR: u32 = 0x8000_1000;
/// SDRAM load address for U-Boot, once DRAM is live.
pub const SDRAM_LOAD_ADDR: u32 = 0x8010_0000;

/// Default chunk size for the bootrom-stage `SET_DATA_ADDR`/bulk-OUT
/// staging primitive.
const STAGE_CHUNK_SIZE: usize = 1024 * 1024;
/// Per-chunk retry attempts before giving up on a staging transfer.
const CHUNK_RETRIES: usize = 3;
/// Backoff between chunk retries.
const CHUNK_RETRY_BACKOFF: Duration = Duration::from_millis(50);
/// Inter-chunk delay applied once total staged bytes cross 100 KiB, to
/// avoid overrunning the bootrom's small USB receive buffer.
const INTER_CHUNK_DELAY_THRESHOLD: u64 = 100 * 1024;
const INTER_CHUNK_DELAY: Duration = Duration::from_millis(10);

/// `d2i_len` staged ahead of `PROG_STAGE1`: T20's bootrom expects a
/// smaller data-in length than every later SoC generation.
const D2I_LEN_T20: u32 = 0x4000;
const D2I_LEN_DEFAULT: u32 = 0x7000;

/// Settle delay after U-Boot/burner image is fully staged, before
/// `PROG_STAGE2`.
const UBOOT_SETTLE: Duration = Duration::from_millis(500);

/// Settle after `PROG_STAGE2`: the device is already re-enumerating, so a
/// timeout here is expected rather than fatal; give it a moment before the
/// caller moves on to opening it as a firmware-stage device.
const POST_STAGE2_SETTLE: Duration = Duration::from_secs(1);

/// Options overriding the bootstrap pipeline's normal DDR/variant
/// handling, surfaced to the CLI's `bootstrap` subcommand.
#[derive(Debug, Clone, Default)]
pub struct BootstrapOptions {
    pub skip_ddr: bool,
    pub uboot_address_override: Option<u32>,
    pub force_variant: Option<Variant>,
}

fn d2i_len(variant: Variant) -> u32 {
    if variant == Variant::T20 {
        D2I_LEN_T20
    } else {
        D2I_LEN_DEFAULT
    }
}

/// Adaptive timeout for a single chunked-transfer bulk-OUT: 5s baseline
/// plus 1s per 64 KiB, capped at 30s.
fn chunk_timeout(len: usize) -> Duration {
    let extra_secs = (len / 65536) as u64;
    let secs = (5 + extra_secs).min(30);
    Duration::from_secs(secs)
}

/// Sends `data` to `addr` in fixed-size chunks via `SET_DATA_ADDR` +
/// `SET_DATA_LEN` + bulk-OUT, each chunk retried up to `CHUNK_RETRIES`
/// times under a fixed backoff, with an inter-chunk settle delay once the
/// total staged this call crosses `INTER_CHUNK_DELAY_THRESHOLD`.
///
/// `tolerate_set_data_len_failure` swallows a `SET_DATA_LEN` rejection
/// instead of propagating it: T41/T41N reject this request during the
/// U-Boot load, but still accept the bulk-OUT that follows.
fn send_chunked<T: Transport>(
    transport: &mut T,
    stage: Stage,
    addr: u32,
    data: &[u8],
    bulk_out_ep: u8,
    tolerate_set_data_len_failure: bool,
) -> Result<()> {
    let mut staged: u64 = 0;
    for (i, chunk) in data.chunks(STAGE_CHUNK_SIZE).enumerate() {
        let chunk_addr = addr + (i * STAGE_CHUNK_SIZE) as u32;
        let timeout = chunk_timeout(chunk.len());

        let mut last_err = None;
        let mut sent = false;
        for attempt in 0..CHUNK_RETRIES {
            protocol::set_data_addr(transport, stage, chunk_addr)?;
            if let Err(e) = protocol::set_data_len(transport, stage, chunk.len() as u32) {
                if !tolerate_set_data_len_failure {
                    return Err(e);
                }
                debug!("SET_DATA_LEN rejected at {chunk_addr:#x} (tolerated for this variant): {e}");
            }
            match transport.bulk_out(bulk_out_ep, chunk, timeout) {
                Ok(_) => {
                    sent = true;
                    break;
                }
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < CHUNK_RETRIES {
                        std::thread::sleep(CHUNK_RETRY_BACKOFF);
                    }
                }
            }
        }
        if !sent {
            return Err(last_err.unwrap_or(Error::TransferFailed("chunk send failed".into())));
        }

        staged += chunk.len() as u64;
        if staged >= INTER_CHUNK_DELAY_THRESHOLD {
            std::thread::sleep(INTER_CHUNK_DELAY);
        }
    }
    Ok(())
}

/// Polls `GET_CPU_INFO` without re-enumerating: used by variants whose
/// SPL keeps the same USB loader alive across the DRAM bring-up. Uses the
/// transport's quick (50 ms, un-claimed) probe rather than the full
/// control timeout, so a poll loop fails fast instead of blocking for
/// seconds per failed attempt.
fn stabilize_in_place<T: Transport>(transport: &mut T, settle: Duration, max_polls: usize) -> Result<()> {
    std::thread::sleep(settle);
    let mut buf = [0u8; 16];
    for _ in 0..max_polls {
        if transport.quick_probe(requests::GET_CPU_INFO, &mut buf).is_ok() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}

/// Closes the handle, waits for the SPL's fresh enumeration, and reopens
/// against the same (vendor, product) pair: used by variants whose SPL
/// re-enumerates as a new USB device.
fn stabilize_via_reenumeration<T: Transport>(transport: &mut T, variant: Variant, settle: Duration) -> Result<()> {
    std::thread::sleep(settle);
    let (bus, address) = transport.reopen_same_vid_pid()?;
    debug!("reopened post-SPL device at {bus}:{address} as {variant}");

    if variant == Variant::A1 {
        std::thread::sleep(Duration::from_millis(5000));
    }

    // Generic path: poll until 3 consecutive GET_CPU_INFO successes, up to
    // 2000 iterations @ 10ms; refresh the handle once after 200 failed
    // iterations in case the re-enumerated device needs a fresh claim. Each
    // attempt uses the transport's quick probe so a still-enumerating
    // device doesn't stall the loop for the full control timeout.
    let mut consecutive = 0usize;
    let mut refreshed = false;
    let mut buf = [0u8; 16];
    for i in 0..2000 {
        match transport.quick_probe(requests::GET_CPU_INFO, &mut buf) {
            Ok(_) => {
                consecutive += 1;
                if consecutive >= 3 {
                    return Ok(());
                }
            }
            Err(_) => {
                consecutive = 0;
                if i == 200 && !refreshed {
                    refreshed = true;
                    let _ = transport.reopen_same_vid_pid();
                }
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    warn!("post-SPL stabilization polling exhausted without 3 consecutive successes");
    Ok(())
}

fn post_spl_stabilize<T: Transport>(transport: &mut T, variant: Variant) -> Result<()> {
    match variant {
        Variant::T20 | Variant::T41 | Variant::T41N => {
            stabilize_in_place(transport, Duration::from_millis(1100), 10)
        }
        _ => stabilize_via_reenumeration(transport, variant, Duration::from_millis(3000)),
    }
}

/// Runs the full bootstrap: DDR config (unless skipped) -> SPL -> U-Boot.
/// `bulk_out_ep` is the bootrom stage's bulk-OUT endpoint address.
pub fn run_bootstrap<T: Transport>(
    transport: &mut T,
    bundle: &dyn FirmwareBundleSource,
    variant: Variant,
    opts: &BootstrapOptions,
    bulk_out_ep: u8,
) -> Result<()> {
    let effective_variant = opts.force_variant.unwrap_or(variant);
    info!("bootstrap: variant={effective_variant}");

    if !opts.skip_ddr {
        let ddr_blob = match bundle.ddr_config(effective_variant)? {
            Some(blob) => blob,
            None => {
                let platform_name = effective_variant.to_string();
                let platform = lookup_platform(&platform_name).ok_or_else(|| {
                    Error::InvalidParameter(format!(
                        "no embedded DDR platform defaults for variant {effective_variant}"
                    ))
                })?;
                let chip = default_chip_for(platform);
                build_ddr_binary(platform, chip)?
            }
        };
        debug!("staging DDR config blob ({} bytes)", ddr_blob.len());
        send_chunked(transport, Stage::Bootrom, SRAM_LOAD_ADDR, &ddr_blob, bulk_out_ep, false)?;
        protocol::prog_stage1(transport, Stage::Bootrom, SRAM_LOAD_ADDR)?;
    } else {
        warn!("skip_ddr set: assuming DRAM is already configured");
    }

    let spl = bundle.spl(effective_variant)?;
    debug!("staging SPL ({} bytes)", spl.len());
    send_chunked(transport, Stage::Bootrom, SRAM_LOAD_ADDR, &spl, bulk_out_ep, false)?;
    protocol::set_data_len(transport, Stage::Bootrom, d2i_len(effective_variant))?;
    protocol::prog_stage1(transport, Stage::Bootrom, SRAM_LOAD_ADDR)?;

    post_spl_stabilize(transport, effective_variant)?;

    let uboot = bundle.uboot(effective_variant)?;
    let uboot_addr = opts.uboot_address_override.unwrap_or(SDRAM_LOAD_ADDR);
    debug!("staging U-Boot ({} bytes) at {uboot_addr:#x}", uboot.len());
    // SET_DATA_LEN is rejected by T41/T41N during this particular load;
    // tolerate it there and let the bulk-OUT proceed regardless.
    let tolerate_len_rejection = matches!(effective_variant, Variant::T41 | Variant::T41N);
    send_chunked(transport, Stage::Bootrom, uboot_addr, &uboot, bulk_out_ep, tolerate_len_rejection)?;
    std::thread::sleep(UBOOT_SETTLE);

    // T41/T41N hand off straight to PROG_STAGE2 without a cache flush;
    // every other variant flushes first.
    if !matches!(effective_variant, Variant::T41 | Variant::T41N) {
        protocol::flush_cache(transport, Stage::Bootrom)?;
    }
    protocol::prog_stage2(transport, Stage::Bootrom, uboot_addr)?;
    std::thread::sleep(POST_STAGE2_SETTLE);

    info!("bootstrap complete");
    Ok(())
}
