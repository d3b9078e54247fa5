// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware write engine (§4.G): partition marker, flash descriptor (or
//! the T41N preamble sequence), an erase wait, then the chunked
//! `VR_WRITE` handshake loop per variant, finished with a `FLUSH_CACHE`.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::descriptors::{build_flash_descriptor, build_partition_marker, build_t41n_preamble_descriptor};
use crate::error::{Error, Result};
use crate::handshake::{write_chunk_size, write_handshake, HandshakeStatus};
use crate::usb::{protocol, Transport};
use crate::variant::{Stage, Variant};

const BULK_TIMEOUT: Duration = Duration::from_secs(6);
const PREFLIGHT_SETTLE: Duration = Duration::from_millis(500);
const POST_VR_WRITE_SETTLE: Duration = Duration::from_millis(50);
const POST_BULK_SETTLE: Duration = Duration::from_millis(100);
const T41_FW_READ_TIMEOUT: Duration = Duration::from_secs(1);
const LOG_DRAIN_TIMEOUT: Duration = Duration::from_millis(5);
const LOG_DRAIN_MAX_PACKETS: usize = 16;
const LOG_DRAIN_PACKET_SIZE: usize = 512;
const CHUNK_SETTLE: Duration = Duration::from_millis(300);

/// Flash address the erase wait polls once the descriptor/marker are in.
const ERASE_BASE_ADDR: u32 = 0x0000_8010;

/// A1 doesn't expose an erase-status register the host can poll; instead
/// it documents a fixed worst-case erase wait.
const A1_FIXED_ERASE_WAIT: Duration = Duration::from_secs(60);

/// Minimum time to wait before the first stability poll even begins.
const ERASE_MIN_WAIT: Duration = Duration::from_secs(5);
/// Upper bound on total erase-wait time (including `ERASE_MIN_WAIT`).
const ERASE_MAX_WAIT: Duration = Duration::from_secs(60);
/// Poll interval once `ERASE_MIN_WAIT` has elapsed.
const ERASE_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Number of consecutive identical readings required to call the erase
/// "stable" (finished transitioning).
const ERASE_STABLE_READINGS: usize = 3;

pub type ProgressFn<'a> = dyn FnMut(u64, u64) + 'a;

fn status4_to_u32<T: Transport>(transport: &mut T) -> Result<u32> {
    let buf = protocol::fw_read_status2(transport, Stage::Firmware)?;
    Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// Waits for the erase to settle: always waits at least `ERASE_MIN_WAIT`,
/// then polls every `ERASE_POLL_INTERVAL`, proceeding once the status
/// reading has held stable for `ERASE_STABLE_READINGS` consecutive polls
/// or has transitioned away from its first post-minimum-wait reading,
/// capped at `ERASE_MAX_WAIT` total.
fn wait_for_erase<T: Transport>(transport: &mut T) -> Result<()> {
    let start = Instant::now();
    std::thread::sleep(ERASE_MIN_WAIT);

    let mut baseline: Option<u32> = None;
    let mut last: Option<u32> = None;
    let mut stable_count = 0usize;

    loop {
        std::thread::sleep(ERASE_POLL_INTERVAL);
        let status = status4_to_u32(transport)?;
        debug!("erase status: {status:#010x}");

        if baseline.is_none() {
            baseline = Some(status);
        } else if Some(status) != baseline {
            debug!("erase status transitioned away from baseline; proceeding");
            return Ok(());
        }

        match last {
            Some(prev) if prev == status => {
                stable_count += 1;
                if stable_count >= ERASE_STABLE_READINGS {
                    return Ok(());
                }
            }
            _ => stable_count = 1,
        }
        last = Some(status);

        if start.elapsed() >= ERASE_MAX_WAIT {
            warn!("erase wait exceeded cap ({ERASE_MAX_WAIT:?}); proceeding anyway");
            return Ok(());
        }
    }
}

fn drain_log_bytes<T: Transport>(transport: &mut T, bulk_in_ep: u8) {
    for _ in 0..LOG_DRAIN_MAX_PACKETS {
        let mut buf = [0u8; LOG_DRAIN_PACKET_SIZE];
        match transport.bulk_in(bulk_in_ep, &mut buf, LOG_DRAIN_TIMEOUT) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }
}

fn t31_family_preflight<T: Transport>(
    transport: &mut T,
    variant: Variant,
    data_len: u32,
    partition_count: u32,
    bulk_out_ep: u8,
) -> Result<()> {
    let marker = build_partition_marker(partition_count);
    let descriptor = build_flash_descriptor(variant, data_len, write_chunk_size(variant) as u32);
    transport.bulk_out(bulk_out_ep, &marker, BULK_TIMEOUT)?;
    transport.bulk_out(bulk_out_ep, &descriptor, BULK_TIMEOUT)?;
    std::thread::sleep(PREFLIGHT_SETTLE);
    protocol::fw_handshake(transport, Stage::Firmware)?;
    Ok(())
}

fn t41n_preflight<T: Transport>(
    transport: &mut T,
    data_len: u32,
    partition_count: u32,
    bulk_out_ep: u8,
) -> Result<()> {
    let marker = build_partition_marker(partition_count);
    let descriptor = build_t41n_preamble_descriptor(data_len, write_chunk_size(Variant::T41N) as u32);

    for _ in 0..2 {
        let preamble = [0u8; 40];
        protocol::fw_write2(transport, Stage::Firmware, &preamble)?;
        transport.bulk_out(bulk_out_ep, &marker, BULK_TIMEOUT)?;
        transport.bulk_out(bulk_out_ep, &descriptor, BULK_TIMEOUT)?;
        let _ = protocol::fw_read(transport, Stage::Firmware);
        let _ = protocol::fw_read_status4(transport, Stage::Firmware);
    }

    std::thread::sleep(PREFLIGHT_SETTLE);
    protocol::fw_handshake(transport, Stage::Firmware)?;
    Ok(())
}

/// Writes `data` to flash starting at `start_addr` on a firmware-stage
/// device. `partition_count` sizes the "ILOP" marker; `erase` gates the
/// erase-wait poll (or A1's fixed wait) before the chunk loop — a caller
/// that knows the target region is already erased can skip it; `bulk_out_ep`
/// is the firmware stage's bulk-OUT endpoint, `bulk_in_ep` drains
/// best-effort log bytes between chunks.
pub fn write_flash<T: Transport>(
    transport: &mut T,
    variant: Variant,
    data: &[u8],
    start_addr: u32,
    partition_count: u32,
    erase: bool,
    bulk_out_ep: u8,
    bulk_in_ep: u8,
    mut progress: Option<&mut ProgressFn<'_>>,
) -> Result<()> {
    if variant == Variant::T41N {
        t41n_preflight(transport, data.len() as u32, partition_count, bulk_out_ep)?;
    } else {
        t31_family_preflight(transport, variant, data.len() as u32, partition_count, bulk_out_ep)?;
    }

    protocol::set_data_addr(transport, Stage::Firmware, ERASE_BASE_ADDR)?;
    protocol::set_data_len(transport, Stage::Firmware, data.len() as u32)?;

    if erase {
        if variant == Variant::A1 {
            std::thread::sleep(A1_FIXED_ERASE_WAIT);
        } else {
            wait_for_erase(transport)?;
        }
    } else {
        debug!("--erase not requested; skipping the erase-wait poll");
    }

    let chunk_size = write_chunk_size(variant);
    let total = data.len() as u64;
    let mut written: u64 = 0;

    for (i, chunk) in data.chunks(chunk_size).enumerate() {
        let addr = start_addr + (i * chunk_size) as u32;
        let cmd = write_handshake(addr, chunk, variant);
        protocol::vr_write(transport, Stage::Firmware, &cmd)?;
        std::thread::sleep(POST_VR_WRITE_SETTLE);

        transport.bulk_out(bulk_out_ep, chunk, BULK_TIMEOUT)?;
        std::thread::sleep(POST_BULK_SETTLE);

        if matches!(variant, Variant::T41 | Variant::T41N | Variant::T40) {
            let _ = transport.bulk_in(bulk_in_ep, &mut [0u8; 4], T41_FW_READ_TIMEOUT);
        }
        drain_log_bytes(transport, bulk_in_ep);

        let status_bytes = protocol::fw_read_status2(transport, Stage::Firmware)?;
        let status = HandshakeStatus::from_bytes(&status_bytes);
        if status.is_crc_fail() {
            return Err(Error::Protocol(format!(
                "device reported a write/CRC failure at {addr:#x}"
            )));
        }

        written += chunk.len() as u64;
        if let Some(cb) = progress.as_deref_mut() {
            cb(written, total);
        }
        std::thread::sleep(CHUNK_SETTLE);
    }

    let _ = protocol::flush_cache(transport, Stage::Firmware);
    info!("write complete: {written} bytes");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::transport::MockTransport;

    fn ok_status2() -> Vec<u8> {
        vec![0, 0, 0, 0, 0, 0, 0, 0]
    }

    #[test]
    fn write_flash_sends_marker_descriptor_and_chunks() {
        let mut mock = MockTransport::new();
        mock.push_control_in_ok(ok_status2()); // erase-wait poll, baseline+stable
        mock.push_control_in_ok(ok_status2());
        mock.push_control_in_ok(ok_status2());
        let data = vec![0xCD; 4096];
        mock.push_control_in_ok(ok_status2()); // post-chunk status check
        write_flash(&mut mock, Variant::T31X, &data, 0, 1, true, 0x02, 0x81, None).unwrap();

        assert!(mock.calls.iter().any(|c| c.starts_with("control_out(req=0x12")));
        assert!(mock.calls.iter().any(|c| c.starts_with("control_out(req=0x11")));
        assert!(mock.calls.iter().any(|c| c.starts_with("control_out(req=0x01")));
        assert!(mock.calls.iter().any(|c| c.starts_with("control_out(req=0x02")));
    }

    #[test]
    fn t41n_sends_paired_fw_write2_preamble_with_marker_and_descriptor() {
        let mut mock = MockTransport::new();
        mock.push_control_in_ok(ok_status2());
        mock.push_control_in_ok(ok_status2());
        mock.push_control_in_ok(ok_status2());
        mock.push_control_in_ok(ok_status2());
        write_flash(&mut mock, Variant::T41N, &[0u8; 1024], 0, 1, true, 0x02, 0x81, None).unwrap();
        let count = mock.calls.iter().filter(|c| c.starts_with("control_out(req=0x14")).count();
        assert_eq!(count, 2);
        let bulk_outs = mock.calls.iter().filter(|c| c.starts_with("bulk_out")).count();
        // 2 preambles x (marker + descriptor) + 1 data chunk = 5.
        assert_eq!(bulk_outs, 5);
    }

    #[test]
    fn write_flash_detects_0xffff_failure_sentinel() {
        let mut mock = MockTransport::new();
        mock.push_control_in_ok(ok_status2());
        mock.push_control_in_ok(ok_status2());
        mock.push_control_in_ok(ok_status2());
        mock.push_control_in_ok(vec![0xFF, 0xFF, 0x00, 0x00, 0, 0, 0, 0]);
        let result = write_flash(&mut mock, Variant::T31X, &[0u8; 1024], 0, 1, true, 0x02, 0x81, None);
        assert!(result.is_err());
    }

    #[test]
    fn write_flash_with_erase_false_skips_the_erase_wait_poll() {
        let mut mock = MockTransport::new();
        mock.push_control_in_ok(ok_status2()); // post-chunk status check only
        let start = Instant::now();
        write_flash(&mut mock, Variant::T31X, &[0u8; 256], 0, 1, false, 0x02, 0x81, None).unwrap();
        assert!(start.elapsed() < ERASE_MIN_WAIT);
    }

    /// Seed scenario 5: a status poller returning a constant value holds
    /// stable for 3 consecutive polls at 500ms each, after the 5s floor.
    #[test]
    fn erase_wait_is_stable_after_three_matching_polls_past_the_floor() {
        let mut mock = MockTransport::new();
        for _ in 0..10 {
            mock.push_control_in_ok(vec![0xEF, 0xBE, 0xAD, 0xDE, 0, 0, 0, 0]);
        }
        let start = Instant::now();
        wait_for_erase(&mut mock).unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(6500 - 50));
        assert!(elapsed <= Duration::from_secs(10));
    }
}
