// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Device discovery: scanning for known vendor/product IDs and probing an
//! attached device's CPU-magic string to classify its stage and variant
//! (§4.C, §4.D "preflight").

use rusb::{Context, UsbContext};

use crate::error::{Error, Result};
use crate::usb::transport::{requests, RusbTransport};
use crate::usb::Transport;
use crate::variant::{detect_stage, detect_variant, normalize_magic, Stage, Variant};

/// (vendor_id, product_id) pairs the bootrom and vendor firmware stages
/// are known to enumerate under.
pub const KNOWN_VID_PIDS: &[(u16, u16)] = &[
    (0xA108, 0x1000), // bootrom USB loader
    (0xA108, 0x1010), // running vendor U-Boot/burner firmware
];

/// A device found during a scan, before it has been opened or classified.
#[derive(Debug, Clone, Copy)]
pub struct DeviceInfo {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// A probed device: its bus location plus the classification derived
/// from its CPU-magic string.
#[derive(Debug, Clone)]
pub struct ClassifiedDevice {
    pub bus: u8,
    pub address: u8,
    pub raw_magic: String,
    pub stage: Stage,
    pub variant: Variant,
}

/// Enumerates every USB device matching a known vendor/product ID pair.
pub fn scan_devices(context: &Context) -> Result<Vec<DeviceInfo>> {
    let devices = context
        .devices()
        .map_err(|e| Error::InitFailed(e.to_string()))?;
    let mut found = Vec::new();
    for device in devices.iter() {
        let desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };
        let vid = desc.vendor_id();
        let pid = desc.product_id();
        if KNOWN_VID_PIDS.contains(&(vid, pid)) {
            found.push(DeviceInfo {
                bus: device.bus_number(),
                address: device.address(),
                vendor_id: vid,
                product_id: pid,
            });
        }
    }
    Ok(found)
}

/// Probes a device's CPU-magic string via `GET_CPU_INFO`, trying an
/// un-claimed quick read first (50 ms) and falling back to claiming the
/// interface and retrying at the default timeout if that fails. Bootrom
/// devices typically answer without a claim; firmware-stage devices
/// sometimes require it.
pub fn probe_cpu_magic<T: Transport>(transport: &mut T, stage_guess: Stage) -> Result<String> {
    let mut buf = [0u8; 16];

    match transport.quick_probe(requests::GET_CPU_INFO, &mut buf) {
        Ok(n) => return Ok(normalize_magic(&buf[..n]).0),
        Err(_) => {
            transport.claim_interface()?;
        }
    }

    let n = transport.control_in(stage_guess, requests::GET_CPU_INFO, 0, 0, &mut buf)?;
    Ok(normalize_magic(&buf[..n]).0)
}

/// Classifies a raw CPU-magic string into stage and variant.
pub fn classify(raw_magic: &str) -> (Stage, Variant) {
    (detect_stage(raw_magic), detect_variant(raw_magic))
}

/// Opens a device, probes it, and returns its full classification. Tries
/// `Stage::Bootrom` first (the common case just after power-on); if the
/// magic classifies as `Stage::Firmware`, the caller should re-dispatch
/// subsequent requests with that stage instead.
pub fn open_and_classify(device: &DeviceInfo, context: &Context) -> Result<ClassifiedDevice> {
    let rusb_device = context
        .devices()
        .map_err(|e| Error::InitFailed(e.to_string()))?
        .iter()
        .find(|d| d.bus_number() == device.bus && d.address() == device.address())
        .ok_or(Error::DeviceNotFound)?;

    let mut transport = RusbTransport::open(&rusb_device, device.vendor_id, device.product_id)?;
    let raw_magic = probe_cpu_magic(&mut transport, Stage::Bootrom)?;
    let (stage, variant) = classify(&raw_magic);

    Ok(ClassifiedDevice {
        bus: device.bus,
        address: device.address,
        raw_magic,
        stage,
        variant,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::transport::MockTransport;

    #[test]
    fn probe_succeeds_without_claim_when_device_answers() {
        let mut mock = MockTransport::new();
        mock.push_control_in_ok(b"T31X\0\0\0\0".to_vec());
        let magic = probe_cpu_magic(&mut mock, Stage::Bootrom).unwrap();
        assert_eq!(magic, "T31X");
        assert!(!mock.calls.iter().any(|c| c == "claim_interface"));
    }

    #[test]
    fn probe_claims_and_retries_on_first_failure() {
        let mut mock = MockTransport::new();
        mock.push_control_in_err("stall");
        mock.push_control_in_ok(b"X2580\0\0\0".to_vec());
        let magic = probe_cpu_magic(&mut mock, Stage::Bootrom).unwrap();
        assert_eq!(magic, "X2580");
        assert!(mock.calls.iter().any(|c| c == "claim_interface"));
    }

    #[test]
    fn classify_routes_through_variant_detection() {
        let (stage, variant) = classify("X2580");
        assert_eq!(stage, Stage::Firmware);
        assert_eq!(variant, Variant::T41);
    }
}
