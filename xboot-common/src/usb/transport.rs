// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Control/bulk USB transport with retry, recipient fallback, and the
//! "timeout == success" protocol masking described in §4.A and §9.

use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, Direction, Recipient, RequestType, UsbContext};

use crate::error::{Error, Result};
use crate::variant::Stage;

/// Vendor request numbers the transport's retry/masking policy keys on.
/// Named requests (component B) import these rather than redefining them.
pub mod requests {
    pub const GET_CPU_INFO: u8 = 0x08;
    pub const SET_DATA_ADDR: u8 = 0x01;
    pub const SET_DATA_LEN: u8 = 0x02;
    pub const FLUSH_CACHE: u8 = 0x03;
    pub const PROG_STAGE1: u8 = 0x04;
    pub const PROG_STAGE2: u8 = 0x06;
    pub const NAND_OPS: u8 = 0x07;
    pub const FW_READ: u8 = 0x10;
    pub const FW_HANDSHAKE: u8 = 0x11;
    pub const VR_WRITE: u8 = 0x12;
    pub const FW_WRITE1: u8 = 0x13;
    pub const FW_WRITE2: u8 = 0x14;
    pub const FW_READ_STATUS2: u8 = 0x19;
    pub const FW_READ_STATUS4: u8 = 0x26;
}

/// Default control-transfer timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Adaptive timeout for the four requests that can block on SRAM loads or
/// flash erase/program under the hood.
pub const EXTENDED_TIMEOUT: Duration = Duration::from_secs(12);
/// Timeout for `Transport::quick_probe`: a poll loop's fail-fast attempt,
/// un-claimed and with no retry (§4.C).
pub const QUICK_PROBE_TIMEOUT: Duration = Duration::from_millis(50);

/// The three requests retried with a recipient flip + exponential backoff.
/// `PROG_STAGE2` is deliberately excluded: its timeout/pipe-error case is
/// masked to success instead (case 3 below), since by the time it is sent
/// the device is already re-enumerating.
const RECIPIENT_RETRY_REQUESTS: &[u8] = &[
    requests::SET_DATA_ADDR,
    requests::SET_DATA_LEN,
    requests::PROG_STAGE1,
];

fn uses_extended_timeout(request: u8) -> bool {
    matches!(
        request,
        requests::SET_DATA_ADDR | requests::SET_DATA_LEN | requests::PROG_STAGE1 | requests::PROG_STAGE2
    )
}

/// Backoff schedule for recoverable transport errors (max 5 attempts).
const BACKOFF_SCHEDULE_MS: &[u64] = &[500, 1000, 2000, 3000, 5000];

fn is_recoverable(e: &rusb::Error) -> bool {
    matches!(e, rusb::Error::Timeout | rusb::Error::Pipe | rusb::Error::NoDevice)
}

/// A USB transport abstraction, so the protocol/bootstrap/read/write layers
/// can run against either a real device or a scripted `MockTransport` in
/// tests.
pub trait Transport {
    fn control_out(
        &mut self,
        stage: Stage,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize>;

    fn control_in(
        &mut self,
        stage: Stage,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
    ) -> Result<usize>;

    fn bulk_out(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize>;
    fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// A short (`QUICK_PROBE_TIMEOUT`), un-claimed, single-attempt control-IN
    /// against the device recipient — no retry, no recipient flip. Used by
    /// poll loops (post-SPL stabilization, the bootrom-probe cascade) that
    /// need to fail fast rather than block for the full control timeout on
    /// every attempt.
    fn quick_probe(&mut self, request: u8, buf: &mut [u8]) -> Result<usize>;

    fn claim_interface(&mut self) -> Result<()>;
    fn reset(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    /// Close and re-acquire a handle for the same (vendor, product) pair.
    /// Returns the new (bus, address).
    fn reopen_same_vid_pid(&mut self) -> Result<(u8, u8)>;
    fn dump_active_config(&self) -> Result<String>;
    fn bus_address(&self) -> (u8, u8);
}

/// Real libusb-backed transport.
pub struct RusbTransport {
    context: Context,
    handle: Option<DeviceHandle<Context>>,
    vendor_id: u16,
    product_id: u16,
    bus: u8,
    address: u8,
    claimed: bool,
}

impl RusbTransport {
    /// Open the given device, becoming its owning transport.
    pub fn open(device: &Device<Context>, vendor_id: u16, product_id: u16) -> Result<Self> {
        let handle = device
            .open()
            .map_err(|e| Error::OpenFailed(e.to_string()))?;
        Ok(Self {
            context: device.context().clone(),
            bus: device.bus_number(),
            address: device.address(),
            handle: Some(handle),
            vendor_id,
            product_id,
            claimed: false,
        })
    }

    fn handle(&self) -> Result<&DeviceHandle<Context>> {
        self.handle
            .as_ref()
            .ok_or_else(|| Error::TransferFailed("device handle is closed".into()))
    }

    fn handle_mut(&mut self) -> Result<&mut DeviceHandle<Context>> {
        self.handle
            .as_mut()
            .ok_or_else(|| Error::TransferFailed("device handle is closed".into()))
    }

    fn timeout_for(request: u8) -> Duration {
        if uses_extended_timeout(request) {
            EXTENDED_TIMEOUT
        } else {
            DEFAULT_TIMEOUT
        }
    }

    /// Apply the protocol-level "timeout == success" masking of §4.A's
    /// special cases, before any generic retry policy runs.
    fn masked_result(
        stage: Stage,
        request: u8,
        result: std::result::Result<usize, rusb::Error>,
    ) -> Option<Result<usize>> {
        match (stage, request, &result) {
            // VR_WRITE in Firmware stage: a timeout means the device already
            // accepted the 40-byte handshake and is processing the bulk
            // phase.
            (Stage::Firmware, requests::VR_WRITE, Err(rusb::Error::Timeout)) => {
                Some(Ok(0))
            }
            // SET_DATA_ADDR in Firmware stage: device is likely mid-erase.
            (Stage::Firmware, requests::SET_DATA_ADDR, Err(rusb::Error::Timeout)) => {
                Some(Ok(0))
            }
            // PROG_STAGE2: timeout or pipe error is expected re-enumeration.
            (_, requests::PROG_STAGE2, Err(rusb::Error::Timeout))
            | (_, requests::PROG_STAGE2, Err(rusb::Error::Pipe)) => Some(Ok(0)),
            _ => None,
        }
    }

    fn control_transfer(
        &mut self,
        stage: Stage,
        direction: Direction,
        request: u8,
        value: u16,
        index: u16,
        data_out: Option<&[u8]>,
        data_in: Option<&mut [u8]>,
    ) -> Result<usize> {
        let timeout = Self::timeout_for(request);
        let mut recipient = Recipient::Device;
        let retryable = RECIPIENT_RETRY_REQUESTS.contains(&request);

        let mut attempt = 0usize;
        let mut data_in = data_in;
        loop {
            let request_type = rusb::request_type(direction, RequestType::Vendor, recipient);
            let raw_result: std::result::Result<usize, rusb::Error> = {
                let handle = self.handle.as_ref().ok_or(rusb::Error::NoDevice)?;
                match direction {
                    Direction::Out => {
                        handle.write_control(request_type, request, value, index, data_out.unwrap_or(&[]), timeout)
                    }
                    Direction::In => {
                        handle.read_control(request_type, request, value, index, data_in.as_deref_mut().unwrap(), timeout)
                    }
                }
            };

            if let Some(masked) = Self::masked_result(stage, request, raw_result) {
                return masked;
            }

            match raw_result {
                Ok(n) => return Ok(n),
                Err(e) if is_recoverable(&e) && retryable => {
                    if attempt == 0 {
                        // Flip recipient bits once and retry immediately.
                        recipient = match recipient {
                            Recipient::Device => Recipient::Interface,
                            _ => Recipient::Device,
                        };
                        attempt += 1;
                        continue;
                    }
                    let backoff_idx = attempt - 1;
                    if backoff_idx >= BACKOFF_SCHEDULE_MS.len() {
                        return Err(map_terminal_error(e));
                    }
                    std::thread::sleep(Duration::from_millis(BACKOFF_SCHEDULE_MS[backoff_idx]));
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(map_terminal_error(e)),
            }
        }
    }
}

fn map_terminal_error(e: rusb::Error) -> Error {
    match e {
        rusb::Error::Timeout => Error::Timeout(e.to_string()),
        rusb::Error::NoDevice | rusb::Error::NotFound => Error::DeviceNotFound,
        other => Error::TransferFailed(other.to_string()),
    }
}

impl Transport for RusbTransport {
    fn control_out(
        &mut self,
        stage: Stage,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize> {
        self.control_transfer(stage, Direction::Out, request, value, index, Some(data), None)
    }

    fn control_in(
        &mut self,
        stage: Stage,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
    ) -> Result<usize> {
        self.control_transfer(stage, Direction::In, request, value, index, None, Some(buf))
    }

    fn bulk_out(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        let handle = self.handle()?;
        match handle.write_bulk(endpoint, data, timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Err(Error::Timeout("bulk_out".into())),
            Err(e) => Err(map_terminal_error(e)),
        }
    }

    fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        // Accumulate across repeated reads so a timeout is only ever
        // surfaced once nothing further can arrive: `read_bulk`'s safe
        // wrapper discards the actual-transferred count on a timeout
        // error, so the late-completion masking described in §4.A can
        // only be honored for bytes rusb already reported via `Ok(n)`,
        // never for a timeout's hidden partial count.
        let requested = buf.len();
        let mut total = 0usize;
        while total < requested {
            let handle = self.handle()?;
            match handle.read_bulk(endpoint, &mut buf[total..], timeout) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) => return Err(map_terminal_error(e)),
            }
        }
        Ok(total)
    }

    fn quick_probe(&mut self, request: u8, buf: &mut [u8]) -> Result<usize> {
        let handle = self.handle()?;
        let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device);
        handle
            .read_control(request_type, request, 0, 0, buf, QUICK_PROBE_TIMEOUT)
            .map_err(map_terminal_error)
    }

    fn claim_interface(&mut self) -> Result<()> {
        if self.claimed {
            return Ok(());
        }
        let handle = self.handle_mut()?;
        if handle.kernel_driver_active(0).unwrap_or(false) {
            let _ = handle.detach_kernel_driver(0);
        }
        handle
            .claim_interface(0)
            .map_err(|e| Error::OpenFailed(e.to_string()))?;
        self.claimed = true;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.handle_mut()?
            .reset()
            .map_err(|e| Error::TransferFailed(e.to_string()))
    }

    fn close(&mut self) -> Result<()> {
        self.handle = None;
        self.claimed = false;
        Ok(())
    }

    fn reopen_same_vid_pid(&mut self) -> Result<(u8, u8)> {
        self.close()?;
        let devices = self
            .context
            .devices()
            .map_err(|e| Error::InitFailed(e.to_string()))?;
        for device in devices.iter() {
            let desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            if desc.vendor_id() == self.vendor_id && desc.product_id() == self.product_id {
                let handle = device.open().map_err(|e| Error::OpenFailed(e.to_string()))?;
                self.bus = device.bus_number();
                self.address = device.address();
                self.handle = Some(handle);
                self.claimed = false;
                return Ok((self.bus, self.address));
            }
        }
        Err(Error::DeviceNotFound)
    }

    fn dump_active_config(&self) -> Result<String> {
        let handle = self.handle()?;
        let device = handle.device();
        let config = device
            .active_config_descriptor()
            .map_err(|e| Error::TransferFailed(e.to_string()))?;
        let mut out = String::new();
        for interface in config.interfaces() {
            for desc in interface.descriptors() {
                out.push_str(&format!(
                    "interface {} alt {}: class {:#x}\n",
                    desc.interface_number(),
                    desc.setting_number(),
                    desc.class_code()
                ));
                for ep in desc.endpoint_descriptors() {
                    out.push_str(&format!(
                        "  endpoint {:#04x} {:?} {:?}\n",
                        ep.address(),
                        ep.direction(),
                        ep.transfer_type()
                    ));
                }
            }
        }
        Ok(out)
    }

    fn bus_address(&self) -> (u8, u8) {
        (self.bus, self.address)
    }
}

/// A scripted response queued for `MockTransport`.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Debug)]
pub enum MockResponse {
    Ok(Vec<u8>),
    Err(String),
}

/// Records every call made against it; used by unit/integration tests to
/// assert the exact byte sequences named in §8's seed scenarios, without
/// touching real hardware.
#[cfg(any(test, feature = "test-support"))]
pub struct MockTransport {
    pub calls: Vec<String>,
    pub control_out_responses: std::collections::VecDeque<MockResponse>,
    pub control_in_responses: std::collections::VecDeque<(MockResponse, Vec<u8>)>,
    pub bulk_out_responses: std::collections::VecDeque<MockResponse>,
    pub bulk_in_responses: std::collections::VecDeque<(MockResponse, Vec<u8>)>,
    pub bus: u8,
    pub address: u8,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for MockTransport {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            control_out_responses: Default::default(),
            control_in_responses: Default::default(),
            bulk_out_responses: Default::default(),
            bulk_in_responses: Default::default(),
            bus: 1,
            address: 1,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_control_out_ok(&mut self) {
        self.control_out_responses.push_back(MockResponse::Ok(Vec::new()));
    }

    pub fn push_control_out_err(&mut self, msg: &str) {
        self.control_out_responses.push_back(MockResponse::Err(msg.to_string()));
    }

    pub fn push_control_in_ok(&mut self, data: Vec<u8>) {
        self.control_in_responses.push_back((MockResponse::Ok(Vec::new()), data));
    }

    pub fn push_control_in_err(&mut self, msg: &str) {
        self.control_in_responses
            .push_back((MockResponse::Err(msg.to_string()), Vec::new()));
    }

    pub fn push_bulk_out_ok(&mut self) {
        self.bulk_out_responses.push_back(MockResponse::Ok(Vec::new()));
    }

    pub fn push_bulk_in_ok(&mut self, data: Vec<u8>) {
        self.bulk_in_responses.push_back((MockResponse::Ok(Vec::new()), data));
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Transport for MockTransport {
    fn control_out(
        &mut self,
        _stage: Stage,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize> {
        self.calls.push(format!(
            "control_out(req={request:#04x}, value={value:#06x}, index={index:#06x}, len={})",
            data.len()
        ));
        match self.control_out_responses.pop_front() {
            Some(MockResponse::Ok(_)) | None => Ok(data.len()),
            Some(MockResponse::Err(msg)) => Err(Error::TransferFailed(msg)),
        }
    }

    fn control_in(
        &mut self,
        _stage: Stage,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
    ) -> Result<usize> {
        self.calls
            .push(format!("control_in(req={request:#04x}, value={value:#06x}, index={index:#06x})"));
        match self.control_in_responses.pop_front() {
            Some((MockResponse::Ok(_), data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some((MockResponse::Err(msg), _)) => Err(Error::TransferFailed(msg)),
            None => Ok(0),
        }
    }

    fn bulk_out(&mut self, endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.calls.push(format!("bulk_out(ep={endpoint:#04x}, len={})", data.len()));
        match self.bulk_out_responses.pop_front() {
            Some(MockResponse::Ok(_)) | None => Ok(data.len()),
            Some(MockResponse::Err(msg)) => Err(Error::TransferFailed(msg)),
        }
    }

    fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        self.calls.push(format!("bulk_in(ep={endpoint:#04x}, len={})", buf.len()));
        match self.bulk_in_responses.pop_front() {
            Some((MockResponse::Ok(_), data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some((MockResponse::Err(msg), _)) => Err(Error::TransferFailed(msg)),
            None => Ok(buf.len()),
        }
    }

    fn quick_probe(&mut self, request: u8, buf: &mut [u8]) -> Result<usize> {
        self.calls.push(format!("quick_probe(req={request:#04x})"));
        match self.control_in_responses.pop_front() {
            Some((MockResponse::Ok(_), data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some((MockResponse::Err(msg), _)) => Err(Error::TransferFailed(msg)),
            None => Ok(0),
        }
    }

    fn claim_interface(&mut self) -> Result<()> {
        self.calls.push("claim_interface".into());
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.calls.push("reset".into());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.calls.push("close".into());
        Ok(())
    }

    fn reopen_same_vid_pid(&mut self) -> Result<(u8, u8)> {
        self.calls.push("reopen_same_vid_pid".into());
        self.address += 1;
        Ok((self.bus, self.address))
    }

    fn dump_active_config(&self) -> Result<String> {
        Ok(String::new())
    }

    fn bus_address(&self) -> (u8, u8) {
        (self.bus, self.address)
    }
}
