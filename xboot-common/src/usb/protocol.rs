// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Named vendor control requests (§4.B). Each function is thin: validate,
//! format the request, invoke the transport. No higher-order sequencing
//! lives here — that belongs to the bootstrap/read/write engines, which
//! own the explicit settle delays the vendor trace requires at each step.

use std::time::Duration;

use crate::error::Result;
use crate::variant::Stage;

use super::transport::{requests, Transport};

/// A settle delay applied after the two named requests with no other
/// explicit wait documented anywhere in the trace (§4.B).
const POST_OP_SETTLE: Duration = Duration::from_millis(100);

fn split_addr(addr: u32) -> (u16, u16) {
    ((addr >> 16) as u16, (addr & 0xFFFF) as u16)
}

/// GET_CPU_INFO (0x08, IN): returns 8 or 16 bytes of CPU-magic data.
pub fn get_cpu_info<T: Transport>(t: &mut T, stage: Stage, buf: &mut [u8]) -> Result<usize> {
    t.control_in(stage, requests::GET_CPU_INFO, 0, 0, buf)
}

/// SET_DATA_ADDR (0x01, OUT).
pub fn set_data_addr<T: Transport>(t: &mut T, stage: Stage, addr: u32) -> Result<()> {
    let (value, index) = split_addr(addr);
    t.control_out(stage, requests::SET_DATA_ADDR, value, index, &[])?;
    Ok(())
}

/// SET_DATA_LEN (0x02, OUT).
pub fn set_data_len<T: Transport>(t: &mut T, stage: Stage, len: u32) -> Result<()> {
    let (value, index) = split_addr(len);
    t.control_out(stage, requests::SET_DATA_LEN, value, index, &[])?;
    Ok(())
}

/// FLUSH_CACHE (0x03, OUT).
pub fn flush_cache<T: Transport>(t: &mut T, stage: Stage) -> Result<()> {
    t.control_out(stage, requests::FLUSH_CACHE, 0, 0, &[])?;
    std::thread::sleep(POST_OP_SETTLE);
    Ok(())
}

/// PROG_STAGE1 (0x04, OUT).
pub fn prog_stage1<T: Transport>(t: &mut T, stage: Stage, addr: u32) -> Result<()> {
    let (value, index) = split_addr(addr);
    t.control_out(stage, requests::PROG_STAGE1, value, index, &[])?;
    Ok(())
}

/// PROG_STAGE2 (0x06, OUT).
pub fn prog_stage2<T: Transport>(t: &mut T, stage: Stage, addr: u32) -> Result<()> {
    let (value, index) = split_addr(addr);
    t.control_out(stage, requests::PROG_STAGE2, value, index, &[])?;
    Ok(())
}

/// NAND_OPS (0x07, OUT).
pub fn nand_ops<T: Transport>(t: &mut T, stage: Stage, op: u8) -> Result<()> {
    t.control_out(stage, requests::NAND_OPS, op as u16, 0, &[])?;
    std::thread::sleep(POST_OP_SETTLE);
    Ok(())
}

/// FW_READ (0x10, IN): 4-byte status ack.
pub fn fw_read<T: Transport>(t: &mut T, stage: Stage) -> Result<[u8; 4]> {
    let mut buf = [0u8; 4];
    t.control_in(stage, requests::FW_READ, 0, 0, &mut buf)?;
    Ok(buf)
}

/// FW_HANDSHAKE (0x11, OUT).
pub fn fw_handshake<T: Transport>(t: &mut T, stage: Stage) -> Result<()> {
    t.control_out(stage, requests::FW_HANDSHAKE, 0, 0, &[])?;
    Ok(())
}

/// VR_WRITE (0x12, OUT): 40-byte write handshake.
pub fn vr_write<T: Transport>(t: &mut T, stage: Stage, data: &[u8; 40]) -> Result<()> {
    t.control_out(stage, requests::VR_WRITE, 0, 0, data)?;
    Ok(())
}

/// FW_WRITE1 (0x13, OUT): 40-byte read-side handshake command.
pub fn fw_write1<T: Transport>(t: &mut T, stage: Stage, data: &[u8; 40]) -> Result<()> {
    t.control_out(stage, requests::FW_WRITE1, 0, 0, data)?;
    Ok(())
}

/// FW_WRITE2 (0x14, OUT): 40-byte T41N preamble command.
pub fn fw_write2<T: Transport>(t: &mut T, stage: Stage, data: &[u8; 40]) -> Result<()> {
    t.control_out(stage, requests::FW_WRITE2, 0, 0, data)?;
    Ok(())
}

/// FW_READ_STATUS2 (0x19, IN): 8-byte handshake-style status record.
pub fn fw_read_status2<T: Transport>(t: &mut T, stage: Stage) -> Result<[u8; 8]> {
    let mut buf = [0u8; 8];
    t.control_in(stage, requests::FW_READ_STATUS2, 0, 0, &mut buf)?;
    Ok(buf)
}

/// FW_READ_STATUS4 (0x26, IN): 4-byte status word.
pub fn fw_read_status4<T: Transport>(t: &mut T, stage: Stage) -> Result<[u8; 4]> {
    let mut buf = [0u8; 4];
    t.control_in(stage, requests::FW_READ_STATUS4, 0, 0, &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::transport::MockTransport;

    #[test]
    fn set_data_addr_splits_value_index() {
        let mut mock = MockTransport::new();
        set_data_addr(&mut mock, Stage::Bootrom, 0x8000_1000).unwrap();
        assert_eq!(
            mock.calls[0],
            "control_out(req=0x01, value=0x8000, index=0x1000, len=0)"
        );
    }

    #[test]
    fn set_data_len_splits_value_index() {
        let mut mock = MockTransport::new();
        set_data_len(&mut mock, Stage::Bootrom, 0x0001_2345).unwrap();
        assert_eq!(
            mock.calls[0],
            "control_out(req=0x02, value=0x0001, index=0x2345, len=0)"
        );
    }

    #[test]
    fn prog_stage_requests_carry_no_data_phase() {
        let mut mock = MockTransport::new();
        prog_stage1(&mut mock, Stage::Bootrom, 0x8000_1800).unwrap();
        prog_stage2(&mut mock, Stage::Bootrom, 0x8010_0000).unwrap();
        assert_eq!(mock.calls[0], "control_out(req=0x04, value=0x8000, index=0x1800, len=0)");
        assert_eq!(mock.calls[1], "control_out(req=0x06, value=0x8010, index=0x0000, len=0)");
    }

    #[test]
    fn vr_write_carries_40_byte_data_phase() {
        let mut mock = MockTransport::new();
        vr_write(&mut mock, Stage::Firmware, &[0u8; 40]).unwrap();
        assert_eq!(mock.calls[0], "control_out(req=0x12, value=0x0000, index=0x0000, len=40)");
    }
}
