// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Byte-exact DDR configuration blob builder (§4.E).
//!
//! Layout (324 bytes total):
//!   FIDB section (192 bytes): magic "FIDB" + u32-LE length 184, then a
//!     184-byte body of clocking/memory-map fields.
//!   RDD section (132 bytes): magic 0x00 'R' 'D' 'D' + u32-LE length 124,
//!     then a 124-byte body of chip timing fields, CRC-32'd over its own
//!     last 120 bytes.
//!
//! The RDD body starts at absolute blob offset 200 (8-byte RDD header,
//! not 4). See `DESIGN.md` for why this implementation departs from the
//! blob-offset numbers given in one place in the source material.

use crate::crc32::crc32;
use crate::error::{Error, Result};

use super::database::{DdrChipConfig, PlatformConfig};

pub const BLOB_LEN: usize = 324;

const FIDB_MAGIC: &[u8; 4] = b"FIDB";
const FIDB_BODY_LEN: u32 = 184;
const RDD_MAGIC: &[u8; 4] = &[0x00, b'R', b'D', b'D'];
const RDD_BODY_LEN: u32 = 124;

const FIDB_HEADER_LEN: usize = 8;
const RDD_HEADER_LEN: usize = 8;
const FIDB_SECTION_LEN: usize = FIDB_HEADER_LEN + FIDB_BODY_LEN as usize;

const DQ_MAP: [u8; 20] = [
    12, 13, 14, 3, 4, 5, 6, 7, 8, 9, 10, 11, 0, 1, 2, 15, 16, 17, 18, 19,
];

/// Picoseconds-to-cycles, rounded up. Both operands fit comfortably in
/// u64 headroom but the multiply is done in u128 to rule out overflow
/// for pathological inputs.
pub fn ps_to_cycles(ps: u32, freq_hz: u32) -> u32 {
    let num = ps as u128 * freq_hz as u128;
    let den = 1_000_000_000_000u128;
    (((num + den - 1) / den) as u64) as u32
}

/// The chip timing parameters after conversion from picoseconds to
/// cycles at a given DDR clock (§3 "derived" data, kept separate from
/// the datasheet-unit [`DdrChipConfig`] so callers can inspect either).
#[derive(Debug, Clone, Copy)]
pub struct DdrPhyParams {
    pub ddr_type_code: u32,
    pub row_bits: u8,
    pub col_bits: u8,
    pub cl: u8,
    pub bl: u8,
    pub t_ras: u8,
    pub t_rc: u8,
    pub t_rcd: u8,
    pub t_rp: u8,
    pub t_rfc: u8,
    pub t_rtp: u8,
    pub t_faw: u8,
    pub t_rrd: u8,
    pub t_wtr: u8,
}

fn clamp_cycles(cycles: u32) -> u8 {
    cycles.min(u8::MAX as u32) as u8
}

pub fn derive_phy_params(chip: &DdrChipConfig, ddr_freq_hz: u32) -> DdrPhyParams {
    let cyc = |ps: u32| clamp_cycles(ps_to_cycles(ps, ddr_freq_hz));
    DdrPhyParams {
        ddr_type_code: chip.ddr_type.as_u32(),
        row_bits: chip.row_bits,
        col_bits: chip.col_bits,
        cl: chip.cl,
        bl: chip.bl,
        t_ras: cyc(chip.t_ras_ps),
        t_rc: cyc(chip.t_rc_ps),
        t_rcd: cyc(chip.t_rcd_ps),
        t_rp: cyc(chip.t_rp_ps),
        t_rfc: cyc(chip.t_rfc_ps),
        t_rtp: cyc(chip.t_rtp_ps),
        t_faw: cyc(chip.t_faw_ps),
        t_rrd: cyc(chip.t_rrd_ps),
        t_wtr: cyc(chip.t_wtr_ps),
    }
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Builds the 324-byte FIDB+RDD blob for a given platform/chip pairing.
/// `platform` and `chip` are normally looked up via
/// [`super::database::lookup_platform`] / [`super::database::lookup_chip`],
/// but overrides (e.g. `--force-variant`, a custom DDR freq) are accepted
/// as plain values so the CLI layer can substitute them freely.
pub fn build_ddr_binary(platform: &PlatformConfig, chip: &DdrChipConfig) -> Result<Vec<u8>> {
    if platform.ddr_freq == 0 {
        return Err(Error::InvalidParameter("ddr_freq must be nonzero".into()));
    }

    let mut blob = vec![0u8; BLOB_LEN];

    // --- FIDB section ---
    blob[0..4].copy_from_slice(FIDB_MAGIC);
    put_u32(&mut blob, 4, FIDB_BODY_LEN);
    let body = FIDB_HEADER_LEN;
    put_u32(&mut blob, body + 0x00, platform.crystal_freq);
    put_u32(&mut blob, body + 0x04, platform.cpu_freq);
    put_u32(&mut blob, body + 0x08, platform.ddr_freq);
    put_u32(&mut blob, body + 0x0C, 0);
    put_u32(&mut blob, body + 0x10, 1); // enable
    put_u32(&mut blob, body + 0x14, platform.uart_baud);
    put_u32(&mut blob, body + 0x18, 1); // flag
    put_u32(&mut blob, body + 0x20, platform.mem_size);
    put_u32(&mut blob, body + 0x24, 1); // flag
    put_u32(&mut blob, body + 0x2C, 0x11); // flag
    put_u32(&mut blob, body + 0x30, 0x1980_0000); // platform id

    // --- RDD section ---
    let rdd_off = FIDB_SECTION_LEN;
    blob[rdd_off..rdd_off + 4].copy_from_slice(RDD_MAGIC);
    put_u32(&mut blob, rdd_off + 4, RDD_BODY_LEN);
    let rbody = rdd_off + RDD_HEADER_LEN;

    let phy = derive_phy_params(chip, platform.ddr_freq);
    let freq_val = platform.ddr_freq / 100_000;

    put_u32(&mut blob, rbody + 0x04, phy.ddr_type_code);
    put_u32(&mut blob, rbody + 0x10, freq_val);
    put_u32(&mut blob, rbody + 0x14, 0x0000_2800);
    blob[rbody + 0x18] = 0x01;
    blob[rbody + 0x19] = 0x00;
    blob[rbody + 0x1A] = 0xC2;
    blob[rbody + 0x1B] = 0x00;
    blob[rbody + 0x1C] = phy.cl;
    blob[rbody + 0x1D] = phy.bl;
    blob[rbody + 0x1E] = phy.row_bits;
    blob[rbody + 0x1F] = phy.col_bits - 6;
    blob[rbody + 0x20] = phy.t_ras;
    blob[rbody + 0x21] = phy.t_rc;
    blob[rbody + 0x22] = phy.t_rcd;
    blob[rbody + 0x23] = phy.t_rp;
    blob[rbody + 0x24] = phy.t_rfc;
    blob[rbody + 0x25] = 0x04;
    blob[rbody + 0x26] = phy.t_rtp;
    blob[rbody + 0x27] = 0x20;
    blob[rbody + 0x28] = phy.t_faw;
    blob[rbody + 0x29] = 0x00;
    blob[rbody + 0x2A] = phy.t_rrd;
    blob[rbody + 0x2B] = phy.t_wtr;
    blob[rbody + 0x68..rbody + 0x7C].copy_from_slice(&DQ_MAP);

    let crc_region = &blob[rbody + 4..rbody + RDD_BODY_LEN as usize];
    let crc = crc32(crc_region);
    put_u32(&mut blob, rbody, crc);

    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddr::database::{lookup_chip, lookup_platform};

    fn t31x() -> (&'static PlatformConfig, &'static DdrChipConfig) {
        let platform = lookup_platform("T31X").unwrap();
        let chip = lookup_chip("M14D1G1664A").unwrap();
        (platform, chip)
    }

    #[test]
    fn blob_has_exact_length_and_magics() {
        let (p, c) = t31x();
        let blob = build_ddr_binary(p, c).unwrap();
        assert_eq!(blob.len(), BLOB_LEN);
        assert_eq!(&blob[0..4], b"FIDB");
        assert_eq!(&blob[0..4], FIDB_MAGIC);
        assert_eq!(&blob[4..8], &184u32.to_le_bytes());
        assert_eq!(&blob[192..196], RDD_MAGIC);
        assert_eq!(&blob[196..200], &124u32.to_le_bytes());
    }

    #[test]
    fn fidb_body_carries_named_clock_values() {
        let (p, c) = t31x();
        let blob = build_ddr_binary(p, c).unwrap();
        assert_eq!(&blob[8..12], &24_000_000u32.to_le_bytes());
        assert_eq!(&blob[12..16], &576_000_000u32.to_le_bytes());
        assert_eq!(&blob[16..20], &400_000_000u32.to_le_bytes());
    }

    #[test]
    fn rdd_crc_is_self_consistent() {
        let (p, c) = t31x();
        let blob = build_ddr_binary(p, c).unwrap();
        let rbody = 200;
        let stored = u32::from_le_bytes(blob[rbody..rbody + 4].try_into().unwrap());
        let recomputed = crc32(&blob[rbody + 4..rbody + 124]);
        assert_eq!(stored, recomputed);
    }

    #[test]
    fn rdd_chip_fields_match_t31x_scenario() {
        let (p, c) = t31x();
        let blob = build_ddr_binary(p, c).unwrap();
        let rbody = 200;
        assert_eq!(blob[rbody + 0x1C], 7); // CL
        assert_eq!(blob[rbody + 0x1D], 8); // BL
        assert_eq!(blob[rbody + 0x1E], 13); // row_bits
        assert_eq!(blob[rbody + 0x1F], 4); // col_bits - 6
    }

    #[test]
    fn dq_map_is_fixed_and_verbatim() {
        let (p, c) = t31x();
        let blob = build_ddr_binary(p, c).unwrap();
        let rbody = 200;
        assert_eq!(&blob[rbody + 0x68..rbody + 0x7C], &DQ_MAP);
    }

    #[test]
    fn rejects_zero_ddr_freq() {
        let (p, c) = t31x();
        let mut bad = *p;
        bad.ddr_freq = 0;
        assert!(build_ddr_binary(&bad, c).is_err());
    }

    #[test]
    fn ps_to_cycles_rounds_up() {
        // 7500 ps at 400 MHz = 3.0 cycles exactly.
        assert_eq!(ps_to_cycles(7_500, 400_000_000), 3);
        // 7501 ps at 400 MHz must round up to 4, not truncate to 3.
        assert_eq!(ps_to_cycles(7_501, 400_000_000), 4);
    }

    #[test]
    fn every_platform_chip_pair_builds_a_valid_blob() {
        for p in super::super::database::PLATFORMS {
            let c = super::super::database::default_chip_for(p);
            let blob = build_ddr_binary(p, c).unwrap();
            assert_eq!(blob.len(), BLOB_LEN);
            let rbody = 200;
            let stored = u32::from_le_bytes(blob[rbody..rbody + 4].try_into().unwrap());
            assert_eq!(stored, crc32(&blob[rbody + 4..rbody + 124]));
        }
    }
}
