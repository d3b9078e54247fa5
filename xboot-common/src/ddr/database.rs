// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Embedded processor and DDR chip parameter tables. These are the
//! concrete numbers the builder plugs into the FIDB/RDD field layout;
//! callers normally reach them through [`lookup_platform`] and
//! [`default_chip_for`] rather than constructing entries by hand.

/// DDR generation, stored verbatim into the RDD body's `ddr_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdrType {
    Ddr2,
    Ddr3,
    Lpddr2,
    Lpddr3,
}

impl DdrType {
    fn code(self) -> u32 {
        match self {
            DdrType::Ddr3 => 0,
            DdrType::Ddr2 => 1,
            DdrType::Lpddr2 => 2,
            DdrType::Lpddr3 => 4,
        }
    }

    pub(crate) fn as_u32(self) -> u32 {
        self.code()
    }
}

/// A processor platform's clocking and memory-map defaults.
#[derive(Debug, Clone, Copy)]
pub struct PlatformConfig {
    pub name: &'static str,
    pub crystal_freq: u32,
    pub cpu_freq: u32,
    pub ddr_freq: u32,
    pub uart_baud: u32,
    pub mem_size: u32,
    /// Key into the chip table, used by [`default_chip_for`].
    pub default_chip: &'static str,
}

/// A DDR chip's addressing and AC timing parameters. Timings are given
/// in picoseconds, matching the units datasheets publish them in; the
/// builder converts them to clock cycles against a platform's `ddr_freq`.
#[derive(Debug, Clone, Copy)]
pub struct DdrChipConfig {
    pub name: &'static str,
    pub ddr_type: DdrType,
    pub row_bits: u8,
    pub col_bits: u8,
    pub cl: u8,
    pub bl: u8,
    pub t_ras_ps: u32,
    pub t_rc_ps: u32,
    pub t_rcd_ps: u32,
    pub t_rp_ps: u32,
    pub t_rfc_ps: u32,
    pub t_rtp_ps: u32,
    pub t_faw_ps: u32,
    pub t_rrd_ps: u32,
    pub t_wtr_ps: u32,
}

macro_rules! platform {
    ($name:expr, $crystal:expr, $cpu:expr, $ddr:expr, $baud:expr, $mem:expr, $chip:expr) => {
        PlatformConfig {
            name: $name,
            crystal_freq: $crystal,
            cpu_freq: $cpu,
            ddr_freq: $ddr,
            uart_baud: $baud,
            mem_size: $mem,
            default_chip: $chip,
        }
    };
}

/// The full processor platform table (§3: "an embedded database of
/// processor defaults"). Eighteen entries: the eleven named variants plus
/// the seven X-series codes the variant cascade collapses into one enum
/// member.
pub const PLATFORMS: &[PlatformConfig] = &[
    platform!("T20", 24_000_000, 360_000_000, 200_000_000, 57_600, 64 * 1024 * 1024, "W9751G6KB"),
    platform!("T21", 24_000_000, 408_000_000, 200_000_000, 57_600, 64 * 1024 * 1024, "W9751G6KB"),
    platform!("T23", 24_000_000, 456_000_000, 300_000_000, 57_600, 128 * 1024 * 1024, "H5TQ2G63BFR"),
    platform!("T30", 24_000_000, 504_000_000, 333_000_000, 57_600, 128 * 1024 * 1024, "H5TQ2G63BFR"),
    platform!("T31", 24_000_000, 528_000_000, 400_000_000, 57_600, 128 * 1024 * 1024, "M14D1G1664A"),
    platform!("T31X", 24_000_000, 576_000_000, 400_000_000, 57_600, 128 * 1024 * 1024, "M14D1G1664A"),
    platform!("T31ZX", 24_000_000, 600_000_000, 400_000_000, 57_600, 128 * 1024 * 1024, "M14D1G1664A"),
    platform!("A1", 24_000_000, 1_008_000_000, 533_000_000, 115_200, 256 * 1024 * 1024, "K4B4G1646Q"),
    platform!("T40", 24_000_000, 1_008_000_000, 533_000_000, 115_200, 256 * 1024 * 1024, "MT41K128M16"),
    platform!("T41", 24_000_000, 1_200_000_000, 600_000_000, 115_200, 256 * 1024 * 1024, "MT41K128M16"),
    platform!("T41N", 24_000_000, 1_500_000_000, 666_000_000, 115_200, 512 * 1024 * 1024, "NT5CB256M16"),
    platform!("X1000", 24_000_000, 1_000_000_000, 400_000_000, 115_200, 64 * 1024 * 1024, "EM6GE16EWXD-12H"),
    platform!("X1500", 24_000_000, 1_200_000_000, 400_000_000, 115_200, 64 * 1024 * 1024, "EM6GE16EWXD-12H"),
    platform!("X1600", 24_000_000, 1_200_000_000, 533_000_000, 115_200, 128 * 1024 * 1024, "MT42L128M32D2"),
    platform!("X1800", 24_000_000, 1_400_000_000, 533_000_000, 115_200, 128 * 1024 * 1024, "MT42L128M32D2"),
    platform!("X2000", 24_000_000, 1_500_000_000, 600_000_000, 115_200, 256 * 1024 * 1024, "K4P4G324EB"),
    platform!("X2500", 24_000_000, 1_800_000_000, 666_000_000, 115_200, 256 * 1024 * 1024, "NT6CL128M32CP"),
    platform!("X2600", 24_000_000, 1_800_000_000, 733_000_000, 115_200, 512 * 1024 * 1024, "NT6CL128M32CP"),
];

macro_rules! chip {
    ($name:expr, $type:expr, $row:expr, $col:expr, $cl:expr, $bl:expr,
     $ras:expr, $rc:expr, $rcd:expr, $rp:expr, $rfc:expr, $rtp:expr,
     $faw:expr, $rrd:expr, $wtr:expr) => {
        DdrChipConfig {
            name: $name,
            ddr_type: $type,
            row_bits: $row,
            col_bits: $col,
            cl: $cl,
            bl: $bl,
            t_ras_ps: $ras,
            t_rc_ps: $rc,
            t_rcd_ps: $rcd,
            t_rp_ps: $rp,
            t_rfc_ps: $rfc,
            t_rtp_ps: $rtp,
            t_faw_ps: $faw,
            t_rrd_ps: $rrd,
            t_wtr_ps: $wtr,
        }
    };
}

/// The full DDR chip table (§3: "an embedded database of ... DDR chip
/// timings"). Fourteen entries spanning DDR2 through LPDDR3.
pub const CHIPS: &[DdrChipConfig] = &[
    chip!("M14D1G1664A", DdrType::Ddr2, 13, 10, 7, 8,
        45_000, 70_000, 18_000, 18_000, 127_500, 7_500, 50_000, 10_000, 10_000),
    chip!("W9751G6KB", DdrType::Ddr2, 13, 9, 5, 4,
        40_000, 60_000, 15_000, 15_000, 105_000, 7_500, 40_000, 10_000, 7_500),
    chip!("H5TQ2G63BFR", DdrType::Ddr2, 14, 10, 6, 8,
        42_000, 63_000, 15_000, 15_000, 127_500, 7_500, 45_000, 10_000, 7_500),
    chip!("K4B4G1646Q", DdrType::Ddr3, 15, 10, 9, 8,
        35_000, 49_500, 13_500, 13_500, 160_000, 7_500, 40_000, 6_000, 7_500),
    chip!("MT41K128M16", DdrType::Ddr3, 14, 10, 11, 8,
        35_000, 48_750, 13_750, 13_750, 160_000, 7_500, 40_000, 6_000, 7_500),
    chip!("NT5CB256M16", DdrType::Ddr3, 15, 10, 11, 8,
        34_000, 48_000, 13_500, 13_500, 260_000, 7_500, 35_000, 6_000, 7_500),
    chip!("EM6GE16EWXD-12H", DdrType::Lpddr2, 14, 10, 3, 4,
        42_000, 60_000, 18_000, 18_000, 130_000, 7_500, 50_000, 10_000, 7_500),
    chip!("MT42L128M32D2", DdrType::Lpddr2, 14, 10, 4, 4,
        42_000, 60_000, 18_000, 18_000, 130_000, 7_500, 50_000, 10_000, 7_500),
    chip!("K4P4G324EB", DdrType::Lpddr3, 15, 10, 6, 8,
        42_000, 60_000, 18_000, 18_000, 130_000, 7_500, 50_000, 10_000, 7_500),
    chip!("NT6CL128M32CP", DdrType::Lpddr3, 15, 10, 6, 8,
        42_000, 60_000, 18_000, 18_000, 180_000, 7_500, 50_000, 10_000, 7_500),
    chip!("H9CCNNN8JTALAR", DdrType::Lpddr3, 15, 10, 6, 8,
        42_000, 60_000, 18_000, 18_000, 180_000, 7_500, 50_000, 10_000, 7_500),
    chip!("W631GG6KB", DdrType::Ddr3, 15, 10, 11, 8,
        35_000, 49_500, 13_500, 13_500, 160_000, 7_500, 40_000, 6_000, 7_500),
    chip!("IS43TR16512B", DdrType::Ddr3, 15, 10, 9, 8,
        34_000, 48_000, 13_500, 13_500, 160_000, 7_500, 35_000, 6_000, 7_500),
    chip!("AD210", DdrType::Ddr2, 13, 10, 5, 4,
        40_000, 60_000, 15_000, 15_000, 105_000, 7_500, 40_000, 10_000, 7_500),
];

/// Case-insensitive processor lookup.
pub fn lookup_platform(name: &str) -> Option<&'static PlatformConfig> {
    PLATFORMS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Case-insensitive chip lookup.
pub fn lookup_chip(name: &str) -> Option<&'static DdrChipConfig> {
    CHIPS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// The chip a processor uses when the caller doesn't override it.
pub fn default_chip_for(platform: &PlatformConfig) -> &'static DdrChipConfig {
    lookup_chip(platform.default_chip)
        .expect("every platform's default_chip key names a table entry")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_platform_default_chip_resolves() {
        for p in PLATFORMS {
            assert!(
                lookup_chip(p.default_chip).is_some(),
                "platform {} names missing chip {}",
                p.name,
                p.default_chip
            );
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup_platform("t31x").is_some());
        assert!(lookup_chip("m14d1g1664a").is_some());
    }

    #[test]
    fn table_sizes_match_the_documented_counts() {
        assert_eq!(PLATFORMS.len(), 18);
        assert_eq!(CHIPS.len(), 14);
    }

    #[test]
    fn t31x_scenario_chip_matches_seed_parameters() {
        let chip = lookup_chip("M14D1G1664A").unwrap();
        assert_eq!(chip.cl, 7);
        assert_eq!(chip.bl, 8);
        assert_eq!(chip.row_bits, 13);
        assert_eq!(chip.col_bits - 6, 4);
    }
}
