// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! DDR configuration binary builder (§4.E): a byte-exact 324-byte
//! "FIDB+RDD" blob generator plus the embedded processor/chip parameter
//! database it draws from.

pub mod builder;
pub mod database;

pub use builder::{build_ddr_binary, derive_phy_params, ps_to_cycles, DdrPhyParams, BLOB_LEN};
pub use database::{
    default_chip_for, lookup_chip, lookup_platform, DdrChipConfig, DdrType, PlatformConfig,
};
