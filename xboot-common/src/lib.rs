// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Vendor USB protocol engine, bootstrap pipeline, and flash read/write
//! engines for Ingenic XBurst-family devices (T20 through T41N, the A1
//! audio SoC, and the X1000/X2000-series). This crate talks to the
//! device; `xboot-cli` wraps it in a command-line front end.

pub mod banks;
pub mod bootstrap;
pub mod bundle;
pub mod crc32;
pub mod ddr;
pub mod descriptors;
pub mod enumerate;
pub mod error;
pub mod handshake;
pub mod read;
pub mod usb;
pub mod variant;
pub mod write;

pub use bootstrap::{run_bootstrap, BootstrapOptions};
pub use bundle::{EmptyBundleSource, FileBundleSource, FirmwareBundleSource};
pub use enumerate::{classify, scan_devices, ClassifiedDevice, DeviceInfo, KNOWN_VID_PIDS};
pub use error::{Error, Result};
pub use read::read_flash;
pub use usb::{RusbTransport, Transport};
pub use variant::{Stage, Variant};
pub use write::write_flash;
