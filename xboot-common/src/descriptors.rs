// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash descriptor and partition marker fixtures sent ahead of a
//! read/write session (§4.H). These are fixed-size buffers the device
//! expects to find before it will honor the handshake requests; most of
//! their bytes are zero padding reserved for fields the vendor protocol
//! never documented.

use crate::variant::Variant;

/// Read-mode (and ordinary write-mode) descriptor length, used by every
/// variant except T41N's write-preflight preamble.
pub const FLASH_DESCRIPTOR_LEN: usize = 972;
/// The T41N write preflight sends two of these wider descriptors instead.
pub const FLASH_DESCRIPTOR_LEN_T41N_PREAMBLE: usize = 984;

pub const PARTITION_MARKER_LEN: usize = 172;
const PARTITION_MARKER_MAGIC: &[u8; 4] = b"ILOP";

/// Offset of the NOR-flash selector string inside A1's flash descriptor.
const A1_NOR_SELECTOR_OFFSET: usize = 0xF0;
const A1_NOR_SELECTOR: &[u8] = b"nor";

/// Builds the standard 972-byte flash descriptor for a variant.
/// `total_size` and `block_size` are written at the head of the buffer;
/// A1 additionally gets the fixed "nor" selector at 0xF0.
pub fn build_flash_descriptor(variant: Variant, total_size: u32, block_size: u32) -> Vec<u8> {
    let mut buf = vec![0u8; FLASH_DESCRIPTOR_LEN];
    buf[0..4].copy_from_slice(&total_size.to_le_bytes());
    buf[4..8].copy_from_slice(&block_size.to_le_bytes());
    if variant == Variant::A1 {
        let end = A1_NOR_SELECTOR_OFFSET + A1_NOR_SELECTOR.len();
        buf[A1_NOR_SELECTOR_OFFSET..end].copy_from_slice(A1_NOR_SELECTOR);
    }
    buf
}

/// Builds one of the two 984-byte descriptors T41N's write preflight
/// sends ahead of the main firmware image. Most of the buffer is opaque
/// (reconstructed from a captured trace); only the size fields are known.
pub fn build_t41n_preamble_descriptor(total_size: u32, block_size: u32) -> Vec<u8> {
    let mut buf = vec![0u8; FLASH_DESCRIPTOR_LEN_T41N_PREAMBLE];
    buf[0..4].copy_from_slice(&total_size.to_le_bytes());
    buf[4..8].copy_from_slice(&block_size.to_le_bytes());
    buf
}

/// Builds the 172-byte "ILOP" partition marker sent before a write
/// session so the device knows which partition table layout to expect.
pub fn build_partition_marker(partition_count: u32) -> [u8; PARTITION_MARKER_LEN] {
    let mut buf = [0u8; PARTITION_MARKER_LEN];
    buf[0..4].copy_from_slice(PARTITION_MARKER_MAGIC);
    buf[4..8].copy_from_slice(&partition_count.to_le_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_descriptor_is_972_bytes_for_every_variant() {
        let buf = build_flash_descriptor(Variant::T31X, 16 * 1024 * 1024, 64 * 1024);
        assert_eq!(buf.len(), FLASH_DESCRIPTOR_LEN);
        assert_eq!(&buf[0..4], &(16u32 * 1024 * 1024).to_le_bytes());

        let a1_buf = build_flash_descriptor(Variant::A1, 32 * 1024 * 1024, 64 * 1024);
        assert_eq!(a1_buf.len(), FLASH_DESCRIPTOR_LEN);
    }

    #[test]
    fn a1_descriptor_carries_nor_selector() {
        let buf = build_flash_descriptor(Variant::A1, 32 * 1024 * 1024, 64 * 1024);
        assert_eq!(
            &buf[A1_NOR_SELECTOR_OFFSET..A1_NOR_SELECTOR_OFFSET + 3],
            b"nor"
        );
    }

    #[test]
    fn non_a1_descriptor_has_no_nor_selector() {
        let buf = build_flash_descriptor(Variant::T41N, 1024, 64 * 1024);
        assert_eq!(&buf[A1_NOR_SELECTOR_OFFSET..A1_NOR_SELECTOR_OFFSET + 3], &[0, 0, 0]);
    }

    #[test]
    fn t41n_preamble_descriptor_is_984_bytes() {
        let buf = build_t41n_preamble_descriptor(1024, 64 * 1024);
        assert_eq!(buf.len(), FLASH_DESCRIPTOR_LEN_T41N_PREAMBLE);
    }

    #[test]
    fn partition_marker_has_ilop_magic_and_length() {
        let buf = build_partition_marker(4);
        assert_eq!(buf.len(), PARTITION_MARKER_LEN);
        assert_eq!(&buf[0..4], b"ILOP");
        assert_eq!(&buf[4..8], &4u32.to_le_bytes());
    }
}
