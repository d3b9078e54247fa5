// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CRC-32 (ITU-V.42 / zlib / Ethernet polynomial), used both by the DDR
//! binary builder (§4.E) and the firmware write handshake (§4.G, inverted
//! form).

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Plain CRC-32, used for the RDD body field and the host-side firmware
/// CRC reported to the device during bootstrap bundle validation.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Bitwise-NOT of the CRC-32, the form the T31/T41/A1 write handshakes
/// embed (§4.G).
pub fn crc32_inverted(data: &[u8]) -> u32 {
    !crc32(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_of_empty_is_zero() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn crc32_inverted_of_zeros_64k() {
        let data = vec![0u8; 65536];
        // Matches the T41N seed scenario in §8: inverted CRC of all-zero
        // 64 KiB is 0xFFFFFFFF (plain CRC-32 of all zeros is 0).
        assert_eq!(crc32(&data), 0);
        assert_eq!(crc32_inverted(&data), 0xFFFF_FFFF);
    }

    #[test]
    fn crc32_inverted_is_bitwise_not_of_plain() {
        let data = b"hello world";
        assert_eq!(crc32_inverted(data), !crc32(data));
    }
}
