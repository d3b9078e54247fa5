// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Device stage and variant classification (§4.C).
//!
//! The classification heuristic is a cascade of prefix/substring matches,
//! evaluated top-down as an ordered table rather than an `if` ladder at
//! every call site — see `detect_variant`.

use std::fmt;

/// Which side of the handoff the device is currently running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// The mask-ROM USB loader; cannot touch DRAM yet.
    Bootrom,
    /// A running vendor U-Boot/burner image serving the extended protocol.
    Firmware,
}

/// XBurst-family member. Distinct variants drive chunk sizes, handshake
/// trailers, preflight steps, and post-SPL stabilization mode (§9).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    T20,
    T21,
    T23,
    T30,
    T31,
    T31X,
    T31ZX,
    A1,
    T40,
    T41,
    T41N,
    XSeries,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Variant::T20 => "T20",
            Variant::T21 => "T21",
            Variant::T23 => "T23",
            Variant::T30 => "T30",
            Variant::T31 => "T31",
            Variant::T31X => "T31X",
            Variant::T31ZX => "T31ZX",
            Variant::A1 => "A1",
            Variant::T40 => "T40",
            Variant::T41 => "T41",
            Variant::T41N => "T41N",
            Variant::XSeries => "X-series",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Variant {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Ok(match upper.as_str() {
            "T20" => Variant::T20,
            "T21" => Variant::T21,
            "T23" => Variant::T23,
            "T30" => Variant::T30,
            "T31" => Variant::T31,
            "T31X" => Variant::T31X,
            "T31ZX" => Variant::T31ZX,
            "A1" => Variant::A1,
            "T40" => Variant::T40,
            "T41" => Variant::T41,
            "T41N" => Variant::T41N,
            "X-SERIES" | "XSERIES" | "X" => Variant::XSeries,
            other => {
                return Err(crate::error::Error::InvalidParameter(format!(
                    "unknown variant: {other}"
                )))
            }
        })
    }
}

/// Known X-series chip codes that classify a device as `Variant::XSeries`.
/// Spans the "x1000..x2600" range named in §4.C.
const X_SERIES_CODES: &[&str] = &["X1000", "X1500", "X1600", "X1800", "X2000", "X2500", "X2600"];

/// Classify stage from the raw 8-byte CPU-magic buffer.
///
/// `stage = Firmware` if the printable magic starts with `"Boot"`/`"BOOT"`,
/// or equals `"X2580"` (T41N/XBurst2), or starts with `"A1"` (A1 family).
/// Otherwise `Bootrom`.
pub fn detect_stage(magic: &str) -> Stage {
    let upper = magic.to_ascii_uppercase();
    if upper.starts_with("BOOT") || upper == "X2580" || upper.starts_with("A1") {
        Stage::Firmware
    } else {
        Stage::Bootrom
    }
}

/// Classify variant from the cleaned CPU-magic string. Case-insensitive.
///
/// Evaluated as an ordered cascade; the first matching rule wins:
/// 1. exact `"X2580"` → T41
/// 2. exact `"A1"` → A1
/// 3. substring one of the known X-series codes → X-series
/// 4. substring `"T31V"` → T31ZX
/// 5. prefix `"T31"` → T31
/// 6. substring one of `"T20","T21","T23","T30","T40","T41"` → that variant
/// 7. fallback → T31X
pub fn detect_variant(magic: &str) -> Variant {
    let upper = magic.to_ascii_uppercase();

    if upper == "X2580" {
        return Variant::T41;
    }
    if upper == "A1" {
        return Variant::A1;
    }
    if X_SERIES_CODES.iter().any(|code| upper.contains(code)) {
        return Variant::XSeries;
    }
    if upper.contains("T31V") {
        return Variant::T31ZX;
    }
    if upper.starts_with("T31") {
        return Variant::T31;
    }
    for (code, variant) in [
        ("T20", Variant::T20),
        ("T21", Variant::T21),
        ("T23", Variant::T23),
        ("T30", Variant::T30),
        ("T40", Variant::T40),
        ("T41", Variant::T41),
    ] {
        if upper.contains(code) {
            return variant;
        }
    }
    Variant::T31X
}

/// Strip non-printable-ASCII bytes and return the raw 8-byte magic string
/// alongside a cleaned (optionally space-stripped) classification string,
/// per the "printable-ASCII normalization" step in §4.C.
pub fn normalize_magic(raw: &[u8]) -> (String, String) {
    let printable: String = raw
        .iter()
        .map(|&b| if (0x20..=0x7e).contains(&b) { b as char } else { '\0' })
        .take_while(|&c| c != '\0')
        .collect();
    let cleaned: String = printable.chars().filter(|c| !c.is_whitespace()).collect();
    (printable, cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_firmware_boot_prefix() {
        assert_eq!(detect_stage("BootT31"), Stage::Firmware);
        assert_eq!(detect_stage("boott31"), Stage::Firmware);
    }

    #[test]
    fn stage_firmware_x2580_exact() {
        assert_eq!(detect_stage("X2580"), Stage::Firmware);
    }

    #[test]
    fn stage_firmware_a1_prefix() {
        assert_eq!(detect_stage("A1test"), Stage::Firmware);
    }

    #[test]
    fn stage_bootrom_otherwise() {
        assert_eq!(detect_stage("T31X"), Stage::Bootrom);
    }

    #[test]
    fn variant_precedence_x2580() {
        assert_eq!(detect_variant("X2580"), Variant::T41);
    }

    #[test]
    fn variant_precedence_a1() {
        assert_eq!(detect_variant("A1"), Variant::A1);
        assert_eq!(detect_variant("a1"), Variant::A1);
    }

    #[test]
    fn variant_x_series() {
        assert_eq!(detect_variant("X1000boot"), Variant::XSeries);
        assert_eq!(detect_variant("x2600"), Variant::XSeries);
    }

    #[test]
    fn variant_t31zx_over_t31() {
        assert_eq!(detect_variant("T31Vzx"), Variant::T31ZX);
    }

    #[test]
    fn variant_t31_prefix() {
        assert_eq!(detect_variant("T31foo"), Variant::T31);
    }

    #[test]
    fn variant_tnn_range() {
        assert_eq!(detect_variant("T20"), Variant::T20);
        assert_eq!(detect_variant("T21"), Variant::T21);
        assert_eq!(detect_variant("T23"), Variant::T23);
        assert_eq!(detect_variant("T30"), Variant::T30);
        assert_eq!(detect_variant("T40"), Variant::T40);
        assert_eq!(detect_variant("T41"), Variant::T41);
    }

    #[test]
    fn variant_fallback_t31x() {
        assert_eq!(detect_variant("unknownmagic"), Variant::T31X);
    }

    #[test]
    fn normalize_strips_nonprintable_and_trailing_garbage() {
        let raw = [b'B', b'o', b'o', b't', b'T', b'3', b'1', 0x00];
        let (raw_str, cleaned) = normalize_magic(&raw);
        assert_eq!(raw_str, "BootT31");
        assert_eq!(cleaned, "BootT31");
    }

    #[test]
    fn normalize_strips_spaces_for_cleaned() {
        let raw = b"T31 X  \0\0";
        let (_, cleaned) = normalize_magic(raw);
        assert_eq!(cleaned, "T31X");
    }

    #[test]
    fn variant_from_str_case_insensitive() {
        use std::str::FromStr;
        assert_eq!(Variant::from_str("t41n").unwrap(), Variant::T41N);
        assert!(Variant::from_str("bogus").is_err());
    }
}
