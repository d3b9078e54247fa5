// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Cross-module check that the write engine's preflight follows §4.G's
//! documented order: marker, then descriptor, then a settle, then the
//! handshake — and that T41N substitutes its two-preamble sequence.

use xboot_common::usb::transport::MockTransport;
use xboot_common::{write_flash, Variant};

fn ok_status2() -> Vec<u8> {
    vec![0, 0, 0, 0, 0, 0, 0, 0]
}

#[test]
fn t31_family_preflight_sends_marker_then_descriptor_then_handshake() {
    let mut mock = MockTransport::new();
    mock.push_control_in_ok(ok_status2());
    mock.push_control_in_ok(ok_status2());
    mock.push_control_in_ok(ok_status2());
    mock.push_control_in_ok(ok_status2());

    write_flash(&mut mock, Variant::T31, &[0u8; 256], 0, 1, true, 0x02, 0x81, None).unwrap();

    let marker_idx = mock.calls.iter().position(|c| c.starts_with("bulk_out(ep=0x02, len=172")).unwrap();
    let descriptor_idx = mock.calls.iter().position(|c| c.starts_with("bulk_out(ep=0x02, len=972")).unwrap();
    let handshake_idx = mock.calls.iter().position(|c| c.starts_with("control_out(req=0x11")).unwrap();

    assert!(marker_idx < descriptor_idx);
    assert!(descriptor_idx < handshake_idx);
}

#[test]
fn t41n_preflight_interleaves_preamble_marker_descriptor_and_status_reads() {
    let mut mock = MockTransport::new();
    mock.push_control_in_ok(ok_status2());
    mock.push_control_in_ok(ok_status2());
    mock.push_control_in_ok(ok_status2());
    mock.push_control_in_ok(ok_status2());

    write_flash(&mut mock, Variant::T41N, &[0u8; 256], 0, 1, true, 0x02, 0x81, None).unwrap();

    let preamble_count = mock.calls.iter().filter(|c| c.starts_with("control_out(req=0x14")).count();
    let descriptor_984_count = mock.calls.iter().filter(|c| c.starts_with("bulk_out(ep=0x02, len=984")).count();
    assert_eq!(preamble_count, 2);
    assert_eq!(descriptor_984_count, 2);
}
