// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Seed scenario #6: a forced variant survives the post-SPL
//! close/rescan/reopen cycle untouched.

use xboot_common::bootstrap::{run_bootstrap, BootstrapOptions};
use xboot_common::usb::transport::MockTransport;
use xboot_common::{EmptyBundleSource, Variant};

#[test]
fn forced_variant_survives_reenumeration() {
    let mut mock = MockTransport::new();
    let bundle = EmptyBundleSource::new(vec![0xAA; 16], vec![0xBB; 16]);
    // T31X re-enumerates post-SPL; force T41's handling via the override
    // and confirm the pipeline still completes using that forced variant
    // (T41/T41N skip FLUSH_CACHE before PROG_STAGE2).
    let opts = BootstrapOptions {
        skip_ddr: true,
        force_variant: Some(Variant::T41),
        ..Default::default()
    };

    run_bootstrap(&mut mock, &bundle, Variant::T31X, &opts, 0x01).unwrap();

    assert!(!mock.calls.iter().any(|c| c.starts_with("control_out(req=0x03")));
    assert!(mock.calls.iter().any(|c| c.starts_with("control_out(req=0x06")));
    // The bus/address did re-enumerate once the options force T41's
    // in-place stabilization path... actually T41 stabilizes in place,
    // so no reopen call should appear.
    assert!(!mock.calls.iter().any(|c| c == "reopen_same_vid_pid"));
}

#[test]
fn unforced_t31x_reenumerates_and_keeps_polling_until_stable() {
    let mut mock = MockTransport::new();
    let bundle = EmptyBundleSource::new(vec![0xAA; 16], vec![0xBB; 16]);
    let opts = BootstrapOptions { skip_ddr: true, ..Default::default() };

    run_bootstrap(&mut mock, &bundle, Variant::T31X, &opts, 0x01).unwrap();

    assert!(mock.calls.iter().any(|c| c == "reopen_same_vid_pid"));
    assert!(mock.calls.iter().any(|c| c.starts_with("control_out(req=0x03")));
}
