// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USB transport (§4.A) and named vendor protocol requests (§4.B).

pub mod protocol;
pub mod transport;

pub use protocol::*;
pub use transport::{RusbTransport, Transport};
