// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error taxonomy shared by every component in this crate.

use thiserror::Error;

/// The single error type every `xboot-common` operation returns.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("failed to initialize USB context: {0}")]
    InitFailed(String),

    #[error("no matching device found")]
    DeviceNotFound,

    #[error("failed to open device: {0}")]
    OpenFailed(String),

    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("memory allocation failed")]
    Memory,

    #[error("file I/O error: {0}")]
    FileIo(String),
}

impl From<rusb::Error> for Error {
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::Timeout => Error::Timeout(e.to_string()),
            rusb::Error::NoDevice | rusb::Error::NotFound => Error::DeviceNotFound,
            rusb::Error::Access | rusb::Error::Busy => Error::OpenFailed(e.to_string()),
            other => Error::TransferFailed(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::FileIo(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
