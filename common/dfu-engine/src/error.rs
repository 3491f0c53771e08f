// Licensed under the Apache-2.0 license

use dfu_error::{code, ErrorCategory, ErrorCode};
use flash_storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DfuError {
    #[error("operation not permitted in the current update state")]
    InvalidState,
    #[error("invalid packet length")]
    InvalidLength,
    #[error("image or packet exceeds the available space")]
    DataSize,
    #[error("image size is not a whole number of words")]
    NotSupported,
    #[error("image CRC does not match the init packet")]
    InvalidData,
    #[error("image writes still in progress")]
    Busy,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ErrorCode for DfuError {
    fn code(&self) -> u32 {
        match self {
            DfuError::InvalidState => code::INVALID_STATE,
            DfuError::InvalidLength => code::INVALID_LENGTH,
            DfuError::DataSize => code::DATA_SIZE,
            DfuError::NotSupported => code::NOT_SUPPORTED,
            DfuError::InvalidData => code::INVALID_DATA,
            DfuError::Busy => code::BUSY,
            DfuError::Storage(e) => e.code(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            DfuError::InvalidState | DfuError::Busy => ErrorCategory::State,
            DfuError::InvalidLength | DfuError::NotSupported => ErrorCategory::Parameter,
            DfuError::DataSize => ErrorCategory::Capacity,
            DfuError::InvalidData => ErrorCategory::Integrity,
            DfuError::Storage(e) => e.category(),
        }
    }
}
