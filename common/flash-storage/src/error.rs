// Licensed under the Apache-2.0 license

use crate::hil::FlashDrvError;
use dfu_error::{code, ErrorCategory, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage manager not initialized")]
    InvalidState,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("buffer is not word aligned")]
    InvalidAddr,
    #[error("invalid length")]
    InvalidLength,
    #[error("module table full")]
    NoMem,
    #[error("flash operation queue full")]
    Busy,
    #[error("flash driver error: {0}")]
    Driver(#[from] FlashDrvError),
}

impl ErrorCode for StorageError {
    fn code(&self) -> u32 {
        match self {
            StorageError::InvalidState => code::INVALID_STATE,
            StorageError::InvalidParam => code::INVALID_PARAM,
            StorageError::InvalidAddr => code::INVALID_ADDR,
            StorageError::InvalidLength => code::INVALID_LENGTH,
            StorageError::NoMem => code::NO_MEM,
            StorageError::Busy => code::BUSY,
            StorageError::Driver(_) => code::INTERNAL,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            StorageError::InvalidState | StorageError::Busy => ErrorCategory::State,
            StorageError::InvalidParam | StorageError::InvalidAddr | StorageError::InvalidLength => {
                ErrorCategory::Parameter
            }
            StorageError::NoMem => ErrorCategory::Capacity,
            StorageError::Driver(_) => ErrorCategory::Hardware,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_categories() {
        let cases = [
            (StorageError::InvalidState, code::INVALID_STATE, ErrorCategory::State),
            (StorageError::Busy, code::BUSY, ErrorCategory::State),
            (StorageError::InvalidParam, code::INVALID_PARAM, ErrorCategory::Parameter),
            (StorageError::InvalidAddr, code::INVALID_ADDR, ErrorCategory::Parameter),
            (StorageError::InvalidLength, code::INVALID_LENGTH, ErrorCategory::Parameter),
            (StorageError::NoMem, code::NO_MEM, ErrorCategory::Capacity),
            (
                StorageError::Driver(FlashDrvError::FAIL),
                code::INTERNAL,
                ErrorCategory::Hardware,
            ),
        ];
        for (err, expected_code, expected_category) in cases {
            assert_eq!(err.code(), expected_code, "{:?}", err);
            assert_eq!(err.category(), expected_category, "{:?}", err);
        }
    }

    #[test]
    fn test_full_queue_is_retryable() {
        assert!(StorageError::Busy.is_retryable());
        assert!(!StorageError::NoMem.is_retryable());
        assert!(!StorageError::Driver(FlashDrvError::BUSY).is_retryable());
    }
}
