// Licensed under the Apache-2.0 license

use crate::transport::TransportError;
use dfu_engine::DfuError;
use dfu_error::{code, ErrorCategory, ErrorCode};
use flash_storage::{FlashDrvError, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BootError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("update error: {0}")]
    Dfu(#[from] DfuError),
    #[error("flash operation failed: {0}")]
    Flash(FlashDrvError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("settings block allocated at {0:#x} instead of the settings address")]
    SettingsAddress(u32),
    #[error("settings record could not be decoded")]
    SettingsDecode,
    #[error("protocol stack could not be disabled")]
    StackDisable,
    #[error("no valid application to start")]
    NoValidApp,
}

impl ErrorCode for BootError {
    fn code(&self) -> u32 {
        match self {
            BootError::Storage(e) => e.code(),
            BootError::Dfu(e) => e.code(),
            BootError::Transport(TransportError::Timeout) => code::TIMEOUT,
            BootError::SettingsAddress(_) => code::INVALID_ADDR,
            BootError::SettingsDecode => code::INVALID_DATA,
            BootError::NoValidApp => code::INVALID_STATE,
            BootError::Flash(_) | BootError::Transport(_) | BootError::StackDisable => {
                code::INTERNAL
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            BootError::Storage(e) => e.category(),
            BootError::Dfu(e) => e.category(),
            BootError::SettingsAddress(_) => ErrorCategory::Capacity,
            BootError::SettingsDecode | BootError::NoValidApp => ErrorCategory::Integrity,
            BootError::Flash(_) | BootError::Transport(_) | BootError::StackDisable => {
                ErrorCategory::Hardware
            }
        }
    }
}
