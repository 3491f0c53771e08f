// Licensed under the Apache-2.0 license

//! Error taxonomy shared by the storage, update and boot layers.
//!
//! Every layer keeps its own error enum. They all map onto a stable numeric
//! code and one of the categories below so that callers (and the transport
//! peer) can decide how to react without matching on every variant.

#![cfg_attr(target_arch = "riscv32", no_std)]

/// Broad class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Misaligned pointer, zero or oversized length, offset past the end.
    Parameter = 1,
    /// Operation not permitted in the current state.
    State = 2,
    /// Registration table full, image too large, queue exhausted.
    Capacity = 3,
    /// Checksum mismatch.
    Integrity = 4,
    /// Flash write/erase failure or other peripheral fault.
    Hardware = 5,
}

/// Numeric codes reported to the transport peer.
///
/// Values follow the radio stack's error numbering so a peer can decode them
/// without a translation table.
pub mod code {
    /// Reported for a request that was accepted.
    pub const SUCCESS: u32 = 0;
    pub const INTERNAL: u32 = 3;
    pub const NO_MEM: u32 = 4;
    pub const NOT_SUPPORTED: u32 = 6;
    pub const INVALID_PARAM: u32 = 7;
    pub const INVALID_STATE: u32 = 8;
    pub const INVALID_LENGTH: u32 = 9;
    pub const INVALID_DATA: u32 = 11;
    pub const DATA_SIZE: u32 = 12;
    pub const TIMEOUT: u32 = 13;
    pub const INVALID_ADDR: u32 = 16;
    pub const BUSY: u32 = 17;
}

pub trait ErrorCode {
    /// Stable numeric code for this error.
    fn code(&self) -> u32;

    fn category(&self) -> ErrorCategory;

    /// Whether repeating the same call later may succeed.
    ///
    /// Only state errors qualify: the caller can fix its sequencing and
    /// try again. Everything else needs different input or a reset.
    fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::State
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample(ErrorCategory);

    impl ErrorCode for Sample {
        fn code(&self) -> u32 {
            code::INTERNAL
        }

        fn category(&self) -> ErrorCategory {
            self.0
        }
    }

    #[test]
    fn test_only_state_errors_are_retryable() {
        assert!(Sample(ErrorCategory::State).is_retryable());
        assert!(!Sample(ErrorCategory::Parameter).is_retryable());
        assert!(!Sample(ErrorCategory::Capacity).is_retryable());
        assert!(!Sample(ErrorCategory::Integrity).is_retryable());
        assert!(!Sample(ErrorCategory::Hardware).is_retryable());
    }
}
