// Licensed under the Apache-2.0 license

//! Generic interface for the flash controller.

use core::result::Result;

/// Word-granular flash controller. It is expected that the platform flash
/// driver implements this trait.
///
/// Writes and erases are accepted or rejected synchronously and complete
/// later. The controller signals completion through an interrupt; the driver
/// records the result and hands it out in issue order through
/// [`FlashDriver::take_completion`] from the cooperative context. Reads are
/// memory mapped and synchronous.
pub trait FlashDriver {
    /// Erase granularity in bytes.
    fn page_size(&self) -> u32;

    /// Start writing `words` at the word-aligned absolute `address`.
    fn write(&mut self, address: u32, words: &[u32]) -> Result<(), FlashDrvError>;

    /// Start erasing the page beginning at `page_address`.
    fn erase_page(&mut self, page_address: u32) -> Result<(), FlashDrvError>;

    /// Read from the flash, filling the provided buffer with data
    fn read(&self, address: u32, buffer: &mut [u8]) -> Result<(), FlashDrvError>;

    /// Result of the oldest finished write or erase, if any.
    fn take_completion(&mut self) -> Option<Result<(), FlashDrvError>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[repr(usize)]
pub enum FlashDrvError {
    /// Generic failure condition
    #[error("flash operation failed")]
    FAIL = 1,
    /// Underlying system is busy; retry
    #[error("flash controller busy")]
    BUSY = 2,
    /// An invalid parameter was passed
    #[error("invalid flash parameter")]
    INVAL = 6,
    /// Parameter passed was too large
    #[error("flash access out of range")]
    SIZE = 7,
}
