// Licensed under the Apache-2.0 license

//! Block allocator and word-aligned access layer over the on-chip flash.

#![cfg_attr(target_arch = "riscv32", no_std)]

mod error;
pub mod hil;
pub mod manager;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use error::StorageError;
pub use hil::{FlashDrvError, FlashDriver};
pub use manager::{
    BlockHandle, ModuleId, OpToken, StorageCallback, StorageEvent, StorageManager, StorageOp,
    MAX_MODULES, MAX_PENDING_OPS,
};
