// Licensed under the Apache-2.0 license

//! Resident bootloader: keeps the persisted bank settings, decides at reset
//! whether to receive a new image or start the application, and runs the
//! update session until the transfer completes, times out or is reset.

#![cfg_attr(target_arch = "riscv32", no_std)]

mod boot;
mod error;
pub mod handoff;
mod session;
pub mod transport;
pub mod update_sm;

pub use boot::{BootAction, Bootloader};
pub use error::BootError;
pub use handoff::AppHandoff;
pub use session::{UpdateOutcome, UpdateSession};
pub use transport::{DfuRequest, DfuTransport, EventPump, TransportError, TransportEvent};
