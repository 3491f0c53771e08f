// Licensed under the Apache-2.0 license

//! Single-bank firmware transfer: receives an image into the application
//! bank, checks it against the CRC-16 carried in the init packet and reports
//! the outcome to the bootloader.

#![cfg_attr(target_arch = "riscv32", no_std)]

pub mod crc;
pub mod engine;
mod error;
pub mod packet;

pub use engine::{
    AbortReason, DataPacketCallback, DfuState, PacketWritten, UpdateEngine, UpdateStatus,
    INIT_PACKET_WORDS,
};
pub use error::DfuError;
pub use packet::{DfuPacket, MAX_PACKET_WORDS};
