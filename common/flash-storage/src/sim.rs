// Licensed under the Apache-2.0 license

//! RAM-backed flash controller for host tests.
//!
//! Behaves like NOR flash: erase sets a page to `0xFF`, writes can only clear
//! bits. Operations are queued when accepted and take effect when their
//! completion is taken, so a test can observe flash before and after.

use crate::hil::{FlashDrvError, FlashDriver};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FlashOp {
    Write { address: u32, words: Vec<u32> },
    Erase { address: u32 },
}

pub struct RamFlash {
    base: u32,
    page_size: u32,
    memory: Vec<u8>,
    queued: VecDeque<FlashOp>,
    hold: bool,
    fail_at: Option<u32>,
    reject_next: bool,
    writes: usize,
    erases: usize,
}

impl RamFlash {
    /// Creates an erased flash covering `base..base + size`.
    pub fn new(base: u32, size: u32, page_size: u32) -> Self {
        RamFlash {
            base,
            page_size,
            memory: vec![0xFF; size as usize],
            queued: VecDeque::new(),
            hold: false,
            fail_at: None,
            reject_next: false,
            writes: 0,
            erases: 0,
        }
    }

    /// Holds completions back until released, simulating a slow controller.
    pub fn set_hold(&mut self, hold: bool) {
        self.hold = hold;
    }

    /// Operations touching `address` complete with `FAIL` and leave flash untouched.
    pub fn fail_at(&mut self, address: Option<u32>) {
        self.fail_at = address;
    }

    /// The next write or erase is rejected synchronously with `BUSY`.
    pub fn reject_next(&mut self) {
        self.reject_next = true;
    }

    /// Accepted operations whose completion has not been taken yet.
    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Completed writes.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Completed page erases.
    pub fn erase_count(&self) -> usize {
        self.erases
    }

    /// Contents of flash, bypassing the controller.
    pub fn contents(&self, address: u32, len: usize) -> &[u8] {
        let start = (address - self.base) as usize;
        &self.memory[start..start + len]
    }

    /// Programs flash directly, for preparing a test image.
    pub fn program(&mut self, address: u32, data: &[u8]) {
        let start = (address - self.base) as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    fn range(&self, address: u32, len: usize) -> Result<core::ops::Range<usize>, FlashDrvError> {
        let start = address
            .checked_sub(self.base)
            .ok_or(FlashDrvError::SIZE)? as usize;
        let end = start.checked_add(len).ok_or(FlashDrvError::SIZE)?;
        if end > self.memory.len() {
            return Err(FlashDrvError::SIZE);
        }
        Ok(start..end)
    }

    fn accept(&mut self, op: FlashOp) -> Result<(), FlashDrvError> {
        if self.reject_next {
            self.reject_next = false;
            return Err(FlashDrvError::BUSY);
        }
        self.queued.push_back(op);
        Ok(())
    }

    fn apply(&mut self, op: FlashOp) -> Result<(), FlashDrvError> {
        match op {
            FlashOp::Write { address, words } => {
                let len = words.len() * 4;
                if self.fail_at.is_some_and(|a| a >= address && a < address + len as u32) {
                    return Err(FlashDrvError::FAIL);
                }
                let range = self.range(address, len)?;
                for (dst, word) in self.memory[range].chunks_exact_mut(4).zip(words) {
                    for (d, s) in dst.iter_mut().zip(word.to_le_bytes()) {
                        *d &= s;
                    }
                }
                self.writes += 1;
            }
            FlashOp::Erase { address } => {
                if self
                    .fail_at
                    .is_some_and(|a| a >= address && a < address + self.page_size)
                {
                    return Err(FlashDrvError::FAIL);
                }
                let range = self.range(address, self.page_size as usize)?;
                self.memory[range].fill(0xFF);
                self.erases += 1;
            }
        }
        Ok(())
    }
}

impl FlashDriver for RamFlash {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn write(&mut self, address: u32, words: &[u32]) -> Result<(), FlashDrvError> {
        if address % 4 != 0 {
            return Err(FlashDrvError::INVAL);
        }
        self.range(address, words.len() * 4)?;
        self.accept(FlashOp::Write {
            address,
            words: words.to_vec(),
        })
    }

    fn erase_page(&mut self, page_address: u32) -> Result<(), FlashDrvError> {
        if page_address % self.page_size != 0 {
            return Err(FlashDrvError::INVAL);
        }
        self.range(page_address, self.page_size as usize)?;
        self.accept(FlashOp::Erase {
            address: page_address,
        })
    }

    fn read(&self, address: u32, buffer: &mut [u8]) -> Result<(), FlashDrvError> {
        let range = self.range(address, buffer.len())?;
        buffer.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    fn take_completion(&mut self) -> Option<Result<(), FlashDrvError>> {
        if self.hold {
            return None;
        }
        let op = self.queued.pop_front()?;
        Some(self.apply(op))
    }
}
