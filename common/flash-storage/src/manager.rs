// Licensed under the Apache-2.0 license

use crate::error::StorageError;
use crate::hil::{FlashDrvError, FlashDriver};
use arrayvec::ArrayVec;
use dfu_config::{FlashLayout, MIN_BLOCK_SIZE, WORD_SIZE};
use log::{debug, warn};
use zerocopy::FromBytes;

/// Number of data modules the allocator can track.
pub const MAX_MODULES: usize = 2;

/// Flash operations that may be outstanding at once.
pub const MAX_PENDING_OPS: usize = 8;

/// Invoked for every finished store or clear of the module it was registered with.
pub type StorageCallback = fn(&StorageEvent);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleId {
    /// A module allocated from the storage region, by registration order.
    Data(u8),
    /// The module registered with an explicit flash region.
    Raw,
}

/// Reference to one block of a module's reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub module: ModuleId,
    pub address: u32,
}

/// Identifies an accepted store or clear until its completion is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpToken(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Store,
    Clear,
}

/// Completion of a store or clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEvent {
    pub token: OpToken,
    pub module: ModuleId,
    pub op: StorageOp,
    pub address: u32, // first flash byte the operation touched
    pub len: u32,     // bytes written or erased
    pub result: Result<(), FlashDrvError>,
}

#[derive(Debug, Clone, Copy)]
struct ModuleEntry {
    callback: Option<StorageCallback>,
    base: u32,
    block_size: u32,
    block_count: u32,
    pages: u32,
}

impl ModuleEntry {
    /// One past the last byte of the last block.
    fn end(&self) -> u32 {
        self.base + self.block_size * self.block_count
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingOp {
    token: OpToken,
    module: ModuleId,
    op: StorageOp,
    address: u32,
    len: u32,
    remaining: u32,
    result: Result<(), FlashDrvError>,
    report: bool,
}

/// Append-only block allocator over the storage region of the flash.
///
/// Modules register once for a span of equal-sized blocks and receive a
/// handle to their first block. Spans are rounded up to whole pages and are
/// never reclaimed. Stores and clears are handed to the flash driver
/// immediately; their results are collected in issue order by
/// [`StorageManager::process_completion`].
pub struct StorageManager<F: FlashDriver, const N: usize = MAX_MODULES> {
    driver: F,
    layout: FlashLayout,
    initialized: bool,
    cursor: u32,
    modules: ArrayVec<ModuleEntry, N>,
    raw: Option<ModuleEntry>,
    pending: ArrayVec<PendingOp, MAX_PENDING_OPS>,
    next_token: u32,
}

impl<F: FlashDriver, const N: usize> StorageManager<F, N> {
    pub fn new(driver: F, layout: FlashLayout) -> Self {
        StorageManager {
            driver,
            layout,
            initialized: false,
            cursor: layout.storage_start,
            modules: ArrayVec::new(),
            raw: None,
            pending: ArrayVec::new(),
            next_token: 0,
        }
    }

    /// Resets the allocation cursor to the start of the storage region and
    /// forgets all registrations. Operations already handed to the driver
    /// are still accounted for when they complete.
    pub fn init(&mut self) {
        self.cursor = self.layout.storage_start;
        self.modules.clear();
        self.raw = None;
        self.initialized = true;
        debug!(
            "storage: region {:#x}..{:#x}",
            self.layout.storage_start,
            self.layout.storage_end()
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn layout(&self) -> &FlashLayout {
        &self.layout
    }

    pub fn driver(&self) -> &F {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut F {
        &mut self.driver
    }

    /// Reserves `block_count` blocks of `block_size` bytes.
    ///
    /// # Arguments
    ///
    /// * `block_size` - Block size in bytes, between `MIN_BLOCK_SIZE` and one page.
    /// * `block_count` - Number of blocks, at least one.
    /// * `callback` - Notified of every finished store or clear on this module.
    ///
    /// # Returns
    ///
    /// A handle to the first block. The reservation is rounded up to whole
    /// pages and the next registration starts on the following page.
    pub fn register(
        &mut self,
        block_size: u32,
        block_count: u32,
        callback: Option<StorageCallback>,
    ) -> Result<BlockHandle, StorageError> {
        self.ensure_initialized()?;
        if !(MIN_BLOCK_SIZE..=self.layout.max_block_size()).contains(&block_size)
            || block_count == 0
        {
            return Err(StorageError::InvalidParam);
        }
        let total = block_size
            .checked_mul(block_count)
            .ok_or(StorageError::InvalidParam)?;
        match self.cursor.checked_add(total) {
            Some(end) if end <= self.layout.storage_end() => {}
            _ => return Err(StorageError::InvalidParam),
        }
        if self.modules.is_full() {
            return Err(StorageError::NoMem);
        }
        let index = u8::try_from(self.modules.len()).map_err(|_| StorageError::NoMem)?;

        let entry = ModuleEntry {
            callback,
            base: self.cursor,
            block_size,
            block_count,
            pages: self.layout.pages_for(total),
        };
        self.cursor += entry.pages * self.layout.page_size;
        let module = ModuleId::Data(index);
        self.modules.push(entry);
        debug!(
            "storage: {:?} registered {}x{} bytes at {:#x} ({} pages)",
            module, block_count, block_size, entry.base, entry.pages
        );
        Ok(BlockHandle {
            module,
            address: entry.base,
        })
    }

    /// Claims an explicit page-aligned flash region outside the storage
    /// region, such as an application image bank. The region behaves as a
    /// module with a single block covering all of it.
    pub fn register_raw(
        &mut self,
        base: u32,
        size: u32,
        callback: Option<StorageCallback>,
    ) -> Result<BlockHandle, StorageError> {
        self.ensure_initialized()?;
        let page_size = self.layout.page_size;
        if size == 0 || base % page_size != 0 || size % page_size != 0 {
            return Err(StorageError::InvalidParam);
        }
        let end = base.checked_add(size).ok_or(StorageError::InvalidParam)?;
        if base < self.layout.storage_end() && end > self.layout.storage_start {
            return Err(StorageError::InvalidParam);
        }
        if self.raw.is_some() {
            return Err(StorageError::NoMem);
        }
        self.raw = Some(ModuleEntry {
            callback,
            base,
            block_size: size,
            block_count: 1,
            pages: size / page_size,
        });
        debug!("storage: raw region {:#x}..{:#x}", base, end);
        Ok(BlockHandle {
            module: ModuleId::Raw,
            address: base,
        })
    }

    /// Handle of block `block_number` of the module `base` belongs to.
    pub fn block_identifier(
        &self,
        base: &BlockHandle,
        block_number: u32,
    ) -> Result<BlockHandle, StorageError> {
        self.ensure_initialized()?;
        let entry = self.entry(base.module)?;
        let address = block_number
            .checked_mul(entry.block_size)
            .and_then(|offset| entry.base.checked_add(offset))
            .ok_or(StorageError::InvalidParam)?;
        if address >= entry.end() {
            return Err(StorageError::InvalidParam);
        }
        Ok(BlockHandle {
            module: base.module,
            address,
        })
    }

    /// Writes `source[..size]` to `dest.address + offset`.
    ///
    /// The write is only started here; the flash holds the data once the
    /// completion carrying the returned token has been reported with `Ok`.
    pub fn store(
        &mut self,
        dest: &BlockHandle,
        source: &[u8],
        size: u32,
        offset: u32,
    ) -> Result<OpToken, StorageError> {
        self.ensure_initialized()?;
        let entry = *self.entry(dest.module)?;
        Self::check_access(&entry, dest, source.as_ptr(), source.len(), size, offset)?;
        if size % WORD_SIZE != 0 {
            return Err(StorageError::InvalidLength);
        }
        let words = <[u32]>::ref_from_bytes(&source[..size as usize])
            .map_err(|_| StorageError::InvalidAddr)?;
        if self.pending.is_full() {
            return Err(StorageError::Busy);
        }

        let address = dest.address + offset;
        self.driver.write(address, words)?;
        let token = self.queue(dest.module, StorageOp::Store, address, size, 1, Ok(()), true);
        debug!(
            "storage: {:?} store {} bytes at {:#x} ({:?})",
            dest.module, size, address, token
        );
        Ok(token)
    }

    /// Copies `size` bytes from `src.address + offset` into `dest[..size]`.
    pub fn load(
        &self,
        dest: &mut [u8],
        src: &BlockHandle,
        size: u32,
        offset: u32,
    ) -> Result<(), StorageError> {
        self.ensure_initialized()?;
        let entry = self.entry(src.module)?;
        Self::check_access(entry, src, dest.as_ptr(), dest.len(), size, offset)?;
        self.driver
            .read(src.address + offset, &mut dest[..size as usize])?;
        Ok(())
    }

    /// Erases the whole reservation of the module `dest` belongs to.
    ///
    /// There is no size argument: erasing is page-granular and always covers
    /// every page the module reserved at registration, whichever block
    /// `dest` names. Page erases are issued in order and issuing stops at the
    /// first one the driver rejects, whose error is returned.
    pub fn clear(&mut self, dest: &BlockHandle) -> Result<OpToken, StorageError> {
        self.ensure_initialized()?;
        let entry = *self.entry(dest.module)?;
        Self::check_handle(&entry, dest)?;
        if self.pending.is_full() {
            return Err(StorageError::Busy);
        }

        let page_size = self.layout.page_size;
        let len = entry.pages * page_size;
        for page in 0..entry.pages {
            if let Err(e) = self.driver.erase_page(entry.base + page * page_size) {
                warn!(
                    "storage: {:?} erase rejected at page {} of {}: {:?}",
                    dest.module, page, entry.pages, e
                );
                if page > 0 {
                    // Pages already accepted still complete; account for them silently.
                    self.queue(dest.module, StorageOp::Clear, entry.base, len, page, Err(e), false);
                }
                return Err(e.into());
            }
        }
        let token = self.queue(
            dest.module,
            StorageOp::Clear,
            entry.base,
            len,
            entry.pages,
            Ok(()),
            true,
        );
        debug!(
            "storage: {:?} clear {} pages at {:#x} ({:?})",
            dest.module, entry.pages, entry.base, token
        );
        Ok(token)
    }

    /// Collects finished flash operations from the driver.
    ///
    /// Returns the next store or clear that has fully completed, after
    /// notifying the owning module's callback. A clear completes when its
    /// last page does and carries the first page failure, if any.
    pub fn process_completion(&mut self) -> Option<StorageEvent> {
        loop {
            let result = self.driver.take_completion()?;
            let Some(op) = self.pending.first_mut() else {
                warn!("storage: flash completion with nothing pending");
                continue;
            };
            op.remaining -= 1;
            if op.result.is_ok() {
                op.result = result;
            }
            if op.remaining > 0 {
                continue;
            }

            let op = self.pending.remove(0);
            if !op.report {
                continue;
            }
            let event = StorageEvent {
                token: op.token,
                module: op.module,
                op: op.op,
                address: op.address,
                len: op.len,
                result: op.result,
            };
            if let Err(e) = event.result {
                warn!("storage: {:?} {:?} failed: {:?}", op.module, op.op, e);
            }
            if let Some(callback) = self.entry(op.module).ok().and_then(|e| e.callback) {
                callback(&event);
            }
            return Some(event);
        }
    }

    /// Operations that can still be queued before `store` and `clear` report `Busy`.
    pub fn free_slots(&self) -> usize {
        self.pending.remaining_capacity()
    }

    /// Operations of `module` handed to the driver and not yet reported.
    pub fn pending_operations(&self, module: ModuleId) -> usize {
        self.pending.iter().filter(|op| op.module == module).count()
    }

    fn ensure_initialized(&self) -> Result<(), StorageError> {
        if self.initialized {
            Ok(())
        } else {
            Err(StorageError::InvalidState)
        }
    }

    fn entry(&self, module: ModuleId) -> Result<&ModuleEntry, StorageError> {
        match module {
            ModuleId::Data(index) => self.modules.get(index as usize),
            ModuleId::Raw => self.raw.as_ref(),
        }
        .ok_or(StorageError::InvalidParam)
    }

    fn check_handle(entry: &ModuleEntry, handle: &BlockHandle) -> Result<(), StorageError> {
        if handle.address < entry.base
            || handle.address >= entry.end()
            || (handle.address - entry.base) % entry.block_size != 0
        {
            return Err(StorageError::InvalidParam);
        }
        Ok(())
    }

    fn check_access(
        entry: &ModuleEntry,
        handle: &BlockHandle,
        buffer: *const u8,
        buffer_len: usize,
        size: u32,
        offset: u32,
    ) -> Result<(), StorageError> {
        Self::check_handle(entry, handle)?;
        if size == 0 || size > entry.block_size {
            return Err(StorageError::InvalidParam);
        }
        match size.checked_add(offset) {
            Some(end) if end <= entry.block_size => {}
            _ => return Err(StorageError::InvalidParam),
        }
        let buffer = buffer as usize;
        if buffer % WORD_SIZE as usize != 0
            || buffer.wrapping_add(offset as usize) % WORD_SIZE as usize != 0
        {
            return Err(StorageError::InvalidAddr);
        }
        if size as usize > buffer_len {
            return Err(StorageError::InvalidLength);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn queue(
        &mut self,
        module: ModuleId,
        op: StorageOp,
        address: u32,
        len: u32,
        remaining: u32,
        result: Result<(), FlashDrvError>,
        report: bool,
    ) -> OpToken {
        let token = OpToken(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        // Callers check for space before touching the driver.
        let _ = self.pending.try_push(PendingOp {
            token,
            module,
            op,
            address,
            len,
            remaining,
            result,
            report,
        });
        token
    }
}
