// Licensed under the Apache-2.0 license

#![cfg_attr(target_arch = "riscv32", no_std)]

pub mod boot;

/// Smallest block a storage module may register, in bytes.
pub const MIN_BLOCK_SIZE: u32 = 0x10;

/// Flash word size; all writes are word-granular.
pub const WORD_SIZE: u32 = 4;

/// Configures the flash memory map used by the bootloader.
/// These are the defaults for the reference part and can be overridden per board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct FlashLayout {
    pub page_size: u32,        // erase granularity in bytes
    pub storage_start: u32,    // first byte handed out by the storage manager
    pub storage_pages: u32,    // pages available to the storage manager
    pub app_start: u32,        // bank 0, the application's code region and entry vector
    pub app_max_size: u32,     // largest image bank 0 can hold
    pub settings_address: u32, // fixed address of the bootloader settings record
}

impl Default for FlashLayout {
    fn default() -> Self {
        // 256 KiB part: protocol stack below 0x14000, bootloader from 0x3C000,
        // settings in the last page.
        FlashLayout {
            page_size: 1024,
            storage_start: 0x3_FC00,
            storage_pages: 1,
            app_start: 0x1_4000,
            app_max_size: 0x3_C000 - 0x1_4000,
            settings_address: 0x3_FC00,
        }
    }
}

impl FlashLayout {
    /// One past the last byte the storage manager may hand out.
    pub fn storage_end(&self) -> u32 {
        self.storage_start + self.storage_pages * self.page_size
    }

    /// Largest block a storage module may register.
    pub fn max_block_size(&self) -> u32 {
        self.page_size
    }

    /// Number of whole pages needed to hold `len` bytes.
    pub fn pages_for(&self, len: u32) -> u32 {
        len.div_ceil(self.page_size)
    }

    /// Lowest flash address covered by this layout.
    pub fn flash_start(&self) -> u32 {
        self.app_start.min(self.storage_start)
    }

    /// One past the highest flash address covered by this layout.
    pub fn flash_end(&self) -> u32 {
        (self.app_start + self.app_max_size).max(self.storage_end())
    }
}
