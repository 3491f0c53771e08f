// Licensed under the Apache-2.0 license

use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Flash banks that can hold an application image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    Bank0,
    Bank1,
}

/// Status code stored per bank in the settings record.
///
/// An erased settings page reads back as `InvalidApp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BankStatus {
    ValidApp = 0x01,
    Erased = 0xFE,
    InvalidApp = 0xFF,
}

impl core::convert::TryFrom<u8> for BankStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(BankStatus::ValidApp),
            0xFE => Ok(BankStatus::Erased),
            0xFF => Ok(BankStatus::InvalidApp),
            _ => Err(()),
        }
    }
}

/// Persisted bootloader settings.
///
/// Stored as one record at a fixed flash address. There is no version field:
/// changing this layout requires erasing the settings page.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, PartialEq, Eq)]
#[repr(C)]
pub struct BootloaderSettings {
    pub bank_0: u8,                     // Valid values defined in BankStatus
    pub bank_0_crc: U16<LittleEndian>,  // CRC-16 of the bank 0 image, 0 if unchecked
    pub bank_0_size: U32<LittleEndian>, // Bank 0 image size in bytes
    pub bank_1: u8,                     // Valid values defined in BankStatus
}

impl BootloaderSettings {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn new(bank_0: BankStatus, bank_0_crc: u16, bank_0_size: u32, bank_1: BankStatus) -> Self {
        BootloaderSettings {
            bank_0: bank_0 as u8,
            bank_0_crc: bank_0_crc.into(),
            bank_0_size: bank_0_size.into(),
            bank_1: bank_1 as u8,
        }
    }

    /// Status of bank 0. Unknown codes are treated as an invalid image.
    pub fn bank_0_status(&self) -> BankStatus {
        BankStatus::try_from(self.bank_0).unwrap_or(BankStatus::InvalidApp)
    }

    /// Status of bank 1. Unknown codes are treated as an invalid image.
    pub fn bank_1_status(&self) -> BankStatus {
        BankStatus::try_from(self.bank_1).unwrap_or(BankStatus::InvalidApp)
    }

    pub fn bank_0_crc(&self) -> u16 {
        self.bank_0_crc.get()
    }

    pub fn bank_0_size(&self) -> u32 {
        self.bank_0_size.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        assert_eq!(BootloaderSettings::SIZE, 8);
        let settings =
            BootloaderSettings::new(BankStatus::ValidApp, 0x1234, 0x400, BankStatus::InvalidApp);
        assert_eq!(
            settings.as_bytes(),
            &[0x01, 0x34, 0x12, 0x00, 0x04, 0x00, 0x00, 0xFF]
        );
    }

    #[test]
    fn test_erased_page_reads_as_invalid() {
        let settings =
            BootloaderSettings::read_from_bytes(&[0xFF; BootloaderSettings::SIZE]).unwrap();
        assert_eq!(settings.bank_0_status(), BankStatus::InvalidApp);
        assert_eq!(settings.bank_1_status(), BankStatus::InvalidApp);
        assert_eq!(settings.bank_0_crc(), 0xFFFF);
        assert_eq!(settings.bank_0_size(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_unknown_status_is_invalid() {
        assert_eq!(BankStatus::try_from(0x01), Ok(BankStatus::ValidApp));
        assert_eq!(BankStatus::try_from(0xFE), Ok(BankStatus::Erased));
        assert_eq!(BankStatus::try_from(0xFF), Ok(BankStatus::InvalidApp));
        assert_eq!(BankStatus::try_from(0x00), Err(()));

        let mut settings = BootloaderSettings::new(BankStatus::ValidApp, 0, 0, BankStatus::Erased);
        settings.bank_0 = 0x42;
        assert_eq!(settings.bank_0_status(), BankStatus::InvalidApp);
        assert_eq!(settings.bank_1_status(), BankStatus::Erased);
    }
}
