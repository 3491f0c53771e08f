// Licensed under the Apache-2.0 license

//! Run state of the bootloader while an update session is active.
//!
//! Every settings change is committed by erasing the settings block and
//! writing the whole record. The run state only reaches `Complete` once the
//! flash has confirmed that write, so a power loss before that point leaves
//! the previous record in place.

use crate::error::BootError;
use crate::transport::DfuTransport;
use dfu_config::boot::{Bank, BankStatus, BootloaderSettings};
use flash_storage::{BlockHandle, FlashDriver, OpToken, StorageError, StorageManager};
use log::{debug, error, info, warn};
use smlang::statemachine;
use zerocopy::{FromBytes, IntoBytes};

/// Size of the block registered for the settings record.
pub const SETTINGS_BLOCK_SIZE: u32 = 16;

const SETTINGS_WORDS: usize = BootloaderSettings::SIZE / 4;
const _: () = assert!(BootloaderSettings::SIZE % 4 == 0);
const _: () = assert!(BootloaderSettings::SIZE <= SETTINGS_BLOCK_SIZE as usize);

/// Image reported complete by the update engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub crc: u16,
    pub size: u32,
}

statemachine! {
    derive_states: [Debug, Clone, Copy],
    derive_events: [Clone, Debug],
    transitions: {
        *Updating + BankErased(Bank) / on_bank_erased = Updating,
        Updating + UpdateComplete(ImageInfo) / on_update_complete = SettingsSaving,
        Updating + TransportTimeout / on_transport_closed = Timeout,
        Updating + TransportReset / on_transport_closed = Reset,
        SettingsSaving + SettingsStored / on_settings_stored = Complete,
    }
}

pub struct UpdateContext<'a, F: FlashDriver, T: DfuTransport> {
    pub(crate) storage: &'a mut StorageManager<F>,
    pub(crate) transport: &'a mut T,
    settings_block: BlockHandle,
    // Token of the settings write that has not been confirmed yet
    pub(crate) settings_write: Option<OpToken>,
    // Error behind the last failed action
    pub(crate) failure: Option<BootError>,
}

impl<'a, F: FlashDriver, T: DfuTransport> UpdateContext<'a, F, T> {
    pub fn new(
        storage: &'a mut StorageManager<F>,
        transport: &'a mut T,
        settings_block: BlockHandle,
    ) -> Self {
        Self {
            storage,
            transport,
            settings_block,
            settings_write: None,
            failure: None,
        }
    }

    /// Settings record as currently stored in flash.
    pub fn load_settings(&self) -> Result<BootloaderSettings, BootError> {
        let mut words = [0u32; SETTINGS_WORDS];
        self.storage.load(
            words.as_mut_bytes(),
            &self.settings_block,
            BootloaderSettings::SIZE as u32,
            0,
        )?;
        BootloaderSettings::read_from_bytes(words.as_bytes()).map_err(|_| BootError::SettingsDecode)
    }

    /// Erases the settings block and writes `settings` in full.
    ///
    /// Both operations must fit in the queue: the erase is never issued
    /// without room for the rewrite behind it.
    fn save_settings(&mut self, settings: &BootloaderSettings) -> Result<(), BootError> {
        if self.storage.free_slots() < 2 {
            warn!("Settings write deferred: flash queue full");
            return Err(StorageError::Busy.into());
        }
        let mut words = [0u32; SETTINGS_WORDS];
        words.as_mut_bytes().copy_from_slice(settings.as_bytes());
        self.storage.clear(&self.settings_block)?;
        let token = self.storage.store(
            &self.settings_block,
            words.as_bytes(),
            BootloaderSettings::SIZE as u32,
            0,
        )?;
        debug!("Settings write issued: {:?}", settings);
        self.settings_write = Some(token);
        Ok(())
    }

    fn fail(&mut self, err: BootError) -> Result<(), ()> {
        error!("Update action failed: {}", err);
        self.failure = Some(err);
        Err(())
    }
}

impl<F: FlashDriver, T: DfuTransport> StateMachineContext for UpdateContext<'_, F, T> {
    fn on_bank_erased(&mut self, bank: Bank) -> Result<(), ()> {
        debug!("Update action: on_bank_erased {:?}", bank);
        let current = match self.load_settings() {
            Ok(settings) => settings,
            Err(e) => return self.fail(e),
        };
        let settings = match bank {
            Bank::Bank0 => {
                BootloaderSettings::new(BankStatus::Erased, 0, 0, current.bank_1_status())
            }
            Bank::Bank1 => BootloaderSettings::new(
                current.bank_0_status(),
                current.bank_0_crc(),
                current.bank_0_size(),
                BankStatus::Erased,
            ),
        };
        match self.save_settings(&settings) {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    fn on_update_complete(&mut self, image: ImageInfo) -> Result<(), ()> {
        info!(
            "Update complete: {} bytes, CRC {:#06x}, saving settings",
            image.size, image.crc
        );
        let settings = BootloaderSettings::new(
            BankStatus::ValidApp,
            image.crc,
            image.size,
            BankStatus::InvalidApp,
        );
        match self.save_settings(&settings) {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    fn on_transport_closed(&mut self) -> Result<(), ()> {
        info!("Update session ended by transport, settings untouched");
        if let Err(e) = self.transport.close() {
            warn!("Transport close failed: {}", e);
        }
        Ok(())
    }

    fn on_settings_stored(&mut self) -> Result<(), ()> {
        info!("Settings saved");
        self.settings_write = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{DfuRequest, TransportError};
    use dfu_config::FlashLayout;
    use dfu_engine::PacketWritten;
    use flash_storage::sim::RamFlash;
    use flash_storage::MAX_PENDING_OPS;

    struct NullTransport;

    impl DfuTransport for NullTransport {
        fn open(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn respond(&mut self, _request: DfuRequest, _status: u32) -> Result<(), TransportError> {
            Ok(())
        }

        fn packet_written(&mut self, _written: &PacketWritten) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn storage() -> StorageManager<RamFlash> {
        let layout = FlashLayout::default();
        let flash = RamFlash::new(
            layout.flash_start(),
            layout.flash_end() - layout.flash_start(),
            layout.page_size,
        );
        let mut storage = StorageManager::new(flash, layout);
        storage.init();
        storage
    }

    #[test]
    fn test_settings_not_erased_without_room_for_rewrite() {
        let mut storage = storage();
        let block = storage.register(SETTINGS_BLOCK_SIZE, 1, None).unwrap();
        storage.driver_mut().set_hold(true);
        let filler = [0u32; 4];
        for _ in 0..MAX_PENDING_OPS - 1 {
            storage.store(&block, filler.as_bytes(), 16, 0).unwrap();
        }

        let mut transport = NullTransport;
        let mut ctx = UpdateContext::new(&mut storage, &mut transport, block);
        let settings =
            BootloaderSettings::new(BankStatus::ValidApp, 0x1234, 1024, BankStatus::InvalidApp);
        assert_eq!(
            ctx.save_settings(&settings),
            Err(BootError::Storage(StorageError::Busy))
        );
        assert_eq!(ctx.settings_write, None);
        assert_eq!(ctx.storage.driver().queued(), MAX_PENDING_OPS - 1);

        // One completion frees the second slot the commit needs.
        ctx.storage.driver_mut().set_hold(false);
        assert!(ctx.storage.process_completion().is_some());
        ctx.storage.driver_mut().set_hold(true);
        assert_eq!(ctx.storage.free_slots(), 2);
        ctx.save_settings(&settings).unwrap();
        assert!(ctx.settings_write.is_some());
        assert_eq!(ctx.storage.free_slots(), 0);
    }
}
