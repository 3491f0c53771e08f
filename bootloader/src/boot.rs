/*++

Licensed under the Apache-2.0 license.

File Name:

    boot.rs

Abstract:

    Boot flow - Decides after reset whether to receive a new image or start the resident application

--*/

use crate::error::BootError;
use crate::handoff::AppHandoff;
use crate::session::{UpdateOutcome, UpdateSession};
use crate::transport::{DfuTransport, EventPump};
use core::convert::Infallible;
use dfu_config::boot::{Bank, BankStatus, BootloaderSettings};
use dfu_config::FlashLayout;
use dfu_engine::crc::crc16_region;
use flash_storage::{FlashDriver, StorageManager};
use log::{error, info, warn};
use zerocopy::FromBytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootAction {
    EnterUpdate,
    StartApp,
}

pub struct Bootloader<F: FlashDriver> {
    storage: StorageManager<F>,
    layout: FlashLayout,
}

impl<F: FlashDriver> Bootloader<F> {
    pub fn new(driver: F, layout: FlashLayout) -> Self {
        Bootloader {
            storage: StorageManager::new(driver, layout),
            layout,
        }
    }

    pub fn storage(&self) -> &StorageManager<F> {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut StorageManager<F> {
        &mut self.storage
    }

    pub fn layout(&self) -> &FlashLayout {
        &self.layout
    }

    /// Reads the settings record straight from its fixed flash address.
    pub fn settings(&self) -> Result<BootloaderSettings, BootError> {
        let mut raw = [0u8; BootloaderSettings::SIZE];
        self.storage
            .driver()
            .read(self.layout.settings_address, &mut raw)
            .map_err(BootError::Flash)?;
        BootloaderSettings::read_from_bytes(&raw).map_err(|_| BootError::SettingsDecode)
    }

    /// Whether `bank` holds an application that may be started.
    ///
    /// Bank 0 qualifies when its settings status is `ValidApp` and either
    /// no CRC was recorded (0) or the CRC over the recorded size matches.
    /// Bank 1 is never bootable on a single-bank layout.
    pub fn app_is_valid(&self, bank: Bank) -> bool {
        if bank == Bank::Bank1 {
            return false;
        }
        let settings = match self.settings() {
            Ok(settings) => settings,
            Err(e) => {
                error!("Cannot read settings: {}", e);
                return false;
            }
        };
        if settings.bank_0_status() != BankStatus::ValidApp {
            return false;
        }
        let expected = settings.bank_0_crc();
        if expected == 0 {
            return true;
        }
        let size = settings.bank_0_size();
        if size > self.layout.app_max_size {
            warn!("Recorded image size {} exceeds bank 0", size);
            return false;
        }

        let start = self.layout.app_start;
        let driver = self.storage.driver();
        match crc16_region(size, |offset, buf| driver.read(start + offset, buf)) {
            Ok(crc) if crc == expected => true,
            Ok(crc) => {
                warn!(
                    "Bank 0 CRC {:#06x} does not match recorded {:#06x}",
                    crc, expected
                );
                false
            }
            Err(e) => {
                error!("Cannot read bank 0: {}", e);
                false
            }
        }
    }

    pub fn boot_action(&self, update_requested: bool) -> BootAction {
        if update_requested || !self.app_is_valid(Bank::Bank0) {
            BootAction::EnterUpdate
        } else {
            BootAction::StartApp
        }
    }

    /// Runs an update session to completion.
    ///
    /// Returns once the new image is committed, or the transport timed out or
    /// was reset. A flash failure is returned as an error and is fatal.
    pub fn run_update<T: DfuTransport, P: EventPump>(
        &mut self,
        transport: &mut T,
        pump: &mut P,
    ) -> Result<UpdateOutcome, BootError> {
        let mut session = UpdateSession::start(&mut self.storage, transport, &self.layout)?;
        loop {
            session.process_flash_events()?;
            if let Some(outcome) = session.outcome() {
                info!("Update session finished: {:?}", outcome);
                return Ok(outcome);
            }
            pump.wait_for_event();
            while let Some(event) = pump.next_event() {
                session.handle_transport_event(event)?;
                session.process_flash_events()?;
                if session.outcome().is_some() {
                    break;
                }
            }
        }
    }

    /// Shuts down the protocol stack, masks interrupts and jumps to bank 0.
    pub fn start_app<H: AppHandoff>(&self, handoff: &mut H) -> Result<Infallible, BootError> {
        info!("Starting application at {:#x}", self.layout.app_start);
        handoff.disable_stack()?;
        handoff.disable_interrupts();
        handoff.jump(self.layout.app_start)
    }

    /// Complete reset-time flow: update if requested or needed, then start
    /// the application. Returns only if no valid application is left, in
    /// which case the platform resets.
    pub fn boot<T: DfuTransport, P: EventPump, H: AppHandoff>(
        &mut self,
        update_requested: bool,
        transport: &mut T,
        pump: &mut P,
        handoff: &mut H,
    ) -> Result<Infallible, BootError> {
        if self.boot_action(update_requested) == BootAction::EnterUpdate {
            self.run_update(transport, pump)?;
        }
        if !self.app_is_valid(Bank::Bank0) {
            error!("No valid application in bank 0");
            return Err(BootError::NoValidApp);
        }
        self.start_app(handoff)
    }
}
