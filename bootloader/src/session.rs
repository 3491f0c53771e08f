// Licensed under the Apache-2.0 license

use crate::error::BootError;
use crate::transport::{DfuRequest, DfuTransport, TransportEvent};
use crate::update_sm::{
    Events, ImageInfo, StateMachine, States, UpdateContext, SETTINGS_BLOCK_SIZE,
};
use dfu_config::boot::BootloaderSettings;
use dfu_config::FlashLayout;
use dfu_engine::{AbortReason, DfuError, UpdateEngine, UpdateStatus};
use dfu_error::{code, ErrorCode};
use flash_storage::{FlashDriver, StorageManager};
use log::{debug, error, info, warn};

/// Terminal result of an update session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new image was received and the settings marking it valid are saved.
    Complete,
    Timeout,
    Reset,
}

/// One update session: the bootloader run state plus the update engine.
///
/// Transport events and flash completions are fed in from the platform
/// event loop until [`UpdateSession::outcome`] reports a terminal state.
pub struct UpdateSession<'a, F: FlashDriver, T: DfuTransport> {
    sm: StateMachine<UpdateContext<'a, F, T>>,
    engine: UpdateEngine,
}

impl<'a, F: FlashDriver, T: DfuTransport> UpdateSession<'a, F, T> {
    /// Registers the settings and image modules and opens the transport.
    pub fn start(
        storage: &'a mut StorageManager<F>,
        transport: &'a mut T,
        layout: &FlashLayout,
    ) -> Result<Self, BootError> {
        storage.init();
        let settings_block = storage.register(SETTINGS_BLOCK_SIZE, 1, None)?;
        if settings_block.address != layout.settings_address {
            error!(
                "Settings block at {:#x}, expected {:#x}",
                settings_block.address, layout.settings_address
            );
            return Err(BootError::SettingsAddress(settings_block.address));
        }

        let mut engine = UpdateEngine::new(layout);
        engine.init(storage)?;
        transport.open()?;
        info!("Update session started");

        Ok(Self {
            sm: StateMachine::new(UpdateContext::new(storage, transport, settings_block)),
            engine,
        })
    }

    pub fn state(&self) -> States {
        *self.sm.state()
    }

    pub fn engine(&self) -> &UpdateEngine {
        &self.engine
    }

    pub fn storage(&self) -> &StorageManager<F> {
        &*self.sm.context().storage
    }

    /// Storage access for the platform's flash interrupt path.
    pub fn storage_mut(&mut self) -> &mut StorageManager<F> {
        &mut *self.sm.context_mut().storage
    }

    /// Settings record as currently stored in flash.
    pub fn settings(&self) -> Result<BootloaderSettings, BootError> {
        self.sm.context().load_settings()
    }

    pub fn outcome(&self) -> Option<UpdateOutcome> {
        match self.sm.state() {
            States::Complete => Some(UpdateOutcome::Complete),
            States::Timeout => Some(UpdateOutcome::Timeout),
            States::Reset => Some(UpdateOutcome::Reset),
            States::Updating | States::SettingsSaving => None,
        }
    }

    /// Hands a transport event to the update engine and answers the peer.
    ///
    /// Rejected requests are reported to the peer and leave the session
    /// running; only failures to persist settings are returned.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Result<(), BootError> {
        debug!("Transport event: {:?}", event);
        let (request, result) = match event {
            TransportEvent::Timeout => {
                let status = self.engine.abort(AbortReason::Timeout);
                return self.report(status);
            }
            TransportEvent::Reset => {
                let status = self.engine.abort(AbortReason::Reset);
                return self.report(status);
            }
            TransportEvent::ImageSize(size) => {
                let storage = &mut *self.sm.context_mut().storage;
                (
                    DfuRequest::ImageSize,
                    self.engine.declare_image_size(storage, size).map(Some),
                )
            }
            TransportEvent::InitPacket(packet) => (
                DfuRequest::InitPacket,
                self.engine.handle_metadata_packet(&packet).map(|_| None),
            ),
            TransportEvent::DataPacket(packet) => {
                let storage = &mut *self.sm.context_mut().storage;
                (
                    DfuRequest::DataPacket,
                    self.engine.handle_data_packet(storage, &packet).map(|_| None),
                )
            }
            TransportEvent::Validate => {
                let storage = &*self.sm.context().storage;
                (
                    DfuRequest::Validate,
                    self.engine.validate(storage).map(|_| None),
                )
            }
            TransportEvent::Activate => (DfuRequest::Activate, self.engine.activate().map(Some)),
        };

        self.respond(request, result.map(|_| ()));
        match result {
            Ok(Some(status)) => self.report(status),
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(
                    "{:?} rejected: {} (code {}, {:?})",
                    request,
                    e,
                    e.code(),
                    e.category()
                );
                Ok(())
            }
        }
    }

    /// Dispatches finished flash operations.
    ///
    /// A failed write or erase ends the session with `BootError::Flash`:
    /// there is no safe point to resume from.
    pub fn process_flash_events(&mut self) -> Result<(), BootError> {
        while let Some(event) = self.sm.context_mut().storage.process_completion() {
            if let Err(e) = event.result {
                error!(
                    "Flash {:?} of {:?} at {:#x} failed: {}",
                    event.op, event.module, event.address, e
                );
                return Err(BootError::Flash(e));
            }

            if self.sm.context().settings_write == Some(event.token) {
                if self.state() == States::SettingsSaving {
                    self.dispatch(Events::SettingsStored)?;
                } else {
                    self.sm.context_mut().settings_write = None;
                }
                continue;
            }

            if let Some(written) = self.engine.on_storage_event(&event) {
                if let Err(e) = self.sm.context_mut().transport.packet_written(&written) {
                    warn!("Receipt for offset {:#x} not sent: {}", written.offset, e);
                }
            }
        }
        Ok(())
    }

    fn respond(&mut self, request: DfuRequest, result: Result<(), DfuError>) {
        let status = match result {
            Ok(()) => code::SUCCESS,
            Err(e) => e.code(),
        };
        if let Err(e) = self.sm.context_mut().transport.respond(request, status) {
            warn!("Response to {:?} not sent: {}", request, e);
        }
    }

    fn report(&mut self, status: UpdateStatus) -> Result<(), BootError> {
        let event = match status {
            UpdateStatus::BankErased(bank) => Events::BankErased(bank),
            UpdateStatus::Complete { crc, size } => Events::UpdateComplete(ImageInfo { crc, size }),
            UpdateStatus::Timeout => Events::TransportTimeout,
            UpdateStatus::Reset => Events::TransportReset,
        };
        self.dispatch(event)
    }

    fn dispatch(&mut self, event: Events) -> Result<(), BootError> {
        let from = self.state();
        if self.sm.process_event(event.clone()).is_ok() {
            debug!("Update state: {:?} -> {:?}", from, self.state());
            return Ok(());
        }
        match self.sm.context_mut().failure.take() {
            Some(e) => Err(e),
            None => {
                warn!("Ignoring {:?} in state {:?}", event, from);
                Ok(())
            }
        }
    }
}
