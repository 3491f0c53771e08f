// Licensed under the Apache-2.0 license

use crate::crc::crc16_region;
use crate::error::DfuError;
use crate::packet::DfuPacket;
use arrayvec::ArrayVec;
use dfu_config::boot::Bank;
use dfu_config::FlashLayout;
use flash_storage::{BlockHandle, FlashDriver, StorageEvent, StorageManager, StorageOp};
use log::{debug, error, info, warn};

/// Capacity of the init packet buffer, in words.
pub const INIT_PACKET_WORDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Timeout,
    Reset,
}

/// Progress reported to the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// The bank has been handed to the flash for erasing.
    BankErased(Bank),
    /// The image was validated and activated.
    Complete { crc: u16, size: u32 },
    Timeout,
    Reset,
}

/// An image write confirmed by the flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketWritten {
    pub offset: u32, // byte offset into the image
    pub len: u32,
}

pub type DataPacketCallback = fn(&PacketWritten);

/// Update session state. Each variant carries only what is valid in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuState {
    /// Not initialized, or the image bank could not be claimed.
    InitError,
    Idle,
    /// Image size declared and the bank erase issued.
    Ready { image_size: u32 },
    RxInitPkt { image_size: u32 },
    RxDataPkt { image_size: u32, received: u32 },
    /// The image did not match the init packet CRC.
    Validate { image_size: u32, crc: u16 },
    WaitForActivate { image_size: u32, crc: u16 },
    Complete { image_size: u32, crc: u16 },
    Aborted(AbortReason),
}

/// Single-bank update session.
///
/// Packets are written to bank 0 through the storage manager in arrival
/// order. The session only moves forward; after `activate` or `abort` it
/// accepts nothing until [`UpdateEngine::init`] is called again.
pub struct UpdateEngine {
    state: DfuState,
    bank_start: u32,
    bank_size: u32,
    image: Option<BlockHandle>,
    init_packet: ArrayVec<u32, INIT_PACKET_WORDS>,
    callback: Option<DataPacketCallback>,
}

impl UpdateEngine {
    pub fn new(layout: &FlashLayout) -> Self {
        UpdateEngine {
            state: DfuState::InitError,
            bank_start: layout.app_start,
            bank_size: layout.app_max_size,
            image: None,
            init_packet: ArrayVec::new(),
            callback: None,
        }
    }

    /// Claims bank 0 from the storage manager and starts a fresh session.
    pub fn init<F: FlashDriver, const N: usize>(
        &mut self,
        storage: &mut StorageManager<F, N>,
    ) -> Result<(), DfuError> {
        if self.image.is_none() {
            match storage.register_raw(self.bank_start, self.bank_size, None) {
                Ok(handle) => self.image = Some(handle),
                Err(e) => {
                    error!("DFU: cannot claim image bank: {}", e);
                    self.state = DfuState::InitError;
                    return Err(e.into());
                }
            }
        }
        self.init_packet.clear();
        self.state = DfuState::Idle;
        debug!(
            "DFU: idle, bank {:#x}..{:#x}",
            self.bank_start,
            self.bank_start + self.bank_size
        );
        Ok(())
    }

    pub fn state(&self) -> &DfuState {
        &self.state
    }

    /// Handle of the image bank, once claimed.
    pub fn image(&self) -> Option<&BlockHandle> {
        self.image.as_ref()
    }

    pub fn register_callback(&mut self, callback: DataPacketCallback) {
        self.callback = Some(callback);
    }

    /// Starts a transfer of `size` bytes.
    ///
    /// The bank is erased in full before any data is written. The erase is
    /// queued ahead of every later image write, so the session is ready for
    /// packets as soon as it has been issued.
    pub fn declare_image_size<F: FlashDriver, const N: usize>(
        &mut self,
        storage: &mut StorageManager<F, N>,
        size: u32,
    ) -> Result<UpdateStatus, DfuError> {
        if self.state != DfuState::Idle {
            return Err(DfuError::InvalidState);
        }
        if size > self.bank_size {
            return Err(DfuError::DataSize);
        }
        if size == 0 || size % 4 != 0 {
            return Err(DfuError::NotSupported);
        }
        let image = self.image.ok_or(DfuError::InvalidState)?;
        storage.clear(&image)?;

        self.init_packet.clear();
        self.state = DfuState::Ready { image_size: size };
        info!("DFU: image size {} accepted, bank 0 erasing", size);
        Ok(UpdateStatus::BankErased(Bank::Bank0))
    }

    /// Appends an init packet to the metadata buffer. Its first two bytes
    /// carry the expected CRC-16 of the image.
    pub fn handle_metadata_packet(&mut self, packet: &DfuPacket) -> Result<(), DfuError> {
        // Data always moves the session to RxDataPkt, so reaching the arms
        // below means no image byte has been written yet.
        let image_size = match self.state {
            DfuState::Ready { image_size } | DfuState::RxInitPkt { image_size } => image_size,
            _ => return Err(DfuError::InvalidState),
        };
        self.init_packet
            .try_extend_from_slice(packet.words())
            .map_err(|_| DfuError::DataSize)?;
        self.state = DfuState::RxInitPkt { image_size };
        debug!(
            "DFU: init packet, {} words buffered",
            self.init_packet.len()
        );
        Ok(())
    }

    /// Writes a data packet at the next image offset.
    ///
    /// The byte count advances once the write has been handed to the flash;
    /// its completion arrives later through [`UpdateEngine::on_storage_event`].
    pub fn handle_data_packet<F: FlashDriver, const N: usize>(
        &mut self,
        storage: &mut StorageManager<F, N>,
        packet: &DfuPacket,
    ) -> Result<(), DfuError> {
        let (image_size, received) = match self.state {
            DfuState::Ready { image_size } | DfuState::RxInitPkt { image_size } => (image_size, 0),
            DfuState::RxDataPkt {
                image_size,
                received,
            } => (image_size, received),
            _ => return Err(DfuError::InvalidState),
        };
        if packet.is_empty() {
            return Err(DfuError::InvalidLength);
        }
        let len = packet.byte_len();
        if received + len > image_size {
            warn!(
                "DFU: packet of {} bytes overruns image ({} of {} received)",
                len, received, image_size
            );
            return Err(DfuError::DataSize);
        }
        let image = self.image.ok_or(DfuError::InvalidState)?;
        storage.store(&image, packet.as_bytes(), len, received)?;

        self.state = DfuState::RxDataPkt {
            image_size,
            received: received + len,
        };
        Ok(())
    }

    /// Checks the received image against the init packet CRC.
    ///
    /// An init packet CRC of 0, or no init packet at all, skips the
    /// comparison. On mismatch the session stays in `Validate` until the
    /// bootloader aborts it.
    pub fn validate<F: FlashDriver, const N: usize>(
        &mut self,
        storage: &StorageManager<F, N>,
    ) -> Result<(), DfuError> {
        let DfuState::RxDataPkt {
            image_size,
            received,
        } = self.state
        else {
            return Err(DfuError::InvalidState);
        };
        if received != image_size {
            return Err(DfuError::InvalidState);
        }
        let image = self.image.ok_or(DfuError::InvalidState)?;
        if storage.pending_operations(image.module) > 0 {
            return Err(DfuError::Busy);
        }

        let crc = crc16_region(image_size, |offset, buf| {
            let len = buf.len() as u32;
            storage.load(buf, &image, len, offset)
        })?;
        match self.expected_crc() {
            Some(expected) if expected != crc => {
                error!(
                    "DFU: image CRC {:#06x} does not match expected {:#06x}",
                    crc, expected
                );
                self.state = DfuState::Validate { image_size, crc };
                Err(DfuError::InvalidData)
            }
            _ => {
                info!("DFU: image of {} bytes validated, CRC {:#06x}", image_size, crc);
                self.state = DfuState::WaitForActivate { image_size, crc };
                Ok(())
            }
        }
    }

    /// Reports the validated image to the bootloader. Flash is not touched.
    pub fn activate(&mut self) -> Result<UpdateStatus, DfuError> {
        let DfuState::WaitForActivate { image_size, crc } = self.state else {
            return Err(DfuError::InvalidState);
        };
        self.state = DfuState::Complete { image_size, crc };
        info!("DFU: image activated");
        Ok(UpdateStatus::Complete {
            crc,
            size: image_size,
        })
    }

    /// Ends the session. Nothing is accepted afterwards until `init`.
    pub fn abort(&mut self, reason: AbortReason) -> UpdateStatus {
        warn!("DFU: aborted in {:?}: {:?}", self.state, reason);
        self.state = DfuState::Aborted(reason);
        match reason {
            AbortReason::Timeout => UpdateStatus::Timeout,
            AbortReason::Reset => UpdateStatus::Reset,
        }
    }

    /// Forwards confirmed image writes to the data packet callback.
    pub fn on_storage_event(&mut self, event: &StorageEvent) -> Option<PacketWritten> {
        let image = self.image?;
        if event.module != image.module
            || event.op != StorageOp::Store
            || event.result.is_err()
            || !matches!(self.state, DfuState::RxDataPkt { .. })
        {
            return None;
        }
        let written = PacketWritten {
            offset: event.address - image.address,
            len: event.len,
        };
        if let Some(callback) = self.callback {
            callback(&written);
        }
        Some(written)
    }

    /// Expected CRC from the init packet, if one was requested.
    fn expected_crc(&self) -> Option<u16> {
        let word = self.init_packet.first()?.to_le_bytes();
        match u16::from_le_bytes([word[0], word[1]]) {
            0 => None,
            crc => Some(crc),
        }
    }
}
