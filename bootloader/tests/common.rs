// Licensed under the Apache-2.0 license
#![allow(dead_code)]

use dfu_bootloader::{
    AppHandoff, BootError, Bootloader, DfuRequest, DfuTransport, EventPump, TransportError,
    TransportEvent,
};
use dfu_config::FlashLayout;
use dfu_engine::{DfuPacket, PacketWritten, MAX_PACKET_WORDS};
use flash_storage::sim::RamFlash;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::collections::VecDeque;

pub const PACKET_BYTES: usize = MAX_PACKET_WORDS * 4;

pub fn init_logger() {
    let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();
}

/// Bootloader over an erased RAM flash covering the whole default layout.
pub fn setup_bootloader() -> Bootloader<RamFlash> {
    init_logger();
    let layout = FlashLayout::default();
    let flash = RamFlash::new(
        layout.flash_start(),
        layout.flash_end() - layout.flash_start(),
        layout.page_size,
    );
    Bootloader::new(flash, layout)
}

pub fn test_image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

/// Events of a complete transfer of `image`, carrying `crc` in the init packet.
pub fn update_script(image: &[u8], crc: u16) -> Vec<TransportEvent> {
    let mut events = vec![
        TransportEvent::ImageSize(image.len() as u32),
        TransportEvent::InitPacket(DfuPacket::from_words(&[crc as u32]).unwrap()),
    ];
    for chunk in image.chunks(PACKET_BYTES) {
        events.push(TransportEvent::DataPacket(
            DfuPacket::from_bytes(chunk).unwrap(),
        ));
    }
    events.push(TransportEvent::Validate);
    events.push(TransportEvent::Activate);
    events
}

#[derive(Default)]
pub struct MockTransport {
    pub opened: bool,
    pub closed: bool,
    pub responses: Vec<(DfuRequest, u32)>,
    pub written: Vec<PacketWritten>,
}

impl MockTransport {
    /// Status codes sent for `request`, in order.
    pub fn responses_to(&self, request: DfuRequest) -> Vec<u32> {
        self.responses
            .iter()
            .filter(|(r, _)| *r == request)
            .map(|(_, status)| *status)
            .collect()
    }
}

impl DfuTransport for MockTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.opened {
            return Err(TransportError::NotOpen);
        }
        self.closed = true;
        Ok(())
    }

    fn respond(&mut self, request: DfuRequest, status: u32) -> Result<(), TransportError> {
        self.responses.push((request, status));
        Ok(())
    }

    fn packet_written(&mut self, written: &PacketWritten) -> Result<(), TransportError> {
        self.written.push(*written);
        Ok(())
    }
}

/// Delivers a fixed list of transport events, a few per wake-up.
pub struct ScriptedPump {
    script: VecDeque<TransportEvent>,
    ready: VecDeque<TransportEvent>,
    burst: usize,
}

impl ScriptedPump {
    pub fn new(script: Vec<TransportEvent>) -> Self {
        Self {
            script: script.into(),
            ready: VecDeque::new(),
            burst: 3,
        }
    }
}

impl EventPump for ScriptedPump {
    fn wait_for_event(&mut self) {
        if self.script.is_empty() {
            panic!("Bootloader waiting for an event after the script ended");
        }
        for _ in 0..self.burst {
            match self.script.pop_front() {
                Some(event) => self.ready.push_back(event),
                None => break,
            }
        }
    }

    fn next_event(&mut self) -> Option<TransportEvent> {
        self.ready.pop_front()
    }
}

#[derive(Default)]
pub struct MockHandoff {
    pub fail_stack_disable: bool,
    pub interrupts_disabled: bool,
}

impl AppHandoff for MockHandoff {
    fn disable_stack(&mut self) -> Result<(), BootError> {
        if self.fail_stack_disable {
            Err(BootError::StackDisable)
        } else {
            Ok(())
        }
    }

    fn disable_interrupts(&mut self) {
        self.interrupts_disabled = true;
    }

    fn jump(&mut self, address: u32) -> ! {
        assert!(self.interrupts_disabled);
        panic!("jump to {:#x}", address);
    }
}
