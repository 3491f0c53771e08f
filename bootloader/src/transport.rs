// Licensed under the Apache-2.0 license

//! Seams to the radio/serial transport and the platform event loop.

use dfu_engine::{DfuPacket, PacketWritten};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport not open")]
    NotOpen,
    #[error("transport timed out")]
    Timeout,
}

/// Requests the peer expects a status response for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuRequest {
    ImageSize,
    InitPacket,
    DataPacket,
    Validate,
    Activate,
}

/// Events delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ImageSize(u32),
    InitPacket(DfuPacket),
    DataPacket(DfuPacket),
    Validate,
    Activate,
    /// The link went quiet for longer than the transport allows.
    Timeout,
    /// The peer asked for the session to be dropped.
    Reset,
}

pub trait DfuTransport {
    /// Starts advertising / listening for an update peer.
    fn open(&mut self) -> Result<(), TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;

    /// Reports the status of a request back to the peer: `code::SUCCESS`
    /// or the `ErrorCode::code` of the rejection.
    fn respond(&mut self, request: DfuRequest, status: u32) -> Result<(), TransportError>;

    /// Receipt notification for an image write the flash has confirmed.
    fn packet_written(&mut self, written: &PacketWritten) -> Result<(), TransportError>;
}

/// The platform's cooperative event loop.
pub trait EventPump {
    /// Sleeps until the next hardware event (flash or radio) has been queued.
    fn wait_for_event(&mut self);

    /// Next queued transport event, if any.
    fn next_event(&mut self) -> Option<TransportEvent>;
}
