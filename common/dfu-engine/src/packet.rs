// Licensed under the Apache-2.0 license

use crate::error::DfuError;
use zerocopy::IntoBytes;

/// Largest packet the transport delivers, in words.
pub const MAX_PACKET_WORDS: usize = 64;

/// Init or data packet as handed over by the transport.
///
/// Payloads are whole words, so the byte view is always word aligned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfuPacket {
    words: [u32; MAX_PACKET_WORDS],
    len: usize,
}

impl DfuPacket {
    pub fn from_words(words: &[u32]) -> Result<Self, DfuError> {
        if words.len() > MAX_PACKET_WORDS {
            return Err(DfuError::DataSize);
        }
        let mut packet = DfuPacket {
            words: [0; MAX_PACKET_WORDS],
            len: words.len(),
        };
        packet.words[..words.len()].copy_from_slice(words);
        Ok(packet)
    }

    /// Builds a packet from a little-endian byte payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DfuError> {
        if bytes.len() % 4 != 0 {
            return Err(DfuError::InvalidLength);
        }
        if bytes.len() > MAX_PACKET_WORDS * 4 {
            return Err(DfuError::DataSize);
        }
        let mut packet = DfuPacket {
            words: [0; MAX_PACKET_WORDS],
            len: bytes.len() / 4,
        };
        for (word, chunk) in packet.words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(packet)
    }

    pub fn words(&self) -> &[u32] {
        &self.words[..self.len]
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.words().as_bytes()
    }

    /// Payload length in words.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_len(&self) -> u32 {
        (self.len * 4) as u32
    }
}
