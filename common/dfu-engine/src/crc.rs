// Licensed under the Apache-2.0 license

//! CRC-16/CCITT (poly 0x1021, init 0xFFFF, unreflected, no final xor).
//! Used for init packet checksums and for the boot-time image check.

use crc::{Crc, CRC_16_IBM_3740};
use zerocopy::IntoBytes;

pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

const CHUNK_WORDS: usize = 64;

pub fn crc16_compute(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// CRC-16 of `len` bytes fetched through `read(offset, buf)` in word-aligned chunks.
pub fn crc16_region<E>(
    len: u32,
    mut read: impl FnMut(u32, &mut [u8]) -> Result<(), E>,
) -> Result<u16, E> {
    let mut digest = CRC16.digest();
    let mut chunk = [0u32; CHUNK_WORDS];
    let mut offset = 0;
    while offset < len {
        let n = (len - offset).min((CHUNK_WORDS * 4) as u32);
        let bytes = &mut chunk.as_mut_bytes()[..n as usize];
        read(offset, bytes)?;
        digest.update(bytes);
        offset += n;
    }
    Ok(digest.finalize())
}
