// Licensed under the Apache-2.0 license

use anyhow::{bail, Context, Result};
use dfu_engine::crc::crc16_compute;
use std::path::Path;

/// Builds the init packet for `image`: a single little-endian word whose low
/// half is the CRC-16 the bootloader checks the received image against.
pub(crate) fn build(image: &[u8], no_crc: bool) -> Result<Vec<u8>> {
    if image.is_empty() {
        bail!("image is empty");
    }
    if image.len() % 4 != 0 {
        bail!(
            "image length {} is not a multiple of 4 bytes; pad it before transfer",
            image.len()
        );
    }
    let crc = if no_crc { 0 } else { crc16_compute(image) };
    Ok(u32::from(crc).to_le_bytes().to_vec())
}

pub(crate) fn create(image: &Path, output: &Path, no_crc: bool) -> Result<()> {
    let data = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let packet = build(&data, no_crc)?;
    std::fs::write(output, &packet).with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Init packet for {} ({} bytes, CRC {:#06x}) written to {}",
        image.display(),
        data.len(),
        u16::from_le_bytes([packet[0], packet[1]]),
        output.display()
    );
    Ok(())
}
