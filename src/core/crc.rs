//! Frame checksums for the supported technologies.
//!
//! All three are 16-bit CRCs over the reflected CCITT polynomial and are
//! transmitted least significant byte first. They differ in the initial
//! register value and in whether the result is complemented.

use crate::core::bit_buffer::BitBuffer;
use crate::core::error::FrameError;
use crate::core::session::Technology;

const CRC_POLY_REFLECTED: u16 = 0x8408;

const CRC_A_INIT: u16 = 0x6363;
const CRC_B_INIT: u16 = 0xFFFF;
const CRC_13239_INIT: u16 = 0xFFFF;

/// Length of every checksum appended by [`append_crc`]
pub const CRC_LEN: usize = 2;

fn crc16_reflected(init: u16, data: &[u8]) -> u16 {
    let mut crc = init;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC_POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// ISO/IEC 14443-3 CRC_A
pub fn crc_a(data: &[u8]) -> u16 {
    crc16_reflected(CRC_A_INIT, data)
}

/// ISO/IEC 14443-3 CRC_B
pub fn crc_b(data: &[u8]) -> u16 {
    !crc16_reflected(CRC_B_INIT, data)
}

/// ISO/IEC 13239 CRC used by ISO 15693
pub fn crc_iso13239(data: &[u8]) -> u16 {
    !crc16_reflected(CRC_13239_INIT, data)
}

/// Checksum bytes for `data` in transmission order
pub fn checksum(technology: Technology, data: &[u8]) -> [u8; CRC_LEN] {
    let crc = match technology {
        Technology::Iso14443a => crc_a(data),
        Technology::Iso14443b => crc_b(data),
        Technology::Iso15693 => crc_iso13239(data),
    };
    crc.to_le_bytes()
}

/// Append the checksum of the active technology to `frame`.
///
/// Does nothing when no technology is selected and returns whether a
/// checksum was added. Every call appends, so a frame must only pass
/// through here once.
pub fn append_crc(frame: &mut BitBuffer, technology: Option<Technology>) -> Result<bool, FrameError> {
    let Some(technology) = technology else {
        log::debug!("No technology selected, CRC not appended");
        return Ok(false);
    };

    let crc = checksum(technology, frame.data());
    frame.append_bytes(&crc)?;
    log::debug!("Appended {} CRC {:02X}{:02X}", technology, crc[0], crc[1]);
    Ok(true)
}
