//! Common parsing utilities

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader};

use super::DecodeError;

pub type RbspReader<'a> = BitReader<&'a [u8], BigEndian>;

pub fn rbsp_reader(rbsp: &[u8]) -> RbspReader<'_> {
    BitReader::endian(rbsp, BigEndian)
}

/// Unsigned Exp-Golomb decoder
pub fn ue<R: io::Read>(br: &mut BitReader<R, BigEndian>) -> Result<u32, DecodeError> {
    let mut zeros = 0u32;
    while !br.read_bit()? {
        zeros += 1;
        if zeros > 31 {
            return Err(DecodeError::invalid("exp-golomb code longer than 32 bits"));
        }
    }
    if zeros == 0 {
        return Ok(0);
    }
    let rest = br.read_var::<u32>(zeros)?;
    Ok(((1u64 << zeros) - 1 + rest as u64) as u32)
}

/// Signed Exp-Golomb decoder
pub fn se<R: io::Read>(br: &mut BitReader<R, BigEndian>) -> Result<i32, DecodeError> {
    let k = ue(br)? as i64;
    let v = if k & 1 == 0 { -(k / 2) } else { (k + 1) / 2 };
    Ok(v as i32)
}

/// Remove emulation prevention bytes (0x000003)
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        v.push(b);
    }
    v
}

/// Split an Annex-B byte stream into NAL units (start codes and trailing
/// zero bytes removed). Data before the first start code is ignored.
pub fn split_nalus(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
            starts.push((i, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nalus = Vec::with_capacity(starts.len());
    for (n, &(_, begin)) in starts.iter().enumerate() {
        let mut end = starts.get(n + 1).map_or(data.len(), |&(code, _)| code);
        while end > begin && data[end - 1] == 0x00 {
            end -= 1;
        }
        if end > begin {
            nalus.push(&data[begin..end]);
        }
    }
    nalus
}

/// `units * unit_size` minus the cropped `crop_unit`s, or an error when the
/// stream values overflow `u32`.
pub fn cropped_size(
    units: u32,
    unit_size: u32,
    crop: (u32, u32),
    crop_unit: u32,
    what: &str,
) -> Result<u32, DecodeError> {
    let full = units.checked_mul(unit_size);
    let cropped = crop
        .0
        .checked_add(crop.1)
        .and_then(|c| c.checked_mul(crop_unit));
    match (full, cropped) {
        (Some(full), Some(cropped)) => Ok(full.saturating_sub(cropped)),
        _ => Err(DecodeError::invalid(format!("{what} out of range"))),
    }
}

/// Number of bits needed to represent `value`.
pub fn bit_width(value: u32) -> u32 {
    32 - value.leading_zeros()
}
