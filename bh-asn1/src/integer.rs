// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::{error::format_error, Asn1Error, Result};

/// Encodes `value` as the contents octets of a DER `INTEGER`: big-endian two's complement in the
/// fewest octets that still carry the sign.
pub fn der_encode_i64(value: i64) -> Vec<u8> {
    minimal_twos_complement(&value.to_be_bytes()).to_vec()
}

/// Decodes the contents octets of an `INTEGER` into an [`i64`].
///
/// Non-minimal encodings are accepted.  A 9 octet input is accepted only when its first octet is
/// pure sign extension of the remaining eight; anything longer fails with
/// [`Asn1Error::Overflow`].
pub fn der_decode_i64(bytes: &[u8]) -> Result<i64> {
    let (first, _) = bytes
        .split_first()
        .ok_or_else(|| format_error("INTEGER has no contents octets"))?;

    let bytes = match bytes.len() {
        0..=8 => bytes,
        9 => {
            let sign = if bytes[1] & 0x80 != 0 { 0xff } else { 0x00 };
            if *first != sign {
                return Err(bherror::Error::root(Asn1Error::Overflow));
            }
            &bytes[1..]
        }
        _ => return Err(bherror::Error::root(Asn1Error::Overflow)),
    };

    let fill = if bytes[0] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buffer = [fill; 8];
    buffer[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(i64::from_be_bytes(buffer))
}

/// Strips redundant leading `0x00`/`0xff` octets from a two's complement big-endian number.
pub(crate) fn minimal_twos_complement(bytes: &[u8]) -> &[u8] {
    let mut start = 0;
    while start + 1 < bytes.len() {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    &bytes[start..]
}

/// Encodes an unsigned big-endian magnitude as `INTEGER` contents, prefixing `0x00` when the high
/// bit is set.
pub(crate) fn unsigned_to_twos_complement(magnitude: &[u8]) -> Vec<u8> {
    let skip = magnitude
        .iter()
        .take_while(|b| **b == 0)
        .count()
        .min(magnitude.len().saturating_sub(1));
    let magnitude = &magnitude[skip..];

    match magnitude.first() {
        None => vec![0],
        Some(first) if first & 0x80 != 0 => {
            let mut out = Vec::with_capacity(magnitude.len() + 1);
            out.push(0);
            out.extend_from_slice(magnitude);
            out
        }
        Some(_) => magnitude.to_vec(),
    }
}
