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

use crate::{error::format_error, Result};

/// Universal tag numbers understood by this crate.
pub mod universal {
    /// `BOOLEAN`
    pub const BOOLEAN: u32 = 1;
    /// `INTEGER`
    pub const INTEGER: u32 = 2;
    /// `BIT STRING`
    pub const BIT_STRING: u32 = 3;
    /// `OCTET STRING`
    pub const OCTET_STRING: u32 = 4;
    /// `NULL`
    pub const NULL: u32 = 5;
    /// `OBJECT IDENTIFIER`
    pub const OBJECT_IDENTIFIER: u32 = 6;
    /// `ENUMERATED`
    pub const ENUMERATED: u32 = 10;
    /// `UTF8String`
    pub const UTF8_STRING: u32 = 12;
    /// `SEQUENCE` and `SEQUENCE OF`
    pub const SEQUENCE: u32 = 16;
    /// `SET` and `SET OF`
    pub const SET: u32 = 17;
    /// `NumericString`
    pub const NUMERIC_STRING: u32 = 18;
    /// `PrintableString`
    pub const PRINTABLE_STRING: u32 = 19;
    /// `TeletexString`
    pub const TELETEX_STRING: u32 = 20;
    /// `IA5String`
    pub const IA5_STRING: u32 = 22;
    /// `UTCTime`
    pub const UTC_TIME: u32 = 23;
    /// `GeneralizedTime`
    pub const GENERALIZED_TIME: u32 = 24;
    /// `VisibleString`
    pub const VISIBLE_STRING: u32 = 26;
    /// `UniversalString`
    pub const UNIVERSAL_STRING: u32 = 28;
    /// `BMPString`
    pub const BMP_STRING: u32 = 30;
}

const CONSTRUCTED_BIT: u8 = 0x20;
const HIGH_TAG_MARKER: u8 = 0x1f;
const LONG_LENGTH_BIT: u8 = 0x80;

/// The class bits of an identifier octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagClass {
    /// Types defined by X.680 itself.
    Universal,
    /// Types defined by an application specification.
    Application,
    /// `[n]` tags scoped to the enclosing type.
    ContextSpecific,
    /// Private-use types.
    Private,
}

impl TagClass {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Universal,
            1 => Self::Application,
            2 => Self::ContextSpecific,
            _ => Self::Private,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Universal => 0,
            Self::Application => 1,
            Self::ContextSpecific => 2,
            Self::Private => 3,
        }
    }
}

/// Whether the contents octets hold a value directly or further encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// The contents are the value itself.
    Primitive,
    /// The contents are a concatenation of encodings.
    Constructed,
}

/// A decoded identifier: class, primitive/constructed bit and tag number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identifier {
    /// The tag class.
    pub class: TagClass,
    /// The encoding form.
    pub encoding: Encoding,
    /// The tag number.
    pub tag: u32,
}

impl Identifier {
    /// Identifier of a universal type.
    pub const fn universal(tag: u32, encoding: Encoding) -> Self {
        Self {
            class: TagClass::Universal,
            encoding,
            tag,
        }
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        let mut first = self.class.bits() << 6;
        if self.encoding == Encoding::Constructed {
            first |= CONSTRUCTED_BIT;
        }

        if self.tag < u32::from(HIGH_TAG_MARKER) {
            // The cast is fine, the tag is below 31.
            out.push(first | self.tag as u8);
            return;
        }

        out.push(first | HIGH_TAG_MARKER);
        write_base128(u64::from(self.tag), out);
    }
}

/// Writes `value` in base 128, most significant group first, with the continuation bit set on all
/// but the last octet.
pub(crate) fn write_base128(value: u64, out: &mut Vec<u8>) {
    let mut groups = vec![(value & 0x7f) as u8];
    let mut rest = value >> 7;
    while rest > 0 {
        groups.push(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    out.extend(groups.iter().rev());
}

/// Writes a definite length in the shortest form.
pub(crate) fn write_length(length: usize, out: &mut Vec<u8>) {
    if length < usize::from(LONG_LENGTH_BIT) {
        out.push(length as u8);
        return;
    }

    let bytes = length.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    out.push(LONG_LENGTH_BIT | significant.len() as u8);
    out.extend_from_slice(significant);
}

/// A cursor over DER input.
pub(crate) struct Reader<'a> {
    input: &'a [u8],
    position: usize,
}

/// One decoded tag-length-value triple, borrowing the contents.
#[derive(Debug)]
pub(crate) struct Tlv<'a> {
    pub(crate) identifier: Identifier,
    pub(crate) contents: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        Self { input, position: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.position >= self.input.len()
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    fn next_byte(&mut self) -> Result<u8> {
        let byte = *self
            .input
            .get(self.position)
            .ok_or_else(|| format_error(format!("unexpected end of input at {}", self.position)))?;
        self.position += 1;
        Ok(byte)
    }

    fn take(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(length)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| {
                format_error(format!(
                    "length {length} at offset {} exceeds the input",
                    self.position
                ))
            })?;
        let slice = &self.input[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn read_identifier(&mut self) -> Result<Identifier> {
        let first = self.next_byte()?;
        let class = TagClass::from_bits(first >> 6);
        let encoding = if first & CONSTRUCTED_BIT != 0 {
            Encoding::Constructed
        } else {
            Encoding::Primitive
        };

        let mut tag = u32::from(first & HIGH_TAG_MARKER);
        if tag == u32::from(HIGH_TAG_MARKER) {
            tag = 0;
            loop {
                let byte = self.next_byte()?;
                if tag > (u32::MAX >> 7) {
                    return Err(format_error("tag number does not fit into 32 bits"));
                }
                tag = (tag << 7) | u32::from(byte & 0x7f);
                if byte & 0x80 == 0 {
                    break;
                }
            }
        }

        Ok(Identifier {
            class,
            encoding,
            tag,
        })
    }

    fn read_length(&mut self) -> Result<usize> {
        let first = self.next_byte()?;
        if first & LONG_LENGTH_BIT == 0 {
            return Ok(usize::from(first));
        }

        let count = usize::from(first & !LONG_LENGTH_BIT);
        if count == 0 {
            return Err(format_error("indefinite length is not allowed in DER"));
        }
        if count > std::mem::size_of::<usize>() {
            return Err(format_error(format!("length of {count} octets is too large")));
        }

        let mut length = 0usize;
        for index in 0..count {
            let byte = self.next_byte()?;
            if index == 0 && byte == 0 {
                return Err(format_error("long form length has a leading zero octet"));
            }
            length = (length << 8) | usize::from(byte);
        }
        if length < usize::from(LONG_LENGTH_BIT) {
            return Err(format_error(format!(
                "length {length} must use the short form"
            )));
        }
        Ok(length)
    }

    pub(crate) fn read_tlv(&mut self) -> Result<Tlv<'a>> {
        let identifier = self.read_identifier()?;
        let length = self.read_length()?;
        let contents = self.take(length)?;
        Ok(Tlv {
            identifier,
            contents,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::Asn1Error;

    fn identifier_bytes(identifier: Identifier) -> Vec<u8> {
        let mut out = Vec::new();
        identifier.write(&mut out);
        out
    }

    #[test]
    fn low_tags_use_a_single_octet() {
        let sequence = Identifier::universal(universal::SEQUENCE, Encoding::Constructed);
        assert_eq!(identifier_bytes(sequence), [0x30]);

        let explicit = Identifier {
            class: TagClass::ContextSpecific,
            encoding: Encoding::Constructed,
            tag: 3,
        };
        assert_eq!(identifier_bytes(explicit), [0xa3]);
    }

    #[test]
    fn high_tags_use_base128() {
        // Android key attestation uses context-specific tag 709 (attestationApplicationId).
        let identifier = Identifier {
            class: TagClass::ContextSpecific,
            encoding: Encoding::Constructed,
            tag: 709,
        };
        let bytes = identifier_bytes(identifier);
        assert_eq!(bytes, [0xbf, 0x85, 0x45]);

        let mut reader = Reader::new(&[0xbf, 0x85, 0x45, 0x00]);
        let tlv = reader.read_tlv().unwrap();
        assert_eq!(tlv.identifier, identifier);
        assert!(tlv.contents.is_empty());
    }

    #[test]
    fn lengths_use_the_minimal_form() {
        let cases: &[(usize, &[u8])] = &[
            (0, &[0x00]),
            (127, &[0x7f]),
            (128, &[0x81, 0x80]),
            (255, &[0x81, 0xff]),
            (256, &[0x82, 0x01, 0x00]),
            (65_536, &[0x83, 0x01, 0x00, 0x00]),
        ];

        for (length, expected) in cases {
            let mut out = Vec::new();
            write_length(*length, &mut out);
            assert_eq!(&out, expected, "length {length}");
        }
    }

    #[test]
    fn indefinite_length_is_rejected() {
        let mut reader = Reader::new(&[0x30, 0x80, 0x00, 0x00]);
        let err = reader.read_tlv().unwrap_err();
        assert_matches!(err.error, Asn1Error::Format(_));
    }

    #[test]
    fn non_minimal_lengths_are_rejected() {
        for input in [&[0x04, 0x81, 0x01, 0xaa][..], &[0x04, 0x82, 0x00, 0x01, 0xaa]] {
            let mut reader = Reader::new(input);
            let err = reader.read_tlv().unwrap_err();
            assert_matches!(err.error, Asn1Error::Format(_), "{input:02x?}");
        }

        let mut contents = vec![0x04, 0x81, 0x80];
        contents.extend_from_slice(&[0xaa; 128]);
        let tlv = Reader::new(&contents).read_tlv().unwrap();
        assert_eq!(tlv.contents.len(), 128);
    }

    #[test]
    fn truncated_contents_are_rejected() {
        let mut reader = Reader::new(&[0x04, 0x05, 0x01]);
        let err = reader.read_tlv().unwrap_err();
        assert_matches!(err.error, Asn1Error::Format(_));
    }
}
