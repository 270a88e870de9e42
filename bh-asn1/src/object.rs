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

use bherror::traits::ErrorContext as _;
use chrono::{DateTime, Utc};

use crate::{
    error::format_error,
    integer::{der_decode_i64, der_encode_i64, unsigned_to_twos_complement},
    tag::{universal, write_length, Reader, Tlv},
    time::{decode_time, encode_time},
    Encoding, Identifier, Oid, Result, TagClass, TimeTag,
};

/// Distinguishes `INTEGER` from `ENUMERATED`, which share the integer representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerTag {
    /// `INTEGER`
    Integer,
    /// `ENUMERATED`
    Enumerated,
}

/// The character string types, each with its own universal tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringTag {
    /// `UTF8String`
    Utf8,
    /// `NumericString`
    Numeric,
    /// `PrintableString`
    Printable,
    /// `TeletexString`, treated as ISO 8859-1.
    Teletex,
    /// `IA5String`
    Ia5,
    /// `VisibleString`
    Visible,
    /// `UniversalString`, UCS-4 big-endian.
    Universal,
    /// `BMPString`, UCS-2 big-endian.
    Bmp,
}

impl StringTag {
    fn from_tag(tag: u32) -> Option<Self> {
        let kind = match tag {
            universal::UTF8_STRING => Self::Utf8,
            universal::NUMERIC_STRING => Self::Numeric,
            universal::PRINTABLE_STRING => Self::Printable,
            universal::TELETEX_STRING => Self::Teletex,
            universal::IA5_STRING => Self::Ia5,
            universal::VISIBLE_STRING => Self::Visible,
            universal::UNIVERSAL_STRING => Self::Universal,
            universal::BMP_STRING => Self::Bmp,
            _ => return None,
        };
        Some(kind)
    }

    /// The universal tag number of this string type.
    pub fn tag(self) -> u32 {
        match self {
            Self::Utf8 => universal::UTF8_STRING,
            Self::Numeric => universal::NUMERIC_STRING,
            Self::Printable => universal::PRINTABLE_STRING,
            Self::Teletex => universal::TELETEX_STRING,
            Self::Ia5 => universal::IA5_STRING,
            Self::Visible => universal::VISIBLE_STRING,
            Self::Universal => universal::UNIVERSAL_STRING,
            Self::Bmp => universal::BMP_STRING,
        }
    }

    fn encode(self, value: &str) -> Vec<u8> {
        match self {
            Self::Teletex => value
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Self::Universal => value
                .chars()
                .flat_map(|c| u32::from(c).to_be_bytes())
                .collect(),
            Self::Bmp => value.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            _ => value.as_bytes().to_vec(),
        }
    }

    fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            Self::Teletex => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
            Self::Universal => {
                if bytes.len() % 4 != 0 {
                    return Err(format_error("UniversalString length is not a multiple of 4"));
                }
                bytes
                    .chunks_exact(4)
                    .map(|chunk| {
                        let code = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                        char::from_u32(code)
                            .ok_or_else(|| format_error("invalid UniversalString code point"))
                    })
                    .collect()
            }
            Self::Bmp => {
                if bytes.len() % 2 != 0 {
                    return Err(format_error("BMPString length is not a multiple of 2"));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                    .collect();
                String::from_utf16(&units).map_err(|_| format_error("invalid BMPString"))
            }
            _ => String::from_utf8(bytes.to_vec())
                .map_err(|_| format_error(format!("{self:?} string is not valid UTF-8"))),
        }
    }
}

/// A decoded ASN.1 value.
///
/// Once built, a value is never mutated; encoding it with [`encode`] and decoding the result with
/// [`decode`] yields an equal value.  The one exception is a hand-built [`TimeTag::UtcTime`] value
/// with fractional seconds, which `UTCTime` cannot express; [`Asn1Object::time`] never builds one.
#[derive(Debug, Clone, PartialEq)]
pub enum Asn1Object {
    /// `BOOLEAN`
    Boolean(bool),
    /// `INTEGER` or `ENUMERATED`, kept as two's complement contents octets of any length.
    Integer {
        /// Which of the two universal tags is used.
        tag: IntegerTag,
        /// Big-endian two's complement value.
        value: Vec<u8>,
    },
    /// `NULL`
    Null,
    /// `OBJECT IDENTIFIER`
    ObjectIdentifier(Oid),
    /// `OCTET STRING`
    OctetString(Vec<u8>),
    /// `BIT STRING`
    BitString {
        /// Number of padding bits in the last octet, `0..=7`.
        unused_bits: u8,
        /// The octets carrying the bits.
        value: Vec<u8>,
    },
    /// `SEQUENCE` / `SEQUENCE OF`
    Sequence(Vec<Asn1Object>),
    /// `SET` / `SET OF`, kept in the order given.
    Set(Vec<Asn1Object>),
    /// One of the character string types.
    String {
        /// The string type.
        tag: StringTag,
        /// The decoded text.
        value: String,
    },
    /// `UTCTime` or `GeneralizedTime`.
    Time {
        /// The time type.
        tag: TimeTag,
        /// The instant.
        value: DateTime<Utc>,
    },
    /// A value of application, context-specific or private class.  The contents are left opaque;
    /// for constructed values they are the encodings of the inner values.
    Tagged {
        /// The tag class, never [`TagClass::Universal`].
        class: TagClass,
        /// The encoding form.
        encoding: Encoding,
        /// The tag number.
        tag: u32,
        /// The contents octets.
        contents: Vec<u8>,
    },
    /// A universal value this crate does not interpret, preserved verbatim.
    Raw {
        /// The identifier as found in the input.
        identifier: Identifier,
        /// The contents octets.
        contents: Vec<u8>,
    },
}

impl Asn1Object {
    /// An `INTEGER` holding `value`.
    pub fn integer(value: i64) -> Self {
        Self::Integer {
            tag: IntegerTag::Integer,
            value: der_encode_i64(value),
        }
    }

    /// An `ENUMERATED` holding `value`.
    pub fn enumerated(value: i64) -> Self {
        Self::Integer {
            tag: IntegerTag::Enumerated,
            value: der_encode_i64(value),
        }
    }

    /// A non-negative `INTEGER` from its big-endian magnitude, e.g. a certificate serial number.
    pub fn unsigned_integer(magnitude: &[u8]) -> Self {
        Self::Integer {
            tag: IntegerTag::Integer,
            value: unsigned_to_twos_complement(magnitude),
        }
    }

    /// A `UTF8String`.
    pub fn utf8_string(value: impl Into<String>) -> Self {
        Self::String {
            tag: StringTag::Utf8,
            value: value.into(),
        }
    }

    /// A time value with the tag chosen from the year, see [`TimeTag::for_instant`].
    pub fn time(value: DateTime<Utc>) -> Self {
        Self::Time {
            tag: TimeTag::for_instant(&value),
            value,
        }
    }

    /// A context-specific value explicitly wrapping `inner`, i.e. `[tag] EXPLICIT`.
    pub fn explicit(tag: u32, inner: &Asn1Object) -> Self {
        Self::Tagged {
            class: TagClass::ContextSpecific,
            encoding: Encoding::Constructed,
            tag,
            contents: encode(inner),
        }
    }

    /// The identifier this value is encoded with.
    pub fn identifier(&self) -> Identifier {
        use Encoding::{Constructed, Primitive};

        match self {
            Self::Boolean(_) => Identifier::universal(universal::BOOLEAN, Primitive),
            Self::Integer {
                tag: IntegerTag::Integer,
                ..
            } => Identifier::universal(universal::INTEGER, Primitive),
            Self::Integer {
                tag: IntegerTag::Enumerated,
                ..
            } => Identifier::universal(universal::ENUMERATED, Primitive),
            Self::Null => Identifier::universal(universal::NULL, Primitive),
            Self::ObjectIdentifier(_) => {
                Identifier::universal(universal::OBJECT_IDENTIFIER, Primitive)
            }
            Self::OctetString(_) => Identifier::universal(universal::OCTET_STRING, Primitive),
            Self::BitString { .. } => Identifier::universal(universal::BIT_STRING, Primitive),
            Self::Sequence(_) => Identifier::universal(universal::SEQUENCE, Constructed),
            Self::Set(_) => Identifier::universal(universal::SET, Constructed),
            Self::String { tag, .. } => Identifier::universal(tag.tag(), Primitive),
            Self::Time {
                tag: TimeTag::UtcTime,
                ..
            } => Identifier::universal(universal::UTC_TIME, Primitive),
            Self::Time {
                tag: TimeTag::GeneralizedTime,
                ..
            } => Identifier::universal(universal::GENERALIZED_TIME, Primitive),
            Self::Tagged {
                class,
                encoding,
                tag,
                ..
            } => Identifier {
                class: *class,
                encoding: *encoding,
                tag: *tag,
            },
            Self::Raw { identifier, .. } => *identifier,
        }
    }

    /// The value of an `INTEGER`/`ENUMERATED` as [`i64`].
    ///
    /// Returns `Ok(None)` for other variants and fails with
    /// [`Asn1Error::Overflow`][crate::Asn1Error::Overflow] for values wider than 64 bits.
    pub fn as_i64(&self) -> Result<Option<i64>> {
        match self {
            Self::Integer { value, .. } => der_decode_i64(value).map(Some),
            _ => Ok(None),
        }
    }

    /// The elements of a `SEQUENCE` or `SET`.
    pub fn as_elements(&self) -> Option<&[Asn1Object]> {
        match self {
            Self::Sequence(elements) | Self::Set(elements) => Some(elements),
            _ => None,
        }
    }

    /// The text of any string type.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Decodes the contents of a [`Asn1Object::Tagged`] value as a concatenation of DER values.
    ///
    /// Returns [`None`] for other variants.
    pub fn tagged_contents(&self) -> Option<Result<Vec<Asn1Object>>> {
        match self {
            Self::Tagged { contents, .. } => Some(decode_multiple(contents)),
            _ => None,
        }
    }

    fn contents(&self) -> Vec<u8> {
        match self {
            Self::Boolean(value) => vec![if *value { 0xff } else { 0x00 }],
            Self::Integer { value, .. } => value.clone(),
            Self::Null => Vec::new(),
            Self::ObjectIdentifier(oid) => oid.encode_contents(),
            Self::OctetString(value) => value.clone(),
            Self::BitString { unused_bits, value } => {
                let mut out = Vec::with_capacity(value.len() + 1);
                out.push(*unused_bits);
                out.extend_from_slice(value);
                out
            }
            Self::Sequence(elements) | Self::Set(elements) => {
                elements.iter().flat_map(encode).collect()
            }
            Self::String { tag, value } => tag.encode(value),
            Self::Time { tag, value } => encode_time(*tag, value),
            Self::Tagged { contents, .. } | Self::Raw { contents, .. } => contents.clone(),
        }
    }

    fn from_tlv(tlv: Tlv<'_>, depth: usize) -> Result<Self> {
        let Tlv {
            identifier,
            contents,
        } = tlv;

        if identifier.class != TagClass::Universal {
            return Ok(Self::Tagged {
                class: identifier.class,
                encoding: identifier.encoding,
                tag: identifier.tag,
                contents: contents.to_vec(),
            });
        }

        let raw = || Self::Raw {
            identifier,
            contents: contents.to_vec(),
        };

        let expects_constructed = matches!(identifier.tag, universal::SEQUENCE | universal::SET);
        if expects_constructed != (identifier.encoding == Encoding::Constructed) {
            // e.g. BER constructed strings; keep them untouched.
            return Ok(raw());
        }

        let object = match identifier.tag {
            universal::BOOLEAN => match contents {
                [0x00] => Self::Boolean(false),
                [0xff] => Self::Boolean(true),
                [_] => return Err(format_error("DER BOOLEAN must be 0x00 or 0xff")),
                _ => return Err(format_error("BOOLEAN must have exactly one octet")),
            },
            universal::INTEGER | universal::ENUMERATED => {
                if contents.is_empty() {
                    return Err(format_error("INTEGER has no contents octets"));
                }
                let tag = if identifier.tag == universal::INTEGER {
                    IntegerTag::Integer
                } else {
                    IntegerTag::Enumerated
                };
                Self::Integer {
                    tag,
                    value: contents.to_vec(),
                }
            }
            universal::NULL => {
                if !contents.is_empty() {
                    return Err(format_error("NULL must be empty"));
                }
                Self::Null
            }
            universal::OBJECT_IDENTIFIER => Self::ObjectIdentifier(Oid::decode_contents(contents)?),
            universal::OCTET_STRING => Self::OctetString(contents.to_vec()),
            universal::BIT_STRING => {
                let (unused_bits, value) = contents
                    .split_first()
                    .ok_or_else(|| format_error("BIT STRING has no contents octets"))?;
                if *unused_bits > 7 || (value.is_empty() && *unused_bits != 0) {
                    return Err(format_error("invalid BIT STRING padding"));
                }
                Self::BitString {
                    unused_bits: *unused_bits,
                    value: value.to_vec(),
                }
            }
            universal::SEQUENCE => {
                Self::Sequence(decode_nested(contents, depth + 1).ctx(|| "decoding SEQUENCE")?)
            }
            universal::SET => Self::Set(decode_nested(contents, depth + 1).ctx(|| "decoding SET")?),
            universal::UTC_TIME => Self::Time {
                tag: TimeTag::UtcTime,
                value: decode_time(TimeTag::UtcTime, contents)?,
            },
            universal::GENERALIZED_TIME => Self::Time {
                tag: TimeTag::GeneralizedTime,
                value: decode_time(TimeTag::GeneralizedTime, contents)?,
            },
            tag => match StringTag::from_tag(tag) {
                Some(kind) => Self::String {
                    tag: kind,
                    value: kind.decode(contents)?,
                },
                None => raw(),
            },
        };

        Ok(object)
    }
}

/// Encodes `object` in DER.
pub fn encode(object: &Asn1Object) -> Vec<u8> {
    let contents = object.contents();

    let mut out = Vec::with_capacity(contents.len() + 6);
    object.identifier().write(&mut out);
    write_length(contents.len(), &mut out);
    out.extend_from_slice(&contents);
    out
}

/// Decodes exactly one DER value.
///
/// Empty input yields [`None`]; trailing bytes after the first value are a
/// [`Asn1Error::Format`][crate::Asn1Error::Format] error.
pub fn decode(bytes: &[u8]) -> Result<Option<Asn1Object>> {
    if bytes.is_empty() {
        return Ok(None);
    }

    let mut reader = Reader::new(bytes);
    let object = Asn1Object::from_tlv(reader.read_tlv()?, 0)?;

    if !reader.is_empty() {
        return Err(format_error(format!(
            "{} trailing bytes after the DER value",
            bytes.len() - reader.position()
        )));
    }

    Ok(Some(object))
}

/// Decodes a concatenation of DER values until the input is exhausted.
pub fn decode_multiple(bytes: &[u8]) -> Result<Vec<Asn1Object>> {
    decode_nested(bytes, 0)
}

/// How deep `SEQUENCE`s and `SET`s may nest before decoding gives up.
pub const MAX_NESTING_DEPTH: usize = 64;

fn decode_nested(bytes: &[u8], depth: usize) -> Result<Vec<Asn1Object>> {
    if depth > MAX_NESTING_DEPTH {
        return Err(format_error(format!(
            "nesting deeper than {MAX_NESTING_DEPTH} levels"
        )));
    }

    let mut reader = Reader::new(bytes);
    let mut objects = Vec::new();
    while !reader.is_empty() {
        objects.push(Asn1Object::from_tlv(reader.read_tlv()?, depth)?);
    }
    Ok(objects)
}
