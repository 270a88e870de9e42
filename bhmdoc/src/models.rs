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

//! Core CBOR data types shared by the mdoc structures of [ISO/IEC 18013-5:2021][1].
//!
//! [1]: <https://www.iso.org/standard/69084.html>

use std::{borrow::Borrow, fmt, str::FromStr};

use bherror::traits::{ErrorContext as _, ForeignError as _};
use chrono::{Timelike as _, Utc};
use ciborium::{from_reader, into_writer, value::Value};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

use crate::{error::format_error, MdocError, Result};

/// _CBOR_ tag of the `tdate` type (RFC 8949 standard date/time string).
const TDATE_CBOR_TAG: u64 = 0;

/// _CBOR_ tag of an embedded _CBOR_ data item (`#6.24(bstr .cbor T)`).
pub(crate) const EMBEDDED_CBOR_TAG: u64 = 24;

/// Declares a string newtype used as a map key of the mdoc structures.
macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype!(
    /// Document type, e.g. `org.iso.18013.5.1.mDL`.
    DocType
);

string_newtype!(
    /// Name space of a group of data elements, e.g. `org.iso.18013.5.1`.
    NameSpace
);

string_newtype!(
    /// Identifier of a single data element within a [`NameSpace`].
    DataElementIdentifier
);

/// The value of a data element, any _CBOR_ data item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataElementValue(pub Value);

impl<T: Into<Value>> From<T> for DataElementValue {
    fn from(value: T) -> Self {
        Self(value.into())
    }
}

/// A _CBOR_ _byte string_.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    /// Decodes a hex string into [`Bytes`].
    pub fn from_hex(value: &str) -> std::result::Result<Self, hex::FromHexError> {
        hex::decode(value).map(Self)
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<Bytes> for Value {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes.0)
    }
}

impl TryFrom<Value> for Bytes {
    type Error = bherror::Error<MdocError>;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(bytes) => Ok(Self(bytes)),
            _ => Err(format_error("expected a byte string")),
        }
    }
}

/// A _CBOR_ data item embedded as a tagged byte string, `#6.24(bstr .cbor T)`.
///
/// When decoded from the wire the exact tagged encoding is kept, so digests computed over it match
/// the ones the issuer computed.  Equality only considers the decoded value.
#[derive(Clone, Debug)]
pub struct BytesCbor<T> {
    inner: T,
    original_data: Option<Vec<u8>>,
}

impl<T> BytesCbor<T> {
    /// The embedded value.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Consumes the wrapper, returning the embedded value.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Decodes the wrapper from a tag 24 _CBOR_ [`Value`].
    pub fn try_from_cbor(value: &Value) -> Result<Self>
    where
        T: DeserializeOwned,
    {
        let tagged @ Value::Tag(EMBEDDED_CBOR_TAG, embedded) = value else {
            return Err(format_error(format!(
                "`bstr .cbor` MUST be tagged with `{EMBEDDED_CBOR_TAG}`"
            )));
        };
        let bytes = embedded
            .as_bytes()
            .ok_or_else(|| format_error("`bstr .cbor` MUST be a byte string"))?;

        let inner = from_reader(bytes.as_slice())
            .foreign_err(|| MdocError::Format("invalid embedded CBOR".to_owned()))?;

        // `Value` keeps the map ordering, so encoding it again yields the received bytes.
        let mut original_data = Vec::new();
        into_writer(tagged, &mut original_data)
            .foreign_err(|| MdocError::Format("unable to encode tagged value".to_owned()))?;

        Ok(Self {
            inner,
            original_data: Some(original_data),
        })
    }

    /// The wire encoding of the tagged byte string.
    pub fn to_tagged_bytes(&self) -> Result<Vec<u8>>
    where
        T: Serialize,
    {
        if let Some(original_data) = &self.original_data {
            return Ok(original_data.clone());
        }

        let mut bytes = Vec::new();
        into_writer(&self.try_into_cbor()?, &mut bytes)
            .foreign_err(|| MdocError::Format("unable to encode tagged value".to_owned()))?;
        Ok(bytes)
    }

    /// Encodes the wrapper into a tag 24 _CBOR_ [`Value`].
    pub fn try_into_cbor(&self) -> Result<Value>
    where
        T: Serialize,
    {
        if let Some(original_data) = &self.original_data {
            return from_reader(original_data.as_slice())
                .foreign_err(|| MdocError::Format("corrupted original encoding".to_owned()));
        }

        let mut bytes = Vec::new();
        into_writer(&self.inner, &mut bytes)
            .foreign_err(|| MdocError::Format("unable to encode embedded value".to_owned()))?;

        Ok(Value::Tag(EMBEDDED_CBOR_TAG, Box::new(Value::Bytes(bytes))))
    }
}

impl<T: PartialEq> PartialEq for BytesCbor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> From<T> for BytesCbor<T> {
    fn from(inner: T) -> Self {
        Self {
            inner,
            original_data: None,
        }
    }
}

impl<T: Serialize> Serialize for BytesCbor<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.try_into_cbor()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for BytesCbor<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::try_from_cbor(&value).map_err(serde::de::Error::custom)
    }
}

/// A `tdate` _CBOR_ value as restricted by section `7.2.1` of ISO/IEC 18013-5: no fractional
/// seconds and always in UTC (`Z` offset).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub struct DateTime(chrono::DateTime<Utc>);

impl DateTime {
    /// The current time with the fraction of the second dropped.
    pub fn now() -> Self {
        let now = Utc::now();
        Self(now.with_nanosecond(0).unwrap_or(now))
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

impl FromStr for DateTime {
    type Err = bherror::Error<MdocError>;

    fn from_str(value: &str) -> Result<Self> {
        let date_time = chrono::DateTime::parse_from_rfc3339(value)
            .foreign_err(|| MdocError::InvalidDateTime)
            .ctx(|| format!("{value} is not an RFC 3339 date-time"))?;

        if date_time.offset().utc_minus_local() != 0 {
            return Err(bherror::Error::root(MdocError::InvalidDateTime)
                .ctx("offset must be `Z`"));
        }

        Self::try_from(date_time.with_timezone(&Utc))
    }
}

impl TryFrom<chrono::DateTime<Utc>> for DateTime {
    type Error = bherror::Error<MdocError>;

    fn try_from(value: chrono::DateTime<Utc>) -> Result<Self> {
        if value.nanosecond() != 0 {
            return Err(bherror::Error::root(MdocError::InvalidDateTime)
                .ctx("fraction of seconds is not allowed"));
        }
        Ok(Self(value))
    }
}

impl TryFrom<i64> for DateTime {
    type Error = bherror::Error<MdocError>;

    fn try_from(seconds: i64) -> Result<Self> {
        let date_time = chrono::DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
            bherror::Error::root(MdocError::InvalidDateTime)
                .ctx(format!("{seconds} seconds out of range"))
        })?;
        Ok(Self(date_time))
    }
}

impl From<DateTime> for chrono::DateTime<Utc> {
    fn from(date_time: DateTime) -> Self {
        date_time.0
    }
}

impl From<DateTime> for Value {
    fn from(date_time: DateTime) -> Self {
        Self::Tag(TDATE_CBOR_TAG, Box::new(Self::Text(date_time.to_string())))
    }
}

impl TryFrom<Value> for DateTime {
    type Error = bherror::Error<MdocError>;

    fn try_from(value: Value) -> Result<Self> {
        let Value::Tag(TDATE_CBOR_TAG, value) = value else {
            return Err(bherror::Error::root(MdocError::InvalidDateTime)
                .ctx(format!("`tdate` MUST be tagged with `{TDATE_CBOR_TAG}`")));
        };

        value
            .as_text()
            .ok_or_else(|| {
                bherror::Error::root(MdocError::InvalidDateTime).ctx("`tdate` MUST be text")
            })?
            .parse()
    }
}

/// Encodes `value` into _CBOR_ bytes.
pub(crate) fn to_cbor_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    into_writer(value, &mut bytes)
        .foreign_err(|| MdocError::Format("unable to encode CBOR".to_owned()))?;
    Ok(bytes)
}

/// Decodes _CBOR_ bytes into a `T`.
pub(crate) fn from_cbor_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    from_reader(bytes).foreign_err(|| MdocError::Format("invalid CBOR".to_owned()))
}
