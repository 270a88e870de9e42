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

//! Signed Verified Issuer Certificate Authority Lists (VICAL), as defined in Annex C of
//! [ISO/IEC 18013-5:2021][1].
//!
//! A VICAL is a `COSE_Sign1` whose payload lists the trusted issuer certificates together with
//! the document types they may issue.
//!
//! [1]: <https://www.iso.org/standard/69084.html>

use bh_asn1::x509::{CertificateFields, COUNTRY_NAME};
use bh_jws_utils::Signer;
use bherror::traits::{ErrorContext as _, ForeignError as _, PropagateError as _};
use bhx5chain::X5Chain;
use ciborium::Value;
use openssl::x509::X509;

use crate::{
    cose::{
        algorithm_from_sign1, sign1, sign1_from_bytes, sign1_to_bytes, verify_sign1,
        x5chain_from_sign1,
    },
    error::format_error,
    models::{from_cbor_bytes, to_cbor_bytes, DateTime, DocType},
    MdocError, Result,
};

/// The VICAL structure version produced by this crate.
pub const VICAL_VERSION: &str = "1.0";

/// _CBOR_ tag of an unsigned bignum.
const BIGNUM_CBOR_TAG: u64 = 2;

/// The payload of a VICAL.
#[derive(Clone, Debug, PartialEq)]
pub struct Vical {
    /// Structure version, [`VICAL_VERSION`].
    pub version: String,
    /// Name of the VICAL provider.
    pub vical_provider: String,
    /// Issuance date of this list.
    pub date: DateTime,
    /// When the next list is expected.
    pub next_update: Option<DateTime>,
    /// Sequence number of this list.
    pub vical_issue_id: Option<u64>,
    /// The listed certificates.
    pub certificate_infos: Vec<VicalCertificateInfo>,
}

/// One certificate listed in a [`Vical`].
#[derive(Clone, Debug, PartialEq)]
pub struct VicalCertificateInfo {
    /// DER encoded certificate.
    pub certificate: Vec<u8>,
    /// Unsigned big-endian serial number of `certificate`.
    pub serial_number: Vec<u8>,
    /// Subject key identifier of `certificate`.
    pub ski: Vec<u8>,
    /// Document types the certificate may sign.
    pub doc_types: Vec<DocType>,
    /// Profiles the certificate conforms to.
    pub certificate_profiles: Option<Vec<String>>,
    /// Name of the authority that issues documents under the certificate.
    pub issuing_authority: Option<String>,
    /// ISO 3166-1 alpha-2 code.
    pub issuing_country: Option<String>,
}

impl VicalCertificateInfo {
    /// Lists `certificate`, taking the serial number, key identifier and country from it.
    ///
    /// Fails with [`MdocError::MissingSubjectKeyIdentifier`] if the certificate has no subject key
    /// identifier extension.
    pub fn from_certificate(certificate: &X509, doc_types: Vec<DocType>) -> Result<Self> {
        let der = certificate
            .to_der()
            .foreign_err(|| MdocError::Format("unable to encode certificate".to_owned()))?;
        let fields = CertificateFields::parse(&der)
            .with_err(|| MdocError::Format("unable to parse certificate".to_owned()))?;

        let ski = fields
            .subject_key_identifier()
            .with_err(|| MdocError::Format("invalid subject key identifier".to_owned()))?
            .ok_or_else(|| bherror::Error::root(MdocError::MissingSubjectKeyIdentifier))?;

        Ok(Self {
            serial_number: fields.serial_number_magnitude().to_vec(),
            ski,
            issuing_country: fields.subject_attribute(COUNTRY_NAME).map(str::to_owned),
            certificate: der,
            doc_types,
            certificate_profiles: None,
            issuing_authority: None,
        })
    }

    fn to_cbor(&self) -> Result<Value> {
        if self.ski.is_empty() {
            return Err(bherror::Error::root(MdocError::MissingSubjectKeyIdentifier))
                .ctx(|| format!("serial number {}", hex::encode(&self.serial_number)));
        }

        let mut map = vec![
            entry("certificate", Value::Bytes(self.certificate.clone())),
            entry(
                "serialNumber",
                Value::Tag(
                    BIGNUM_CBOR_TAG,
                    Box::new(Value::Bytes(self.serial_number.clone())),
                ),
            ),
            entry("ski", Value::Bytes(self.ski.clone())),
            entry("docType", text_array(self.doc_types.iter().map(|d| d.0.as_str()))),
        ];
        if let Some(profiles) = &self.certificate_profiles {
            map.push(entry(
                "certificateProfile",
                text_array(profiles.iter().map(String::as_str)),
            ));
        }
        if let Some(authority) = &self.issuing_authority {
            map.push(entry("issuingAuthority", Value::Text(authority.clone())));
        }
        if let Some(country) = &self.issuing_country {
            map.push(entry("issuingCountry", Value::Text(country.clone())));
        }

        Ok(Value::Map(map))
    }

    fn from_cbor(value: Value) -> Result<Self> {
        let mut map = CborMap::new(value, "CertificateInfo")?;

        Ok(Self {
            certificate: into_bytes(map.required("certificate")?, "certificate")?,
            serial_number: into_serial_number(map.required("serialNumber")?)?,
            ski: into_bytes(map.required("ski")?, "ski")?,
            doc_types: into_text_array(map.required("docType")?, "docType")?
                .into_iter()
                .map(DocType)
                .collect(),
            certificate_profiles: map
                .optional("certificateProfile")
                .map(|value| into_text_array(value, "certificateProfile"))
                .transpose()?,
            issuing_authority: map
                .optional("issuingAuthority")
                .map(|value| into_text(value, "issuingAuthority"))
                .transpose()?,
            issuing_country: map
                .optional("issuingCountry")
                .map(|value| into_text(value, "issuingCountry"))
                .transpose()?,
        })
    }
}

impl Vical {
    /// Creates an empty list of [`VICAL_VERSION`].
    pub fn new(vical_provider: impl Into<String>, date: DateTime) -> Self {
        Self {
            version: VICAL_VERSION.to_owned(),
            vical_provider: vical_provider.into(),
            date,
            next_update: None,
            vical_issue_id: None,
            certificate_infos: Vec::new(),
        }
    }

    /// Encodes the list with a fixed key order.
    pub fn to_cbor(&self) -> Result<Value> {
        let mut map = vec![
            entry("version", Value::Text(self.version.clone())),
            entry("vicalProvider", Value::Text(self.vical_provider.clone())),
            entry("date", self.date.clone().into()),
        ];
        if let Some(next_update) = &self.next_update {
            map.push(entry("nextUpdate", next_update.clone().into()));
        }
        if let Some(issue_id) = self.vical_issue_id {
            map.push(entry("vicalIssueID", Value::Integer(issue_id.into())));
        }
        let infos = self
            .certificate_infos
            .iter()
            .map(VicalCertificateInfo::to_cbor)
            .collect::<Result<Vec<_>>>()?;
        map.push(entry("certificateInfos", Value::Array(infos)));

        Ok(Value::Map(map))
    }

    /// Decodes the list, ignoring unknown keys.
    pub fn from_cbor(value: Value) -> Result<Self> {
        let mut map = CborMap::new(value, "VICAL")?;

        let vical_issue_id = match map.optional("vicalIssueID") {
            Some(Value::Integer(id)) => Some(
                u64::try_from(id)
                    .foreign_err(|| MdocError::Format("`vicalIssueID` out of range".to_owned()))?,
            ),
            Some(_) => return Err(format_error("`vicalIssueID` must be an unsigned integer")),
            None => None,
        };
        let certificate_infos = match map.required("certificateInfos")? {
            Value::Array(infos) => infos
                .into_iter()
                .map(VicalCertificateInfo::from_cbor)
                .collect::<Result<_>>()?,
            _ => return Err(format_error("`certificateInfos` must be an array")),
        };

        Ok(Self {
            version: into_text(map.required("version")?, "version")?,
            vical_provider: into_text(map.required("vicalProvider")?, "vicalProvider")?,
            date: map.required("date")?.try_into()?,
            next_update: map
                .optional("nextUpdate")
                .map(DateTime::try_from)
                .transpose()?,
            vical_issue_id,
            certificate_infos,
        })
    }
}

/// A [`Vical`] together with the certificate chain of its signer.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedVical {
    /// The list.
    pub vical: Vical,
    /// The chain whose leaf certificate holds the signing key.
    pub x5chain: X5Chain,
}

impl SignedVical {
    /// Signs the list, returning the encoded `COSE_Sign1`.
    ///
    /// `signer` must hold the key of the leaf certificate of [`SignedVical::x5chain`].
    pub fn generate<S: Signer + ?Sized>(&self, signer: &S) -> Result<Vec<u8>> {
        let payload = to_cbor_bytes(&self.vical.to_cbor()?)?;
        let sign1 = sign1(payload, &self.x5chain, signer)?;

        sign1_to_bytes(sign1)
    }

    /// Parses an encoded VICAL.
    ///
    /// Unless `disable_signature_verification` is set, the signature is checked against the leaf
    /// certificate of the embedded chain before the payload is decoded.
    pub fn parse(bytes: &[u8], disable_signature_verification: bool) -> Result<Self> {
        let sign1 = sign1_from_bytes(bytes)?;

        algorithm_from_sign1(&sign1)
            .with_err(|| MdocError::Format("missing or unsupported `alg` header".to_owned()))?;
        let x5chain = x5chain_from_sign1(&sign1)
            .with_err(|| MdocError::Format("missing or invalid `x5chain` header".to_owned()))?;

        if !disable_signature_verification {
            verify_sign1(&sign1).ctx(|| "VICAL signature")?;
        }

        let payload = sign1
            .payload
            .as_deref()
            .ok_or_else(|| format_error("VICAL payload is detached"))?;
        let vical = Vical::from_cbor(from_cbor_bytes(payload)?)?;

        Ok(Self { vical, x5chain })
    }
}

fn entry(key: &str, value: Value) -> (Value, Value) {
    (Value::Text(key.to_owned()), value)
}

fn text_array<'a>(texts: impl Iterator<Item = &'a str>) -> Value {
    Value::Array(texts.map(|text| Value::Text(text.to_owned())).collect())
}

/// A decoded _CBOR_ map from which fields are taken by their text key.
struct CborMap {
    name: &'static str,
    entries: Vec<(Value, Value)>,
}

impl CborMap {
    fn new(value: Value, name: &'static str) -> Result<Self> {
        match value {
            Value::Map(entries) => Ok(Self { name, entries }),
            _ => Err(format_error(format!("{name} must be a map"))),
        }
    }

    fn optional(&mut self, key: &str) -> Option<Value> {
        let position = self
            .entries
            .iter()
            .position(|(k, _)| k.as_text() == Some(key))?;
        Some(self.entries.swap_remove(position).1)
    }

    fn required(&mut self, key: &str) -> Result<Value> {
        self.optional(key)
            .ok_or_else(|| format_error(format!("{} is missing `{key}`", self.name)))
    }
}

fn into_text(value: Value, key: &str) -> Result<String> {
    value
        .into_text()
        .map_err(|_| format_error(format!("`{key}` must be text")))
}

fn into_bytes(value: Value, key: &str) -> Result<Vec<u8>> {
    value
        .into_bytes()
        .map_err(|_| format_error(format!("`{key}` must be a byte string")))
}

fn into_text_array(value: Value, key: &str) -> Result<Vec<String>> {
    value
        .into_array()
        .map_err(|_| format_error(format!("`{key}` must be an array")))?
        .into_iter()
        .map(|value| into_text(value, key))
        .collect()
}

/// Bignums that fit into 128 bits come out of the decoder as plain integers.
fn into_serial_number(value: Value) -> Result<Vec<u8>> {
    let magnitude = match value {
        Value::Tag(BIGNUM_CBOR_TAG, inner) => into_bytes(*inner, "serialNumber")?,
        Value::Integer(integer) => {
            let integer = u128::try_from(integer)
                .foreign_err(|| MdocError::Format("negative `serialNumber`".to_owned()))?;
            integer.to_be_bytes().to_vec()
        }
        _ => return Err(format_error("`serialNumber` must be an unsigned bignum")),
    };

    let first = magnitude
        .iter()
        .position(|byte| *byte != 0)
        .unwrap_or(magnitude.len().saturating_sub(1));
    Ok(magnitude[first..].to_vec())
}
