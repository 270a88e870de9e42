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

//! Extraction of individual fields out of a DER encoded X.509 certificate ([RFC 5280][1]).
//!
//! [1]: <https://www.rfc-editor.org/rfc/rfc5280#section-4.1>
//!
//! Only structure is checked here; signatures and validity are left to the caller.

use bherror::traits::{ErrorContext as _, PropagateError as _};
use chrono::{DateTime, Utc};

use crate::{decode, decode_multiple, Asn1Error, Asn1Object, Oid, Result, TagClass};

/// `id-ce-subjectKeyIdentifier`
pub const SUBJECT_KEY_IDENTIFIER: &str = "2.5.29.14";
/// `id-at-commonName`
pub const COMMON_NAME: &str = "2.5.4.3";
/// `id-at-countryName`
pub const COUNTRY_NAME: &str = "2.5.4.6";
/// `id-at-stateOrProvinceName`
pub const STATE_OR_PROVINCE_NAME: &str = "2.5.4.8";
/// `id-at-organizationName`
pub const ORGANIZATION_NAME: &str = "2.5.4.10";

/// One attribute of a distinguished name.
#[derive(Debug, Clone, PartialEq)]
pub struct NameAttribute {
    /// The attribute type.
    pub oid: Oid,
    /// The attribute value, if it is one of the string types.
    pub value: Option<String>,
}

/// An X.509 extension.
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    /// The extension identifier.
    pub oid: Oid,
    /// Whether the extension is marked critical.
    pub critical: bool,
    /// The DER encoded extension value (contents of `extnValue`).
    pub value: Vec<u8>,
}

/// Selected fields of a certificate's `TBSCertificate`.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateFields {
    /// Two's complement contents of the `serialNumber` INTEGER.
    pub serial_number: Vec<u8>,
    /// The issuer distinguished name, flattened.
    pub issuer: Vec<NameAttribute>,
    /// Start of the validity period.
    pub not_before: DateTime<Utc>,
    /// End of the validity period.
    pub not_after: DateTime<Utc>,
    /// The subject distinguished name, flattened.
    pub subject: Vec<NameAttribute>,
    /// The extensions, empty for v1 certificates.
    pub extensions: Vec<Extension>,
}

impl CertificateFields {
    /// Parses the fields out of a DER encoded certificate.
    pub fn parse(der: &[u8]) -> Result<Self> {
        let certificate = decode(der)
            .with_err(|| Asn1Error::Certificate("not a DER value".to_owned()))?
            .ok_or_else(|| certificate_error("empty input"))?;

        let tbs = match certificate.as_elements() {
            Some([tbs, _algorithm, _signature]) => tbs,
            _ => return Err(certificate_error("Certificate is not a 3 element SEQUENCE")),
        };
        let mut fields = tbs
            .as_elements()
            .ok_or_else(|| certificate_error("TBSCertificate is not a SEQUENCE"))?
            .iter()
            .peekable();

        // version [0] EXPLICIT, absent for v1
        let _version = fields.next_if(|field| is_context_tag(field, 0));

        let serial_number = match fields.next() {
            Some(Asn1Object::Integer { value, .. }) => value.clone(),
            _ => return Err(certificate_error("missing serialNumber")),
        };
        let _signature = fields
            .next()
            .ok_or_else(|| certificate_error("missing signature algorithm"))?;
        let issuer = parse_name(fields.next()).ctx(|| "issuer")?;
        let (not_before, not_after) = parse_validity(fields.next())?;
        let subject = parse_name(fields.next()).ctx(|| "subject")?;
        let _public_key = fields
            .next()
            .ok_or_else(|| certificate_error("missing subjectPublicKeyInfo"))?;

        let mut extensions = Vec::new();
        for field in fields {
            if is_context_tag(field, 3) {
                extensions = parse_extensions(field)?;
            }
        }

        Ok(Self {
            serial_number,
            issuer,
            not_before,
            not_after,
            subject,
            extensions,
        })
    }

    /// The serial number as an unsigned big-endian magnitude, without the sign octet.
    pub fn serial_number_magnitude(&self) -> &[u8] {
        match self.serial_number.as_slice() {
            [0x00, rest @ ..] if !rest.is_empty() => rest,
            serial => serial,
        }
    }

    /// The key identifier carried by the subject key identifier extension.
    pub fn subject_key_identifier(&self) -> Result<Option<Vec<u8>>> {
        let Some(extension) = self.extension(SUBJECT_KEY_IDENTIFIER) else {
            return Ok(None);
        };

        match decode(&extension.value)? {
            Some(Asn1Object::OctetString(key_id)) => Ok(Some(key_id)),
            _ => Err(certificate_error("subjectKeyIdentifier is not an OCTET STRING")),
        }
    }

    /// Looks up an extension by its dotted-decimal OID.
    pub fn extension(&self, oid: &str) -> Option<&Extension> {
        self.extensions
            .iter()
            .find(|extension| extension.oid.to_string() == oid)
    }

    /// The first subject attribute of the given type, e.g. [`COUNTRY_NAME`].
    pub fn subject_attribute(&self, oid: &str) -> Option<&str> {
        find_attribute(&self.subject, oid)
    }

    /// The first issuer attribute of the given type.
    pub fn issuer_attribute(&self, oid: &str) -> Option<&str> {
        find_attribute(&self.issuer, oid)
    }
}

fn find_attribute<'a>(name: &'a [NameAttribute], oid: &str) -> Option<&'a str> {
    name.iter()
        .find(|attribute| attribute.oid.to_string() == oid)
        .and_then(|attribute| attribute.value.as_deref())
}

#[track_caller]
fn certificate_error(message: &str) -> bherror::Error<Asn1Error> {
    bherror::Error::root(Asn1Error::Certificate(message.to_owned()))
}

fn is_context_tag(object: &Asn1Object, expected: u32) -> bool {
    matches!(
        object,
        Asn1Object::Tagged { class: TagClass::ContextSpecific, tag, .. } if *tag == expected
    )
}

fn parse_name(name: Option<&Asn1Object>) -> Result<Vec<NameAttribute>> {
    let Some(Asn1Object::Sequence(rdns)) = name else {
        return Err(certificate_error("Name is not a SEQUENCE"));
    };

    let mut attributes = Vec::new();
    for rdn in rdns {
        let Asn1Object::Set(pairs) = rdn else {
            return Err(certificate_error("RelativeDistinguishedName is not a SET"));
        };
        for pair in pairs {
            match pair.as_elements() {
                Some([Asn1Object::ObjectIdentifier(oid), value]) => {
                    attributes.push(NameAttribute {
                        oid: oid.clone(),
                        value: value.as_str().map(str::to_owned),
                    });
                }
                _ => return Err(certificate_error("malformed AttributeTypeAndValue")),
            }
        }
    }
    Ok(attributes)
}

fn parse_validity(validity: Option<&Asn1Object>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    match validity.and_then(Asn1Object::as_elements) {
        Some(
            [Asn1Object::Time {
                value: not_before, ..
            }, Asn1Object::Time {
                value: not_after, ..
            }],
        ) => Ok((*not_before, *not_after)),
        _ => Err(certificate_error("malformed Validity")),
    }
}

fn parse_extensions(wrapper: &Asn1Object) -> Result<Vec<Extension>> {
    let inner = wrapper
        .tagged_contents()
        .transpose()?
        .unwrap_or_default();
    let Some(Asn1Object::Sequence(extensions)) = inner.first() else {
        return Err(certificate_error("extensions are not a SEQUENCE"));
    };

    extensions
        .iter()
        .map(|extension| match extension.as_elements() {
            Some([Asn1Object::ObjectIdentifier(oid), Asn1Object::OctetString(value)]) => {
                Ok(Extension {
                    oid: oid.clone(),
                    critical: false,
                    value: value.clone(),
                })
            }
            Some(
                [Asn1Object::ObjectIdentifier(oid), Asn1Object::Boolean(critical), Asn1Object::OctetString(value)],
            ) => Ok(Extension {
                oid: oid.clone(),
                critical: *critical,
                value: value.clone(),
            }),
            _ => Err(certificate_error("malformed Extension")),
        })
        .collect()
}

/// Decodes the `extnValue` of every extension, mostly useful for diagnostics.
pub fn decode_extension_values(fields: &CertificateFields) -> Result<Vec<Vec<Asn1Object>>> {
    fields
        .extensions
        .iter()
        .map(|extension| decode_multiple(&extension.value))
        .collect()
}
