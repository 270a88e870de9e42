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

use bherror::traits::{ErrorContext as _, ForeignError as _};
use openssl::{
    asn1::{Asn1Integer, Asn1Time},
    bn::{BigNum, MsbOption},
    ec::{EcGroup, EcKey},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    x509::{
        extension::{AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectKeyIdentifier},
        X509Name, X509,
    },
};

use crate::{Error, Result};

const VERSION: i32 = 2;

const SERIAL_NUMBER_BITS: i32 = 159;

const VALIDITY_PERIOD_IN_DAYS: u32 = 365;

/// A freshly minted certificate together with its private key.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    /// The certificate.
    pub certificate: X509,
    /// The private key matching the certificate's public key.
    pub private_key: PKey<Private>,
}

/// Mints EC certificates for tests.
///
/// Do NOT use this for production code, the keys are generated on the fly and never protected.
#[derive(Debug, Clone)]
pub struct CertificateBuilder {
    common_name: String,
    country: Option<String>,
    organization: Option<String>,
    curve: Nid,
    subject_key_identifier: bool,
    certificate_authority: bool,
}

impl CertificateBuilder {
    /// Starts a P-256 end-entity certificate with the given subject common name.
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            country: None,
            organization: None,
            curve: Nid::X9_62_PRIME256V1,
            subject_key_identifier: true,
            certificate_authority: false,
        }
    }

    /// Sets the subject `countryName`.
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Sets the subject `organizationName`.
    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Sets the curve of the generated key; one of P-256, P-384 or P-521.
    pub fn curve(mut self, curve: Nid) -> Self {
        self.curve = curve;
        self
    }

    /// Leaves out the `SubjectKeyIdentifier` extension.
    pub fn without_subject_key_identifier(mut self) -> Self {
        self.subject_key_identifier = false;
        self
    }

    /// Marks the certificate as a CA able to sign other certificates.
    pub fn certificate_authority(mut self) -> Self {
        self.certificate_authority = true;
        self
    }

    /// Mints a self-signed certificate.
    pub fn self_signed(self) -> Result<IssuedCertificate> {
        self.build(None)
    }

    /// Mints a certificate signed by `issuer`.
    pub fn issued_by(self, issuer: &IssuedCertificate) -> Result<IssuedCertificate> {
        self.build(Some(issuer))
    }

    fn build(self, issuer: Option<&IssuedCertificate>) -> Result<IssuedCertificate> {
        let digest = match self.curve {
            Nid::SECP384R1 => MessageDigest::sha384(),
            Nid::SECP521R1 => MessageDigest::sha512(),
            _ => MessageDigest::sha256(),
        };

        let group = EcGroup::from_curve_name(self.curve)
            .foreign_err(|| Error::Builder)
            .ctx(|| "unsupported curve")?;
        let private_key = EcKey::generate(&group)
            .and_then(PKey::from_ec_key)
            .foreign_err(|| Error::Builder)
            .ctx(|| "Cannot generate key")?;

        let subject_name = self.subject_name()?;

        let mut cert_builder = X509::builder()
            .foreign_err(|| Error::Builder)
            .ctx(|| "Cannot create cert builder")?;
        cert_builder
            .set_version(VERSION)
            .foreign_err(|| Error::Builder)?;
        let serial_number = random_serial_number()?;
        cert_builder
            .set_serial_number(&*serial_number)
            .foreign_err(|| Error::Builder)
            .ctx(|| "Cannot set serial number")?;
        cert_builder
            .set_pubkey(&private_key)
            .foreign_err(|| Error::Builder)?;
        cert_builder
            .set_subject_name(&subject_name)
            .foreign_err(|| Error::Builder)?;
        cert_builder
            .set_issuer_name(match issuer {
                Some(issuer) => issuer.certificate.subject_name(),
                None => subject_name.as_ref(),
            })
            .foreign_err(|| Error::Builder)?;

        let not_before = Asn1Time::days_from_now(0).foreign_err(|| Error::Builder)?;
        cert_builder
            .set_not_before(&not_before)
            .foreign_err(|| Error::Builder)?;
        let not_after =
            Asn1Time::days_from_now(VALIDITY_PERIOD_IN_DAYS).foreign_err(|| Error::Builder)?;
        cert_builder
            .set_not_after(&not_after)
            .foreign_err(|| Error::Builder)?;

        let mut basic_constraints = BasicConstraints::new();
        basic_constraints.critical();
        if self.certificate_authority {
            basic_constraints.ca();
        }
        let basic_constraints = basic_constraints
            .build()
            .foreign_err(|| Error::Builder)
            .ctx(|| "Cannot create basic constraints")?;
        cert_builder
            .append_extension(basic_constraints)
            .foreign_err(|| Error::Builder)?;

        let mut key_usage = KeyUsage::new();
        key_usage.critical();
        if self.certificate_authority {
            key_usage.key_cert_sign().crl_sign();
        } else {
            key_usage.digital_signature();
        }
        let key_usage = key_usage
            .build()
            .foreign_err(|| Error::Builder)
            .ctx(|| "Cannot create key usage")?;
        cert_builder
            .append_extension(key_usage)
            .foreign_err(|| Error::Builder)?;

        let issuer_certificate = issuer.map(|issuer| issuer.certificate.as_ref());

        if self.subject_key_identifier {
            let subject_key_identifier = SubjectKeyIdentifier::new()
                .build(&cert_builder.x509v3_context(issuer_certificate, None))
                .foreign_err(|| Error::Builder)
                .ctx(|| "Cannot create subject key identifier")?;
            cert_builder
                .append_extension(subject_key_identifier)
                .foreign_err(|| Error::Builder)?;
        }

        if issuer_certificate.is_some() {
            let authority_key_identifier = AuthorityKeyIdentifier::new()
                .keyid(false)
                .build(&cert_builder.x509v3_context(issuer_certificate, None))
                .foreign_err(|| Error::Builder)
                .ctx(|| "Cannot create authority key identifier")?;
            cert_builder
                .append_extension(authority_key_identifier)
                .foreign_err(|| Error::Builder)?;
        }

        let signing_key = match issuer {
            Some(issuer) => issuer.private_key.as_ref(),
            None => private_key.as_ref(),
        };
        cert_builder
            .sign(signing_key, digest)
            .foreign_err(|| Error::Builder)
            .ctx(|| "Cannot sign certificate")?;

        Ok(IssuedCertificate {
            certificate: cert_builder.build(),
            private_key,
        })
    }

    fn subject_name(&self) -> Result<X509Name> {
        let mut name = X509Name::builder().foreign_err(|| Error::Builder)?;

        if let Some(country) = &self.country {
            name.append_entry_by_nid(Nid::COUNTRYNAME, country)
                .foreign_err(|| Error::Builder)
                .ctx(|| "invalid country name")?;
        }
        if let Some(organization) = &self.organization {
            name.append_entry_by_nid(Nid::ORGANIZATIONNAME, organization)
                .foreign_err(|| Error::Builder)?;
        }
        name.append_entry_by_nid(Nid::COMMONNAME, &self.common_name)
            .foreign_err(|| Error::Builder)?;

        Ok(name.build())
    }
}

/// A positive serial number of exactly [`SERIAL_NUMBER_BITS`] bits, as RFC 5280 caps them at 20
/// octets.
fn random_serial_number() -> Result<Asn1Integer> {
    let mut serial_number = BigNum::new().foreign_err(|| Error::Builder)?;
    serial_number
        .rand(SERIAL_NUMBER_BITS, MsbOption::ONE, false)
        .foreign_err(|| Error::Builder)
        .ctx(|| "Cannot create serial number")?;

    serial_number
        .to_asn1_integer()
        .foreign_err(|| Error::Builder)
        .ctx(|| "Cannot create asn1 integer")
}
