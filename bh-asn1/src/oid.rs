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

use std::{fmt, str::FromStr};

use bherror::traits::{ErrorContext as _, ForeignError as _};

use crate::{error::format_error, tag::write_base128, Asn1Error, Result};

/// An `OBJECT IDENTIFIER`, displayed and parsed in dotted-decimal notation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(Vec<u64>);

impl Oid {
    /// Creates an OID from its arcs, checking the X.660 constraints on the first two.
    pub fn new(arcs: Vec<u64>) -> Result<Self> {
        match arcs.as_slice() {
            [first, second, ..] if *first <= 2 && (*first == 2 || *second < 40) => {
                if *first == 2 && *second > u64::MAX - 80 {
                    return Err(bherror::Error::root(Asn1Error::Encoding(
                        "second arc too large".to_owned(),
                    )));
                }
                Ok(Self(arcs))
            }
            _ => Err(bherror::Error::root(Asn1Error::Encoding(format!(
                "invalid leading arcs {arcs:?}"
            )))),
        }
    }

    /// The arcs of the identifier.
    pub fn arcs(&self) -> &[u64] {
        &self.0
    }

    pub(crate) fn encode_contents(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // `new` guarantees at least two arcs.
        write_base128(self.0[0] * 40 + self.0[1], &mut out);
        for arc in &self.0[2..] {
            write_base128(*arc, &mut out);
        }
        out
    }

    pub(crate) fn decode_contents(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(format_error("OBJECT IDENTIFIER has no contents octets"));
        }
        if bytes.last().is_some_and(|last| last & 0x80 != 0) {
            return Err(format_error("OBJECT IDENTIFIER ends mid-arc"));
        }

        let mut subidentifiers = Vec::new();
        let mut current: u64 = 0;
        for byte in bytes {
            if current > (u64::MAX >> 7) {
                return Err(format_error("OBJECT IDENTIFIER arc does not fit into 64 bits"));
            }
            current = (current << 7) | u64::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                subidentifiers.push(current);
                current = 0;
            }
        }

        let mut arcs = Vec::with_capacity(subidentifiers.len() + 1);
        let first = subidentifiers[0];
        match first {
            0..=39 => arcs.extend([0, first]),
            40..=79 => arcs.extend([1, first - 40]),
            _ => arcs.extend([2, first - 80]),
        }
        arcs.extend_from_slice(&subidentifiers[1..]);

        Ok(Self(arcs))
    }

    /// The conventional name of well-known identifiers, used by the pretty-printer.
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.to_string().as_str() {
            "1.2.840.10045.2.1" => "ecPublicKey",
            "1.2.840.10045.3.1.7" => "prime256v1",
            "1.3.132.0.34" => "secp384r1",
            "1.3.132.0.35" => "secp521r1",
            "1.2.840.10045.4.3.2" => "ecdsa-with-SHA256",
            "1.2.840.10045.4.3.3" => "ecdsa-with-SHA384",
            "1.2.840.10045.4.3.4" => "ecdsa-with-SHA512",
            "1.2.840.113549.1.1.1" => "rsaEncryption",
            "1.2.840.113549.1.1.11" => "sha256WithRSAEncryption",
            "2.5.4.3" => "commonName",
            "2.5.4.6" => "countryName",
            "2.5.4.7" => "localityName",
            "2.5.4.8" => "stateOrProvinceName",
            "2.5.4.10" => "organizationName",
            "2.5.4.11" => "organizationalUnitName",
            "2.5.29.14" => "subjectKeyIdentifier",
            "2.5.29.15" => "keyUsage",
            "2.5.29.17" => "subjectAltName",
            "2.5.29.19" => "basicConstraints",
            "2.5.29.31" => "cRLDistributionPoints",
            "2.5.29.35" => "authorityKeyIdentifier",
            "2.5.29.37" => "extKeyUsage",
            "1.0.18013.5.1.2" => "mdlDS",
            "1.0.18013.5.1.6" => "mdlReaderAuth",
            "1.0.18013.5.1.7" => "mdlIACA",
            "1.3.6.1.4.1.11129.2.1.17" => "androidKeyAttestation",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arcs: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", arcs.join("."))
    }
}

impl FromStr for Oid {
    type Err = bherror::Error<Asn1Error>;

    fn from_str(value: &str) -> Result<Self> {
        let arcs = value
            .split('.')
            .map(u64::from_str)
            .collect::<std::result::Result<Vec<_>, _>>()
            .foreign_err(|| Asn1Error::Encoding("OID arc is not a number".to_owned()))
            .ctx(|| value.to_owned())?;
        Self::new(arcs)
    }
}
