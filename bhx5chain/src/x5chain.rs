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
    error::ErrorStack,
    pkey::{PKey, Public},
    x509::X509,
};

use crate::{Error, Result};

/// The `x5chain` as defined in [RFC 9360][1].
///
/// The certificates are ordered starting with the certificate containing the end-entity key
/// followed by the certificate that signed it, and so on, as stated in [RFC 9360][1].
///
/// The chain is **NOT** validated against any trust anchor; deciding whether the chain is trusted
/// is left to the consumer.
///
/// [1]: <https://www.rfc-editor.org/rfc/rfc9360.html#section-2-5.4.1>
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct X5Chain {
    leaf: X509,
    intermediates: Vec<X509>,
}

impl X5Chain {
    /// Create a new [`X5Chain`].
    ///
    /// The chain **MUST BE** ordered in such a way that the leaf certificate is at first place,
    /// then goes its parent, and so on.  Each certificate must be signed by its successor.
    pub fn new(chain: Vec<X509>) -> Result<Self> {
        validate_chain_order(&chain)?;

        let mut chain = chain.into_iter();
        let Some(leaf) = chain.next() else {
            return Err(bherror::Error::root(Error::EmptyChain));
        };
        let intermediates = chain.collect();

        Ok(Self {
            leaf,
            intermediates,
        })
    }

    /// Constructs a [`X5Chain`] from the _DER_ encodings of its certificates, in chain order.
    pub fn from_raw_bytes(bytes: &[Vec<u8>]) -> Result<Self> {
        let certs = bytes
            .iter()
            .enumerate()
            .map(|(i, der)| X509::from_der(der).foreign_err(|| Error::X5Chain).ctx(|| i))
            .collect::<Result<_>>()
            .ctx(|| "invalid X509 certificate")?;

        Self::new(certs)
    }

    /// Convert the chain into a list of DER encoded certificates.
    pub fn as_bytes(&self) -> Result<Vec<Vec<u8>>> {
        self.certificates()
            .map(|cert| cert.to_der().foreign_err(|| Error::X5Chain))
            .collect()
    }

    /// Returns the public key from the leaf certificate.
    pub fn leaf_certificate_key(&self) -> Result<PKey<Public>> {
        self.leaf_certificate()
            .public_key()
            .foreign_err(|| Error::X5Chain)
            .ctx(|| "Failed to access X509 public key")
    }

    /// Returns the leaf certificate.
    pub fn leaf_certificate(&self) -> &X509 {
        &self.leaf
    }

    /// Iterates over all certificates, leaf first.
    pub fn certificates(&self) -> impl Iterator<Item = &X509> {
        std::iter::once(&self.leaf).chain(&self.intermediates)
    }

    /// The number of certificates in the chain, always at least one.
    pub fn len(&self) -> usize {
        1 + self.intermediates.len()
    }

    /// Always `false`, a chain holds at least the leaf certificate.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Checks that every certificate is signed by the one following it.
///
/// A reversed chain would otherwise look perfectly fine.
fn validate_chain_order(chain: &[X509]) -> Result<()> {
    if chain.is_empty() {
        return Err(bherror::Error::root(Error::EmptyChain));
    }

    for (position, pair) in chain.windows(2).enumerate() {
        let (child, parent) = (&pair[0], &pair[1]);

        let is_child = clean_up_after_openssl(|| child.verify(parent.public_key()?.as_ref()))
            .foreign_err(|| Error::X5Chain)?;

        if !is_child {
            return Err(bherror::Error::root(Error::X5Chain)
                .ctx("invalid chain order")
                .ctx(format!("certificate {position} is not signed by its successor")));
        }
    }

    Ok(())
}

fn clean_up_after_openssl<T>(
    f: impl FnOnce() -> std::result::Result<T, ErrorStack>,
) -> std::result::Result<T, ErrorStack> {
    let return_value = f()?;

    // A failed signature check leaves entries on the thread's error queue even when the call
    // itself succeeds.
    drop(ErrorStack::get());

    Ok(return_value)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::{CertificateBuilder, IssuedCertificate};

    fn three_level_chain() -> [IssuedCertificate; 3] {
        let root = CertificateBuilder::new("Test IACA")
            .country("HR")
            .certificate_authority()
            .self_signed()
            .unwrap();
        let intermediate = CertificateBuilder::new("Test intermediate")
            .certificate_authority()
            .issued_by(&root)
            .unwrap();
        let leaf = CertificateBuilder::new("Test document signer")
            .issued_by(&intermediate)
            .unwrap();

        [leaf, intermediate, root]
    }

    #[test]
    fn ordered_chain_is_accepted() {
        let [leaf, intermediate, root] = three_level_chain();

        let chain = X5Chain::new(vec![
            leaf.certificate.clone(),
            intermediate.certificate,
            root.certificate,
        ])
        .unwrap();

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.leaf_certificate(), &leaf.certificate);
        assert!(chain
            .leaf_certificate_key()
            .unwrap()
            .public_eq(leaf.private_key.as_ref()));
    }

    #[test]
    fn misordered_chains_are_rejected() {
        let [leaf, intermediate, root] = three_level_chain();

        let reversed = vec![
            root.certificate.clone(),
            intermediate.certificate.clone(),
            leaf.certificate.clone(),
        ];
        assert_matches!(X5Chain::new(reversed).unwrap_err().error, Error::X5Chain);

        let gap = vec![leaf.certificate, root.certificate];
        assert_matches!(X5Chain::new(gap).unwrap_err().error, Error::X5Chain);

        assert_matches!(X5Chain::new(vec![]).unwrap_err().error, Error::EmptyChain);
    }

    #[test]
    fn der_round_trip() {
        let [leaf, intermediate, _] = three_level_chain();
        let chain = X5Chain::new(vec![leaf.certificate, intermediate.certificate]).unwrap();

        let der = chain.as_bytes().unwrap();
        assert_eq!(der.len(), 2);
        assert_eq!(X5Chain::from_raw_bytes(&der).unwrap(), chain);
    }

    #[test]
    fn garbage_der_is_rejected() {
        let err = X5Chain::from_raw_bytes(&[vec![0x30, 0x03, 0x02, 0x01]]).unwrap_err();
        assert_matches!(err.error, Error::X5Chain);
    }
}
