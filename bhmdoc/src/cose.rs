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

//! `COSE_Sign1` envelopes carrying an `x5chain`, as used for the issuer authentication of
//! mdocs and for signed VICALs.

use bh_jws_utils::{signer_matches_key, verify_raw, Signer, SigningAlgorithm};
use bherror::traits::{ErrorContext as _, ForeignBoxed as _, PropagateError as _};
use bhx5chain::X5Chain;
use ciborium::Value;
use coset::{
    iana::{self, EnumI64 as _},
    AsCborValue as _, CoseSign1, CoseSign1Builder, HeaderBuilder, Label, RegisteredLabelWithPrivate,
};

use crate::{error::format_error, models, MdocError, Result};

/// _CBOR_ tag of a tagged `COSE_Sign1` structure.
const COSE_SIGN1_TAG: u64 = 18;

/// Signs `payload` with `signer`, placing the algorithm into the protected header and `x5chain`
/// into the unprotected one.
///
/// The leaf certificate of `x5chain` must certify the key of `signer`.
pub fn sign1<S: Signer + ?Sized>(
    payload: Vec<u8>,
    x5chain: &X5Chain,
    signer: &S,
) -> Result<CoseSign1> {
    let leaf_key = x5chain.leaf_certificate_key().with_err(|| MdocError::X5Chain)?;
    let matches = signer_matches_key(signer, &leaf_key).with_err(|| MdocError::Signing)?;
    if !matches {
        return Err(bherror::Error::root(MdocError::X5Chain)
            .ctx("the signing key is not certified by the leaf certificate"));
    }

    let protected = HeaderBuilder::new()
        .algorithm(cose_algorithm(signer.algorithm()))
        .build();
    let unprotected = HeaderBuilder::new()
        .value(
            iana::HeaderParameter::X5Chain.to_i64(),
            x5chain_to_cbor_value(x5chain)?,
        )
        .build();

    let sign1 = CoseSign1Builder::new()
        .protected(protected)
        .unprotected(unprotected)
        .payload(payload)
        .try_create_signature(&[], |data| signer.sign(data))
        .foreign_boxed_err(|| MdocError::Signing)?
        .build();

    Ok(sign1)
}

/// The signing algorithm of the protected header.
pub fn algorithm_from_sign1(sign1: &CoseSign1) -> Result<SigningAlgorithm> {
    match &sign1.protected.header.alg {
        Some(RegisteredLabelWithPrivate::Assigned(iana::Algorithm::ES256)) => {
            Ok(SigningAlgorithm::Es256)
        }
        Some(RegisteredLabelWithPrivate::Assigned(iana::Algorithm::ES384)) => {
            Ok(SigningAlgorithm::Es384)
        }
        Some(RegisteredLabelWithPrivate::Assigned(iana::Algorithm::ES512)) => {
            Ok(SigningAlgorithm::Es512)
        }
        Some(alg) => Err(bherror::Error::root(MdocError::MissingSigningAlgorithm)
            .ctx(format!("unsupported algorithm {alg:?}"))),
        None => Err(bherror::Error::root(MdocError::MissingSigningAlgorithm)),
    }
}

/// The `x5chain` header, looked up in the protected header first.
pub fn x5chain_from_sign1(sign1: &CoseSign1) -> Result<X5Chain> {
    let label = Label::Int(iana::HeaderParameter::X5Chain.to_i64());

    let value = [&sign1.protected.header, &sign1.unprotected]
        .into_iter()
        .flat_map(|header| header.rest.iter())
        .find_map(|(key, value)| (*key == label).then_some(value))
        .ok_or_else(|| bherror::Error::root(MdocError::X5Chain).ctx("missing `x5chain` header"))?;

    cbor_value_to_x5chain(value.clone())
}

/// Verifies the signature of `sign1` with the key of the leaf certificate of its `x5chain`.
///
/// The chain itself is not validated against any trust anchor.
pub fn verify_sign1(sign1: &CoseSign1) -> Result<()> {
    let algorithm = algorithm_from_sign1(sign1)?;
    let leaf_key = x5chain_from_sign1(sign1)?
        .leaf_certificate_key()
        .with_err(|| MdocError::X5Chain)?;

    sign1.verify_signature(&[], |signature, data| {
        let verified = verify_raw(algorithm, &leaf_key, data, signature)
            .with_err(|| MdocError::SignatureVerification)
            .ctx(|| "unusable leaf certificate key")?;

        if !verified {
            return Err(bherror::Error::root(MdocError::SignatureVerification)
                .ctx("the signature does not match the leaf certificate key"));
        }

        Ok(())
    })
}

/// Encodes an untagged `COSE_Sign1`.
pub fn sign1_to_bytes(sign1: CoseSign1) -> Result<Vec<u8>> {
    let value = sign1
        .to_cbor_value()
        // `map_err` must be used because `CoseError` is not `std::error::Error` in `no_std`
        .map_err(|err| format_error(err.to_string()))?;

    models::to_cbor_bytes(&value)
}

/// Decodes a `COSE_Sign1`, with or without its tag.
pub fn sign1_from_bytes(bytes: &[u8]) -> Result<CoseSign1> {
    let value = match models::from_cbor_bytes(bytes)? {
        Value::Tag(COSE_SIGN1_TAG, inner) => *inner,
        value => value,
    };

    CoseSign1::from_cbor_value(value)
        .map_err(|err| format_error(format!("invalid COSE_Sign1: {err}")))
}

fn cose_algorithm(algorithm: SigningAlgorithm) -> iana::Algorithm {
    match algorithm {
        SigningAlgorithm::Es256 => iana::Algorithm::ES256,
        SigningAlgorithm::Es384 => iana::Algorithm::ES384,
        SigningAlgorithm::Es512 => iana::Algorithm::ES512,
    }
}

/// A single certificate is encoded as a byte string, a longer chain as an array of them.
pub(crate) fn x5chain_to_cbor_value(x5chain: &X5Chain) -> Result<Value> {
    let mut certificates: Vec<Value> = x5chain
        .as_bytes()
        .with_err(|| MdocError::X5Chain)
        .ctx(|| "X.509 certificate to DER error")?
        .into_iter()
        .map(Value::Bytes)
        .collect();

    Ok(if certificates.len() == 1 {
        certificates.remove(0)
    } else {
        Value::Array(certificates)
    })
}

pub(crate) fn cbor_value_to_x5chain(value: Value) -> Result<X5Chain> {
    let chain = match value {
        Value::Bytes(bytes) => vec![bytes],
        Value::Array(certificates) => certificates
            .into_iter()
            .map(Value::into_bytes)
            .collect::<std::result::Result<Vec<_>, _>>()
            // `map_err` must be used because the error is the offending `Value`
            .map_err(|_| {
                bherror::Error::root(MdocError::X5Chain).ctx("`x5chain` must only contain bytes")
            })?,
        _ => {
            return Err(
                bherror::Error::root(MdocError::X5Chain).ctx("`x5chain` must only contain bytes")
            )
        }
    };

    X5Chain::from_raw_bytes(&chain)
        .with_err(|| MdocError::X5Chain)
        .ctx(|| "invalid `x5chain`")
}

#[cfg(test)]
pub(crate) mod tests {
    use assert_matches::assert_matches;
    use bh_jws_utils::EcdsaSigner;
    use bhx5chain::{CertificateBuilder, IssuedCertificate};
    use openssl::{ec::EcKey, nid::Nid, x509::X509};

    use super::*;

    /// A signer and a two certificate chain certifying its key.
    pub(crate) fn issuer(curve: Nid) -> (EcdsaSigner, X5Chain) {
        let root = CertificateBuilder::new("Test IACA")
            .country("HR")
            .certificate_authority()
            .self_signed()
            .unwrap();
        let leaf = CertificateBuilder::new("Test Document Signer")
            .country("HR")
            .curve(curve)
            .issued_by(&root)
            .unwrap();

        (signer_of(&leaf), chain(&[&leaf, &root]))
    }

    pub(crate) fn signer_of(certificate: &IssuedCertificate) -> EcdsaSigner {
        let key: EcKey<_> = certificate.private_key.ec_key().unwrap();
        EcdsaSigner::from_ec_key(key).unwrap()
    }

    pub(crate) fn chain(certificates: &[&IssuedCertificate]) -> X5Chain {
        let certificates: Vec<X509> = certificates
            .iter()
            .map(|issued| issued.certificate.clone())
            .collect();
        X5Chain::new(certificates).unwrap()
    }

    #[test]
    fn sign_and_verify_every_curve() {
        for (curve, algorithm) in [
            (Nid::X9_62_PRIME256V1, SigningAlgorithm::Es256),
            (Nid::SECP384R1, SigningAlgorithm::Es384),
            (Nid::SECP521R1, SigningAlgorithm::Es512),
        ] {
            let (signer, x5chain) = issuer(curve);
            let sign1 = sign1(b"payload".to_vec(), &x5chain, &signer).unwrap();

            assert_eq!(algorithm_from_sign1(&sign1).unwrap(), algorithm);
            assert_eq!(x5chain_from_sign1(&sign1).unwrap(), x5chain);
            verify_sign1(&sign1).unwrap();

            let decoded = sign1_from_bytes(&sign1_to_bytes(sign1).unwrap()).unwrap();
            verify_sign1(&decoded).unwrap();
        }
    }

    #[test]
    fn single_certificate_is_a_byte_string() {
        let leaf = CertificateBuilder::new("Self Signed").self_signed().unwrap();
        let x5chain = chain(&[&leaf]);

        let sign1 = sign1(vec![], &x5chain, &signer_of(&leaf)).unwrap();
        let (_, value) = &sign1.unprotected.rest[0];

        assert_matches!(value, Value::Bytes(_));
        verify_sign1(&sign1).unwrap();
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let (signer, x5chain) = issuer(Nid::X9_62_PRIME256V1);
        let mut sign1 = sign1(b"payload".to_vec(), &x5chain, &signer).unwrap();
        sign1.payload = Some(b"Payload".to_vec());

        let err = verify_sign1(&sign1).unwrap_err();
        assert_matches!(err.error, MdocError::SignatureVerification);
    }

    #[test]
    fn signer_must_match_leaf_certificate() {
        let (_, x5chain) = issuer(Nid::X9_62_PRIME256V1);
        let stranger = EcdsaSigner::generate(SigningAlgorithm::Es256).unwrap();

        let err = sign1(vec![], &x5chain, &stranger).unwrap_err();
        assert_matches!(err.error, MdocError::X5Chain);
    }

    #[test]
    fn missing_headers() {
        let sign1 = CoseSign1Builder::new().payload(vec![1]).build();

        let err = algorithm_from_sign1(&sign1).unwrap_err();
        assert_matches!(err.error, MdocError::MissingSigningAlgorithm);

        let err = x5chain_from_sign1(&sign1).unwrap_err();
        assert_matches!(err.error, MdocError::X5Chain);

        let err = sign1_from_bytes(&[0xa0]).unwrap_err();
        assert_matches!(err.error, MdocError::Format(_));
    }
}
