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

use std::result::Result as StdResult;

use bherror::{
    traits::{ErrorContext as _, ForeignBoxed as _, ForeignError as _, PropagateError as _},
    Error, Result,
};
use openssl::{
    bn::{BigNum, BigNumContext},
    ec::{EcGroup, EcKey, EcKeyRef},
    ecdsa::EcdsaSig,
    hash::{hash, MessageDigest},
    nid::Nid,
    pkey::{HasParams, HasPublic, PKey, PKeyRef, Private, Public},
};

use crate::{
    ec_public_affine_coords_to_jwk,
    error::{CryptoError, FormatError},
    jwk_affine_coords, jwk_signing_algorithm, BoxError, JwkPublic, SignatureVerifier, Signer,
    SigningAlgorithm,
};

/// The OpenSSL curve the algorithm signs with.
///
/// `X9_62_PRIME256V1` is the ANSI name of secp256r1 / NIST P-256.
pub fn curve_nid(algorithm: SigningAlgorithm) -> Nid {
    match algorithm {
        SigningAlgorithm::Es256 => Nid::X9_62_PRIME256V1,
        SigningAlgorithm::Es384 => Nid::SECP384R1,
        SigningAlgorithm::Es512 => Nid::SECP521R1,
    }
}

fn message_digest(algorithm: SigningAlgorithm) -> MessageDigest {
    match algorithm {
        SigningAlgorithm::Es256 => MessageDigest::sha256(),
        SigningAlgorithm::Es384 => MessageDigest::sha384(),
        SigningAlgorithm::Es512 => MessageDigest::sha512(),
    }
}

/// Returns the algorithm signing with the curve of `key`.
pub fn algorithm_for_ec_key<T: HasParams>(
    key: &EcKeyRef<T>,
) -> Result<SigningAlgorithm, CryptoError> {
    match key.group().curve_name() {
        Some(Nid::X9_62_PRIME256V1) => Ok(SigningAlgorithm::Es256),
        Some(Nid::SECP384R1) => Ok(SigningAlgorithm::Es384),
        Some(Nid::SECP521R1) => Ok(SigningAlgorithm::Es512),
        other => Err(Error::root(CryptoError::Unsupported(format!(
            "EC curve {other:?}"
        )))),
    }
}

/// Converts the public part of an EC key to a JWK.
pub fn openssl_ec_pub_key_to_jwk<T: HasPublic>(
    key: &EcKeyRef<T>,
    kid: Option<&str>,
) -> Result<JwkPublic, CryptoError> {
    let algorithm = algorithm_for_ec_key(key)?;

    let mut x = BigNum::new().foreign_err(|| CryptoError::CryptoBackend)?;
    let mut y = BigNum::new().foreign_err(|| CryptoError::CryptoBackend)?;
    let mut ctx = BigNumContext::new().foreign_err(|| CryptoError::CryptoBackend)?;
    key.public_key()
        .affine_coordinates(key.group(), &mut x, &mut y, &mut ctx)
        .foreign_err(|| CryptoError::CryptoBackend)?;

    let size = algorithm.coordinate_size() as i32;
    let x = x
        .to_vec_padded(size)
        .foreign_err(|| CryptoError::CryptoBackend)?;
    let y = y
        .to_vec_padded(size)
        .foreign_err(|| CryptoError::CryptoBackend)?;

    Ok(ec_public_affine_coords_to_jwk(algorithm, &x, &y, kid))
}

/// Reconstructs an EC public key from its JWK.
pub fn public_key_from_jwk(public_key: &JwkPublic) -> Result<EcKey<Public>, FormatError> {
    let algorithm = jwk_signing_algorithm(public_key)?;
    let (x, y) = jwk_affine_coords(public_key)?;

    let parse_error = || FormatError::JwkParsingFailed("invalid EC point".to_owned());
    let x = BigNum::from_slice(&x).foreign_err(parse_error)?;
    let y = BigNum::from_slice(&y).foreign_err(parse_error)?;
    let group = EcGroup::from_curve_name(curve_nid(algorithm)).foreign_err(parse_error)?;

    EcKey::from_public_key_affine_coordinates(&group, &x, &y)
        .foreign_err(parse_error)
        .ctx(|| "point is not on the curve")
}

/// Signs `message` with `key`, returning the fixed-size `r || s` signature.
pub fn sign_raw(
    algorithm: SigningAlgorithm,
    key: &EcKeyRef<Private>,
    message: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let digest =
        hash(message_digest(algorithm), message).foreign_err(|| CryptoError::CryptoBackend)?;
    let signature = EcdsaSig::sign(&digest, key).foreign_err(|| CryptoError::CryptoBackend)?;

    let size = algorithm.coordinate_size() as i32;
    let mut raw = signature
        .r()
        .to_vec_padded(size)
        .foreign_err(|| CryptoError::CryptoBackend)?;
    raw.extend(
        signature
            .s()
            .to_vec_padded(size)
            .foreign_err(|| CryptoError::CryptoBackend)?,
    );

    Ok(raw)
}

/// Verifies a fixed-size `r || s` signature over `message` with `key`.
///
/// Returns `Ok(false)` for a signature of the wrong size or one that does not
/// match; fails when `key` is not an EC key on the curve of `algorithm`.
pub fn verify_raw<T: HasPublic>(
    algorithm: SigningAlgorithm,
    key: &PKeyRef<T>,
    message: &[u8],
    signature: &[u8],
) -> Result<bool, CryptoError> {
    let ec_key = key
        .ec_key()
        .foreign_err(|| CryptoError::InvalidPublicKey)
        .ctx(|| "not an EC key")?;
    let key_algorithm = algorithm_for_ec_key(&ec_key)?;
    if key_algorithm != algorithm {
        return Err(Error::root(CryptoError::InvalidPublicKey))
            .ctx(|| format!("{algorithm} signature with a {key_algorithm} key"));
    }

    if signature.len() != algorithm.signature_size() {
        return Ok(false);
    }
    let (r, s) = signature.split_at(algorithm.coordinate_size());
    let r = BigNum::from_slice(r).foreign_err(|| CryptoError::CryptoBackend)?;
    let s = BigNum::from_slice(s).foreign_err(|| CryptoError::CryptoBackend)?;
    let signature =
        EcdsaSig::from_private_components(r, s).foreign_err(|| CryptoError::CryptoBackend)?;

    let digest =
        hash(message_digest(algorithm), message).foreign_err(|| CryptoError::CryptoBackend)?;

    signature
        .verify(&digest, &ec_key)
        .foreign_err(|| CryptoError::CryptoBackend)
}

/// ECDSA [`Signer`] holding its private key in memory.
pub struct EcdsaSigner {
    algorithm: SigningAlgorithm,
    private_key: EcKey<Private>,
    kid: Option<String>,
}

impl std::fmt::Debug for EcdsaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdsaSigner")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl EcdsaSigner {
    /// Generates a fresh key on the curve of `algorithm`.
    pub fn generate(algorithm: SigningAlgorithm) -> Result<Self, CryptoError> {
        let group = EcGroup::from_curve_name(curve_nid(algorithm))
            .foreign_err(|| CryptoError::CryptoBackend)?;
        let private_key =
            EcKey::generate(&group).foreign_err(|| CryptoError::KeyGenerationFailed)?;

        Ok(Self {
            algorithm,
            private_key,
            kid: None,
        })
    }

    /// Wraps an existing key; the algorithm follows from its curve.
    pub fn from_ec_key(private_key: EcKey<Private>) -> Result<Self, CryptoError> {
        Ok(Self {
            algorithm: algorithm_for_ec_key(&private_key)?,
            private_key,
            kid: None,
        })
    }

    /// Loads a PEM encoded EC private key.
    pub fn from_private_key_pem(private_key_pem: &[u8]) -> Result<Self, CryptoError> {
        let private_key = EcKey::private_key_from_pem(private_key_pem)
            .foreign_err(|| CryptoError::CryptoBackend)?;

        Self::from_ec_key(private_key)
    }

    /// Sets the `kid` included in the public JWK.
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// The public key as an OpenSSL key.
    pub fn public_key(&self) -> Result<PKey<Public>, CryptoError> {
        EcKey::from_public_key(self.private_key.group(), self.private_key.public_key())
            .and_then(PKey::from_ec_key)
            .foreign_err(|| CryptoError::CryptoBackend)
    }

    /// The public key as a JWK.
    pub fn public_jwk(&self) -> Result<JwkPublic, CryptoError> {
        openssl_ec_pub_key_to_jwk(&self.private_key, self.kid.as_deref())
    }
}

impl Signer for EcdsaSigner {
    fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    fn sign(&self, message: &[u8]) -> StdResult<Vec<u8>, BoxError> {
        Ok(sign_raw(self.algorithm, &self.private_key, message)?)
    }

    fn public_jwk(&self) -> StdResult<JwkPublic, BoxError> {
        Ok(EcdsaSigner::public_jwk(self)?)
    }
}

/// [`SignatureVerifier`] for JWKs of any supported EC curve.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaVerifier;

impl SignatureVerifier for EcdsaVerifier {
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &JwkPublic,
    ) -> StdResult<bool, BoxError> {
        let ec_key = public_key_from_jwk(public_key)?;
        let algorithm = algorithm_for_ec_key(&ec_key)?;
        let key = PKey::from_ec_key(ec_key)?;

        Ok(verify_raw(algorithm, &key, message, signature)?)
    }
}

/// Checks that `signer` holds the private key of `public_key`.
pub fn signer_matches_key<S: Signer + ?Sized, T: HasPublic>(
    signer: &S,
    public_key: &PKeyRef<T>,
) -> Result<bool, CryptoError> {
    let jwk = signer
        .public_jwk()
        .foreign_boxed_err(|| CryptoError::InvalidPublicKey)?;
    let signer_key = public_key_from_jwk(&jwk).with_err(|| CryptoError::InvalidPublicKey)?;
    let signer_key = PKey::from_ec_key(signer_key).foreign_err(|| CryptoError::CryptoBackend)?;

    Ok(signer_key.public_eq(public_key))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::{json_object, verify_compact, JsonObject, SignatureError, SigningInput};

    fn sign_compact(header: &JsonObject, claims: &JsonObject, signer: &EcdsaSigner) -> String {
        let input = SigningInput::new(header, claims).unwrap();
        let signature = Signer::sign(signer, input.as_bytes()).unwrap();
        input.into_compact(&signature)
    }

    const ALGORITHMS: [SigningAlgorithm; 3] = [
        SigningAlgorithm::Es256,
        SigningAlgorithm::Es384,
        SigningAlgorithm::Es512,
    ];

    #[test]
    fn sign_verify_bytes_on_every_curve() {
        for algorithm in ALGORITHMS {
            let signer = EcdsaSigner::generate(algorithm).unwrap();
            let message = b"Test message to be signed";

            let signature = Signer::sign(&signer, message).unwrap();
            assert_eq!(signature.len(), algorithm.signature_size(), "{algorithm}");

            let public_key = signer.public_key().unwrap();
            assert!(verify_raw(algorithm, &public_key, message, &signature).unwrap());
            assert!(!verify_raw(algorithm, &public_key, b"other message", &signature).unwrap());
            assert!(!verify_raw(algorithm, &public_key, message, &signature[1..]).unwrap());

            let jwk = signer.public_jwk().unwrap();
            assert!(EcdsaVerifier.verify(message, &signature, &jwk).unwrap());
        }
    }

    #[test]
    fn curve_mismatch_is_an_error() {
        let signer = EcdsaSigner::generate(SigningAlgorithm::Es384).unwrap();
        let signature = Signer::sign(&signer, b"message").unwrap();

        let err = verify_raw(
            SigningAlgorithm::Es256,
            &signer.public_key().unwrap(),
            b"message",
            &signature,
        )
        .unwrap_err();
        assert_matches!(err.error, CryptoError::InvalidPublicKey);
    }

    #[test]
    fn jwk_round_trip_preserves_key() {
        let signer = EcdsaSigner::generate(SigningAlgorithm::Es512)
            .unwrap()
            .with_kid("key-1");
        let jwk = signer.public_jwk().unwrap();

        assert_eq!(jwk["crv"], "P-521");
        assert_eq!(jwk["kid"], "key-1");

        let restored = PKey::from_ec_key(public_key_from_jwk(&jwk).unwrap()).unwrap();
        assert!(restored.public_eq(&signer.public_key().unwrap()));
        assert!(signer_matches_key(&signer, &restored).unwrap());

        let other = EcdsaSigner::generate(SigningAlgorithm::Es512).unwrap();
        assert!(!signer_matches_key(&other, &restored).unwrap());
    }

    #[test]
    fn pem_keys_are_loaded() {
        let signer = EcdsaSigner::generate(SigningAlgorithm::Es384).unwrap();
        let pem = signer.private_key.private_key_to_pem().unwrap();

        let loaded = EcdsaSigner::from_private_key_pem(&pem).unwrap();
        assert_eq!(Signer::algorithm(&loaded), SigningAlgorithm::Es384);
        assert_eq!(loaded.public_jwk().unwrap(), signer.public_jwk().unwrap());
    }

    #[test]
    fn compact_jws_verification() {
        let signer = EcdsaSigner::generate(SigningAlgorithm::Es256).unwrap();
        let jwk = signer.public_jwk().unwrap();
        let header = json_object!({ "typ": "JWT", "alg": "ES256" });
        let claims = json_object!({ "sub": "1234567890", "iat": 1516239022 });

        let jws = sign_compact(&header, &claims, &signer);
        assert_eq!(verify_compact(&jws, &EcdsaVerifier, &jwk).unwrap().claims, claims);

        // swap in different claims while keeping the signature
        let forged_claims = crate::base64_url_encode(br#"{"sub":"attacker"}"#);
        let mut parts: Vec<&str> = jws.split('.').collect();
        parts[1] = &forged_claims;
        let forged = parts.join(".");
        assert_matches!(
            verify_compact(&forged, &EcdsaVerifier, &jwk).unwrap_err().error,
            SignatureError::InvalidSignature
        );

        let wrong_alg = sign_compact(
            &json_object!({ "typ": "JWT", "alg": "ES384" }),
            &claims,
            &signer,
        );
        assert_matches!(
            verify_compact(&wrong_alg, &EcdsaVerifier, &jwk).unwrap_err().error,
            SignatureError::InvalidSigningAlgorithm(alg) if alg == "ES384"
        );

        let truncated = format!("{}.AAAA", jws.rsplit_once('.').unwrap().0);
        assert_matches!(
            verify_compact(&truncated, &EcdsaVerifier, &jwk).unwrap_err().error,
            SignatureError::InvalidSignature
        );
    }

    #[test]
    fn es256_verifier_invalid_jwk_missing_kty_field() {
        let signer = EcdsaSigner::generate(SigningAlgorithm::Es256).unwrap();
        let mut jwk = signer.public_jwk().unwrap();
        jwk.remove("kty");

        let error = EcdsaVerifier.verify(b"message", &[0; 64], &jwk).unwrap_err();

        assert_eq!(
            error.downcast::<Error<FormatError>>().unwrap().error,
            FormatError::JwkParsingFailed("missing \"kty\" field".to_string())
        );
    }
}
