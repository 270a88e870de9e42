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

use std::cell::Cell;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bherror::{
    traits::{ErrorContext as _, ForeignBoxed as _, ForeignError as _, PropagateError as _},
    Error,
};
use jwt::{ToBase64 as _, VerifyWithKey as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::{FormatError, SignatureError},
    jwk_signing_algorithm, BoxError, JwkPublic, SignatureVerifier, SigningAlgorithm,
};

/// A JSON object, used for JWS headers and claims.
pub type JsonObject = Map<String, Value>;

/// Encodes `input` as unpadded base64url.
pub fn base64_url_encode<T: AsRef<[u8]>>(input: T) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

/// Decodes unpadded base64url.
pub fn base64_url_decode<T: AsRef<[u8]>>(payload: T) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(payload)
}

/// A JOSE header kept as a free-form JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JwsHeader(pub JsonObject);

impl JwsHeader {
    /// The `alg` parameter, if it names a supported algorithm.
    pub fn algorithm(&self) -> Option<SigningAlgorithm> {
        self.0
            .get("alg")
            .and_then(Value::as_str)
            .and_then(|alg| alg.parse().ok())
    }
}

impl jwt::JoseHeader for JwsHeader {
    fn algorithm_type(&self) -> jwt::AlgorithmType {
        self.algorithm()
            .map(Into::into)
            .unwrap_or(jwt::AlgorithmType::None)
    }
}

type UnverifiedJws<'a> = jwt::Token<JwsHeader, JsonObject, jwt::Unverified<'a>>;

/// The `BASE64URL(header) || '.' || BASE64URL(claims)` part of a compact JWS,
/// which is what gets signed.
///
/// Splitting the signing input from the signature lets the signature be
/// produced elsewhere, e.g. asynchronously by a secure area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningInput(String);

impl SigningInput {
    /// Serializes and encodes `header` and `claims`.
    pub fn new(header: &JsonObject, claims: &JsonObject) -> Result<Self, Error<FormatError>> {
        let encode = |object: &JsonObject| {
            object
                .to_base64()
                .map(|encoded| encoded.into_owned())
                .foreign_err(|| FormatError::JwsParsingFailed("unserializable JSON".to_owned()))
        };

        Ok(Self(format!("{}.{}", encode(header)?, encode(claims)?)))
    }

    /// The bytes to be signed.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Appends the `r || s` signature, completing the compact JWS.
    pub fn into_compact(self, signature: &[u8]) -> String {
        format!("{}.{}", self.0, base64_url_encode(signature))
    }
}

/// The header and claims of a compact JWS.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedJws {
    /// The protected header.
    pub header: JsonObject,
    /// The claims.
    pub claims: JsonObject,
}

impl DecodedJws {
    fn from_token<S>(token: &jwt::Token<JwsHeader, JsonObject, S>) -> Self {
        Self {
            header: token.header().0.clone(),
            claims: token.claims().clone(),
        }
    }

    /// The `alg` of the header, if it names a supported algorithm.
    pub fn algorithm(&self) -> Option<SigningAlgorithm> {
        self.header
            .get("alg")
            .and_then(Value::as_str)
            .and_then(|alg| alg.parse().ok())
    }
}

/// Splits a compact JWS without checking its signature.
pub fn decode_compact(jws: &str) -> Result<DecodedJws, Error<FormatError>> {
    let token: UnverifiedJws = jwt::Token::parse_unverified(jws)
        .foreign_err(|| FormatError::JwsParsingFailed("malformed compact JWS".to_owned()))?;

    Ok(DecodedJws::from_token(&token))
}

/// Decodes a compact JWS and verifies its signature against `public_key`.
///
/// The header `alg` must match the curve of `public_key`.
pub fn verify_compact<V: SignatureVerifier + ?Sized>(
    jws: &str,
    verifier: &V,
    public_key: &JwkPublic,
) -> Result<DecodedJws, Error<SignatureError>> {
    let key_algorithm =
        jwk_signing_algorithm(public_key).with_err(|| SignatureError::InvalidSignature)?;

    // The header is read before verification only to report a rejected `alg`.
    let token: UnverifiedJws = jwt::Token::parse_unverified(jws)
        .foreign_err(|| SignatureError::InvalidSignature)
        .ctx(|| "malformed compact JWS")?;
    let header_alg = token
        .header()
        .0
        .get("alg")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let jwk_verifier = JwkVerifier {
        verifier,
        public_key,
        algorithm: key_algorithm,
        backend_error: Cell::new(None),
    };
    match token.verify_with_key(&jwk_verifier) {
        Ok(verified) => Ok(DecodedJws::from_token(&verified)),
        Err(jwt::Error::AlgorithmMismatch(..)) => Err(Error::root(
            SignatureError::InvalidSigningAlgorithm(header_alg),
        ))
        .ctx(|| format!("key requires {key_algorithm}")),
        Err(error) => {
            let cause: BoxError = jwk_verifier
                .backend_error
                .take()
                .unwrap_or_else(|| Box::new(error));
            Err(cause).foreign_boxed_err(|| SignatureError::InvalidSignature)
        }
    }
}

/// Adapts a [`SignatureVerifier`] and one public key to [`jwt::VerifyingAlgorithm`].
struct JwkVerifier<'a, V: ?Sized> {
    verifier: &'a V,
    public_key: &'a JwkPublic,
    algorithm: SigningAlgorithm,
    /// `jwt::Error` cannot carry the backend's error, so it is kept here.
    backend_error: Cell<Option<BoxError>>,
}

impl<V: SignatureVerifier + ?Sized> jwt::VerifyingAlgorithm for JwkVerifier<'_, V> {
    fn algorithm_type(&self) -> jwt::AlgorithmType {
        self.algorithm.into()
    }

    fn verify_bytes(
        &self,
        header: &str,
        claims: &str,
        signature: &[u8],
    ) -> Result<bool, jwt::Error> {
        let message = format!("{header}.{claims}");

        self.verifier
            .verify(message.as_bytes(), signature, self.public_key)
            .map_err(|error| {
                self.backend_error.set(Some(error));
                jwt::Error::InvalidSignature
            })
    }
}
