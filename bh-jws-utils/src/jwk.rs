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

use bherror::Error;
use serde_json::{Map, Value};

use crate::{error::FormatError, jws::base64_url_encode, SigningAlgorithm};

/// A JSON object meant to represent a public JWK.
///
/// Since this is a type alias, no aspects of the schema are enforced; this is
/// left to any end-consumers of the public key, such as
/// [`SignatureVerifier`](crate::SignatureVerifier).
pub type JwkPublic = Map<String, Value>;

const KTY: &str = "EC";

/// Builds the public JWK of an EC key from its big-endian affine coordinates.
///
/// The coordinates must already be padded to the curve's
/// [`coordinate_size`](SigningAlgorithm::coordinate_size).
pub fn ec_public_affine_coords_to_jwk(
    algorithm: SigningAlgorithm,
    x_bytes: &[u8],
    y_bytes: &[u8],
    kid: Option<&str>,
) -> JwkPublic {
    let mut jwk = crate::json_object!({
        "kty": KTY,
        "crv": algorithm.curve_name(),
        "x": base64_url_encode(x_bytes),
        "y": base64_url_encode(y_bytes),
    });

    if let Some(kid) = kid {
        jwk.insert("kid".to_owned(), Value::String(kid.to_owned()));
    }

    jwk
}

/// Returns the algorithm matching the curve of an EC `public_key`.
pub fn jwk_signing_algorithm(
    public_key: &JwkPublic,
) -> Result<SigningAlgorithm, Error<FormatError>> {
    check_jwk_field(public_key, "kty", KTY)?;

    let crv = jwk_str_field(public_key, "crv")?;
    SigningAlgorithm::from_curve_name(crv).ok_or_else(|| {
        Error::root(FormatError::JwkParsingFailed(format!(
            "unsupported curve {crv}"
        )))
    })
}

/// Returns the decoded affine coordinates `(x, y)` of an EC `public_key`,
/// checked against the curve's coordinate size.
pub fn jwk_affine_coords(
    public_key: &JwkPublic,
) -> Result<(Vec<u8>, Vec<u8>), Error<FormatError>> {
    let algorithm = jwk_signing_algorithm(public_key)?;

    let coordinate = |name: &str| -> Result<Vec<u8>, Error<FormatError>> {
        let encoded = jwk_str_field(public_key, name)?;
        let decoded = crate::base64_url_decode(encoded).map_err(|_| {
            Error::root(FormatError::JwkParsingFailed(format!(
                "coordinate {name} is not base64url"
            )))
        })?;
        if decoded.len() != algorithm.coordinate_size() {
            return Err(Error::root(FormatError::JwkParsingFailed(format!(
                "coordinate {name} has {} bytes, expected {}",
                decoded.len(),
                algorithm.coordinate_size()
            ))));
        }
        Ok(decoded)
    };

    Ok((coordinate("x")?, coordinate("y")?))
}

fn jwk_str_field<'a>(
    public_key: &'a JwkPublic,
    field: &str,
) -> Result<&'a str, Error<FormatError>> {
    public_key
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::root(FormatError::JwkParsingFailed(format!(
                "missing \"{field}\" field"
            )))
        })
}

fn check_jwk_field(
    public_key: &JwkPublic,
    field: &str,
    expected_value: &str,
) -> Result<(), Error<FormatError>> {
    let value = jwk_str_field(public_key, field)?;

    if value == expected_value {
        return Ok(());
    }

    Err(Error::root(FormatError::JwkParsingFailed(format!(
        "incorrect value on \"{field}\" field"
    )))
    .ctx(format!("value was {value}, expected {expected_value}")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    // https://datatracker.ietf.org/doc/html/rfc7517#appendix-A.1
    fn rfc_p256_jwk() -> JwkPublic {
        crate::json_object!({
            "kty": "EC",
            "crv": "P-256",
            "x": "MKBCTNIcKUSDii11ySs3526iDZ8AiTo7Tu6KPAqv7D4",
            "y": "4Etl6SRW2YiLUrN5vfvVHuhp7x8PxltmWWlbbM4IFyM",
            "use": "enc",
            "kid": "1"
        })
    }

    #[test]
    fn rfc_example_key_is_parsed() {
        let jwk = rfc_p256_jwk();

        assert_eq!(jwk_signing_algorithm(&jwk).unwrap(), SigningAlgorithm::Es256);

        let (x, y) = jwk_affine_coords(&jwk).unwrap();
        let rebuilt = ec_public_affine_coords_to_jwk(SigningAlgorithm::Es256, &x, &y, Some("1"));
        assert_eq!(rebuilt["x"], jwk["x"]);
        assert_eq!(rebuilt["y"], jwk["y"]);
        assert_eq!(rebuilt["kid"], "1");
    }

    #[test]
    fn malformed_keys_are_rejected() {
        let mut missing_kty = rfc_p256_jwk();
        missing_kty.remove("kty");
        assert_eq!(
            jwk_signing_algorithm(&missing_kty).unwrap_err().error,
            FormatError::JwkParsingFailed("missing \"kty\" field".to_owned())
        );

        let mut rsa = rfc_p256_jwk();
        rsa.insert("kty".to_owned(), "RSA".into());
        assert_matches!(
            jwk_signing_algorithm(&rsa).unwrap_err().error,
            FormatError::JwkParsingFailed(_)
        );

        // a P-256 coordinate claimed to be on P-384
        let mut wrong_curve = rfc_p256_jwk();
        wrong_curve.insert("crv".to_owned(), "P-384".into());
        assert_matches!(
            jwk_affine_coords(&wrong_curve).unwrap_err().error,
            FormatError::JwkParsingFailed(message) if message.contains("expected 48")
        );
    }
}
