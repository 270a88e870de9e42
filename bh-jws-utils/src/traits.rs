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

use crate::{JwkPublic, SigningAlgorithm};

/// Boxed error returned by the signing and verification backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Signs messages with a single key.
pub trait Signer {
    /// The algorithm the signatures are produced with.
    fn algorithm(&self) -> SigningAlgorithm;

    /// Signs `message`, returning the signature in the fixed-size `r || s`
    /// form.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, BoxError>;

    /// The public JWK of the signing key.
    fn public_jwk(&self) -> Result<JwkPublic, BoxError>;
}

/// Verifies `r || s` signatures against public JWKs.
pub trait SignatureVerifier: Sync {
    /// Verifies `signature` over `message`, returning `Ok(false)` if it does
    /// not match and an error if `public_key` or `signature` are unusable.
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &JwkPublic,
    ) -> Result<bool, BoxError>;
}

impl<S: Signer + ?Sized> Signer for &S {
    fn algorithm(&self) -> SigningAlgorithm {
        (**self).algorithm()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, BoxError> {
        (**self).sign(message)
    }

    fn public_jwk(&self) -> Result<JwkPublic, BoxError> {
        (**self).public_jwk()
    }
}
