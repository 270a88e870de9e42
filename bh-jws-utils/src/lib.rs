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

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate provides functions and types for working with [JSON Web
//! Signatures (JWS)][1] and the raw ECDSA signatures shared by JWS and COSE.
//!
//! [1]: https://datatracker.ietf.org/doc/html/rfc7515
//!
//! # Details
//!
//! Signing goes through the [`Signer`] trait, producing signatures in the
//! fixed-size `r || s` form both JWS ([RFC 7518][2]) and COSE ([RFC 9053][3])
//! expect. Verification against a JWK goes through [`SignatureVerifier`].
//! Compact JWS values are assembled with [`SigningInput`], so the signature
//! can be produced asynchronously, e.g. by a secure area. Parsing and
//! verification go through the [`jwt`] crate, which is re-exported.
//!
//! A default [`openssl`] backed implementation is available under the default
//! feature `openssl` through [`EcdsaSigner`] and [`EcdsaVerifier`].
//!
//! [2]: https://datatracker.ietf.org/doc/html/rfc7518#section-3.4
//! [3]: https://datatracker.ietf.org/doc/html/rfc9053#section-2.1
//!
//! # Examples
//!
//! ```
//! use bh_jws_utils::{
//!     json_object, verify_compact, EcdsaSigner, EcdsaVerifier, Signer, SigningAlgorithm,
//!     SigningInput,
//! };
//!
//! let signer = EcdsaSigner::generate(SigningAlgorithm::Es256).unwrap();
//! let public_jwk = signer.public_jwk().unwrap();
//!
//! let header = json_object!({ "typ": "JWT", "alg": "ES256" });
//! let claims = json_object!({ "sub": "1234567890", "iat": 1516239022 });
//!
//! let input = SigningInput::new(&header, &claims).unwrap();
//! let signature = Signer::sign(&signer, input.as_bytes()).unwrap();
//! let jws = input.into_compact(&signature);
//! let verified = verify_compact(&jws, &EcdsaVerifier, &public_jwk).unwrap();
//!
//! assert_eq!(verified.claims, claims);
//! ```

#[cfg(feature = "openssl")]
mod openssl_impl;

mod algorithm;
mod error;
mod jwk;
mod jws;
mod traits;

// Re-export the `jwt` crate
pub use jwt;

pub use algorithm::*;
pub use error::*;
pub use jwk::*;
pub use jws::*;
#[cfg(feature = "openssl")]
pub use openssl_impl::*;
pub use traits::*;

/// Helper macro with the same syntax as [`serde_json::json`] specialized for
/// constructing JSON objects.
///
/// It will construct a more specific type ([`serde_json::Map<String,Value>`])
/// than just [`serde_json::Value`] when constructing an object, and panic if
/// the syntax is valid JSON but not an object.
#[macro_export]
macro_rules! json_object {
    ($stuff:tt) => {
        match ::serde_json::json!($stuff) {
            ::serde_json::Value::Object(o) => o,
            _ => unreachable!("JSON literal wasn't an object"),
        }
    };
}
