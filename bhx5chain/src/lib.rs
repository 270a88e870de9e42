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

//! This crate provides the [`X5Chain`] type, an ordered array of X.509 certificates (`x5chain`) as
//! defined in [RFC 9360][1].
//!
//! [1]: <https://www.rfc-editor.org/rfc/rfc9360.html#section-2-5.4.1>
//!
//! The chain is used as the `x5chain` COSE header of signed VICAL documents and of Mobile Security
//! Objects, and as the key source when verifying those signatures.
//!
//! # Examples
//!
//! ```ignore
//! let x5chain = bhx5chain::X5Chain::new(vec![signer_certificate, iaca_certificate])
//!     .expect("valid x5chain");
//!
//! let der_certificates = x5chain.as_bytes().expect("DER encoding");
//! let parsed = bhx5chain::X5Chain::from_raw_bytes(&der_certificates).expect("valid x5chain");
//!
//! assert_eq!(parsed, x5chain);
//! ```
//!
//! With the `test-utils` feature enabled, the [`CertificateBuilder`] mints throwaway EC
//! certificates for tests of dependent crates.

mod error;
mod x5chain;

#[cfg(any(feature = "test-utils", test))]
mod builder;

#[cfg(any(feature = "test-utils", test))]
pub use builder::*;
pub use error::*;
pub use x5chain::*;
