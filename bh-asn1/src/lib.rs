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

//! This crate implements the Distinguished Encoding Rules (DER) of [ITU-T X.690][1] for the
//! subset of ASN.1 needed when handling certificates and key attestations.
//!
//! [1]: <https://www.itu.int/rec/T-REC-X.690>
//!
//! # Details
//!
//! Values are modelled by the [`Asn1Object`] enum.  [`decode`] parses exactly one DER value,
//! [`decode_multiple`] parses a concatenation of values and [`encode`] produces the canonical
//! encoding.  Universal tags this crate does not understand are kept as [`Asn1Object::Raw`] so
//! that unknown certificate extensions survive a decode/encode cycle byte for byte.
//!
//! Indefinite lengths (BER) are rejected.
//!
//! [`pretty_print`] renders a human readable tree for diagnostics, and the [`x509`] module
//! extracts the handful of certificate fields needed by the mdoc crates.
//!
//! # Examples
//!
//! ```
//! use bh_asn1::{decode, encode, Asn1Object};
//!
//! let der = [0x30, 0x03, 0x02, 0x01, 0x05];
//! let value = decode(&der).unwrap().unwrap();
//!
//! assert_eq!(value, Asn1Object::Sequence(vec![Asn1Object::integer(5)]));
//! assert_eq!(encode(&value), der);
//! ```

mod error;
mod integer;
mod object;
mod oid;
mod pretty;
mod tag;
mod time;
pub mod x509;

pub use error::*;
pub use integer::{der_decode_i64, der_encode_i64};
pub use object::*;
pub use oid::*;
pub use pretty::pretty_print;
pub use tag::*;
pub use time::*;
