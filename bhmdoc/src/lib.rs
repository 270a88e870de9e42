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

//! This crate provides the `mso_mdoc` data structures of the [ISO/IEC 18013-5:2021][1] standard
//! that a wallet needs around issuance and presentation, without the proximity transports.
//!
//! [1]: <https://www.iso.org/standard/69084.html>
//!
//! # Details
//!
//! The crate defines the following modules.
//!
//!   * [`issuer_signed`] -- salted issuer signed data elements, their digests, the
//!     [`IssuerNamespacesBuilder`] and selective disclosure through [`IssuerNamespaces::filter`].
//!   * [`cose`] -- `COSE_Sign1` envelopes carrying the signer's `x5chain`.
//!   * [`vical`] -- signing and parsing of Verified Issuer Certificate Authority Lists.
//!   * [`zk`] -- the registry of zero-knowledge proof systems.
//!   * [`models`] -- the low-level _CBOR_ types shared by the above.
//!   * [`error`] -- the error values.
//!
//! # Examples
//!
//! ## Building and disclosing issuer signed data elements
//!
//! ```
//! use bhmdoc::{DigestAlgorithm, IssuerNamespacesBuilder};
//!
//! let namespaces = IssuerNamespacesBuilder::new()
//!     .add_data_element("org.iso.18013.5.1", "family_name", "Doe")
//!     .add_data_element("org.iso.18013.5.1", "age_over_18", true)
//!     .build(&mut rand::thread_rng())?;
//!
//! // the digests go into the Mobile Security Object signed by the issuer
//! let digests = namespaces.value_digests(DigestAlgorithm::Sha256)?;
//! assert_eq!(digests.values().map(|ns| ns.len()).sum::<usize>(), 2);
//!
//! // only the requested elements are presented
//! let disclosed = namespaces.filter([("org.iso.18013.5.1", "age_over_18")]);
//! assert!(disclosed.get("org.iso.18013.5.1", "family_name").is_none());
//! # Ok::<(), bherror::Error<bhmdoc::MdocError>>(())
//! ```

pub mod cose;
pub mod error;
pub mod issuer_signed;
pub mod models;
pub mod vical;
pub mod zk;

pub use error::{MdocError, Result};
pub use issuer_signed::{
    DigestAlgorithm, DigestID, IssuerNamespaces, IssuerNamespacesBuilder, IssuerSignedItem,
    IssuerSignedItemBytes, ValueDigests,
};
pub use models::{
    Bytes, BytesCbor, DataElementIdentifier, DataElementValue, DateTime, DocType, NameSpace,
};
pub use vical::{SignedVical, Vical, VicalCertificateInfo};
pub use zk::{
    ZkDocument, ZkDocumentData, ZkParamValue, ZkSystem, ZkSystemRepository, ZkSystemSpec,
};
