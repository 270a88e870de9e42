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

//! This module defines the error values returned by the crate API.

/// Error type used across the crate API.
#[derive(strum_macros::Display, Debug, PartialEq, Clone)]
pub enum MdocError {
    /// Error when a CBOR or COSE structure does not have the expected shape.
    #[strum(to_string = "Invalid format: {0}")]
    Format(String),
    /// Error when a builder is configured with unusable values.
    #[strum(to_string = "Invalid configuration: {0}")]
    Config(String),
    /// Error when a certificate listed in a VICAL carries no subject key identifier.
    #[strum(to_string = "Certificate has no Subject Key Identifier")]
    MissingSubjectKeyIdentifier,
    /// Error when a COSE signature does not match the key it is checked against.
    #[strum(to_string = "Signature verification failed")]
    SignatureVerification,
    /// Error when we fail to produce a signature.
    #[strum(to_string = "Error when signing data")]
    Signing,
    /// Error when we expect an `x5chain` but it is missing or invalid.
    #[strum(to_string = "Missing or invalid X5Chain")]
    X5Chain,
    /// Error when the data model is missing a signing algorithm or if we don't support it.
    #[strum(to_string = "Signing algorithm is missing or unsupported")]
    MissingSigningAlgorithm,
    /// Error when we try to construct [`DateTime`][crate::DateTime] from an invalid value.
    #[strum(to_string = "Invalid value for Date Time")]
    InvalidDateTime,
    /// Error when no registered zero-knowledge system can handle the request.
    #[strum(to_string = "Zero-knowledge system not found: {0}")]
    SystemNotFound(String),
    /// Error when a zero-knowledge system fails to produce or verify a proof.
    #[strum(to_string = "Zero-knowledge proof failed: {0}")]
    ZkProof(String),
}

impl bherror::BhError for MdocError {}

/// Type alias for [`bherror::Result`] types returned by the crate's API.
pub type Result<T> = bherror::Result<T, MdocError>;

/// Shorthand for a root [`MdocError::Format`] error.
#[track_caller]
pub(crate) fn format_error(message: impl Into<String>) -> bherror::Error<MdocError> {
    bherror::Error::root(MdocError::Format(message.into()))
}
