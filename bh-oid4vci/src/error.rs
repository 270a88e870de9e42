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
pub enum Oid4vciError {
    /// Error when a credential offer, metadata document or server response
    /// cannot be parsed.
    #[strum(to_string = "Invalid format: {0}")]
    Format(String),
    /// Error when a server does not provide what the protocol requires, or
    /// answers with something the protocol does not allow.
    #[strum(to_string = "Protocol violation: {0}")]
    Protocol(String),
    /// Error when the authorization server rejects a pushed authorization or
    /// token request.
    #[strum(to_string = "{0}")]
    Authorization(String),
    /// Error when the credential issuer rejects a credential request.
    #[strum(to_string = "{0}")]
    Issuance(String),
    /// Error when an operation needs tokens and none have been obtained.
    #[strum(to_string = "Not authorized, no access or refresh token")]
    NotAuthorized,
    /// Error when an operation is invoked in a session state that does not
    /// allow it.
    #[strum(to_string = "Invalid state: {0}")]
    State(String),
    /// Error when the caller passes an invalid combination of arguments.
    #[strum(to_string = "Invalid argument: {0}")]
    Argument(String),
    /// Error when the HTTP transport fails.
    #[strum(to_string = "HTTP request failed")]
    Http,
    /// Error when the secure area fails to create, resolve or use a key.
    #[strum(to_string = "Secure area operation failed")]
    SecureArea,
    /// Error when the key-value storage fails.
    #[strum(to_string = "Storage operation failed")]
    Storage,
    /// Error when the wallet backend fails to produce an attestation or
    /// assertion.
    #[strum(to_string = "Wallet backend request failed")]
    Backend,
    /// Error when assembling a signed JWT fails.
    #[strum(to_string = "Cryptographic operation failed")]
    Crypto,
}

impl bherror::BhError for Oid4vciError {}

/// Type alias for [`bherror::Result`] types returned by the crate's API.
pub type Result<T> = bherror::Result<T, Oid4vciError>;

#[track_caller]
pub(crate) fn format_error(message: impl Into<String>) -> bherror::Error<Oid4vciError> {
    bherror::Error::root(Oid4vciError::Format(message.into()))
}

#[track_caller]
pub(crate) fn protocol_error(message: impl Into<String>) -> bherror::Error<Oid4vciError> {
    bherror::Error::root(Oid4vciError::Protocol(message.into()))
}
