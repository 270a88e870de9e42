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

/// Error returned by the crate API.
#[derive(strum_macros::Display, Debug, PartialEq, Clone)]
pub enum Asn1Error {
    /// The input is not a well-formed DER encoding.
    #[strum(to_string = "Malformed DER encoding: {0}")]
    Format(String),
    /// An integer does not fit into the requested Rust type.
    #[strum(to_string = "Integer value does not fit into 64 bits")]
    Overflow,
    /// A value cannot be represented in DER.
    #[strum(to_string = "Value cannot be DER encoded: {0}")]
    Encoding(String),
    /// A certificate does not have the expected structure.
    #[strum(to_string = "Invalid X.509 certificate: {0}")]
    Certificate(String),
}

impl bherror::BhError for Asn1Error {}

/// The [`bherror::Result`] type with the error type of [`Asn1Error`], used throughout this crate.
pub type Result<T> = bherror::Result<T, Asn1Error>;

#[track_caller]
pub(crate) fn format_error(message: impl Into<String>) -> bherror::Error<Asn1Error> {
    bherror::Error::root(Asn1Error::Format(message.into()))
}
