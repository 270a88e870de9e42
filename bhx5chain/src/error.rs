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

/// Errors of the x5chain handling and the test certificate minting.
#[derive(strum_macros::Display, Debug, PartialEq, Clone)]
pub enum Error {
    /// The certificates do not form a chain, or are not valid DER.
    #[strum(to_string = "Invalid x5chain")]
    X5Chain,
    /// The chain has no certificates at all.
    #[strum(to_string = "Empty x5chain")]
    EmptyChain,
    /// Minting a test certificate failed.
    #[strum(to_string = "The certificate builder failed")]
    Builder,
}

impl bherror::BhError for Error {}

/// The [`bherror::Result`] type with the error type of
/// [`x5chain::Error`](Error), used throughout this crate.
pub type Result<T> = bherror::Result<T, Error>;
