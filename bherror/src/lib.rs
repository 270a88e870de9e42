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

//! Error handling shared by the codec and provisioning crates of this workspace.
//!
//! Every fallible function returns [`Result<T, E>`], i.e. `std::result::Result<T, Error<E>>`,
//! where `E` is a crate specific error enum implementing [`BhError`].  The [`Error`] wrapper keeps
//! the chain of source errors together with free-form context, and every freshly constructed
//! error is logged as a warning through the [`log`] facade.
//!
//! # Details
//!
//! * A brand new error is created with [`Error::root`].
//! * Errors coming from third-party crates ("foreign" errors, anything implementing
//!   [`std::error::Error`]) are converted with [`ForeignError`][traits::ForeignError], or with
//!   [`ForeignBoxed`][traits::ForeignBoxed] when they are already boxed.
//! * An [`Error`] of one [`BhError`] type is converted into another one with
//!   [`PropagateError`][traits::PropagateError], which keeps the original error as the source.
//! * Extra context is attached with [`Error::ctx`] or, on a [`Result`], with
//!   [`ErrorContext`][traits::ErrorContext].
//! * [`Loggable`][traits::Loggable] logs an error at the error level, on top of the warning
//!   emitted on construction.
//!
//! The [`Debug`] representation of an [`Error`] is a JSON object holding the whole chain, which
//! makes the logs machine-readable.
//!
//! # Examples
//!
//! ```
//! use bherror::traits::{ErrorContext, ForeignError, PropagateError};
//!
//! #[derive(Debug)]
//! enum LengthError {
//!     NotANumber,
//!     TooLong,
//! }
//!
//! impl std::fmt::Display for LengthError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         match self {
//!             Self::NotANumber => write!(f, "Length is not a number"),
//!             Self::TooLong => write!(f, "Length exceeds the limit"),
//!         }
//!     }
//! }
//!
//! impl bherror::BhError for LengthError {}
//!
//! fn parse_length(s: &str) -> bherror::Result<u32, LengthError> {
//!     let length: u32 = s
//!         .parse()
//!         .foreign_err(|| LengthError::NotANumber)
//!         .ctx(|| format!("parsing {s}"))?;
//!     if length > 0xffff {
//!         return Err(bherror::Error::root(LengthError::TooLong));
//!     }
//!     Ok(length)
//! }
//!
//! struct DecodeError;
//!
//! impl std::fmt::Display for DecodeError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "Decoding failed")
//!     }
//! }
//!
//! impl bherror::BhError for DecodeError {}
//!
//! fn decode_header(s: &str) -> bherror::Result<u32, DecodeError> {
//!     parse_length(s).with_err(|| DecodeError)
//! }
//!
//! assert!(decode_header("70000").is_err());
//! ```

use std::panic::Location;

mod display;
pub mod traits;

/// Marker trait for the error enums wrapped by [`Error`].
///
/// Implementors should not implement [`std::error::Error`] themselves; the [`Error`] wrapper
/// takes care of that.
pub trait BhError: std::fmt::Display + Send + Sync + 'static {}

impl<E: BhError + ?Sized> BhError for Box<E> {}

trait KnownError: std::error::Error + Send + Sync {
    fn as_err(&self) -> &(dyn std::error::Error + 'static);
}

impl<E: BhError> KnownError for Error<E> {
    fn as_err(&self) -> &(dyn std::error::Error + 'static) {
        self
    }
}

enum ErrorSource {
    Known(Box<dyn KnownError>),
    Foreign(Box<dyn std::error::Error + Send + Sync>),
}

/// Error wrapper carrying a [`BhError`] value, its context and its source.
pub struct Error<E: BhError> {
    /// The concrete error value.
    pub error: E,
    context: Vec<Box<dyn std::fmt::Display + Send + Sync>>,
    source: Option<ErrorSource>,
}

/// [`std::result::Result`] with the error wrapped in [`Error`].
pub type Result<T, E> = std::result::Result<T, Error<E>>;

impl<E: BhError> Error<E> {
    /// Creates an error without a source and logs it as a warning.
    ///
    /// Use it where the failure is first detected.  Propagating another error through this
    /// constructor loses the chain; use the [`traits`] instead.
    #[track_caller]
    pub fn root(error: E) -> Self {
        Self::with_source(error, None).warn(Location::caller())
    }

    fn with_source(error: E, source: Option<ErrorSource>) -> Self {
        Self {
            error,
            context: Vec::new(),
            source,
        }
    }

    fn from_foreign<S>(error: E, source: S) -> Self
    where
        S: std::error::Error + Send + Sync + 'static,
    {
        Self::with_source(error, Some(ErrorSource::Foreign(Box::new(source))))
    }

    fn from_foreign_boxed(error: E, source: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::with_source(error, Some(ErrorSource::Foreign(source)))
    }

    fn from_known<S: BhError>(error: E, source: Error<S>) -> Self {
        Self::with_source(error, Some(ErrorSource::Known(Box::new(source))))
    }

    /// Appends a piece of context to the error.
    ///
    /// Can be called repeatedly; all the context is kept in insertion order.
    pub fn ctx<C>(mut self, context: C) -> Self
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.context.push(Box::new(context));
        self
    }

    /// Returns the attached context rendered as strings.
    pub fn context(&self) -> Vec<String> {
        self.context.iter().map(ToString::to_string).collect()
    }

    pub(crate) fn warn(self, location: &Location<'_>) -> Self {
        log::warn!(target: &location.to_string(), "{:?}", self);
        self
    }
}

impl<E: BhError> std::error::Error for Error<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|source| match source {
            ErrorSource::Known(source) => source.as_err(),
            ErrorSource::Foreign(source) => source.as_ref() as _,
        })
    }
}
