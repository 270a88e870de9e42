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

//! Extension traits on [`Result`] for converting, propagating and annotating errors.

use std::panic::Location;

use crate::{BhError, Error};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Converts results carrying a third-party error into [`crate::Result`].
pub trait ForeignError<T, S, E>
where
    S: std::error::Error + Send + Sync + 'static,
    E: BhError,
{
    /// Wraps the error `S` as the source of the error produced by `f`.
    ///
    /// Do not use it on something that is already a [`crate::Result`]; use [`PropagateError`].
    fn foreign_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E;

    /// Like [`ForeignError::foreign_err`], but the new error is chosen by inspecting `S`.
    fn match_foreign_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce(&S) -> E;
}

impl<T, S, E> ForeignError<T, S, E> for Result<T, S>
where
    S: std::error::Error + Send + Sync + 'static,
    E: BhError,
{
    #[track_caller]
    fn foreign_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E,
    {
        let location = Location::caller();
        self.map_err(|source| Error::from_foreign(f(), source).warn(location))
    }

    #[track_caller]
    fn match_foreign_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce(&S) -> E,
    {
        let location = Location::caller();
        self.map_err(|source| Error::from_foreign(f(&source), source).warn(location))
    }
}

/// Converts results carrying a boxed third-party error into [`crate::Result`].
pub trait ForeignBoxed<T, E: BhError> {
    /// Wraps the boxed error as the source of the error produced by `f`.
    fn foreign_boxed_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E;
}

impl<T, E: BhError> ForeignBoxed<T, E> for Result<T, BoxError> {
    #[track_caller]
    fn foreign_boxed_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E,
    {
        let location = Location::caller();
        self.map_err(|source| Error::from_foreign_boxed(f(), source).warn(location))
    }
}

/// Converts a [`crate::Result`] of one error type into another, keeping the chain.
pub trait PropagateError<T, S: BhError, E: BhError> {
    /// Wraps the current error as the source of the error produced by `f`.
    fn with_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E;

    /// Like [`PropagateError::with_err`], but the new error is chosen by inspecting `S`.
    fn match_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce(&S) -> E;
}

impl<T, S: BhError, E: BhError> PropagateError<T, S, E> for crate::Result<T, S> {
    fn with_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce() -> E,
    {
        self.map_err(|source| Error::from_known(f(), source))
    }

    fn match_err<F>(self, f: F) -> crate::Result<T, E>
    where
        F: FnOnce(&S) -> E,
    {
        self.map_err(|source| Error::from_known(f(&source.error), source))
    }
}

/// Attaches lazily evaluated context to the error of a [`crate::Result`].
pub trait ErrorContext<T, E: BhError> {
    /// Adds the context returned by `f` to the [`Err`] variant.
    fn ctx<C, F>(self, f: F) -> crate::Result<T, E>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E: BhError> ErrorContext<T, E> for crate::Result<T, E> {
    fn ctx<C, F>(self, f: F) -> crate::Result<T, E>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|error| error.ctx(f()))
    }
}

/// Logs the error of a [`crate::Result`] at the error level.
pub trait Loggable {
    /// Logs the error, if any, and returns `self` unchanged.
    fn log_err(self) -> Self;
}

impl<T, E: BhError> Loggable for crate::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Self {
        let location = Location::caller();
        self.inspect_err(|error| log::error!(target: &location.to_string(), "{:?}", error))
    }
}
