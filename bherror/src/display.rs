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

use std::fmt::{Debug, Display, Formatter, Result};

use crate::{BhError, Error, ErrorSource};

// Only the outermost error.
impl<E: BhError> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.error)
    }
}

// The whole chain as a single JSON object.
impl<E: BhError> Debug for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{{\"error\":{}", json_string(&self.error.to_string()))?;

        if !self.context.is_empty() {
            let context: Vec<String> = self
                .context
                .iter()
                .map(|context| json_string(&context.to_string()))
                .collect();
            write!(f, ",\"context\":[{}]", context.join(","))?;
        }

        match &self.source {
            Some(ErrorSource::Known(source)) => write!(f, ",\"source\":{:?}", source)?,
            Some(ErrorSource::Foreign(source)) => {
                write!(f, ",\"source\":")?;
                foreign_chain(source.as_ref(), f)?;
            }
            None => {}
        }

        write!(f, "}}")
    }
}

fn foreign_chain(error: &dyn std::error::Error, f: &mut Formatter<'_>) -> Result {
    write!(f, "{{\"error\":{}", json_string(&format!("{error:?}")))?;
    if let Some(source) = error.source() {
        write!(f, ",\"source\":")?;
        foreign_chain(source, f)?;
    }
    write!(f, "}}")
}

fn json_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}
