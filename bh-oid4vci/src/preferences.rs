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

use bh_jws_utils::SigningAlgorithm;
use bherror::traits::ForeignError as _;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Oid4vciError, Result};

/// Wallet side configuration of the provisioning client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPreferences {
    /// OAuth `client_id` of the wallet.
    pub client_id: String,
    /// Redirect URI the authorization server sends the user back to.
    pub redirect_url: Url,
    /// Preferred locales for display metadata, most preferred first.
    #[serde(default)]
    pub locales: Vec<String>,
    /// Algorithms the wallet can sign proofs with, most preferred first.
    #[serde(default = "default_signing_algorithms")]
    pub signing_algorithms: Vec<SigningAlgorithm>,
    /// Forces the use of pushed authorization requests (`true`) or the plain
    /// authorization endpoint (`false`) regardless of what the server
    /// prefers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub par_required: Option<bool>,
}

fn default_signing_algorithms() -> Vec<SigningAlgorithm> {
    vec![SigningAlgorithm::Es256]
}

impl ClientPreferences {
    /// Preferences with default locales and algorithms.
    pub fn new(client_id: impl Into<String>, redirect_url: Url) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_url,
            locales: Vec::new(),
            signing_algorithms: default_signing_algorithms(),
            par_required: None,
        }
    }

    /// Loads the preferences from their JSON representation.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .foreign_err(|| Oid4vciError::Format("invalid client preferences".to_owned()))
    }

    /// The most preferred of our algorithms among the `supported` ones.
    pub fn select_algorithm<S: AsRef<str>>(&self, supported: &[S]) -> Option<SigningAlgorithm> {
        self.signing_algorithms.iter().copied().find(|algorithm| {
            supported
                .iter()
                .any(|name| name.as_ref() == algorithm.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn preferences_load_from_json_with_defaults() {
        let preferences = ClientPreferences::from_json(
            r#"{
                "clientId": "wallet-dev",
                "redirectUrl": "https://wallet.example/redirect"
            }"#,
        )
        .unwrap();

        assert_eq!(
            preferences,
            ClientPreferences::new(
                "wallet-dev",
                Url::parse("https://wallet.example/redirect").unwrap()
            )
        );
    }

    #[test]
    fn preferences_load_every_field() {
        let preferences = ClientPreferences::from_json(
            r#"{
                "clientId": "wallet-dev",
                "redirectUrl": "wallet://callback",
                "locales": ["hr", "en"],
                "signingAlgorithms": ["ES384", "ES256"],
                "parRequired": false
            }"#,
        )
        .unwrap();

        assert_eq!(preferences.locales, ["hr", "en"]);
        assert_eq!(
            preferences.signing_algorithms,
            [SigningAlgorithm::Es384, SigningAlgorithm::Es256]
        );
        assert_eq!(preferences.par_required, Some(false));
        assert_eq!(preferences.redirect_url.scheme(), "wallet");
    }

    #[test]
    fn invalid_preferences_are_rejected() {
        let err = ClientPreferences::from_json(r#"{ "clientId": "wallet-dev" }"#).unwrap_err();
        assert_matches!(err.error, Oid4vciError::Format(_));
    }

    #[test]
    fn algorithm_selection_follows_our_order() {
        let mut preferences =
            ClientPreferences::new("wallet", Url::parse("https://wallet.example").unwrap());
        preferences.signing_algorithms = vec![SigningAlgorithm::Es512, SigningAlgorithm::Es256];

        assert_eq!(
            preferences.select_algorithm(&["ES256", "ES512"]),
            Some(SigningAlgorithm::Es512)
        );
        assert_eq!(
            preferences.select_algorithm(&["ES256"]),
            Some(SigningAlgorithm::Es256)
        );
        assert_eq!(preferences.select_algorithm(&["EdDSA"]), None);
    }
}
