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

use std::collections::HashMap;

use bh_jws_utils::base64_url_encode;
use http::{header::CONTENT_TYPE, HeaderMap, HeaderValue};
use rand::RngCore as _;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{describe_rejection, NonceRetry, ProvisioningClient, Server, PKCE_METHOD};
use crate::{
    error::protocol_error, metadata::TxCode, HttpClient, KeyValueStore, Oid4vciError, Result,
    SecureArea, WalletBackend,
};

const PKCE_VERIFIER_SIZE: usize = 32;
const OPENID_CREDENTIAL_DETAILS_TYPE: &str = "openid_credential";

pub(super) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Something the user has to do before the session is authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationChallenge {
    /// Open `url` in a browser and hand the redirect carrying `state` back
    /// through [`AuthorizationResponse::OAuth`].
    OAuth {
        /// The authorization URL.
        url: Url,
        /// The `state` the redirect must carry.
        state: String,
    },
    /// Type in the transaction code described by the offer and hand it back
    /// through [`AuthorizationResponse::TxCode`].
    TxCode(TxCode),
}

/// The answer to an [`AuthorizationChallenge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResponse {
    /// The redirect URL the authorization server sent the user back to.
    OAuth {
        /// The redirect URL with its query parameters.
        parameterized_redirect_url: Url,
    },
    /// The transaction code the user typed in.
    TxCode {
        /// The code.
        code: String,
    },
}

#[derive(Debug, Deserialize)]
struct PushedAuthorizationResponse {
    request_uri: String,
}

impl<A, H, S, B> ProvisioningClient<A, H, S, B>
where
    A: SecureArea,
    H: HttpClient,
    S: KeyValueStore,
    B: WalletBackend,
{
    /// Returns what the user has to do to authorize the session, nothing when
    /// it already is.
    ///
    /// A pre-authorized offer without a transaction code is exchanged for
    /// tokens right away. Otherwise the authorization request is pushed to
    /// the authorization server, or put on the authorization URL when the
    /// server takes no pushed requests, and a fresh `state` is reserved.
    pub async fn get_authorization_challenges(&mut self) -> Result<Vec<AuthorizationChallenge>> {
        if self.session.access_token.is_some() {
            return Ok(Vec::new());
        }

        if let Some(grant) = self.pre_authorized_grant().cloned() {
            if let Some(tx_code) = grant.tx_code {
                return Ok(vec![AuthorizationChallenge::TxCode(tx_code)]);
            }
            self.obtain_token(None, None, Some(&grant.pre_authorized_code), None)
                .await?;
            return Ok(Vec::new());
        }

        let (verifier, challenge) = pkce_pair();
        let state = self.ctx.redirect_states.reserve();

        let url = if self.use_pushed_authorization() {
            self.push_authorization_request(state.as_str(), &challenge)
                .await?
        } else {
            let mut url = self.authorization_endpoint()?.clone();
            url.query_pairs_mut()
                .extend_pairs(self.authorization_params(state.as_str(), &challenge));
            url
        };

        tracing::info!(configuration_id = %self.configuration_id, "authorization requested");
        let challenge = AuthorizationChallenge::OAuth {
            url,
            state: state.as_str().to_owned(),
        };
        self.session.pkce_code_verifier = Some(verifier);
        // replacing an earlier state releases it
        self.session.redirect_state = Some(state);

        Ok(vec![challenge])
    }

    /// Completes the authorization with the user's `response` and obtains the
    /// tokens.
    ///
    /// # Errors
    ///
    /// [`Oid4vciError::Protocol`] when the redirect does not carry the
    /// reserved `state` or no `code`; no token is requested then.
    pub async fn authorize(&mut self, response: AuthorizationResponse) -> Result<()> {
        match response {
            AuthorizationResponse::OAuth {
                parameterized_redirect_url,
            } => {
                let params: HashMap<String, String> = parameterized_redirect_url
                    .query_pairs()
                    .into_owned()
                    .collect();

                let expected = self.session.redirect_state.as_ref().ok_or_else(|| {
                    bherror::Error::root(Oid4vciError::State(
                        "no authorization is pending".to_owned(),
                    ))
                })?;
                if params.get("state").map(String::as_str) != Some(expected.as_str()) {
                    return Err(protocol_error("redirect state does not match"));
                }
                self.session.redirect_state = None;

                if let Some(error) = params.get("error") {
                    let description = params.get("error_description").cloned();
                    return Err(bherror::Error::root(Oid4vciError::Authorization(format!(
                        "Authorization denied: {error}"
                    )))
                    .ctx(description.unwrap_or_default()));
                }
                let code = params
                    .get("code")
                    .ok_or_else(|| protocol_error("redirect carries no authorization code"))?;

                self.obtain_token(None, Some(code), None, None).await
            }
            AuthorizationResponse::TxCode { code } => {
                let pre_authorized_code = self
                    .pre_authorized_grant()
                    .map(|grant| grant.pre_authorized_code.clone())
                    .ok_or_else(|| {
                        bherror::Error::root(Oid4vciError::State(
                            "offer has no pre-authorized code".to_owned(),
                        ))
                    })?;

                self.obtain_token(None, None, Some(&pre_authorized_code), Some(&code))
                    .await
            }
        }
    }

    fn use_pushed_authorization(&self) -> bool {
        self.preferences.par_required.unwrap_or(
            self.authorization_server
                .pushed_authorization_request_endpoint
                .is_some(),
        )
    }

    fn authorization_endpoint(&self) -> Result<&Url> {
        self.authorization_server
            .authorization_endpoint
            .as_ref()
            .ok_or_else(|| protocol_error("authorization server has no authorization endpoint"))
    }

    fn authorization_params(&self, state: &str, code_challenge: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("client_id", self.preferences.client_id.clone()),
            ("response_type", super::CODE_RESPONSE_TYPE.to_owned()),
            ("code_challenge_method", PKCE_METHOD.to_owned()),
            ("redirect_uri", self.preferences.redirect_url.to_string()),
            ("code_challenge", code_challenge.to_owned()),
            ("state", state.to_owned()),
        ];

        match &self.configuration.scope {
            Some(scope) => params.push(("scope", scope.clone())),
            None => params.push((
                "authorization_details",
                json!([{
                    "type": OPENID_CREDENTIAL_DETAILS_TYPE,
                    "credential_configuration_id": self.configuration_id,
                }])
                .to_string(),
            )),
        }
        if let Some(issuer_state) = self.issuer_state() {
            params.push(("issuer_state", issuer_state.to_owned()));
        }

        params
    }

    async fn push_authorization_request(&mut self, state: &str, code_challenge: &str) -> Result<Url> {
        let endpoint = self
            .authorization_server
            .pushed_authorization_request_endpoint
            .clone()
            .ok_or_else(|| {
                protocol_error("authorization server takes no pushed authorization requests")
            })?;
        let authorization_endpoint = self.authorization_endpoint()?.clone();

        let mut params = self.authorization_params(state, code_challenge);
        params.extend(self.client_assertion_params().await?);
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        let response = self
            .post_with_nonce_retry(
                Server::Authorization,
                NonceRetry::NonceUnused,
                &endpoint,
                &form_headers(),
                body.as_bytes(),
            )
            .await?
            .map_err(|response| {
                bherror::Error::root(Oid4vciError::Authorization(
                    "Pushed authorization request rejected by the authorization server".to_owned(),
                ))
                .ctx(describe_rejection(&response))
            })?;
        let pushed: PushedAuthorizationResponse = response.json()?;

        let mut url = authorization_endpoint;
        url.query_pairs_mut()
            .append_pair("client_id", &self.preferences.client_id)
            .append_pair("request_uri", &pushed.request_uri);

        Ok(url)
    }
}

pub(super) fn form_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
    headers
}

/// A PKCE code verifier and its `S256` challenge.
fn pkce_pair() -> (String, String) {
    let mut bytes = [0u8; PKCE_VERIFIER_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    let verifier = base64_url_encode(bytes);
    let challenge = base64_url_encode(openssl::sha::sha256(verifier.as_bytes()));

    (verifier, challenge)
}
