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

use chrono::{Duration, Utc};
use serde::Deserialize;

use super::{authorization::form_headers, describe_rejection, NonceRetry, ProvisioningClient, Server};
use crate::{HttpClient, KeyValueStore, Oid4vciError, Result, SecureArea, WalletBackend};

/// Access tokens closer than this to their expiration are refreshed.
const REFRESH_MARGIN_SECONDS: i64 = 30;

const AUTHORIZATION_CODE_GRANT_TYPE: &str = "authorization_code";
const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";
const PRE_AUTHORIZED_CODE_GRANT_TYPE: &str =
    "urn:ietf:params:oauth:grant-type:pre-authorized_code";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    c_nonce: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Grant<'a> {
    RefreshToken(&'a str),
    AuthorizationCode(&'a str),
    PreAuthorizedCode {
        code: &'a str,
        tx_code: Option<&'a str>,
    },
}

impl Grant<'_> {
    fn rejection_message(&self) -> &'static str {
        match self {
            Self::RefreshToken(_) => "Refresh token (seed credential) rejected by the issuer",
            Self::AuthorizationCode(_) => "Authorization code rejected by the issuer",
            Self::PreAuthorizedCode { .. } => "Pre-authorized code rejected by the issuer",
        }
    }
}

impl<A, H, S, B> ProvisioningClient<A, H, S, B>
where
    A: SecureArea,
    H: HttpClient,
    S: KeyValueStore,
    B: WalletBackend,
{
    /// Exchanges exactly one of a refresh token, an authorization code or a
    /// pre-authorized code for an access token.
    ///
    /// `tx_code` goes with the pre-authorized code. On success the access
    /// token, its expiration, the refresh token and any `c_nonce` are kept in
    /// the session.
    ///
    /// # Errors
    ///
    /// [`Oid4vciError::Argument`] unless exactly one grant is given and
    /// [`Oid4vciError::Authorization`] when the authorization server rejects
    /// it.
    pub async fn obtain_token(
        &mut self,
        refresh_token: Option<&str>,
        authorization_code: Option<&str>,
        pre_authorized_code: Option<&str>,
        tx_code: Option<&str>,
    ) -> Result<()> {
        let grant = match (refresh_token, authorization_code, pre_authorized_code) {
            (Some(token), None, None) => Grant::RefreshToken(token),
            (None, Some(code), None) => Grant::AuthorizationCode(code),
            (None, None, Some(code)) => Grant::PreAuthorizedCode { code, tx_code },
            _ => {
                return Err(bherror::Error::root(Oid4vciError::Argument(
                    "exactly one token grant must be given".to_owned(),
                )))
            }
        };
        if tx_code.is_some() && !matches!(grant, Grant::PreAuthorizedCode { .. }) {
            return Err(bherror::Error::root(Oid4vciError::Argument(
                "transaction code without pre-authorized code".to_owned(),
            )));
        }

        let mut params = vec![("client_id", self.preferences.client_id.clone())];
        match grant {
            Grant::RefreshToken(token) => {
                params.push(("grant_type", REFRESH_TOKEN_GRANT_TYPE.to_owned()));
                params.push(("refresh_token", token.to_owned()));
            }
            Grant::AuthorizationCode(code) => {
                let verifier = self.session.pkce_code_verifier.clone().ok_or_else(|| {
                    bherror::Error::root(Oid4vciError::State(
                        "no PKCE code verifier for the authorization code".to_owned(),
                    ))
                })?;
                params.push(("grant_type", AUTHORIZATION_CODE_GRANT_TYPE.to_owned()));
                params.push(("code", code.to_owned()));
                params.push(("code_verifier", verifier));
                params.push(("redirect_uri", self.preferences.redirect_url.to_string()));
            }
            Grant::PreAuthorizedCode { code, tx_code } => {
                params.push(("grant_type", PRE_AUTHORIZED_CODE_GRANT_TYPE.to_owned()));
                params.push(("pre-authorized_code", code.to_owned()));
                if let Some(tx_code) = tx_code {
                    params.push(("tx_code", tx_code.to_owned()));
                }
            }
        }
        params.extend(self.client_assertion_params().await?);
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        let endpoint = self.authorization_server.token_endpoint.clone();
        let response = self
            .post_with_nonce_retry(
                Server::Authorization,
                NonceRetry::FirstAttempt,
                &endpoint,
                &form_headers(),
                body.as_bytes(),
            )
            .await?
            .map_err(|response| {
                bherror::Error::root(Oid4vciError::Authorization(
                    grant.rejection_message().to_owned(),
                ))
                .ctx(describe_rejection(&response))
            })?;
        let token: TokenResponse = response.json()?;

        let now = Utc::now();
        self.session.token_expiration = token
            .expires_in
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));
        self.session.access_token = Some(token.access_token);
        if token.refresh_token.is_some() {
            self.session.refresh_token = token.refresh_token;
        }
        if token.c_nonce.is_some() {
            self.session.token_c_nonce = token.c_nonce;
        }
        if matches!(grant, Grant::AuthorizationCode(_)) {
            self.session.pkce_code_verifier = None;
        }

        tracing::info!(
            configuration_id = %self.configuration_id,
            expiration = ?self.session.token_expiration,
            "access token obtained"
        );

        Ok(())
    }

    /// Refreshes the access token when none is held or it expires in less
    /// than 30 seconds, provided there is a refresh token.
    ///
    /// # Errors
    ///
    /// [`Oid4vciError::NotAuthorized`] when there is neither an access nor a
    /// refresh token.
    pub async fn refresh_access_if_needed(&mut self) -> Result<()> {
        let expiring = match (&self.session.access_token, self.session.token_expiration) {
            (None, _) => true,
            (Some(_), Some(expiration)) => {
                expiration - Utc::now() < Duration::seconds(REFRESH_MARGIN_SECONDS)
            }
            (Some(_), None) => false,
        };
        if !expiring {
            return Ok(());
        }

        match self.session.refresh_token.clone() {
            Some(refresh_token) => {
                tracing::debug!(configuration_id = %self.configuration_id, "refreshing access token");
                self.obtain_token(Some(&refresh_token), None, None, None)
                    .await
            }
            // an expiring token may still be accepted
            None if self.session.access_token.is_some() => Ok(()),
            None => Err(bherror::Error::root(Oid4vciError::NotAuthorized)),
        }
    }
}
