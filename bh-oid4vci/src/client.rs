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

//! The provisioning client, driving a single credential issuance session from
//! a credential offer to the issued credentials.
//!
//! A session moves through the following states:
//!
//! 1. created from an offer, with the issuer and authorization server
//!    metadata resolved ([`ProvisioningClient::create_from_offer`]);
//! 2. waiting for the user to authorize
//!    ([`ProvisioningClient::get_authorization_challenges`]);
//! 3. authorized, holding an access token
//!    ([`ProvisioningClient::authorize`]);
//! 4. holding a key-binding challenge
//!    ([`ProvisioningClient::get_key_binding_challenge`]);
//! 5. done ([`ProvisioningClient::obtain_credentials`]).

mod authorization;
mod credential;
mod token;

use std::sync::Arc;

use bherror::traits::{ErrorContext as _, ForeignBoxed as _, ForeignError as _};
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

pub use authorization::{AuthorizationChallenge, AuthorizationResponse};
pub use credential::{KeyBinding, KeyBindingType, PROOF_JWT_TYPE};

use crate::{
    attestation::{
        CLIENT_ASSERTION_TYPE, CLIENT_ATTESTATION_HEADER, CLIENT_ATTESTATION_POP_HEADER,
    },
    dpop::{DPOP_HEADER, DPOP_NONCE_HEADER},
    error::{format_error, protocol_error},
    metadata::{
        fetch_authorization_server_metadata, fetch_issuer_metadata, AuthorizationServerMetadata,
        CredentialConfiguration, CredentialFormat, CredentialOffer, CredentialOfferRef,
        IssuerMetadata, PreAuthorizedCodeGrant,
    },
    ClientPreferences, HttpClient, HttpResponse, KeyValueStore, Oid4vciError, ProvisioningContext,
    RedirectState, Result, SecureArea, WalletBackend,
};

/// Requests are retried at most once, when the server hands out a fresh DPoP
/// nonce.
const MAX_ATTEMPTS: usize = 2;

const PKCE_METHOD: &str = "S256";
const CODE_RESPONSE_TYPE: &str = "code";
const ATTEST_JWT_CLIENT_AUTH: &str = "attest_jwt_client_auth";
const PRIVATE_KEY_JWT: &str = "private_key_jwt";

/// How the wallet authenticates towards the authorization server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientAuthentication {
    None,
    WalletAttestation,
    ClientAssertion,
}

impl ClientAuthentication {
    fn select(metadata: &AuthorizationServerMetadata) -> Self {
        let supports = |method: &str| {
            metadata
                .token_endpoint_auth_methods_supported
                .iter()
                .any(|supported| supported == method)
        };

        if supports(ATTEST_JWT_CLIENT_AUTH) {
            Self::WalletAttestation
        } else if supports(PRIVATE_KEY_JWT) {
            Self::ClientAssertion
        } else {
            Self::None
        }
    }
}

/// The server a request goes to, which decides the DPoP nonce and the
/// authentication it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Server {
    Authorization,
    Issuer,
}

/// Which rejections carrying a fresh DPoP nonce get their one retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NonceRetry {
    /// A rejected first attempt, whatever nonce it was sent with.
    FirstAttempt,
    /// A rejected first attempt that was sent without a nonce.
    NonceUnused,
}

#[derive(Debug, Default)]
struct Session {
    pkce_code_verifier: Option<String>,
    access_token: Option<String>,
    token_expiration: Option<DateTime<Utc>>,
    refresh_token: Option<String>,
    token_c_nonce: Option<String>,
    authorization_dpop_nonce: Option<String>,
    issuer_dpop_nonce: Option<String>,
    key_challenge: Option<String>,
    redirect_state: Option<RedirectState>,
    notification_id: Option<String>,
}

/// Drives the issuance of one credential configuration of a credential
/// offer.
///
/// The client is meant for a single session; create a new one for every
/// offer.
pub struct ProvisioningClient<A, H, S, B> {
    ctx: Arc<ProvisioningContext<A, H, S, B>>,
    preferences: ClientPreferences,
    offer: CredentialOffer,
    configuration_id: String,
    configuration: CredentialConfiguration,
    issuer_metadata: IssuerMetadata,
    authorization_server: AuthorizationServerMetadata,
    client_authentication: ClientAuthentication,
    session: Session,
}

impl<A, H, S, B> std::fmt::Debug for ProvisioningClient<A, H, S, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningClient")
            .field("credential_issuer", &self.offer.credential_issuer)
            .field("configuration_id", &self.configuration_id)
            .field("authorization_server", &self.authorization_server.issuer)
            .field("authorized", &self.session.access_token.is_some())
            .finish_non_exhaustive()
    }
}

impl<A, H, S, B> ProvisioningClient<A, H, S, B>
where
    A: SecureArea,
    H: HttpClient,
    S: KeyValueStore,
    B: WalletBackend,
{
    /// Starts a session for the credential offer `offer_uri`.
    ///
    /// The offer is resolved and the metadata of the issuer and of its
    /// authorization server fetched. The session issues `configuration_id`,
    /// or the first offered configuration when `None`.
    ///
    /// # Errors
    ///
    /// [`Oid4vciError::Format`] when the offer is malformed,
    /// [`Oid4vciError::Argument`] when `configuration_id` is not offered and
    /// [`Oid4vciError::Protocol`] when the configuration is unknown to the
    /// issuer or the authorization server cannot run the flow.
    pub async fn create_from_offer(
        ctx: Arc<ProvisioningContext<A, H, S, B>>,
        offer_uri: &str,
        preferences: ClientPreferences,
        configuration_id: Option<&str>,
    ) -> Result<Self> {
        let offer = CredentialOfferRef::parse(offer_uri)?
            .resolve(&ctx.http_client)
            .await?;

        let configuration_id = match configuration_id {
            Some(id) if offer.credential_configuration_ids.iter().any(|offered| offered == id) => {
                id.to_owned()
            }
            Some(id) => {
                return Err(bherror::Error::root(Oid4vciError::Argument(format!(
                    "configuration {id} is not offered"
                ))))
            }
            None => offer
                .credential_configuration_ids
                .first()
                .cloned()
                .ok_or_else(|| format_error("credential offer without configurations"))?,
        };

        let issuer_metadata =
            fetch_issuer_metadata(&ctx.http_client, &offer.credential_issuer).await?;
        let configuration = issuer_metadata
            .credential_configurations_supported
            .get(&configuration_id)
            .cloned()
            .ok_or_else(|| {
                protocol_error(format!(
                    "configuration {configuration_id} is unknown to the issuer"
                ))
            })?;
        if configuration.format == CredentialFormat::Unsupported {
            return Err(protocol_error(format!(
                "configuration {configuration_id} has an unsupported format"
            )));
        }

        let authorization_server_url = authorization_server_url(&offer, &issuer_metadata);
        let authorization_server =
            fetch_authorization_server_metadata(&ctx.http_client, &authorization_server_url)
                .await?;

        let client = Self {
            client_authentication: ClientAuthentication::select(&authorization_server),
            ctx,
            preferences,
            offer,
            configuration_id,
            configuration,
            issuer_metadata,
            authorization_server,
            session: Session::default(),
        };
        if client.pre_authorized_grant().is_none() {
            client.check_authorization_code_flow()?;
        }

        tracing::info!(
            credential_issuer = %client.offer.credential_issuer,
            authorization_server = %client.authorization_server.issuer,
            configuration_id = %client.configuration_id,
            "provisioning session created"
        );

        Ok(client)
    }

    /// The resolved credential offer.
    pub fn credential_offer(&self) -> &CredentialOffer {
        &self.offer
    }

    /// The id of the credential configuration being issued.
    pub fn configuration_id(&self) -> &str {
        &self.configuration_id
    }

    /// The credential configuration being issued.
    pub fn configuration(&self) -> &CredentialConfiguration {
        &self.configuration
    }

    /// Metadata of the credential issuer.
    pub fn issuer_metadata(&self) -> &IssuerMetadata {
        &self.issuer_metadata
    }

    /// Metadata of the authorization server in use.
    pub fn authorization_server_metadata(&self) -> &AuthorizationServerMetadata {
        &self.authorization_server
    }

    /// Whether an access token is held.
    pub fn is_authorized(&self) -> bool {
        self.session.access_token.is_some()
    }

    /// The `notification_id` of the last credential response, if any.
    pub fn notification_id(&self) -> Option<&str> {
        self.session.notification_id.as_deref()
    }

    fn pre_authorized_grant(&self) -> Option<&PreAuthorizedCodeGrant> {
        self.offer.grants.as_ref()?.pre_authorized_code.as_ref()
    }

    fn issuer_state(&self) -> Option<&str> {
        self.offer
            .grants
            .as_ref()?
            .authorization_code
            .as_ref()?
            .issuer_state
            .as_deref()
    }

    fn check_authorization_code_flow(&self) -> Result<()> {
        let metadata = &self.authorization_server;

        if !metadata
            .response_types_supported
            .iter()
            .any(|response_type| response_type == CODE_RESPONSE_TYPE)
        {
            return Err(protocol_error("authorization server lacks the code response type"));
        }
        if !metadata
            .code_challenge_methods_supported
            .iter()
            .any(|method| method == PKCE_METHOD)
        {
            return Err(protocol_error("authorization server lacks S256 PKCE"));
        }

        let endpoint_missing = match self.preferences.par_required {
            Some(true) => metadata.pushed_authorization_request_endpoint.is_none(),
            Some(false) => metadata.authorization_endpoint.is_none(),
            None => {
                metadata.pushed_authorization_request_endpoint.is_none()
                    && metadata.authorization_endpoint.is_none()
            }
        };
        if endpoint_missing {
            return Err(protocol_error(
                "authorization server lacks the authorization endpoint to use",
            ));
        }

        Ok(())
    }

    fn dpop_nonce(&mut self, server: Server) -> &mut Option<String> {
        match server {
            Server::Authorization => &mut self.session.authorization_dpop_nonce,
            Server::Issuer => &mut self.session.issuer_dpop_nonce,
        }
    }

    /// Adds the wallet attestation headers when the authorization server
    /// authenticates clients that way. The proof of possession answers the
    /// server's current `nonce`, if any.
    async fn add_client_attestation(
        &self,
        headers: &mut HeaderMap,
        nonce: Option<&str>,
    ) -> Result<()> {
        if self.client_authentication != ClientAuthentication::WalletAttestation {
            return Ok(());
        }

        let attestation = self
            .ctx
            .create_wallet_attestation(
                &self.preferences.client_id,
                &self.authorization_server.issuer,
                nonce,
            )
            .await?;
        insert_header(
            headers,
            HeaderName::from_static(CLIENT_ATTESTATION_HEADER),
            &attestation.attestation,
        )?;
        insert_header(
            headers,
            HeaderName::from_static(CLIENT_ATTESTATION_POP_HEADER),
            &attestation.proof_of_possession,
        )
    }

    /// The `client_assertion` form parameters, when the authorization server
    /// authenticates clients that way.
    async fn client_assertion_params(&self) -> Result<Vec<(&'static str, String)>> {
        if self.client_authentication != ClientAuthentication::ClientAssertion {
            return Ok(Vec::new());
        }

        let assertion = self
            .ctx
            .create_client_assertion(
                &self.preferences.client_id,
                self.authorization_server.issuer.as_str(),
            )
            .await?;

        Ok(vec![
            ("client_assertion_type", CLIENT_ASSERTION_TYPE.to_owned()),
            ("client_assertion", assertion),
        ])
    }

    /// POSTs `body` to `url` with a DPoP proof, retrying once when the server
    /// rejects the request and hands out a fresh DPoP nonce.
    ///
    /// Returns the final response, `Err` when it is not a success.
    async fn post_with_nonce_retry(
        &mut self,
        server: Server,
        retry: NonceRetry,
        url: &Url,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<std::result::Result<HttpResponse, HttpResponse>> {
        let mut attempt = 1;
        loop {
            let mut request_headers = headers.clone();
            let nonce = self.dpop_nonce(server).clone();
            let nonce_was_used = nonce.is_some();
            let access_token = match server {
                Server::Issuer => self.session.access_token.clone(),
                Server::Authorization => None,
            };

            let dpop = self
                .ctx
                .generate_dpop(
                    &self.preferences.client_id,
                    url,
                    nonce.as_deref(),
                    access_token.as_deref(),
                )
                .await?;
            insert_header(
                &mut request_headers,
                HeaderName::from_static(DPOP_HEADER),
                &dpop,
            )?;
            if let Some(access_token) = &access_token {
                insert_header(
                    &mut request_headers,
                    http::header::AUTHORIZATION,
                    &format!("DPoP {access_token}"),
                )?;
            }
            if server == Server::Authorization {
                self.add_client_attestation(&mut request_headers, nonce.as_deref())
                    .await?;
            }

            tracing::debug!(%url, attempt, "sending request");
            let response = self
                .ctx
                .http_client
                .post(url, request_headers, body.to_vec())
                .await
                .foreign_boxed_err(|| Oid4vciError::Http)
                .ctx(|| format!("POST {url}"))?;

            let fresh_nonce = response.header(DPOP_NONCE_HEADER).map(str::to_owned);
            let nonce_received = fresh_nonce.is_some();
            if fresh_nonce.is_some() {
                *self.dpop_nonce(server) = fresh_nonce;
            }

            if response.is_success() {
                return Ok(Ok(response));
            }
            let retry_allowed = match retry {
                NonceRetry::FirstAttempt => true,
                NonceRetry::NonceUnused => !nonce_was_used,
            };
            if attempt < MAX_ATTEMPTS && nonce_received && retry_allowed {
                tracing::debug!(%url, status = %response.status, "retrying with a fresh DPoP nonce");
                attempt += 1;
                continue;
            }

            tracing::warn!(%url, status = %response.status, "request rejected");
            return Ok(Err(response));
        }
    }
}

/// The authorization server named by the offer grant, else the first one of
/// the issuer, else the issuer itself.
fn authorization_server_url(offer: &CredentialOffer, issuer_metadata: &IssuerMetadata) -> Url {
    let from_grant = offer.grants.as_ref().and_then(|grants| {
        grants
            .pre_authorized_code
            .as_ref()
            .and_then(|grant| grant.authorization_server.clone())
            .or_else(|| {
                grants
                    .authorization_code
                    .as_ref()
                    .and_then(|grant| grant.authorization_server.clone())
            })
    });

    from_grant
        .or_else(|| issuer_metadata.authorization_servers.first().cloned())
        .unwrap_or_else(|| issuer_metadata.credential_issuer.clone())
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value)
        .foreign_err(|| Oid4vciError::Format(format!("invalid {name} header value")))?;
    headers.insert(name, value);
    Ok(())
}

/// A short description of a rejected response, for the error context.
fn describe_rejection(response: &HttpResponse) -> String {
    format!(
        "server answered {}: {}",
        response.status,
        String::from_utf8_lossy(&response.body)
    )
}
