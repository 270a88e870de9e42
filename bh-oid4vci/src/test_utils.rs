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

//! Mock collaborators and a mock issuer for the tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use bh_jws_utils::{base64_url_encode, BoxError};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::{json, Value};
use url::Url;

use crate::{
    HttpClient, HttpResponse, InMemoryStore, KeyInfo, ProvisioningContext, SoftwareSecureArea,
    WalletBackend,
};

pub(crate) const ISSUER: &str = "https://issuer.example";
pub(crate) const AUTH_SERVER: &str = "https://auth.example";
pub(crate) const CLIENT_ID: &str = "wallet-client";
pub(crate) const REDIRECT_URL: &str = "https://wallet.example/redirect";

pub(crate) const ISSUER_METADATA_URL: &str =
    "https://issuer.example/.well-known/openid-credential-issuer";
pub(crate) const AUTH_SERVER_METADATA_URL: &str =
    "https://auth.example/.well-known/oauth-authorization-server";
pub(crate) const OPENID_CONFIGURATION_URL: &str =
    "https://auth.example/.well-known/openid-configuration";
pub(crate) const PAR_URL: &str = "https://auth.example/par";
pub(crate) const AUTHORIZE_URL: &str = "https://auth.example/authorize";
pub(crate) const TOKEN_URL: &str = "https://auth.example/token";
pub(crate) const NONCE_URL: &str = "https://issuer.example/nonce";
pub(crate) const CREDENTIAL_URL: &str = "https://issuer.example/credential";

pub(crate) const MDL_CONFIGURATION: &str = "org.iso.18013.5.1.mDL";
pub(crate) const PID_CONFIGURATION: &str = "eu.europa.ec.eudi.pid.1";
pub(crate) const KEYLESS_CONFIGURATION: &str = "keyless.badge";

pub(crate) const MOCK_WALLET_ATTESTATION: &str = "wallet-attestation-jwt";

pub(crate) type TestContext =
    ProvisioningContext<SoftwareSecureArea, MockHttpClient, InMemoryStore, MockWalletBackend>;

pub(crate) fn test_context() -> TestContext {
    ProvisioningContext::new(
        SoftwareSecureArea::new(),
        MockHttpClient::default(),
        InMemoryStore::new(),
        MockWalletBackend::default(),
    )
}

/// A request as seen by [`MockHttpClient`].
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Vec<u8>,
}

impl RecordedRequest {
    pub(crate) fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body).into_owned().collect()
    }

    pub(crate) fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|value| value.to_str().unwrap())
    }
}

type Handler = Box<dyn Fn(&RecordedRequest) -> HttpResponse + Send + Sync>;

/// Serves registered routes, answering `404` to everything else, and keeps
/// every request it receives.
#[derive(Default)]
pub(crate) struct MockHttpClient {
    routes: Mutex<HashMap<(Method, String), Handler>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpClient {
    pub(crate) fn route<F>(&self, method: Method, url: &str, handler: F)
    where
        F: Fn(&RecordedRequest) -> HttpResponse + Send + Sync + 'static,
    {
        self.routes
            .lock()
            .unwrap()
            .insert((method, url.to_owned()), Box::new(handler));
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| route_key(&request.url) == url)
            .collect()
    }

    fn serve(&self, request: RecordedRequest) -> HttpResponse {
        let key = (request.method.clone(), route_key(&request.url));
        let response = match self.routes.lock().unwrap().get(&key) {
            Some(handler) => handler(&request),
            None => json_response(StatusCode::NOT_FOUND, json!({ "error": "not_found" })),
        };
        self.requests.lock().unwrap().push(request);

        response
    }
}

fn route_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.as_str().trim_end_matches('/').to_owned()
}

impl HttpClient for MockHttpClient {
    async fn get(&self, url: &Url, headers: HeaderMap) -> Result<HttpResponse, BoxError> {
        Ok(self.serve(RecordedRequest {
            method: Method::GET,
            url: url.clone(),
            headers,
            body: Vec::new(),
        }))
    }

    async fn post(
        &self,
        url: &Url,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Result<HttpResponse, BoxError> {
        Ok(self.serve(RecordedRequest {
            method: Method::POST,
            url: url.clone(),
            headers,
            body,
        }))
    }
}

/// Backend answering with fixed or easily recognizable values.
#[derive(Debug, Default)]
pub(crate) struct MockWalletBackend {
    /// When set, wallet attestations are JWTs expiring at this timestamp
    /// instead of [`MOCK_WALLET_ATTESTATION`].
    pub(crate) attestation_exp: Mutex<Option<i64>>,
    pub(crate) attestations_issued: AtomicUsize,
}

impl MockWalletBackend {
    pub(crate) fn issue_attestations_expiring_at(&self, exp: i64) {
        *self.attestation_exp.lock().unwrap() = Some(exp);
    }

    pub(crate) fn attestations_issued(&self) -> usize {
        self.attestations_issued.load(Ordering::SeqCst)
    }
}

impl WalletBackend for MockWalletBackend {
    async fn wallet_attestation(
        &self,
        client_id: &str,
        key_info: &KeyInfo,
    ) -> Result<String, BoxError> {
        let serial = self.attestations_issued.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(exp) = *self.attestation_exp.lock().unwrap() else {
            return Ok(MOCK_WALLET_ATTESTATION.to_owned());
        };

        let header = json!({ "alg": "ES256", "typ": "oauth-client-attestation+jwt" });
        let claims = json!({
            "sub": client_id,
            "exp": exp,
            "key": key_info.alias,
            "serial": serial,
        });
        Ok(format!(
            "{}.{}.c2lnbmF0dXJl",
            base64_url_encode(header.to_string()),
            base64_url_encode(claims.to_string()),
        ))
    }

    async fn client_assertion(&self, client_id: &str, audience: &str) -> Result<String, BoxError> {
        Ok(format!("client-assertion.{client_id}.{audience}"))
    }

    async fn key_attestation(
        &self,
        keys: &[KeyInfo],
        nonce: Option<&str>,
    ) -> Result<String, BoxError> {
        Ok(format!(
            "key-attestation.{}.{}",
            keys.len(),
            nonce.unwrap_or("no-nonce")
        ))
    }
}

pub(crate) fn json_response(status: StatusCode, body: Value) -> HttpResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    HttpResponse {
        status,
        headers,
        body: body.to_string().into_bytes(),
    }
}

pub(crate) fn with_dpop_nonce(mut response: HttpResponse, nonce: &str) -> HttpResponse {
    response
        .headers
        .insert("dpop-nonce", HeaderValue::from_str(nonce).unwrap());
    response
}

/// Always rejects, handing out a new DPoP nonce every time, and counts the
/// attempts.
pub(crate) fn nonce_rejecting_handler(
    attempts: Arc<AtomicUsize>,
) -> impl Fn(&RecordedRequest) -> HttpResponse + Send + Sync + 'static {
    move |_| {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        with_dpop_nonce(
            json_response(
                StatusCode::BAD_REQUEST,
                json!({ "error": "use_dpop_nonce" }),
            ),
            &format!("nonce-{attempt}"),
        )
    }
}

/// Rejects the first request with a DPoP nonce, then delegates to
/// `response`.
pub(crate) fn nonce_then<F>(
    nonce: &'static str,
    response: F,
) -> impl Fn(&RecordedRequest) -> HttpResponse + Send + Sync + 'static
where
    F: Fn(&RecordedRequest) -> HttpResponse + Send + Sync + 'static,
{
    let attempts = AtomicUsize::new(0);
    move |request| {
        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            with_dpop_nonce(
                json_response(
                    StatusCode::BAD_REQUEST,
                    json!({ "error": "use_dpop_nonce" }),
                ),
                nonce,
            )
        } else {
            response(request)
        }
    }
}

pub(crate) fn issuer_metadata() -> Value {
    json!({
        "credential_issuer": ISSUER,
        "authorization_servers": [AUTH_SERVER],
        "credential_endpoint": CREDENTIAL_URL,
        "nonce_endpoint": NONCE_URL,
        "display": [{ "name": "Example Issuer", "locale": "en" }],
        "credential_configurations_supported": {
            MDL_CONFIGURATION: {
                "format": "mso_mdoc",
                "doctype": "org.iso.18013.5.1.mDL",
                "scope": "mDL",
                "cryptographic_binding_methods_supported": ["cose_key"],
                "proof_types_supported": {
                    "jwt": { "proof_signing_alg_values_supported": ["ES256", "ES384"] }
                }
            },
            PID_CONFIGURATION: {
                "format": "dc+sd-jwt",
                "vct": "urn:eudi:pid:1",
                "cryptographic_binding_methods_supported": ["jwk"],
                "proof_types_supported": {
                    "attestation": { "proof_signing_alg_values_supported": ["ES256"] }
                }
            },
            KEYLESS_CONFIGURATION: {
                "format": "dc+sd-jwt",
                "vct": "urn:example:badge",
                "scope": "badge"
            },
            "ldp.degree": {
                "format": "ldp_vc",
                "credential_definition": { "type": ["VerifiableCredential"] }
            }
        }
    })
}

pub(crate) fn authorization_server_metadata() -> Value {
    json!({
        "issuer": AUTH_SERVER,
        "authorization_endpoint": AUTHORIZE_URL,
        "pushed_authorization_request_endpoint": PAR_URL,
        "token_endpoint": TOKEN_URL,
        "response_types_supported": ["code"],
        "code_challenge_methods_supported": ["S256"],
        "token_endpoint_auth_methods_supported": ["attest_jwt_client_auth"],
        "dpop_signing_alg_values_supported": ["ES256"]
    })
}

pub(crate) fn token_response(access_token: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "DPoP",
        "expires_in": expires_in,
        "refresh_token": format!("refresh-{access_token}")
    })
}

pub(crate) const MDOC_BYTES: &[u8] = &[0xa2, 0x01, 0x02, 0x03, 0x04];
pub(crate) const SD_JWT: &str = "eyJhbGciOiJFUzI1NiJ9.eyJ2Y3QiOiJ1cm4ifQ.c2ln~WyJzYWx0IiwiYSIsMV0~";

/// Registers a well-behaved issuer and authorization server.
pub(crate) fn mock_issuer(http_client: &MockHttpClient) {
    http_client.route(Method::GET, ISSUER_METADATA_URL, |_| {
        json_response(StatusCode::OK, issuer_metadata())
    });
    http_client.route(Method::GET, AUTH_SERVER_METADATA_URL, |_| {
        json_response(StatusCode::OK, authorization_server_metadata())
    });
    http_client.route(Method::POST, PAR_URL, |_| {
        json_response(
            StatusCode::CREATED,
            json!({ "request_uri": "urn:ietf:params:oauth:request_uri:par-1", "expires_in": 60 }),
        )
    });
    http_client.route(Method::POST, TOKEN_URL, |_| {
        json_response(StatusCode::OK, token_response("access-1", 3600))
    });
    http_client.route(Method::POST, NONCE_URL, |_| {
        json_response(StatusCode::OK, json!({ "c_nonce": "c-nonce-1" }))
    });
    http_client.route(Method::POST, CREDENTIAL_URL, |request| {
        let credential = match request.json()["format"].as_str() {
            Some("mso_mdoc") => Value::String(base64_url_encode(MDOC_BYTES)),
            _ => Value::String(SD_JWT.to_owned()),
        };
        json_response(
            StatusCode::OK,
            json!({
                "credentials": [{ "credential": credential }],
                "notification_id": "notification-1"
            }),
        )
    });
}

/// An offer URI carrying `offer` by value.
pub(crate) fn offer_uri(offer: &Value) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("credential_offer", &offer.to_string())
        .finish();
    format!("openid-credential-offer://?{query}")
}

pub(crate) fn authorization_code_offer(configuration_id: &str) -> Value {
    json!({
        "credential_issuer": ISSUER,
        "credential_configuration_ids": [configuration_id],
        "grants": { "authorization_code": { "issuer_state": "issuer-state-1" } }
    })
}

pub(crate) fn pre_authorized_offer(configuration_id: &str, tx_code: Option<Value>) -> Value {
    let mut grant = json!({ "pre-authorized_code": "pre-auth-1" });
    if let Some(tx_code) = tx_code {
        grant["tx_code"] = tx_code;
    }

    json!({
        "credential_issuer": ISSUER,
        "credential_configuration_ids": [configuration_id],
        "grants": { "urn:ietf:params:oauth:grant-type:pre-authorized_code": grant }
    })
}
