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

use bh_jws_utils::{base64_url_decode, json_object, SigningAlgorithm};
use bherror::traits::{ErrorContext as _, ForeignBoxed as _, ForeignError as _};
use http::{header::CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{describe_rejection, NonceRetry, ProvisioningClient, Server};
use crate::{
    context::now_timestamp,
    dpop::DPOP_NONCE_HEADER,
    error::{format_error, protocol_error},
    metadata::{CredentialFormat, ProofTypeSupported},
    HttpClient, KeyInfo, KeyValueStore, Oid4vciError, Result, SecureArea, WalletBackend,
};

/// `typ` header of key proof JWTs.
pub const PROOF_JWT_TYPE: &str = "openid4vci-proof+jwt";

const JWT_PROOF_TYPE: &str = "jwt";
const ATTESTATION_PROOF_TYPE: &str = "attestation";

/// How the issued credential is bound to device keys, as the issuer expects
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyBindingType {
    /// The credential is not bound to a key.
    Keyless,
    /// Every key proves possession with a JWT signed by it.
    OpenidProofOfPossession {
        /// Algorithm the proofs and keys must use.
        algorithm: SigningAlgorithm,
        /// `iss` of the proofs.
        client_id: String,
        /// `aud` of the proofs.
        aud: String,
    },
    /// The keys are covered by a key attestation from the wallet backend.
    Attestation {
        /// Algorithm the keys must use.
        algorithm: SigningAlgorithm,
    },
}

/// The keys to bind the issued credentials to, one credential per key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyBinding {
    /// No keys, for [`KeyBindingType::Keyless`].
    Keyless,
    /// Keys proving possession individually, for
    /// [`KeyBindingType::OpenidProofOfPossession`].
    OpenidProofOfPossession(Vec<KeyInfo>),
    /// Keys covered by a key attestation, for
    /// [`KeyBindingType::Attestation`].
    Attestation(Vec<KeyInfo>),
}

#[derive(Debug, Deserialize)]
struct NonceResponse {
    c_nonce: String,
}

#[derive(Debug, Deserialize)]
struct CredentialResponse {
    #[serde(default)]
    credentials: Option<Vec<IssuedCredential>>,
    /// Responses of issuers implementing earlier drafts.
    #[serde(default)]
    credential: Option<Value>,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    notification_id: Option<String>,
    #[serde(default)]
    c_nonce: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IssuedCredential {
    credential: Value,
}

impl<A, H, S, B> ProvisioningClient<A, H, S, B>
where
    A: SecureArea,
    H: HttpClient,
    S: KeyValueStore,
    B: WalletBackend,
{
    /// The key binding the issuer expects for the configuration, from its
    /// supported proof types.
    ///
    /// JWT proofs are used when the issuer takes them, key attestations
    /// otherwise.
    pub fn key_binding_type(&self) -> Result<KeyBindingType> {
        let proof_types = &self.configuration.proof_types_supported;
        if proof_types.is_empty() {
            return Ok(KeyBindingType::Keyless);
        }

        if let Some(proof_type) = proof_types.get(JWT_PROOF_TYPE) {
            return Ok(KeyBindingType::OpenidProofOfPossession {
                algorithm: self.proof_algorithm(proof_type)?,
                client_id: self.preferences.client_id.clone(),
                aud: self
                    .issuer_metadata
                    .credential_issuer
                    .as_str()
                    .trim_end_matches('/')
                    .to_owned(),
            });
        }
        if let Some(proof_type) = proof_types.get(ATTESTATION_PROOF_TYPE) {
            return Ok(KeyBindingType::Attestation {
                algorithm: self.proof_algorithm(proof_type)?,
            });
        }

        Err(protocol_error(format!(
            "configuration {} supports no known proof type",
            self.configuration_id
        )))
    }

    fn proof_algorithm(&self, proof_type: &ProofTypeSupported) -> Result<SigningAlgorithm> {
        self.preferences
            .select_algorithm(&proof_type.proof_signing_alg_values_supported)
            .ok_or_else(|| protocol_error("no common proof signing algorithm"))
    }

    /// Obtains the challenge the key proofs or the key attestation must
    /// carry, from the issuer's nonce endpoint or else the `c_nonce` of the
    /// token response.
    ///
    /// # Errors
    ///
    /// [`Oid4vciError::State`] for credentials that are not bound to keys.
    pub async fn get_key_binding_challenge(&mut self) -> Result<String> {
        if self.key_binding_type()? == KeyBindingType::Keyless {
            return Err(bherror::Error::root(Oid4vciError::State(
                "keyless credentials take no key-binding challenge".to_owned(),
            )));
        }

        let challenge = match self.issuer_metadata.nonce_endpoint.clone() {
            Some(endpoint) => {
                let response = self
                    .ctx
                    .http_client
                    .post(&endpoint, HeaderMap::new(), Vec::new())
                    .await
                    .foreign_boxed_err(|| Oid4vciError::Http)
                    .ctx(|| format!("POST {endpoint}"))?;
                if let Some(nonce) = response.header(DPOP_NONCE_HEADER) {
                    self.session.issuer_dpop_nonce = Some(nonce.to_owned());
                }
                if !response.is_success() {
                    return Err(protocol_error("nonce endpoint refused a challenge")
                        .ctx(describe_rejection(&response)));
                }
                response.json::<NonceResponse>()?.c_nonce
            }
            None => self
                .session
                .token_c_nonce
                .take()
                .ok_or_else(|| protocol_error("issuer hands out no key-binding challenge"))?,
        };

        tracing::debug!(configuration_id = %self.configuration_id, "key-binding challenge obtained");
        self.session.key_challenge = Some(challenge.clone());

        Ok(challenge)
    }

    /// Requests the credentials, one per key of `key_binding` or a single
    /// one for keyless configurations.
    ///
    /// mdoc credentials are returned as their CBOR bytes and SD-JWT VCs as
    /// their UTF-8 compact serialization.
    ///
    /// # Errors
    ///
    /// [`Oid4vciError::Argument`] when `key_binding` does not match
    /// [`Self::key_binding_type`] and [`Oid4vciError::Issuance`] when the
    /// issuer rejects the request.
    pub async fn obtain_credentials(&mut self, key_binding: KeyBinding) -> Result<Vec<Vec<u8>>> {
        self.refresh_access_if_needed().await?;

        let proofs = match (self.key_binding_type()?, &key_binding) {
            (KeyBindingType::Keyless, KeyBinding::Keyless) => None,
            (
                KeyBindingType::OpenidProofOfPossession {
                    algorithm,
                    client_id,
                    aud,
                },
                KeyBinding::OpenidProofOfPossession(keys),
            ) if !keys.is_empty() => {
                let mut jwts = Vec::with_capacity(keys.len());
                for key in keys {
                    check_key_algorithm(key, algorithm)?;
                    jwts.push(self.proof_jwt(key, &client_id, &aud).await?);
                }
                Some(json!({ JWT_PROOF_TYPE: jwts }))
            }
            (KeyBindingType::Attestation { algorithm }, KeyBinding::Attestation(keys))
                if !keys.is_empty() =>
            {
                for key in keys {
                    check_key_algorithm(key, algorithm)?;
                }
                let attestation = self
                    .ctx
                    .backend
                    .key_attestation(keys, self.session.key_challenge.as_deref())
                    .await
                    .foreign_boxed_err(|| Oid4vciError::Backend)
                    .ctx(|| "cannot obtain key attestation")?;
                Some(json!({ ATTESTATION_PROOF_TYPE: [attestation] }))
            }
            (expected, _) => {
                return Err(bherror::Error::root(Oid4vciError::Argument(format!(
                    "key binding does not match the configuration, expected {expected:?}"
                ))))
            }
        };

        let mut request = json!({ "credential_configuration_id": self.configuration_id });
        match &self.configuration.format {
            CredentialFormat::MsoMdoc { doctype } => {
                request["format"] = json!("mso_mdoc");
                request["doctype"] = json!(doctype);
            }
            CredentialFormat::SdJwtVc { vct } => {
                request["format"] = json!("dc+sd-jwt");
                request["vct"] = json!(vct);
            }
            CredentialFormat::Unsupported => {
                return Err(protocol_error("configuration has an unsupported format"))
            }
        }
        if let Some(proofs) = proofs {
            request["proofs"] = proofs;
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let endpoint = self.issuer_metadata.credential_endpoint.clone();
        let response = self
            .post_with_nonce_retry(
                Server::Issuer,
                NonceRetry::FirstAttempt,
                &endpoint,
                &headers,
                request.to_string().as_bytes(),
            )
            .await?
            .map_err(|response| {
                bherror::Error::root(Oid4vciError::Issuance(
                    "Credential request rejected by the issuer".to_owned(),
                ))
                .ctx(describe_rejection(&response))
            })?;
        let response: CredentialResponse = response.json()?;

        // a challenge is good for one request
        self.session.key_challenge = None;
        if response.c_nonce.is_some() {
            self.session.token_c_nonce = response.c_nonce;
        }
        if response.notification_id.is_some() {
            self.session.notification_id = response.notification_id;
        }

        let issued = match (response.credentials, response.credential) {
            (Some(credentials), _) => credentials
                .into_iter()
                .map(|issued| issued.credential)
                .collect(),
            (None, Some(credential)) => vec![credential],
            (None, None) if response.transaction_id.is_some() => {
                return Err(bherror::Error::root(Oid4vciError::Issuance(
                    "Deferred issuance is not supported".to_owned(),
                )))
            }
            (None, None) => Vec::new(),
        };
        if issued.is_empty() {
            return Err(protocol_error("credential response carries no credential"));
        }

        let credentials = issued
            .into_iter()
            .map(|credential| decode_credential(&self.configuration.format, credential))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            configuration_id = %self.configuration_id,
            count = credentials.len(),
            "credentials obtained"
        );

        Ok(credentials)
    }

    async fn proof_jwt(&self, key: &KeyInfo, client_id: &str, aud: &str) -> Result<String> {
        let header = json_object!({
            "typ": PROOF_JWT_TYPE,
            "jwk": key.public_key,
        });
        let mut claims = json_object!({
            "iss": client_id,
            "aud": aud,
            "iat": now_timestamp(),
        });
        if let Some(challenge) = &self.session.key_challenge {
            claims.insert("nonce".to_owned(), challenge.as_str().into());
        }

        self.ctx.sign_jwt(key, header, &claims).await
    }
}

fn check_key_algorithm(key: &KeyInfo, algorithm: SigningAlgorithm) -> Result<()> {
    if key.algorithm != algorithm {
        return Err(bherror::Error::root(Oid4vciError::Argument(format!(
            "key {} uses {}, the issuer expects {algorithm}",
            key.alias, key.algorithm
        ))));
    }

    Ok(())
}

fn decode_credential(format: &CredentialFormat, credential: Value) -> Result<Vec<u8>> {
    let Value::String(credential) = credential else {
        return Err(format_error("issued credential is not a string"));
    };

    match format {
        CredentialFormat::MsoMdoc { .. } => base64_url_decode(credential.trim_end_matches('='))
            .foreign_err(|| Oid4vciError::Format("mdoc is not base64url".to_owned())),
        CredentialFormat::SdJwtVc { .. } => Ok(credential.into_bytes()),
        CredentialFormat::Unsupported => Err(protocol_error("unsupported credential format")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use assert_matches::assert_matches;
    use bh_jws_utils::{base64_url_encode, decode_compact, verify_compact, EcdsaVerifier};
    use http::{Method, StatusCode};

    use super::*;
    use crate::{
        client::tests::{client_for, issuer_context, TestClient},
        test_utils::*,
        KeySettings,
    };

    async fn authorized_client(
        ctx: &Arc<TestContext>,
        configuration_id: &str,
    ) -> TestClient {
        let mut client = client_for(ctx, pre_authorized_offer(configuration_id, None))
            .await
            .unwrap();
        client.get_authorization_challenges().await.unwrap();
        client
    }

    async fn device_key(ctx: &TestContext, algorithm: SigningAlgorithm) -> KeyInfo {
        ctx.secure_area
            .create_key(None, &KeySettings::new(algorithm))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn key_binding_type_follows_the_proof_types() {
        let ctx = issuer_context();

        let mdl = client_for(&ctx, pre_authorized_offer(MDL_CONFIGURATION, None))
            .await
            .unwrap();
        assert_eq!(
            mdl.key_binding_type().unwrap(),
            KeyBindingType::OpenidProofOfPossession {
                algorithm: SigningAlgorithm::Es256,
                client_id: CLIENT_ID.to_owned(),
                aud: ISSUER.to_owned(),
            }
        );

        let pid = client_for(&ctx, pre_authorized_offer(PID_CONFIGURATION, None))
            .await
            .unwrap();
        assert_eq!(
            pid.key_binding_type().unwrap(),
            KeyBindingType::Attestation {
                algorithm: SigningAlgorithm::Es256
            }
        );

        let badge = client_for(&ctx, pre_authorized_offer(KEYLESS_CONFIGURATION, None))
            .await
            .unwrap();
        assert_eq!(badge.key_binding_type().unwrap(), KeyBindingType::Keyless);
    }

    #[tokio::test]
    async fn proof_algorithm_must_be_shared() {
        let ctx = issuer_context();
        let mut preferences = crate::client::tests::preferences();
        preferences.signing_algorithms = vec![SigningAlgorithm::Es512];

        let client = ProvisioningClient::create_from_offer(
            ctx.clone(),
            &offer_uri(&pre_authorized_offer(MDL_CONFIGURATION, None)),
            preferences,
            None,
        )
        .await
        .unwrap();

        let err = client.key_binding_type().unwrap_err();
        assert_matches!(err.error, Oid4vciError::Protocol(_));
    }

    #[tokio::test]
    async fn challenge_comes_from_the_nonce_endpoint() {
        let ctx = issuer_context();
        let mut client = authorized_client(&ctx, MDL_CONFIGURATION).await;

        let challenge = client.get_key_binding_challenge().await.unwrap();

        assert_eq!(challenge, "c-nonce-1");
        assert_eq!(client.session.key_challenge.as_deref(), Some("c-nonce-1"));
        assert_eq!(ctx.http_client.requests_to(NONCE_URL).len(), 1);
    }

    #[tokio::test]
    async fn challenge_falls_back_to_the_token_nonce() {
        let ctx = issuer_context();
        ctx.http_client.route(Method::GET, ISSUER_METADATA_URL, |_| {
            let mut metadata = issuer_metadata();
            metadata.as_object_mut().unwrap().remove("nonce_endpoint");
            json_response(StatusCode::OK, metadata)
        });
        ctx.http_client.route(Method::POST, TOKEN_URL, |_| {
            let mut response = token_response("access-1", 3600);
            response["c_nonce"] = json!("token-c-nonce");
            json_response(StatusCode::OK, response)
        });
        let mut client = authorized_client(&ctx, MDL_CONFIGURATION).await;

        assert_eq!(
            client.get_key_binding_challenge().await.unwrap(),
            "token-c-nonce"
        );
        let err = client.get_key_binding_challenge().await.unwrap_err();
        assert_matches!(err.error, Oid4vciError::Protocol(_));
    }

    #[tokio::test]
    async fn keyless_configuration_takes_no_challenge() {
        let ctx = issuer_context();
        let mut client = authorized_client(&ctx, KEYLESS_CONFIGURATION).await;

        let err = client.get_key_binding_challenge().await.unwrap_err();

        assert_matches!(err.error, Oid4vciError::State(_));
        assert!(ctx.http_client.requests_to(NONCE_URL).is_empty());
    }

    #[tokio::test]
    async fn mdoc_is_issued_per_proven_key() {
        let ctx = issuer_context();
        let mut client = authorized_client(&ctx, MDL_CONFIGURATION).await;
        let keys = vec![
            device_key(&ctx, SigningAlgorithm::Es256).await,
            device_key(&ctx, SigningAlgorithm::Es256).await,
        ];
        let challenge = client.get_key_binding_challenge().await.unwrap();

        let credentials = client
            .obtain_credentials(KeyBinding::OpenidProofOfPossession(keys.clone()))
            .await
            .unwrap();

        assert_eq!(credentials, [MDOC_BYTES.to_vec()]);
        assert_eq!(client.notification_id(), Some("notification-1"));
        assert!(client.session.key_challenge.is_none());

        let request = &ctx.http_client.requests_to(CREDENTIAL_URL)[0];
        let body = request.json();
        assert_eq!(body["credential_configuration_id"], MDL_CONFIGURATION);
        assert_eq!(body["format"], "mso_mdoc");
        assert_eq!(body["doctype"], "org.iso.18013.5.1.mDL");

        let jwts = body["proofs"]["jwt"].as_array().unwrap();
        assert_eq!(jwts.len(), 2);
        for (jwt, key) in jwts.iter().zip(&keys) {
            let proof = verify_compact(jwt.as_str().unwrap(), &EcdsaVerifier, &key.public_key)
                .unwrap();
            assert_eq!(proof.header["typ"], PROOF_JWT_TYPE);
            assert_eq!(
                proof.header["jwk"],
                Value::Object(key.public_key.clone())
            );
            assert_eq!(proof.claims["iss"], CLIENT_ID);
            assert_eq!(proof.claims["aud"], ISSUER);
            assert_eq!(proof.claims["nonce"], challenge);
        }

        assert_eq!(request.header("authorization"), Some("DPoP access-1"));
        let dpop = decode_compact(request.header("dpop").unwrap()).unwrap();
        assert_eq!(dpop.claims["htu"], CREDENTIAL_URL);
        assert_eq!(
            dpop.claims["ath"],
            base64_url_encode(openssl::sha::sha256(b"access-1"))
        );
        assert!(request.header("oauth-client-attestation").is_none());
    }

    #[tokio::test]
    async fn sd_jwt_is_issued_under_key_attestation() {
        let ctx = issuer_context();
        let mut client = authorized_client(&ctx, PID_CONFIGURATION).await;
        let keys = vec![
            device_key(&ctx, SigningAlgorithm::Es256).await,
            device_key(&ctx, SigningAlgorithm::Es256).await,
            device_key(&ctx, SigningAlgorithm::Es256).await,
        ];
        client.get_key_binding_challenge().await.unwrap();

        let credentials = client
            .obtain_credentials(KeyBinding::Attestation(keys))
            .await
            .unwrap();

        assert_eq!(credentials, [SD_JWT.as_bytes().to_vec()]);
        let body = ctx.http_client.requests_to(CREDENTIAL_URL)[0].json();
        assert_eq!(body["format"], "dc+sd-jwt");
        assert_eq!(body["vct"], "urn:eudi:pid:1");
        assert_eq!(
            body["proofs"],
            json!({ "attestation": ["key-attestation.3.c-nonce-1"] })
        );
    }

    #[tokio::test]
    async fn keyless_credential_has_no_proofs() {
        let ctx = issuer_context();
        ctx.http_client.route(Method::POST, CREDENTIAL_URL, |_| {
            json_response(
                StatusCode::OK,
                json!({ "credential": SD_JWT, "c_nonce": "next-nonce" }),
            )
        });
        let mut client = authorized_client(&ctx, KEYLESS_CONFIGURATION).await;

        let credentials = client.obtain_credentials(KeyBinding::Keyless).await.unwrap();

        assert_eq!(credentials, [SD_JWT.as_bytes().to_vec()]);
        let body = ctx.http_client.requests_to(CREDENTIAL_URL)[0].json();
        assert!(body.get("proofs").is_none());
        assert_eq!(client.session.token_c_nonce.as_deref(), Some("next-nonce"));
        assert_eq!(client.notification_id(), None);
    }

    #[tokio::test]
    async fn mismatched_key_binding_is_rejected() {
        let ctx = issuer_context();
        let mut client = authorized_client(&ctx, MDL_CONFIGURATION).await;
        let es384 = device_key(&ctx, SigningAlgorithm::Es384).await;

        for binding in [
            KeyBinding::Keyless,
            KeyBinding::OpenidProofOfPossession(Vec::new()),
            KeyBinding::Attestation(vec![es384.clone()]),
            KeyBinding::OpenidProofOfPossession(vec![es384.clone()]),
        ] {
            let err = client.obtain_credentials(binding).await.unwrap_err();
            assert_matches!(err.error, Oid4vciError::Argument(_));
        }
        assert!(ctx.http_client.requests_to(CREDENTIAL_URL).is_empty());
    }

    #[tokio::test]
    async fn credentials_need_tokens() {
        let ctx = issuer_context();
        let mut client = client_for(&ctx, authorization_code_offer(KEYLESS_CONFIGURATION))
            .await
            .unwrap();

        let err = client.obtain_credentials(KeyBinding::Keyless).await.unwrap_err();

        assert_matches!(err.error, Oid4vciError::NotAuthorized);
    }

    #[tokio::test]
    async fn credential_request_is_retried_with_the_server_nonce() {
        let ctx = issuer_context();
        ctx.http_client.route(
            Method::POST,
            CREDENTIAL_URL,
            nonce_then("issuer-nonce-1", |_| {
                json_response(StatusCode::OK, json!({ "credentials": [{ "credential": SD_JWT }] }))
            }),
        );
        let mut client = authorized_client(&ctx, KEYLESS_CONFIGURATION).await;

        client.obtain_credentials(KeyBinding::Keyless).await.unwrap();

        let requests = ctx.http_client.requests_to(CREDENTIAL_URL);
        assert_eq!(requests.len(), 2);
        let retried = decode_compact(requests[1].header("dpop").unwrap()).unwrap();
        assert_eq!(retried.claims["nonce"], "issuer-nonce-1");
        assert_eq!(
            client.session.issuer_dpop_nonce.as_deref(),
            Some("issuer-nonce-1")
        );
        // nonces of the two servers are kept apart
        assert_eq!(client.session.authorization_dpop_nonce, None);
    }

    #[tokio::test]
    async fn credential_request_is_retried_only_once() {
        let ctx = issuer_context();
        let attempts = Arc::new(AtomicUsize::new(0));
        ctx.http_client.route(
            Method::POST,
            CREDENTIAL_URL,
            nonce_rejecting_handler(attempts.clone()),
        );
        let mut client = authorized_client(&ctx, KEYLESS_CONFIGURATION).await;

        let err = client.obtain_credentials(KeyBinding::Keyless).await.unwrap_err();

        assert_matches!(err.error, Oid4vciError::Issuance(_));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deferred_issuance_is_refused() {
        let ctx = issuer_context();
        ctx.http_client.route(Method::POST, CREDENTIAL_URL, |_| {
            json_response(StatusCode::ACCEPTED, json!({ "transaction_id": "tx-1" }))
        });
        let mut client = authorized_client(&ctx, KEYLESS_CONFIGURATION).await;

        let err = client.obtain_credentials(KeyBinding::Keyless).await.unwrap_err();

        assert_matches!(err.error, Oid4vciError::Issuance(_));
    }

    #[test]
    fn credentials_are_decoded_per_format() {
        let mdoc = CredentialFormat::MsoMdoc {
            doctype: "org.iso.18013.5.1.mDL".to_owned(),
        };
        let sd_jwt = CredentialFormat::SdJwtVc {
            vct: "urn:eudi:pid:1".to_owned(),
        };

        assert_eq!(
            decode_credential(&mdoc, json!(base64_url_encode(MDOC_BYTES))).unwrap(),
            MDOC_BYTES
        );
        assert_eq!(
            decode_credential(&mdoc, json!("ogECAwQ=")).unwrap(),
            MDOC_BYTES
        );
        assert_eq!(
            decode_credential(&sd_jwt, json!(SD_JWT)).unwrap(),
            SD_JWT.as_bytes()
        );

        let err = decode_credential(&mdoc, json!("not base64!")).unwrap_err();
        assert_matches!(err.error, Oid4vciError::Format(_));
        let err = decode_credential(&sd_jwt, json!({ "nested": true })).unwrap_err();
        assert_matches!(err.error, Oid4vciError::Format(_));
    }
}
