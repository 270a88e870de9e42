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

//! Interfaces of the services the provisioning client depends on, together
//! with software and in-memory implementations of them.
//!
//! All of the traits are asynchronous: signing may involve user presence
//! checks and storage or HTTP calls may block, so each call is a suspension
//! point. Failures are reported as [`BoxError`]s and mapped onto
//! [`Oid4vciError`] variants by the client.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Mutex, PoisonError},
};

use bh_jws_utils::{BoxError, EcdsaSigner, JwkPublic, Signer as _, SigningAlgorithm};
use bherror::{
    traits::{ErrorContext as _, ForeignError as _, PropagateError as _},
    Error,
};
use http::{HeaderMap, StatusCode};
use openssl::{ec::EcKey, pkey::Private};
use rand::RngCore as _;
use url::Url;

use crate::{error::Oid4vciError, Result};

/// Parameters for creating a key in a [`SecureArea`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySettings {
    /// Algorithm the key is going to sign with.
    pub algorithm: SigningAlgorithm,
    /// Challenge to embed into the platform key attestation, if the secure
    /// area produces one.
    pub attestation_challenge: Option<Vec<u8>>,
}

impl KeySettings {
    /// Settings for a key signing with `algorithm`, without attestation
    /// challenge.
    pub fn new(algorithm: SigningAlgorithm) -> Self {
        Self {
            algorithm,
            attestation_challenge: None,
        }
    }
}

/// Public information about a key held by a [`SecureArea`].
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInfo {
    /// Alias under which the secure area knows the key.
    pub alias: String,
    /// Algorithm the key signs with.
    pub algorithm: SigningAlgorithm,
    /// The public key.
    pub public_key: JwkPublic,
    /// DER encoded certificates of the platform key attestation, leaf first.
    ///
    /// Empty when the secure area does not attest its keys.
    pub attestation: Vec<Vec<u8>>,
}

/// Creates and uses private keys the wallet never sees.
pub trait SecureArea: Send + Sync {
    /// Creates a new key under `alias`, or under a fresh alias when `None`.
    fn create_key(
        &self,
        alias: Option<&str>,
        settings: &KeySettings,
    ) -> impl Future<Output = std::result::Result<KeyInfo, BoxError>> + Send;

    /// Resolves an existing key, failing if `alias` is unknown.
    fn key_info(
        &self,
        alias: &str,
    ) -> impl Future<Output = std::result::Result<KeyInfo, BoxError>> + Send;

    /// Signs `message` with the key under `alias`, returning the fixed-size
    /// `r || s` signature.
    fn sign(
        &self,
        alias: &str,
        message: &[u8],
    ) -> impl Future<Output = std::result::Result<Vec<u8>, BoxError>> + Send;
}

/// A response as returned by an [`HttpClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the `2xx` range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The value of header `name`, if present and valid ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// Deserializes the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .foreign_err(|| Oid4vciError::Format("unexpected response body".to_owned()))
            .ctx(|| format!("response with status {}", self.status))
    }
}

/// Sends HTTP requests on behalf of the provisioning client.
///
/// Implementations are free to restrict the hosts they talk to.
pub trait HttpClient: Send + Sync {
    /// Performs a `GET` request.
    fn get(
        &self,
        url: &Url,
        headers: HeaderMap,
    ) -> impl Future<Output = std::result::Result<HttpResponse, BoxError>> + Send;

    /// Performs a `POST` request with `body`; the `Content-Type` is expected
    /// among `headers`.
    fn post(
        &self,
        url: &Url,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> impl Future<Output = std::result::Result<HttpResponse, BoxError>> + Send;
}

/// Persistent storage organized as tables of byte values.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value under `key`.
    fn get(
        &self,
        table: &str,
        key: &str,
    ) -> impl Future<Output = std::result::Result<Option<Vec<u8>>, BoxError>> + Send;

    /// Stores a value under a `key` that must not exist yet.
    fn insert(
        &self,
        table: &str,
        key: &str,
        value: Vec<u8>,
    ) -> impl Future<Output = std::result::Result<(), BoxError>> + Send;

    /// Replaces the value under an existing `key`.
    fn update(
        &self,
        table: &str,
        key: &str,
        value: Vec<u8>,
    ) -> impl Future<Output = std::result::Result<(), BoxError>> + Send;

    /// Removes `key`, returning whether it existed.
    fn delete(
        &self,
        table: &str,
        key: &str,
    ) -> impl Future<Output = std::result::Result<bool, BoxError>> + Send;
}

/// The wallet provider's backend, vouching for the wallet and its keys.
pub trait WalletBackend: Send + Sync {
    /// Produces a wallet attestation JWT for `client_id`, bound to the
    /// attested key described by `key_info`.
    fn wallet_attestation(
        &self,
        client_id: &str,
        key_info: &KeyInfo,
    ) -> impl Future<Output = std::result::Result<String, BoxError>> + Send;

    /// Produces a client assertion JWT for `client_id` addressed to
    /// `audience`.
    fn client_assertion(
        &self,
        client_id: &str,
        audience: &str,
    ) -> impl Future<Output = std::result::Result<String, BoxError>> + Send;

    /// Produces a key attestation JWT covering `keys`, embedding the issuer
    /// supplied `nonce`.
    fn key_attestation(
        &self,
        keys: &[KeyInfo],
        nonce: Option<&str>,
    ) -> impl Future<Output = std::result::Result<String, BoxError>> + Send;
}

/// [`SecureArea`] keeping `openssl` keys in process memory.
///
/// Do NOT use this for keys that need hardware protection.
#[derive(Debug, Default)]
pub struct SoftwareSecureArea {
    keys: Mutex<HashMap<String, EcdsaSigner>>,
}

impl SoftwareSecureArea {
    /// Creates an empty secure area.
    pub fn new() -> Self {
        Self::default()
    }

    /// Imports an existing private key under `alias`, replacing any key
    /// already stored there.
    pub fn import_key(&self, alias: impl Into<String>, private_key: EcKey<Private>) -> Result<()> {
        let signer = EcdsaSigner::from_ec_key(private_key)
            .with_err(|| Oid4vciError::SecureArea)
            .ctx(|| "unsupported key")?;

        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(alias.into(), signer);

        Ok(())
    }

    fn key_info_of(alias: &str, signer: &EcdsaSigner) -> std::result::Result<KeyInfo, BoxError> {
        Ok(KeyInfo {
            alias: alias.to_owned(),
            algorithm: signer.algorithm(),
            public_key: signer.public_jwk()?,
            attestation: Vec::new(),
        })
    }
}

fn unknown_alias(alias: &str) -> BoxError {
    Box::new(Error::root(Oid4vciError::SecureArea).ctx(format!("unknown key alias {alias}")))
}

impl SecureArea for SoftwareSecureArea {
    async fn create_key(
        &self,
        alias: Option<&str>,
        settings: &KeySettings,
    ) -> std::result::Result<KeyInfo, BoxError> {
        let alias = match alias {
            Some(alias) => alias.to_owned(),
            None => random_alias(),
        };
        let signer = EcdsaSigner::generate(settings.algorithm)?;
        let key_info = Self::key_info_of(&alias, &signer)?;

        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(alias, signer);

        Ok(key_info)
    }

    async fn key_info(&self, alias: &str) -> std::result::Result<KeyInfo, BoxError> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        let signer = keys.get(alias).ok_or_else(|| unknown_alias(alias))?;

        Self::key_info_of(alias, signer)
    }

    async fn sign(&self, alias: &str, message: &[u8]) -> std::result::Result<Vec<u8>, BoxError> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        let signer = keys.get(alias).ok_or_else(|| unknown_alias(alias))?;

        signer.sign(message)
    }
}

fn random_alias() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bh_jws_utils::base64_url_encode(bytes)
}

/// [`KeyValueStore`] backed by a map in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn storage_error(message: String) -> BoxError {
    Box::new(Error::root(Oid4vciError::Storage).ctx(message))
}

impl KeyValueStore for InMemoryStore {
    async fn get(&self, table: &str, key: &str) -> std::result::Result<Option<Vec<u8>>, BoxError> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);

        Ok(tables.get(&(table.to_owned(), key.to_owned())).cloned())
    }

    async fn insert(
        &self,
        table: &str,
        key: &str,
        value: Vec<u8>,
    ) -> std::result::Result<(), BoxError> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = (table.to_owned(), key.to_owned());
        if tables.contains_key(&entry) {
            return Err(storage_error(format!("{table}/{key} already exists")));
        }
        tables.insert(entry, value);

        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        key: &str,
        value: Vec<u8>,
    ) -> std::result::Result<(), BoxError> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        match tables.get_mut(&(table.to_owned(), key.to_owned())) {
            Some(stored) => {
                *stored = value;
                Ok(())
            }
            None => Err(storage_error(format!("{table}/{key} does not exist"))),
        }
    }

    async fn delete(&self, table: &str, key: &str) -> std::result::Result<bool, BoxError> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);

        Ok(tables.remove(&(table.to_owned(), key.to_owned())).is_some())
    }
}

/// [`HttpClient`] implementation using the [`reqwest`] crate.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient(reqwest::Client);

impl ReqwestHttpClient {
    /// Construct [`ReqwestHttpClient`] from [`reqwest::Client`].
    pub fn new(client: reqwest::Client) -> Self {
        Self(client)
    }

    /// Construct [`ReqwestHttpClient`] from [`reqwest::ClientBuilder`].
    pub fn from_builder(builder: reqwest::ClientBuilder) -> reqwest::Result<Self> {
        Ok(Self(builder.build()?))
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<HttpResponse, BoxError> {
        let response = request.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &Url, headers: HeaderMap) -> std::result::Result<HttpResponse, BoxError> {
        self.execute(self.0.get(url.clone()).headers(headers)).await
    }

    async fn post(
        &self,
        url: &Url,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> std::result::Result<HttpResponse, BoxError> {
        self.execute(self.0.post(url.clone()).headers(headers).body(body))
            .await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bh_jws_utils::{EcdsaVerifier, SignatureVerifier as _};
    use openssl::{ec::EcGroup, nid::Nid};

    use super::*;

    #[tokio::test]
    async fn software_secure_area_signs_with_created_key() {
        let secure_area = SoftwareSecureArea::new();
        let key_info = secure_area
            .create_key(Some("device-key"), &KeySettings::new(SigningAlgorithm::Es384))
            .await
            .unwrap();

        assert_eq!(key_info.alias, "device-key");
        assert_eq!(key_info.algorithm, SigningAlgorithm::Es384);
        assert!(key_info.attestation.is_empty());
        assert_eq!(secure_area.key_info("device-key").await.unwrap(), key_info);

        let signature = secure_area.sign("device-key", b"message").await.unwrap();
        assert_eq!(signature.len(), SigningAlgorithm::Es384.signature_size());
        assert!(EcdsaVerifier
            .verify(b"message", &signature, &key_info.public_key)
            .unwrap());
    }

    #[tokio::test]
    async fn software_secure_area_generates_distinct_aliases() {
        let secure_area = SoftwareSecureArea::new();
        let settings = KeySettings::new(SigningAlgorithm::Es256);

        let first = secure_area.create_key(None, &settings).await.unwrap();
        let second = secure_area.create_key(None, &settings).await.unwrap();

        assert_ne!(first.alias, second.alias);
        assert_ne!(first.public_key, second.public_key);
    }

    #[tokio::test]
    async fn software_secure_area_rejects_unknown_alias() {
        let secure_area = SoftwareSecureArea::new();

        assert!(secure_area.key_info("missing").await.is_err());
        assert!(secure_area.sign("missing", b"message").await.is_err());
    }

    #[tokio::test]
    async fn imported_key_keeps_its_curve() {
        let group = EcGroup::from_curve_name(Nid::SECP521R1).unwrap();
        let private_key = EcKey::generate(&group).unwrap();

        let secure_area = SoftwareSecureArea::new();
        secure_area.import_key("imported", private_key).unwrap();

        let key_info = secure_area.key_info("imported").await.unwrap();
        assert_eq!(key_info.algorithm, SigningAlgorithm::Es512);
        assert_eq!(key_info.public_key["crv"], "P-521");
    }

    #[tokio::test]
    async fn in_memory_store_insert_update_delete() {
        let store = InMemoryStore::new();

        assert_eq!(store.get("table", "key").await.unwrap(), None);

        store.insert("table", "key", b"one".to_vec()).await.unwrap();
        assert!(store.insert("table", "key", b"two".to_vec()).await.is_err());
        assert_eq!(store.get("table", "key").await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.get("other", "key").await.unwrap(), None);

        store.update("table", "key", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("table", "key").await.unwrap(), Some(b"two".to_vec()));
        assert!(store.update("table", "missing", b"x".to_vec()).await.is_err());

        assert!(store.delete("table", "key").await.unwrap());
        assert!(!store.delete("table", "key").await.unwrap());
    }

    #[test]
    fn response_json_reports_format_error() {
        let response = HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: b"not json".to_vec(),
        };

        let err = response.json::<serde_json::Value>().unwrap_err();
        assert_matches!(err.error, Oid4vciError::Format(_));
    }
}
