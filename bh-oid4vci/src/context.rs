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

use bh_jws_utils::{JsonObject, SigningAlgorithm, SigningInput};
use bherror::traits::{ErrorContext as _, ForeignBoxed as _, PropagateError as _};
use futures::lock::Mutex;
use rand::RngCore as _;

use crate::{
    attestation::CachedAttestation, HttpClient, KeyInfo, KeyValueStore, Oid4vciError, RedirectStateRegistry, Result, SecureArea,
    WalletBackend,
};

const JTI_SIZE: usize = 15;

/// Everything the provisioning sessions of a process share: the
/// collaborators, the registry of pending redirect states, the keys bound
/// to each server and the wallet attestations still valid for them.
///
/// Build it once and hand it to every
/// [`ProvisioningClient`](crate::ProvisioningClient) in an
/// [`Arc`](std::sync::Arc).
pub struct ProvisioningContext<A, H, S, B> {
    pub(crate) secure_area: A,
    pub(crate) http_client: H,
    pub(crate) storage: S,
    pub(crate) backend: B,
    pub(crate) key_algorithm: SigningAlgorithm,
    pub(crate) redirect_states: RedirectStateRegistry,
    pub(crate) dpop_keys: Mutex<HashMap<(String, String), KeyInfo>>,
    pub(crate) attestation_keys: Mutex<()>,
    pub(crate) wallet_attestations: Mutex<HashMap<(String, String), CachedAttestation>>,
}

impl<A, H, S, B> std::fmt::Debug for ProvisioningContext<A, H, S, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningContext")
            .field("key_algorithm", &self.key_algorithm)
            .field("redirect_states", &self.redirect_states)
            .finish_non_exhaustive()
    }
}

impl<A, H, S, B> ProvisioningContext<A, H, S, B>
where
    A: SecureArea,
    H: HttpClient,
    S: KeyValueStore,
    B: WalletBackend,
{
    /// Creates a context creating its DPoP and wallet attestation keys with
    /// [`SigningAlgorithm::Es256`].
    pub fn new(secure_area: A, http_client: H, storage: S, backend: B) -> Self {
        Self {
            secure_area,
            http_client,
            storage,
            backend,
            key_algorithm: SigningAlgorithm::Es256,
            redirect_states: RedirectStateRegistry::new(),
            dpop_keys: Mutex::new(HashMap::new()),
            attestation_keys: Mutex::new(()),
            wallet_attestations: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the algorithm of the DPoP and wallet attestation keys created
    /// from now on.
    pub fn with_key_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.key_algorithm = algorithm;
        self
    }

    /// The secure area.
    pub fn secure_area(&self) -> &A {
        &self.secure_area
    }

    /// The HTTP client.
    pub fn http_client(&self) -> &H {
        &self.http_client
    }

    /// The key-value storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The wallet backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The registry of pending redirect states.
    pub fn redirect_states(&self) -> &RedirectStateRegistry {
        &self.redirect_states
    }

    /// Signs a compact JWS with the secure area key `key`, setting the `alg`
    /// header.
    pub(crate) async fn sign_jwt(
        &self,
        key: &KeyInfo,
        mut header: JsonObject,
        claims: &JsonObject,
    ) -> Result<String> {
        header.insert("alg".to_owned(), key.algorithm.to_string().into());

        let input = SigningInput::new(&header, claims).with_err(|| Oid4vciError::Crypto)?;
        let signature = self
            .secure_area
            .sign(&key.alias, input.as_bytes())
            .await
            .foreign_boxed_err(|| Oid4vciError::SecureArea)
            .ctx(|| format!("signing with key {}", key.alias))?;

        Ok(input.into_compact(&signature))
    }
}

/// A random `jti` claim.
pub(crate) fn random_jti() -> String {
    let mut bytes = [0u8; JTI_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    bh_jws_utils::base64_url_encode(bytes)
}

/// Seconds since the epoch, for the `iat` claims.
pub(crate) fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
