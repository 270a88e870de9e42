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

//! Proofs of possession for sender-constrained tokens, as defined by
//! [RFC 9449][1].
//!
//! [1]: https://datatracker.ietf.org/doc/html/rfc9449

use bh_jws_utils::{base64_url_encode, json_object};
use bherror::traits::{ErrorContext as _, ForeignBoxed as _};
use url::Url;

use crate::{
    context::{now_timestamp, random_jti},
    HttpClient, KeyInfo, KeySettings, KeyValueStore, Oid4vciError, ProvisioningContext, Result,
    SecureArea, WalletBackend,
};

/// `typ` header of DPoP proofs.
pub const DPOP_JWT_TYPE: &str = "dpop+jwt";

/// Request header carrying the DPoP proof, `DPoP`.
pub const DPOP_HEADER: &str = "dpop";

/// Response header carrying the nonce the server wants in the next proof,
/// `DPoP-Nonce`.
pub const DPOP_NONCE_HEADER: &str = "dpop-nonce";

impl<A, H, S, B> ProvisioningContext<A, H, S, B>
where
    A: SecureArea,
    H: HttpClient,
    S: KeyValueStore,
    B: WalletBackend,
{
    /// Creates a DPoP proof for a `POST` to `request_url`.
    ///
    /// The proof is signed with the key bound to `client_id` and the origin of
    /// `request_url`, which is created on first use. When `access_token` is
    /// given, its hash is included as the `ath` claim.
    pub async fn generate_dpop(
        &self,
        client_id: &str,
        request_url: &Url,
        nonce: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<String> {
        let key = self.dpop_key(client_id, request_url).await?;

        let mut htu = request_url.clone();
        htu.set_query(None);
        htu.set_fragment(None);

        let header = json_object!({
            "typ": DPOP_JWT_TYPE,
            "jwk": key.public_key,
        });
        let mut claims = json_object!({
            "htm": "POST",
            "htu": htu.as_str(),
            "iat": now_timestamp(),
            "jti": random_jti(),
        });
        if let Some(nonce) = nonce {
            claims.insert("nonce".to_owned(), nonce.into());
        }
        if let Some(access_token) = access_token {
            let hash = openssl::sha::sha256(access_token.as_bytes());
            claims.insert("ath".to_owned(), base64_url_encode(hash).into());
        }

        self.sign_jwt(&key, header, &claims).await
    }

    async fn dpop_key(&self, client_id: &str, request_url: &Url) -> Result<KeyInfo> {
        let origin = request_url.origin().ascii_serialization();

        // held over the creation so concurrent sessions share one key
        let mut keys = self.dpop_keys.lock().await;
        if let Some(key) = keys.get(&(client_id.to_owned(), origin.clone())) {
            return Ok(key.clone());
        }

        tracing::debug!(client_id, %origin, "creating DPoP key");
        let key = self
            .secure_area
            .create_key(None, &KeySettings::new(self.key_algorithm))
            .await
            .foreign_boxed_err(|| Oid4vciError::SecureArea)
            .ctx(|| "cannot create DPoP key")?;
        keys.insert((client_id.to_owned(), origin), key.clone());

        Ok(key)
    }
}
