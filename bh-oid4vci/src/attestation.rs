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

//! Client authentication towards authorization servers, either with a wallet
//! attestation and its proof of possession or with a client assertion.

use bh_jws_utils::{decode_compact, json_object};
use bherror::traits::{ErrorContext as _, ForeignBoxed as _, ForeignError as _};
use url::Url;

use crate::{
    context::{now_timestamp, random_jti},
    error::format_error,
    HttpClient, KeyInfo, KeySettings, KeyValueStore, Oid4vciError, ProvisioningContext, Result,
    SecureArea, WalletBackend,
};

/// Storage table mapping a server authority to the alias of the key attested
/// towards it.
pub const WALLET_ATTESTATION_KEY_TABLE: &str = "WalletAttestationKeys";

/// `typ` header of wallet attestation proofs of possession.
pub const ATTESTATION_POP_JWT_TYPE: &str = "oauth-client-attestation-pop+jwt";

/// Request header carrying the wallet attestation, `OAuth-Client-Attestation`.
pub const CLIENT_ATTESTATION_HEADER: &str = "oauth-client-attestation";

/// Request header carrying the proof of possession of the attested key,
/// `OAuth-Client-Attestation-PoP`.
pub const CLIENT_ATTESTATION_POP_HEADER: &str = "oauth-client-attestation-pop";

/// `client_assertion_type` of JWT client assertions.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Attestations closer than this to their `exp` are not handed out again.
const ATTESTATION_EXPIRY_MARGIN_SECONDS: i64 = 30;

/// A wallet attestation kept for reuse until it expires.
#[derive(Debug, Clone)]
pub(crate) struct CachedAttestation {
    key_alias: String,
    attestation: String,
    expires_at: i64,
}

/// A wallet attestation together with a fresh proof of possession of the
/// attested key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAttestation {
    /// The attestation JWT issued by the wallet backend.
    pub attestation: String,
    /// The proof of possession JWT, valid for a single request.
    pub proof_of_possession: String,
}

impl<A, H, S, B> ProvisioningContext<A, H, S, B>
where
    A: SecureArea,
    H: HttpClient,
    S: KeyValueStore,
    B: WalletBackend,
{
    /// Creates a wallet attestation of `client_id` for the server at
    /// `endpoint`.
    ///
    /// The attested key is specific to the authority of `endpoint` and kept
    /// in [`WALLET_ATTESTATION_KEY_TABLE`]; it is recreated when the secure
    /// area no longer knows it. An attestation JWT carrying `exp` is reused
    /// for the same client and key until shortly before it expires. The
    /// proof of possession is always fresh, addressed to `endpoint` and
    /// carries `nonce` when the server supplied one.
    pub async fn create_wallet_attestation(
        &self,
        client_id: &str,
        endpoint: &Url,
        nonce: Option<&str>,
    ) -> Result<WalletAttestation> {
        let authority = authority(endpoint)?;
        let key = self.attestation_key(&authority).await?;
        let attestation = self.attestation_jwt(client_id, authority, &key).await?;

        let header = json_object!({ "typ": ATTESTATION_POP_JWT_TYPE });
        let mut claims = json_object!({
            "iss": client_id,
            "aud": endpoint.as_str(),
            "iat": now_timestamp(),
            "jti": random_jti(),
        });
        if let Some(nonce) = nonce {
            claims.insert("nonce".to_owned(), nonce.into());
        }
        let proof_of_possession = self.sign_jwt(&key, header, &claims).await?;

        Ok(WalletAttestation {
            attestation,
            proof_of_possession,
        })
    }

    /// Obtains a client assertion of `client_id` for `audience` from the
    /// wallet backend.
    pub async fn create_client_assertion(&self, client_id: &str, audience: &str) -> Result<String> {
        self.backend
            .client_assertion(client_id, audience)
            .await
            .foreign_boxed_err(|| Oid4vciError::Backend)
            .ctx(|| "cannot obtain client assertion")
    }

    async fn attestation_jwt(
        &self,
        client_id: &str,
        authority: String,
        key: &KeyInfo,
    ) -> Result<String> {
        let cache_key = (client_id.to_owned(), authority);
        let mut cache = self.wallet_attestations.lock().await;

        if let Some(cached) = cache.get(&cache_key) {
            let usable_until = cached.expires_at - ATTESTATION_EXPIRY_MARGIN_SECONDS;
            if cached.key_alias == key.alias && now_timestamp() < usable_until {
                return Ok(cached.attestation.clone());
            }
        }

        let attestation = self
            .backend
            .wallet_attestation(client_id, key)
            .await
            .foreign_boxed_err(|| Oid4vciError::Backend)
            .ctx(|| "cannot obtain wallet attestation")?;

        match attestation_expiry(&attestation) {
            Some(expires_at) => {
                cache.insert(
                    cache_key,
                    CachedAttestation {
                        key_alias: key.alias.clone(),
                        attestation: attestation.clone(),
                        expires_at,
                    },
                );
            }
            None => {
                tracing::debug!(
                    authority = %cache_key.1,
                    "wallet attestation has no exp, not reused"
                );
                cache.remove(&cache_key);
            }
        }

        Ok(attestation)
    }

    async fn attestation_key(&self, authority: &str) -> Result<KeyInfo> {
        let _guard = self.attestation_keys.lock().await;

        let stored = self
            .storage
            .get(WALLET_ATTESTATION_KEY_TABLE, authority)
            .await
            .foreign_boxed_err(|| Oid4vciError::Storage)?;

        if let Some(alias) = &stored {
            let alias = std::str::from_utf8(alias)
                .foreign_err(|| Oid4vciError::Storage)
                .ctx(|| "stored key alias is not UTF-8")?;
            match self.secure_area.key_info(alias).await {
                Ok(key) => return Ok(key),
                Err(error) => {
                    tracing::warn!(%authority, %error, "attestation key is gone, recreating");
                }
            }
        }

        let key = self
            .secure_area
            .create_key(None, &KeySettings::new(self.key_algorithm))
            .await
            .foreign_boxed_err(|| Oid4vciError::SecureArea)
            .ctx(|| "cannot create wallet attestation key")?;

        let alias = key.alias.as_bytes().to_vec();
        let stored_alias = if stored.is_some() {
            self.storage
                .update(WALLET_ATTESTATION_KEY_TABLE, authority, alias)
                .await
        } else {
            self.storage
                .insert(WALLET_ATTESTATION_KEY_TABLE, authority, alias)
                .await
        };
        stored_alias.foreign_boxed_err(|| Oid4vciError::Storage)?;

        Ok(key)
    }
}

/// The `exp` claim of an attestation JWT, read without verifying it.
fn attestation_expiry(attestation: &str) -> Option<i64> {
    decode_compact(attestation)
        .ok()?
        .claims
        .get("exp")?
        .as_i64()
}

/// `host[:port]` of `url`, the port only when it is not the default one.
fn authority(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| format_error(format!("{url} has no host")))?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use bh_jws_utils::{decode_compact, verify_compact, EcdsaVerifier};

    use super::*;
    use crate::test_utils::{test_context, MOCK_WALLET_ATTESTATION};

    async fn stored_alias(
        ctx: &crate::test_utils::TestContext,
        authority: &str,
    ) -> Option<String> {
        ctx.storage
            .get(WALLET_ATTESTATION_KEY_TABLE, authority)
            .await
            .unwrap()
            .map(|alias| String::from_utf8(alias).unwrap())
    }

    #[tokio::test]
    async fn attestation_comes_with_a_proof_of_possession() {
        let ctx = test_context();
        let endpoint = Url::parse("https://auth.example").unwrap();

        let attestation = ctx
            .create_wallet_attestation("wallet", &endpoint, Some("as-nonce"))
            .await
            .unwrap();
        assert_eq!(attestation.attestation, MOCK_WALLET_ATTESTATION);

        let alias = stored_alias(&ctx, "auth.example").await.unwrap();
        let key = ctx.secure_area.key_info(&alias).await.unwrap();
        let pop = verify_compact(
            &attestation.proof_of_possession,
            &EcdsaVerifier,
            &key.public_key,
        )
        .unwrap();

        assert_eq!(pop.header["typ"], ATTESTATION_POP_JWT_TYPE);
        assert_eq!(pop.claims["iss"], "wallet");
        assert_eq!(pop.claims["aud"], "https://auth.example/");
        assert_eq!(pop.claims["nonce"], "as-nonce");
        assert!(pop.claims["jti"].is_string());
    }

    #[tokio::test]
    async fn attestation_key_is_reused_per_authority() {
        let ctx = test_context();
        let par = Url::parse("https://auth.example/par").unwrap();
        let token = Url::parse("https://auth.example/token").unwrap();
        let other = Url::parse("https://auth.example:8443/par").unwrap();

        let first = ctx.create_wallet_attestation("wallet", &par, None).await.unwrap();
        let second = ctx.create_wallet_attestation("wallet", &token, None).await.unwrap();
        ctx.create_wallet_attestation("wallet", &other, None).await.unwrap();

        let alias = stored_alias(&ctx, "auth.example").await.unwrap();
        let other_alias = stored_alias(&ctx, "auth.example:8443").await.unwrap();
        assert_ne!(alias, other_alias);

        let key = ctx.secure_area.key_info(&alias).await.unwrap();
        for attestation in [&first, &second] {
            verify_compact(&attestation.proof_of_possession, &EcdsaVerifier, &key.public_key)
                .unwrap();
        }
        assert_ne!(first.proof_of_possession, second.proof_of_possession);
        assert!(decode_compact(&first.proof_of_possession)
            .unwrap()
            .claims
            .get("nonce")
            .is_none());
    }

    #[tokio::test]
    async fn unresolvable_attestation_key_is_recreated() {
        let ctx = test_context();
        ctx.storage
            .insert(
                WALLET_ATTESTATION_KEY_TABLE,
                "auth.example",
                b"forgotten-alias".to_vec(),
            )
            .await
            .unwrap();
        let endpoint = Url::parse("https://auth.example/par").unwrap();

        let attestation = ctx
            .create_wallet_attestation("wallet", &endpoint, None)
            .await
            .unwrap();

        let alias = stored_alias(&ctx, "auth.example").await.unwrap();
        assert_ne!(alias, "forgotten-alias");
        let key = ctx.secure_area.key_info(&alias).await.unwrap();
        verify_compact(
            &attestation.proof_of_possession,
            &EcdsaVerifier,
            &key.public_key,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn unexpired_attestation_is_reused() {
        let ctx = test_context();
        ctx.backend
            .issue_attestations_expiring_at(now_timestamp() + 3600);
        let par = Url::parse("https://auth.example/par").unwrap();
        let token = Url::parse("https://auth.example/token").unwrap();

        let first = ctx
            .create_wallet_attestation("wallet", &par, None)
            .await
            .unwrap();
        let second = ctx
            .create_wallet_attestation("wallet", &token, Some("as-nonce"))
            .await
            .unwrap();

        assert_eq!(ctx.backend.attestations_issued(), 1);
        assert_eq!(first.attestation, second.attestation);
        assert_ne!(first.proof_of_possession, second.proof_of_possession);
        let pop = decode_compact(&second.proof_of_possession).unwrap();
        assert_eq!(pop.claims["nonce"], "as-nonce");

        let other_client = ctx
            .create_wallet_attestation("other-wallet", &par, None)
            .await
            .unwrap();
        assert_eq!(ctx.backend.attestations_issued(), 2);
        assert_ne!(other_client.attestation, first.attestation);
    }

    #[tokio::test]
    async fn attestation_close_to_expiry_is_replaced() {
        let ctx = test_context();
        ctx.backend.issue_attestations_expiring_at(now_timestamp() + 10);
        let endpoint = Url::parse("https://auth.example/par").unwrap();

        let first = ctx
            .create_wallet_attestation("wallet", &endpoint, None)
            .await
            .unwrap();
        let second = ctx
            .create_wallet_attestation("wallet", &endpoint, None)
            .await
            .unwrap();

        assert_eq!(ctx.backend.attestations_issued(), 2);
        assert_ne!(first.attestation, second.attestation);
    }

    #[tokio::test]
    async fn attestation_without_expiry_is_fetched_every_time() {
        let ctx = test_context();
        let endpoint = Url::parse("https://auth.example/par").unwrap();

        for _ in 0..2 {
            let attestation = ctx
                .create_wallet_attestation("wallet", &endpoint, None)
                .await
                .unwrap();
            assert_eq!(attestation.attestation, MOCK_WALLET_ATTESTATION);
        }
        assert_eq!(ctx.backend.attestations_issued(), 2);
    }

    #[tokio::test]
    async fn recreated_key_gets_a_new_attestation() {
        let ctx = test_context();
        ctx.backend
            .issue_attestations_expiring_at(now_timestamp() + 3600);
        let endpoint = Url::parse("https://auth.example/par").unwrap();

        let first = ctx
            .create_wallet_attestation("wallet", &endpoint, None)
            .await
            .unwrap();
        ctx.storage
            .update(
                WALLET_ATTESTATION_KEY_TABLE,
                "auth.example",
                b"forgotten-alias".to_vec(),
            )
            .await
            .unwrap();
        let second = ctx
            .create_wallet_attestation("wallet", &endpoint, None)
            .await
            .unwrap();

        assert_eq!(ctx.backend.attestations_issued(), 2);
        assert_ne!(first.attestation, second.attestation);
    }

    #[tokio::test]
    async fn client_assertion_comes_from_the_backend() {
        let ctx = test_context();

        let assertion = ctx
            .create_client_assertion("wallet", "https://auth.example")
            .await
            .unwrap();

        assert_eq!(assertion, "client-assertion.wallet.https://auth.example");
    }

    #[test]
    fn authority_keeps_non_default_ports() {
        let authority_of = |url: &str| authority(&Url::parse(url).unwrap()).unwrap();

        assert_eq!(authority_of("https://auth.example/par"), "auth.example");
        assert_eq!(authority_of("https://auth.example:443/par"), "auth.example");
        assert_eq!(authority_of("http://localhost:8080/"), "localhost:8080");
        assert!(authority(&Url::parse("data:text/plain,hi").unwrap()).is_err());
    }
}
