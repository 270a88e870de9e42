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

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate provides a wallet side client for provisioning credentials
//! over [OpenID for Verifiable Credential Issuance][1].
//!
//! [1]: https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html
//!
//! # Details
//!
//! A [`ProvisioningClient`] takes a single credential offer through the
//! authorization code or pre-authorized code flow to the issued mdoc or
//! SD-JWT VC credentials. Requests to the authorization server and the
//! credential issuer are sender-constrained with [DPoP][2] and the wallet
//! authenticates with a wallet attestation or a client assertion, whichever
//! the authorization server advertises.
//!
//! The client reaches the outside world only through the collaborator traits
//! [`SecureArea`], [`HttpClient`], [`KeyValueStore`] and [`WalletBackend`],
//! bundled in a [`ProvisioningContext`] shared by all sessions of the
//! process. [`SoftwareSecureArea`], [`ReqwestHttpClient`] and
//! [`InMemoryStore`] are provided for software wallets and tests.
//!
//! [2]: https://datatracker.ietf.org/doc/html/rfc9449
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bh_oid4vci::{
//!     AuthorizationChallenge, AuthorizationResponse, ClientPreferences, HttpClient, KeyBinding,
//!     KeyBindingType, KeyInfo, KeySettings, KeyValueStore, ProvisioningClient,
//!     ProvisioningContext, SecureArea, WalletBackend,
//! };
//!
//! async fn provision<A, H, S, B>(
//!     ctx: Arc<ProvisioningContext<A, H, S, B>>,
//!     offer_uri: &str,
//!     preferences: ClientPreferences,
//!     follow_redirect: impl Fn(url::Url) -> url::Url,
//! ) -> bh_oid4vci::Result<Vec<Vec<u8>>>
//! where
//!     A: SecureArea,
//!     H: HttpClient,
//!     S: KeyValueStore,
//!     B: WalletBackend,
//! {
//!     let mut client =
//!         ProvisioningClient::create_from_offer(ctx.clone(), offer_uri, preferences, None).await?;
//!
//!     for challenge in client.get_authorization_challenges().await? {
//!         if let AuthorizationChallenge::OAuth { url, .. } = challenge {
//!             let parameterized_redirect_url = follow_redirect(url);
//!             client
//!                 .authorize(AuthorizationResponse::OAuth {
//!                     parameterized_redirect_url,
//!                 })
//!                 .await?;
//!         }
//!     }
//!
//!     let key_binding = match client.key_binding_type()? {
//!         KeyBindingType::Keyless => KeyBinding::Keyless,
//!         KeyBindingType::OpenidProofOfPossession { algorithm, .. } => {
//!             client.get_key_binding_challenge().await?;
//!             let key: KeyInfo = ctx
//!                 .secure_area()
//!                 .create_key(None, &KeySettings::new(algorithm))
//!                 .await
//!                 .expect("key creation");
//!             KeyBinding::OpenidProofOfPossession(vec![key])
//!         }
//!         KeyBindingType::Attestation { .. } => unimplemented!(),
//!     };
//!
//!     client.obtain_credentials(key_binding).await
//! }
//! ```

mod attestation;
mod client;
mod collaborators;
mod context;
mod dpop;
mod error;
mod metadata;
mod preferences;
mod redirect_state;

#[cfg(test)]
mod test_utils;

pub use attestation::*;
pub use client::*;
pub use collaborators::*;
pub use context::ProvisioningContext;
pub use dpop::*;
pub use error::{Oid4vciError, Result};
pub use metadata::*;
pub use preferences::ClientPreferences;
pub use redirect_state::{RedirectState, RedirectStateRegistry};
