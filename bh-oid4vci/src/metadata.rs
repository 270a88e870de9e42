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

//! Credential offers and the metadata documents of the credential issuer and
//! its authorization server.

use std::collections::HashMap;

use bherror::traits::{ErrorContext as _, ForeignBoxed as _, ForeignError as _};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::{
    error::{format_error, protocol_error},
    HttpClient, Oid4vciError, Result,
};

const CREDENTIAL_OFFER_PARAM: &str = "credential_offer";
const CREDENTIAL_OFFER_URI_PARAM: &str = "credential_offer_uri";

/// Well-known suffix of the credential issuer metadata.
pub const CREDENTIAL_ISSUER_WELL_KNOWN: &str = "openid-credential-issuer";
/// Well-known suffix of the OAuth authorization server metadata.
pub const OAUTH_SERVER_WELL_KNOWN: &str = "oauth-authorization-server";
/// Well-known suffix of the OpenID Connect provider metadata, used when the
/// OAuth one is missing.
pub const OPENID_CONFIGURATION_WELL_KNOWN: &str = "openid-configuration";

/// A credential offer, as sent by the issuer to the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialOffer {
    /// Identifier of the credential issuer.
    pub credential_issuer: Url,
    /// Offered entries of the issuer's `credential_configurations_supported`.
    pub credential_configuration_ids: Vec<String>,
    /// Grants the issuer is prepared to process for this offer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grants: Option<Grants>,
}

/// The grants of a [`CredentialOffer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grants {
    /// Authorization code grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<AuthorizationCodeGrant>,
    /// Pre-authorized code grant.
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
}

/// Parameters of the authorization code grant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCodeGrant {
    /// Opaque value binding the authorization request to the offer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
    /// Authorization server to use, when the issuer has more than one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<Url>,
}

/// Parameters of the pre-authorized code grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreAuthorizedCodeGrant {
    /// The code to exchange for an access token.
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,
    /// Present when the token request needs a transaction code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<TxCode>,
    /// Authorization server to use, when the issuer has more than one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<Url>,
}

/// Description of the transaction code the user needs to type in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCode {
    /// `numeric` or `text`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,
    /// Length of the code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Guidance for the user on where to find the code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A credential offer passed either by value or by reference.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialOfferRef {
    /// The offer itself.
    Value(CredentialOffer),
    /// Where to fetch the offer from.
    Reference(Url),
}

impl CredentialOfferRef {
    /// Parses an offer URI such as
    /// `openid-credential-offer://?credential_offer=...` or
    /// `openid-credential-offer://?credential_offer_uri=...`.
    pub fn parse(offer_uri: &str) -> Result<Self> {
        let url = Url::parse(offer_uri)
            .foreign_err(|| Oid4vciError::Format("invalid credential offer URI".to_owned()))?;

        let mut offer = None;
        let mut offer_uri = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                CREDENTIAL_OFFER_PARAM => offer = Some(value.into_owned()),
                CREDENTIAL_OFFER_URI_PARAM => offer_uri = Some(value.into_owned()),
                _ => {}
            }
        }

        match (offer, offer_uri) {
            (Some(offer), None) => Ok(Self::Value(CredentialOffer::from_json(offer.as_bytes())?)),
            (None, Some(offer_uri)) => Url::parse(&offer_uri)
                .map(Self::Reference)
                .foreign_err(|| Oid4vciError::Format("invalid credential_offer_uri".to_owned())),
            (Some(_), Some(_)) => Err(format_error(
                "both credential_offer and credential_offer_uri are present",
            )),
            (None, None) => Err(format_error("no credential offer in URI")),
        }
    }

    /// Resolves the offer, fetching it if passed by reference.
    pub async fn resolve<H: HttpClient>(self, http_client: &H) -> Result<CredentialOffer> {
        let url = match self {
            Self::Value(offer) => return Ok(offer),
            Self::Reference(url) => url,
        };

        tracing::debug!(%url, "fetching credential offer");
        let response = http_client
            .get(&url, HeaderMap::new())
            .await
            .foreign_boxed_err(|| Oid4vciError::Http)?;
        if !response.is_success() {
            return Err(protocol_error(format!(
                "credential offer endpoint answered {}",
                response.status
            )));
        }

        CredentialOffer::from_json(&response.body)
    }
}

impl CredentialOffer {
    /// Parses the JSON representation of an offer.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let offer: Self = serde_json::from_slice(json)
            .foreign_err(|| Oid4vciError::Format("invalid credential offer".to_owned()))?;

        if offer.credential_configuration_ids.is_empty() {
            return Err(format_error("credential offer without configurations"));
        }

        Ok(offer)
    }
}

/// Metadata of a credential issuer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerMetadata {
    /// Identifier of the credential issuer.
    pub credential_issuer: Url,
    /// Authorization servers the issuer relies on; the issuer itself acts as
    /// one when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorization_servers: Vec<Url>,
    /// The credential endpoint.
    pub credential_endpoint: Url,
    /// The nonce endpoint handing out key-binding challenges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_endpoint: Option<Url>,
    /// The notification endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_endpoint: Option<Url>,
    /// Display metadata of the issuer, kept as is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<Value>,
    /// Credentials the issuer can issue, by configuration id.
    pub credential_configurations_supported: HashMap<String, CredentialConfiguration>,
}

/// One entry of the issuer's `credential_configurations_supported`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfiguration {
    /// Format of the credential.
    #[serde(flatten)]
    pub format: CredentialFormat,
    /// OAuth scope requesting this credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Key-binding methods the issuer supports, e.g. `cose_key` or `jwk`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cryptographic_binding_methods_supported: Vec<String>,
    /// Supported key proof types, by proof type.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub proof_types_supported: HashMap<String, ProofTypeSupported>,
    /// Display metadata of the credential, kept as is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<Value>,
}

/// Format of a credential configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum CredentialFormat {
    /// ISO/IEC 18013-5 mdoc.
    #[serde(rename = "mso_mdoc")]
    MsoMdoc {
        /// Document type of the mdoc.
        doctype: String,
    },
    /// IETF SD-JWT VC.
    #[serde(rename = "dc+sd-jwt", alias = "vc+sd-jwt")]
    SdJwtVc {
        /// Verifiable credential type.
        vct: String,
    },
    /// Any format this client cannot request.
    #[serde(other)]
    Unsupported,
}

impl CredentialFormat {
    /// The `format` identifier, `None` for [`CredentialFormat::Unsupported`].
    pub fn format_id(&self) -> Option<&'static str> {
        match self {
            Self::MsoMdoc { .. } => Some("mso_mdoc"),
            Self::SdJwtVc { .. } => Some("dc+sd-jwt"),
            Self::Unsupported => None,
        }
    }
}

/// Parameters of one supported key proof type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofTypeSupported {
    /// Algorithms the proofs may be signed with.
    #[serde(default)]
    pub proof_signing_alg_values_supported: Vec<String>,
    /// Requirements on the key attestation, when one is needed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_attestations_required: Option<Value>,
}

/// Metadata of an OAuth authorization server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Identifier of the authorization server.
    pub issuer: Url,
    /// The authorization endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<Url>,
    /// The pushed authorization request endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_authorization_request_endpoint: Option<Url>,
    /// Whether authorization requests must be pushed.
    #[serde(default)]
    pub require_pushed_authorization_requests: bool,
    /// The token endpoint.
    pub token_endpoint: Url,
    /// Supported `response_type` values.
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    /// Supported PKCE methods.
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
    /// Supported client authentication methods.
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,
    /// Algorithms accepted in DPoP proofs.
    #[serde(default)]
    pub dpop_signing_alg_values_supported: Vec<String>,
}

/// Builds the URL of a well-known document, inserting `/.well-known/{suffix}`
/// between the host and the path of `identifier`.
pub fn well_known_url(identifier: &Url, suffix: &str) -> Result<Url> {
    let path = identifier.path().trim_end_matches('/');

    let mut url = identifier.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.set_path(&format!("/.well-known/{suffix}{path}"));

    if url.cannot_be_a_base() || !matches!(url.scheme(), "https" | "http") {
        return Err(format_error(format!("{identifier} is not an HTTP(S) URL")));
    }

    Ok(url)
}

async fn fetch_json<H: HttpClient, T: serde::de::DeserializeOwned>(
    http_client: &H,
    url: &Url,
) -> Result<Option<T>> {
    tracing::debug!(%url, "fetching metadata");
    let response = http_client
        .get(url, HeaderMap::new())
        .await
        .foreign_boxed_err(|| Oid4vciError::Http)?;

    if !response.is_success() {
        tracing::debug!(%url, status = %response.status, "metadata not available");
        return Ok(None);
    }

    response.json().map(Some).ctx(|| format!("metadata at {url}"))
}

/// Fetches the metadata of `credential_issuer`, checking it identifies
/// itself as such.
pub async fn fetch_issuer_metadata<H: HttpClient>(
    http_client: &H,
    credential_issuer: &Url,
) -> Result<IssuerMetadata> {
    let url = well_known_url(credential_issuer, CREDENTIAL_ISSUER_WELL_KNOWN)?;
    let metadata: IssuerMetadata = fetch_json(http_client, &url)
        .await?
        .ok_or_else(|| protocol_error("credential issuer metadata not available"))?;

    if !same_identifier(&metadata.credential_issuer, credential_issuer) {
        return Err(protocol_error(format!(
            "metadata of {credential_issuer} is for {}",
            metadata.credential_issuer
        )));
    }

    Ok(metadata)
}

/// Fetches the metadata of the authorization server `issuer`, falling back
/// to its OpenID configuration.
pub async fn fetch_authorization_server_metadata<H: HttpClient>(
    http_client: &H,
    issuer: &Url,
) -> Result<AuthorizationServerMetadata> {
    for suffix in [OAUTH_SERVER_WELL_KNOWN, OPENID_CONFIGURATION_WELL_KNOWN] {
        let url = well_known_url(issuer, suffix)?;
        if let Some(metadata) = fetch_json(http_client, &url).await? {
            return Ok(metadata);
        }
    }

    Err(protocol_error(format!(
        "no authorization server metadata for {issuer}"
    )))
}

fn same_identifier(left: &Url, right: &Url) -> bool {
    left.as_str().trim_end_matches('/') == right.as_str().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn offer_json() -> Value {
        json!({
            "credential_issuer": "https://issuer.example",
            "credential_configuration_ids": ["mDL"],
            "grants": {
                "authorization_code": { "issuer_state": "eyJhbGciOiJSU0Et" },
                "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                    "pre-authorized_code": "adhjhdjajkdkhjhdj",
                    "tx_code": { "length": 4, "input_mode": "numeric" }
                }
            }
        })
    }

    fn offer_uri(parameter: &str, value: &str) -> String {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(parameter, value)
            .finish();
        format!("openid-credential-offer://?{query}")
    }

    #[test]
    fn offer_by_value_is_parsed() {
        let uri = offer_uri("credential_offer", &offer_json().to_string());

        let offer = match CredentialOfferRef::parse(&uri).unwrap() {
            CredentialOfferRef::Value(offer) => offer,
            other => panic!("unexpected {other:?}"),
        };

        assert_eq!(offer.credential_issuer.as_str(), "https://issuer.example/");
        assert_eq!(offer.credential_configuration_ids, ["mDL"]);
        let grants = offer.grants.unwrap();
        assert_eq!(
            grants.authorization_code.unwrap().issuer_state.as_deref(),
            Some("eyJhbGciOiJSU0Et")
        );
        let pre_authorized = grants.pre_authorized_code.unwrap();
        assert_eq!(pre_authorized.pre_authorized_code, "adhjhdjajkdkhjhdj");
        assert_eq!(pre_authorized.tx_code.unwrap().length, Some(4));
    }

    #[test]
    fn offer_by_reference_is_parsed() {
        let uri = offer_uri("credential_offer_uri", "https://issuer.example/offers/1");

        assert_matches!(
            CredentialOfferRef::parse(&uri).unwrap(),
            CredentialOfferRef::Reference(url) if url.as_str() == "https://issuer.example/offers/1"
        );
    }

    #[test]
    fn malformed_offers_are_rejected() {
        let cases = [
            "not a uri".to_owned(),
            "openid-credential-offer://?foo=bar".to_owned(),
            offer_uri("credential_offer", "{not json"),
            offer_uri(
                "credential_offer",
                &json!({
                    "credential_issuer": "https://issuer.example",
                    "credential_configuration_ids": []
                })
                .to_string(),
            ),
            offer_uri("credential_offer_uri", "relative/path"),
        ];

        for case in cases {
            let err = CredentialOfferRef::parse(&case).unwrap_err();
            assert_matches!(err.error, Oid4vciError::Format(_), "{case}");
        }
    }

    #[test]
    fn well_known_suffix_is_inserted_before_the_path() {
        let url = Url::parse("https://issuer.example").unwrap();
        assert_eq!(
            well_known_url(&url, CREDENTIAL_ISSUER_WELL_KNOWN)
                .unwrap()
                .as_str(),
            "https://issuer.example/.well-known/openid-credential-issuer"
        );

        let url = Url::parse("https://auth.example/realms/pid/").unwrap();
        assert_eq!(
            well_known_url(&url, OAUTH_SERVER_WELL_KNOWN)
                .unwrap()
                .as_str(),
            "https://auth.example/.well-known/oauth-authorization-server/realms/pid"
        );

        let url = Url::parse("wallet://callback").unwrap();
        assert!(well_known_url(&url, OAUTH_SERVER_WELL_KNOWN).is_err());
    }

    #[test]
    fn credential_configurations_carry_their_format() {
        let configuration: CredentialConfiguration = serde_json::from_value(json!({
            "format": "mso_mdoc",
            "doctype": "org.iso.18013.5.1.mDL",
            "scope": "mDL",
            "cryptographic_binding_methods_supported": ["cose_key"],
            "proof_types_supported": {
                "jwt": { "proof_signing_alg_values_supported": ["ES256"] }
            },
            "display": [{ "name": "Mobile Driving License", "locale": "en" }]
        }))
        .unwrap();

        assert_eq!(
            configuration.format,
            CredentialFormat::MsoMdoc {
                doctype: "org.iso.18013.5.1.mDL".to_owned()
            }
        );
        assert_eq!(configuration.format.format_id(), Some("mso_mdoc"));
        assert_eq!(
            configuration.proof_types_supported["jwt"].proof_signing_alg_values_supported,
            ["ES256"]
        );
        assert!(configuration.display.is_some());

        let legacy: CredentialFormat =
            serde_json::from_value(json!({ "format": "vc+sd-jwt", "vct": "urn:pid" })).unwrap();
        assert_eq!(
            legacy,
            CredentialFormat::SdJwtVc {
                vct: "urn:pid".to_owned()
            }
        );

        let unsupported: CredentialFormat =
            serde_json::from_value(json!({ "format": "ldp_vc", "credential_definition": {} }))
                .unwrap();
        assert_eq!(unsupported, CredentialFormat::Unsupported);
        assert_eq!(unsupported.format_id(), None);
    }
}
