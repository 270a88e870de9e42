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

//! Registry of zero-knowledge proof systems able to prove statements about an mdoc without
//! disclosing it.
//!
//! The proof systems themselves live outside of this crate; they plug in through [`ZkSystem`] and
//! are looked up by name in a [`ZkSystemRepository`].

use std::collections::BTreeMap;

use bh_jws_utils::BoxError;
use bherror::traits::{ErrorContext as _, ForeignBoxed as _};
use bhx5chain::X5Chain;
use ciborium::Value;
use serde::{Deserialize, Serialize};

use crate::{
    error::format_error,
    models::{
        from_cbor_bytes, to_cbor_bytes, Bytes, DataElementIdentifier, DataElementValue, DateTime,
        DocType, NameSpace,
    },
    MdocError, Result,
};

/// A parameter of a [`ZkSystemSpec`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub enum ZkParamValue {
    /// A text string.
    String(String),
    /// A byte string.
    Bytes(Vec<u8>),
    /// A signed integer.
    Long(i64),
    /// A floating point number.
    Double(f64),
    /// A boolean.
    Bool(bool),
}

impl From<ZkParamValue> for Value {
    fn from(param: ZkParamValue) -> Self {
        match param {
            ZkParamValue::String(value) => Value::Text(value),
            ZkParamValue::Bytes(value) => Value::Bytes(value),
            ZkParamValue::Long(value) => Value::Integer(value.into()),
            ZkParamValue::Double(value) => Value::Float(value),
            ZkParamValue::Bool(value) => Value::Bool(value),
        }
    }
}

impl TryFrom<Value> for ZkParamValue {
    type Error = bherror::Error<MdocError>;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Text(value) => Ok(Self::String(value)),
            Value::Bytes(value) => Ok(Self::Bytes(value)),
            Value::Integer(value) => i64::try_from(value)
                .map(Self::Long)
                .map_err(|_| format_error("ZK parameter does not fit into 64 bits")),
            Value::Float(value) => Ok(Self::Double(value)),
            Value::Bool(value) => Ok(Self::Bool(value)),
            _ => Err(format_error("unsupported ZK parameter type")),
        }
    }
}

/// A concrete configuration of a proof system, e.g. a circuit for a given curve and doc type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZkSystemSpec {
    /// Identifier of the configuration.
    pub id: String,
    /// Name of the [`ZkSystem`] it belongs to.
    pub system: String,
    /// System specific parameters.
    pub params: BTreeMap<String, ZkParamValue>,
}

impl ZkSystemSpec {
    /// Creates a spec without parameters.
    pub fn new(id: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            system: system.into(),
            params: BTreeMap::new(),
        }
    }

    /// Adds a parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: ZkParamValue) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Looks up a parameter.
    pub fn param(&self, name: &str) -> Option<&ZkParamValue> {
        self.params.get(name)
    }
}

/// Data elements by name space.
pub type DataElements = BTreeMap<NameSpace, BTreeMap<DataElementIdentifier, DataElementValue>>;

/// The statement a [`ZkDocument`] proves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkDocumentData {
    /// The configuration the proof was generated with.
    pub zk_system_spec: ZkSystemSpec,
    /// Document type of the proven mdoc.
    pub doc_type: DocType,
    /// When the proof was generated.
    pub timestamp: DateTime,
    /// Disclosed issuer signed data elements.
    pub issuer_signed: DataElements,
    /// Disclosed device signed data elements.
    pub device_signed: DataElements,
    /// Certificate chain of the Mobile Security Object signer.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_x5chain"
    )]
    pub mso_x5chain: Option<X5Chain>,
}

/// A zero-knowledge proof over an mdoc, together with the statement it proves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkDocument {
    /// The opaque proof.
    pub proof: Bytes,
    /// The proven statement.
    pub document_data: ZkDocumentData,
}

impl ZkDocument {
    /// Encodes the document into _CBOR_.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_cbor_bytes(self)
    }

    /// Decodes a document from _CBOR_.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        from_cbor_bytes(bytes).ctx(|| "ZkDocument")
    }
}

/// A zero-knowledge proof system.
pub trait ZkSystem: Send + Sync {
    /// Unique name of the system, matched against [`ZkSystemSpec::system`].
    fn name(&self) -> &str;

    /// The configurations the system supports.
    fn system_specs(&self) -> Vec<ZkSystemSpec>;

    /// Picks the first of `requested` the system can prove `document` (an encoded mdoc
    /// `Document`) with.
    fn select_spec(&self, requested: &[ZkSystemSpec], document: &[u8]) -> Option<ZkSystemSpec>;

    /// Proves `document` bound to `session_transcript`.
    fn generate_proof(
        &self,
        spec: &ZkSystemSpec,
        document: &[u8],
        session_transcript: &[u8],
        timestamp: DateTime,
    ) -> std::result::Result<ZkDocument, BoxError>;

    /// Verifies the proof of `document`, failing if it does not hold.
    fn verify_proof(
        &self,
        document: &ZkDocument,
        spec: &ZkSystemSpec,
        session_transcript: &[u8],
    ) -> std::result::Result<(), BoxError>;
}

/// The proof systems available to a wallet or verifier.
#[derive(Default)]
pub struct ZkSystemRepository {
    systems: Vec<Box<dyn ZkSystem>>,
}

impl std::fmt::Debug for ZkSystemRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.systems.iter().map(|system| system.name()))
            .finish()
    }
}

impl ZkSystemRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `system`; earlier registrations take precedence.
    pub fn add(&mut self, system: impl ZkSystem + 'static) -> &mut Self {
        self.systems.push(Box::new(system));
        self
    }

    /// The first system registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<&dyn ZkSystem> {
        self.systems
            .iter()
            .find(|system| system.name() == name)
            .map(Box::as_ref)
    }

    /// Proves `document` with the first registered system that supports one of `specs`.
    pub fn generate_mdoc_proof(
        &self,
        specs: &[ZkSystemSpec],
        document: &[u8],
        session_transcript: &[u8],
    ) -> Result<ZkDocument> {
        let (system, spec) = self
            .systems
            .iter()
            .find_map(|system| {
                system
                    .select_spec(specs, document)
                    .map(|spec| (system, spec))
            })
            .ok_or_else(|| {
                bherror::Error::root(MdocError::SystemNotFound(
                    "no registered system supports the requested specs".to_owned(),
                ))
            })?;

        system
            .generate_proof(&spec, document, session_transcript, DateTime::now())
            .foreign_boxed_err(|| MdocError::ZkProof(system.name().to_owned()))
            .ctx(|| format!("spec {}", spec.id))
    }

    /// Verifies `document` with the system named by its spec.
    pub fn verify_zk_document_proof(
        &self,
        document: &ZkDocument,
        session_transcript: &[u8],
    ) -> Result<()> {
        let spec = &document.document_data.zk_system_spec;
        let system = self
            .lookup(&spec.system)
            .ok_or_else(|| bherror::Error::root(MdocError::SystemNotFound(spec.system.clone())))?;

        system
            .verify_proof(document, spec, session_transcript)
            .foreign_boxed_err(|| MdocError::ZkProof(spec.system.clone()))
            .ctx(|| format!("spec {}", spec.id))
    }
}

mod optional_x5chain {
    use bhx5chain::X5Chain;
    use ciborium::Value;
    use serde::{Deserialize as _, Deserializer, Serialize as _, Serializer};

    use crate::cose::{cbor_value_to_x5chain, x5chain_to_cbor_value};

    pub(super) fn serialize<S: Serializer>(
        x5chain: &Option<X5Chain>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        x5chain
            .as_ref()
            .map(x5chain_to_cbor_value)
            .transpose()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<X5Chain>, D::Error> {
        Option::<Value>::deserialize(deserializer)?
            .map(cbor_value_to_x5chain)
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use assert_matches::assert_matches;
    use openssl::nid::Nid;

    use super::*;
    use crate::cose::tests::issuer;

    const MDL: &str = "org.iso.18013.5.1.mDL";

    /// "Proves" by hashing the transcript together with the doc type.
    struct MockSystem {
        name: &'static str,
        circuit: &'static str,
        proofs: Arc<AtomicUsize>,
    }

    impl MockSystem {
        fn new(name: &'static str, circuit: &'static str) -> Self {
            Self {
                name,
                circuit,
                proofs: Arc::default(),
            }
        }

        fn spec(&self) -> ZkSystemSpec {
            ZkSystemSpec::new(self.circuit, self.name)
                .with_param("version", ZkParamValue::Long(3))
                .with_param("curve", ZkParamValue::String("P-256".to_owned()))
        }

        fn proof(transcript: &[u8], doc_type: &DocType) -> Vec<u8> {
            openssl::sha::sha256(&[transcript, doc_type.0.as_bytes()].concat()).to_vec()
        }
    }

    impl ZkSystem for MockSystem {
        fn name(&self) -> &str {
            self.name
        }

        fn system_specs(&self) -> Vec<ZkSystemSpec> {
            vec![self.spec()]
        }

        fn select_spec(&self, requested: &[ZkSystemSpec], _: &[u8]) -> Option<ZkSystemSpec> {
            requested
                .iter()
                .find(|spec| spec.id == self.circuit)
                .cloned()
        }

        fn generate_proof(
            &self,
            spec: &ZkSystemSpec,
            _: &[u8],
            session_transcript: &[u8],
            timestamp: DateTime,
        ) -> std::result::Result<ZkDocument, BoxError> {
            self.proofs.fetch_add(1, Ordering::SeqCst);
            let doc_type = DocType::from(MDL);

            Ok(ZkDocument {
                proof: Bytes(Self::proof(session_transcript, &doc_type)),
                document_data: ZkDocumentData {
                    zk_system_spec: spec.clone(),
                    doc_type,
                    timestamp,
                    issuer_signed: BTreeMap::from([(
                        NameSpace::from("org.iso.18013.5.1"),
                        BTreeMap::from([(
                            DataElementIdentifier::from("age_over_18"),
                            DataElementValue::from(true),
                        )]),
                    )]),
                    device_signed: BTreeMap::new(),
                    mso_x5chain: None,
                },
            })
        }

        fn verify_proof(
            &self,
            document: &ZkDocument,
            _: &ZkSystemSpec,
            session_transcript: &[u8],
        ) -> std::result::Result<(), BoxError> {
            let expected = Self::proof(session_transcript, &document.document_data.doc_type);
            if document.proof.0 != expected {
                return Err("proof does not verify".into());
            }
            Ok(())
        }
    }

    fn repository() -> ZkSystemRepository {
        let mut repository = ZkSystemRepository::new();
        repository
            .add(MockSystem::new("longfellow", "circuit-a"))
            .add(MockSystem::new("other", "circuit-b"));
        repository
    }

    #[test]
    fn lookup_by_name() {
        let repository = repository();

        assert_eq!(repository.lookup("other").unwrap().name(), "other");
        assert!(repository.lookup("missing").is_none());
        assert_eq!(
            repository.lookup("longfellow").unwrap().system_specs()[0].id,
            "circuit-a"
        );
    }

    #[test]
    fn generate_and_verify() {
        let repository = repository();
        let specs = [
            ZkSystemSpec::new("unknown", "nobody"),
            ZkSystemSpec::new("circuit-b", "other"),
        ];

        let document = repository
            .generate_mdoc_proof(&specs, b"document", b"transcript")
            .unwrap();
        assert_eq!(document.document_data.zk_system_spec, specs[1]);

        repository
            .verify_zk_document_proof(&document, b"transcript")
            .unwrap();

        let err = repository
            .verify_zk_document_proof(&document, b"another transcript")
            .unwrap_err();
        assert_matches!(err.error, MdocError::ZkProof(ref name) if name == "other");
    }

    #[test]
    fn first_registered_system_wins() {
        let first = MockSystem::new("first", "circuit");
        let second = MockSystem::new("second", "circuit");
        let (first_proofs, second_proofs) = (first.proofs.clone(), second.proofs.clone());

        let mut repository = ZkSystemRepository::new();
        repository.add(first).add(second);
        let specs = [ZkSystemSpec::new("circuit", "first")];

        repository
            .generate_mdoc_proof(&specs, b"document", b"transcript")
            .unwrap();

        assert_eq!(first_proofs.load(Ordering::SeqCst), 1);
        assert_eq!(second_proofs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_systems() {
        let repository = repository();

        let err = repository
            .generate_mdoc_proof(&[ZkSystemSpec::new("x", "nobody")], b"document", b"t")
            .unwrap_err();
        assert_matches!(err.error, MdocError::SystemNotFound(_));

        let mut document = repository
            .generate_mdoc_proof(&[MockSystem::new("longfellow", "circuit-a").spec()], b"d", b"t")
            .unwrap();
        document.document_data.zk_system_spec.system = "retired".to_owned();

        let err = repository
            .verify_zk_document_proof(&document, b"t")
            .unwrap_err();
        assert_matches!(err.error, MdocError::SystemNotFound(ref name) if name == "retired");
    }

    #[test]
    fn zk_document_cbor_round_trip() {
        let repository = repository();
        let spec = MockSystem::new("longfellow", "circuit-a")
            .spec()
            .with_param("blob", ZkParamValue::Bytes(vec![1, 2]))
            .with_param("ratio", ZkParamValue::Double(0.5))
            .with_param("strict", ZkParamValue::Bool(true));
        let mut document = repository
            .generate_mdoc_proof(&[spec], b"document", b"transcript")
            .unwrap();

        let bytes = document.to_bytes().unwrap();
        assert_eq!(ZkDocument::from_bytes(&bytes).unwrap(), document);

        let (_, x5chain) = issuer(Nid::X9_62_PRIME256V1);
        document.document_data.mso_x5chain = Some(x5chain);
        let bytes = document.to_bytes().unwrap();
        assert_eq!(ZkDocument::from_bytes(&bytes).unwrap(), document);

        let value: Value = from_cbor_bytes(&bytes).unwrap();
        let data = &value.as_map().unwrap()[1].1;
        let keys: Vec<_> = data
            .as_map()
            .unwrap()
            .iter()
            .map(|(key, _)| key.as_text().unwrap())
            .collect();
        assert_eq!(
            keys,
            [
                "zkSystemSpec",
                "docType",
                "timestamp",
                "issuerSigned",
                "deviceSigned",
                "msoX5chain"
            ]
        );
    }

    #[test]
    fn unsupported_param_types() {
        let err = ZkParamValue::try_from(Value::Array(vec![])).unwrap_err();
        assert_matches!(err.error, MdocError::Format(_));

        let err = ZkParamValue::try_from(Value::Integer(u64::MAX.into())).unwrap_err();
        assert_matches!(err.error, MdocError::Format(_));
    }
}
