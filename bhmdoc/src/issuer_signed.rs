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

//! Issuer signed data elements and their digests, as defined in section `8.3.2.1.2.2` and `9.1.2.4`
//! of [ISO/IEC 18013-5:2021][1].
//!
//! [1]: <https://www.iso.org/standard/69084.html>

use std::collections::{BTreeMap, HashSet};

use bherror::traits::ForeignError as _;
use ciborium::Value;
use rand::{seq::SliceRandom as _, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    error::format_error,
    models::{Bytes, BytesCbor, DataElementIdentifier, DataElementValue, NameSpace},
    MdocError, Result,
};

/// The smallest allowed length of the `random` salt of an [`IssuerSignedItem`].
pub const MIN_RANDOM_SIZE: usize = 16;

/// Identifier of an [`IssuerSignedItem`] digest, unique within a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestID(pub u64);

impl std::fmt::Display for DigestID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DigestID {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Algorithm used to digest the [`IssuerSignedItemBytes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-256
    #[serde(rename = "SHA-256")]
    Sha256,
    /// SHA-384
    #[serde(rename = "SHA-384")]
    Sha384,
    /// SHA-512
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl DigestAlgorithm {
    /// Digests `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => openssl::sha::sha256(data).to_vec(),
            Self::Sha384 => openssl::sha::sha384(data).to_vec(),
            Self::Sha512 => openssl::sha::sha512(data).to_vec(),
        }
    }
}

/// A single data element signed by the issuer, salted so that its digest reveals nothing about the
/// value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSignedItem {
    /// Reference to the digest of this item in the Mobile Security Object.
    #[serde(rename = "digestID")]
    pub digest_id: DigestID,
    /// The salt.
    pub random: Bytes,
    /// The data element identifier.
    pub element_identifier: DataElementIdentifier,
    /// The data element value.
    pub element_value: DataElementValue,
}

/// An [`IssuerSignedItem`] wrapped as `#6.24(bstr .cbor IssuerSignedItem)`.
pub type IssuerSignedItemBytes = BytesCbor<IssuerSignedItem>;

impl IssuerSignedItem {
    /// Digests the tag 24 wrapped encoding of the item.
    pub fn calculate_digest(&self, algorithm: DigestAlgorithm) -> Result<Vec<u8>> {
        item_digest(&IssuerSignedItemBytes::from(self.clone()), algorithm)
    }

    /// Encodes the item into a _CBOR_ data item.
    pub fn to_data_item(&self) -> Result<Value> {
        Value::serialized(self)
            .foreign_err(|| MdocError::Format("unable to encode IssuerSignedItem".to_owned()))
    }

    /// Decodes the item from a _CBOR_ data item.
    pub fn from_data_item(value: &Value) -> Result<Self> {
        value
            .deserialized()
            .foreign_err(|| MdocError::Format("invalid IssuerSignedItem".to_owned()))
    }
}

/// Digests the wire encoding of `item`, which is the received one when it was decoded.
pub fn item_digest(item: &IssuerSignedItemBytes, algorithm: DigestAlgorithm) -> Result<Vec<u8>> {
    Ok(algorithm.digest(&item.to_tagged_bytes()?))
}

/// Digests of all the items of an [`IssuerNamespaces`], per name space and digest ID.
pub type ValueDigests = BTreeMap<NameSpace, BTreeMap<DigestID, Bytes>>;

/// The issuer signed data elements of a document, grouped by name space.
///
/// Encoded as `{ NameSpace => [+ IssuerSignedItemBytes] }`.  Items keep the order they were
/// received or built in; element identifiers are unique within a name space.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<NameSpace, Vec<IssuerSignedItemBytes>>",
    try_from = "BTreeMap<NameSpace, Vec<IssuerSignedItemBytes>>"
)]
pub struct IssuerNamespaces(BTreeMap<NameSpace, Vec<IssuerSignedItemBytes>>);

impl IssuerNamespaces {
    /// The name spaces present.
    pub fn namespaces(&self) -> impl Iterator<Item = &NameSpace> {
        self.0.keys()
    }

    /// The items of `namespace`, in order.
    pub fn items<'a>(&'a self, namespace: &str) -> impl Iterator<Item = &'a IssuerSignedItem> {
        self.0
            .get(namespace)
            .into_iter()
            .flatten()
            .map(BytesCbor::inner)
    }

    /// Looks up a single item.
    pub fn get(&self, namespace: &str, identifier: &str) -> Option<&IssuerSignedItem> {
        self.items(namespace)
            .find(|item| item.element_identifier.0 == identifier)
    }

    /// Total number of items across all name spaces.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Whether there are no items at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keeps only the `(namespace, element identifier)` pairs that are both requested and present.
    ///
    /// Requested pairs without a matching item are skipped, and name spaces left without items are
    /// omitted.
    pub fn filter<'a, I>(&self, requested: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let requested: HashSet<(&str, &str)> = requested.into_iter().collect();

        let namespaces = self
            .0
            .iter()
            .filter_map(|(namespace, items)| {
                let items: Vec<_> = items
                    .iter()
                    .filter(|item| {
                        requested.contains(&(
                            namespace.0.as_str(),
                            item.inner().element_identifier.0.as_str(),
                        ))
                    })
                    .cloned()
                    .collect();
                (!items.is_empty()).then(|| (namespace.clone(), items))
            })
            .collect();

        Self(namespaces)
    }

    /// Digests every item with `algorithm`, as embedded into a Mobile Security Object.
    pub fn value_digests(&self, algorithm: DigestAlgorithm) -> Result<ValueDigests> {
        self.0
            .iter()
            .map(|(namespace, items)| {
                let digests: BTreeMap<DigestID, Bytes> = items
                    .iter()
                    .map(|item| {
                        let digest = item_digest(item, algorithm)?;
                        Ok((item.inner().digest_id, Bytes(digest)))
                    })
                    .collect::<Result<_>>()?;
                Ok((namespace.clone(), digests))
            })
            .collect()
    }

    /// Encodes the name spaces into a _CBOR_ data item.
    pub fn to_data_item(&self) -> Result<Value> {
        Value::serialized(self)
            .foreign_err(|| MdocError::Format("unable to encode IssuerNamespaces".to_owned()))
    }

    /// Decodes the name spaces from a _CBOR_ data item.
    pub fn from_data_item(value: &Value) -> Result<Self> {
        value
            .deserialized()
            .foreign_err(|| MdocError::Format("invalid IssuerNamespaces".to_owned()))
    }
}

impl From<IssuerNamespaces> for BTreeMap<NameSpace, Vec<IssuerSignedItemBytes>> {
    fn from(namespaces: IssuerNamespaces) -> Self {
        namespaces.0
    }
}

impl TryFrom<BTreeMap<NameSpace, Vec<IssuerSignedItemBytes>>> for IssuerNamespaces {
    type Error = bherror::Error<MdocError>;

    fn try_from(namespaces: BTreeMap<NameSpace, Vec<IssuerSignedItemBytes>>) -> Result<Self> {
        for (namespace, items) in &namespaces {
            let mut identifiers = HashSet::new();
            let mut digest_ids = HashSet::new();
            for item in items.iter().map(BytesCbor::inner) {
                if !identifiers.insert(&item.element_identifier) {
                    return Err(format_error(format!(
                        "duplicate element `{}` in name space `{namespace}`",
                        item.element_identifier
                    )));
                }
                if !digest_ids.insert(item.digest_id) {
                    return Err(format_error(format!(
                        "duplicate digest ID {} in name space `{namespace}`",
                        item.digest_id
                    )));
                }
            }
        }
        Ok(Self(namespaces))
    }
}

/// Builds [`IssuerNamespaces`] with shuffled digest IDs and fresh salts.
#[derive(Clone, Debug)]
pub struct IssuerNamespacesBuilder {
    namespaces: BTreeMap<NameSpace, Vec<(DataElementIdentifier, DataElementValue)>>,
    random_size: usize,
}

impl Default for IssuerNamespacesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IssuerNamespacesBuilder {
    /// Creates an empty builder producing [`MIN_RANDOM_SIZE`] byte salts.
    pub fn new() -> Self {
        Self {
            namespaces: BTreeMap::new(),
            random_size: MIN_RANDOM_SIZE,
        }
    }

    /// Sets the length of the generated salts.
    ///
    /// Values below [`MIN_RANDOM_SIZE`] make [`build`][Self::build] fail.
    pub fn with_random_size(mut self, random_size: usize) -> Self {
        self.random_size = random_size;
        self
    }

    /// Adds an (initially empty) name space.
    pub fn add_namespace(mut self, namespace: impl Into<NameSpace>) -> Self {
        self.namespaces.entry(namespace.into()).or_default();
        self
    }

    /// Adds a data element, replacing the value of an element with the same identifier.
    pub fn add_data_element(
        mut self,
        namespace: impl Into<NameSpace>,
        identifier: impl Into<DataElementIdentifier>,
        value: impl Into<DataElementValue>,
    ) -> Self {
        let elements = self.namespaces.entry(namespace.into()).or_default();
        let identifier = identifier.into();
        let value = value.into();

        match elements.iter_mut().find(|(existing, _)| *existing == identifier) {
            Some((_, existing)) => *existing = value,
            None => elements.push((identifier, value)),
        }
        self
    }

    /// Salts every element and assigns digest IDs `0..N` in an order shuffled with `rng`, where `N`
    /// is the number of elements across all name spaces.
    pub fn build<R: Rng + ?Sized>(self, rng: &mut R) -> Result<IssuerNamespaces> {
        if self.random_size < MIN_RANDOM_SIZE {
            return Err(bherror::Error::root(MdocError::Config(format!(
                "random size {} is below the minimum of {MIN_RANDOM_SIZE} bytes",
                self.random_size
            ))));
        }

        let count = self.namespaces.values().map(Vec::len).sum::<usize>() as u64;
        let mut digest_ids: Vec<u64> = (0..count).collect();
        digest_ids.shuffle(rng);
        let mut digest_ids = digest_ids.into_iter().map(DigestID);

        let mut namespaces = BTreeMap::new();
        for (namespace, elements) in self.namespaces {
            let mut items = Vec::with_capacity(elements.len());
            for (element_identifier, element_value) in elements {
                let digest_id = digest_ids.next().ok_or_else(|| {
                    bherror::Error::root(MdocError::Config("ran out of digest IDs".to_owned()))
                })?;
                let mut random = vec![0u8; self.random_size];
                rng.fill_bytes(&mut random);

                items.push(IssuerSignedItemBytes::from(IssuerSignedItem {
                    digest_id,
                    random: Bytes(random),
                    element_identifier,
                    element_value,
                }));
            }
            namespaces.insert(namespace, items);
        }

        Ok(IssuerNamespaces(namespaces))
    }
}
