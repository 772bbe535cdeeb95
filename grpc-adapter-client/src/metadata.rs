//! Ordered, multi-valued call metadata.
//!
//! [`Metadata`] keeps `(key, value)` pairs exactly in the order they were
//! added, duplicates included. tonic's [`MetadataMap`] groups values by key
//! when iterating, so the pairs are kept here and only appended to a
//! `MetadataMap` when a request is built.

use serde::Deserialize;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};

use crate::MetadataError;

/// Ordered multimap of ASCII metadata.
///
/// Keys and values are validated when added, so a [`CallContext`] built from
/// this metadata can always be turned into a request.
///
/// # Example
///
/// ```
/// use grpc_adapter_client::Metadata;
///
/// let mut md = Metadata::new();
/// md.append("x-trace", "a")?;
/// md.append("x-tenant", "blue")?;
/// md.append("x-trace", "b")?;
///
/// let pairs: Vec<_> = md.iter_str().collect();
/// assert_eq!(pairs, vec![("x-trace", "a"), ("x-tenant", "blue"), ("x-trace", "b")]);
/// # Ok::<(), grpc_adapter_client::MetadataError>(())
/// ```
///
/// [`CallContext`]: crate::CallContext
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<(String, String)>")]
pub struct Metadata {
    entries: Vec<(AsciiMetadataKey, AsciiMetadataValue)>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build metadata from `(key, value)` pairs, keeping their order.
    ///
    /// Fails on the first invalid key or value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, MetadataError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut metadata = Self::new();
        for (key, value) in pairs {
            metadata.append(key.as_ref(), value.as_ref())?;
        }
        Ok(metadata)
    }

    /// Append a pair after all existing ones.
    ///
    /// Keys are lower-cased by tonic's header-name parsing. Binary keys
    /// (ending in `-bin`) are not accepted.
    pub fn append(&mut self, key: &str, value: &str) -> Result<(), MetadataError> {
        let parsed_key = AsciiMetadataKey::from_bytes(key.as_bytes())
            .map_err(|_| MetadataError::InvalidKey(key.to_string()))?;
        let parsed_value = AsciiMetadataValue::try_from(value)
            .map_err(|_| MetadataError::InvalidValue(key.to_string()))?;
        self.entries.push((parsed_key, parsed_value));
        Ok(())
    }

    /// Number of pairs, counting duplicates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&AsciiMetadataKey, &AsciiMetadataValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Iterate over the pairs as strings, in insertion order.
    pub fn iter_str(&self) -> impl Iterator<Item = (&str, &str)> {
        // Values were built from `&str`, so `to_str` cannot fail here.
        self.entries
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str(), v)))
    }

    /// All values for `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a AsciiMetadataValue> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.as_str().eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Append every pair to `map`, keeping order and multiplicity.
    pub fn apply_to(&self, map: &mut MetadataMap) {
        for (key, value) in &self.entries {
            map.append(key.clone(), value.clone());
        }
    }
}

impl TryFrom<Vec<(String, String)>> for Metadata {
    type Error = MetadataError;

    fn try_from(pairs: Vec<(String, String)>) -> Result<Self, Self::Error> {
        Self::from_pairs(pairs)
    }
}
