use crate::{
    key::{Key, KeyId},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// Row
///
/// One entity instance: a key plus named property values. The entity kind is
/// the kind of the key's last path element.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Row {
    key: Key,
    properties: BTreeMap<String, Value>,
}

impl Row {
    #[must_use]
    pub const fn new(key: Key) -> Self {
        Self {
            key,
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property assignment.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    #[must_use]
    pub const fn key(&self) -> &Key {
        &self.key
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        self.key.kind()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    #[must_use]
    pub const fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    #[must_use]
    pub fn into_parts(self) -> (Key, BTreeMap<String, Value>) {
        (self.key, self.properties)
    }

    /// Replace the key with its completed form. Only stores and the write
    /// path mint ids.
    pub(crate) fn complete_key(&mut self, id: KeyId) -> Result<(), crate::key::KeyError> {
        self.key = self.key.clone().complete(id)?;
        Ok(())
    }

    /// Rebuild the pending key under a new parent before first write.
    pub(crate) fn rekey(&mut self, key: Key) {
        debug_assert!(
            !self.key.is_complete(),
            "complete keys are immutable and cannot be rekeyed"
        );
        self.key = key;
    }
}
