//! Hierarchical, ancestor-embedding row identity.
//!
//! A key is an ordered path of `(kind, id-or-name)` elements. Every element but
//! the last forms the ancestor path; the last names the row itself. Keys are
//! immutable once complete: the only legal growth is completing the trailing
//! element before the row is first written.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

// Byte-encoding markers. Chosen so encoded bytes sort exactly like `Key`.
const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;
const TAG_ID: u8 = 0x01;
const TAG_NAME: u8 = 0x02;

///
/// KeyError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum KeyError {
    #[error("key kind must be non-empty")]
    EmptyKind,

    #[error("key name must be non-empty (kind '{kind}')")]
    EmptyName { kind: String },

    #[error("ancestor key {ancestor} is incomplete; ancestors must be written first")]
    IncompleteAncestor { ancestor: String },

    #[error("key {key} is already complete and cannot be reassigned")]
    AlreadyComplete { key: String },

    #[error("key {key} is incomplete")]
    Incomplete { key: String },

    #[error("key path must be non-empty")]
    EmptyPath,
}

///
/// KeyId
///
/// Store-assigned numeric id or caller-chosen name for one path element.
///

#[derive(
    Clone, Debug, Display, Eq, From, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
pub enum KeyId {
    #[display("{_0}")]
    Id(u64),
    #[display("\"{_0}\"")]
    Name(String),
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

///
/// PathElement
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct PathElement {
    kind: String,
    id: Option<KeyId>,
}

impl PathElement {
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub const fn id(&self) -> Option<&KeyId> {
        self.id.as_ref()
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}({id})", self.kind),
            None => write!(f, "{}(?)", self.kind),
        }
    }
}

///
/// Key
///
/// Ordering is lexicographic over path elements, so every ancestor sorts
/// immediately before its descendants.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "KeyRepr")]
pub struct Key {
    path: Vec<PathElement>,
}

// Unvalidated wire shape of `Key`.
#[derive(Deserialize)]
struct KeyRepr {
    path: Vec<PathElement>,
}

impl TryFrom<KeyRepr> for Key {
    type Error = KeyError;

    fn try_from(repr: KeyRepr) -> Result<Self, Self::Error> {
        let Some((last, ancestors)) = repr.path.split_last() else {
            return Err(KeyError::EmptyPath);
        };

        let mut path = Vec::with_capacity(repr.path.len());
        for PathElement { kind, id } in ancestors {
            let element = element(kind.clone(), id.clone())?;
            if element.id.is_none() {
                return Err(KeyError::IncompleteAncestor {
                    ancestor: element.to_string(),
                });
            }
            path.push(element);
        }
        path.push(element(last.kind.clone(), last.id.clone())?);

        Ok(Self { path })
    }
}

impl Key {
    /// Complete root key.
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Result<Self, KeyError> {
        Ok(Self {
            path: vec![element(kind.into(), Some(id.into()))?],
        })
    }

    /// Incomplete key awaiting a store-minted id, optionally under `parent`.
    pub fn incomplete(kind: impl Into<String>, parent: Option<&Self>) -> Result<Self, KeyError> {
        let mut path = match parent {
            Some(parent) => {
                parent.ensure_complete_ancestor()?;
                parent.path.clone()
            }
            None => Vec::new(),
        };
        path.push(element(kind.into(), None)?);

        Ok(Self { path })
    }

    /// Complete child key under this (complete) key.
    pub fn child(&self, kind: impl Into<String>, id: impl Into<KeyId>) -> Result<Self, KeyError> {
        self.ensure_complete_ancestor()?;
        let mut path = self.path.clone();
        path.push(element(kind.into(), Some(id.into()))?);

        Ok(Self { path })
    }

    /// Complete the trailing element. Fails if the key already has an id.
    pub fn complete(mut self, id: impl Into<KeyId>) -> Result<Self, KeyError> {
        if self.is_complete() {
            return Err(KeyError::AlreadyComplete {
                key: self.to_string(),
            });
        }
        let id = id.into();
        if let KeyId::Name(name) = &id
            && name.is_empty()
        {
            return Err(KeyError::EmptyName {
                kind: self.kind().to_string(),
            });
        }
        if let Some(last) = self.path.last_mut() {
            last.id = Some(id);
        }

        Ok(self)
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        self.last().kind()
    }

    #[must_use]
    pub fn id(&self) -> Option<&KeyId> {
        self.last().id()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.last().id.is_some()
    }

    #[must_use]
    pub const fn depth(&self) -> usize {
        self.path.len()
    }

    #[must_use]
    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    /// All elements but the last.
    #[must_use]
    pub fn ancestor_path(&self) -> &[PathElement] {
        &self.path[..self.path.len() - 1]
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        (self.path.len() > 1).then(|| Self {
            path: self.ancestor_path().to_vec(),
        })
    }

    /// Key of the entity-group root.
    #[must_use]
    pub fn root(&self) -> Self {
        Self {
            path: vec![self.path[0].clone()],
        }
    }

    /// Strict ancestor test: `self` is a proper prefix of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.path.len() < other.path.len() && other.path.starts_with(&self.path)
    }

    /// Ancestor-filter semantics: the ancestor itself and every descendant match.
    #[must_use]
    pub fn is_descendant_or_self(&self, ancestor: &Self) -> bool {
        self == ancestor || ancestor.is_ancestor_of(self)
    }

    /// True when both keys live under the same root element.
    #[must_use]
    pub fn same_entity_group(&self, other: &Self) -> bool {
        self.path[0] == other.path[0]
    }

    /// Order-preserving byte encoding of a complete key.
    pub fn encode(&self) -> Result<Vec<u8>, KeyError> {
        if !self.is_complete() {
            return Err(KeyError::Incomplete {
                key: self.to_string(),
            });
        }

        let mut out = Vec::with_capacity(self.path.len() * 16);
        for element in &self.path {
            push_escaped(&mut out, element.kind.as_bytes());
            match &element.id {
                Some(KeyId::Id(id)) => {
                    out.push(TAG_ID);
                    out.extend_from_slice(&id.to_be_bytes());
                }
                Some(KeyId::Name(name)) => {
                    out.push(TAG_NAME);
                    push_escaped(&mut out, name.as_bytes());
                }
                None => unreachable!("ancestors are complete by construction"),
            }
        }

        Ok(out)
    }

    fn last(&self) -> &PathElement {
        // path is non-empty by construction
        &self.path[self.path.len() - 1]
    }

    fn ensure_complete_ancestor(&self) -> Result<(), KeyError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(KeyError::IncompleteAncestor {
                ancestor: self.to_string(),
            })
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

fn element(kind: String, id: Option<KeyId>) -> Result<PathElement, KeyError> {
    if kind.is_empty() {
        return Err(KeyError::EmptyKind);
    }
    if let Some(KeyId::Name(name)) = &id
        && name.is_empty()
    {
        return Err(KeyError::EmptyName { kind });
    }

    Ok(PathElement { kind, id })
}

// Escape zero bytes and terminate, so a shorter string sorts before its extensions.
fn push_escaped(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        if b == ESCAPE {
            out.extend_from_slice(&[ESCAPE, ESCAPED_ZERO]);
        } else {
            out.push(b);
        }
    }
    out.extend_from_slice(&[ESCAPE, TERMINATOR]);
}

///
/// TESTS
///
