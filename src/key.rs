//! Composite keys.
//!
//! A composite key joins an index name with an ordered list of attributes
//! into a single ledger key. The layout is:
//!
//! ```text
//! 0x00 esc(index) 0x00 esc(attr_1) 0x00 ... esc(attr_n) 0x00
//! ```
//!
//! `esc` replaces `0x00` with `0x01 0x01` and `0x01` with `0x01 0x02`, so an
//! escaped component never contains a raw `0x00`. Every component is
//! terminated by `0x00`, which makes the encoding injective and guarantees
//! that the key of one record is never a prefix of the key of another record
//! under the same index. A partial key (index plus leading attributes) is a
//! byte prefix of exactly the keys that extend it, so it can drive a range
//! scan.

use std::fmt;

use thiserror::Error;

/// Leading byte of every composite key; plain keys starting elsewhere never
/// show up in a composite scan.
pub const NAMESPACE: u8 = 0x00;

const SEPARATOR: u8 = 0x00;
const ESCAPE: u8 = 0x01;
const ESCAPED_SEPARATOR: u8 = 0x01;
const ESCAPED_ESCAPE: u8 = 0x02;

/// Errors raised while building or splitting composite keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The index name was empty.
    #[error("index name cannot be empty")]
    EmptyIndexName,

    /// The bytes are not a composite key.
    #[error("malformed composite key: {0}")]
    Malformed(String),
}

/// An encoded composite key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeKey(Vec<u8>);

impl CompositeKey {
    /// Builds a composite key from an index name and attributes.
    ///
    /// # Errors
    /// Returns [`KeyError::EmptyIndexName`] if `index_name` is empty.
    pub fn new<S: AsRef<str>>(index_name: &str, attributes: &[S]) -> Result<Self, KeyError> {
        if index_name.is_empty() {
            return Err(KeyError::EmptyIndexName);
        }

        let capacity = 2
            + index_name.len()
            + attributes
                .iter()
                .map(|a| a.as_ref().len() + 1)
                .sum::<usize>();
        let mut out = Vec::with_capacity(capacity);
        out.push(NAMESPACE);
        push_component(&mut out, index_name.as_bytes());
        for attr in attributes {
            push_component(&mut out, attr.as_ref().as_bytes());
        }
        Ok(Self(out))
    }

    /// Wraps raw ledger bytes without validation.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes as stored in the ledger.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the key, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Returns true if `self` is a byte prefix of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &[u8]) -> bool {
        other.starts_with(&self.0)
    }

    /// Splits the key back into its index name and attributes.
    ///
    /// # Errors
    /// Returns [`KeyError::Malformed`] if the bytes were not produced by
    /// [`CompositeKey::new`].
    pub fn split(&self) -> Result<(String, Vec<String>), KeyError> {
        split_key(&self.0)
    }
}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompositeKey({self})")
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.split() {
            Ok((index, attrs)) => {
                write!(f, "{index}")?;
                for attr in attrs {
                    write!(f, "/{}", attr.escape_debug())?;
                }
                Ok(())
            }
            Err(_) => write!(f, "{:02x?}", self.0),
        }
    }
}

impl AsRef<[u8]> for CompositeKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Key of a single record under `index_name`.
///
/// # Errors
/// Returns [`KeyError::EmptyIndexName`] if `index_name` is empty.
pub fn derive_key(index_name: &str, record_id: &str) -> Result<CompositeKey, KeyError> {
    CompositeKey::new(index_name, &[record_id])
}

/// Prefix shared by every key under `index_name` whose leading attributes
/// equal `attributes`.
///
/// # Errors
/// Returns [`KeyError::EmptyIndexName`] if `index_name` is empty.
pub fn partial_key<S: AsRef<str>>(
    index_name: &str,
    attributes: &[S],
) -> Result<CompositeKey, KeyError> {
    CompositeKey::new(index_name, attributes)
}

/// Decodes raw key bytes into an index name and attributes.
///
/// # Errors
/// Returns [`KeyError::Malformed`] on a missing namespace byte, a dangling or
/// unknown escape, an unterminated component, or invalid UTF-8.
pub fn split_key(bytes: &[u8]) -> Result<(String, Vec<String>), KeyError> {
    let Some((&first, rest)) = bytes.split_first() else {
        return Err(KeyError::Malformed("empty key".to_string()));
    };
    if first != NAMESPACE {
        return Err(KeyError::Malformed(format!(
            "expected namespace byte 0x00, found {first:#04x}"
        )));
    }

    let mut components = Vec::new();
    let mut current = Vec::new();
    let mut iter = rest.iter().copied();
    while let Some(b) = iter.next() {
        match b {
            SEPARATOR => components.push(component_to_string(std::mem::take(&mut current))?),
            ESCAPE => match iter.next() {
                Some(ESCAPED_SEPARATOR) => current.push(SEPARATOR),
                Some(ESCAPED_ESCAPE) => current.push(ESCAPE),
                Some(other) => {
                    return Err(KeyError::Malformed(format!(
                        "unknown escape sequence 0x01 {other:#04x}"
                    )))
                }
                None => return Err(KeyError::Malformed("dangling escape byte".to_string())),
            },
            other => current.push(other),
        }
    }

    if !current.is_empty() {
        return Err(KeyError::Malformed("unterminated component".to_string()));
    }

    let mut components = components.into_iter();
    let index = components
        .next()
        .ok_or_else(|| KeyError::Malformed("missing index name".to_string()))?;
    if index.is_empty() {
        return Err(KeyError::EmptyIndexName);
    }
    Ok((index, components.collect()))
}

fn push_component(out: &mut Vec<u8>, component: &[u8]) {
    for &b in component {
        match b {
            SEPARATOR => out.extend_from_slice(&[ESCAPE, ESCAPED_SEPARATOR]),
            ESCAPE => out.extend_from_slice(&[ESCAPE, ESCAPED_ESCAPE]),
            other => out.push(other),
        }
    }
    out.push(SEPARATOR);
}

fn component_to_string(bytes: Vec<u8>) -> Result<String, KeyError> {
    String::from_utf8(bytes).map_err(|e| KeyError::Malformed(format!("invalid utf-8: {e}")))
}
