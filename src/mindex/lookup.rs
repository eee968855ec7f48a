//! Lookup specifications
//!
//! A `LookupSpec` describes which keys of an index a query selects. It has
//! the same shape as the `KeySpec` it is used with.

use std::cmp::Ordering;

use super::errors::{IndexError, IndexResult};
use super::key::Key;
use crate::tuples::Tuples;

/// Key selection for an index lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LookupSpec {
    /// Exactly this key
    Value(Key),
    /// Keys between the bounds, both inclusive, either optional
    Range { min: Option<Key>, max: Option<Key> },
    /// String keys starting with the prefix
    Prefix { prefix: String, case_insensitive: bool },
    /// Any of the keys
    MultiValue(Vec<Key>),
    /// Positional children of a composite key
    Composite(Vec<LookupSpec>),
    /// Positional children of an array key
    Array(Vec<LookupSpec>),
}

impl LookupSpec {
    /// True if the lookup has to scan keys rather than hash one
    pub fn needs_scan(&self) -> bool {
        match self {
            LookupSpec::Range { .. } | LookupSpec::Prefix { .. } => true,
            LookupSpec::Composite(children) | LookupSpec::Array(children) => {
                children.iter().any(LookupSpec::needs_scan)
            }
            _ => false,
        }
    }

    /// True if the lookup stands for more than one key
    pub fn multi_valued(&self) -> bool {
        match self {
            LookupSpec::MultiValue(values) => values.len() > 1,
            LookupSpec::Composite(children) | LookupSpec::Array(children) => {
                children.iter().any(LookupSpec::multi_valued)
            }
            _ => false,
        }
    }

    /// The single key this lookup selects
    pub fn build_key(&self) -> IndexResult<Key> {
        match self {
            LookupSpec::Value(key) => Ok(key.clone()),
            LookupSpec::MultiValue(values) if values.len() == 1 => Ok(values[0].clone()),
            LookupSpec::Composite(children) | LookupSpec::Array(children) => Ok(Key::Tuple(
                children.iter().map(LookupSpec::build_key).collect::<IndexResult<Vec<_>>>()?,
            )),
            other => Err(IndexError::NotSingular(format!("{:?}", other))),
        }
    }

    /// True if the key is selected by this lookup
    pub fn matches(&self, key: &Key) -> bool {
        match self {
            LookupSpec::Value(k) => k == key,
            LookupSpec::Range { min, max } => {
                if matches!(key, Key::Null | Key::Tuple(_)) {
                    return false;
                }
                let above = min
                    .as_ref()
                    .map(|m| matches!(key.compare_scalar(m), Some(Ordering::Greater | Ordering::Equal)))
                    .unwrap_or(true);
                let below = max
                    .as_ref()
                    .map(|m| matches!(key.compare_scalar(m), Some(Ordering::Less | Ordering::Equal)))
                    .unwrap_or(true);
                above && below
            }
            LookupSpec::Prefix {
                prefix,
                case_insensitive,
            } => match key {
                Key::String(s) if *case_insensitive => s.to_lowercase().starts_with(&prefix.to_lowercase()),
                Key::String(s) => s.starts_with(prefix.as_str()),
                _ => false,
            },
            LookupSpec::MultiValue(values) => values.contains(key),
            LookupSpec::Composite(children) | LookupSpec::Array(children) => match key {
                Key::Tuple(parts) if parts.len() == children.len() => {
                    children.iter().zip(parts).all(|(spec, part)| spec.matches(part))
                }
                _ => false,
            },
        }
    }

    /// Decomposes a multi-valued lookup into singular lookups whose results
    /// together equal the results of this one. A lookup that is not
    /// multi-valued decomposes into itself.
    pub fn alternatives(&self) -> Vec<LookupSpec> {
        if !self.multi_valued() {
            return vec![self.clone()];
        }
        match self {
            LookupSpec::MultiValue(values) => values.iter().cloned().map(LookupSpec::Value).collect(),
            LookupSpec::Composite(children) | LookupSpec::Array(children) => {
                let per_child: Vec<Vec<LookupSpec>> = children.iter().map(LookupSpec::alternatives).collect();
                let mut tuples = Tuples::new();
                for alts in &per_child {
                    tuples.add(alts.as_slice());
                }
                let composite = matches!(self, LookupSpec::Composite(_));
                tuples
                    .iter()
                    .map(|tuple| {
                        let parts: Vec<LookupSpec> = tuple.into_iter().cloned().collect();
                        if composite {
                            LookupSpec::Composite(parts)
                        } else {
                            LookupSpec::Array(parts)
                        }
                    })
                    .collect()
            }
            other => vec![other.clone()],
        }
    }
}
