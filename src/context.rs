//! Session-scoped claim context: which claim request the user is working
//! on, and the self-attested attribute values accumulated for it.
//!
//! Context identity is the immutable pair of names `(link, request)`.
//! Re-entering the same pair keeps accumulated attributes; entering a
//! different pair starts fresh.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::wallet::{read_json, write_json};

const CONTEXT_FILE: &str = "context.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextKey {
    pub link: String,
    pub request: String,
}

impl ContextKey {
    pub fn new(link: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            request: request.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextTransition {
    /// A different pair was entered; attributes start empty.
    Entered,
    /// The same pair was re-shown; accumulated attributes are preserved.
    Retained,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClaimContext {
    current: Option<Current>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Current {
    key: ContextKey,
    attributes: BTreeMap<String, String>,
}

impl ClaimContext {
    /// Load the persisted context from the home directory, or start empty.
    /// Persistence is what lets the context survive across one-shot command
    /// invocations.
    pub fn load(home: &Path) -> Result<Self> {
        let path = home.join(CONTEXT_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        read_json(&path)
    }

    pub fn store(&self, home: &Path) -> Result<()> {
        write_json(&home.join(CONTEXT_FILE), self)
    }

    pub fn enter(&mut self, link: &str, request: &str) -> ContextTransition {
        let key = ContextKey::new(link, request);
        match &self.current {
            Some(current) if current.key == key => ContextTransition::Retained,
            _ => {
                self.current = Some(Current {
                    key,
                    attributes: BTreeMap::new(),
                });
                ContextTransition::Entered
            }
        }
    }

    /// Store a self-attested value, overwriting any prior value for that
    /// name. Returns false when no claim request is in context.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> bool {
        match &mut self.current {
            Some(current) => {
                current
                    .attributes
                    .insert(name.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<&ContextKey> {
        self.current.as_ref().map(|current| &current.key)
    }

    pub fn self_attested(&self) -> BTreeMap<String, String> {
        self.current
            .as_ref()
            .map(|current| current.attributes.clone())
            .unwrap_or_default()
    }

    /// Attributes for the given pair, or empty when a different claim
    /// request is in context.
    pub fn self_attested_for(&self, link: &str, request: &str) -> BTreeMap<String, String> {
        match &self.current {
            Some(current) if current.key == ContextKey::new(link, request) => {
                current.attributes.clone()
            }
            _ => BTreeMap::new(),
        }
    }
}
