use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::matching::Named;

/// Descriptor of a claim offered by a remote party: name, version, and the
/// identifier of the issuing origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDescriptor {
    pub name: String,
    pub version: String,
    pub origin: String,
}

impl fmt::Display for ClaimDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} (from {})", self.name, self.version, self.origin)
    }
}

/// A named set of attributes a remote party wants proven. The attribute map
/// carries an optional default per attribute; resolution to self-attested
/// or issuer-verified values happens in `claim::resolve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimProofRequest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Option<String>>,
}

impl Named for ClaimProofRequest {
    fn entity_name(&self) -> &str {
        &self.name
    }
}

/// Lifecycle states derived from a link's fields. `SyncFailed` is transient
/// and never stored; a failed sync leaves the link unsynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unsynced,
    Synced,
    Accepted,
}

/// An invitation record connecting the local identity to a remote party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_endpoint: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_synced: Option<OffsetDateTime>,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_claims: Vec<ClaimDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claim_requests: Vec<ClaimProofRequest>,
}

impl Link {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote_endpoint: None,
            last_synced: None,
            accepted: false,
            available_claims: Vec::new(),
            claim_requests: Vec::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        if self.accepted {
            LinkState::Accepted
        } else if self.remote_endpoint.is_some() {
            LinkState::Synced
        } else {
            LinkState::Unsynced
        }
    }

    pub fn has_endpoint(&self) -> bool {
        self.remote_endpoint.is_some()
    }

    pub fn claim_request(&self, name: &str) -> Option<&ClaimProofRequest> {
        self.claim_requests
            .iter()
            .find(|request| request.name.eq_ignore_ascii_case(name))
    }

    /// Multi-line summary used by `show link`.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("Link {}", self.name)];
        match &self.remote_endpoint {
            Some(endpoint) => lines.push(format!("    Target endpoint: {endpoint}")),
            None => lines.push("    Target endpoint: not yet synchronized".to_string()),
        }
        match self.last_synced {
            Some(at) => {
                let stamp = at
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| at.to_string());
                lines.push(format!("    Last synced: {stamp}"));
            }
            None => lines.push("    Last synced: never".to_string()),
        }
        let status = match self.state() {
            LinkState::Unsynced => "not synchronized",
            LinkState::Synced => "synchronized, invitation not accepted",
            LinkState::Accepted => "accepted",
        };
        lines.push(format!("    Status: {status}"));
        if !self.available_claims.is_empty() {
            lines.push("    Available claims:".to_string());
            for claim in &self.available_claims {
                lines.push(format!("        {claim}"));
            }
        }
        if !self.claim_requests.is_empty() {
            lines.push("    Claim requests:".to_string());
            for request in &self.claim_requests {
                lines.push(format!("        {} v{}", request.name, request.version));
            }
        }
        lines.join("\n")
    }
}

impl Named for Link {
    fn entity_name(&self) -> &str {
        &self.name
    }
}
