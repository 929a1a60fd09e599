//! The agent seam: asynchronous operations against the remote peer and the
//! ledger. `LocalAgent` is a file-backed implementation (directory service,
//! claim catalog, reply log under `home/network/`) that lets the binary and
//! the integration tests run without live networking.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::link::{ClaimDescriptor, ClaimProofRequest, Link};
use crate::matching::Named;
use crate::session::Session;
use crate::wallet::{read_json, sanitize_component, write_json};

pub const NETWORK_DIR: &str = "network";
pub const REPLIES_DIR: &str = "replies";
const DIRECTORY_FILE: &str = "directory.json";
const CLAIMS_FILE: &str = "claims.json";
const RECEIVED_FILE: &str = "received.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    NotConnected,
    Failure(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::NotConnected => write!(f, "not connected to any environment"),
            AgentError::Failure(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AgentError {}

/// Result of synchronizing a link against the ledger.
#[derive(Debug, Clone)]
pub struct SyncUpdate {
    pub endpoint: String,
    pub synced_at: OffsetDateTime,
}

/// What the peer announced while accepting the invitation.
#[derive(Debug, Clone, Default)]
pub struct AcceptOutcome {
    pub available_claims: Vec<ClaimDescriptor>,
    pub claim_requests: Vec<ClaimProofRequest>,
}

/// A claim held or offered by a remote link. Attribute values are absent
/// until the claim has actually been issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedClaim {
    pub link: String,
    pub claim: ClaimDescriptor,
    pub attributes: BTreeMap<String, Option<String>>,
}

impl ReceivedClaim {
    pub fn is_issued(&self) -> bool {
        !self.attributes.is_empty() && self.attributes.values().all(Option::is_some)
    }

    pub fn value_of(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|value| value.as_deref())
    }
}

impl Named for ReceivedClaim {
    fn entity_name(&self) -> &str {
        &self.claim.name
    }
}

#[allow(async_fn_in_trait)]
pub trait Agent {
    async fn synchronize(&self, link: &Link) -> Result<SyncUpdate, AgentError>;
    async fn accept_invitation(&self, link: &Link) -> Result<AcceptOutcome, AgentError>;
    async fn ping(&self, link: &Link) -> Result<String, AgentError>;
    /// Submit a claim request; the reply arrives asynchronously under the
    /// returned request key.
    async fn request_claim(
        &self,
        link: &Link,
        claim: &ClaimDescriptor,
    ) -> Result<String, AgentError>;
    /// Submit a claim proof; the reply arrives asynchronously under the
    /// returned request key.
    async fn send_proof(
        &self,
        link: &Link,
        request: &ClaimProofRequest,
    ) -> Result<String, AgentError>;
    async fn received_claims_by_name(
        &self,
        query: &str,
    ) -> Result<Vec<ReceivedClaim>, AgentError>;
    async fn received_claims_matching(
        &self,
        attribute_names: &[String],
    ) -> Result<Vec<ReceivedClaim>, AgentError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    endpoints: BTreeMap<String, String>,
}

/// One issuable claim in the network fixture's catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogEntry {
    link: String,
    claim: ClaimDescriptor,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

pub struct LocalAgent {
    network_dir: PathBuf,
    replies_dir: PathBuf,
    session: Session,
}

impl LocalAgent {
    pub fn open(home: &Path, session: Session) -> Result<Self> {
        let network_dir = home.join(NETWORK_DIR);
        let replies_dir = network_dir.join(REPLIES_DIR);
        fs::create_dir_all(&replies_dir)
            .with_context(|| format!("failed to create {}", replies_dir.display()))?;
        Ok(Self {
            network_dir,
            replies_dir,
            session,
        })
    }

    pub fn replies_dir(&self) -> &Path {
        &self.replies_dir
    }

    fn require_connection(&self) -> Result<(), AgentError> {
        if self.session.is_connected() {
            Ok(())
        } else {
            Err(AgentError::NotConnected)
        }
    }

    fn directory(&self) -> Result<DirectoryFile, AgentError> {
        self.read_or_default(DIRECTORY_FILE)
    }

    fn catalog(&self) -> Result<Vec<CatalogEntry>, AgentError> {
        self.read_or_default(CLAIMS_FILE)
    }

    fn received(&self) -> Result<Vec<ReceivedClaim>, AgentError> {
        self.read_or_default(RECEIVED_FILE)
    }

    fn read_or_default<T: Default + serde::de::DeserializeOwned>(
        &self,
        file: &str,
    ) -> Result<T, AgentError> {
        let path = self.network_dir.join(file);
        if !path.exists() {
            return Ok(T::default());
        }
        read_json(&path).map_err(|err| AgentError::Failure(err.to_string()))
    }

    fn store_received(&self, claims: &Vec<ReceivedClaim>) -> Result<(), AgentError> {
        write_json(&self.network_dir.join(RECEIVED_FILE), claims)
            .map_err(|err| AgentError::Failure(err.to_string()))
    }

    fn write_reply(&self, request_key: &str, body: serde_json::Value) -> Result<(), AgentError> {
        let path = self
            .replies_dir
            .join(format!("{}.json", sanitize_component(request_key)));
        write_json(&path, &body).map_err(|err| AgentError::Failure(err.to_string()))
    }

    fn new_request_key(prefix: &str, subject: &str) -> String {
        format!(
            "{}-{}-{:08x}",
            prefix,
            sanitize_component(subject),
            rand::random::<u32>()
        )
    }
}

impl Agent for LocalAgent {
    async fn synchronize(&self, link: &Link) -> Result<SyncUpdate, AgentError> {
        self.require_connection()?;
        let directory = self.directory()?;
        match directory.endpoints.get(&link.name) {
            Some(endpoint) => {
                debug!(link = %link.name, %endpoint, "resolved endpoint");
                Ok(SyncUpdate {
                    endpoint: endpoint.clone(),
                    synced_at: OffsetDateTime::now_utc(),
                })
            }
            None => Err(AgentError::Failure(format!(
                "no endpoint registered for link '{}'",
                link.name
            ))),
        }
    }

    // Acceptance and ping talk to the peer's endpoint directly, so neither
    // requires a ledger connection.
    async fn accept_invitation(&self, link: &Link) -> Result<AcceptOutcome, AgentError> {
        let catalog = self.catalog()?;
        let available_claims = catalog
            .iter()
            .filter(|entry| entry.link.eq_ignore_ascii_case(&link.name))
            .map(|entry| entry.claim.clone())
            .collect();
        Ok(AcceptOutcome {
            available_claims,
            claim_requests: Vec::new(),
        })
    }

    async fn ping(&self, link: &Link) -> Result<String, AgentError> {
        let directory = self.directory()?;
        match directory.endpoints.get(&link.name) {
            Some(endpoint) => Ok(endpoint.clone()),
            None => Err(AgentError::Failure(format!(
                "no route to link '{}'",
                link.name
            ))),
        }
    }

    async fn request_claim(
        &self,
        link: &Link,
        claim: &ClaimDescriptor,
    ) -> Result<String, AgentError> {
        self.require_connection()?;
        let request_key = Self::new_request_key("req-claim", &claim.name);
        let catalog = self.catalog()?;
        let entry = catalog.iter().find(|entry| {
            entry.link.eq_ignore_ascii_case(&link.name)
                && entry.claim.name.eq_ignore_ascii_case(&claim.name)
        });
        match entry {
            Some(entry) => {
                let issued = ReceivedClaim {
                    link: entry.link.clone(),
                    claim: entry.claim.clone(),
                    attributes: entry
                        .attributes
                        .iter()
                        .map(|(name, value)| (name.clone(), Some(value.clone())))
                        .collect(),
                };
                let mut received = self.received()?;
                received.retain(|existing| {
                    !(existing.link.eq_ignore_ascii_case(&issued.link)
                        && existing.claim.name.eq_ignore_ascii_case(&issued.claim.name))
                });
                received.push(issued.clone());
                self.store_received(&received)?;
                self.write_reply(
                    &request_key,
                    serde_json::json!({
                        "result": {
                            "claim": issued.claim.name,
                            "version": issued.claim.version,
                            "from": issued.link,
                            "attributes": issued.attributes,
                        }
                    }),
                )?;
            }
            None => {
                self.write_reply(
                    &request_key,
                    serde_json::json!({
                        "error": format!(
                            "claim '{}' not available from '{}'",
                            claim.name, link.name
                        )
                    }),
                )?;
            }
        }
        Ok(request_key)
    }

    async fn send_proof(
        &self,
        link: &Link,
        request: &ClaimProofRequest,
    ) -> Result<String, AgentError> {
        self.require_connection()?;
        let request_key = Self::new_request_key("send-proof", &request.name);
        self.write_reply(
            &request_key,
            serde_json::json!({
                "result": {
                    "status": "accepted",
                    "proof": request.name,
                    "to": link.name,
                }
            }),
        )?;
        Ok(request_key)
    }

    async fn received_claims_by_name(
        &self,
        query: &str,
    ) -> Result<Vec<ReceivedClaim>, AgentError> {
        let query = query.to_lowercase();
        let mut results: Vec<ReceivedClaim> = self
            .received()?
            .into_iter()
            .filter(|claim| claim.claim.name.to_lowercase().contains(&query))
            .collect();
        // Offers from the catalog that have not been issued yet show up
        // with their attribute names but no values.
        for entry in self.catalog()? {
            if !entry.claim.name.to_lowercase().contains(&query) {
                continue;
            }
            let already_issued = results.iter().any(|claim| {
                claim.link.eq_ignore_ascii_case(&entry.link)
                    && claim.claim.name.eq_ignore_ascii_case(&entry.claim.name)
            });
            if already_issued {
                continue;
            }
            results.push(ReceivedClaim {
                link: entry.link,
                claim: entry.claim,
                attributes: entry
                    .attributes
                    .keys()
                    .map(|name| (name.clone(), None))
                    .collect(),
            });
        }
        Ok(results)
    }

    async fn received_claims_matching(
        &self,
        attribute_names: &[String],
    ) -> Result<Vec<ReceivedClaim>, AgentError> {
        let results = self
            .received()?
            .into_iter()
            .filter(|claim| {
                attribute_names
                    .iter()
                    .any(|name| claim.attributes.contains_key(name))
            })
            .collect();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(temp: &tempfile::TempDir, connected: bool) -> LocalAgent {
        let session = Session::open(temp.path()).unwrap();
        if connected {
            session.connect("sandbox").unwrap();
        }
        let agent = LocalAgent::open(temp.path(), session).unwrap();
        write_json(
            &temp.path().join(NETWORK_DIR).join(DIRECTORY_FILE),
            &serde_json::json!({
                "endpoints": {"Faber College": "10.0.0.2:5555"}
            }),
        )
        .unwrap();
        write_json(
            &temp.path().join(NETWORK_DIR).join(CLAIMS_FILE),
            &serde_json::json!([{
                "link": "Faber College",
                "claim": {"name": "Transcript", "version": "1.2", "origin": "faber"},
                "attributes": {"degree": "Bachelor of Science", "status": "graduated"}
            }]),
        )
        .unwrap();
        agent
    }

    #[tokio::test]
    async fn synchronize_requires_connection() {
        let temp = tempfile::tempdir().unwrap();
        let agent = fixture(&temp, false);
        let err = agent
            .synchronize(&Link::new("Faber College"))
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::NotConnected);
    }

    #[tokio::test]
    async fn synchronize_resolves_registered_endpoint() {
        let temp = tempfile::tempdir().unwrap();
        let agent = fixture(&temp, true);
        let update = agent
            .synchronize(&Link::new("Faber College"))
            .await
            .unwrap();
        assert_eq!(update.endpoint, "10.0.0.2:5555");

        let err = agent
            .synchronize(&Link::new("Unknown"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Failure(_)));
    }

    #[tokio::test]
    async fn request_claim_issues_and_replies() {
        let temp = tempfile::tempdir().unwrap();
        let agent = fixture(&temp, true);
        let claim = ClaimDescriptor {
            name: "Transcript".to_string(),
            version: "1.2".to_string(),
            origin: "faber".to_string(),
        };
        let key = agent
            .request_claim(&Link::new("Faber College"), &claim)
            .await
            .unwrap();
        assert!(agent
            .replies_dir()
            .join(format!("{}.json", sanitize_component(&key)))
            .exists());

        let received = agent.received_claims_by_name("transcript").await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].is_issued());
        assert_eq!(received[0].value_of("degree"), Some("Bachelor of Science"));
    }

    #[tokio::test]
    async fn unissued_offers_surface_without_values() {
        let temp = tempfile::tempdir().unwrap();
        let agent = fixture(&temp, true);
        let received = agent.received_claims_by_name("transcript").await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(!received[0].is_issued());
        assert_eq!(received[0].value_of("degree"), None);
    }

    #[tokio::test]
    async fn matching_by_attribute_names_only_returns_issued() {
        let temp = tempfile::tempdir().unwrap();
        let agent = fixture(&temp, true);
        let names = vec!["degree".to_string()];
        assert!(agent
            .received_claims_matching(&names)
            .await
            .unwrap()
            .is_empty());

        let claim = ClaimDescriptor {
            name: "Transcript".to_string(),
            version: "1.2".to_string(),
            origin: "faber".to_string(),
        };
        agent
            .request_claim(&Link::new("Faber College"), &claim)
            .await
            .unwrap();
        let matched = agent.received_claims_matching(&names).await.unwrap();
        assert_eq!(matched.len(), 1);
    }
}
