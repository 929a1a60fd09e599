//! File-backed keyrings: invitation links and identifying keys, persisted
//! as one JSON document per keyring under `home/keyrings/`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::link::{ClaimDescriptor, ClaimProofRequest, Link};
use crate::matching::{MatchResult, Named};

const KEYRINGS_DIR: &str = "keyrings";
pub const DEFAULT_KEYRING: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyingKey {
    pub verkey: String,
    pub secret: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct Keyring {
    name: String,
    #[serde(default)]
    keys: Vec<IdentifyingKey>,
    #[serde(default)]
    links: Vec<Link>,
}

/// A link paired with one of its claim proof requests; matched by the
/// request name.
#[derive(Debug, Clone)]
pub struct LinkClaimRequest {
    pub link: Link,
    pub request: ClaimProofRequest,
}

impl Named for LinkClaimRequest {
    fn entity_name(&self) -> &str {
        &self.request.name
    }
}

/// A link paired with one of the claims it offers; matched by the claim
/// name.
#[derive(Debug, Clone)]
pub struct LinkClaim {
    pub link: Link,
    pub claim: ClaimDescriptor,
}

impl Named for LinkClaim {
    fn entity_name(&self) -> &str {
        &self.claim.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddLink {
    Added,
    AlreadyExists,
}

/// Failures while parsing an invitation file, reported individually so the
/// shell can suggest the right follow-up.
#[derive(Debug)]
pub enum InvitationError {
    Missing(PathBuf),
    Malformed(String),
    NoInvitation,
}

impl fmt::Display for InvitationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvitationError::Missing(path) => {
                write!(f, "invitation file {} does not exist", path.display())
            }
            InvitationError::Malformed(err) => write!(f, "invitation file is not valid json: {err}"),
            InvitationError::NoInvitation => write!(f, "no link invitation found in the given file"),
        }
    }
}

impl std::error::Error for InvitationError {}

#[derive(Debug, Deserialize)]
struct InvitationFile {
    invitation: Option<InvitationBody>,
    #[serde(default, rename = "available-claims")]
    available_claims: Vec<ClaimDescriptor>,
    #[serde(default, rename = "claim-requests")]
    claim_requests: Vec<ClaimProofRequest>,
}

#[derive(Debug, Deserialize)]
struct InvitationBody {
    name: String,
    #[serde(default)]
    endpoint: Option<String>,
}

/// Parse an invitation file into an unsynced link. An endpoint in the file
/// is kept so the invitation can be accepted later even while offline.
pub fn parse_invitation_file(path: &Path) -> Result<Link, InvitationError> {
    if !path.is_file() {
        return Err(InvitationError::Missing(path.to_path_buf()));
    }
    let data = fs::read(path).map_err(|err| InvitationError::Malformed(err.to_string()))?;
    let file: InvitationFile =
        serde_json::from_slice(&data).map_err(|err| InvitationError::Malformed(err.to_string()))?;
    let body = file.invitation.ok_or(InvitationError::NoInvitation)?;
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(InvitationError::NoInvitation);
    }
    let mut link = Link::new(name);
    link.remote_endpoint = body.endpoint;
    link.available_claims = file.available_claims;
    link.claim_requests = file.claim_requests;
    Ok(link)
}

pub struct Wallet {
    keyrings_dir: PathBuf,
    keyrings: BTreeMap<String, Keyring>,
}

impl Wallet {
    /// Load every keyring under the home directory, creating the default
    /// keyring when none exists yet.
    pub fn open(home: &Path) -> Result<Self> {
        let keyrings_dir = home.join(KEYRINGS_DIR);
        if !keyrings_dir.exists() {
            fs::create_dir_all(&keyrings_dir)
                .with_context(|| format!("failed to create {}", keyrings_dir.display()))?;
        }
        let mut keyrings = BTreeMap::new();
        for entry in fs::read_dir(&keyrings_dir)
            .with_context(|| format!("failed to read {}", keyrings_dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let keyring: Keyring = read_json(&path)?;
            keyrings.insert(keyring.name.clone(), keyring);
        }
        let mut wallet = Self {
            keyrings_dir,
            keyrings,
        };
        if wallet.keyrings.is_empty() {
            wallet.keyrings.insert(
                DEFAULT_KEYRING.to_string(),
                Keyring {
                    name: DEFAULT_KEYRING.to_string(),
                    keys: Vec::new(),
                    links: Vec::new(),
                },
            );
            wallet.persist(DEFAULT_KEYRING)?;
        }
        Ok(wallet)
    }

    pub fn keyring_names(&self) -> impl Iterator<Item = &str> {
        self.keyrings.keys().map(String::as_str)
    }

    /// Substring search over link names, scoped per keyring.
    pub fn search_links(&self, query: &str) -> MatchResult<Link> {
        let groups = self.keyrings.iter().map(|(name, keyring)| {
            let matches = keyring
                .links
                .iter()
                .filter(|link| contains_ci(&link.name, query))
                .cloned()
                .collect();
            (name.clone(), matches)
        });
        MatchResult::classify(query, groups.collect::<Vec<_>>())
    }

    /// Substring search over claim proof request names, optionally filtered
    /// to a single link.
    pub fn search_claim_requests(
        &self,
        query: &str,
        link_filter: Option<&str>,
    ) -> MatchResult<LinkClaimRequest> {
        let groups = self.keyrings.iter().map(|(name, keyring)| {
            let mut matches = Vec::new();
            for link in &keyring.links {
                if let Some(filter) = link_filter {
                    if !link.name.eq_ignore_ascii_case(filter) {
                        continue;
                    }
                }
                for request in &link.claim_requests {
                    if contains_ci(&request.name, query) {
                        matches.push(LinkClaimRequest {
                            link: link.clone(),
                            request: request.clone(),
                        });
                    }
                }
            }
            (name.clone(), matches)
        });
        MatchResult::classify(query, groups.collect::<Vec<_>>())
    }

    /// Substring search over claims offered by accepted or synced links.
    pub fn search_available_claims(&self, query: &str) -> MatchResult<LinkClaim> {
        let groups = self.keyrings.iter().map(|(name, keyring)| {
            let mut matches = Vec::new();
            for link in &keyring.links {
                for claim in &link.available_claims {
                    if contains_ci(&claim.name, query) {
                        matches.push(LinkClaim {
                            link: link.clone(),
                            claim: claim.clone(),
                        });
                    }
                }
            }
            (name.clone(), matches)
        });
        MatchResult::classify(query, groups.collect::<Vec<_>>())
    }

    pub fn has_identifying_key(&self) -> bool {
        self.keyrings.values().any(|keyring| !keyring.keys.is_empty())
    }

    /// Create an Ed25519 identifying key in the default keyring and return
    /// its verification key.
    pub fn create_identifying_key(&mut self) -> Result<String> {
        let signing = SigningKey::generate(&mut OsRng);
        let verkey = STANDARD.encode(signing.verifying_key().to_bytes());
        let key = IdentifyingKey {
            verkey: verkey.clone(),
            secret: STANDARD.encode(signing.to_bytes()),
            created_at: OffsetDateTime::now_utc(),
        };
        let keyring = self.default_keyring_mut()?;
        keyring.keys.push(key);
        self.persist(DEFAULT_KEYRING)?;
        Ok(verkey)
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.keyrings
            .values()
            .flat_map(|keyring| keyring.links.iter())
            .find(|link| link.name.eq_ignore_ascii_case(name))
    }

    /// Store a freshly loaded invitation link in the default keyring. A
    /// link with the same name (case-insensitive) anywhere in the wallet is
    /// rejected without mutation.
    pub fn add_link(&mut self, link: Link) -> Result<AddLink> {
        if self.link(&link.name).is_some() {
            return Ok(AddLink::AlreadyExists);
        }
        let keyring = self.default_keyring_mut()?;
        keyring.links.push(link);
        self.persist(DEFAULT_KEYRING)?;
        Ok(AddLink::Added)
    }

    /// Install the endpoint and timestamp obtained from synchronization.
    pub fn mark_synced(
        &mut self,
        name: &str,
        endpoint: &str,
        at: OffsetDateTime,
    ) -> Result<Link> {
        self.update_link(name, |link| {
            link.remote_endpoint = Some(endpoint.to_string());
            link.last_synced = Some(at);
        })
    }

    /// Mark a link accepted, merging the claims and proof requests the peer
    /// announced during acceptance. Existing entries are kept when the peer
    /// announced nothing.
    pub fn mark_accepted(
        &mut self,
        name: &str,
        available_claims: Vec<ClaimDescriptor>,
        claim_requests: Vec<ClaimProofRequest>,
    ) -> Result<Link> {
        self.update_link(name, |link| {
            link.accepted = true;
            for claim in available_claims {
                if !link.available_claims.contains(&claim) {
                    link.available_claims.push(claim);
                }
            }
            for request in claim_requests {
                if link.claim_request(&request.name).is_none() {
                    link.claim_requests.push(request);
                }
            }
        })
    }

    fn update_link(&mut self, name: &str, apply: impl FnOnce(&mut Link)) -> Result<Link> {
        let keyring_name = self
            .keyrings
            .iter()
            .find(|(_, keyring)| {
                keyring
                    .links
                    .iter()
                    .any(|link| link.name.eq_ignore_ascii_case(name))
            })
            .map(|(keyring_name, _)| keyring_name.clone())
            .ok_or_else(|| anyhow!("no link named '{}' in any keyring", name))?;
        let keyring = self
            .keyrings
            .get_mut(&keyring_name)
            .expect("keyring present");
        let link = keyring
            .links
            .iter_mut()
            .find(|link| link.name.eq_ignore_ascii_case(name))
            .expect("link present");
        apply(link);
        let updated = link.clone();
        self.persist(&keyring_name)?;
        Ok(updated)
    }

    fn default_keyring_mut(&mut self) -> Result<&mut Keyring> {
        self.keyrings
            .get_mut(DEFAULT_KEYRING)
            .ok_or_else(|| anyhow!("default keyring missing"))
    }

    fn persist(&self, keyring_name: &str) -> Result<()> {
        let keyring = self
            .keyrings
            .get(keyring_name)
            .ok_or_else(|| anyhow!("unknown keyring '{}'", keyring_name))?;
        let path = self
            .keyrings_dir
            .join(format!("{}.json", sanitize_component(keyring_name)));
        write_json(&path, keyring)
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub(crate) fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value = serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(value)
}

pub(crate) fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
}
