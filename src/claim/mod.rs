//! Claim proof request materialization: merge issuer-verified values,
//! self-attested values, and request defaults into a resolved request.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::agent::{Agent, AgentError, ReceivedClaim};
use crate::link::ClaimProofRequest;

/// Where a resolved attribute value came from. Precedence is verified,
/// then self-attested, then the request's own default. The verifiable
/// marking is presentation only; the guarantee itself belongs to the
/// credential layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum ResolvedValue {
    Verified { value: String, claim: String, link: String },
    SelfAttested(String),
    Default(String),
    Missing,
}

impl ResolvedValue {
    fn render(&self) -> String {
        match self {
            ResolvedValue::Verified { value, .. } => format!("{value} (verifiable)"),
            ResolvedValue::SelfAttested(value) => format!("{value} (self-attested)"),
            ResolvedValue::Default(value) => value.clone(),
            ResolvedValue::Missing => "<required>".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResolvedProofRequest {
    pub name: String,
    pub version: String,
    pub attributes: BTreeMap<String, ResolvedValue>,
    /// Issued claims that contributed to or matched the request.
    pub supporting: Vec<ReceivedClaim>,
}

impl ResolvedProofRequest {
    /// Multi-line rendering used by `show claim request`.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("Claim proof request {} v{}", self.name, self.version)];
        lines.push("Attributes:".to_string());
        for (name, value) in &self.attributes {
            lines.push(format!("    {}: {}", name, value.render()));
        }
        for claim in &self.supporting {
            lines.push(format!(
                "\n    Claim proof ({} v{} from {})",
                claim.claim.name, claim.claim.version, claim.link
            ));
            for (name, value) in &claim.attributes {
                if let Some(value) = value {
                    lines.push(format!("        {name}: {value} (verifiable)"));
                }
            }
        }
        lines.join("\n")
    }
}

/// Resolve each requested attribute, consulting in order: an
/// issuer-verified value from a matching received claim, the accumulated
/// self-attested value, then the request's default.
pub async fn resolve<A: Agent>(
    agent: &A,
    request: &ClaimProofRequest,
    self_attested: &BTreeMap<String, String>,
) -> Result<ResolvedProofRequest, AgentError> {
    let attribute_names: Vec<String> = request.attributes.keys().cloned().collect();
    let received = agent.received_claims_matching(&attribute_names).await?;

    let mut attributes = BTreeMap::new();
    for (name, default) in &request.attributes {
        let verified = received.iter().find_map(|claim| {
            claim.value_of(name).map(|value| ResolvedValue::Verified {
                value: value.to_string(),
                claim: claim.claim.name.clone(),
                link: claim.link.clone(),
            })
        });
        let resolved = verified
            .or_else(|| {
                self_attested
                    .get(name)
                    .map(|value| ResolvedValue::SelfAttested(value.clone()))
            })
            .or_else(|| default.clone().map(ResolvedValue::Default))
            .unwrap_or(ResolvedValue::Missing);
        attributes.insert(name.clone(), resolved);
    }

    Ok(ResolvedProofRequest {
        name: request.name.clone(),
        version: request.version.clone(),
        attributes,
        supporting: received,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AcceptOutcome, SyncUpdate};
    use crate::link::{ClaimDescriptor, Link};

    /// Agent stub that serves a fixed set of received claims.
    struct StubAgent {
        received: Vec<ReceivedClaim>,
    }

    impl Agent for StubAgent {
        async fn synchronize(&self, _link: &Link) -> Result<SyncUpdate, AgentError> {
            unreachable!("not used by resolution")
        }
        async fn accept_invitation(&self, _link: &Link) -> Result<AcceptOutcome, AgentError> {
            unreachable!("not used by resolution")
        }
        async fn ping(&self, _link: &Link) -> Result<String, AgentError> {
            unreachable!("not used by resolution")
        }
        async fn request_claim(
            &self,
            _link: &Link,
            _claim: &ClaimDescriptor,
        ) -> Result<String, AgentError> {
            unreachable!("not used by resolution")
        }
        async fn send_proof(
            &self,
            _link: &Link,
            _request: &ClaimProofRequest,
        ) -> Result<String, AgentError> {
            unreachable!("not used by resolution")
        }
        async fn received_claims_by_name(
            &self,
            _query: &str,
        ) -> Result<Vec<ReceivedClaim>, AgentError> {
            Ok(self.received.clone())
        }
        async fn received_claims_matching(
            &self,
            attribute_names: &[String],
        ) -> Result<Vec<ReceivedClaim>, AgentError> {
            Ok(self
                .received
                .iter()
                .filter(|claim| {
                    attribute_names
                        .iter()
                        .any(|name| claim.attributes.contains_key(name))
                })
                .cloned()
                .collect())
        }
    }

    fn job_application() -> ClaimProofRequest {
        ClaimProofRequest {
            name: "Job-Application".to_string(),
            version: "0.2".to_string(),
            attributes: BTreeMap::from([
                ("age".to_string(), None),
                ("degree".to_string(), None),
                ("status".to_string(), Some("unemployed".to_string())),
            ]),
        }
    }

    fn transcript() -> ReceivedClaim {
        ReceivedClaim {
            link: "Faber College".to_string(),
            claim: ClaimDescriptor {
                name: "Transcript".to_string(),
                version: "1.2".to_string(),
                origin: "faber".to_string(),
            },
            attributes: BTreeMap::from([(
                "degree".to_string(),
                Some("Bachelor of Science".to_string()),
            )]),
        }
    }

    #[tokio::test]
    async fn self_attested_fills_unissued_attribute() {
        let agent = StubAgent { received: vec![] };
        let attested = BTreeMap::from([("age".to_string(), "33".to_string())]);
        let resolved = resolve(&agent, &job_application(), &attested).await.unwrap();
        assert_eq!(
            resolved.attributes["age"],
            ResolvedValue::SelfAttested("33".to_string())
        );
        assert_eq!(resolved.attributes["degree"], ResolvedValue::Missing);
        assert_eq!(
            resolved.attributes["status"],
            ResolvedValue::Default("unemployed".to_string())
        );
    }

    #[tokio::test]
    async fn verified_value_beats_self_attested_and_default() {
        let agent = StubAgent {
            received: vec![transcript()],
        };
        let attested = BTreeMap::from([("degree".to_string(), "None of your business".to_string())]);
        let resolved = resolve(&agent, &job_application(), &attested).await.unwrap();
        assert_eq!(
            resolved.attributes["degree"],
            ResolvedValue::Verified {
                value: "Bachelor of Science".to_string(),
                claim: "Transcript".to_string(),
                link: "Faber College".to_string(),
            }
        );
        assert_eq!(resolved.supporting.len(), 1);
    }

    #[tokio::test]
    async fn rendering_marks_value_provenance() {
        let agent = StubAgent {
            received: vec![transcript()],
        };
        let attested = BTreeMap::from([("age".to_string(), "33".to_string())]);
        let resolved = resolve(&agent, &job_application(), &attested).await.unwrap();
        let rendered = resolved.render();
        assert!(rendered.contains("age: 33 (self-attested)"));
        assert!(rendered.contains("degree: Bachelor of Science (verifiable)"));
        assert!(rendered.contains("status: unemployed"));
        assert!(rendered.contains("Claim proof (Transcript v1.2 from Faber College)"));
    }
}
