//! Command entry points. Each user command resolves its target through the
//! matcher, performs its lifecycle work through the agent, and reports the
//! outcome as rendered notices. Lookup and synchronization failures are
//! handled here, never propagated to the command dispatcher as faults.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::debug;

use crate::agent::{Agent, AgentError};
use crate::claim;
use crate::client::{Client, Reply};
use crate::context::ClaimContext;
use crate::correlate::{CorrelationError, Correlator, CorrelatorConfig};
use crate::link::Link;
use crate::matching::{MatchResult, Selection};
use crate::output::CommandOutput;
use crate::session::{ConnectOutcome, Session, ENVIRONMENTS};
use crate::wallet::{parse_invitation_file, AddLink, InvitationError, Wallet};

const NOT_CONNECTED: &str = "Not connected to any environment. Please connect first.";
const CANNOT_SYNC: &str = "Cannot sync because not connected. Please connect first.";

fn suggest(lines: &mut Vec<String>, commands: &[String]) {
    lines.push(String::new());
    lines.push("Next commands to try:".to_string());
    for command in commands {
        lines.push(format!("    {command}"));
    }
}

fn usage(lines: &mut Vec<String>, commands: &[String]) {
    lines.push(String::new());
    lines.push("Usage:".to_string());
    for command in commands {
        lines.push(format!("    {command}"));
    }
}

fn connect_usage() -> String {
    format!("connect <{}>", ENVIRONMENTS.join("|"))
}

fn load_usage(path: Option<&str>) -> String {
    format!("load {}", path.unwrap_or("<invitation-file>"))
}

fn show_file_usage(path: Option<&str>) -> String {
    format!("show-file {}", path.unwrap_or("<invitation-file>"))
}

fn show_link_usage(name: Option<&str>) -> String {
    format!("link show \"{}\"", name.unwrap_or("<link-name>"))
}

fn sync_usage(name: Option<&str>) -> String {
    format!("link sync \"{}\"", name.unwrap_or("<link-name>"))
}

fn accept_usage(name: Option<&str>) -> String {
    format!("link accept \"{}\"", name.unwrap_or("<link-name>"))
}

fn show_claim_usage(name: Option<&str>) -> String {
    format!("claim show \"{}\"", name.unwrap_or("<claim-name>"))
}

fn request_claim_usage(name: Option<&str>) -> String {
    format!("claim request \"{}\"", name.unwrap_or("<claim-name>"))
}

fn show_claim_request_usage(name: Option<&str>) -> String {
    format!("claim show-request \"{}\"", name.unwrap_or("<claim-request-name>"))
}

fn set_attr_usage() -> String {
    "claim set <attr-name> <attr-value>".to_string()
}

fn send_claim_usage(request: Option<&str>, link: Option<&str>) -> String {
    format!(
        "claim send \"{}\" --to \"{}\"",
        request.unwrap_or("<claim-request-name>"),
        link.unwrap_or("<link-name>")
    )
}

fn print_not_connected(lines: &mut Vec<String>) {
    lines.push(NOT_CONNECTED.to_string());
    usage(lines, &[connect_usage()]);
}

fn print_cannot_sync(lines: &mut Vec<String>) {
    lines.push(CANNOT_SYNC.to_string());
    usage(lines, &[connect_usage()]);
}

pub struct Shell<A, C> {
    wallet: Wallet,
    agent: A,
    client: Arc<C>,
    correlator: Correlator<C>,
    session: Session,
    context: ClaimContext,
}

impl<A: Agent, C: Client + 'static> Shell<A, C> {
    pub fn new(wallet: Wallet, agent: A, client: Arc<C>, session: Session) -> Self {
        let correlator = Correlator::new(client.clone());
        Self {
            wallet,
            agent,
            client,
            correlator,
            session,
            context: ClaimContext::default(),
        }
    }

    pub fn with_correlator_config(mut self, config: CorrelatorConfig) -> Self {
        self.correlator = Correlator::with_config(self.client.clone(), config);
        self
    }

    /// Start from a previously persisted claim context.
    pub fn with_context(mut self, context: ClaimContext) -> Self {
        self.context = context;
        self
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn context(&self) -> &ClaimContext {
        &self.context
    }

    fn is_connected(&self) -> bool {
        self.session.is_connected() && self.client.has_sufficient_connections()
    }

    // ---- session -------------------------------------------------------

    pub fn connect(&self, env: &str) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let outcome = self.session.connect(env)?;
        match &outcome {
            ConnectOutcome::Connected(env) => lines.push(format!("Connected to {env}")),
            ConnectOutcome::AlreadyConnected(env) => {
                lines.push(format!("Already connected to {env}"))
            }
            ConnectOutcome::UnknownEnvironment(env) => {
                lines.push(format!("Unknown environment {env}"));
                usage(&mut lines, &[connect_usage()]);
            }
        }
        let connected = !matches!(outcome, ConnectOutcome::UnknownEnvironment(_));
        Ok(CommandOutput::from_lines(
            lines,
            json!({"command": "connect", "environment": env, "connected": connected}),
        ))
    }

    pub fn disconnect(&self) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let previous = self.session.disconnect()?;
        match &previous {
            Some(env) => lines.push(format!("Disconnected from {env}")),
            None => lines.push("Not connected to any environment.".to_string()),
        }
        Ok(CommandOutput::from_lines(
            lines,
            json!({"command": "disconnect", "was_connected_to": previous}),
        ))
    }

    pub fn status(&self) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let env = self.session.connected_env()?;
        match &env {
            Some(env) if self.client.has_sufficient_connections() => {
                lines.push(format!("Connected to {env}"))
            }
            Some(env) => lines.push(format!("Attempting connection to {env}")),
            None => print_not_connected(&mut lines),
        }
        Ok(CommandOutput::from_lines(
            lines,
            json!({"command": "status", "environment": env}),
        ))
    }

    pub fn new_key(&mut self) -> Result<CommandOutput> {
        let verkey = self.wallet.create_identifying_key()?;
        Ok(CommandOutput::new(
            format!("Created identifying key {verkey} in default keyring"),
            json!({"command": "new-key", "verkey": verkey}),
        ))
    }

    // ---- invitation files ----------------------------------------------

    pub fn load_invitation(&mut self, path: &Path) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let mut loaded = false;
        match parse_invitation_file(path) {
            Ok(link) => {
                let name = link.name.clone();
                match self.wallet.add_link(link)? {
                    AddLink::Added => {
                        loaded = true;
                        lines.push(format!("Link invitation for \"{name}\" loaded"));
                        suggest(
                            &mut lines,
                            &[show_link_usage(Some(&name)), accept_usage(Some(&name))],
                        );
                    }
                    AddLink::AlreadyExists => {
                        lines.push("Link already exists".to_string());
                    }
                }
            }
            Err(InvitationError::Missing(_)) => {
                lines.push("Given file does not exist".to_string());
                usage(&mut lines, &[show_file_usage(None), load_usage(None)]);
            }
            Err(InvitationError::Malformed(_)) => {
                lines.push("Input is not a valid json, please check and try again".to_string());
            }
            Err(InvitationError::NoInvitation) => {
                lines.push("No link invitation found in the given file".to_string());
            }
        }
        Ok(CommandOutput::from_lines(
            lines,
            json!({"command": "load", "file": path.display().to_string(), "loaded": loaded}),
        ))
    }

    pub fn show_file(&self, path: &Path) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let mut shown = false;
        if path.is_file() {
            match fs::read_to_string(path) {
                Ok(contents) => {
                    shown = true;
                    lines.push(contents.trim_end().to_string());
                    suggest(&mut lines, &[load_usage(Some(&path.display().to_string()))]);
                }
                Err(err) => lines.push(format!("Could not read file: {err}")),
            }
        } else {
            lines.push("Given file does not exist".to_string());
            usage(&mut lines, &[show_file_usage(None)]);
        }
        Ok(CommandOutput::from_lines(
            lines,
            json!({"command": "show-file", "file": path.display().to_string(), "shown": shown}),
        ))
    }

    // ---- link lifecycle ------------------------------------------------

    /// Disambiguate a link name, rendering the not-found or ambiguous
    /// notices. Every link-targeted command funnels through here.
    fn resolve_link(&self, name: &str, lines: &mut Vec<String>) -> Option<Link> {
        match self.wallet.search_links(name).into_selection(name) {
            Selection::None => {
                lines.push("No matching link invitation(s) found in current keyring".to_string());
                suggest(lines, &[show_file_usage(None), load_usage(None)]);
                None
            }
            Selection::Many(candidates) => {
                lines.push(format!("More than one link matches \"{name}\""));
                for candidate in &candidates {
                    lines.push(format!(
                        "    {} ({})",
                        candidate.entity.name, candidate.keyring
                    ));
                }
                lines.push(String::new());
                lines.push(
                    "Re-enter the command with a more specific link invitation name".to_string(),
                );
                None
            }
            Selection::One {
                entity,
                expanded_from,
            } => {
                if let Some(query) = expanded_from {
                    lines.push(format!("Expanding {} to \"{}\"", query, entity.name));
                }
                Some(entity)
            }
        }
    }

    pub async fn sync_link(&mut self, name: &str) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let Some(link) = self.resolve_link(name, &mut lines) else {
            return Ok(CommandOutput::from_lines(
                lines,
                json!({"command": "link.sync", "query": name, "synced": false}),
            ));
        };
        let synced = self.sync_resolved(&link, &mut lines).await?;
        if let Some(updated) = &synced {
            suggest(
                &mut lines,
                &[
                    show_link_usage(Some(&updated.name)),
                    accept_usage(Some(&updated.name)),
                ],
            );
        }
        let payload = json!({
            "command": "link.sync",
            "query": name,
            "synced": synced.is_some(),
            "link": synced.as_ref().map(serde_json::to_value).transpose()?,
        });
        Ok(CommandOutput::from_lines(lines, payload))
    }

    /// Shared synchronize step: ensure an identifying key exists, require a
    /// connection, then install the resolved endpoint. A failure leaves the
    /// link unchanged.
    async fn sync_resolved(&mut self, link: &Link, lines: &mut Vec<String>) -> Result<Option<Link>> {
        if !self.wallet.has_identifying_key() {
            lines.push(
                "No identifying key in keyring for making ledger requests, so adding one"
                    .to_string(),
            );
            let verkey = self.wallet.create_identifying_key()?;
            debug!(%verkey, "created identifying key");
        }
        if !self.is_connected() {
            print_cannot_sync(lines);
            return Ok(None);
        }
        lines.push("Synchronizing...".to_string());
        match self.agent.synchronize(link).await {
            Ok(update) => {
                let updated =
                    self.wallet
                        .mark_synced(&link.name, &update.endpoint, update.synced_at)?;
                debug!(link = %updated.name, endpoint = %update.endpoint, "link synchronized");
                lines.push(format!("Link {} synchronized", updated.name));
                Ok(Some(updated))
            }
            Err(AgentError::NotConnected) => {
                print_cannot_sync(lines);
                Ok(None)
            }
            Err(err) => {
                lines.push(format!("    {err}"));
                lines.push(format!(
                    "Link {} remains unsynchronized; retry the sync explicitly",
                    link.name
                ));
                Ok(None)
            }
        }
    }

    pub async fn accept_invitation(&mut self, name: &str) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let Some(link) = self.resolve_link(name, &mut lines) else {
            return Ok(CommandOutput::from_lines(
                lines,
                json!({"command": "link.accept", "query": name, "accepted": false}),
            ));
        };
        if link.accepted {
            lines.push(format!("Link {} is already accepted", link.name));
            return Ok(CommandOutput::from_lines(
                lines,
                json!({
                    "command": "link.accept",
                    "query": name,
                    "accepted": true,
                    "already_accepted": true,
                }),
            ));
        }
        lines.push("Invitation not yet verified.".to_string());
        if link.last_synced.is_none() {
            lines.push("Link not yet synchronized.".to_string());
        }
        let accepted = if self.is_connected() {
            lines.push("Attempting to sync...".to_string());
            match self.sync_resolved(&link, &mut lines).await? {
                Some(synced) if synced.has_endpoint() => {
                    self.accept_synced(&synced, &mut lines).await?
                }
                Some(synced) => {
                    lines.push(format!(
                        "Remote endpoint not found, cannot connect to {}",
                        synced.name
                    ));
                    None
                }
                None => None,
            }
        } else if link.has_endpoint() {
            // Offline, but the invitation already carried an endpoint;
            // acceptance proceeds without sync.
            self.accept_synced(&link, &mut lines).await?
        } else {
            lines.push("Invitation acceptance aborted.".to_string());
            print_cannot_sync(&mut lines);
            None
        };
        let payload = json!({
            "command": "link.accept",
            "query": name,
            "accepted": accepted.is_some(),
            "link": accepted.as_ref().map(serde_json::to_value).transpose()?,
        });
        Ok(CommandOutput::from_lines(lines, payload))
    }

    async fn accept_synced(&mut self, link: &Link, lines: &mut Vec<String>) -> Result<Option<Link>> {
        match self.agent.accept_invitation(link).await {
            Ok(outcome) => {
                let updated = self.wallet.mark_accepted(
                    &link.name,
                    outcome.available_claims,
                    outcome.claim_requests,
                )?;
                lines.push(format!("Invitation from {} accepted", updated.name));
                self.post_accept_suggestions(&updated, lines);
                Ok(Some(updated))
            }
            Err(AgentError::NotConnected) => {
                lines.push("Invitation acceptance aborted.".to_string());
                print_not_connected(lines);
                Ok(None)
            }
            Err(err) => {
                lines.push(format!("    {err}"));
                Ok(None)
            }
        }
    }

    fn post_accept_suggestions(&self, link: &Link, lines: &mut Vec<String>) {
        if !link.available_claims.is_empty() {
            let names = link
                .available_claims
                .iter()
                .map(|claim| claim.name.clone())
                .collect::<Vec<_>>()
                .join("|");
            suggest(
                lines,
                &[
                    show_claim_usage(Some(&names)),
                    request_claim_usage(Some(&names)),
                ],
            );
        } else if !link.claim_requests.is_empty() {
            suggest(lines, &[show_claim_request_usage(None)]);
        }
    }

    pub fn show_link(&self, name: &str) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let Some(link) = self.resolve_link(name, &mut lines) else {
            return Ok(CommandOutput::from_lines(
                lines,
                json!({"command": "link.show", "query": name}),
            ));
        };
        lines.push(link.render());
        if link.accepted {
            self.post_accept_suggestions(&link, &mut lines);
        } else {
            suggest(
                &mut lines,
                &[sync_usage(Some(&link.name)), accept_usage(Some(&link.name))],
            );
        }
        let payload = json!({
            "command": "link.show",
            "query": name,
            "link": serde_json::to_value(&link)?,
        });
        Ok(CommandOutput::from_lines(lines, payload))
    }

    pub async fn ping(&mut self, name: &str) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let mut reached = false;
        if let Some(link) = self.resolve_link(name, &mut lines) {
            if link.has_endpoint() {
                match self.agent.ping(&link).await {
                    Ok(endpoint) => {
                        reached = true;
                        lines.push(format!("Pong from {} at {}", link.name, endpoint));
                    }
                    Err(AgentError::NotConnected) => print_not_connected(&mut lines),
                    Err(err) => lines.push(format!("    {err}")),
                }
            } else {
                lines.push("Please sync first to get target endpoint".to_string());
                suggest(&mut lines, &[sync_usage(Some(&link.name))]);
            }
        }
        Ok(CommandOutput::from_lines(
            lines,
            json!({"command": "link.ping", "query": name, "reached": reached}),
        ))
    }

    // ---- claims --------------------------------------------------------

    pub async fn request_claim(&mut self, name: &str) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let mut requested = false;
        match self.wallet.search_available_claims(name).into_selection(name) {
            Selection::None => {
                lines.push(
                    "No matching claim(s) found in any links in current keyring".to_string(),
                );
            }
            Selection::Many(candidates) => {
                lines.push(format!("More than one match for \"{name}\""));
                for candidate in &candidates {
                    lines.push(format!(
                        "    {} in {}",
                        candidate.entity.claim.name, candidate.entity.link.name
                    ));
                }
            }
            Selection::One {
                entity,
                expanded_from,
            } => {
                if let Some(query) = expanded_from {
                    lines.push(format!("Expanding {} to \"{}\"", query, entity.claim.name));
                }
                lines.push(format!(
                    "Found claim {} in link {}",
                    entity.claim.name, entity.link.name
                ));
                if !self.is_connected() {
                    print_not_connected(&mut lines);
                } else {
                    lines.push(format!(
                        "Requesting claim {} from {}...",
                        entity.claim.name, entity.link.name
                    ));
                    match self.agent.request_claim(&entity.link, &entity.claim).await {
                        Ok(request_key) => {
                            requested = true;
                            let claim_name = entity.claim.name.clone();
                            let link_name = entity.link.name.clone();
                            self.await_reply(&request_key, &mut lines, move |reply| {
                                let received =
                                    reply["claim"].as_str().unwrap_or(&claim_name).to_string();
                                format!("Received claim \"{received}\" from {link_name}")
                            })
                            .await;
                        }
                        Err(AgentError::NotConnected) => print_not_connected(&mut lines),
                        Err(err) => lines.push(format!("    {err}")),
                    }
                }
            }
        }
        Ok(CommandOutput::from_lines(
            lines,
            json!({"command": "claim.request", "query": name, "requested": requested}),
        ))
    }

    pub async fn show_claim(&self, name: &str) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        match self.agent.received_claims_by_name(name).await {
            Err(err) => lines.push(format!("    {err}")),
            Ok(results) => {
                let classified =
                    MatchResult::classify(name, vec![("received".to_string(), results)]);
                match classified.into_selection(name) {
                    Selection::None => {
                        lines.push(
                            "No matching claim(s) found in any links in current keyring"
                                .to_string(),
                        );
                    }
                    Selection::Many(candidates) => {
                        lines.push(format!("More than one match for \"{name}\""));
                        for candidate in &candidates {
                            lines.push(format!(
                                "    {} in {}",
                                candidate.entity.claim.name, candidate.entity.link
                            ));
                        }
                    }
                    Selection::One {
                        entity,
                        expanded_from,
                    } => {
                        if let Some(query) = expanded_from {
                            lines.push(format!(
                                "Expanding {} to \"{}\"",
                                query, entity.claim.name
                            ));
                        }
                        lines.push(format!(
                            "Found claim {} in link {}",
                            entity.claim.name, entity.link
                        ));
                        if entity.is_issued() {
                            lines.push("Status: issued".to_string());
                        } else {
                            lines.push("Status: available (not yet issued)".to_string());
                        }
                        lines.push(format!("Name: {}", entity.claim.name));
                        lines.push(format!("Version: {}", entity.claim.version));
                        lines.push("Attributes:".to_string());
                        for (attribute, value) in &entity.attributes {
                            match value {
                                Some(value) => lines.push(format!("    {attribute}: {value}")),
                                None => lines.push(format!("    {attribute}")),
                            }
                        }
                        if !entity.is_issued() {
                            suggest(
                                &mut lines,
                                &[request_claim_usage(Some(&entity.claim.name))],
                            );
                        }
                    }
                }
            }
        }
        Ok(CommandOutput::from_lines(
            lines,
            json!({"command": "claim.show", "query": name}),
        ))
    }

    /// Show a claim proof request and make it the current context. Entering
    /// the same pair again keeps previously set attributes.
    pub async fn show_claim_request(&mut self, name: &str) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let mut payload = json!({"command": "claim.show-request", "query": name});
        match self
            .wallet
            .search_claim_requests(name, None)
            .into_selection(name)
        {
            Selection::None => {
                lines.push("No matching claim request(s) found in current keyring".to_string());
            }
            Selection::Many(candidates) => {
                lines.push(format!("More than one claim request matches \"{name}\""));
                for candidate in &candidates {
                    lines.push(format!(
                        "    {} in {}",
                        candidate.entity.request.name, candidate.entity.link.name
                    ));
                }
            }
            Selection::One {
                entity,
                expanded_from,
            } => {
                if let Some(query) = expanded_from {
                    lines.push(format!(
                        "Expanding {} to \"{}\"",
                        query, entity.request.name
                    ));
                }
                let transition = self.context.enter(&entity.link.name, &entity.request.name);
                debug!(
                    link = %entity.link.name,
                    request = %entity.request.name,
                    ?transition,
                    "claim request context"
                );
                lines.push(format!(
                    "Found claim request \"{}\" in link \"{}\"",
                    entity.request.name, entity.link.name
                ));
                let attested = self.context.self_attested();
                match claim::resolve(&self.agent, &entity.request, &attested).await {
                    Ok(resolved) => {
                        lines.push(resolved.render());
                        suggest(
                            &mut lines,
                            &[
                                set_attr_usage(),
                                send_claim_usage(
                                    Some(&entity.request.name),
                                    Some(&entity.link.name),
                                ),
                            ],
                        );
                        payload = json!({
                            "command": "claim.show-request",
                            "query": name,
                            "link": entity.link.name,
                            "request": serde_json::to_value(&resolved)?,
                        });
                    }
                    Err(err) => lines.push(format!("    {err}")),
                }
            }
        }
        Ok(CommandOutput::from_lines(lines, payload))
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) -> CommandOutput {
        let mut lines = Vec::new();
        let stored = self.context.set_attribute(name, value);
        if stored {
            lines.push(format!("Attribute {name} set"));
        } else {
            lines.push("No context, use below command to set the context".to_string());
            usage(&mut lines, &[show_claim_request_usage(None)]);
        }
        CommandOutput::from_lines(
            lines,
            json!({"command": "claim.set", "attribute": name, "stored": stored}),
        )
    }

    pub async fn send_claim(&mut self, request_name: &str, link_name: &str) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        let mut sent = false;
        match self
            .wallet
            .search_claim_requests(request_name, Some(link_name))
            .into_selection(request_name)
        {
            Selection::None => {
                lines.push("No matching claim request(s) found in current keyring".to_string());
            }
            Selection::Many(candidates) => {
                lines.push(format!(
                    "More than one claim request matches \"{request_name}\""
                ));
                for candidate in &candidates {
                    lines.push(format!(
                        "    {} in {}",
                        candidate.entity.request.name, candidate.entity.link.name
                    ));
                }
            }
            Selection::One {
                entity,
                expanded_from,
            } => {
                if let Some(query) = expanded_from {
                    lines.push(format!(
                        "Expanding {} to \"{}\"",
                        query, entity.request.name
                    ));
                }
                if !self.is_connected() {
                    print_not_connected(&mut lines);
                } else {
                    debug!(
                        request = %entity.request.name,
                        link = %entity.link.name,
                        "sending claim proof"
                    );
                    lines.push(format!(
                        "Sending claim proof {} to {}...",
                        entity.request.name, entity.link.name
                    ));
                    match self.agent.send_proof(&entity.link, &entity.request).await {
                        Ok(request_key) => {
                            sent = true;
                            let request = entity.request.name.clone();
                            let link = entity.link.name.clone();
                            self.await_reply(&request_key, &mut lines, move |_reply| {
                                format!("Claim proof {request} accepted by {link}")
                            })
                            .await;
                        }
                        Err(AgentError::NotConnected) => print_not_connected(&mut lines),
                        Err(err) => lines.push(format!("    {err}")),
                    }
                }
            }
        }
        Ok(CommandOutput::from_lines(
            lines,
            json!({
                "command": "claim.send",
                "request": request_name,
                "link": link_name,
                "sent": sent,
            }),
        ))
    }

    /// Await the asynchronous reply for a submitted request and render the
    /// outcome; a timeout is reported, not propagated.
    async fn await_reply(
        &self,
        request_key: &str,
        lines: &mut Vec<String>,
        on_reply: impl FnOnce(&Reply) -> String,
    ) {
        match self.correlator.wait(request_key).await {
            Ok(reply) => lines.push(on_reply(&reply)),
            Err(CorrelationError::TimedOut) => lines.push(format!(
                "No reply for request {request_key} yet; it may still complete"
            )),
            Err(err) => lines.push(format!("    {err}")),
        }
    }
}
