//! Named-environment connection state. Connecting does not open sockets
//! here; it records which environment network commands should target and
//! gates the commands that require one.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const SESSION_FILE: &str = "session.json";

/// Environments a session can connect to.
pub const ENVIRONMENTS: &[&str] = &["sandbox", "live"];

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    connected_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(String),
    AlreadyConnected(String),
    UnknownEnvironment(String),
}

#[derive(Debug, Clone)]
pub struct Session {
    path: PathBuf,
}

impl Session {
    pub fn open(home: &Path) -> Result<Self> {
        let path = home.join(SESSION_FILE);
        let session = Self { path };
        if !session.path.exists() {
            session.write(&SessionFile::default())?;
        }
        Ok(session)
    }

    pub fn connected_env(&self) -> Result<Option<String>> {
        Ok(self.read()?.connected_env)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connected_env(), Ok(Some(_)))
    }

    pub fn connect(&self, env: &str) -> Result<ConnectOutcome> {
        if !ENVIRONMENTS.contains(&env) {
            return Ok(ConnectOutcome::UnknownEnvironment(env.to_string()));
        }
        let mut state = self.read()?;
        if state.connected_env.as_deref() == Some(env) {
            return Ok(ConnectOutcome::AlreadyConnected(env.to_string()));
        }
        state.connected_env = Some(env.to_string());
        self.write(&state)?;
        Ok(ConnectOutcome::Connected(env.to_string()))
    }

    /// Clear the connection, returning the environment that was active.
    pub fn disconnect(&self) -> Result<Option<String>> {
        let mut state = self.read()?;
        let previous = state.connected_env.take();
        self.write(&state)?;
        Ok(previous)
    }

    fn read(&self) -> Result<SessionFile> {
        if !self.path.exists() {
            return Ok(SessionFile::default());
        }
        let data = fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let state = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(state)
    }

    fn write(&self, state: &SessionFile) -> Result<()> {
        let data = serde_json::to_vec_pretty(state)?;
        fs::write(&self.path, data)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_disconnect_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let session = Session::open(temp.path()).unwrap();
        assert!(!session.is_connected());

        assert_eq!(
            session.connect("sandbox").unwrap(),
            ConnectOutcome::Connected("sandbox".to_string())
        );
        assert!(session.is_connected());
        assert_eq!(
            session.connect("sandbox").unwrap(),
            ConnectOutcome::AlreadyConnected("sandbox".to_string())
        );

        assert_eq!(
            session.disconnect().unwrap(),
            Some("sandbox".to_string())
        );
        assert!(!session.is_connected());
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let session = Session::open(temp.path()).unwrap();
        assert_eq!(
            session.connect("staging").unwrap(),
            ConnectOutcome::UnknownEnvironment("staging".to_string())
        );
        assert!(!session.is_connected());
    }
}
