//! Filesystem layout of a Tether home. Everything the shell persists lives
//! under one root directory: keyring documents, the session and context
//! files, and the local network fixture with its reply log.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const ENV_HOME: &str = "TETHER_HOME";
const DEFAULT_DIR: &str = ".tether";

/// Root directory holding all Tether state. Constructing one guarantees the
/// directory exists.
#[derive(Debug, Clone)]
pub struct Home {
    root: PathBuf,
}

impl Home {
    /// Resolve the root from the environment: `TETHER_HOME` wins, with a
    /// relative value anchored at the working directory; otherwise
    /// `~/.tether`.
    pub fn resolve() -> Result<Self> {
        let root = match env::var(ENV_HOME) {
            Ok(explicit) => {
                let path = PathBuf::from(explicit);
                if path.is_absolute() {
                    path
                } else {
                    env::current_dir()
                        .context("unable to read current working directory")?
                        .join(path)
                }
            }
            Err(_) => dirs::home_dir()
                .context("could not determine user home directory; set TETHER_HOME instead")?
                .join(DEFAULT_DIR),
        };
        Self::at(root)
    }

    /// Use an explicit root, creating it when absent.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create Tether home at {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
