//! Registers local or remote files with the engine before queries run.

use std::{fmt, path::PathBuf, str::FromStr};

use anyhow::{Context, Result, bail};
use sql_engine::{Driver, EngineManager};
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Path(PathBuf),
    Url(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Url(url) => f.write_str(url),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A file made addressable from SQL under `name`.
pub struct Registration {
    pub name: String,
    pub source: Source,
}

impl FromStr for Registration {
    type Err = anyhow::Error;

    fn from_str(arg: &str) -> Result<Self> {
        let Some((name, source)) = arg.split_once('=') else {
            bail!("--register expects NAME=SOURCE, got {arg:?}");
        };
        let (name, source) = (name.trim(), source.trim());
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            bail!("--register name {name:?} must be a bare file name");
        }
        if source.is_empty() {
            bail!("--register {name} has an empty source");
        }
        let source = if source.starts_with("http://") || source.starts_with("https://") {
            Source::Url(source.to_string())
        } else {
            Source::Path(PathBuf::from(source))
        };
        Ok(Self {
            name: name.to_string(),
            source,
        })
    }
}

impl Registration {
    async fn fetch(&self) -> Result<Vec<u8>> {
        match &self.source {
            Source::Path(path) => {
                std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
            }
            Source::Url(url) => {
                let response = reqwest::get(url)
                    .await
                    .and_then(|response| response.error_for_status())
                    .with_context(|| format!("Failed to fetch {url}"))?;
                let body = response
                    .bytes()
                    .await
                    .with_context(|| format!("Failed to read body of {url}"))?;
                Ok(body.to_vec())
            }
        }
    }
}

/// Fetch every source and hand its bytes to the ready engine, in order.
pub async fn register_all<D: Driver>(
    engine: &EngineManager<D>,
    registrations: &[Registration],
) -> Result<()> {
    for registration in registrations {
        let bytes = registration.fetch().await?;
        let size = bytes.len();
        let path = engine
            .register_file(&registration.name, bytes)
            .await
            .with_context(|| format!("Failed to register {}", registration.name))?;
        info!(
            name = %registration.name,
            source = %registration.source,
            bytes = size,
            path = %path.display(),
            "Registered file"
        );
    }
    Ok(())
}
