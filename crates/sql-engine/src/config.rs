//! Engine and query settings.

use std::{path::PathBuf, time::Duration};

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseLocation {
    InMemory,
    File(PathBuf),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// When capability extensions are installed and loaded.
pub enum ExtensionPolicy {
    /// Before every query, on the query's own connection.
    #[default]
    EveryConnection,
    /// Once per engine instance; the cache dies with the instance.
    OncePerEngine,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryOptions {
    /// Extensions installed then loaded ahead of user SQL, in order.
    pub extensions: Vec<String>,
    pub extension_policy: ExtensionPolicy,
    /// Upper bound on directives plus the user statement. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["httpfs".into(), "spatial".into()],
            extension_policy: ExtensionPolicy::EveryConnection,
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl QueryOptions {
    /// Options with no extension directives, for offline use.
    pub fn offline() -> Self {
        Self {
            extensions: Vec::new(),
            ..Self::default()
        }
    }

    /// Extension names end up inside SQL directives, so only identifiers are accepted.
    pub fn invalid_extension(&self) -> Option<&str> {
        self.extensions
            .iter()
            .find(|name| {
                name.is_empty()
                    || !name
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
            .map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    pub database: DatabaseLocation,
    /// Cap on engine threads; `None` uses every available core.
    pub max_threads: Option<usize>,
    /// Engine memory limit in the engine's own syntax, e.g. `"2GB"`.
    pub memory_limit: Option<String>,
    /// Directory receiving registered files. Defaults to a temp dir removed at shutdown.
    pub scratch_dir: Option<PathBuf>,
    pub query: QueryOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::InMemory,
            max_threads: None,
            memory_limit: None,
            scratch_dir: None,
            query: QueryOptions::default(),
        }
    }
}
