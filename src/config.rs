use std::path::PathBuf;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::transport::TransportOptions;

pub const ENV_PREFIX: &str = "ARTI_LOCK_";

/// Runtime configuration: built-in defaults, overridden by `ARTI_LOCK_*` environment variables
///  (e.g. `ARTI_LOCK_PURPOSES=[plugin,project]`, `ARTI_LOCK_MAX_CONCURRENCY=4`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// dependency resolution purposes to include, empty for all
    pub purposes: Vec<String>,
    /// build units to include (plus the units they depend on), empty for all
    pub subprojects: Vec<String>,
    /// `file:` repositories are machine-local and therefore not reproducible
    pub disable_local_repositories: bool,
    pub s3_endpoint: Option<String>,
    /// for isolated test environments only
    pub s3_insecure_tls: bool,
    /// root of the per-repository download caches
    pub cache_dir: Option<PathBuf>,
    pub max_concurrency: usize,
    pub network_timeout_secs: u64,
    /// also locate POM, Ivy and Gradle module metadata of every requested artifact
    pub resolve_module_metadata: bool,
    /// download from every repository hosting an artifact and compare hashes, instead of trusting
    ///  the first one
    pub verify_mirrors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            purposes: vec![],
            subprojects: vec![],
            disable_local_repositories: true,
            s3_endpoint: None,
            s3_insecure_tls: false,
            cache_dir: None,
            max_concurrency: 8,
            network_timeout_secs: 60,
            resolve_module_metadata: true,
            verify_mirrors: false,
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load() -> Result<Config, Box<figment::Error>> {
        let config: Config = Config::figment().extract().map_err(Box::new)?;
        if config.s3_insecure_tls {
            warn!("TLS certificate verification is DISABLED for S3 repositories - never use this outside of test environments");
        }
        Ok(config)
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            timeout: Duration::from_secs(self.network_timeout_secs),
            s3_endpoint: self.s3_endpoint.clone(),
            s3_insecure_tls: self.s3_insecure_tls,
        }
    }

    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir.clone()
            .unwrap_or_else(|| std::env::temp_dir().join("arti-lock"))
    }

    /// whether a purpose is selected, matching case-insensitively
    pub fn includes_purpose(&self, purpose: &str) -> bool {
        self.purposes.is_empty() || self.purposes.iter().any(|p| p.eq_ignore_ascii_case(purpose))
    }
}
