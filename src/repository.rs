//! Locating and hashing coordinates in one configured repository.

pub mod ivy_resolver;
pub mod maven_resolver;

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::blob::blob_storage::{BlobStorage, StoredBlob};
use crate::blob::fs_blob_storage::FsBlobStorage;
use crate::coordinates::{ModuleCoordinate, ResolvedArtifact};
use crate::error::{ResolveError, TransportError};
use crate::maven::snapshot::SnapshotVersion;
use crate::repository::ivy_resolver::IvyResolver;
use crate::repository::maven_resolver::MavenResolver;
use crate::transport;
use crate::transport::{Credentials, Transport, TransportOptions};
use crate::util::blob::ByteStream;
use crate::util::sha256_hex;
use crate::util::validating_body::ValidatingBody;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    pub name: String,
    #[serde(flatten)]
    pub layout: RepositoryLayout,
    pub url: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// an unavailable optional repository is skipped with a warning instead of failing the run
    #[serde(default)]
    pub optional: bool,
}

impl RepositoryConfig {
    /// Repositories are identified by name and location: build units may configure different
    ///  repositories under the same name
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.url)
    }

    pub fn is_local(&self) -> bool {
        transport::is_local(&self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "camelCase")]
pub enum RepositoryLayout {
    Maven,
    Ivy(IvyPatterns),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IvyPatterns {
    #[serde(default)]
    pub ivy_patterns: Vec<String>,
    #[serde(default)]
    pub artifact_patterns: Vec<String>,
    #[serde(default)]
    pub m2_compatible: bool,
}

/// Where a coordinate lives in a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocation {
    pub url: String,
    /// relative to the repository root, this keys the download cache
    pub relative_path: String,
    /// the module's directory in Maven layout, as reported in the manifest
    pub repo_path: String,
    pub filename: String,
    pub snapshot: Option<SnapshotVersion>,
}

impl ResourceLocation {
    /// a generic snapshot may be republished under the same location
    pub fn is_immutable(&self) -> bool {
        self.snapshot.as_ref().map_or(true, |s| s.is_timestamped())
    }
}

/// What both layouts share: a transport to the repository and its local download cache
pub struct RemoteRepository {
    name: String,
    id: String,
    /// with trailing '/'
    base_url: String,
    transport: Arc<dyn Transport>,
    storage: Arc<dyn BlobStorage>,
    optional: bool,
}

impl RemoteRepository {
    pub fn new(config: &RepositoryConfig, transport: Arc<dyn Transport>, storage: Arc<dyn BlobStorage>) -> RemoteRepository {
        let mut base_url = config.url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        RemoteRepository {
            name: config.name.clone(),
            id: config.id(),
            base_url,
            transport,
            storage,
            optional: config.optional,
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn location(&self, relative_path: &str) -> String {
        format!("{}{}", self.base_url, relative_path)
    }

    /// Cache key for a location; locations outside the repository root are keyed by host and path
    pub fn relative_path(&self, url: &str) -> String {
        match url.strip_prefix(&self.base_url) {
            Some(relative) => relative.to_string(),
            None => url.split_once("://")
                .map(|(_, rest)| rest)
                .unwrap_or(url)
                .trim_start_matches('/')
                .to_string(),
        }
    }

    fn unavailable(&self, coordinate: &ModuleCoordinate, source: TransportError) -> ResolveError {
        ResolveError::RepositoryUnavailable {
            repository: self.name.clone(),
            coordinate: coordinate.to_string(),
            source,
        }
    }

    pub async fn exists(&self, coordinate: &ModuleCoordinate, url: &str) -> Result<bool, ResolveError> {
        trace!("probing {} for {}", url, coordinate);
        self.transport.exists(url)
            .await
            .map_err(|e| self.unavailable(coordinate, e))
    }

    /// The hash of a located resource, from the download cache if it can not have changed, and by
    ///  downloading it otherwise
    pub async fn hash(&self, coordinate: &ModuleCoordinate, location: &ResourceLocation) -> Result<String, ResolveError> {
        if location.is_immutable() {
            match self.storage.get(&location.relative_path).await {
                Ok(Some(cached)) => {
                    trace!("{} is cached for repository {}", location.relative_path, self.name);
                    return Ok(cached.sha256);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("ignoring unreadable cache entry {} of repository {}: {:#}", location.relative_path, self.name, e);
                    self.evict(&location.relative_path).await;
                }
            }
        }

        Ok(self.download(coordinate, &location.url, &location.relative_path).await?.sha256)
    }

    async fn download(&self, coordinate: &ModuleCoordinate, url: &str, relative_path: &str) -> Result<StoredBlob, ResolveError> {
        debug!("downloading {}", url);

        let blob = match self.transport.open(url).await {
            Ok(blob) => blob,
            Err(e) if e.is_not_found() => return Err(ResolveError::HashComputationFailed {
                coordinate: coordinate.to_string(),
                location: url.to_string(),
                reason: "the resource disappeared after it was located".to_string(),
            }),
            Err(e) => return Err(self.unavailable(coordinate, e)),
        };

        let data: ByteStream = Box::pin(ValidatingBody::for_blob(blob));
        match self.storage.insert(relative_path, data).await {
            Ok(stored) => Ok(stored),
            Err(e) => Err(match e.downcast::<TransportError>() {
                Ok(TransportError::NotFound(_)) => ResolveError::HashComputationFailed {
                    coordinate: coordinate.to_string(),
                    location: url.to_string(),
                    reason: "the resource disappeared during download".to_string(),
                },
                Ok(e) => self.unavailable(coordinate, e),
                Err(e) => ResolveError::HashComputationFailed {
                    coordinate: coordinate.to_string(),
                    location: url.to_string(),
                    reason: format!("{:#}", e),
                },
            }),
        }
    }

    async fn evict(&self, relative_path: &str) {
        match self.storage.delete(relative_path).await {
            Ok(true) => debug!("evicted {} from the cache of repository {}", relative_path, self.name),
            Ok(false) => {}
            Err(e) => warn!("failed to evict {} from the cache of repository {}: {:#}", relative_path, self.name, e),
        }
    }

    async fn read_cached(&self, relative_path: &str, sha256: &str) -> Option<Bytes> {
        let cached = match self.storage.get(relative_path).await {
            Ok(Some(cached)) if cached.sha256 == sha256 => cached,
            Ok(_) => return None,
            Err(e) => {
                warn!("ignoring unreadable cache entry {} of repository {}: {:#}", relative_path, self.name, e);
                return None;
            }
        };

        match cached.data.try_collect::<Vec<Bytes>>().await {
            Ok(chunks) => Some(chunks.concat().into()),
            Err(e) => {
                warn!("ignoring unreadable cache entry {} of repository {}: {:#}", relative_path, self.name, e);
                None
            }
        }
    }

    /// The content of an artifact hosted by this repository, verified against the artifact's hash.
    ///  `None` if none of the artifact's URLs belongs to this repository.
    pub async fn read(&self, artifact: &ResolvedArtifact) -> Result<Option<Bytes>, ResolveError> {
        let url = match artifact.urls().iter().find(|u| u.starts_with(&self.base_url)) {
            Some(url) => url,
            None => return Ok(None),
        };
        let relative_path = self.relative_path(url);

        if let Some(content) = self.read_cached(&relative_path, artifact.sha256()).await {
            return Ok(Some(content));
        }

        let stored = self.download(&artifact.coordinate, url, &relative_path).await?;
        if stored.sha256 != artifact.sha256() {
            // never serve the substituted content from the cache
            self.evict(&relative_path).await;
            return Err(ResolveError::HashMismatch {
                coordinate: artifact.coordinate.to_string(),
                expected: artifact.sha256().to_string(),
                actual: stored.sha256,
            });
        }

        match self.read_cached(&relative_path, artifact.sha256()).await {
            Some(content) => Ok(Some(content)),
            None => Err(ResolveError::HashComputationFailed {
                coordinate: artifact.coordinate.to_string(),
                location: url.to_string(),
                reason: "downloaded content could not be read back from the cache".to_string(),
            }),
        }
    }
}

/// One configured repository. The set of layouts is closed: a new protocol family needs matching
///  changes in the resolution engine anyway.
pub enum RepositoryResolver {
    Maven(MavenResolver),
    Ivy(IvyResolver),
}

impl RepositoryResolver {
    pub fn new(config: &RepositoryConfig, transport: Arc<dyn Transport>, storage: Arc<dyn BlobStorage>) -> RepositoryResolver {
        let repository = RemoteRepository::new(config, transport, storage);
        match &config.layout {
            RepositoryLayout::Maven => RepositoryResolver::Maven(MavenResolver::new(repository)),
            RepositoryLayout::Ivy(patterns) => RepositoryResolver::Ivy(IvyResolver::new(repository, patterns.clone())),
        }
    }

    /// Connects to the repository, caching downloads below a directory of `cache_root` that is
    ///  specific to the repository's name and location
    pub fn connect(config: &RepositoryConfig, options: &TransportOptions, cache_root: &Path) -> Result<RepositoryResolver, ResolveError> {
        let transport = transport::connect(&config.url, config.credentials.as_ref(), options)
            .map_err(|e| ResolveError::InvalidRepository {
                name: config.name.clone(),
                reason: format!("{:#}", e),
            })?;
        let storage = Arc::new(FsBlobStorage::new(cache_root.join(cache_directory_name(config))));
        Ok(RepositoryResolver::new(config, transport, storage))
    }

    fn repository(&self) -> &RemoteRepository {
        match self {
            RepositoryResolver::Maven(r) => r.repository(),
            RepositoryResolver::Ivy(r) => r.repository(),
        }
    }

    pub fn name(&self) -> &str {
        &self.repository().name
    }

    pub fn id(&self) -> &str {
        &self.repository().id
    }

    pub async fn locate(&self, coordinate: &ModuleCoordinate) -> Result<Option<ResourceLocation>, ResolveError> {
        match self {
            RepositoryResolver::Maven(r) => r.locate(coordinate).await,
            RepositoryResolver::Ivy(r) => r.locate(coordinate).await,
        }
    }

    /// Locates a coordinate and hashes it. A known hash was computed elsewhere in this run and is
    ///  trusted, so nothing is downloaded.
    pub async fn resolve(&self, coordinate: &ModuleCoordinate, known_hash: Option<&str>) -> Result<Option<ResolvedArtifact>, ResolveError> {
        match self.do_resolve(coordinate, known_hash).await {
            Err(e @ ResolveError::RepositoryUnavailable { .. }) if self.repository().optional => {
                warn!("skipping optional repository: {}", e);
                Ok(None)
            }
            result => result,
        }
    }

    async fn do_resolve(&self, coordinate: &ModuleCoordinate, known_hash: Option<&str>) -> Result<Option<ResolvedArtifact>, ResolveError> {
        let location = match self.locate(coordinate).await? {
            Some(location) => location,
            None => {
                trace!("{} not found in repository {}", coordinate, self.name());
                return Ok(None);
            }
        };

        let sha256 = match known_hash {
            Some(hash) => hash.to_string(),
            None => self.repository().hash(coordinate, &location).await?,
        };

        let (timestamp, build) = match &location.snapshot {
            Some(snapshot) if snapshot.is_timestamped() => (snapshot.timestamp.clone(), snapshot.build_number),
            _ => (None, None),
        };

        debug!("resolved {} in repository {}: {}", coordinate, self.name(), location.url);
        Ok(Some(
            ResolvedArtifact::new(coordinate.clone(), location.filename, location.repo_path, location.url, sha256)
                .with_snapshot(timestamp, build)
        ))
    }

    pub async fn read_artifact(&self, artifact: &ResolvedArtifact) -> Result<Option<Bytes>, ResolveError> {
        self.repository().read(artifact).await
    }
}

/// `<sanitized name>-<url hash>`: repositories of the same name at different locations must not
///  share cached hashes
fn cache_directory_name(config: &RepositoryConfig) -> String {
    let sanitized: String = config.name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let name = if sanitized.is_empty() { "repository" } else { sanitized.as_str() };
    format!("{}-{}", name, &sha256_hex(config.url.as_bytes())[..12])
}
