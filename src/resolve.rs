//! A resolution run: every requested coordinate of every selected build unit is located in the
//!  unit's repositories, hashed, and expanded by its module metadata and descriptor ancestors.

pub mod chain;
pub mod merge;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::coordinates::{ModuleCoordinate, ResolvedArtifact};
use crate::error::ResolveError;
use crate::manifest::{BuildUnit, Manifest, ManifestEntry, RequestedArtifact, ResolutionRequest};
use crate::repository::{RepositoryConfig, RepositoryResolver};
use crate::resolve::chain::{DescriptorChainWalker, DescriptorSource};
use crate::resolve::merge::{merge, ResolutionCache};

/// module metadata looked up next to every requested artifact
const MODULE_METADATA_TYPES: [&str; 3] = ["pom", "ivy", "module"];

/// Creates the resolver for a configured repository
pub type Connector = Box<dyn Fn(&RepositoryConfig) -> Result<RepositoryResolver, ResolveError> + Send + Sync>;

/// Owns all state of one run, so separate runs never share cached results
pub struct ResolutionRun {
    config: Config,
    connector: Connector,
    cache: ResolutionCache,
    /// by repository id
    resolvers: Mutex<HashMap<String, Arc<RepositoryResolver>>>,
}

impl ResolutionRun {
    pub fn new(config: Config) -> ResolutionRun {
        let options = config.transport_options();
        let cache_root = config.cache_root();
        let connector: Connector = Box::new(move |repository| RepositoryResolver::connect(repository, &options, &cache_root));
        ResolutionRun::with_connector(config, connector)
    }

    pub fn with_connector(config: Config, connector: Connector) -> ResolutionRun {
        ResolutionRun {
            config,
            connector,
            cache: ResolutionCache::new(),
            resolvers: Default::default(),
        }
    }

    /// Resolves the selected build units and purposes. Coordinates no repository hosts do not stop
    ///  the run, they are reported together at the end.
    pub async fn run(&self, request: &ResolutionRequest) -> Result<Manifest, ResolveError> {
        let units = self.select_units(&request.build_units);
        info!("resolving {} of {} build units", units.len(), request.build_units.len());

        let mut resolved: Vec<(&str, &str, Vec<ResolvedArtifact>)> = vec![];
        let mut unresolved: Vec<String> = vec![];

        for unit in units {
            let unit_resolvers = UnitResolvers {
                run: self,
                resolvers: self.resolvers_for(unit)?,
            };

            for (purpose, requested) in &unit.dependencies {
                if !self.config.includes_purpose(purpose) {
                    debug!("skipping purpose {} of {}", purpose, unit.path);
                    continue;
                }
                debug!("resolving {} coordinates for {} of {}", requested.len(), purpose, unit.path);

                let outcome = unit_resolvers.resolve_all(requested, self.config.max_concurrency.max(1)).await?;
                resolved.push((unit.path.as_str(), purpose.as_str(), outcome.artifacts));
                unresolved.extend(outcome.unresolved);
            }
        }

        if !unresolved.is_empty() {
            unresolved.sort();
            unresolved.dedup();
            return Err(ResolveError::Unresolvable(unresolved));
        }

        let mut manifest = Manifest::new();
        for (unit, purpose, artifacts) in resolved {
            // artifacts may have gained URLs from later build units
            let artifacts = artifacts.into_iter()
                .map(|a| self.cache.get(&a.coordinate.key()).unwrap_or(a));
            let entries = merge(artifacts)?
                .iter()
                .map(ManifestEntry::from)
                .collect();

            manifest.entry(unit.to_string())
                .or_default()
                .insert(purpose.to_string(), entries);
        }

        info!("resolved {} artifacts", self.cache.len());
        Ok(manifest)
    }

    /// The configured subprojects plus everything they depend on, in request order
    fn select_units<'a>(&self, units: &'a [BuildUnit]) -> Vec<&'a BuildUnit> {
        if self.config.subprojects.is_empty() {
            return units.iter().collect();
        }

        let by_path: HashMap<&str, &BuildUnit> = units.iter()
            .map(|u| (u.path.as_str(), u))
            .collect();

        let mut selected: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&str> = self.config.subprojects.iter().map(|s| s.as_str()).collect();
        while let Some(path) = pending.pop() {
            match by_path.get(path) {
                Some(unit) => {
                    if selected.insert(unit.path.as_str()) {
                        pending.extend(unit.depends_on.iter().map(|d| d.as_str()));
                    }
                }
                None => warn!("build unit {} is not part of the request", path),
            }
        }

        units.iter()
            .filter(|u| selected.contains(u.path.as_str()))
            .collect()
    }

    fn resolvers_for(&self, unit: &BuildUnit) -> Result<Vec<Arc<RepositoryResolver>>, ResolveError> {
        let mut result = vec![];
        for repository in &unit.repositories {
            if self.config.disable_local_repositories && repository.is_local() {
                warn!("ignoring local repository {} of {} ({}), it is not reproducible", repository.name, unit.path, repository.url);
                continue;
            }
            result.push(self.resolver(repository)?);
        }
        Ok(result)
    }

    fn resolver(&self, repository: &RepositoryConfig) -> Result<Arc<RepositoryResolver>, ResolveError> {
        let id = repository.id();
        if let Some(resolver) = self.resolvers.lock().get(&id) {
            return Ok(resolver.clone());
        }

        let resolver = Arc::new((self.connector)(repository)?);
        Ok(self.resolvers.lock()
            .entry(id)
            .or_insert(resolver)
            .clone())
    }
}

#[derive(Default)]
struct ResolveOutcome {
    artifacts: Vec<ResolvedArtifact>,
    unresolved: Vec<String>,
}

/// The repositories of one build unit, in lookup order
struct UnitResolvers<'a> {
    run: &'a ResolutionRun,
    resolvers: Vec<Arc<RepositoryResolver>>,
}

impl UnitResolvers<'_> {
    async fn resolve_all(&self, requested: &[RequestedArtifact], max_concurrency: usize) -> Result<ResolveOutcome, ResolveError> {
        let outcomes: Vec<ResolveOutcome> = stream::iter(requested)
            .map(|r| self.resolve_requested(r))
            .buffer_unordered(max_concurrency)
            .try_collect()
            .await?;

        Ok(outcomes.into_iter()
            .fold(ResolveOutcome::default(), |mut acc, outcome| {
                acc.artifacts.extend(outcome.artifacts);
                acc.unresolved.extend(outcome.unresolved);
                acc
            }))
    }

    /// The requested artifact, its module metadata, and the ancestors of all descriptors among them
    async fn resolve_requested(&self, requested: &RequestedArtifact) -> Result<ResolveOutcome, ResolveError> {
        let coordinate = &requested.coordinate;
        let mut outcome = ResolveOutcome::default();

        match self.resolve_coordinate(coordinate, requested.sha256.as_deref()).await? {
            Some(artifact) => outcome.artifacts.push(artifact),
            None => {
                warn!("{} was not found in any repository", coordinate);
                outcome.unresolved.push(coordinate.to_string());
                return Ok(outcome);
            }
        }

        if self.run.config.resolve_module_metadata && !coordinate.is_descriptor() {
            for artifact_type in MODULE_METADATA_TYPES {
                // best effort: plenty of modules publish no POM or no Ivy file
                if let Some(metadata) = self.resolve_coordinate(&coordinate.sibling(artifact_type), None).await? {
                    outcome.artifacts.push(metadata);
                }
            }
        }

        let descriptors: Vec<ResolvedArtifact> = outcome.artifacts.iter()
            .filter(|a| a.coordinate.is_descriptor())
            .cloned()
            .collect();
        let chain = DescriptorChainWalker::new(self).walk(&descriptors).await?;
        outcome.artifacts.extend(chain.ancestors);
        outcome.unresolved.extend(chain.unresolved);
        Ok(outcome)
    }

    /// Asks every repository that was not asked for this coordinate yet. Only the first hit
    ///  downloads, later hits contribute their URL.
    async fn resolve_coordinate(&self, coordinate: &ModuleCoordinate, known_hash: Option<&str>) -> Result<Option<ResolvedArtifact>, ResolveError> {
        let key = coordinate.key();
        let cache = &self.run.cache;
        let _guard = cache.lock_coordinate(&key).await;

        let cached = cache.get(&key);
        if let (Some(cached), Some(known_hash)) = (&cached, known_hash) {
            if cached.sha256() != known_hash {
                return Err(ResolveError::HashMismatch {
                    coordinate: coordinate.to_string(),
                    expected: known_hash.to_string(),
                    actual: cached.sha256().to_string(),
                });
            }
        }

        let mut current = cached;
        let mut found_new = false;
        for resolver in &self.resolvers {
            if !cache.mark_probed(resolver.id(), &key) {
                continue;
            }

            let hint = match &current {
                Some(_) if self.run.config.verify_mirrors => None,
                Some(artifact) => Some(artifact.sha256().to_string()),
                None => known_hash.map(|h| h.to_string()),
            };

            if let Some(artifact) = resolver.resolve(coordinate, hint.as_deref()).await? {
                found_new = true;
                current = match current {
                    None => Some(artifact),
                    Some(mut existing) => {
                        existing.merge(&artifact)?;
                        Some(existing)
                    }
                };
            }
        }

        match current {
            Some(artifact) if found_new => Ok(Some(cache.insert_or_merge(artifact)?)),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl<'a> DescriptorSource for UnitResolvers<'a> {
    async fn resolve(&self, coordinate: &ModuleCoordinate) -> Result<Option<ResolvedArtifact>, ResolveError> {
        self.resolve_coordinate(coordinate, None).await
    }

    /// Cached artifacts may only carry URLs of repositories another build unit configured, so those
    ///  are asked after the unit's own
    async fn content(&self, artifact: &ResolvedArtifact) -> Result<Option<Bytes>, ResolveError> {
        let others: Vec<Arc<RepositoryResolver>> = self.run.resolvers.lock()
            .values()
            .filter(|r| !self.resolvers.iter().any(|own| own.id() == r.id()))
            .cloned()
            .collect();

        for resolver in self.resolvers.iter().chain(others.iter()) {
            if let Some(content) = resolver.read_artifact(artifact).await? {
                return Ok(Some(content));
            }
        }
        Ok(None)
    }
}
