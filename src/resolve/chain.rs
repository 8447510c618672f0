use std::collections::HashSet;

use async_recursion::async_recursion;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::coordinates::{CoordinateKey, ModuleCoordinate, ResolvedArtifact};
use crate::error::{MetadataParseError, ResolveError};
use crate::ivy::descriptor::parse_extends;
use crate::maven::pom::parse_parent;

/// Where the chain walker resolves ancestors and reads descriptor content
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    async fn resolve(&self, coordinate: &ModuleCoordinate) -> Result<Option<ResolvedArtifact>, ResolveError>;

    /// `None` if no repository serves the artifact's content
    async fn content(&self, artifact: &ResolvedArtifact) -> Result<Option<Bytes>, ResolveError>;
}

#[derive(Debug, Default)]
pub struct ChainOutcome {
    /// in discovery order, each at most once
    pub ancestors: Vec<ResolvedArtifact>,
    /// ancestors no repository hosts
    pub unresolved: Vec<String>,
}

/// Follows POM `<parent>` and Ivy `<extends>` references. Published metadata may contain cycles,
///  so every ancestor is visited at most once per walk.
pub struct DescriptorChainWalker<'a> {
    source: &'a dyn DescriptorSource,
}

impl<'a> DescriptorChainWalker<'a> {
    pub fn new(source: &'a dyn DescriptorSource) -> DescriptorChainWalker<'a> {
        DescriptorChainWalker {
            source,
        }
    }

    /// All ancestors of the given descriptors. Ancestors shared between descriptors are reported
    ///  once.
    pub async fn walk(&self, descriptors: &[ResolvedArtifact]) -> Result<ChainOutcome, ResolveError> {
        let mut seen: HashSet<CoordinateKey> = descriptors.iter()
            .map(|d| d.coordinate.key())
            .collect();
        let mut outcome = ChainOutcome::default();

        for descriptor in descriptors {
            self.expand(descriptor, &mut seen, &mut outcome).await?;
        }
        Ok(outcome)
    }

    #[async_recursion]
    async fn expand(&self, descriptor: &ResolvedArtifact, seen: &mut HashSet<CoordinateKey>, outcome: &mut ChainOutcome) -> Result<(), ResolveError> {
        let content = match self.source.content(descriptor).await? {
            Some(content) => content,
            None => {
                warn!("no content for descriptor {}, not following its ancestors", descriptor.coordinate);
                return Ok(());
            }
        };

        let ancestors = match ancestors_of(descriptor, &content) {
            Ok(ancestors) => ancestors,
            Err(e) => {
                warn!("{}, not following its ancestors", e);
                return Ok(());
            }
        };

        for ancestor in ancestors {
            if !seen.insert(ancestor.key()) {
                debug!("ancestor {} of {} was visited already", ancestor, descriptor.coordinate);
                continue;
            }

            match self.source.resolve(&ancestor).await? {
                Some(resolved) => {
                    debug!("{} inherits from {}", descriptor.coordinate, ancestor);
                    outcome.ancestors.push(resolved.clone());
                    self.expand(&resolved, seen, outcome).await?;
                }
                None => outcome.unresolved.push(ancestor.to_string()),
            }
        }
        Ok(())
    }
}

fn ancestors_of(descriptor: &ResolvedArtifact, content: &[u8]) -> Result<Vec<ModuleCoordinate>, MetadataParseError> {
    let location = descriptor.urls().first()
        .map(|u| u.as_str())
        .unwrap_or(descriptor.filename.as_str());

    match descriptor.coordinate.artifact_type() {
        "pom" => Ok(parse_parent(location, content)?.into_iter().collect()),
        "ivy" => parse_extends(location, content),
        _ => Ok(vec![]),
    }
}
