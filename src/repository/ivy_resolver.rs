use tracing::trace;

use crate::coordinates::ModuleCoordinate;
use crate::error::ResolveError;
use crate::ivy::pattern::{substitute, PatternTokens, DEFAULT_ARTIFACT_PATTERN, DEFAULT_IVY_PATTERN};
use crate::maven::paths::{file_name, module_directory};
use crate::maven::snapshot::SnapshotVersion;
use crate::repository::{IvyPatterns, RemoteRepository, ResourceLocation};

/// A repository in an Ivy layout described by patterns. Descriptors (type `ivy`) are looked up with
///  the Ivy patterns, everything else with the artifact patterns; the first pattern that yields an
///  existing resource wins.
pub struct IvyResolver {
    repository: RemoteRepository,
    patterns: IvyPatterns,
}

impl IvyResolver {
    pub fn new(repository: RemoteRepository, patterns: IvyPatterns) -> IvyResolver {
        IvyResolver {
            repository,
            patterns,
        }
    }

    pub fn repository(&self) -> &RemoteRepository {
        &self.repository
    }

    fn candidate_patterns(&self, coordinate: &ModuleCoordinate) -> Vec<&str> {
        let (configured, default) = if coordinate.artifact_type() == "ivy" {
            (&self.patterns.ivy_patterns, DEFAULT_IVY_PATTERN)
        }
        else {
            (&self.patterns.artifact_patterns, DEFAULT_ARTIFACT_PATTERN)
        };

        if configured.is_empty() {
            vec![default]
        }
        else {
            configured.iter().map(|p| p.as_str()).collect()
        }
    }

    pub async fn locate(&self, coordinate: &ModuleCoordinate) -> Result<Option<ResourceLocation>, ResolveError> {
        // Ivy has no snapshot metadata, a generic snapshot stays generic
        let snapshot = SnapshotVersion::parse(coordinate.version());
        let tokens = PatternTokens::for_coordinate(coordinate);

        for pattern in self.candidate_patterns(coordinate) {
            let substituted = substitute(pattern, &tokens, self.patterns.m2_compatible);
            let url = if is_absolute(&substituted) {
                substituted
            }
            else {
                self.repository.location(substituted.trim_start_matches('/'))
            };

            if self.repository.exists(coordinate, &url).await? {
                return Ok(Some(ResourceLocation {
                    relative_path: self.repository.relative_path(&url),
                    url,
                    // reported in Maven layout, independent of the pattern that matched
                    repo_path: module_directory(coordinate, None),
                    filename: file_name(coordinate, None),
                    snapshot,
                }));
            }
            trace!("{} not found at {}", coordinate, url);
        }
        Ok(None)
    }
}

fn is_absolute(pattern: &str) -> bool {
    pattern.contains("://") || pattern.starts_with("file:")
}
