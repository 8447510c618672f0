use tracing::warn;

use crate::coordinates::ModuleCoordinate;
use crate::error::ResolveError;
use crate::maven::paths::{artifact_path, metadata_path, module_directory, file_name};
use crate::maven::snapshot::{resolve_snapshot, SnapshotVersion};
use crate::repository::{RemoteRepository, ResourceLocation};

/// A repository in Maven 2 layout
pub struct MavenResolver {
    repository: RemoteRepository,
}

impl MavenResolver {
    pub fn new(repository: RemoteRepository) -> MavenResolver {
        MavenResolver {
            repository,
        }
    }

    pub fn repository(&self) -> &RemoteRepository {
        &self.repository
    }

    pub async fn locate(&self, coordinate: &ModuleCoordinate) -> Result<Option<ResourceLocation>, ResolveError> {
        let snapshot = match SnapshotVersion::parse(coordinate.version()) {
            None => None,
            Some(snapshot) => {
                let metadata_location = self.repository.location(&metadata_path(coordinate, Some(&snapshot)));
                let resolved = resolve_snapshot(self.repository.transport(), &metadata_location, coordinate, snapshot)
                    .await
                    .map_err(|e| self.repository.unavailable(coordinate, e))?;
                Some(resolved)
            }
        };

        let relative_path = artifact_path(coordinate, snapshot.as_ref());
        let url = self.repository.location(&relative_path);
        if !self.repository.exists(coordinate, &url).await? {
            return Ok(None);
        }

        if let Some(snapshot) = &snapshot {
            if !snapshot.is_timestamped() {
                warn!("no published snapshot build found for {} in repository {}, using the generic snapshot {}", coordinate, self.repository.name, url);
            }
        }

        Ok(Some(ResourceLocation {
            url,
            relative_path,
            repo_path: module_directory(coordinate, snapshot.as_ref()),
            filename: file_name(coordinate, snapshot.as_ref()),
            snapshot,
        }))
    }
}
