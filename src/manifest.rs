//! What the build tool hands in, and what it gets back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::coordinates::{ModuleCoordinate, ResolvedArtifact};
use crate::repository::RepositoryConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionRequest {
    pub build_units: Vec<BuildUnit>,
}

/// One project of a multi-project build, with the coordinates its build resolved per purpose
///  (`settings`, `plugin`, `buildscript`, `project`, ...)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildUnit {
    pub path: String,
    /// paths of the build units this one depends on
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// in lookup order
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<RequestedArtifact>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedArtifact {
    #[serde(flatten)]
    pub coordinate: ModuleCoordinate,
    /// computed by the build tool already
    #[serde(default)]
    pub sha256: Option<String>,
}

impl From<ModuleCoordinate> for RequestedArtifact {
    fn from(coordinate: ModuleCoordinate) -> Self {
        RequestedArtifact {
            coordinate,
            sha256: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub group: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub extension: String,
    /// directory relative to the repository root
    pub path: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<u32>,
    pub urls: Vec<String>,
    pub sha256: String,
}

impl From<&ResolvedArtifact> for ManifestEntry {
    fn from(artifact: &ResolvedArtifact) -> Self {
        let coordinate = &artifact.coordinate;
        ManifestEntry {
            group: coordinate.group().to_string(),
            name: coordinate.name().to_string(),
            version: coordinate.version().to_string(),
            classifier: coordinate.classifier().map(|c| c.to_string()),
            extension: coordinate.extension().to_string(),
            path: artifact.repo_path.clone(),
            filename: artifact.filename.clone(),
            timestamp: artifact.snapshot_timestamp.clone(),
            build_number: artifact.snapshot_build,
            urls: artifact.urls().to_vec(),
            sha256: artifact.sha256().to_string(),
        }
    }
}

/// build unit path -> purpose -> artifacts in coordinate order
pub type Manifest = BTreeMap<String, BTreeMap<String, Vec<ManifestEntry>>>;
