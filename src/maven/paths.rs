use crate::coordinates::ModuleCoordinate;
use crate::maven::snapshot::SnapshotVersion;

pub const METADATA_FILE_NAME: &str = "maven-metadata.xml";

/// `org.example` -> `org/example`
pub fn group_path(group: &str) -> String {
    group.replace('.', "/")
}

/// The directory holding a module version's files, relative to the repository root, e.g.
///  `org/example/lib/1.0`
pub fn module_directory(coordinate: &ModuleCoordinate, snapshot: Option<&SnapshotVersion>) -> String {
    let version = match snapshot {
        Some(snapshot) => snapshot.directory_version(),
        None => coordinate.version().to_string(),
    };
    format!("{}/{}/{}", group_path(coordinate.group()), coordinate.name(), version)
}

/// `name-<version>[-classifier].extension`, where a snapshot contributes its pinned version
pub fn file_name(coordinate: &ModuleCoordinate, snapshot: Option<&SnapshotVersion>) -> String {
    let version = match snapshot {
        Some(snapshot) => snapshot.to_string(),
        None => coordinate.version().to_string(),
    };

    let mut result = format!("{}-{}", coordinate.name(), version);
    if let Some(classifier) = coordinate.classifier() {
        result.push('-');
        result.push_str(classifier);
    }
    result.push('.');
    result.push_str(coordinate.extension());
    result
}

pub fn artifact_path(coordinate: &ModuleCoordinate, snapshot: Option<&SnapshotVersion>) -> String {
    format!("{}/{}", module_directory(coordinate, snapshot), file_name(coordinate, snapshot))
}

pub fn metadata_path(coordinate: &ModuleCoordinate, snapshot: Option<&SnapshotVersion>) -> String {
    format!("{}/{}", module_directory(coordinate, snapshot), METADATA_FILE_NAME)
}
