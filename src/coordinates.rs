use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ResolveError;

pub const DEFAULT_TYPE: &str = "jar";

/// Artifact types that describe a module rather than carry its payload
pub const DESCRIPTOR_TYPES: [&str; 2] = ["pom", "ivy"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinateError {
    #[error("coordinate field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("not a valid coordinate: {0:?}")]
    Malformed(String),
}

/// The identity of a coordinate: everything except the file extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoordinateKey {
    pub group: String,
    pub name: String,
    pub version: String,
    pub artifact_type: String,
    pub classifier: Option<String>,
}

/// A module identity plus the concrete artifact (type, extension, classifier) requested from it.
///
/// Equality, hashing and ordering only look at the identity fields, see [CoordinateKey].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate", into = "RawCoordinate")]
pub struct ModuleCoordinate {
    group: String,
    name: String,
    version: String,
    artifact_type: String,
    extension: String,
    classifier: Option<String>,
}

impl ModuleCoordinate {
    pub fn new(group: &str, name: &str, version: &str, artifact_type: &str) -> Result<ModuleCoordinate, CoordinateError> {
        for (field, value) in [("group", group), ("name", name), ("version", version), ("type", artifact_type)] {
            if value.trim().is_empty() {
                return Err(CoordinateError::EmptyField(field));
            }
        }

        Ok(ModuleCoordinate {
            group: group.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            artifact_type: artifact_type.to_string(),
            extension: default_extension(artifact_type).to_string(),
            classifier: None,
        })
    }

    pub fn with_extension(mut self, extension: &str) -> ModuleCoordinate {
        if !extension.is_empty() {
            self.extension = extension.to_string();
        }
        self
    }

    /// an empty classifier is the same as no classifier
    pub fn with_classifier(mut self, classifier: Option<&str>) -> ModuleCoordinate {
        self.classifier = classifier
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string());
        self
    }

    /// A sibling coordinate for another artifact of the same module, e.g. its POM.
    pub fn sibling(&self, artifact_type: &str) -> ModuleCoordinate {
        ModuleCoordinate {
            group: self.group.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            artifact_type: artifact_type.to_string(),
            extension: default_extension(artifact_type).to_string(),
            classifier: None,
        }
    }

    pub fn group(&self) -> &str { &self.group }
    pub fn name(&self) -> &str { &self.name }
    pub fn version(&self) -> &str { &self.version }
    pub fn artifact_type(&self) -> &str { &self.artifact_type }
    pub fn extension(&self) -> &str { &self.extension }
    pub fn classifier(&self) -> Option<&str> { self.classifier.as_deref() }

    pub fn is_descriptor(&self) -> bool {
        DESCRIPTOR_TYPES.contains(&self.artifact_type.as_str())
    }

    pub fn key(&self) -> CoordinateKey {
        CoordinateKey {
            group: self.group.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            artifact_type: self.artifact_type.clone(),
            classifier: self.classifier.clone(),
        }
    }
}

fn default_extension(artifact_type: &str) -> &str {
    match artifact_type {
        "ivy" => "xml",
        other => other,
    }
}

impl PartialEq for ModuleCoordinate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for ModuleCoordinate {}

impl Hash for ModuleCoordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.group.hash(state);
        self.name.hash(state);
        self.version.hash(state);
        self.artifact_type.hash(state);
        self.classifier.hash(state);
    }
}

impl PartialOrd for ModuleCoordinate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ModuleCoordinate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.group.cmp(&other.group)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| compare_versions(&self.version, &other.version))
            .then_with(|| self.artifact_type.cmp(&other.artifact_type))
            // NB: None sorts before Some
            .then_with(|| self.classifier.cmp(&other.classifier))
    }
}

/// Semantic version order if both sides parse as semantic versions, lexicographic if neither does.
///
/// Mixing both kinds would not be transitive (`1.9` < `1.9.0` < `1.10.0` < `1.9`), so all
///  versions that are not semantic versions sort before all that are. Versions that are equal
///  semantically but differ textually are tie-broken lexicographically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Err(_), Err(_)) => a.cmp(b),
        (Err(_), Ok(_)) => Ordering::Less,
        (Ok(_), Err(_)) => Ordering::Greater,
    }
}

/// `group:name:version[:classifier][@type]`
impl Display for ModuleCoordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        if self.artifact_type != DEFAULT_TYPE {
            write!(f, "@{}", self.artifact_type)?;
        }
        Ok(())
    }
}

impl FromStr for ModuleCoordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (gav, artifact_type) = match s.split_once('@') {
            Some((gav, t)) => (gav, t),
            None => (s, DEFAULT_TYPE),
        };

        let parts: Vec<&str> = gav.split(':').collect();
        match parts.as_slice() {
            [group, name, version] => ModuleCoordinate::new(group, name, version, artifact_type),
            [group, name, version, classifier] => Ok(ModuleCoordinate::new(group, name, version, artifact_type)?
                .with_classifier(Some(classifier))),
            _ => Err(CoordinateError::Malformed(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawCoordinate {
    group: String,
    name: String,
    version: String,
    #[serde(rename = "type", default = "default_type")]
    artifact_type: String,
    #[serde(default)]
    extension: Option<String>,
    #[serde(default)]
    classifier: Option<String>,
}

fn default_type() -> String {
    DEFAULT_TYPE.to_string()
}

impl TryFrom<RawCoordinate> for ModuleCoordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        let coordinate = ModuleCoordinate::new(&raw.group, &raw.name, &raw.version, &raw.artifact_type)?
            .with_classifier(raw.classifier.as_deref());
        Ok(match raw.extension {
            Some(extension) => coordinate.with_extension(&extension),
            None => coordinate,
        })
    }
}

impl From<ModuleCoordinate> for RawCoordinate {
    fn from(c: ModuleCoordinate) -> Self {
        RawCoordinate {
            group: c.group,
            name: c.name,
            version: c.version,
            artifact_type: c.artifact_type,
            extension: Some(c.extension),
            classifier: c.classifier,
        }
    }
}


/// A coordinate that was located in at least one repository and hashed.
///
/// Instances are only ever merged after creation: the URL list grows, the hash never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub coordinate: ModuleCoordinate,
    pub filename: String,
    /// directory of the artifact relative to the repository root
    pub repo_path: String,
    pub snapshot_timestamp: Option<String>,
    pub snapshot_build: Option<u32>,
    urls: Vec<String>,
    sha256: String,
}

impl ResolvedArtifact {
    pub fn new(coordinate: ModuleCoordinate, filename: String, repo_path: String, url: String, sha256: String) -> ResolvedArtifact {
        ResolvedArtifact {
            coordinate,
            filename,
            repo_path,
            snapshot_timestamp: None,
            snapshot_build: None,
            urls: vec![url],
            sha256,
        }
    }

    pub fn with_snapshot(mut self, timestamp: Option<String>, build: Option<u32>) -> ResolvedArtifact {
        self.snapshot_timestamp = timestamp;
        self.snapshot_build = build;
        self
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn add_url(&mut self, url: &str) {
        if !self.urls.iter().any(|u| u == url) {
            self.urls.push(url.to_string());
        }
    }

    /// Unions the other artifact's URLs into this one, keeping this one's discovery order first.
    pub fn merge(&mut self, other: &ResolvedArtifact) -> Result<(), ResolveError> {
        if self.sha256 != other.sha256 {
            return Err(ResolveError::HashMismatch {
                coordinate: self.coordinate.to_string(),
                expected: self.sha256.clone(),
                actual: other.sha256.clone(),
            });
        }
        for url in &other.urls {
            self.add_url(url);
        }
        Ok(())
    }
}


#[cfg(test)]
mod test {
    use rstest::*;
    use super::*;

    fn coord(s: &str) -> ModuleCoordinate {
        s.parse().unwrap()
    }

    #[rstest]
    #[case::group("a:x:1.0", "b:x:1.0", Ordering::Less)]
    #[case::name("a:x:1.0", "a:y:0.1", Ordering::Less)]
    #[case::semver("a:x:1.2.0", "a:x:1.10.0", Ordering::Less)]
    #[case::semver_prerelease("a:x:1.0.0-rc.1", "a:x:1.0.0", Ordering::Less)]
    #[case::lexicographic_fallback("a:x:1.10", "a:x:1.2", Ordering::Less)]
    #[case::mixed_fallback("a:x:1.0.0", "a:x:1.0", Ordering::Greater)]
    #[case::semver_after_plain("a:x:1.10.0", "a:x:1.9", Ordering::Greater)]
    #[case::plain_before_semver("a:x:2", "a:x:1.0.0", Ordering::Less)]
    #[case::type_("a:x:1.0@jar", "a:x:1.0@pom", Ordering::Less)]
    #[case::no_classifier_first("a:x:1.0", "a:x:1.0:sources", Ordering::Less)]
    #[case::classifier("a:x:1.0:javadoc", "a:x:1.0:sources", Ordering::Less)]
    #[case::equal("a:x:1.0:sources@jar", "a:x:1.0:sources", Ordering::Equal)]
    fn test_ordering(#[case] left: &str, #[case] right: &str, #[case] expected: Ordering) {
        assert_eq!(coord(left).cmp(&coord(right)), expected);
        assert_eq!(coord(right).cmp(&coord(left)), expected.reverse());
    }

    #[test]
    fn test_identity_ignores_extension() {
        let a = coord("org.example:lib:1.0").with_extension("aar");
        let b = coord("org.example:lib:1.0");
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[rstest]
    #[case::group(":x:1.0")]
    #[case::name("a::1.0")]
    #[case::version("a:x: ")]
    #[case::type_("a:x:1.0@")]
    #[case::too_few("a:x")]
    #[case::too_many("a:x:1.0:c:d")]
    fn test_rejects_malformed(#[case] s: &str) {
        assert!(s.parse::<ModuleCoordinate>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for s in ["a.b:x:1.0", "a.b:x:1.0:sources", "a.b:x:1.0@pom", "a.b:x:1.0:tests@module"] {
            assert_eq!(coord(s).to_string(), s);
        }
    }

    #[test]
    fn test_deserialize_defaults() {
        let c: ModuleCoordinate = serde_json::from_str(r#"{"group":"g","name":"n","version":"1","type":"ivy","classifier":""}"#).unwrap();
        assert_eq!(c.extension(), "xml");
        assert_eq!(c.classifier(), None);
        assert!(c.is_descriptor());

        let c: ModuleCoordinate = serde_json::from_str(r#"{"group":"g","name":"n","version":"1"}"#).unwrap();
        assert_eq!(c.artifact_type(), "jar");
        assert_eq!(c.extension(), "jar");

        assert!(serde_json::from_str::<ModuleCoordinate>(r#"{"group":"","name":"n","version":"1"}"#).is_err());
    }

    #[test]
    fn test_merge_unions_urls_in_order() {
        let c = coord("g:n:1.0");
        let mut a = ResolvedArtifact::new(c.clone(), "n-1.0.jar".into(), "g/n/1.0".into(), "https://a/n-1.0.jar".into(), "00".into());
        let mut b = ResolvedArtifact::new(c, "n-1.0.jar".into(), "g/n/1.0".into(), "https://b/n-1.0.jar".into(), "00".into());
        b.add_url("https://a/n-1.0.jar");

        a.merge(&b).unwrap();
        assert_eq!(a.urls(), &["https://a/n-1.0.jar".to_string(), "https://b/n-1.0.jar".to_string()]);
    }

    #[test]
    fn test_merge_rejects_conflicting_hash() {
        let c = coord("g:n:1.0");
        let mut a = ResolvedArtifact::new(c.clone(), "n-1.0.jar".into(), "g/n/1.0".into(), "https://a".into(), "00".into());
        let b = ResolvedArtifact::new(c, "n-1.0.jar".into(), "g/n/1.0".into(), "https://b".into(), "ff".into());

        assert!(matches!(a.merge(&b), Err(ResolveError::HashMismatch { .. })));
        assert_eq!(a.urls(), &["https://a".to_string()]);
    }
}
