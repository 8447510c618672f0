//! The parts of `maven-metadata.xml` needed to pin snapshots, see
//!  https://maven.apache.org/ref/3.9.5/maven-repository-metadata/repository-metadata.html

use serde::Deserialize;

use crate::error::MetadataParseError;
use crate::maven::snapshot::SnapshotVersion;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub versioning: Option<Versioning>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Versioning {
    #[serde(default)]
    pub snapshot: Option<Snapshot>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub snapshot_versions: Option<SnapshotVersions>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub build_number: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotVersions {
    #[serde(default)]
    pub snapshot_version: Vec<SnapshotVersionEntry>,
}

/// per-file entry written by Maven 3 and Gradle
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotVersionEntry {
    #[serde(default)]
    pub classifier: Option<String>,
    pub extension: String,
    pub value: String,
    #[serde(default)]
    pub updated: Option<String>,
}

pub fn parse(location: &str, content: &[u8]) -> Result<Metadata, MetadataParseError> {
    serde_xml_rs::from_reader(content)
        .map_err(|e| MetadataParseError {
            location: location.to_string(),
            reason: e.to_string(),
        })
}

impl Metadata {
    /// Timestamp and build number of the latest published build of a file. The per-file entry wins
    ///  over the module-wide `<snapshot>` element.
    pub fn published_build(&self, extension: &str, classifier: Option<&str>) -> Option<(String, u32)> {
        let versioning = self.versioning.as_ref()?;

        let per_file = versioning.snapshot_versions.iter()
            .flat_map(|v| v.snapshot_version.iter())
            .find(|entry| entry.extension == extension && entry.classifier.as_deref().filter(|c| !c.is_empty()) == classifier)
            .and_then(|entry| SnapshotVersion::parse(&entry.value))
            .and_then(|v| Some((v.timestamp?, v.build_number?)));
        if per_file.is_some() {
            return per_file;
        }

        let snapshot = versioning.snapshot.as_ref()?;
        Some((snapshot.timestamp.clone()?, snapshot.build_number?))
    }
}

#[cfg(test)]
mod test {
    use rstest::*;
    use super::*;

    const GRADLE_METADATA: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<metadata modelVersion="1.1.0">
  <groupId>org.example</groupId>
  <artifactId>lib</artifactId>
  <version>1.0-SNAPSHOT</version>
  <versioning>
    <snapshot>
      <timestamp>20200101.120000</timestamp>
      <buildNumber>7</buildNumber>
    </snapshot>
    <lastUpdated>20200101120000</lastUpdated>
    <snapshotVersions>
      <snapshotVersion>
        <extension>jar</extension>
        <value>1.0-20200101.120000-7</value>
        <updated>20200101120000</updated>
      </snapshotVersion>
      <snapshotVersion>
        <classifier>sources</classifier>
        <extension>jar</extension>
        <value>1.0-20191231.235959-6</value>
        <updated>20191231235959</updated>
      </snapshotVersion>
    </snapshotVersions>
  </versioning>
</metadata>"#;

    #[rstest]
    #[case::main_jar("jar", None, Some(("20200101.120000", 7)))]
    #[case::classified("jar", Some("sources"), Some(("20191231.235959", 6)))]
    #[case::falls_back_to_snapshot_element("pom", None, Some(("20200101.120000", 7)))]
    fn test_published_build(#[case] extension: &str, #[case] classifier: Option<&str>, #[case] expected: Option<(&str, u32)>) {
        let metadata = parse("maven-metadata.xml", GRADLE_METADATA).unwrap();
        assert_eq!(metadata.artifact_id.as_deref(), Some("lib"));

        let expected = expected.map(|(t, b)| (t.to_string(), b));
        assert_eq!(metadata.published_build(extension, classifier), expected);
    }

    #[test]
    fn test_local_copy_metadata_has_no_build() {
        let metadata = parse("maven-metadata.xml", br#"<metadata><versioning><snapshot><localCopy>true</localCopy></snapshot></versioning></metadata>"#).unwrap();
        assert_eq!(metadata.published_build("jar", None), None);
    }

    #[test]
    fn test_malformed() {
        let error = parse("https://r/maven-metadata.xml", b"not xml at all").unwrap_err();
        assert_eq!(error.location, "https://r/maven-metadata.xml");
    }
}
