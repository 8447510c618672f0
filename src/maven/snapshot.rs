use std::fmt::{Display, Formatter};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::coordinates::ModuleCoordinate;
use crate::error::TransportError;
use crate::maven::metadata_xml;
use crate::transport::{read_all, Transport};

lazy_static! {
    static ref SNAPSHOT_REGEX: Regex = Regex::new(r"^(.*)-SNAPSHOT$").unwrap();
    static ref TIMESTAMPED_REGEX: Regex = Regex::new(r"^(.*)-([0-9]{8}\.[0-9]{6})-([0-9]+)$").unwrap();
}

/// A floating version, either still generic (`1.0-SNAPSHOT`) or pinned to a published build
///  (`1.0-20070310.181613-3`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub base: String,
    pub timestamp: Option<String>,
    pub build_number: Option<u32>,
}

impl SnapshotVersion {
    /// `None` for release versions
    pub fn parse(version: &str) -> Option<SnapshotVersion> {
        if let Some(captures) = SNAPSHOT_REGEX.captures(version) {
            return Some(SnapshotVersion {
                base: captures[1].to_string(),
                timestamp: None,
                build_number: None,
            });
        }

        let captures = TIMESTAMPED_REGEX.captures(version)?;
        Some(SnapshotVersion {
            base: captures[1].to_string(),
            timestamp: Some(captures[2].to_string()),
            build_number: Some(captures[3].parse().ok()?),
        })
    }

    /// a timestamped snapshot can never change
    pub fn is_timestamped(&self) -> bool {
        self.timestamp.is_some() && self.build_number.is_some()
    }

    /// Snapshot builds live in the directory of the generic version
    pub fn directory_version(&self) -> String {
        format!("{}-SNAPSHOT", self.base)
    }
}

impl Display for SnapshotVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.timestamp, self.build_number) {
            (Some(timestamp), Some(build_number)) => write!(f, "{}-{}-{}", self.base, timestamp, build_number),
            _ => write!(f, "{}-SNAPSHOT", self.base),
        }
    }
}

/// Pins a generic snapshot to the build currently published according to the repository's
///  `maven-metadata.xml`.
///
/// Missing or malformed metadata is not an error: some repositories do not publish it for legacy
///  publishing schemes, so the generic version is returned instead. An unavailable repository is
///  an error though.
pub async fn resolve_snapshot(
    transport: &dyn Transport,
    metadata_location: &str,
    coordinate: &ModuleCoordinate,
    snapshot: SnapshotVersion,
) -> Result<SnapshotVersion, TransportError> {
    if snapshot.is_timestamped() {
        return Ok(snapshot);
    }

    let content = match read_all(transport, metadata_location).await {
        Ok(content) => content,
        Err(TransportError::NotFound(_)) => {
            // most likely the repository does not host the module at all
            debug!("no maven-metadata.xml at {} for {}", metadata_location, coordinate);
            return Ok(snapshot);
        }
        Err(e) => return Err(e),
    };

    match metadata_xml::parse(metadata_location, &content) {
        Ok(metadata) => match metadata.published_build(coordinate.extension(), coordinate.classifier()) {
            Some((timestamp, build_number)) => {
                debug!("snapshot {} resolves to {}-{}", coordinate, timestamp, build_number);
                Ok(SnapshotVersion {
                    timestamp: Some(timestamp),
                    build_number: Some(build_number),
                    ..snapshot
                })
            }
            None => {
                warn!("{} does not name a published build for {}", metadata_location, coordinate);
                Ok(snapshot)
            }
        },
        Err(e) => {
            warn!("{}", e);
            Ok(snapshot)
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::*;
    use super::*;
    use crate::transport::memory::MemoryTransport;

    #[rstest]
    #[case::generic("1.0-SNAPSHOT", Some(("1.0", None, None)))]
    #[case::timestamped("1.0-20070310.181613-3", Some(("1.0", Some("20070310.181613"), Some(3))))]
    #[case::dashes_in_base("2.0.0-rc-1-SNAPSHOT", Some(("2.0.0-rc-1", None, None)))]
    #[case::release("1.0", None)]
    #[case::lowercase("1.0-snapshot", None)]
    #[case::incomplete_timestamp("1.0-20070310-3", None)]
    fn test_parse(#[case] version: &str, #[case] expected: Option<(&str, Option<&str>, Option<u32>)>) {
        let expected = expected.map(|(base, timestamp, build_number)| SnapshotVersion {
            base: base.to_string(),
            timestamp: timestamp.map(|t| t.to_string()),
            build_number,
        });
        assert_eq!(SnapshotVersion::parse(version), expected);
    }

    #[rstest]
    #[case::generic("1.0-SNAPSHOT", "1.0-SNAPSHOT")]
    #[case::timestamped("1.0-20070310.181613-3", "1.0-20070310.181613-3")]
    fn test_display_roundtrip(#[case] version: &str, #[case] expected: &str) {
        assert_eq!(SnapshotVersion::parse(version).unwrap().to_string(), expected);
    }

    #[test]
    fn test_directory_version() {
        assert_eq!(SnapshotVersion::parse("1.0-20070310.181613-3").unwrap().directory_version(), "1.0-SNAPSHOT");
    }

    const METADATA: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>org.apache</groupId>
  <artifactId>test</artifactId>
  <version>1.0-SNAPSHOT</version>
  <versioning>
    <snapshot>
      <timestamp>20070310.181613</timestamp>
      <buildNumber>3</buildNumber>
    </snapshot>
    <lastUpdated>20070310181613</lastUpdated>
  </versioning>
</metadata>"#;

    fn coordinate() -> ModuleCoordinate {
        "org.apache:test:1.0-SNAPSHOT".parse().unwrap()
    }

    #[tokio::test]
    async fn test_resolve_from_metadata() {
        let transport = MemoryTransport::new();
        transport.put("mem://r/org/apache/test/1.0-SNAPSHOT/maven-metadata.xml", METADATA);

        let resolved = resolve_snapshot(
            &transport,
            "mem://r/org/apache/test/1.0-SNAPSHOT/maven-metadata.xml",
            &coordinate(),
            SnapshotVersion::parse("1.0-SNAPSHOT").unwrap(),
        ).await.unwrap();

        assert_eq!(resolved.to_string(), "1.0-20070310.181613-3");
    }

    #[tokio::test]
    async fn test_missing_or_malformed_metadata_falls_back() {
        let transport = MemoryTransport::new();
        transport.put("mem://r/broken/maven-metadata.xml", b"<metadata><versioning>");

        for location in ["mem://r/missing/maven-metadata.xml", "mem://r/broken/maven-metadata.xml"] {
            let resolved = resolve_snapshot(&transport, location, &coordinate(), SnapshotVersion::parse("1.0-SNAPSHOT").unwrap())
                .await
                .unwrap();
            assert_eq!(resolved.to_string(), "1.0-SNAPSHOT");
        }
    }

    #[tokio::test]
    async fn test_unavailable_metadata_is_an_error() {
        let transport = MemoryTransport::new();
        transport.fail_below("mem://r/");

        let result = resolve_snapshot(&transport, "mem://r/x/maven-metadata.xml", &coordinate(), SnapshotVersion::parse("1.0-SNAPSHOT").unwrap()).await;
        assert!(matches!(result, Err(TransportError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_timestamped_needs_no_metadata() {
        let transport = MemoryTransport::new();
        transport.fail_below("mem://r/");

        let snapshot = SnapshotVersion::parse("1.0-20070310.181613-3").unwrap();
        let resolved = resolve_snapshot(&transport, "mem://r/x/maven-metadata.xml", &coordinate(), snapshot.clone()).await.unwrap();
        assert_eq!(resolved, snapshot);
    }
}
