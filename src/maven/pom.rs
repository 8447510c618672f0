use serde::Deserialize;

use crate::coordinates::ModuleCoordinate;
use crate::error::MetadataParseError;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Project {
    #[serde(default)]
    parent: Option<Parent>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Parent {
    group_id: String,
    artifact_id: String,
    version: String,
}

/// The parent POM a POM inherits from, if any
pub fn parse_parent(location: &str, content: &[u8]) -> Result<Option<ModuleCoordinate>, MetadataParseError> {
    let error = |reason: String| MetadataParseError {
        location: location.to_string(),
        reason,
    };

    let project: Project = serde_xml_rs::from_reader(content)
        .map_err(|e| error(e.to_string()))?;

    let parent = match project.parent {
        None => return Ok(None),
        Some(parent) => parent,
    };

    // a parent version can not be inherited, so any property reference is unresolvable
    if parent.version.contains("${") {
        return Err(error(format!("unresolvable parent version {}", parent.version)));
    }

    ModuleCoordinate::new(parent.group_id.trim(), parent.artifact_id.trim(), parent.version.trim(), "pom")
        .map(Some)
        .map_err(|e| error(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parent() {
        let pom = br#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <modelVersion>4.0.0</modelVersion>
  <parent>
    <groupId>org.example</groupId>
    <artifactId>parent</artifactId>
    <version>3</version>
  </parent>
  <artifactId>lib</artifactId>
  <dependencies>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13</version>
    </dependency>
  </dependencies>
</project>"#;

        let parent = parse_parent("lib.pom", pom).unwrap().unwrap();
        assert_eq!(parent.to_string(), "org.example:parent:3@pom");
        assert_eq!(parent.extension(), "pom");
    }

    #[test]
    fn test_no_parent() {
        let pom = br#"<project><groupId>org.example</groupId><artifactId>root</artifactId><version>1</version></project>"#;
        assert_eq!(parse_parent("root.pom", pom).unwrap(), None);
    }

    #[test]
    fn test_property_in_parent_version() {
        let pom = br#"<project><parent><groupId>g</groupId><artifactId>p</artifactId><version>${revision}</version></parent></project>"#;
        assert!(parse_parent("p.pom", pom).is_err());
    }

    #[test]
    fn test_incomplete_parent() {
        let pom = br#"<project><parent><groupId>g</groupId><version>1</version></parent></project>"#;
        assert!(parse_parent("p.pom", pom).is_err());
    }
}
