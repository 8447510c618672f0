use serde::Deserialize;

use crate::coordinates::ModuleCoordinate;
use crate::error::MetadataParseError;

#[derive(Deserialize, Debug)]
struct IvyModule {
    info: Info,
}

#[derive(Deserialize, Debug)]
struct Info {
    #[serde(default)]
    extends: Vec<Extends>,
}

#[derive(Deserialize, Debug)]
struct Extends {
    organisation: String,
    module: String,
    revision: String,
}

/// The descriptors an `ivy.xml` extends, as declared in `<info><extends .../></info>`
pub fn parse_extends(location: &str, content: &[u8]) -> Result<Vec<ModuleCoordinate>, MetadataParseError> {
    let error = |reason: String| MetadataParseError {
        location: location.to_string(),
        reason,
    };

    let module: IvyModule = serde_xml_rs::from_reader(content)
        .map_err(|e| error(e.to_string()))?;

    module.info.extends.iter()
        .map(|extends| {
            if is_dynamic(&extends.revision) {
                return Err(error(format!("dynamic revision {} of extended module {}", extends.revision, extends.module)));
            }
            ModuleCoordinate::new(&extends.organisation, &extends.module, &extends.revision, "ivy")
                .map_err(|e| error(e.to_string()))
        })
        .collect()
}

/// version ranges and 'latest.xyz' need a version selection, which is the build tool's job
fn is_dynamic(revision: &str) -> bool {
    revision.starts_with("latest.")
        || revision.ends_with('+')
        || revision.contains(|c| matches!(c, '[' | ']' | '(' | ')' | ','))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_extends() {
        let ivy = br#"<?xml version="1.0" encoding="UTF-8"?>
<ivy-module version="2.0">
  <info organisation="org.example" module="lib" revision="1.0" status="release">
    <extends organisation="org.example" module="parent" revision="2.0" extendType="configurations"/>
  </info>
  <configurations>
    <conf name="default"/>
  </configurations>
  <publications>
    <artifact name="lib" type="jar" ext="jar"/>
  </publications>
</ivy-module>"#;

        let extended = parse_extends("ivy-1.0.xml", ivy).unwrap();
        assert_eq!(extended.len(), 1);
        assert_eq!(extended[0].to_string(), "org.example:parent:2.0@ivy");
        assert_eq!(extended[0].extension(), "xml");
    }

    #[test]
    fn test_without_extends() {
        let ivy = br#"<ivy-module version="2.0"><info organisation="o" module="m" revision="1"/></ivy-module>"#;
        assert!(parse_extends("ivy.xml", ivy).unwrap().is_empty());
    }

    #[test]
    fn test_dynamic_revision() {
        let ivy = br#"<ivy-module version="2.0"><info organisation="o" module="m" revision="1"><extends organisation="o" module="p" revision="latest.integration"/></info></ivy-module>"#;
        assert!(parse_extends("ivy.xml", ivy).is_err());
    }

    #[test]
    fn test_not_an_ivy_file() {
        assert!(parse_extends("ivy.xml", b"<project><parent/></project>").is_err());
    }
}
