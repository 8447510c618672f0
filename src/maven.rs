//! Maven repository layout: artifact paths, snapshot versions resolved through
//!  `maven-metadata.xml`, and POM parent references.

pub mod metadata_xml;
pub mod paths;
pub mod pom;
pub mod snapshot;
