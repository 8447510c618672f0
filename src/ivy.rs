//! Ivy repository layout: pattern templates and `ivy.xml` descriptors.

pub mod descriptor;
pub mod pattern;
