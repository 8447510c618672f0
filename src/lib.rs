pub mod blob;
pub mod config;
pub mod coordinates;
pub mod error;
pub mod ivy;
pub mod manifest;
pub mod maven;
pub mod repository;
pub mod resolve;
pub mod transport;
pub mod util;

#[cfg(test)]
mod test_support;
