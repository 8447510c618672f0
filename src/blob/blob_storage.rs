use async_trait::async_trait;

use crate::util::blob::ByteStream;

/// What storage knows about a blob after it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// lower-case hex
    pub sha256: String,
    pub length: u64,
}

pub struct RetrievedBlob {
    pub data: ByteStream,
    pub sha256: String,
}

/// A repository-local download cache, keyed by the resource's path relative to the repository root.
///
/// Inserting computes the SHA-256 of the data while it is written, so downloading a resource and
///  hashing it is a single pass.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn insert(&self, path: &str, data: ByteStream) -> anyhow::Result<StoredBlob>;

    async fn get(&self, path: &str) -> anyhow::Result<Option<RetrievedBlob>>;

    async fn delete(&self, path: &str) -> anyhow::Result<bool>;
}
