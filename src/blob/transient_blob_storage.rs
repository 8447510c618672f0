use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::blob::blob_storage::{BlobStorage, RetrievedBlob, StoredBlob};
use crate::util::blob::ByteStream;

/// in-memory blob storage, neither optimized nor particularly robust - for testing purposes
#[derive(Default)]
pub struct TransientBlobStorage {
    data: Mutex<HashMap<String, (Bytes, String)>>,
}
impl TransientBlobStorage {
    pub fn new() -> TransientBlobStorage {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStorage for TransientBlobStorage {
    async fn insert(&self, path: &str, data: ByteStream) -> anyhow::Result<StoredBlob> {
        let mut data = data;

        let mut data_vec = Vec::new();
        let mut hasher = Sha256::new();

        while let Some(bytes) = data.next().await {
            let bytes = bytes?;
            hasher.update(&bytes);
            data_vec.extend_from_slice(&bytes);
        }

        let stored = StoredBlob {
            sha256: hex::encode(hasher.finalize()),
            length: data_vec.len() as u64,
        };

        self.data.lock()
            .insert(path.to_string(), (Bytes::from(data_vec), stored.sha256.clone()));

        Ok(stored)
    }

    async fn get(&self, path: &str) -> anyhow::Result<Option<RetrievedBlob>> {
        let lock = self.data.lock();

        if let Some((bytes, sha256)) = lock.get(path) {
            let bytes = bytes.clone();
            let stream = futures::stream::once(async move { Ok::<_, anyhow::Error>(bytes) });

            Ok(Some(RetrievedBlob {
                data: Box::pin(stream),
                sha256: sha256.clone(),
            }))
        }
        else {
            Ok(None)
        }
    }

    async fn delete(&self, path: &str) -> anyhow::Result<bool> {
        Ok(self.data.lock()
            .remove(path)
            .is_some()
        )
    }
}
