use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{create_dir_all, OpenOptions, read_dir, remove_dir, remove_file, rename, try_exists};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{error, trace};
use uuid::Uuid;

use crate::blob::blob_storage::{BlobStorage, RetrievedBlob, StoredBlob};
use crate::util::blob::ByteStream;

#[derive(Serialize, Deserialize)]
struct BlobMetaData {
    sha256: String,
    length: u64,
}


/// On-disk download cache for a single repository. Every resource gets its own directory
///  (mirroring the repository layout) holding the raw `data` and a `metadata.json` with its hash.
pub struct FsBlobStorage {
    root: PathBuf,
}
impl FsBlobStorage {
    pub fn new(root: PathBuf) -> FsBlobStorage {
        FsBlobStorage { root }
    }

    fn directory_path_for_key(&self, path: &str) -> anyhow::Result<PathBuf> {
        let mut result = self.root.clone();
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                bail!("refusing to store blob under unsafe path {:?}", path);
            }
            result.push(segment);
        }
        Ok(result)
    }

    fn sibling_path(directory_path: &Path, suffix: &str) -> anyhow::Result<PathBuf> {
        let file_name = directory_path.file_name()
            .ok_or_else(|| anyhow!("no file name in {}", directory_path.display()))?
            .to_string_lossy();
        Ok(directory_path.with_file_name(format!("{}.{}.{}", file_name, Uuid::new_v4().as_hyphenated(), suffix)))
    }

    async fn do_insert(
        directory_path: &Path,
        data: ByteStream,
    ) -> anyhow::Result<StoredBlob> {
        let mut data = data;

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(directory_path.join("data"))
            .await?;

        let mut hasher = Sha256::new();
        let mut length = 0u64;

        while let Some(bytes) = data.next().await {
            let bytes = bytes?;
            hasher.update(&bytes);
            length += bytes.len() as u64;
            file.write_all(&bytes).await?;
        }
        file.flush().await?;

        let metadata = BlobMetaData {
            sha256: hex::encode(hasher.finalize()),
            length,
        };

        let mut metadata_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(directory_path.join("metadata.json"))
            .await?;
        metadata_file.write_all(serde_json::to_string(&metadata)?.as_bytes())
            .await?;

        Ok(StoredBlob {
            sha256: metadata.sha256,
            length: metadata.length,
        })
    }

    /// Atomically renames the directory by adding ".deleting" as a suffix so that partial deletes
    ///  do not leave inconsistent state, then removes it.
    ///
    /// NB: This is racy with concurrent reads and can cause spurious failure in them
    async fn remove_blob_directory(directory_path: &Path) -> anyhow::Result<()> {
        let temp_path = Self::sibling_path(directory_path, "deleting")?;
        rename(directory_path, &temp_path).await?;

        let mut files = read_dir(&temp_path).await?;
        while let Some(dir_entry) = files.next_entry().await? {
            // If there is an entry that is not a file, or that is not removable, this
            //  returns an error.
            remove_file(&dir_entry.path()).await?;
        }

        remove_dir(temp_path).await?;
        Ok(())
    }
}


#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn insert(&self, path: &str, data: ByteStream) -> anyhow::Result<StoredBlob> {
        let directory_path = self.directory_path_for_key(path)?;
        let temp_directory_path = Self::sibling_path(&directory_path, "inserting")?;

        trace!("inserting file blob {} via {}", path, temp_directory_path.display());

        create_dir_all(&temp_directory_path).await?;

        match Self::do_insert(&temp_directory_path, data).await {
            Ok(stored) => {
                // a previous version of a mutable resource is replaced
                if try_exists(&directory_path).await? {
                    Self::remove_blob_directory(&directory_path).await?;
                }
                rename(&temp_directory_path, &directory_path).await?;
                Ok(stored)
            }
            Err(e) => {
                if let Err(cleanup) = Self::remove_blob_directory(&temp_directory_path).await {
                    error!("error cleaning up directory {} after failed attempt to insert: {}", temp_directory_path.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    async fn get(&self, path: &str) -> anyhow::Result<Option<RetrievedBlob>> {
        let directory_path = self.directory_path_for_key(path)?;
        trace!("getting file system blob {} from directory {}", path, directory_path.display());

        let data_path = directory_path.join("data");
        let metadata_path = directory_path.join("metadata.json");
        if !try_exists(&data_path).await? || !try_exists(&metadata_path).await? {
            return Ok(None);
        }

        let mut metadata_json = String::new();
        OpenOptions::new()
            .read(true)
            .open(metadata_path)
            .await?
            .read_to_string(&mut metadata_json)
            .await?;
        let metadata: BlobMetaData = serde_json::from_str(&metadata_json)?;

        let file = OpenOptions::new()
            .read(true)
            .open(data_path)
            .await?;

        Ok(Some(RetrievedBlob {
            data: Box::pin(ReaderStream::new(file).map_err(anyhow::Error::from)),
            sha256: metadata.sha256,
        }))
    }

    async fn delete(&self, path: &str) -> anyhow::Result<bool> {
        let directory_path = self.directory_path_for_key(path)?;
        trace!("deleting file system blob {} from directory {}", path, directory_path.display());
        if try_exists(&directory_path).await? {
            Self::remove_blob_directory(&directory_path).await?;
            Ok(true)
        }
        else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use futures::stream;
    use super::*;
    use crate::util::sha256_hex;

    fn data(content: &'static [u8]) -> ByteStream {
        Box::pin(stream::iter(vec![Ok(Bytes::from_static(content))]))
    }

    async fn read(storage: &FsBlobStorage, path: &str) -> Option<(Vec<u8>, String)> {
        let blob = storage.get(path).await.unwrap()?;
        let chunks: Vec<Bytes> = blob.data.try_collect().await.unwrap();
        Some((chunks.concat(), blob.sha256))
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsBlobStorage::new(dir.path().to_path_buf());

        let stored = storage.insert("org/example/lib/1.0/lib-1.0.jar", data(b"jar content")).await.unwrap();
        assert_eq!(stored.sha256, sha256_hex(b"jar content"));
        assert_eq!(stored.length, 11);

        let (content, sha256) = read(&storage, "org/example/lib/1.0/lib-1.0.jar").await.unwrap();
        assert_eq!(content, b"jar content");
        assert_eq!(sha256, stored.sha256);

        assert!(storage.delete("org/example/lib/1.0/lib-1.0.jar").await.unwrap());
        assert!(!storage.delete("org/example/lib/1.0/lib-1.0.jar").await.unwrap());
        assert!(read(&storage, "org/example/lib/1.0/lib-1.0.jar").await.is_none());
    }

    #[tokio::test]
    async fn test_insert_replaces_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsBlobStorage::new(dir.path().to_path_buf());

        storage.insert("a/b-SNAPSHOT.pom", data(b"old")).await.unwrap();
        storage.insert("a/b-SNAPSHOT.pom", data(b"new")).await.unwrap();

        assert_eq!(read(&storage, "a/b-SNAPSHOT.pom").await.unwrap().0, b"new");
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsBlobStorage::new(dir.path().to_path_buf());

        let failing: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(anyhow!("connection reset")),
        ]));
        assert!(storage.insert("a/b.jar", failing).await.is_err());

        assert!(read(&storage, "a/b.jar").await.is_none());
        let leftovers = std::fs::read_dir(dir.path().join("a")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsBlobStorage::new(dir.path().to_path_buf());

        assert!(storage.insert("../escape.jar", data(b"x")).await.is_err());
        assert!(storage.insert("a//b.jar", data(b"x")).await.is_err());
    }
}
