use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;

pub type ByteStream = Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send + 'static>>;

/// A resource body as it comes off the wire, plus the checksums the server announced for it (if any).
pub struct Blob {
    pub data: ByteStream,
    pub md5: Option<[u8;16]>,
    pub sha1: Option<[u8;20]>,
}

impl Blob {
    pub fn unchecked(data: ByteStream) -> Blob {
        Blob {
            data,
            md5: None,
            sha1: None,
        }
    }
}
