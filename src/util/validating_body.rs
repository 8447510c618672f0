use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::anyhow;
use bytes::Bytes;
use futures_core::{ready, Stream};
use pin_project_lite::pin_project;
use sha1::{Digest, Sha1};
use sha1::digest::consts::U20;
use sha1::digest::generic_array::GenericArray;
use tracing::trace;

use crate::util::blob::Blob;

pin_project! {
    /// Wraps a byte stream, passing its data through unchanged while feeding it to validators
    ///  that need to see the entire body (e.g. checksum checks).
    ///
    /// If validation fails, an error is appended to the stream after the last chunk. Once an error
    ///  was returned, the stream stops polling upstream and keeps returning errors.
    pub struct ValidatingBody<S> {
        #[pin]
        body: S,
        validators: Vec<Box<dyn BodyValidator>>,
        is_failed: bool,
    }
}

impl<S> ValidatingBody<S> {
    pub fn new(body: S, validators: Vec<Box<dyn BodyValidator>>) -> ValidatingBody<S> {
        ValidatingBody {
            body,
            validators,
            is_failed: false,
        }
    }
}

impl ValidatingBody<crate::util::blob::ByteStream> {
    /// validates against whatever checksums the server announced for the blob
    pub fn for_blob(blob: Blob) -> Self {
        let mut validators: Vec<Box<dyn BodyValidator>> = vec![];
        if let Some(sha1) = blob.sha1 {
            validators.push(Box::new(Sha1BodyValidator::new(sha1)));
        }
        if let Some(md5) = blob.md5 {
            validators.push(Box::new(Md5BodyValidator::new(md5)));
        }
        ValidatingBody::new(blob.data, validators)
    }
}

impl<S: Stream<Item = anyhow::Result<Bytes>>> Stream for ValidatingBody<S> {
    type Item = anyhow::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.is_failed {
            return Poll::Ready(Some(Err(anyhow!("polling from failed stream"))));
        }

        let this = self.project();
        match ready!(this.body.poll_next(cx)) {
            Some(Ok(data)) => {
                for validator in this.validators.iter_mut() {
                    validator.add_data(&data);
                }
                Poll::Ready(Some(Ok(data)))
            }
            None => {
                // wrapped body is fully drained -> finalize validation
                match this.validators.iter().find(|v| !v.do_validate()) {
                    None => Poll::Ready(None),
                    Some(failed) => {
                        *this.is_failed = true;
                        Poll::Ready(Some(Err(anyhow!("{} checksum announced by the server does not match the body", failed.name()))))
                    }
                }
            }
            Some(Err(e)) => {
                *this.is_failed = true;
                Poll::Ready(Some(Err(e)))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.body.size_hint()
    }
}

pub trait BodyValidator: Send {
    fn name(&self) -> &'static str;
    fn add_data(&mut self, data: &Bytes);
    fn do_validate(&self) -> bool;
}

pub struct Sha1BodyValidator {
    hasher: Sha1,
    expected_hash: GenericArray<u8, U20>,
}
impl Sha1BodyValidator {
    pub fn new(expected_hash: [u8; 20]) -> Sha1BodyValidator {
        Sha1BodyValidator {
            hasher: Default::default(),
            expected_hash: expected_hash.into(),
        }
    }
}
impl BodyValidator for Sha1BodyValidator {
    fn name(&self) -> &'static str {
        "SHA1"
    }

    fn add_data(&mut self, data: &Bytes) {
        self.hasher.update(data);
    }

    fn do_validate(&self) -> bool {
        let hash = self.hasher.clone().finalize();
        trace!("validating SHA1 hash");
        hash == self.expected_hash
    }
}

pub struct Md5BodyValidator {
    context: md5::Context,
    expected_hash: [u8; 16],
}
impl Md5BodyValidator {
    pub fn new(expected_hash: [u8; 16]) -> Md5BodyValidator {
        Md5BodyValidator {
            context: md5::Context::new(),
            expected_hash,
        }
    }
}
impl BodyValidator for Md5BodyValidator {
    fn name(&self) -> &'static str {
        "MD5"
    }

    fn add_data(&mut self, data: &Bytes) {
        self.context.consume(data);
    }

    fn do_validate(&self) -> bool {
        let hash: [u8;16] = self.context.clone()
            .compute()
            .into();
        trace!("validating MD5 hash");
        hash == self.expected_hash
    }
}
