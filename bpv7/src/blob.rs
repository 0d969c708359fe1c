/*!
Storage for block data too large to hold as a plain value, chiefly payloads.

The codec asks a [`BlobFactory`] for a sink when a payload starts to arrive,
writes each chunk into it as it is decoded, and keeps the finished [`Blob`]
in the block.  Where the bytes live is the factory's business.
*/
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Blob of {size} bytes exceeds the limit of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error(transparent)]
    Backend(#[from] Box<dyn core::error::Error + Send + Sync>),
}

/// A complete, immutable run of bytes that can be read any number of times
pub trait Blob: core::fmt::Debug + Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn chunks(&self) -> Box<dyn Iterator<Item = Bytes> + Send + '_>;

    fn to_vec(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(self.len() as usize);
        for chunk in self.chunks() {
            v.extend_from_slice(&chunk);
        }
        v
    }
}

/// A blob being written
pub trait BlobSink: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), Error>;

    fn finish(self: Box<Self>) -> Result<Box<dyn Blob>, Error>;
}

pub trait BlobFactory: Send + Sync {
    /// `size_hint` is the declared length, `None` when the data is
    /// streamed with no length up front
    fn create_blob(&self, size_hint: Option<u64>) -> Result<Box<dyn BlobSink>, Error>;
}

/// Keeps blobs in memory, refusing any larger than `max_size`
#[derive(Debug, Clone)]
pub struct VolatileBlobFactory {
    max_size: u64,
}

impl VolatileBlobFactory {
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }
}

impl Default for VolatileBlobFactory {
    fn default() -> Self {
        Self::new(16 * 1024 * 1024)
    }
}

impl BlobFactory for VolatileBlobFactory {
    fn create_blob(&self, size_hint: Option<u64>) -> Result<Box<dyn BlobSink>, Error> {
        match size_hint {
            Some(size) if size > self.max_size => {
                return Err(Error::TooLarge {
                    size,
                    max: self.max_size,
                });
            }
            _ => {}
        }
        Ok(Box::new(VolatileSink {
            blob: VolatileBlob::default(),
            max_size: self.max_size,
        }))
    }
}

struct VolatileSink {
    blob: VolatileBlob,
    max_size: u64,
}

impl BlobSink for VolatileSink {
    fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        let size = self.blob.len + data.len() as u64;
        if size > self.max_size {
            return Err(Error::TooLarge {
                size,
                max: self.max_size,
            });
        }
        if !data.is_empty() {
            self.blob.chunks.push(Bytes::copy_from_slice(data));
            self.blob.len = size;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Box<dyn Blob>, Error> {
        Ok(Box::new(self.blob))
    }
}

#[derive(Debug, Default, Clone)]
pub struct VolatileBlob {
    chunks: Vec<Bytes>,
    len: u64,
}

impl Blob for VolatileBlob {
    fn len(&self) -> u64 {
        self.len
    }

    fn chunks(&self) -> Box<dyn Iterator<Item = Bytes> + Send + '_> {
        Box::new(self.chunks.iter().cloned())
    }
}

impl From<Vec<u8>> for VolatileBlob {
    fn from(value: Vec<u8>) -> Self {
        let len = value.len() as u64;
        Self {
            chunks: if value.is_empty() {
                Vec::new()
            } else {
                vec![value.into()]
            },
            len,
        }
    }
}

impl From<&[u8]> for VolatileBlob {
    fn from(value: &[u8]) -> Self {
        value.to_vec().into()
    }
}
