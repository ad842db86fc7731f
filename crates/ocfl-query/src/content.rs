use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use ocfl_index::IndexStore;
use ocfl_storage::ContentSource;
use ocfl_types::{ContentLocation, Digest};

use crate::error::{QueryError, QueryResult};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Content bytes for one digest, in chunks of at most the resolver's
/// chunk size. A read error ends the stream with that error.
pub struct ContentStream {
    pub location: ContentLocation,
    pub chunks: BoxStream<'static, std::io::Result<Bytes>>,
}

impl fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStream")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Opens content by digest. Only digests known to the index are served.
#[derive(Clone)]
pub struct ContentResolver {
    index: Arc<dyn IndexStore>,
    source: Arc<dyn ContentSource>,
    chunk_size: usize,
}

impl ContentResolver {
    pub fn new(index: Arc<dyn IndexStore>, source: Arc<dyn ContentSource>, chunk_size: usize) -> Self {
        Self {
            index,
            source,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn resolve(&self, digest: &str) -> QueryResult<ContentLocation> {
        let digest = Digest::parse(digest).map_err(|e| QueryError::InvalidArgument(e.to_string()))?;
        self.index
            .resolve_digest(&digest)?
            .ok_or_else(|| QueryError::NotFound(format!("content {digest}")))
    }

    pub async fn open(&self, digest: &str) -> QueryResult<ContentStream> {
        let location = self.resolve(digest)?;
        let reader = self.source.open(&location.path).await?;
        debug!(object = %location.object_id, path = %location.path, "streaming content");
        Ok(ContentStream {
            location,
            chunks: ReaderStream::with_capacity(reader, self.chunk_size).boxed(),
        })
    }
}
