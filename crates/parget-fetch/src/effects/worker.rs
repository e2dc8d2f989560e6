use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::core::{ByteRange, content_range};
use crate::effects::file::OutputFile;
use crate::effects::http::{HttpClient, ResponseHead};
use crate::effects::progress::RangeReporter;
use crate::error::{Error, Result, Stage};

/// Largest slice handed to a single positional write.
pub(crate) const CHUNK_SIZE: usize = 32 * 1024;

/// How a worker asks for its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchMode {
    /// `GET` with a `Range` header, answered with 206.
    Ranged,
    /// Plain `GET` of the whole resource, answered with 200.
    Full,
}

/// Downloads one byte range into the shared output file.
pub(crate) struct RangeWorker<C> {
    pub client: Arc<C>,
    pub url: Arc<str>,
    pub headers: Arc<[(String, String)]>,
    pub file: Arc<OutputFile>,
    pub range: ByteRange,
    pub total_size: u64,
    pub mode: FetchMode,
    pub reporter: RangeReporter,
    pub cancel: CancellationToken,
}

impl<C: HttpClient> RangeWorker<C> {
    /// Fetch the range and report the outcome. Returns the bytes written.
    pub async fn run(mut self) -> Result<u64> {
        let index = self.range.index;
        let result = self.fetch().await;

        match &result {
            Ok(bytes) => {
                self.reporter.finish();
                debug!(range = index, bytes, "part finished");
            }
            Err(e) => {
                self.reporter.fail();
                if e.is_cancelled() {
                    debug!(range = index, "part cancelled");
                } else {
                    warn!(range = index, error = %e, "part failed");
                }
            }
        }
        result
    }

    async fn fetch(&mut self) -> Result<u64> {
        let index = self.range.index;
        let stage = Stage::Range(index);
        let expected = self.range.len();
        self.reporter.set_total(expected);

        if self.range.is_empty() {
            return Ok(0);
        }

        let range_header = match self.mode {
            FetchMode::Ranged => self.range.header_value(),
            FetchMode::Full => None,
        };
        debug!(range = index, offset = self.range.start, bytes = expected, "requesting part");

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            response = self.client.get(&self.url, range_header.as_deref(), &self.headers) => {
                response.map_err(|e| Error::network(stage, e))?
            }
        };
        self.check_head(&response.head, range_header.as_deref())?;

        let mut body = response.body;
        let mut cursor = self.range.start;
        let mut written = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                next = body.next() => next,
            };
            let Some(buf) = next else { break };
            let mut buf = buf.map_err(|e| Error::network(stage, e))?;

            if written + buf.len() as u64 > expected {
                return Err(Error::Overrun { index, expected });
            }

            while !buf.is_empty() {
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let chunk = buf.split_to(buf.len().min(CHUNK_SIZE));
                let len = chunk.len();
                self.write_chunk(chunk, cursor).await?;
                cursor += len as u64;
                written += len as u64;
                self.reporter.advance(written);
            }
        }

        if written != expected {
            return Err(Error::ShortRead {
                index,
                expected,
                received: written,
            });
        }
        Ok(written)
    }

    fn check_head(&self, head: &ResponseHead, requested: Option<&str>) -> Result<()> {
        let index = self.range.index;
        let expected = self.range.len();
        let whole = self.range.start == 0 && self.range.end == self.total_size;

        let status_ok = match self.mode {
            FetchMode::Ranged => head.status == 206 || (head.status == 200 && whole),
            FetchMode::Full => head.status == 200,
        };
        if !status_ok {
            return Err(Error::HttpStatus {
                stage: Stage::Range(index),
                status: head.status,
            });
        }

        let served = head.content_range.as_deref().and_then(content_range);
        if head.status == 206 {
            if let Some(served) = served {
                if served.first != self.range.start || Some(served.last) != self.range.last() {
                    return Err(Error::RangeMismatch {
                        index,
                        requested: requested.unwrap_or_default().to_string(),
                        served: head.content_range.clone().unwrap_or_default(),
                    });
                }
            }
        }

        let declared = head
            .content_length
            .or_else(|| served.and_then(|r| r.body_len()));
        if let Some(declared) = declared {
            if declared != expected {
                return Err(Error::LengthMismatch {
                    index,
                    expected,
                    declared,
                });
            }
        }
        Ok(())
    }

    async fn write_chunk(&self, chunk: Bytes, offset: u64) -> Result<()> {
        let index = self.range.index;
        let len = chunk.len();

        let written = self
            .file
            .write_at(chunk, offset)
            .await
            .map_err(|source| Error::Write {
                index,
                offset,
                source,
            })?;

        if written < len {
            return Err(Error::ShortWrite {
                index,
                offset,
                written,
                len,
            });
        }
        trace!(range = index, offset, bytes = len, "chunk written");
        Ok(())
    }
}
