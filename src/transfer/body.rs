//! Upload sources read in part-sized chunks.

use super::TransferSource;
use crate::error::TransferError;
use bytes::{Bytes, BytesMut};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt};

enum Inner {
    Bytes(Bytes),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

/// An opened [`TransferSource`].
///
/// In-memory sources are split without copying. Files and readers are read
/// one chunk at a time, so at most the chunks the caller holds are buffered.
pub(super) struct ChunkedBody {
    inner: Inner,
    path: Option<PathBuf>,
    declared: Option<u64>,
    received: u64,
}

impl ChunkedBody {
    pub(super) async fn open(source: TransferSource) -> Result<Self, TransferError> {
        let (inner, path, declared) = match source {
            TransferSource::Bytes(data) => (Inner::Bytes(data), None, None),
            TransferSource::File(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| TransferError::file(&path, e))?;
                (Inner::Reader(Box::new(file)), Some(path), None)
            }
            TransferSource::Reader {
                reader,
                content_length: None,
            } => (Inner::Reader(reader), None, None),
            TransferSource::Reader {
                reader,
                content_length: Some(expected),
            } => (Inner::Reader(Box::new(reader.take(expected))), None, Some(expected)),
        };
        Ok(Self {
            inner,
            path,
            declared,
            received: 0,
        })
    }

    /// Read the next chunk of `size` bytes, or fewer at the end of the
    /// source. `None` once the source is exhausted.
    pub(super) async fn next_chunk(&mut self, size: usize) -> Result<Option<Bytes>, TransferError> {
        let chunk = match &mut self.inner {
            Inner::Bytes(data) => {
                let n = size.min(data.len());
                data.split_to(n)
            }
            Inner::Reader(reader) => {
                let mut buf = vec![0u8; size];
                let mut filled = 0;
                while filled < size {
                    match reader.read(&mut buf[filled..]).await {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => return Err(read_error(&self.path, e)),
                    }
                }
                buf.truncate(filled);
                Bytes::from(buf)
            }
        };

        if chunk.is_empty() {
            return match self.declared {
                Some(expected) if self.received < expected => Err(TransferError::IncompleteBody {
                    expected,
                    received: self.received,
                }),
                _ => Ok(None),
            };
        }
        self.received += chunk.len() as u64;
        Ok(Some(chunk))
    }
}

fn read_error(path: &Option<PathBuf>, e: std::io::Error) -> TransferError {
    match path {
        Some(p) => TransferError::file(p, e),
        None => TransferError::stream(e),
    }
}

/// Join chunks into one buffer, without copying when there is only one.
pub(super) fn concat(mut chunks: Vec<Bytes>) -> Bytes {
    match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.swap_remove(0),
        _ => {
            let mut joined = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
            for chunk in &chunks {
                joined.extend_from_slice(chunk);
            }
            joined.freeze()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn chunks(source: TransferSource, size: usize) -> Result<Vec<Bytes>, TransferError> {
        let mut body = ChunkedBody::open(source).await?;
        let mut out = Vec::new();
        while let Some(chunk) = body.next_chunk(size).await? {
            out.push(chunk);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_bytes_split_into_chunks() {
        let out = chunks(TransferSource::bytes("abcdefg"), 3).await.unwrap();
        assert_eq!(out, vec!["abc", "def", "g"]);
    }

    #[tokio::test]
    async fn test_reader_chunks_are_full_until_the_end() {
        // a reader that hands out one byte per read
        let (client, mut server) = tokio::io::duplex(1);
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            server.write_all(b"abcdefg").await.unwrap();
        });
        let out = chunks(TransferSource::reader(client), 3).await.unwrap();
        assert_eq!(out, vec!["abc", "def", "g"]);
    }

    #[tokio::test]
    async fn test_reader_shorter_than_declared() {
        let source = TransferSource::reader_with_length(&b"abc"[..], 5);
        match chunks(source, 2).await {
            Err(TransferError::IncompleteBody { expected, received }) => {
                assert_eq!(expected, 5);
                assert_eq!(received, 3);
            }
            other => panic!("Expected IncompleteBody, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reader_longer_than_declared_is_truncated() {
        let source = TransferSource::reader_with_length(&b"abcdef"[..], 4);
        let out = chunks(source, 16).await.unwrap();
        assert_eq!(concat(out), Bytes::from_static(b"abcd"));
    }

    #[tokio::test]
    async fn test_empty_source_has_no_chunks() {
        assert!(chunks(TransferSource::bytes(""), 4).await.unwrap().is_empty());
        assert_eq!(concat(Vec::new()), Bytes::new());
    }

    #[test]
    fn test_concat_joins_in_order() {
        let joined = concat(vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]);
        assert_eq!(joined, Bytes::from_static(b"abcd"));
    }
}
