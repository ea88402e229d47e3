//! Data sources for stream load requests.
//!
//! A load may be sent more than once when retries are enabled, so a source is
//! either *replayable* (in-memory bytes, a file reopened per attempt) or
//! *single-pass* (an arbitrary byte stream). A single-pass source is only ever
//! sent once: after the first attempt has consumed it there is nothing left to
//! resend, and the retry loop stops instead of sending a truncated body.
//! Callers that need retries for streamed data should buffer it or write it to
//! a file first.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use reqwest::Body;
use serde::Serialize;

type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync + 'static>>;

/// The data sent as the body of a stream load request.
pub struct LoadSource {
    kind: SourceKind,
}

enum SourceKind {
    Bytes(Bytes),
    File(PathBuf),
    Stream(Option<ByteStream>),
}

impl LoadSource {
    /// In-memory data. Cheap to resend.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self {
            kind: SourceKind::Bytes(data.into()),
        }
    }

    /// A file on disk, reopened for every attempt.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: SourceKind::File(path.into()),
        }
    }

    /// A single-pass byte stream. Sent at most once.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self {
            kind: SourceKind::Stream(Some(Box::pin(stream))),
        }
    }

    /// Serializes a value as one JSON document, e.g. an array for
    /// [`JsonFormat::Array`](crate::config::JsonFormat::Array).
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        Ok(Self::bytes(serde_json::to_vec(value)?))
    }

    /// Serializes each row as one line of JSON, for
    /// [`JsonFormat::ObjectLine`](crate::config::JsonFormat::ObjectLine).
    pub fn json_lines<I, T>(rows: I) -> serde_json::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Serialize,
    {
        let mut buf = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buf, &row)?;
            buf.push(b'\n');
        }
        Ok(Self::bytes(buf))
    }

    /// Whether the source can be sent again after a failed attempt.
    pub fn is_replayable(&self) -> bool {
        !matches!(self.kind, SourceKind::Stream(_))
    }

    /// Produces the request body for the next attempt.
    ///
    /// Returns `Ok(None)` once a single-pass source has been used.
    pub(crate) async fn next_body(&mut self) -> io::Result<Option<Body>> {
        match &mut self.kind {
            SourceKind::Bytes(data) => Ok(Some(Body::from(data.clone()))),
            SourceKind::File(path) => {
                let file = tokio::fs::File::open(&*path).await?;
                Ok(Some(Body::from(file)))
            }
            SourceKind::Stream(stream) => Ok(stream.take().map(Body::wrap_stream)),
        }
    }
}

impl fmt::Debug for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SourceKind::Bytes(data) => write!(f, "LoadSource::Bytes({} bytes)", data.len()),
            SourceKind::File(path) => write!(f, "LoadSource::File({:?})", path),
            SourceKind::Stream(Some(_)) => write!(f, "LoadSource::Stream"),
            SourceKind::Stream(None) => write!(f, "LoadSource::Stream(consumed)"),
        }
    }
}

impl From<String> for LoadSource {
    fn from(data: String) -> Self {
        Self::bytes(data)
    }
}

impl From<&'static str> for LoadSource {
    fn from(data: &'static str) -> Self {
        Self::bytes(data)
    }
}

impl From<Vec<u8>> for LoadSource {
    fn from(data: Vec<u8>) -> Self {
        Self::bytes(data)
    }
}

impl From<Bytes> for LoadSource {
    fn from(data: Bytes) -> Self {
        Self::bytes(data)
    }
}

impl From<PathBuf> for LoadSource {
    fn from(path: PathBuf) -> Self {
        Self::file(path)
    }
}
