//! Document sources
//!
//! A source yields parsed JSON documents one at a time until it runs out or is closed:
//! - Line: one JSON object per line of a reader (stdin in practice)
//! - Poll: HTTP GET against a URL on a fixed interval
//!
//! Closing is cooperative. Every source carries a cancellation token; once it is
//! cancelled, a pending or future `next()` returns `Ok(None)` as if input had ended.

use std::future::Future;
use thiserror::Error;

use crate::document::Document;

pub mod line;
pub mod poll;

pub use line::LineSource;
pub use poll::PollSource;

/// Errors raised while producing documents
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read input")]
    Read(#[from] std::io::Error),
    #[error("invalid JSON document at {origin}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot fetch {url}")]
    Fetch {
        url: String,
        #[source]
        source: ureq::Error,
    },
    #[error("fetch of {url} did not complete: {message}")]
    Task { url: String, message: String },
}

/// Something that produces documents in order, each exactly once
pub trait DocumentSource {
    /// Next document, or `None` once input is exhausted or the source was closed
    fn next(&mut self) -> impl Future<Output = Result<Option<Document>, SourceError>> + Send;

    /// Release held resources; calling it more than once is harmless
    fn close(&mut self);
}

/// Source selected at startup
pub enum Source {
    Line(LineSource<tokio::io::BufReader<tokio::io::Stdin>>),
    Poll(PollSource),
}

impl DocumentSource for Source {
    async fn next(&mut self) -> Result<Option<Document>, SourceError> {
        match self {
            Source::Line(source) => source.next().await,
            Source::Poll(source) => source.next().await,
        }
    }

    fn close(&mut self) {
        match self {
            Source::Line(source) => source.close(),
            Source::Poll(source) => source.close(),
        }
    }
}
