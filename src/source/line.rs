//! Newline-delimited JSON from a reader

use log::debug;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;

use super::{DocumentSource, SourceError};
use crate::document::Document;

/// Reads one JSON object per line
pub struct LineSource<R> {
    lines: Lines<R>,
    closed: CancellationToken,
    line_no: usize,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, closed: CancellationToken) -> Self {
        Self {
            lines: reader.lines(),
            closed,
            line_no: 0,
        }
    }
}

impl LineSource<BufReader<Stdin>> {
    pub fn stdin(closed: CancellationToken) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), closed)
    }
}

impl<R> DocumentSource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next(&mut self) -> Result<Option<Document>, SourceError> {
        let line = tokio::select! {
            biased;
            _ = self.closed.cancelled() => {
                debug!("line source closed after {} lines", self.line_no);
                return Ok(None);
            }
            line = self.lines.next_line() => line?,
        };

        let Some(line) = line else {
            debug!("end of input after {} lines", self.line_no);
            return Ok(None);
        };
        self.line_no += 1;

        Document::parse(&line).map(Some).map_err(|source| SourceError::Parse {
            origin: format!("line {}", self.line_no),
            source,
        })
    }

    fn close(&mut self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn source(input: &'static str) -> LineSource<&'static [u8]> {
        LineSource::new(input.as_bytes(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_reads_lines_in_order() {
        let mut source = source("{\"n\":1}\n{\"n\":2}\n");
        assert_eq!(source.next().await.unwrap().unwrap().number("n").unwrap(), 1.0);
        assert_eq!(source.next().await.unwrap().unwrap().number("n").unwrap(), 2.0);
        assert!(source.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let mut source = source("{\"n\":7}");
        assert_eq!(source.next().await.unwrap().unwrap().number("n").unwrap(), 7.0);
        assert!(source.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_line_is_fatal() {
        let mut source = source("{\"n\":1}\nnot json\n");
        source.next().await.unwrap();
        let err = source.next().await.unwrap_err();
        assert!(matches!(err, SourceError::Parse { ref origin, .. } if origin == "line 2"));
    }

    #[tokio::test]
    async fn test_non_object_line_is_fatal() {
        let mut source = source("[1,2,3]\n");
        assert!(source.next().await.is_err());
    }

    #[tokio::test]
    async fn test_closed_source_ends() {
        let mut source = source("{\"n\":1}\n");
        source.close();
        source.close();
        assert!(source.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_reader() {
        let (_writer, reader) = tokio::io::duplex(64);
        let token = CancellationToken::new();
        let mut source = LineSource::new(BufReader::new(reader), token.clone());

        let pending = tokio::spawn(async move { source.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("source did not observe close")
            .unwrap();
        assert!(result.unwrap().is_none());
    }
}
