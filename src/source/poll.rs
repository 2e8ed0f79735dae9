//! Periodic HTTP fetch

use log::{debug, info};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{DocumentSource, SourceError};
use crate::document::Document;

/// Fetches `url` once per interval and parses the body as one JSON object
///
/// The first fetch happens immediately. A fetch that overruns the interval delays
/// the next one; missed ticks are never queued up.
pub struct PollSource {
    url: String,
    agent: ureq::Agent,
    ticker: Interval,
    closed: CancellationToken,
    fetches: u64,
}

impl PollSource {
    pub fn new(url: impl Into<String>, interval: Duration, closed: CancellationToken) -> Self {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let url = url.into();
        info!("Polling {} every {:?}", url, interval);

        Self {
            url,
            agent: ureq::Agent::new_with_defaults(),
            ticker,
            closed,
            fetches: 0,
        }
    }
}

impl DocumentSource for PollSource {
    async fn next(&mut self) -> Result<Option<Document>, SourceError> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Ok(None),
            _ = self.ticker.tick() => {}
        }

        let agent = self.agent.clone();
        let url = self.url.clone();
        let fetch = tokio::task::spawn_blocking(move || fetch(&agent, &url));

        // An abandoned fetch finishes on the blocking pool and its result is dropped.
        let result = tokio::select! {
            biased;
            _ = self.closed.cancelled() => {
                debug!("poll source closed during fetch #{}", self.fetches + 1);
                return Ok(None);
            }
            result = fetch => result,
        };

        self.fetches += 1;
        let document = result.map_err(|e| SourceError::Task {
            url: self.url.clone(),
            message: e.to_string(),
        })??;
        debug!("fetch #{} of {} complete", self.fetches, self.url);

        Ok(Some(document))
    }

    fn close(&mut self) {
        self.closed.cancel();
    }
}

fn fetch(agent: &ureq::Agent, url: &str) -> Result<Document, SourceError> {
    let mut response = agent.get(url).call().map_err(|source| SourceError::Fetch {
        url: url.to_string(),
        source,
    })?;

    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|source| SourceError::Fetch {
            url: url.to_string(),
            source,
        })?;

    Document::parse(&body).map_err(|source| SourceError::Parse {
        origin: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetches_documents_in_order() {
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/stats",
            get(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { format!("{{\"hits\":{}}}", n) }
            }),
        );
        let base = serve(router).await;

        let mut source = PollSource::new(
            format!("{}/stats", base),
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        for expected in 1..=3 {
            let doc = source.next().await.unwrap().unwrap();
            assert_eq!(doc.number("hits").unwrap(), expected as f64);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_error_status_is_fatal() {
        let router = Router::new().route("/stats", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let base = serve(router).await;

        let mut source = PollSource::new(
            format!("{}/stats", base),
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        let err = source.next().await.unwrap_err();
        assert!(matches!(err, SourceError::Fetch { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_body_is_fatal() {
        let router = Router::new().route("/stats", get(|| async { "not json" }));
        let base = serve(router).await;

        let mut source = PollSource::new(
            format!("{}/stats", base),
            Duration::from_millis(10),
            CancellationToken::new(),
        );
        let err = source.next().await.unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_cancels_next_fetch() {
        let token = CancellationToken::new();
        let mut source = PollSource::new("http://127.0.0.1:9/unused", Duration::from_secs(3600), token.clone());

        // Consume the immediate first tick without fetching.
        source.ticker.tick().await;

        let pending = tokio::spawn(async move { source.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("poll source did not observe close")
            .unwrap();
        assert!(result.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_slow_fetch_delays_next_tick() {
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/stats",
            get(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n == 1 {
                        tokio::time::sleep(Duration::from_millis(350)).await;
                    }
                    format!("{{\"hits\":{}}}", n)
                }
            }),
        );
        let base = serve(router).await;

        let interval = Duration::from_millis(100);
        let mut source = PollSource::new(format!("{}/stats", base), interval, CancellationToken::new());

        let mut done = Vec::new();
        for _ in 0..3 {
            source.next().await.unwrap().unwrap();
            done.push(tokio::time::Instant::now());
        }

        // The overrun yields one catch-up fetch, then the interval applies again
        // instead of a burst of missed ticks.
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(
            done[2] - done[1] >= Duration::from_millis(80),
            "third fetch came {:?} after the second",
            done[2] - done[1]
        );
    }
}
