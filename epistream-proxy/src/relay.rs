//! Response relay: header allow-list and a metered body stream

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName};
use epistream_core::MetricsSink;
use futures::stream::{BoxStream, Stream};

use crate::policy::sanitize;

/// Upstream headers relayed to the client.
pub static RELAYED_HEADERS: [HeaderName; 8] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::ETAG,
    header::LAST_MODIFIED,
    header::CACHE_CONTROL,
    header::CONTENT_DISPOSITION,
];

/// Copy the allow-listed headers, stripping CR/LF from values.
pub fn copy_headers(upstream: &HeaderMap, out: &mut HeaderMap) {
    for name in &RELAYED_HEADERS {
        if let Some(value) = upstream.get(name).and_then(sanitize) {
            out.insert(name.clone(), value);
        }
    }
}

/// Upstream body that counts relayed bytes and records how the stream ended.
///
/// The terminal state is recorded on drop: `completed` when the upstream
/// reached its end, `aborted` when the client went away or the upstream
/// failed mid-stream. Dropping also drops the upstream response, which
/// closes the upstream connection.
pub struct MeteredStream {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    metrics: Arc<dyn MetricsSink>,
    target: String,
    bytes: u64,
    finished: bool,
}

impl MeteredStream {
    pub fn new(
        inner: BoxStream<'static, reqwest::Result<Bytes>>,
        metrics: Arc<dyn MetricsSink>,
        target: String,
    ) -> Self {
        Self {
            inner,
            metrics,
            target,
            bytes: 0,
            finished: false,
        }
    }
}

impl Stream for MeteredStream {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                // headers are already out; the error tears the connection down
                tracing::warn!(
                    target_url = %self.target,
                    bytes = self.bytes,
                    error = %e,
                    "Upstream stream failed mid-body"
                );
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for MeteredStream {
    fn drop(&mut self) {
        let outcome = if self.finished { "completed" } else { "aborted" };
        tracing::debug!(target_url = %self.target, bytes = self.bytes, outcome, "Proxy stream closed");
        self.metrics.record_proxy(outcome, self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use epistream_core::NoopMetrics;
    use futures::StreamExt;

    #[test]
    fn test_only_allow_listed_headers_are_copied() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
        upstream.insert(header::CONTENT_RANGE, HeaderValue::from_static("bytes 0-9/100"));
        upstream.insert(header::SET_COOKIE, HeaderValue::from_static("session=abc"));
        upstream.insert(header::SERVER, HeaderValue::from_static("nginx"));

        let mut out = HeaderMap::new();
        copy_headers(&upstream, &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[header::CONTENT_RANGE], "bytes 0-9/100");
        assert!(out.get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_metered_stream_passes_chunks_through() {
        let chunks = futures::stream::iter(vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"de"))]);
        let mut stream = MeteredStream::new(chunks.boxed(), Arc::new(NoopMetrics), "t".to_string());

        let mut total = 0;
        while let Some(chunk) = stream.next().await {
            total += chunk.unwrap().len();
        }
        assert_eq!(total, 5);
        assert_eq!(stream.bytes, 5);
        assert!(stream.finished);
    }
}
