//! Upload progress reporting via a wrapped request body
//!
//! Swaps an outgoing request's `SdkBody` for a wrapper that counts bytes as
//! they stream out and pushes fractional progress onto a channel.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use aws_sdk_s3::primitives::SdkBody;
use aws_smithy_runtime_api::http::Request;
use bytes::Bytes;
use http_body::{Body, SizeHint};
use tokio::sync::mpsc::Sender;

/// One progress tick for an in-flight transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferUpdate {
    pub key: String,
    /// Fraction of the body written so far, 0.0..=1.0
    pub fraction: f64,
}

struct ProgressTracker {
    bytes_written: u64,
    content_length: u64,
    progress_sender: Sender<TransferUpdate>,
    key: String,
}

impl ProgressTracker {
    fn track(&mut self, len: u64) {
        self.bytes_written += len;
        // A zero-length body (folder placeholder) is complete the moment it
        // is dispatched.
        let fraction = if self.content_length == 0 {
            1.0
        } else {
            self.bytes_written as f64 / self.content_length as f64
        };
        let update = TransferUpdate {
            key: self.key.clone(),
            fraction,
        };
        // Use try_send to avoid blocking the transfer when the channel is full
        let _ = self.progress_sender.try_send(update);
    }
}

#[pin_project::pin_project]
pub struct ProgressBody<InnerBody> {
    #[pin]
    inner: InnerBody,
    // progress_tracker is a separate field, so it can be accessed as &mut.
    progress_tracker: ProgressTracker,
}

impl ProgressBody<SdkBody> {
    /// Wrap a request's `SdkBody` with a counting body in place. This is
    /// specialized for `SdkBody`, which can be rebuilt from an `http_body`
    /// implementation via `from_body_0_4`.
    pub fn replace(
        value: Request<SdkBody>,
        key: &str,
        tx: Sender<TransferUpdate>,
    ) -> Result<Request<SdkBody>, Infallible> {
        let key = key.to_string();
        let value = value.map(move |body| {
            let len = body.content_length().unwrap_or(0);
            let body = ProgressBody::new(body, len, key.clone(), tx.clone());
            SdkBody::from_body_0_4(body)
        });
        Ok(value)
    }
}

impl<InnerBody> ProgressBody<InnerBody>
where
    InnerBody: Body<Data = Bytes, Error = aws_smithy_types::body::Error>,
{
    pub fn new(
        body: InnerBody,
        content_length: u64,
        key: String,
        tx: Sender<TransferUpdate>,
    ) -> Self {
        Self {
            inner: body,
            progress_tracker: ProgressTracker {
                bytes_written: 0,
                content_length,
                progress_sender: tx,
                key,
            },
        }
    }
}

impl<InnerBody> Body for ProgressBody<InnerBody>
where
    InnerBody: Body<Data = Bytes, Error = aws_smithy_types::body::Error>,
{
    type Data = Bytes;

    type Error = aws_smithy_types::body::Error;

    // Delegates to the inner poll_data and updates the tracker whenever a
    // chunk is handed out.
    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        let this = self.project();
        match this.inner.poll_data(cx) {
            Poll::Ready(Some(Ok(data))) => {
                this.progress_tracker.track(data.len() as u64);
                Poll::Ready(Some(Ok(data)))
            }
            Poll::Ready(None) => {
                tracing::debug!(key = %this.progress_tracker.key, "body fully streamed");
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<http::HeaderMap>, Self::Error>> {
        self.project().inner.poll_trailers(cx)
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.progress_tracker.content_length)
    }
}
