use actix_web::web::Bytes;
use futures_util::Stream;
use log::{debug, warn};
use std::pin::Pin;
use std::task::{Context, Poll};
use uuid::Uuid;

/// Byte-exact pipe from an upstream response body to a downstream response.
///
/// Chunks are yielded unchanged and in order. Upstream end-of-stream ends the
/// pipe. When the downstream side goes away the pipe is dropped, which drops
/// the upstream body and aborts that request.
pub struct RelayStream<S> {
    upstream: Pin<Box<S>>,
    request_id: Uuid,
    relayed: usize,
    finished: bool,
}

impl<S> RelayStream<S> {
    pub fn new(upstream: S, request_id: Uuid) -> Self {
        Self {
            upstream: Box::pin(upstream),
            request_id,
            relayed: 0,
            finished: false,
        }
    }

    pub fn relayed_bytes(&self) -> usize {
        self.relayed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<S, E> Stream for RelayStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.upstream.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.relayed += chunk.len();
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                warn!("[{}] Upstream stream failed after {} bytes: {}", this.request_id, this.relayed, e);
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                debug!("[{}] Upstream stream finished, {} bytes relayed", this.request_id, this.relayed);
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for RelayStream<S> {
    fn drop(&mut self) {
        if !self.is_finished() {
            debug!(
                "[{}] Client went away after {} bytes, aborting upstream stream",
                self.request_id,
                self.relayed_bytes()
            );
        }
    }
}
