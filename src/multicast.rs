// SPDX-License-Identifier: MIT
// Multicast stream.
//
// Wraps one asynchronous chunk-producing operation so any number of
// independent consumers each receive the full chunk history plus all future
// chunks, without re-driving the underlying producer. A single internal pump
// task consumes the producer and fans items out; subscribers joining late are
// replayed the buffer first, so every subscriber observes the identical
// ordered sequence.

use std::sync::{Arc, Mutex};

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One delivery to a subscriber: a buffered/live item, or the single
/// end-of-stream marker.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<T> {
    Item(T),
    /// Delivered exactly once, after the last item, whether the producer
    /// completed, failed, or was cancelled.
    Ended,
}

struct Inner<T> {
    buffer: Vec<T>,
    subscribers: Vec<mpsc::UnboundedSender<StreamEvent<T>>>,
    ended: bool,
    cancelled: bool,
    error: Option<String>,
}

/// Buffer-plus-subscriber-list multicast over one producer stream.
///
/// Cheaply cloneable — all clones share the same internal state via `Arc`.
#[derive(Clone)]
pub struct MulticastStream<T> {
    inner: Arc<Mutex<Inner<T>>>,
    cancel_token: CancellationToken,
}

impl<T: Clone + Send + 'static> MulticastStream<T> {
    /// Start consuming `producer` immediately, buffering every item it
    /// yields in order.
    ///
    /// The producer is driven by exactly one internal pump task. A stream
    /// error ends the multicast and is captured for [`error`](Self::error);
    /// items buffered before the error remain retrievable.
    pub fn new(producer: BoxStream<'static, anyhow::Result<T>>) -> Self {
        let stream = Self {
            inner: Arc::new(Mutex::new(Inner {
                buffer: Vec::new(),
                subscribers: Vec::new(),
                ended: false,
                cancelled: false,
                error: None,
            })),
            cancel_token: CancellationToken::new(),
        };

        let pump = stream.clone();
        tokio::spawn(async move {
            pump.run(producer).await;
        });

        stream
    }

    async fn run(&self, mut producer: BoxStream<'static, anyhow::Result<T>>) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    // cancel() already marked the stream ended.
                    return;
                }
                next = producer.next() => match next {
                    Some(Ok(item)) => self.publish(item),
                    Some(Err(err)) => {
                        self.finish(Some(err.to_string()));
                        return;
                    }
                    None => {
                        self.finish(None);
                        return;
                    }
                },
            }
        }
    }

    /// Buffer an item and forward it to every live subscriber.
    fn publish(&self, item: T) {
        let mut inner = self.inner.lock().expect("multicast lock poisoned");
        if inner.ended {
            return;
        }
        inner.buffer.push(item.clone());
        inner
            .subscribers
            .retain(|tx| tx.send(StreamEvent::Item(item.clone())).is_ok());
    }

    /// Mark the stream ended and deliver the end marker exactly once.
    fn finish(&self, error: Option<String>) {
        let mut inner = self.inner.lock().expect("multicast lock poisoned");
        if inner.ended {
            return;
        }
        inner.ended = true;
        inner.error = error;
        for tx in inner.subscribers.drain(..) {
            let _ = tx.send(StreamEvent::Ended);
        }
    }

    /// Subscribe to the full sequence: all buffered items are delivered
    /// immediately, then each subsequent item as it arrives, then the end
    /// marker.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StreamEvent<T>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("multicast lock poisoned");
        for item in &inner.buffer {
            let _ = tx.send(StreamEvent::Item(item.clone()));
        }
        if inner.ended {
            let _ = tx.send(StreamEvent::Ended);
        } else {
            inner.subscribers.push(tx);
        }
        rx
    }

    /// An independent lazy stream over the same buffered-plus-future items,
    /// ending at the end marker.
    pub fn tee(&self) -> impl futures_util::Stream<Item = T> + Send {
        UnboundedReceiverStream::new(self.subscribe()).take_while(|event| {
            let live = matches!(event, StreamEvent::Item(_));
            async move { live }
        })
        .map(|event| match event {
            StreamEvent::Item(item) => item,
            StreamEvent::Ended => unreachable!("ended events are filtered"),
        })
    }

    /// Request cancellation of the producer and end the stream. Buffered
    /// items remain retrievable.
    pub fn cancel(&self) {
        {
            let mut inner = self.inner.lock().expect("multicast lock poisoned");
            if !inner.ended {
                debug!("multicast stream cancelled");
            }
            inner.cancelled = true;
        }
        self.finish(None);
        self.cancel_token.cancel();
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().expect("multicast lock poisoned").ended
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().expect("multicast lock poisoned").cancelled
    }

    /// The producer's error, if it failed.
    pub fn error(&self) -> Option<String> {
        self.inner.lock().expect("multicast lock poisoned").error.clone()
    }

    /// Snapshot of everything buffered so far.
    pub fn buffered(&self) -> Vec<T> {
        self.inner.lock().expect("multicast lock poisoned").buffer.clone()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
