use crate::error::{Error, Result};
use crate::TopicBufferFullMode;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// What to do with an incoming message given the buffer occupancy
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Admission {
    Accept,
    DropIncoming,
    EvictOldest,
    Wait,
}

pub(crate) fn admit(occupancy: usize, capacity: usize, mode: TopicBufferFullMode) -> Admission {
    if occupancy < capacity {
        return Admission::Accept;
    }
    match mode {
        TopicBufferFullMode::Block => Admission::Wait,
        TopicBufferFullMode::DropNewest => Admission::DropIncoming,
        TopicBufferFullMode::DropOldest => Admission::EvictOldest,
    }
}

/// Result of offering one message to one subscriber
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum PushOutcome {
    Enqueued,
    /// Enqueued after evicting the oldest buffered message
    EvictedOldest,
    /// The incoming message was discarded
    DroppedNewest,
    /// A blocked push was abandoned; the buffer is unchanged
    Cancelled,
    /// The topic completed; nothing more is accepted
    Completed,
    /// The subscriber detached; late writes are no-ops
    Closed,
}

struct BufferState<T> {
    queue: VecDeque<T>,
    completed: bool,
    closed: bool,
}

/// Bounded queue owned by a single local subscriber.
///
/// Writers are the topic's fan-out, the one reader is the subscriber handle.
/// After `complete` the reader drains what is left and then sees end-of-stream.
pub(crate) struct SubscriberBuffer<T> {
    capacity: usize,
    mode: TopicBufferFullMode,
    state: Mutex<BufferState<T>>,
    readable: Notify,
    writable: Notify,
}

impl<T> SubscriberBuffer<T> {
    pub(crate) fn new(capacity: usize, mode: TopicBufferFullMode) -> Self {
        Self {
            capacity,
            mode,
            state: Mutex::new(BufferState {
                queue: VecDeque::with_capacity(capacity),
                completed: false,
                closed: false,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    pub(crate) async fn push(&self, item: T, cancel: &CancellationToken) -> PushOutcome {
        loop {
            let space = self.writable.notified();
            tokio::pin!(space);
            // Register before inspecting the queue so a concurrent pop cannot be missed.
            space.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return PushOutcome::Closed;
                }
                if state.completed {
                    return PushOutcome::Completed;
                }

                match admit(state.queue.len(), self.capacity, self.mode) {
                    Admission::Accept => {
                        state.queue.push_back(item);
                        drop(state);
                        self.readable.notify_one();
                        return PushOutcome::Enqueued;
                    }
                    Admission::EvictOldest => {
                        state.queue.pop_front();
                        state.queue.push_back(item);
                        drop(state);
                        self.readable.notify_one();
                        return PushOutcome::EvictedOldest;
                    }
                    Admission::DropIncoming => return PushOutcome::DroppedNewest,
                    Admission::Wait => {}
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PushOutcome::Cancelled,
                _ = &mut space => {}
            }
        }
    }

    /// Wait for the next message; `None` once completed and drained, or closed.
    pub(crate) async fn pop(&self) -> Option<T> {
        loop {
            match self.try_pop() {
                Ok(item) => return Some(item),
                Err(Error::BufferEmpty) => {}
                Err(_) => return None,
            }
            self.readable.notified().await;
        }
    }

    pub(crate) fn try_pop(&self) -> Result<T> {
        let mut state = self.state.lock();
        if let Some(item) = state.queue.pop_front() {
            drop(state);
            self.writable.notify_waiters();
            return Ok(item);
        }
        if state.completed || state.closed {
            return Err(Error::EndOfStream);
        }
        Err(Error::BufferEmpty)
    }

    pub(crate) fn complete(&self) {
        self.state.lock().completed = true;
        self.wake_all();
    }

    pub(crate) fn close(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.queue.clear();
        }
        self.wake_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn wake_all(&self) {
        self.readable.notify_one();
        self.writable.notify_waiters();
    }
}
