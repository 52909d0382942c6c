// Copyright (c) The Crew Project Authors.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use halt::StopToken;
use parking_lot::Mutex;

use crate::notification::Notification;

/// A bounded queue with one reader and any number of senders.
///
/// The queue owner is the single reader; [`sender`][Self::sender] hands out cloneable
/// write handles holding only a weak reference, so senders outliving the reader observe
/// a closed queue instead of keeping it alive. Reads block (interruptibly, with a
/// timeout) on a [`Notification`]; writes never block and fail when the queue is full.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use halt::StopToken;
/// use relay::SynchronizedQueue;
///
/// let mut queue = SynchronizedQueue::new(4);
/// let sender = queue.sender();
///
/// assert!(sender.push("job"));
/// assert_eq!(queue.pop(Duration::from_secs(1), &StopToken::default()), Some("job"));
/// ```
#[derive(Debug)]
pub struct SynchronizedQueue<T> {
    shared: Arc<Shared<T>>,
}

#[derive(Debug)]
struct Shared<T> {
    max_length: usize,
    queue: Mutex<VecDeque<T>>,
    notification: Notification,
}

impl<T> SynchronizedQueue<T> {
    /// Creates a queue holding at most `max_length` elements.
    #[must_use]
    pub fn new(max_length: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                max_length,
                queue: Mutex::new(VecDeque::new()),
                notification: Notification::new(),
            }),
        }
    }

    /// Creates a write handle for this queue.
    #[must_use]
    pub fn sender(&self) -> QueueSender<T> {
        QueueSender {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Takes the front element, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` if the timeout elapsed or the token tripped while the queue was
    /// still empty.
    pub fn pop(&mut self, timeout: Duration, token: &StopToken) -> Option<T> {
        let mut queue = self.shared.queue.lock();

        if queue.is_empty() {
            drop(queue);
            if !self.shared.notification.wait_for_with_abort(timeout, token) {
                return None;
            }
            queue = self.shared.queue.lock();
        }
        self.shared.notification.reset();

        // We are the only reader, so a received signal implies an element.
        assert!(!queue.is_empty(), "signal received with empty queue");
        queue.pop_front()
    }
}

/// Cloneable write handle for a [`SynchronizedQueue`].
#[derive(Debug)]
pub struct QueueSender<T> {
    shared: Weak<Shared<T>>,
}

impl<T> QueueSender<T> {
    /// Appends `item` to the queue.
    ///
    /// Returns `false` when the queue is full or the reader is gone.
    pub fn push(&self, item: T) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };

        let mut queue = shared.queue.lock();
        if queue.len() >= shared.max_length {
            return false;
        }
        queue.push_back(item);
        shared.notification.notify();
        true
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}
