// In crates/web-server/src/bus.rs

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

type Queue<M> = Arc<Mutex<VecDeque<M>>>;

/// Per-client FIFO queues decoupling producers from consumers.
///
/// Queues are created lazily on the first enqueue and are only removed by
/// [`ClientMessageBus::clear`]. Each queue is bounded; once full, the oldest
/// message is dropped to make room. Operations on different client ids
/// never contend on the same queue lock.
#[derive(Debug)]
pub struct ClientMessageBus<M> {
    capacity: usize,
    default_client: String,
    queues: RwLock<HashMap<String, Queue<M>>>,
}

impl<M> ClientMessageBus<M> {
    pub fn new(capacity: usize, default_client: impl Into<String>) -> Self {
        Self {
            capacity: capacity.max(1),
            default_client: default_client.into(),
            queues: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `message` to the client's queue.
    ///
    /// # Returns
    ///
    /// The number of old messages dropped to stay within capacity.
    pub fn enqueue(&self, client_id: &str, message: M) -> usize {
        let queue = self.queue_or_create(client_id);
        let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.push_back(message);

        let mut dropped = 0;
        while queue.len() > self.capacity {
            queue.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!(client_id = %self.key(client_id), dropped, "Client queue full. Dropped oldest messages.");
        }
        dropped
    }

    /// Removes and returns the oldest message. Never blocks on an empty queue.
    pub fn dequeue(&self, client_id: &str) -> Option<M> {
        let queue = self.queue(client_id)?;
        let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.pop_front()
    }

    /// Discards the client's queue. Returns how many messages it held.
    pub fn clear(&self, client_id: &str) -> usize {
        let key = self.key(client_id);
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        queues
            .remove(&key)
            .map(|queue| queue.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    pub fn len(&self, client_id: &str) -> usize {
        self.queue(client_id)
            .map(|queue| queue.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, client_id: &str) -> bool {
        self.len(client_id) == 0
    }

    /// Ids of every client with a live queue, sorted.
    pub fn client_ids(&self) -> Vec<String> {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = queues.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn key(&self, client_id: &str) -> String {
        let trimmed = client_id.trim();
        if trimmed.is_empty() {
            self.default_client.clone()
        } else {
            trimmed.to_string()
        }
    }

    fn queue(&self, client_id: &str) -> Option<Queue<M>> {
        let key = self.key(client_id);
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        queues.get(&key).cloned()
    }

    fn queue_or_create(&self, client_id: &str) -> Queue<M> {
        if let Some(queue) = self.queue(client_id) {
            return queue;
        }
        let key = self.key(client_id);
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }
}

impl<M: Clone> ClientMessageBus<M> {
    /// The oldest message, left in place.
    pub fn peek(&self, client_id: &str) -> Option<M> {
        let queue = self.queue(client_id)?;
        let queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.front().cloned()
    }
}
