// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Generic bounded multi-subscriber fan-out with drop-on-full semantics
//! (spec §4.1).
//!
//! Grounded on `original_source/backend/audio/audiobroadcaster.py`'s
//! pub/sub thread (`subscribe`/`unsubscribe`/drop-counter/every-100th-drop
//! warning) and the teacher's `tokio::sync::broadcast`-based fan-out in
//! `dsp/channel.rs::ChannelDsp::pcm_tx`, generalized to independent
//! per-subscriber capacities and per-subscriber drop counters, which a bare
//! `tokio::sync::broadcast` channel cannot express (all receivers there
//! share one ring buffer and a "lagged" signal, not a per-subscriber
//! bounded queue with its own drop count).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use gs_core::{BroadcasterStats, SubscriberStats};

const DROP_WARN_EVERY: u64 = 100;

struct SubEntry<T> {
    sender: mpsc::Sender<T>,
    capacity: usize,
    delivered: AtomicU64,
    dropped: AtomicU64,
    errors: AtomicU64,
}

struct Inner<T> {
    name: String,
    subscribers: RwLock<HashMap<String, SubEntry<T>>>,
    received: AtomicU64,
    broadcast: AtomicU64,
    errors: AtomicU64,
}

/// A running fan-out: clone freely, subscribe/unsubscribe from any clone.
pub struct Broadcaster<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// A live subscription: holds the receiving half of the bounded queue.
pub struct SubscriberHandle<T> {
    pub name: String,
    pub receiver: mpsc::Receiver<T>,
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Spawn a Broadcaster with its own dedicated worker task (spec §4.1
    /// "A dedicated worker repeatedly dequeues from its input source").
    /// Returns the handle (for subscribe/unsubscribe/stats), the producer
    /// sender the owning component publishes into, and the worker's
    /// `JoinHandle`. Dropping every clone of the producer sender causes the
    /// worker to drain the input once and exit (spec §4.1 "Failure
    /// semantics").
    pub fn spawn(name: impl Into<String>, input_capacity: usize) -> (Self, mpsc::Sender<T>, JoinHandle<()>) {
        let name = name.into();
        let inner = Arc::new(Inner {
            name,
            subscribers: RwLock::new(HashMap::new()),
            received: AtomicU64::new(0),
            broadcast: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        });
        let (input_tx, input_rx) = mpsc::channel(input_capacity.max(1));
        let worker_inner = inner.clone();
        let handle = tokio::spawn(Self::run(worker_inner, input_rx));
        (Self { inner }, input_tx, handle)
    }

    async fn run(inner: Arc<Inner<T>>, mut input_rx: mpsc::Receiver<T>) {
        while let Some(msg) = input_rx.recv().await {
            inner.received.fetch_add(1, Ordering::Relaxed);
            Self::publish_to_subscribers(&inner, msg).await;
        }
        tracing::debug!(broadcaster = %inner.name, "input closed, broadcaster stopping");
    }

    async fn publish_to_subscribers(inner: &Arc<Inner<T>>, msg: T) {
        // Read lock: subscribe()/unsubscribe() (write lock) never block
        // publish to unrelated subscribers (spec §4.1 "Algorithm").
        let subscribers = inner.subscribers.read().await;
        for (name, sub) in subscribers.iter() {
            match sub.sender.try_send(msg.clone()) {
                Ok(()) => {
                    sub.delivered.fetch_add(1, Ordering::Relaxed);
                    inner.broadcast.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped % DROP_WARN_EVERY == 0 {
                        tracing::warn!(
                            broadcaster = %inner.name,
                            subscriber = %name,
                            dropped,
                            "subscriber queue full, dropping message"
                        );
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    sub.errors.fetch_add(1, Ordering::Relaxed);
                    inner.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Register a new bounded subscription (spec §4.1 "subscribe").
    pub async fn subscribe(&self, name: impl Into<String>, capacity: usize) -> SubscriberHandle<T> {
        let name = name.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let entry = SubEntry {
            sender: tx,
            capacity,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        };
        self.inner.subscribers.write().await.insert(name.clone(), entry);
        SubscriberHandle { name, receiver: rx }
    }

    /// Detach a subscriber; its queue is dropped (spec §4.1 "unsubscribe").
    pub async fn unsubscribe(&self, name: &str) {
        self.inner.subscribers.write().await.remove(name);
    }

    pub async fn stats(&self) -> BroadcasterStats {
        let subscribers = self.inner.subscribers.read().await;
        BroadcasterStats {
            received: self.inner.received.load(Ordering::Relaxed),
            broadcast: self.inner.broadcast.load(Ordering::Relaxed),
            errors: self.inner.errors.load(Ordering::Relaxed),
            subscribers: subscribers
                .iter()
                .map(|(name, sub)| SubscriberStats {
                    name: name.clone(),
                    capacity: sub.capacity,
                    delivered: sub.delivered.load(Ordering::Relaxed),
                    dropped: sub.dropped.load(Ordering::Relaxed),
                    errors: sub.errors.load(Ordering::Relaxed),
                })
                .collect(),
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fan_out_with_slow_consumer_drops_only_that_subscriber() {
        // Spec §8 end-to-end scenario 2: A (cap=8, fast), B (cap=2, slow).
        let (bc, input_tx, _worker) = Broadcaster::<u64>::spawn("iq", 32);
        let mut a = bc.subscribe("A", 8).await;
        let mut b = bc.subscribe("B", 2).await;

        let a_task = tokio::spawn(async move {
            let mut received = 0;
            while a.receiver.recv().await.is_some() {
                received += 1;
            }
            received
        });
        let b_task = tokio::spawn(async move {
            let mut received = 0;
            while let Some(_msg) = b.receiver.recv().await {
                received += 1;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            received
        });

        for i in 0..100u64 {
            input_tx.send(i).await.unwrap();
        }
        drop(input_tx);

        let a_received = a_task.await.unwrap();
        let b_received = b_task.await.unwrap();

        let stats = bc.stats().await;
        let a_stats = stats.subscribers.iter().find(|s| s.name == "A").unwrap();
        let b_stats = stats.subscribers.iter().find(|s| s.name == "B").unwrap();
        assert_eq!(a_stats.delivered, a_received);
        assert_eq!(a_stats.dropped, 0);
        assert_eq!(b_stats.delivered + b_stats.dropped, 100);
        assert_eq!(b_received, b_stats.delivered);
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_subscriber() {
        let (bc, input_tx, _worker) = Broadcaster::<u32>::spawn("test", 8);
        let _sub = bc.subscribe("s1", 4).await;
        assert_eq!(bc.subscriber_count().await, 1);
        bc.unsubscribe("s1").await;
        assert_eq!(bc.subscriber_count().await, 0);
        input_tx.send(1).await.unwrap();
    }

    #[tokio::test]
    async fn publish_never_delivers_to_a_removed_subscriber() {
        let (bc, input_tx, _worker) = Broadcaster::<u32>::spawn("test", 8);
        let mut sub = bc.subscribe("s1", 4).await;
        input_tx.send(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        bc.unsubscribe("s1").await;
        input_tx.send(2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(input_tx);

        assert_eq!(sub.receiver.recv().await, Some(1));
        assert_eq!(sub.receiver.recv().await, None);
    }
}
