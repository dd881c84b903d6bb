//! Bounded-concurrency fetch admission.
//!
//! A [`FetchQueue`] holds a backlog of keys and admits them, front first, while
//! fewer than `size` are being processed. Admission is handed out through an
//! [`AdmissionTicket`]; the [`ProcessingSlot`] it resolves to keeps the key in
//! flight until it is dropped, at which point the next backlog entry is
//! admitted.
//!
//! When the backlog grows past `track` entries, keys that no registered
//! [`Demand`] (or the explicit needed predicate) still wants are swept out and
//! their tickets resolve to [`Admission::Discarded`]. The same check runs once
//! more at the moment an entry reaches the head of the backlog.

use crate::core::constants::{DEFAULT_QUEUE_SIZE, DEFAULT_QUEUE_TRACK};
use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

/// Capacity and sweep settings of a fetch queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Maximum number of concurrently processing entries
    pub size: usize,
    /// Limit used until the first entry settles, `size` when unset
    pub initial_size: Option<usize>,
    /// Backlog length above which unneeded entries are swept
    pub track: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_QUEUE_SIZE,
            initial_size: None,
            track: DEFAULT_QUEUE_TRACK,
        }
    }
}

impl QueueOptions {
    pub fn low_resource() -> Self {
        Self {
            size: 2,
            initial_size: None,
            track: 200,
        }
    }

    pub fn high_performance() -> Self {
        Self {
            size: 16,
            initial_size: Some(32),
            track: 1200,
        }
    }

    pub fn for_testing() -> Self {
        Self {
            size: 2,
            initial_size: None,
            track: 4,
        }
    }
}

/// Something that may still want a queued key.
///
/// Consulted with the queue's lock held: implementations must not call back
/// into the queue.
pub trait Demand<K>: Send + Sync {
    fn is_needed(&self, key: &K) -> bool;
}

/// Explicit needed predicate; same locking rule as [`Demand`]
pub type NeededFn<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;

/// Where a key currently is in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Queued,
    Processing,
    Settled,
}

/// What an [`AdmissionTicket`] resolves to
#[derive(Debug)]
pub enum Admission<K: Clone + PartialEq + Send + 'static> {
    /// Go ahead; the entry stays in flight until the slot is dropped
    Granted(ProcessingSlot<K>),
    /// The entry was no longer needed and was never started
    Discarded,
    /// The entry was removed from the backlog or the queue was cleared
    Removed,
}

/// Result of [`FetchQueue::add`]
#[derive(Debug)]
pub enum Enqueued<K: Clone + PartialEq + Send + 'static> {
    New(AdmissionTicket<K>),
    /// The key was already waiting and has only been moved
    Repositioned,
}

impl<K: Clone + PartialEq + Send + 'static> Enqueued<K> {
    pub fn into_ticket(self) -> Option<AdmissionTicket<K>> {
        match self {
            Enqueued::New(ticket) => Some(ticket),
            Enqueued::Repositioned => None,
        }
    }
}

struct QueueEntry<K: Clone + PartialEq + Send + 'static> {
    key: K,
    batch: Option<u64>,
    gate: oneshot::Sender<Admission<K>>,
}

type Dispatch<K> = (oneshot::Sender<Admission<K>>, Admission<K>);

struct QueueState<K: Clone + PartialEq + Send + 'static> {
    size: usize,
    initial_size: Option<usize>,
    track: usize,
    backlog: VecDeque<QueueEntry<K>>,
    in_flight: Vec<K>,
    processing: usize,
    settled_once: bool,
    batch: Option<u64>,
    last_batch: u64,
    needed: Option<NeededFn<K>>,
    demands: Vec<Weak<dyn Demand<K>>>,
    /// Set by the first registration; from then on dead demands want nothing
    demanded: bool,
    /// Bumped by `clear` so slots granted before it settle nothing
    epoch: u64,
}

impl<K: Clone + PartialEq + Send + 'static> QueueState<K> {
    fn limit(&self) -> usize {
        if self.settled_once {
            self.size
        } else {
            self.initial_size.unwrap_or(self.size)
        }
    }

    fn has_needed_check(&self) -> bool {
        self.needed.is_some() || self.demanded
    }

    /// Keys pass when no check was ever configured
    fn is_needed(&self, key: &K) -> bool {
        if let Some(needed) = &self.needed {
            return needed(key);
        }
        if !self.demanded {
            return true;
        }
        self.demands
            .iter()
            .filter_map(Weak::upgrade)
            .any(|demand| demand.is_needed(key))
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.backlog.iter().position(|entry| entry.key == *key)
    }

    fn insert(&mut self, mut entry: QueueEntry<K>, at_end: bool) {
        entry.batch = self.batch;
        if at_end {
            self.backlog.push_back(entry);
        } else if self.batch.is_none() {
            self.backlog.push_front(entry);
        } else {
            let index = self
                .backlog
                .iter()
                .position(|queued| queued.batch != self.batch)
                .unwrap_or(self.backlog.len());
            self.backlog.insert(index, entry);
        }
    }

    /// Sweep and admit; the returned dispatches are delivered after unlocking
    fn next_item(&mut self, shared: &Arc<Mutex<QueueState<K>>>) -> Vec<Dispatch<K>> {
        let mut dispatches = Vec::new();
        self.demands.retain(|demand| demand.strong_count() > 0);

        if self.backlog.len() > self.track && self.has_needed_check() {
            let backlog = std::mem::take(&mut self.backlog);
            let before = backlog.len();
            for entry in backlog {
                if self.is_needed(&entry.key) {
                    self.backlog.push_back(entry);
                } else {
                    dispatches.push((entry.gate, Admission::Discarded));
                }
            }
            log::debug!(
                "Fetch queue swept {} unneeded entries, {} remain",
                before - self.backlog.len(),
                self.backlog.len()
            );
        }

        while self.processing < self.limit() {
            let Some(entry) = self.backlog.pop_front() else {
                break;
            };
            if !self.is_needed(&entry.key) {
                dispatches.push((entry.gate, Admission::Discarded));
                continue;
            }
            self.processing += 1;
            self.in_flight.push(entry.key.clone());
            let slot = ProcessingSlot {
                queue: shared.clone(),
                key: Some(entry.key),
                epoch: self.epoch,
            };
            dispatches.push((entry.gate, Admission::Granted(slot)));
        }
        dispatches
    }
}

/// Hands out admissions with the queue unlocked. A receiver that is gone
/// hands its slot back, which settles it straight away.
fn deliver<K: Clone + PartialEq + Send + 'static>(dispatches: Vec<Dispatch<K>>) {
    for (gate, admission) in dispatches {
        let _ = gate.send(admission);
    }
}

/// Priority-ordered, concurrency-limited admission queue.
///
/// Cheap to clone; clones share the same queue.
pub struct FetchQueue<K: Clone + PartialEq + Send + 'static> {
    state: Arc<Mutex<QueueState<K>>>,
}

impl<K: Clone + PartialEq + Send + 'static> Clone for FetchQueue<K> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<K: Clone + PartialEq + Send + 'static> std::fmt::Debug for FetchQueue<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("FetchQueue")
            .field("size", &state.size)
            .field("queued", &state.backlog.len())
            .field("processing", &state.processing)
            .field("batch", &state.batch)
            .finish()
    }
}

impl<K: Clone + PartialEq + Send + 'static> Default for FetchQueue<K> {
    fn default() -> Self {
        Self::new(QueueOptions::default())
    }
}

impl<K: Clone + PartialEq + Send + 'static> FetchQueue<K> {
    pub fn new(options: QueueOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                size: options.size,
                initial_size: options.initial_size,
                track: options.track,
                backlog: VecDeque::new(),
                in_flight: Vec::new(),
                processing: 0,
                settled_once: false,
                batch: None,
                last_batch: 0,
                needed: None,
                demands: Vec::new(),
                demanded: false,
                epoch: 0,
            })),
        }
    }

    /// Creates a queue with an explicit needed predicate
    pub fn with_needed(options: QueueOptions, needed: NeededFn<K>) -> Self {
        let queue = Self::new(options);
        queue.lock().needed = Some(needed);
        queue
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pump(&self) {
        let dispatches = {
            let mut state = self.lock();
            state.next_item(&self.state)
        };
        deliver(dispatches);
    }

    fn settle(&self, key: &K, epoch: u64) {
        let dispatches = {
            let mut state = self.lock();
            if state.epoch != epoch {
                return;
            }
            let Some(index) = state.in_flight.iter().position(|k| k == key) else {
                return;
            };
            state.in_flight.swap_remove(index);
            state.processing = state.processing.saturating_sub(1);
            state.settled_once = true;
            state.next_item(&self.state)
        };
        deliver(dispatches);
    }

    /// Non-owning handle that does not keep the queue alive
    pub fn downgrade(&self) -> WeakFetchQueue<K> {
        WeakFetchQueue {
            state: Arc::downgrade(&self.state),
        }
    }

    /// Submit `key`.
    ///
    /// A key already waiting in the backlog is moved instead of added twice.
    /// Entries go to the end when `at_end`, otherwise to the front, or right
    /// after the other members of the current batch while batching.
    pub fn add(&self, key: K, at_end: bool) -> Enqueued<K> {
        let (enqueued, dispatches) = {
            let mut state = self.lock();
            if let Some(index) = state.position(&key) {
                if let Some(entry) = state.backlog.remove(index) {
                    state.insert(entry, at_end);
                }
                (Enqueued::Repositioned, Vec::new())
            } else {
                let (gate, rx) = oneshot::channel();
                state.insert(
                    QueueEntry {
                        key,
                        batch: None,
                        gate,
                    },
                    at_end,
                );
                let dispatches = state.next_item(&self.state);
                (Enqueued::New(AdmissionTicket { rx }), dispatches)
            }
        };
        deliver(dispatches);
        enqueued
    }

    /// Drop a waiting key; its ticket resolves to [`Admission::Removed`].
    /// Keys already processing are not affected.
    pub fn remove(&self, key: &K) -> bool {
        let removed = {
            let mut state = self.lock();
            state
                .position(key)
                .and_then(|index| state.backlog.remove(index))
        };
        removed.is_some()
    }

    /// Backlog index of `key`, 0 being the next to be admitted
    pub fn position(&self, key: &K) -> Option<usize> {
        self.lock().position(key)
    }

    pub fn state(&self, key: &K) -> EntryState {
        let state = self.lock();
        if state.position(key).is_some() {
            EntryState::Queued
        } else if state.in_flight.contains(key) {
            EntryState::Processing
        } else {
            EntryState::Settled
        }
    }

    /// Backlog keys in admission order
    pub fn queued_keys(&self) -> Vec<K> {
        self.lock().backlog.iter().map(|entry| entry.key.clone()).collect()
    }

    /// Current batch id, `None` when not batching
    pub fn batch(&self) -> Option<u64> {
        self.lock().batch
    }

    /// Start a new batch: later front insertions go after its earlier members
    pub fn start_batch(&self) -> u64 {
        let mut state = self.lock();
        state.last_batch += 1;
        state.batch = Some(state.last_batch);
        state.last_batch
    }

    pub fn end_batch(&self) {
        self.lock().batch = None;
    }

    /// Number of entries waiting in the backlog
    pub fn len(&self) -> usize {
        self.lock().backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().backlog.is_empty()
    }

    /// Number of entries currently being processed
    pub fn processing(&self) -> usize {
        self.lock().processing
    }

    pub fn size(&self) -> usize {
        self.lock().size
    }

    /// Change the concurrency limit. Growing admits immediately; shrinking
    /// never interrupts entries already processing.
    pub fn set_size(&self, size: usize) {
        self.lock().size = size;
        self.pump();
    }

    pub fn initial_size(&self) -> Option<usize> {
        self.lock().initial_size
    }

    pub fn set_initial_size(&self, initial_size: Option<usize>) {
        self.lock().initial_size = initial_size;
        self.pump();
    }

    pub fn track(&self) -> usize {
        self.lock().track
    }

    pub fn set_track(&self, track: usize) {
        self.lock().track = track;
    }

    /// Replace the explicit needed predicate; it takes precedence over
    /// registered demands
    pub fn set_needed(&self, needed: Option<NeededFn<K>>) {
        self.lock().needed = needed;
    }

    /// Register a sharer of this queue. Dead references are pruned lazily;
    /// once every registered demand is gone no key is needed any more.
    pub fn register_demand(&self, demand: Weak<dyn Demand<K>>) {
        let mut state = self.lock();
        state.demands.push(demand);
        state.demanded = true;
    }

    /// Number of live registered demands
    pub fn demand_count(&self) -> usize {
        self.lock()
            .demands
            .iter()
            .filter(|demand| demand.strong_count() > 0)
            .count()
    }

    /// Drop the whole backlog and forget in-flight accounting.
    /// Waiting tickets resolve to [`Admission::Removed`]; slots granted
    /// earlier no longer count against the limit when they drop.
    pub fn clear(&self) {
        let backlog = {
            let mut state = self.lock();
            state.epoch += 1;
            state.processing = 0;
            state.in_flight.clear();
            std::mem::take(&mut state.backlog)
        };
        drop(backlog);
    }
}

/// Weak counterpart of [`FetchQueue`]
pub struct WeakFetchQueue<K: Clone + PartialEq + Send + 'static> {
    state: Weak<Mutex<QueueState<K>>>,
}

impl<K: Clone + PartialEq + Send + 'static> Clone for WeakFetchQueue<K> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<K: Clone + PartialEq + Send + 'static> WeakFetchQueue<K> {
    pub fn upgrade(&self) -> Option<FetchQueue<K>> {
        self.state.upgrade().map(|state| FetchQueue { state })
    }
}

/// Resolves once the queue decides what happens to a submitted key
#[derive(Debug)]
pub struct AdmissionTicket<K: Clone + PartialEq + Send + 'static> {
    rx: oneshot::Receiver<Admission<K>>,
}

impl<K: Clone + PartialEq + Send + 'static> Future for AdmissionTicket<K> {
    type Output = Admission<K>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(admission)) => Poll::Ready(admission),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Admission::Removed),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<K: Clone + PartialEq + Send + 'static> AdmissionTicket<K> {
    /// Wait for admission and run `process` while holding the slot.
    /// Returns `None` when the entry was discarded or removed.
    pub async fn run<F, Fut>(self, process: F) -> Option<Fut::Output>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        match self.await {
            Admission::Granted(slot) => {
                let output = process().await;
                drop(slot);
                Some(output)
            }
            Admission::Discarded | Admission::Removed => None,
        }
    }
}

/// Marks a key as processing; dropping it settles the entry
pub struct ProcessingSlot<K: Clone + PartialEq + Send + 'static> {
    queue: Arc<Mutex<QueueState<K>>>,
    key: Option<K>,
    epoch: u64,
}

impl<K: Clone + PartialEq + Send + 'static> ProcessingSlot<K> {
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }
}

impl<K: Clone + PartialEq + Send + 'static> std::fmt::Debug for ProcessingSlot<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingSlot").finish_non_exhaustive()
    }
}

impl<K: Clone + PartialEq + Send + 'static> Drop for ProcessingSlot<K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            FetchQueue {
                state: self.queue.clone(),
            }
            .settle(&key, self.epoch);
        }
    }
}
