//! Tiles: identity, geometry and the single fetch each tile wraps.

use crate::runtime;
use crate::tiles::loader::{TileData, TileRequest};
use crate::tiles::queue::{Admission, AdmissionTicket, Enqueued, FetchQueue, WeakFetchQueue};
use crate::traits::TileFetcher;
use crate::FetchError;
use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Position of a tile in the pyramid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileIndex {
    pub level: u32,
    pub x: i64,
    pub y: i64,
    /// Distinguishes otherwise identical indices, e.g. several sources
    #[serde(default)]
    pub reference: u32,
}

impl TileIndex {
    pub fn new(level: u32, x: i64, y: i64) -> Self {
        Self {
            level,
            x,
            y,
            reference: 0,
        }
    }

    pub fn with_reference(mut self, reference: u32) -> Self {
        self.reference = reference;
        self
    }

    /// Cache and active-set key: `level_y_x_reference`
    pub fn hash_key(&self) -> String {
        format!("{}_{}_{}_{}", self.level, self.y, self.x, self.reference)
    }

    /// The tile one level up that contains this one
    pub fn parent(&self) -> Option<TileIndex> {
        let level = self.level.checked_sub(1)?;
        Some(TileIndex {
            level,
            x: self.x.div_euclid(2),
            y: self.y.div_euclid(2),
            reference: self.reference,
        })
    }

    /// The four tiles one level down that this one contains
    pub fn children(&self) -> [TileIndex; 4] {
        let (x, y) = (self.x * 2, self.y * 2);
        let child = |x, y| TileIndex {
            level: self.level + 1,
            x,
            y,
            reference: self.reference,
        };
        [child(x, y), child(x + 1, y), child(x, y + 1), child(x + 1, y + 1)]
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}_{}", self.level, self.y, self.x, self.reference)
    }
}

/// Rectangle in level-pixel space, y growing downwards
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileEdges {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Shape of a tile: which cell it is, how large, and how it overlaps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileFootprint {
    pub index: TileIndex,
    pub width: u32,
    pub height: u32,
    pub overlap_x: u32,
    pub overlap_y: u32,
    pub wrap_x: bool,
    pub wrap_y: bool,
}

impl TileFootprint {
    /// Overlap applied on the leading (left, top) edges. Column and row 0
    /// sit on the world edge and get none unless the axis wraps.
    fn leading_overlap(&self) -> (f64, f64) {
        let x = if self.index.x == 0 && !self.wrap_x {
            0.0
        } else {
            self.overlap_x as f64
        };
        let y = if self.index.y == 0 && !self.wrap_y {
            0.0
        } else {
            self.overlap_y as f64
        };
        (x, y)
    }

    /// Edges relative to the tile at `origin` shifted by `shift` pixels
    pub fn bounds(&self, origin: (i64, i64), shift: (f64, f64)) -> TileEdges {
        let (lead_x, lead_y) = self.leading_overlap();
        let (w, h) = (self.width as f64, self.height as f64);
        let left = w * (self.index.x - origin.0) as f64 - lead_x - shift.0;
        let top = h * (self.index.y - origin.1) as f64 - lead_y - shift.1;
        TileEdges {
            left,
            top,
            right: left + lead_x + w + self.overlap_x as f64,
            bottom: top + lead_y + h + self.overlap_y as f64,
        }
    }

    /// Edges in absolute level-pixel space
    pub fn edges(&self) -> TileEdges {
        self.bounds((0, 0), (0.0, 0.0))
    }
}

/// Fetch lifecycle of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TilePhase {
    Idle,
    Queued,
    Fetching,
    Fetched,
    Failed,
}

/// Everything that describes a tile apart from how it is fetched
#[derive(Debug, Clone, PartialEq)]
pub struct TileDescriptor {
    pub footprint: TileFootprint,
    /// Index the content is taken from; wraps `footprint.index` on wrapped axes
    pub source: TileIndex,
    pub url: String,
}

type SuccessFn = Box<dyn FnOnce(&Tile) + Send>;
type FailureFn = Box<dyn FnOnce(&Tile, &FetchError) + Send>;

struct TileState {
    phase: TilePhase,
    data: Option<TileData>,
    error: Option<FetchError>,
    on_success: Vec<SuccessFn>,
    on_failure: Vec<FailureFn>,
}

struct TileInner {
    descriptor: TileDescriptor,
    hash: String,
    fetcher: Arc<dyn TileFetcher>,
    queue: Option<WeakFetchQueue<Tile>>,
    watched: AtomicBool,
    state: Mutex<TileState>,
}

/// Handle to one tile and its fetch.
///
/// Clones share the tile; two handles compare equal only when they refer to
/// the same tile instance, so a re-created tile with the same index is a
/// different tile.
#[derive(Clone)]
pub struct Tile {
    inner: Arc<TileInner>,
}

impl Tile {
    /// A tile that starts fetching directly when asked for
    pub fn new(descriptor: TileDescriptor, fetcher: Arc<dyn TileFetcher>) -> Self {
        Self::build(descriptor, fetcher, None)
    }

    /// A tile whose first `then` goes through `queue`
    pub fn queued(
        descriptor: TileDescriptor,
        fetcher: Arc<dyn TileFetcher>,
        queue: &FetchQueue<Tile>,
    ) -> Self {
        Self::build(descriptor, fetcher, Some(queue.downgrade()))
    }

    fn build(
        descriptor: TileDescriptor,
        fetcher: Arc<dyn TileFetcher>,
        queue: Option<WeakFetchQueue<Tile>>,
    ) -> Self {
        let hash = descriptor.footprint.index.hash_key();
        Self {
            inner: Arc::new(TileInner {
                descriptor,
                hash,
                fetcher,
                queue,
                watched: AtomicBool::new(false),
                state: Mutex::new(TileState {
                    phase: TilePhase::Idle,
                    data: None,
                    error: None,
                    on_success: Vec::new(),
                    on_failure: Vec::new(),
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TileState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn index(&self) -> TileIndex {
        self.inner.descriptor.footprint.index
    }

    pub fn source(&self) -> TileIndex {
        self.inner.descriptor.source
    }

    pub fn footprint(&self) -> &TileFootprint {
        &self.inner.descriptor.footprint
    }

    pub fn url(&self) -> &str {
        &self.inner.descriptor.url
    }

    /// Same as `index().hash_key()`, computed once
    pub fn hash(&self) -> &str {
        &self.inner.hash
    }

    pub fn phase(&self) -> TilePhase {
        self.lock().phase
    }

    /// True once the fetch has succeeded
    pub fn fetched(&self) -> bool {
        self.phase() == TilePhase::Fetched
    }

    pub fn data(&self) -> Option<TileData> {
        self.lock().data.clone()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.lock().error.clone()
    }

    /// True for the first caller only; lets a layer subscribe once per tile
    pub(crate) fn claim_watch(&self) -> bool {
        !self.inner.watched.swap(true, AtomicOrdering::SeqCst)
    }

    /// Start retrieving the tile. Only the first call does anything.
    pub fn fetch(&self) {
        if self.begin_fetch() {
            runtime::spawn(self.clone().retrieve());
        }
    }

    fn begin_fetch(&self) -> bool {
        let mut state = self.lock();
        match state.phase {
            TilePhase::Idle | TilePhase::Queued => {
                state.phase = TilePhase::Fetching;
                true
            }
            _ => false,
        }
    }

    async fn retrieve(self) {
        let request = TileRequest {
            index: self.index(),
            source: self.source(),
            url: self.url().to_string(),
        };
        let result = self.inner.fetcher.fetch(&request).await;
        self.settle(result);
    }

    fn settle(&self, result: Result<TileData, FetchError>) {
        let (success, failure) = {
            let mut state = self.lock();
            if matches!(state.phase, TilePhase::Fetched | TilePhase::Failed) {
                return;
            }
            let success = std::mem::take(&mut state.on_success);
            let failure = std::mem::take(&mut state.on_failure);
            match &result {
                Ok(data) => {
                    state.phase = TilePhase::Fetched;
                    state.data = Some(data.clone());
                }
                Err(error) => {
                    state.phase = TilePhase::Failed;
                    state.error = Some(error.clone());
                }
            }
            (success, failure)
        };

        match result {
            Ok(_) => success.into_iter().for_each(|handler| handler(self)),
            Err(error) => failure.into_iter().for_each(|handler| handler(self, &error)),
        }
    }

    /// Give up on a tile the queue dropped before it started
    fn abandon(&self, error: FetchError) {
        if self.phase() == TilePhase::Queued {
            self.settle(Err(error));
        }
    }

    async fn drive_queued(self, ticket: AdmissionTicket<Tile>) {
        match ticket.await {
            Admission::Granted(slot) => {
                if self.begin_fetch() {
                    self.clone().retrieve().await;
                } else {
                    let _ = self.completion().await;
                }
                drop(slot);
            }
            Admission::Discarded => self.abandon(FetchError::Discarded),
            Admission::Removed => self.abandon(FetchError::Removed),
        }
    }

    /// Register completion handlers and make sure the fetch is under way.
    ///
    /// The first call on an idle tile that belongs to a queue submits it
    /// there instead of fetching right away. Handlers registered after the
    /// tile settled run immediately.
    pub fn then<S, F>(&self, on_success: S, on_failure: F) -> &Self
    where
        S: FnOnce(&Tile) + Send + 'static,
        F: FnOnce(&Tile, &FetchError) + Send + 'static,
    {
        self.subscribe(Box::new(on_success), Box::new(on_failure));
        self.start();
        self
    }

    /// Failure-only variant of [`Tile::then`]
    pub fn catch<F>(&self, on_failure: F) -> &Self
    where
        F: FnOnce(&Tile, &FetchError) + Send + 'static,
    {
        self.then(|_| {}, on_failure)
    }

    fn start(&self) {
        let queue = {
            let mut state = self.lock();
            if state.phase != TilePhase::Idle {
                return;
            }
            match self.inner.queue.as_ref().and_then(WeakFetchQueue::upgrade) {
                Some(queue) => {
                    state.phase = TilePhase::Queued;
                    Some(queue)
                }
                None => None,
            }
        };

        match queue {
            Some(queue) => {
                if let Enqueued::New(ticket) = queue.add(self.clone(), false) {
                    runtime::spawn(self.clone().drive_queued(ticket));
                }
            }
            None => self.fetch(),
        }
    }

    fn subscribe(&self, on_success: SuccessFn, on_failure: FailureFn) {
        let settled = {
            let mut state = self.lock();
            match state.phase {
                TilePhase::Fetched => Ok(on_success),
                TilePhase::Failed => Err((
                    on_failure,
                    state.error.clone().unwrap_or(FetchError::Other("unknown".into())),
                )),
                _ => {
                    state.on_success.push(on_success);
                    state.on_failure.push(on_failure);
                    return;
                }
            }
        };
        match settled {
            Ok(handler) => handler(self),
            Err((handler, error)) => handler(self, &error),
        }
    }

    /// Resolves when the tile settles, without starting anything
    pub fn completion(
        &self,
    ) -> impl Future<Output = Result<TileData, FetchError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let on_error = tx.clone();
        self.subscribe(
            Box::new(move |tile: &Tile| {
                if let Some(tx) = tx.lock().ok().and_then(|mut tx| tx.take()) {
                    let _ = tx.send(tile.data().ok_or(FetchError::Other("missing data".into())));
                }
            }),
            Box::new(move |_: &Tile, error: &FetchError| {
                if let Some(tx) = on_error.lock().ok().and_then(|mut tx| tx.take()) {
                    let _ = tx.send(Err(error.clone()));
                }
            }),
        );
        async move { rx.await.unwrap_or(Err(FetchError::Removed)) }
    }

    /// Edges relative to the tile at `origin` shifted by `shift` pixels
    pub fn bounds(&self, origin: (i64, i64), shift: (f64, f64)) -> TileEdges {
        self.footprint().bounds(origin, shift)
    }

    pub fn left(&self) -> f64 {
        self.footprint().edges().left
    }

    pub fn right(&self) -> f64 {
        self.footprint().edges().right
    }

    pub fn top(&self) -> f64 {
        self.footprint().edges().top
    }

    pub fn bottom(&self) -> f64 {
        self.footprint().edges().bottom
    }
}

impl PartialEq for Tile {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Tile {}

impl Hash for Tile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash.hash(state);
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.hash)
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("index", &self.index())
            .field("phase", &self.phase())
            .finish()
    }
}
