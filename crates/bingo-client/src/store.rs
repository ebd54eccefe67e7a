//! Board reconciliation store.
//!
//! Folds `connected`/`syncBoard` (full replace) and `cellUpdate` (one
//! cell) into an immutable [`BoardSnapshot`] that renderers can hold on
//! to. Snapshots use structural sharing: each row sits behind its own
//! `Arc`, so a cell update allocates one new row and one new outer
//! vector, and every untouched row keeps its identity. Consumers can
//! compare with [`Arc::ptr_eq`] to skip work.
//!
//! The store is a plain value owned by whoever builds the client; there
//! is no global instance. Cloning a [`BoardStore`] yields another handle
//! to the same board.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use bingo_protocol::{Board, Cell};

// ---------------------------------------------------------------------------
// BoardSnapshot
// ---------------------------------------------------------------------------

/// An immutable view of the board at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoardSnapshot {
    pub hidden: bool,
    pub rows: Vec<Arc<Vec<Cell>>>,
}

impl BoardSnapshot {
    fn from_board(board: Board) -> Self {
        Self {
            hidden: board.hidden,
            rows: board.board.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, |row| row.len())
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.rows.get(row).is_some_and(|r| col < r.len())
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row)?.get(col)
    }
}

// ---------------------------------------------------------------------------
// BoardStore
// ---------------------------------------------------------------------------

type Listener = Arc<dyn Fn(&Arc<BoardSnapshot>) + Send + Sync>;

struct StoreInner {
    snapshot: RwLock<Arc<BoardSnapshot>>,
    /// The snapshot before any server data arrived. Never changes.
    initial: Arc<BoardSnapshot>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
}

/// Client-side board state, kept in step with the authority's broadcasts.
///
/// Listeners run synchronously on the thread that applied the change, in
/// registration order, once per change. No lock is held while they run, so
/// a listener may read [`snapshot`](Self::snapshot) or even subscribe.
#[derive(Clone)]
pub struct BoardStore {
    inner: Arc<StoreInner>,
}

impl BoardStore {
    pub fn new() -> Self {
        let initial = Arc::new(BoardSnapshot::default());
        Self {
            inner: Arc::new(StoreInner {
                snapshot: RwLock::new(Arc::clone(&initial)),
                initial,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        let guard = self
            .inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// The snapshot to render before the server has sent anything. Always
    /// the same `Arc`.
    pub fn server_snapshot(&self) -> Arc<BoardSnapshot> {
        Arc::clone(&self.inner.initial)
    }

    /// Registers `listener`. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(
        &self,
        listener: impl Fn(&Arc<BoardSnapshot>) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        Subscription {
            store: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Replaces the whole board. Always produces a new snapshot, even if
    /// the board is equal to the current one.
    pub fn replace(&self, board: Board) {
        let next = Arc::new(BoardSnapshot::from_board(board));
        *self
            .inner
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        self.notify(&next);
    }

    /// Applies one cell from a `cellUpdate`.
    ///
    /// Only row `row` is copied. Returns `false` without touching the
    /// snapshot when the board is hidden or `(row, col)` is out of range.
    pub fn apply_cell(&self, row: usize, col: usize, cell: Cell) -> bool {
        let next = {
            let mut guard = self
                .inner
                .snapshot
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if guard.hidden {
                tracing::debug!(row, col, "cell update while hidden, ignoring");
                return false;
            }
            if !guard.contains(row, col) {
                tracing::warn!(row, col, "cell update out of range, ignoring");
                return false;
            }

            let mut rows = guard.rows.clone();
            let mut new_row = Vec::clone(&rows[row]);
            new_row[col] = cell;
            rows[row] = Arc::new(new_row);

            let next = Arc::new(BoardSnapshot {
                hidden: guard.hidden,
                rows,
            });
            *guard = Arc::clone(&next);
            next
        };
        self.notify(&next);
        true
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, snapshot: &Arc<BoardSnapshot>) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BoardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardStore")
            .field("snapshot", &self.snapshot())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Keeps a listener registered. Dropping it unsubscribes.
pub struct Subscription {
    store: Weak<StoreInner>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
