use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// A player unit hosted by one feed cell.
///
/// Implemented by the UI layer. Calls come from the playback coordinator
/// and must not block.
pub trait PlayerCell: Send + Sync {
    /// Position of the item this cell currently shows in the feed
    fn index(&self) -> usize;

    /// Whether the underlying player has media loaded and can start
    fn is_ready(&self) -> bool;

    fn play(&self, resume_from: Option<Duration>);

    fn pause(&self);

    /// Release the underlying player resource
    fn cleanup(&self);

    fn current_position(&self) -> Option<Duration>;
}

/// Shared reference to a cell, compared by identity
#[derive(Clone)]
pub struct CellHandle(Arc<dyn PlayerCell>);

impl CellHandle {
    pub fn new(cell: Arc<dyn PlayerCell>) -> Self {
        Self(cell)
    }
}

impl<C: PlayerCell + 'static> From<Arc<C>> for CellHandle {
    fn from(cell: Arc<C>) -> Self {
        Self(cell)
    }
}

impl Deref for CellHandle {
    type Target = dyn PlayerCell;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for CellHandle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl Eq for CellHandle {}

impl fmt::Debug for CellHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CellHandle").field(&self.0.index()).finish()
    }
}

/// A cell together with how much of it is on screen
#[derive(Debug, Clone)]
pub struct VisibleCell {
    pub cell: CellHandle,
    /// Fraction of the cell's bounds currently on screen, 0.0 to 1.0
    pub visible_fraction: f64,
}

impl VisibleCell {
    pub fn new(cell: impl Into<CellHandle>, visible_fraction: f64) -> Self {
        Self {
            cell: cell.into(),
            visible_fraction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing(CellHandle),
    Paused(CellHandle),
    Error(String),
}

impl PlaybackState {
    /// The cell currently owning playback, playing or paused
    pub fn active_cell(&self) -> Option<&CellHandle> {
        match self {
            PlaybackState::Playing(cell) | PlaybackState::Paused(cell) => Some(cell),
            PlaybackState::Idle | PlaybackState::Error(_) => None,
        }
    }

    pub fn is_playing(&self, cell: &CellHandle) -> bool {
        matches!(self, PlaybackState::Playing(current) if current == cell)
    }
}
