//! # Playback Coordinator
//!
//! Decides which feed cell plays. The feed reports the visible cells on
//! every layout pass and the coordinator moves between
//! `Idle`, `Playing(cell)`, `Paused(cell)` and `Error(cause)` so that at most
//! one cell is ever playing.
//!
//! Positions of paused items are kept in a [`ProgressTracker`] window around
//! the current index. Cells outside that window are told to release their
//! player; cells inside keep it so resuming is instant.

use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::progress::ProgressTracker;
use super::types::{CellHandle, PlaybackState, VisibleCell};
use crate::config::PlaybackConfig;
use crate::constants::{DEFAULT_EVALUATION_INTERVAL, DEFAULT_PROGRESS_WINDOW};
use crate::utils::{FeedError, Result};

/// What `update_playback` did with a visibility report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Evaluated,
    /// Dropped because the previous evaluation was too recent
    Throttled,
    /// Dropped because the hosting screen is hidden
    Suppressed,
}

pub struct PlaybackCoordinator {
    state: PlaybackState,
    /// Cell chosen to play that was not ready yet
    pending: Option<CellHandle>,
    screen_visible: bool,
    last_evaluation: Option<Instant>,
    evaluation_interval: Duration,
    progress: ProgressTracker,
}

impl Default for PlaybackCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_EVALUATION_INTERVAL, DEFAULT_PROGRESS_WINDOW)
    }
}

impl PlaybackCoordinator {
    pub fn new(evaluation_interval: Duration, progress_window: usize) -> Self {
        Self {
            state: PlaybackState::Idle,
            pending: None,
            screen_visible: true,
            last_evaluation: None,
            evaluation_interval,
            progress: ProgressTracker::new(progress_window),
        }
    }

    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(config.evaluation_interval(), config.progress_window)
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn playing_cell(&self) -> Option<&CellHandle> {
        match &self.state {
            PlaybackState::Playing(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn update_playback(&mut self, visible: &[VisibleCell], scrolling: bool) -> Evaluation {
        self.update_playback_at(visible, scrolling, Instant::now())
    }

    /// Evaluate a visibility report observed at `now`
    pub fn update_playback_at(
        &mut self,
        visible: &[VisibleCell],
        scrolling: bool,
        now: Instant,
    ) -> Evaluation {
        if !self.screen_visible {
            return Evaluation::Suppressed;
        }
        if let Some(last) = self.last_evaluation {
            if now.saturating_duration_since(last) < self.evaluation_interval {
                trace!("Visibility update throttled");
                return Evaluation::Throttled;
            }
        }
        self.last_evaluation = Some(now);

        let target = Self::most_visible(visible).cloned();
        if self.pending.is_some() && self.pending != target {
            debug!("Dropping pending {:?}", self.pending);
            self.pending = None;
        }

        match target {
            None => {
                if let PlaybackState::Playing(current) = self.state.clone() {
                    debug!("No visible cell, pausing {:?}", current);
                    self.pause_cell(&current);
                    self.state = PlaybackState::Paused(current);
                }
            }
            Some(target) => self.transition_to(target, scrolling),
        }

        self.release_out_of_window(visible);
        Evaluation::Evaluated
    }

    /// Hide or show the hosting screen. Hiding pauses playback and stops
    /// evaluation until the screen is shown again.
    pub fn set_screen_visibility(&mut self, visible: bool) {
        if self.screen_visible == visible {
            return;
        }
        self.screen_visible = visible;

        if visible {
            info!("Feed screen visible, resuming evaluation");
            self.last_evaluation = None;
        } else {
            info!("Feed screen hidden, pausing playback");
            if let PlaybackState::Playing(current) = self.state.clone() {
                self.pause_cell(&current);
                self.state = PlaybackState::Paused(current);
            }
        }
    }

    /// Start a cell that was chosen before its player was ready
    pub fn handle_cell_ready(&mut self, cell: &CellHandle) {
        if self.pending.as_ref() != Some(cell) {
            return;
        }
        if !self.screen_visible {
            debug!("{:?} ready while screen hidden, keeping it pending", cell);
            return;
        }
        if let PlaybackState::Playing(current) = self.state.clone() {
            self.pause_cell(&current);
            self.state = PlaybackState::Paused(current);
        }
        self.start(cell.clone());
    }

    /// The feed is recycling `cell` for a different item. Returns whether
    /// the cell was told to release its player.
    pub fn handle_cell_reuse(&mut self, cell: &CellHandle) -> bool {
        if self.pending.as_ref() == Some(cell) {
            self.pending = None;
        }

        let in_window = self.progress.in_window(cell.index());
        let release = if self.state.is_playing(cell) {
            self.pause_cell(cell);
            self.state = PlaybackState::Idle;
            true
        } else if self.state.active_cell() == Some(cell) {
            self.state = PlaybackState::Idle;
            !in_window
        } else {
            !in_window
        };

        if release {
            debug!("Releasing player for reused {:?}", cell);
            cell.cleanup();
        }
        release
    }

    pub fn record_progress(&mut self, cell: &CellHandle, position: Duration) {
        if !self.progress.record(cell.index(), position) {
            trace!("Ignoring progress for {:?} outside window", cell);
        }
    }

    pub fn get_stored_progress(&self, cell: &CellHandle) -> Option<Duration> {
        self.progress.get(cell.index())
    }

    pub fn should_retain_player(&self, cell: &CellHandle) -> bool {
        self.progress.in_window(cell.index())
    }

    /// Move to `Error` after the active or pending cell failed to play.
    pub fn report_playback_error(&mut self, cell: &CellHandle, cause: impl Into<String>) -> Result<()> {
        let owns_playback =
            self.state.active_cell() == Some(cell) || self.pending.as_ref() == Some(cell);
        if !owns_playback {
            return Err(FeedError::State(format!(
                "{:?} reported an error but does not own playback ({:?})",
                cell, self.state
            )));
        }

        let cause = cause.into();
        warn!("Playback error on {:?}: {}", cell, cause);
        if self.state.is_playing(cell) {
            cell.pause();
        }
        self.pending = None;
        self.state = PlaybackState::Error(cause);
        Ok(())
    }

    fn transition_to(&mut self, target: CellHandle, scrolling: bool) {
        match self.state.clone() {
            PlaybackState::Idle | PlaybackState::Error(_) => self.start(target),
            PlaybackState::Playing(current) => {
                if current != target {
                    debug!("Transition {:?} -> {:?}", current, target);
                    self.pause_cell(&current);
                    self.state = PlaybackState::Paused(current);
                    self.start(target);
                }
            }
            PlaybackState::Paused(current) => {
                if scrolling {
                    return;
                }
                if current == target {
                    debug!("Resuming {:?}", current);
                } else {
                    debug!("Switching {:?} -> {:?}", current, target);
                }
                self.start(target);
            }
        }
    }

    fn start(&mut self, cell: CellHandle) {
        self.progress.set_current_index(cell.index());
        if !cell.is_ready() {
            debug!("{:?} not ready, waiting", cell);
            self.pending = Some(cell);
            return;
        }

        self.pending = None;
        let resume_from = self.progress.get(cell.index());
        cell.play(resume_from);
        self.state = PlaybackState::Playing(cell);
    }

    fn pause_cell(&mut self, cell: &CellHandle) {
        if let Some(position) = cell.current_position() {
            self.progress.record(cell.index(), position);
        }
        cell.pause();
    }

    fn release_out_of_window(&self, visible: &[VisibleCell]) {
        let active = self.state.active_cell();
        for entry in visible {
            if active == Some(&entry.cell)
                || self.pending.as_ref() == Some(&entry.cell)
                || self.progress.in_window(entry.cell.index())
            {
                continue;
            }
            trace!("Releasing out-of-window {:?}", entry.cell);
            entry.cell.cleanup();
        }
    }

    /// Greatest visible fraction wins; ties go to the lowest feed index
    fn most_visible(visible: &[VisibleCell]) -> Option<&CellHandle> {
        visible
            .iter()
            .filter(|entry| entry.visible_fraction > 0.0)
            .fold(None::<&VisibleCell>, |best, entry| match best {
                Some(best)
                    if best.visible_fraction > entry.visible_fraction
                        || (best.visible_fraction == entry.visible_fraction
                            && best.cell.index() <= entry.cell.index()) =>
                {
                    Some(best)
                }
                _ => Some(entry),
            })
            .map(|entry| &entry.cell)
    }
}
