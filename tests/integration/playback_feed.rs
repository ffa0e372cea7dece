use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vidfeed::player::{CellHandle, Evaluation, PlaybackCoordinator, PlaybackState, VisibleCell};

use crate::common::{CellEvent, MockCell};

fn tick(start: Instant, n: u32) -> Instant {
    start + Duration::from_millis(120) * n
}

/// Replays every play/pause event and checks that no two cells ever play at once
fn assert_single_player(log: &[CellEvent]) {
    let mut playing: Option<usize> = None;
    for event in log {
        match event {
            CellEvent::Play(index, _) => {
                assert!(
                    playing.is_none() || playing == Some(*index),
                    "cell {index} started while {playing:?} was playing"
                );
                playing = Some(*index);
            }
            CellEvent::Pause(index) => {
                if playing == Some(*index) {
                    playing = None;
                }
            }
            CellEvent::Cleanup(_) => {}
        }
    }
}

#[test]
fn visible_switch_from_five_to_seven_pauses_five_first() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let five = MockCell::new(5, log.clone());
    let seven = MockCell::new(7, log.clone());
    let mut coordinator = PlaybackCoordinator::default();
    let start = Instant::now();

    coordinator.update_playback_at(&[VisibleCell::new(five.clone(), 1.0)], false, start);
    log.lock().unwrap().clear();

    coordinator.update_playback_at(
        &[
            VisibleCell::new(five.clone(), 0.4),
            VisibleCell::new(seven.clone(), 0.6),
        ],
        false,
        tick(start, 1),
    );

    assert_eq!(
        *log.lock().unwrap(),
        vec![CellEvent::Pause(5), CellEvent::Play(7, None)]
    );
    assert_eq!(
        coordinator.state(),
        &PlaybackState::Playing(CellHandle::from(seven))
    );
}

#[test]
fn scrolling_feed_never_plays_two_cells() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let cells: Vec<_> = (0..40).map(|i| MockCell::new(i, log.clone())).collect();
    let mut coordinator = PlaybackCoordinator::default();
    let start = Instant::now();

    for step in 0..120u32 {
        let top = (step as usize / 3) % 38;
        let offset = (step % 3) as f64 * 0.3;
        let visible = vec![
            VisibleCell::new(cells[top].clone(), 1.0 - offset),
            VisibleCell::new(cells[top + 1].clone(), 0.2 + offset),
            VisibleCell::new(cells[top + 2].clone(), if step % 7 == 0 { 0.0 } else { 0.1 }),
        ];
        let scrolling = step % 4 == 0;
        cells[top].set_position(Duration::from_millis(step as u64 * 10));

        coordinator.update_playback_at(&visible, scrolling, tick(start, step));

        let playing: Vec<_> = cells
            .iter()
            .filter(|cell| coordinator.state().is_playing(&CellHandle::from((*cell).clone())))
            .collect();
        assert!(playing.len() <= 1);
        assert!(coordinator.progress().len() <= 2 * coordinator.progress().window() + 1);
    }

    assert_single_player(&log.lock().unwrap());
}

#[test]
fn updates_inside_throttle_interval_are_dropped() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = MockCell::new(0, log.clone());
    let b = MockCell::new(1, log.clone());
    let mut coordinator = PlaybackCoordinator::default();
    let start = Instant::now();

    assert_eq!(
        coordinator.update_playback_at(&[VisibleCell::new(a.clone(), 1.0)], false, start),
        Evaluation::Evaluated
    );
    assert_eq!(
        coordinator.update_playback_at(
            &[VisibleCell::new(b.clone(), 1.0)],
            false,
            start + Duration::from_millis(99)
        ),
        Evaluation::Throttled
    );
    assert_eq!(
        coordinator.update_playback_at(
            &[VisibleCell::new(b.clone(), 1.0)],
            false,
            start + Duration::from_millis(100)
        ),
        Evaluation::Evaluated
    );
    assert!(coordinator.state().is_playing(&CellHandle::from(b)));
}

#[test]
fn far_cells_release_players_and_near_cells_keep_them() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let current = MockCell::new(30, log.clone());
    let near = MockCell::new(25, log.clone());
    let far = MockCell::new(3, log.clone());
    let mut coordinator = PlaybackCoordinator::default();

    coordinator.update_playback(
        &[
            VisibleCell::new(current.clone(), 0.8),
            VisibleCell::new(near.clone(), 0.1),
            VisibleCell::new(far.clone(), 0.1),
        ],
        false,
    );

    let near_handle = CellHandle::from(near);
    let far_handle = CellHandle::from(far);
    assert!(coordinator.should_retain_player(&near_handle));
    assert!(!coordinator.should_retain_player(&far_handle));
    assert_eq!(
        *log.lock().unwrap(),
        vec![CellEvent::Play(30, None), CellEvent::Cleanup(3)]
    );
}

#[test]
fn progress_survives_leaving_and_returning() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let first = MockCell::new(10, log.clone());
    let second = MockCell::new(11, log.clone());
    let mut coordinator = PlaybackCoordinator::default();
    let start = Instant::now();

    coordinator.update_playback_at(&[VisibleCell::new(first.clone(), 1.0)], false, start);
    first.set_position(Duration::from_secs(8));
    coordinator.update_playback_at(&[VisibleCell::new(second.clone(), 1.0)], false, tick(start, 1));

    let first_handle = CellHandle::from(first.clone());
    assert_eq!(
        coordinator.get_stored_progress(&first_handle),
        Some(Duration::from_secs(8))
    );

    coordinator.update_playback_at(&[VisibleCell::new(first.clone(), 1.0)], false, tick(start, 2));
    assert_eq!(
        log.lock().unwrap().last(),
        Some(&CellEvent::Play(10, Some(Duration::from_secs(8))))
    );
}

#[test]
fn reused_playing_cell_is_released() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let cell = MockCell::new(2, log.clone());
    let mut coordinator = PlaybackCoordinator::default();
    let handle = CellHandle::from(cell.clone());

    coordinator.update_playback(&[VisibleCell::new(cell, 1.0)], false);
    assert!(coordinator.handle_cell_reuse(&handle));
    assert_eq!(coordinator.state(), &PlaybackState::Idle);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            CellEvent::Play(2, None),
            CellEvent::Pause(2),
            CellEvent::Cleanup(2)
        ]
    );
}

#[test]
fn cell_ready_after_selection_starts_playback() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let cell = MockCell::new(4, log.clone());
    cell.set_ready(false);
    let handle = CellHandle::from(cell.clone());
    let mut coordinator = PlaybackCoordinator::default();

    coordinator.update_playback(&[VisibleCell::new(cell.clone(), 1.0)], false);
    assert_eq!(coordinator.state(), &PlaybackState::Idle);
    assert!(log.lock().unwrap().is_empty());

    cell.set_ready(true);
    coordinator.handle_cell_ready(&handle);
    assert!(coordinator.state().is_playing(&handle));
}

#[test]
fn jump_to_far_cell_that_is_still_loading() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let five = MockCell::new(5, log.clone());
    let thirty = MockCell::new(30, log.clone());
    thirty.set_ready(false);
    let mut coordinator = PlaybackCoordinator::default();
    let start = Instant::now();

    coordinator.update_playback_at(&[VisibleCell::new(five.clone(), 1.0)], false, start);
    coordinator.update_playback_at(&[VisibleCell::new(thirty.clone(), 1.0)], false, tick(start, 1));

    thirty.set_ready(true);
    coordinator.handle_cell_ready(&CellHandle::from(thirty.clone()));

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            CellEvent::Play(5, None),
            CellEvent::Pause(5),
            CellEvent::Play(30, None)
        ]
    );
    assert_single_player(&log.lock().unwrap());
}

#[test]
fn loading_cell_scrolled_away_never_starts() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let cell = MockCell::new(3, log.clone());
    cell.set_ready(false);
    let mut coordinator = PlaybackCoordinator::default();
    let start = Instant::now();

    coordinator.update_playback_at(&[VisibleCell::new(cell.clone(), 1.0)], false, start);
    coordinator.update_playback_at(&[], false, tick(start, 1));

    cell.set_ready(true);
    coordinator.handle_cell_ready(&CellHandle::from(cell));

    assert_eq!(coordinator.state(), &PlaybackState::Idle);
    assert!(log.lock().unwrap().is_empty());
}
