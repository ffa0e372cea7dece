pub mod adaptive_quality;
pub mod coordinator;
pub mod playable;
pub mod progress;
pub mod types;

pub use adaptive_quality::determine_optimal_quality;
pub use coordinator::{Evaluation, PlaybackCoordinator};
pub use playable::{FormatDetector, MediaFormat, PlayableHandle};
pub use progress::ProgressTracker;
pub use types::{CellHandle, PlaybackState, PlayerCell, VisibleCell};
