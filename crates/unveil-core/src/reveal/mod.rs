mod coordinator;
pub mod guidance;
mod record;
mod timers;

pub use coordinator::{RevealCoordinator, RevealRequest, RevealResponse, RevealSummary};
pub use guidance::Guidance;
pub use record::{Reveal, RevealStage, RevealStatus};
pub use timers::StageTimers;
