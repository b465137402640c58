pub mod control;
pub mod lock;
pub mod report;
pub mod run;
pub mod state;
mod tick;

pub use control::{Detached, StopOutcome};
pub use run::Daemon;
pub use state::DaemonState;
