pub mod applier;
pub mod arbiter;
pub mod clock;
pub mod cmd;
pub mod config;
pub mod error;
pub mod notify;
pub mod telemetry;
