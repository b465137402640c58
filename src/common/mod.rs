mod constants;
pub mod logging;
mod types;

pub use constants::*;
pub use types::*;
