pub mod clock;
pub mod config;
pub mod error;
pub mod ids;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, DEFAULT_SLA_MINUTES};
pub use error::*;
pub use ids::*;
