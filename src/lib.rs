#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

pub mod bandit;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod geo;
pub mod learners;
pub mod logging;
pub mod motion;
pub mod places;
pub mod rules;
pub mod training;
pub mod tray;
pub mod types;
pub mod voiceprint;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CoreConfig;
pub use engine::Context;
pub use error::{CoreError, CoreResult};
#[allow(unused_imports)]
pub use types::*;
