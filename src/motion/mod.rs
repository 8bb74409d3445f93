#![allow(dead_code)]

pub mod detector;
pub mod sampling;

pub use detector::{MotionDetector, MotionResult};
pub use sampling::SamplingGovernor;
