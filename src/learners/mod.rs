#![allow(dead_code)]

pub mod feedback;
pub mod sleep;

pub use feedback::{FeedbackLearner, RulePreference};
pub use sleep::SleepPatternLearner;
