#![allow(dead_code)]

pub mod dbscan;
pub mod signals;

pub use dbscan::{Cluster, PlaceDiscovery, TimePattern};
pub use signals::PlaceSignalLearner;
