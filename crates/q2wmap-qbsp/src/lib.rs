#![allow(clippy::float_cmp, clippy::needless_range_loop)]

//! Polygon kernel of the BSP compiler: windings and plane clipping.

pub mod polylib;
pub mod stats;

pub use polylib::{Winding, WindingSide, MAX_POINTS_ON_WINDING, ON_EPSILON};
pub use stats::WindingStats;
