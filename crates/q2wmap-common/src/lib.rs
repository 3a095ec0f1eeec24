#![allow(clippy::float_cmp, clippy::needless_range_loop, clippy::manual_range_contains)]

//! Shared pieces of the map tools: vector math, the BSP file layout and its
//! lump store, the visibility codec and the entity text format.

pub mod error;
pub mod q_shared;
pub mod qfiles;
pub mod vis;
pub mod bspfile;
pub mod entities;

pub use bspfile::BspFile;
pub use error::{CapacityError, Error, FormatError, Result};
