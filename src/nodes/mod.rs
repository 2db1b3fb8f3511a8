//! A handful of ready-made nodes covering common cases (spec §11
//! supplemental): nothing here is load-bearing for the graph core itself,
//! they're just `Node` impls an embedding application can use directly or
//! copy from.

pub mod blit;
pub mod color_image;

pub use blit::{BlitMode, BlitNode, ExternalTarget};
pub use color_image::ColorImageNode;
