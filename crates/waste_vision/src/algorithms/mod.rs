pub mod color;
pub mod edges;
pub mod extraction;
pub mod morphology;
pub mod preprocessing;
pub mod segmentation;
pub mod stats;
pub mod texture;

pub use extraction::*;
pub use preprocessing::{to_gray, resize_to_max_width};
pub use segmentation::{RegionStats, SegmentMap, SlicSegmenter};
