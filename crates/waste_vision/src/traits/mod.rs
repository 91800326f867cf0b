use std::sync::Arc;

use image::{GrayImage, RgbImage};
use crate::{
    algorithms::SegmentMap,
    error::Result,
    types::{ClassificationResult, Contour, FeatureVector},
};

/// Trait for edge detection algorithms
pub trait EdgeDetector: Send + Sync {
    /// Produce a binary edge map (edge pixels are non-zero)
    fn detect_edges(&self, image: &GrayImage, low: f32, high: f32) -> Result<GrayImage>;
}

/// Trait for contour extraction algorithms
pub trait ContourExtractor: Send + Sync {
    /// Extract every contour (outer borders and holes) from a binary image
    fn extract_contours(&self, image: &GrayImage) -> Result<Vec<Contour>>;
}

/// Trait for superpixel segmentation
pub trait Segmenter: Send + Sync {
    fn segment(&self, image: &RgbImage) -> Result<SegmentMap>;
}

/// Feature vector in, label out.
pub trait Classifier: Send + Sync {
    fn classify(&self, features: &FeatureVector) -> Result<ClassificationResult>;
}

impl<T: EdgeDetector + ?Sized> EdgeDetector for Arc<T> {
    fn detect_edges(&self, image: &GrayImage, low: f32, high: f32) -> Result<GrayImage> {
        (**self).detect_edges(image, low, high)
    }
}

impl<T: ContourExtractor + ?Sized> ContourExtractor for Arc<T> {
    fn extract_contours(&self, image: &GrayImage) -> Result<Vec<Contour>> {
        (**self).extract_contours(image)
    }
}

impl<T: Segmenter + ?Sized> Segmenter for Arc<T> {
    fn segment(&self, image: &RgbImage) -> Result<SegmentMap> {
        (**self).segment(image)
    }
}
