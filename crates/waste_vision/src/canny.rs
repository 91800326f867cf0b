use std::path::Path;

use image::GrayImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    algorithms::CannyEdgeDetector,
    error::{AnalysisError, Result},
    loader::{ImageLoader, LoadedImage},
    traits::EdgeDetector,
    types::{ClassificationResult, EdgeCounts, FeatureVector, Label, Method},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct CannyConfig {
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// The image is full when the top/bottom edge ratio is strictly above this value
    pub ratio_threshold: f64,
}

impl Default for CannyConfig {
    fn default() -> Self {
        Self {
            low_threshold: 50.0,
            high_threshold: 150.0,
            ratio_threshold: 1.0,
        }
    }
}

impl CannyConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.low_threshold >= 0.0 && self.high_threshold >= 0.0) {
            return Err(AnalysisError::invalid("canny thresholds must be non-negative"));
        }
        if self.low_threshold > self.high_threshold {
            return Err(AnalysisError::invalid(format!(
                "canny low threshold {} exceeds high threshold {}",
                self.low_threshold, self.high_threshold
            )));
        }
        if !(self.ratio_threshold.is_finite() && self.ratio_threshold > 0.0) {
            return Err(AnalysisError::invalid("canny ratio threshold must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CannyVerdict {
    /// `(top + 1) / (bottom + 1)`
    pub ratio: f64,
    pub label: Label,
    pub counts: EdgeCounts,
}

impl CannyVerdict {
    pub fn to_result(&self) -> ClassificationResult {
        ClassificationResult {
            label: self.label,
            method: Method::CannyRatio,
            score: self.ratio,
            raw_counts: Some(self.counts),
        }
    }

    pub fn to_feature_vector(&self) -> FeatureVector {
        let mut vector = FeatureVector::with_capacity(4);
        vector.insert("canny_ratio", self.ratio);
        vector.insert("canny_label", self.label.to_string());
        vector.insert("canny_top_count", self.counts.top);
        vector.insert("canny_bottom_count", self.counts.bottom);
        vector
    }
}

/// Compares edge density in the upper half of the frame with the lower half.
///
/// Overflowing waste adds structure above the container rim, so a full bin
/// tends to have more edges on top.
#[derive(Debug, Clone)]
pub struct CannyRatioClassifier<E = CannyEdgeDetector>
where
    E: EdgeDetector,
{
    edge_detector: E,
    config: CannyConfig,
}

impl CannyRatioClassifier {
    pub fn standard() -> Self {
        Self {
            edge_detector: CannyEdgeDetector,
            config: CannyConfig::default(),
        }
    }
}

impl Default for CannyRatioClassifier {
    fn default() -> Self {
        Self::standard()
    }
}

impl<E: EdgeDetector> CannyRatioClassifier<E> {
    pub fn new(edge_detector: E, config: CannyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            edge_detector,
            config,
        })
    }

    pub fn config(&self) -> &CannyConfig {
        &self.config
    }

    pub fn classify_gray(&self, gray: &GrayImage) -> Result<CannyVerdict> {
        let edges = self.edge_detector.detect_edges(
            gray,
            self.config.low_threshold,
            self.config.high_threshold,
        )?;
        let counts = split_counts(&edges);
        let ratio = (counts.top as f64 + 1.0) / (counts.bottom as f64 + 1.0);
        let label = Label::from_full(ratio > self.config.ratio_threshold);
        debug!(top = counts.top, bottom = counts.bottom, ratio, %label, "canny ratio");
        Ok(CannyVerdict { ratio, label, counts })
    }

    pub fn classify_image(&self, image: &LoadedImage) -> Result<CannyVerdict> {
        self.classify_gray(&image.gray())
    }

    /// `None` when the image cannot be read or analysed.
    pub fn classify_path(&self, path: &Path) -> Option<CannyVerdict> {
        let outcome = ImageLoader
            .load_path(path)
            .and_then(|image| self.classify_image(&image));
        match outcome {
            Ok(verdict) => Some(verdict),
            Err(err) => {
                warn!("canny ratio unavailable for {}: {err}", path.display());
                None
            }
        }
    }
}

/// Edge pixels in rows `[0, h/2)` and `[h/2, h)`.
fn split_counts(edges: &GrayImage) -> EdgeCounts {
    let mid = edges.height() / 2;
    let mut counts = EdgeCounts { top: 0, bottom: 0 };
    for (_, y, pixel) in edges.enumerate_pixels() {
        if pixel.0[0] == 0 {
            continue;
        }
        if y < mid {
            counts.top += 1;
        } else {
            counts.bottom += 1;
        }
    }
    counts
}

/// Classify the image at `path` with default thresholds.
pub fn classify_canny(path: impl AsRef<Path>) -> Option<CannyVerdict> {
    CannyRatioClassifier::standard().classify_path(path.as_ref())
}
