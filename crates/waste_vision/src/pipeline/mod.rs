pub mod builder;

use std::{path::Path, sync::Arc};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    basic::{BasicFeatureExtractor, BasicFeatures, Clock},
    canny::{CannyRatioClassifier, CannyVerdict},
    error::Result,
    fusion::FusionFeatureExtractor,
    loader::{ImageLoader, ImageSource, LoadedImage},
    rules::{McCriteria, RuleClassifier, RuleInputs, RuleVerdict},
    traits::{ContourExtractor, EdgeDetector, Segmenter},
    types::{FeatureVector, Label},
};

pub type SharedEdgeDetector = Arc<dyn EdgeDetector>;
pub type SharedContourExtractor = Arc<dyn ContourExtractor>;
pub type SharedSegmenter = Arc<dyn Segmenter>;

/// Everything known about one image after the per-image pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ImageAnalysis {
    pub filename: String,
    pub features: BasicFeatures,
    pub rules: RuleVerdict,
    /// Absent when the edge detector failed on this image
    pub canny: Option<CannyVerdict>,
}

impl ImageAnalysis {
    /// The rule label is authoritative; the Canny verdict is a second opinion.
    pub fn label(&self) -> Label {
        self.rules.label
    }

    pub fn agrees(&self) -> Option<bool> {
        self.canny.map(|canny| canny.label == self.rules.label)
    }

    pub fn to_feature_vector(&self) -> FeatureVector {
        let mut vector = self.features.to_feature_vector();
        vector.insert("rule_score", self.rules.score);
        vector.insert("classification", self.rules.label.to_string());
        if let Some(canny) = &self.canny {
            vector.extend(canny.to_feature_vector());
        }
        vector
    }
}

/// The per-image analysis pipeline: decode, basic features, rules, Canny ratio,
/// and on request the fusion features.
pub struct Analyzer {
    loader: ImageLoader,
    basic: BasicFeatureExtractor<SharedEdgeDetector, SharedContourExtractor>,
    rules: RuleClassifier,
    canny: Option<CannyRatioClassifier<SharedEdgeDetector>>,
    fusion: FusionFeatureExtractor<SharedEdgeDetector, SharedContourExtractor, SharedSegmenter>,
    clock: Arc<dyn Clock>,
}

impl Analyzer {
    pub fn builder() -> builder::AnalyzerBuilder {
        builder::AnalyzerBuilder::new()
    }

    pub(crate) fn new(
        basic: BasicFeatureExtractor<SharedEdgeDetector, SharedContourExtractor>,
        rules: RuleClassifier,
        canny: Option<CannyRatioClassifier<SharedEdgeDetector>>,
        fusion: FusionFeatureExtractor<SharedEdgeDetector, SharedContourExtractor, SharedSegmenter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            loader: ImageLoader,
            basic,
            rules,
            canny,
            fusion,
            clock,
        }
    }

    pub fn load(&self, source: ImageSource<'_>) -> Result<LoadedImage> {
        self.loader.load(source)
    }

    pub fn mc_criteria(&self) -> Option<&McCriteria> {
        self.rules.mc_criteria.as_ref()
    }

    pub fn extract_basic(&self, image: &LoadedImage) -> BasicFeatures {
        self.basic.extract_with_context(image, self.clock.as_ref())
    }

    /// Rule verdict; `mc_criteria` overrides the analyzer's own criteria when given.
    pub fn classify_rules(&self, features: &BasicFeatures, mc_criteria: Option<&McCriteria>) -> RuleVerdict {
        let criteria = mc_criteria.or(self.rules.mc_criteria.as_ref());
        self.rules.evaluate(&RuleInputs::from(&features.technical), criteria)
    }

    /// `Ok(None)` when the Canny stage is disabled.
    pub fn classify_canny(&self, image: &LoadedImage) -> Result<Option<CannyVerdict>> {
        self.canny
            .as_ref()
            .map(|canny| canny.classify_image(image))
            .transpose()
    }

    pub fn extract_fusion(&self, image: &LoadedImage, filename: &str) -> FeatureVector {
        self.fusion.extract(image, filename, self.clock.as_ref())
    }

    pub fn analyze_image(&self, image: &LoadedImage, filename: &str) -> ImageAnalysis {
        let features = self.extract_basic(image);
        let rules = self.classify_rules(&features, None);
        let canny = match self.classify_canny(image) {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(filename, "canny ratio unavailable: {err}");
                None
            }
        };
        debug!(filename, label = %rules.label, score = rules.score, "analysis complete");
        ImageAnalysis {
            filename: filename.to_string(),
            features,
            rules,
            canny,
        }
    }

    /// Decode `source` and run the per-image pipeline on it.
    pub fn analyze(&self, source: ImageSource<'_>, filename: &str) -> Result<ImageAnalysis> {
        let image = self.load(source)?;
        Ok(self.analyze_image(&image, filename))
    }

    pub fn analyze_path(&self, path: &Path) -> Result<ImageAnalysis> {
        self.analyze(ImageSource::Path(path), &file_name(path))
    }

    pub fn fusion_path(&self, path: &Path) -> Result<FeatureVector> {
        let image = self.load(ImageSource::Path(path))?;
        Ok(self.extract_fusion(&image, &file_name(path)))
    }

    pub fn info(&self) -> String {
        format!(
            "Analyzer: basic (canny {}/{}), rules{}, canny ratio {}, fusion (max width {})",
            self.basic.canny_low,
            self.basic.canny_high,
            if self.rules.mc_criteria.is_some() { " + field criteria" } else { "" },
            if self.canny.is_some() { "on" } else { "off" },
            self.fusion.config().max_width,
        )
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        basic::FixedClock,
        canny::CannyConfig,
        error::AnalysisError,
        rules::Eclairage,
        types::FeatureValue,
    };
    use chrono::NaiveDate;
    use image::{GrayImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn clock() -> FixedClock {
        FixedClock(
            NaiveDate::from_ymd_opt(2024, 6, 15)
                .and_then(|d| d.and_hms_opt(12, 30, 0))
                .expect("Valid date"),
        )
    }

    fn png(image: &RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).expect("Should encode");
        out.into_inner()
    }

    /// A dark, cluttered upper half above a plain lower half.
    fn overflowing() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            if y < 32 && (x / 4 + y / 4) % 2 == 0 {
                Rgb([15, 15, 15])
            } else if y < 32 {
                Rgb([200, 200, 200])
            } else {
                Rgb([30, 30, 30])
            }
        })
    }

    struct NoEdges;

    impl EdgeDetector for NoEdges {
        fn detect_edges(&self, image: &GrayImage, _: f32, _: f32) -> Result<GrayImage> {
            Err(AnalysisError::invalid(format!("refusing {}x{}", image.width(), image.height())))
        }
    }

    #[test]
    fn test_analyze_bytes() {
        let analyzer = Analyzer::builder().with_clock(clock()).build().expect("Should build");
        let bytes = png(&overflowing());
        let analysis = analyzer
            .analyze(ImageSource::Bytes(&bytes), "bin.png")
            .expect("Should analyze");
        assert_eq!(analysis.filename, "bin.png");
        assert_eq!(analysis.features.temporal.hour, 12);
        let canny = analysis.canny.expect("canny enabled by default");
        assert!(canny.counts.top > canny.counts.bottom);
        assert_eq!(canny.label, Label::Pleine);
        assert_eq!(analysis.agrees(), Some(analysis.rules.label == Label::Pleine));
    }

    #[test]
    fn test_decode_failure_is_an_error() {
        let analyzer = Analyzer::builder().build().expect("Should build");
        let result = analyzer.analyze(ImageSource::Bytes(b"nope"), "x.jpg");
        assert!(matches!(result, Err(AnalysisError::Decode(_))));
    }

    #[test]
    fn test_fusion_path_keeps_decode_error() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let broken = dir.path().join("broken.jpg");
        std::fs::write(&broken, b"not a jpeg").expect("Should write");
        let good = dir.path().join("bin.png");
        overflowing().save(&good).expect("Should save");

        let analyzer = Analyzer::builder().with_clock(clock()).build().expect("Should build");
        assert!(matches!(analyzer.fusion_path(&broken), Err(AnalysisError::Decode(_))));
        assert!(matches!(
            analyzer.fusion_path(&dir.path().join("missing.png")),
            Err(AnalysisError::Io(_))
        ));

        let row = analyzer.fusion_path(&good).expect("Should extract");
        assert_eq!(row.get("filename"), Some(&FeatureValue::Text("bin.png".into())));
    }

    #[test]
    fn test_failing_edge_detector_degrades_gracefully() {
        let analyzer = Analyzer::builder()
            .set_edge_detector(NoEdges)
            .build()
            .expect("Should build");
        let image = LoadedImage::from_rgb(overflowing(), 0);
        let analysis = analyzer.analyze_image(&image, "bin.png");
        assert_eq!(analysis.features.technical.edge_count, 0);
        assert!(analysis.canny.is_none());
        assert!(analysis.agrees().is_none());
    }

    #[test]
    fn test_call_site_criteria_override_configured_ones() {
        let dark = McCriteria { eclairage: Eclairage::Nuit, ..McCriteria::default() };
        let analyzer = Analyzer::builder()
            .with_mc_criteria(dark)
            .build()
            .expect("Should build");
        let image = LoadedImage::from_rgb(RgbImage::from_pixel(16, 16, Rgb([20, 20, 20])), 0);
        let features = analyzer.extract_basic(&image);

        let configured = analyzer.classify_rules(&features, None);
        assert_eq!(configured.adjustment, Some(dark.adjustment()));

        let open = McCriteria { ouverte: true, ..McCriteria::default() };
        let overridden = analyzer.classify_rules(&features, Some(&open));
        assert_eq!(overridden.adjustment, Some(open.adjustment()));
    }

    #[test]
    fn test_canny_can_be_disabled() {
        let analyzer = Analyzer::builder().without_canny().build().expect("Should build");
        let image = LoadedImage::from_rgb(overflowing(), 0);
        assert_eq!(analyzer.classify_canny(&image).expect("No error"), None);
        assert!(analyzer.info().contains("canny ratio off"));
    }

    #[test]
    fn test_invalid_canny_config_fails_build() {
        let result = Analyzer::builder()
            .with_canny(CannyConfig { low_threshold: 300.0, high_threshold: 10.0, ..CannyConfig::default() })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_feature_vector_carries_classification() {
        let analyzer = Analyzer::builder().with_clock(clock()).build().expect("Should build");
        let image = LoadedImage::from_rgb(overflowing(), 0);
        let vector = analyzer.analyze_image(&image, "bin.png").to_feature_vector();
        assert!(vector.contains_key("brightness"));
        assert!(vector.contains_key("day_of_week"));
        assert!(vector.contains_key("classification"));
        assert!(vector.contains_key("canny_ratio"));
    }
}
