use std::sync::Arc;

use crate::{
    algorithms::{CannyEdgeDetector, ImageprocContourExtractor},
    basic::{BasicFeatureExtractor, Clock, SystemClock},
    canny::{CannyConfig, CannyRatioClassifier},
    error::{AnalysisError, Result},
    fusion::{FusionConfig, FusionFeatureExtractor},
    pipeline::{Analyzer, SharedContourExtractor, SharedEdgeDetector, SharedSegmenter},
    rules::{McCriteria, RuleClassifier},
    traits::{ContourExtractor, EdgeDetector, Segmenter},
};

/// Builder for [`Analyzer`] with a fluent API. Unset primitives fall back to the
/// imageproc implementations and the SLIC segmenter from the fusion config.
pub struct AnalyzerBuilder {
    edge_detector: Option<SharedEdgeDetector>,
    contour_extractor: Option<SharedContourExtractor>,
    segmenter: Option<SharedSegmenter>,
    clock: Option<Arc<dyn Clock>>,
    mc_criteria: Option<McCriteria>,
    basic_thresholds: (f32, f32),
    canny: Option<CannyConfig>,
    fusion: FusionConfig,
}

impl AnalyzerBuilder {
    pub fn new() -> Self {
        Self {
            edge_detector: None,
            contour_extractor: None,
            segmenter: None,
            clock: None,
            mc_criteria: None,
            basic_thresholds: (100.0, 200.0),
            canny: Some(CannyConfig::default()),
            fusion: FusionConfig::default(),
        }
    }

    /// Set the edge detector shared by every stage (replaces any existing one)
    pub fn set_edge_detector<E>(mut self, detector: E) -> Self
    where
        E: EdgeDetector + 'static,
    {
        self.edge_detector = Some(Arc::new(detector));
        self
    }

    pub fn set_contour_extractor<C>(mut self, extractor: C) -> Self
    where
        C: ContourExtractor + 'static,
    {
        self.contour_extractor = Some(Arc::new(extractor));
        self
    }

    pub fn set_segmenter<S>(mut self, segmenter: S) -> Self
    where
        S: Segmenter + 'static,
    {
        self.segmenter = Some(Arc::new(segmenter));
        self
    }

    pub fn with_clock<K>(mut self, clock: K) -> Self
    where
        K: Clock + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Field criteria applied to every rule verdict unless overridden per call
    pub fn with_mc_criteria(mut self, criteria: McCriteria) -> Self {
        self.mc_criteria = Some(criteria);
        self
    }

    pub fn with_optional_mc_criteria(mut self, criteria: Option<McCriteria>) -> Self {
        self.mc_criteria = criteria;
        self
    }

    /// Canny thresholds used for the basic edge and contour counts
    pub fn with_basic_thresholds(mut self, low: f32, high: f32) -> Self {
        self.basic_thresholds = (low, high);
        self
    }

    pub fn with_canny(mut self, config: CannyConfig) -> Self {
        self.canny = Some(config);
        self
    }

    pub fn without_canny(mut self) -> Self {
        self.canny = None;
        self
    }

    pub fn with_fusion(mut self, config: FusionConfig) -> Self {
        self.fusion = config;
        self
    }

    /// Validate the configuration and assemble the analyzer
    pub fn build(self) -> Result<Analyzer> {
        let (low, high) = self.basic_thresholds;
        if !(low >= 0.0 && low <= high) {
            return Err(AnalysisError::invalid(format!(
                "basic canny thresholds must satisfy 0 <= low <= high, got {low}/{high}"
            )));
        }

        let edge_detector: SharedEdgeDetector = self
            .edge_detector
            .unwrap_or_else(|| Arc::new(CannyEdgeDetector));
        let contour_extractor: SharedContourExtractor = self
            .contour_extractor
            .unwrap_or_else(|| Arc::new(ImageprocContourExtractor));
        let segmenter: SharedSegmenter = match self.segmenter {
            Some(segmenter) => segmenter,
            None => Arc::new(self.fusion.slic.clone()),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let mut basic = BasicFeatureExtractor::new(edge_detector.clone(), contour_extractor.clone());
        basic.canny_low = low;
        basic.canny_high = high;

        let canny = self
            .canny
            .map(|config| CannyRatioClassifier::new(edge_detector.clone(), config))
            .transpose()?;
        let fusion = FusionFeatureExtractor::new(self.fusion, edge_detector, contour_extractor, segmenter)?;

        Ok(Analyzer::new(basic, RuleClassifier::new(self.mc_criteria), canny, fusion, clock))
    }

    /// Defaults everywhere, with optional field criteria
    pub fn build_default(mc_criteria: Option<McCriteria>) -> Result<Analyzer> {
        Self::new().with_optional_mc_criteria(mc_criteria).build()
    }
}

impl Default for AnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithms::{SegmentMap, SlicSegmenter},
        fusion::ZoneBoundaries,
        loader::LoadedImage,
        types::FeatureValue,
    };
    use image::{Rgb, RgbImage};

    struct OneSegment;

    impl Segmenter for OneSegment {
        fn segment(&self, image: &RgbImage) -> Result<SegmentMap> {
            let (width, height) = image.dimensions();
            Ok(SegmentMap {
                width,
                height,
                labels: vec![0; (width * height) as usize],
                count: 1,
            })
        }
    }

    #[test]
    fn test_custom_segmenter_reaches_fusion() {
        let analyzer = AnalyzerBuilder::new()
            .set_segmenter(OneSegment)
            .build()
            .expect("Should build");
        let image = LoadedImage::from_rgb(RgbImage::from_pixel(20, 20, Rgb([50, 90, 10])), 0);
        let row = analyzer.extract_fusion(&image, "one.png");
        assert_eq!(row.get("color_segments"), Some(&FeatureValue::Int(1)));
        assert_eq!(row.get_f64("largest_segment_dominance"), Some(1.0));
    }

    #[test]
    fn test_invalid_fusion_config_fails_build() {
        let fusion = FusionConfig {
            zones: ZoneBoundaries { side_fraction: 0.9, ..ZoneBoundaries::default() },
            ..FusionConfig::default()
        };
        assert!(AnalyzerBuilder::new().with_fusion(fusion).build().is_err());
    }

    #[test]
    fn test_inverted_basic_thresholds_fail_build() {
        assert!(AnalyzerBuilder::new().with_basic_thresholds(200.0, 100.0).build().is_err());
    }

    #[test]
    fn test_default_segmenter_follows_fusion_config() {
        let fusion = FusionConfig {
            slic: SlicSegmenter { segments: 4, ..SlicSegmenter::default() },
            ..FusionConfig::default()
        };
        let analyzer = AnalyzerBuilder::new().with_fusion(fusion).build().expect("Should build");
        let image = LoadedImage::from_rgb(RgbImage::from_fn(40, 40, |x, y| {
            Rgb([(x * 6) as u8, (y * 6) as u8, 90])
        }), 0);
        let row = analyzer.extract_fusion(&image, "grad.png");
        let segments = row.get_f64("color_segments").expect("present");
        assert!(segments >= 1.0 && segments <= 8.0, "got {segments}");
    }

    #[test]
    fn test_build_default_keeps_criteria() {
        let criteria = McCriteria { chevrons: true, ..McCriteria::default() };
        let analyzer = AnalyzerBuilder::build_default(Some(criteria)).expect("Should build");
        assert_eq!(analyzer.mc_criteria(), Some(&criteria));
    }
}
