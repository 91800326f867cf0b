//! Fusion feature extraction: about two hundred descriptors in six families.
//!
//! Each family is split into blocks. A block declares its key set up front and
//! computes a [`FeatureVector`] with exactly those keys; when the computation
//! fails (or returns a different shape, or a non-finite number) the block is
//! replaced by zeros under the same keys. The output shape therefore never
//! depends on the image.
//!
//! ```rust,no_run
//! use waste_vision::fusion::{FusionConfig, FusionFeatureExtractor};
//! use waste_vision::basic::SystemClock;
//!
//! let extractor = FusionFeatureExtractor::standard(FusionConfig::default())?;
//! if let Some(row) = extractor.extract_path("bin_0001.jpg".as_ref(), &SystemClock) {
//!     println!("{} features", row.len());
//! }
//! # Ok::<(), waste_vision::AnalysisError>(())
//! ```

pub mod basic;
pub mod color;
pub mod edges;
pub mod morphology;
pub mod spatial;
pub mod texture;

use std::path::Path;

use image::{GrayImage, RgbImage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, IntoEnumIterator, VariantNames};
use tracing::{debug, warn};

use crate::{
    algorithms::{
        CannyEdgeDetector, ImageprocContourExtractor, SlicSegmenter,
        color::HsvPlanes,
        preprocessing::{resize_to_max_width, to_gray},
    },
    basic::{Clock, SystemClock, TemporalContext},
    error::{AnalysisError, FeatureError, FeatureResult, Result},
    loader::{ImageLoader, LoadedImage},
    traits::{ContourExtractor, EdgeDetector, Segmenter},
    types::{FeatureValue, FeatureVector, ValueKind},
};

pub const METADATA_KEYS: [&str; 3] = ["filename", "timestamp", "total_features"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct PixelThresholds {
    /// Gray levels strictly below this count as dark
    pub dark_intensity: u8,
    /// Gray levels strictly above this count as bright
    pub bright_intensity: u8,
    /// Low Canny threshold for line detection; the high threshold is three times this
    pub edge_sensitivity: u8,
}

impl Default for PixelThresholds {
    fn default() -> Self {
        Self {
            dark_intensity: 60,
            bright_intensity: 200,
            edge_sensitivity: 50,
        }
    }
}

/// Horizontal bands (fractions of the height) and vertical strips (fractions of the width).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct ZoneBoundaries {
    pub ground: (f64, f64),
    pub container: (f64, f64),
    pub overflow: (f64, f64),
    pub side_fraction: f64,
    pub center: (f64, f64),
}

impl Default for ZoneBoundaries {
    fn default() -> Self {
        Self {
            ground: (0.6, 1.0),
            container: (0.2, 0.8),
            overflow: (0.0, 0.6),
            side_fraction: 0.3,
            center: (0.3, 0.7),
        }
    }
}

impl ZoneBoundaries {
    fn validate(&self) -> Result<()> {
        for (name, (start, end)) in [
            ("ground", self.ground),
            ("container", self.container),
            ("overflow", self.overflow),
            ("center", self.center),
        ] {
            if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || start > end {
                return Err(AnalysisError::invalid(format!(
                    "zone '{name}' must satisfy 0 <= start <= end <= 1, got ({start}, {end})"
                )));
            }
        }
        if !(0.0..=0.5).contains(&self.side_fraction) {
            return Err(AnalysisError::invalid("side_fraction must be within [0, 0.5]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct HoughConfig {
    pub vote_threshold: u32,
    pub suppression_radius: u32,
}

impl Default for HoughConfig {
    fn default() -> Self {
        Self {
            vote_threshold: 50,
            suppression_radius: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct FusionConfig {
    pub target_feature_count: usize,
    /// Images wider than this are downscaled before extraction
    pub max_width: u32,
    /// Width of the copy the Gabor bank runs on
    pub gabor_max_width: u32,
    pub pixel_thresholds: PixelThresholds,
    pub zones: ZoneBoundaries,
    pub hough: HoughConfig,
    pub slic: SlicSegmenter,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            target_feature_count: 200,
            max_width: 800,
            gabor_max_width: 200,
            pixel_thresholds: PixelThresholds::default(),
            zones: ZoneBoundaries::default(),
            hough: HoughConfig::default(),
            slic: SlicSegmenter::default(),
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0 || self.gabor_max_width == 0 {
            return Err(AnalysisError::invalid("max widths must be positive"));
        }
        let thresholds = &self.pixel_thresholds;
        if thresholds.dark_intensity >= thresholds.bright_intensity {
            return Err(AnalysisError::invalid(format!(
                "dark threshold {} must be below bright threshold {}",
                thresholds.dark_intensity, thresholds.bright_intensity
            )));
        }
        if self.slic.segments == 0 || !(self.slic.compactness > 0.0) || self.slic.sigma < 0.0 {
            return Err(AnalysisError::invalid("slic needs segments > 0, compactness > 0, sigma >= 0"));
        }
        self.zones.validate()
    }
}

#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureFamily {
    Basic,
    Texture,
    Edges,
    Morphology,
    Spatial,
    Color,
}

impl FeatureFamily {
    pub fn blocks(self) -> &'static [FeatureBlock] {
        match self {
            Self::Basic => basic::BLOCKS,
            Self::Texture => texture::BLOCKS,
            Self::Edges => edges::BLOCKS,
            Self::Morphology => morphology::BLOCKS,
            Self::Spatial => spatial::BLOCKS,
            Self::Color => color::BLOCKS,
        }
    }
}

pub type KeySpec = Vec<(String, ValueKind)>;

/// Everything a block may read. Derived rasters are computed once per image.
pub struct FusionInput<'a> {
    pub rgb: &'a RgbImage,
    pub gray: &'a GrayImage,
    pub hsv: &'a HsvPlanes,
    pub config: &'a FusionConfig,
    pub edge_detector: &'a dyn EdgeDetector,
    pub contour_extractor: &'a dyn ContourExtractor,
    pub segmenter: &'a dyn Segmenter,
}

impl FusionInput<'_> {
    pub fn total_pixels(&self) -> usize {
        (self.gray.width() * self.gray.height()) as usize
    }

    pub(crate) fn require_pixels(&self, block: &'static str) -> FeatureResult<usize> {
        match self.total_pixels() {
            0 => Err(FeatureError::EmptyRegion(block)),
            n => Ok(n),
        }
    }
}

pub struct FeatureBlock {
    pub family: FeatureFamily,
    pub name: &'static str,
    pub keys: fn() -> KeySpec,
    pub compute: fn(&FusionInput<'_>) -> FeatureResult<FeatureVector>,
}

impl FeatureBlock {
    pub fn fallback(&self) -> FeatureVector {
        (self.keys)()
            .into_iter()
            .map(|(key, kind)| (key, FeatureValue::zero(kind)))
            .collect()
    }

    /// Compute the block, checking shape and finiteness.
    pub fn try_run(&self, input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
        let computed = (self.compute)(input)?;
        let expected = (self.keys)();
        let same_shape = computed.len() == expected.len()
            && computed.keys().zip(&expected).all(|(a, (b, _))| a == b);
        if !same_shape {
            return Err(FeatureError::ShapeMismatch {
                block: self.name,
                expected: expected.len(),
                actual: computed.len(),
            });
        }
        let finite = computed.iter().all(|(_, value)| match value {
            FeatureValue::Float(v) => v.is_finite(),
            _ => true,
        });
        if !finite {
            return Err(FeatureError::NonFinite(self.name));
        }
        Ok(computed)
    }

    /// Compute the block, substituting zeros on any failure.
    pub fn run(&self, input: &FusionInput<'_>) -> FeatureVector {
        match self.try_run(input) {
            Ok(features) => features,
            Err(err) => {
                warn!(family = %self.family, block = self.name, "feature block degraded to zeros: {err}");
                self.fallback()
            }
        }
    }
}

pub(crate) fn float_keys(names: &[&str]) -> KeySpec {
    names.iter().map(|name| (name.to_string(), ValueKind::Float)).collect()
}

pub(crate) fn primitive(err: AnalysisError) -> FeatureError {
    match err {
        AnalysisError::Feature(inner) => inner,
        other => FeatureError::Primitive(other.to_string()),
    }
}

/// Names of every feature in output order, metadata last.
pub fn feature_names() -> Vec<String> {
    FeatureFamily::iter()
        .flat_map(|family| family.blocks())
        .flat_map(|block| (block.keys)())
        .map(|(key, _)| key)
        .chain(METADATA_KEYS.iter().map(|key| key.to_string()))
        .collect()
}

/// Stateless fusion extractor; the configuration is explicit and validated once.
pub struct FusionFeatureExtractor<E = CannyEdgeDetector, C = ImageprocContourExtractor, S = SlicSegmenter>
where
    E: EdgeDetector,
    C: ContourExtractor,
    S: Segmenter,
{
    config: FusionConfig,
    edge_detector: E,
    contour_extractor: C,
    segmenter: S,
}

impl FusionFeatureExtractor {
    pub fn standard(config: FusionConfig) -> Result<Self> {
        let segmenter = config.slic.clone();
        Self::new(config, CannyEdgeDetector, ImageprocContourExtractor, segmenter)
    }
}

impl<E, C, S> FusionFeatureExtractor<E, C, S>
where
    E: EdgeDetector,
    C: ContourExtractor,
    S: Segmenter,
{
    pub fn new(config: FusionConfig, edge_detector: E, contour_extractor: C, segmenter: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            edge_detector,
            contour_extractor,
            segmenter,
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Numeric features of one image, without metadata.
    pub fn extract_features(&self, image: &LoadedImage) -> FeatureVector {
        let rgb = resize_to_max_width(&image.raster, self.config.max_width);
        let gray = to_gray(&rgb);
        let hsv = HsvPlanes::from_rgb(&rgb);
        let input = FusionInput {
            rgb: &rgb,
            gray: &gray,
            hsv: &hsv,
            config: &self.config,
            edge_detector: &self.edge_detector,
            contour_extractor: &self.contour_extractor,
            segmenter: &self.segmenter,
        };

        let mut features = FeatureVector::with_capacity(self.config.target_feature_count + METADATA_KEYS.len());
        for family in FeatureFamily::iter() {
            for block in family.blocks() {
                features.extend(block.run(&input));
            }
        }

        let count = features.len();
        if (count as f64) < 0.8 * self.config.target_feature_count as f64 {
            warn!(count, target = self.config.target_feature_count, "fewer features than expected");
        } else {
            debug!(count, target = self.config.target_feature_count, "fusion features extracted");
        }
        features
    }

    /// Features plus `filename`, `timestamp` and `total_features`.
    pub fn extract(&self, image: &LoadedImage, filename: &str, clock: &dyn Clock) -> FeatureVector {
        let mut features = self.extract_features(image);
        let total = features.len();
        features.insert("filename", filename);
        features.insert("timestamp", TemporalContext::capture(clock).timestamp);
        features.insert("total_features", total);
        features
    }

    /// `None` when the file cannot be read or decoded.
    pub fn extract_path(&self, path: &Path, clock: &dyn Clock) -> Option<FeatureVector> {
        let image = match ImageLoader.load_path(path) {
            Ok(image) => image,
            Err(err) => {
                warn!("skipping {}: {err}", path.display());
                return None;
            }
        };
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(self.extract(&image, &filename, clock))
    }
}

/// Fusion features for the image at `path` with the default configuration.
pub fn extract_fusion_features(path: impl AsRef<Path>) -> Option<FeatureVector> {
    let extractor = match FusionFeatureExtractor::standard(FusionConfig::default()) {
        Ok(extractor) => extractor,
        Err(err) => {
            warn!("invalid default fusion configuration: {err}");
            return None;
        }
    };
    extractor.extract_path(path.as_ref(), &SystemClock)
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::test_support::*;
    use crate::basic::FixedClock;
    use chrono::NaiveDate;
    use image::Rgb;

    fn clock() -> FixedClock {
        FixedClock(
            NaiveDate::from_ymd_opt(2024, 3, 4)
                .and_then(|d| d.and_hms_opt(9, 15, 0))
                .expect("Valid date"),
        )
    }

    struct BrokenSegmenter;

    impl Segmenter for BrokenSegmenter {
        fn segment(&self, _: &RgbImage) -> Result<crate::algorithms::SegmentMap> {
            Err(AnalysisError::Feature(FeatureError::Primitive("segmentation offline".into())))
        }
    }

    #[test]
    fn test_feature_names_are_unique_and_near_target() {
        let names = feature_names();
        let unique: std::collections::HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len(), "duplicate feature names");
        let numeric = names.len() - METADATA_KEYS.len();
        assert!((180..=220).contains(&numeric), "got {numeric} features");
    }

    #[test]
    fn test_output_shape_matches_feature_names() {
        let extractor = FusionFeatureExtractor::standard(FusionConfig::default()).expect("Valid config");
        let image = LoadedImage::from_rgb(scene(), 0);
        let row = extractor.extract(&image, "scene.png", &clock());
        let keys: Vec<String> = row.keys().map(str::to_string).collect();
        assert_eq!(keys, feature_names());
        assert_eq!(row.get("filename"), Some(&FeatureValue::Text("scene.png".into())));
        assert_eq!(row.get("timestamp"), Some(&FeatureValue::Text("2024-03-04T09:15:00".into())));
        let expected_total = (feature_names().len() - METADATA_KEYS.len()) as i64;
        assert_eq!(row.get("total_features"), Some(&FeatureValue::Int(expected_total)));
    }

    #[test]
    fn test_failing_primitive_keeps_shape_with_zeros() {
        let extractor = FusionFeatureExtractor::new(
            FusionConfig::default(),
            CannyEdgeDetector,
            ImageprocContourExtractor,
            BrokenSegmenter,
        )
        .expect("Valid config");
        let healthy = FusionFeatureExtractor::standard(FusionConfig::default()).expect("Valid config");
        let image = LoadedImage::from_rgb(scene(), 0);

        let degraded = extractor.extract_features(&image);
        let reference = healthy.extract_features(&image);
        let degraded_keys: Vec<&str> = degraded.keys().collect();
        let reference_keys: Vec<&str> = reference.keys().collect();
        assert_eq!(degraded_keys, reference_keys);
        assert_eq!(degraded.get("color_segments"), Some(&FeatureValue::Int(0)));
        assert_eq!(degraded.get_f64("segment_area_mean"), Some(0.0));
        assert_eq!(degraded.get("green_pixel_ratio"), reference.get("green_pixel_ratio"));
    }

    #[test]
    fn test_uniform_image_computes_every_block() {
        let prepared = Prepared::new(RgbImage::from_pixel(40, 30, Rgb([128, 128, 128])));
        for family in FeatureFamily::iter() {
            assert_family_computes(family, &prepared);
        }
    }

    #[test]
    fn test_large_images_are_downscaled() {
        let extractor = FusionFeatureExtractor::standard(FusionConfig {
            max_width: 48,
            ..FusionConfig::default()
        })
        .expect("Valid config");
        let features = extractor.extract_features(&LoadedImage::from_rgb(scene(), 0));
        assert_eq!(features.get("image_width"), Some(&FeatureValue::Int(48)));
        assert_eq!(features.get("image_height"), Some(&FeatureValue::Int(36)));
    }

    #[test]
    fn test_unreadable_path_yields_none() {
        assert!(extract_fusion_features("/no/such/image.png").is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = FusionConfig::default();
        config.zones.ground = (0.9, 0.2);
        assert!(config.validate().is_err());

        let mut config = FusionConfig::default();
        config.pixel_thresholds.dark_intensity = 220;
        assert!(FusionFeatureExtractor::standard(config).is_err());

        assert!(FusionConfig::default().validate().is_ok());
    }
}
