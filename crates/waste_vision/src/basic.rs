//! Per-image technical descriptors used by the rule classifier.
//!
//! [`ImageFeatures`] depends only on the pixels; the wall-clock block lives in
//! [`TemporalContext`] and is captured from an injectable [`Clock`].

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use image::GrayImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use tracing::{debug, warn};

use crate::{
    algorithms::{
        CannyEdgeDetector, ImageprocContourExtractor, count_edge_pixels,
        stats::{histogram, summarize},
    },
    error::Result,
    loader::{ImageLoader, ImageSource, LoadedImage},
    traits::{ContourExtractor, EdgeDetector},
    types::{ChannelHistogram, FeatureVector},
};

/// Keys of [`BasicFeatures::to_feature_vector`], in order.
pub const BASIC_FEATURE_KEYS: [&str; 22] = [
    "file_size",
    "dimensions",
    "width",
    "height",
    "aspect_ratio",
    "avg_color",
    "color_dominance",
    "brightness",
    "contrast",
    "contour_pixels",
    "edge_count",
    "texture_variance",
    "dark_ratio",
    "bright_ratio",
    "r_mean",
    "g_mean",
    "b_mean",
    "histogram",
    "day_of_week",
    "timestamp",
    "hour",
    "is_weekend",
];

pub const DARK_GRAY_THRESHOLD: u8 = 50;
pub const BRIGHT_GRAY_THRESHOLD: u8 = 200;

pub trait Clock: Send + Sync {
    /// Local wall-clock time
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct TemporalContext {
    /// English weekday name, e.g. "Monday"
    pub day_of_week: String,
    /// ISO-8601 local timestamp
    pub timestamp: String,
    pub hour: u32,
    pub is_weekend: bool,
}

impl TemporalContext {
    pub fn capture(clock: &dyn Clock) -> Self {
        Self::from_datetime(clock.now())
    }

    pub fn from_datetime(moment: NaiveDateTime) -> Self {
        Self {
            day_of_week: moment.format("%A").to_string(),
            timestamp: moment.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            hour: moment.hour(),
            is_weekend: moment.weekday().number_from_monday() >= 6,
        }
    }

    pub fn to_feature_vector(&self) -> FeatureVector {
        let mut vector = FeatureVector::with_capacity(4);
        vector.insert("day_of_week", self.day_of_week.as_str());
        vector.insert("timestamp", self.timestamp.as_str());
        vector.insert("hour", self.hour);
        vector.insert("is_weekend", self.is_weekend);
        vector
    }
}

/// Channel with the strictly highest mean; ties resolve to blue.
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ColorDominance {
    Rouge,
    Vert,
    Bleu,
}

impl ColorDominance {
    pub fn from_means(r: f64, g: f64, b: f64) -> Self {
        if r > g && r > b {
            Self::Rouge
        } else if g > r && g > b {
            Self::Vert
        } else {
            Self::Bleu
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ImageFeatures {
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
    pub r_mean: f64,
    pub g_mean: f64,
    pub b_mean: f64,
    pub color_dominance: ColorDominance,
    /// Luma of the mean colour, in `[0, 1]`
    pub brightness: f64,
    /// Mean over channels of (max − min), in `[0, 255]`
    pub contrast: f64,
    pub contour_pixels: u64,
    pub edge_count: u64,
    /// Population variance of the grayscale image, in `[0, 255²]`
    pub texture_variance: f64,
    pub dark_ratio: f64,
    pub bright_ratio: f64,
    pub histogram: ChannelHistogram,
}

impl ImageFeatures {
    pub fn dimensions(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Mean colour with each channel truncated toward zero.
    pub fn avg_color(&self) -> String {
        format!(
            "rgb({},{},{})",
            self.r_mean as i64, self.g_mean as i64, self.b_mean as i64
        )
    }

    pub fn to_feature_vector(&self) -> FeatureVector {
        let mut vector = FeatureVector::with_capacity(18);
        vector.insert("file_size", self.file_size);
        vector.insert("dimensions", self.dimensions());
        vector.insert("width", self.width);
        vector.insert("height", self.height);
        vector.insert("aspect_ratio", self.aspect_ratio);
        vector.insert("avg_color", self.avg_color());
        vector.insert("color_dominance", self.color_dominance.to_string());
        vector.insert("brightness", self.brightness);
        vector.insert("contrast", self.contrast);
        vector.insert("contour_pixels", self.contour_pixels);
        vector.insert("edge_count", self.edge_count);
        vector.insert("texture_variance", self.texture_variance);
        vector.insert("dark_ratio", self.dark_ratio);
        vector.insert("bright_ratio", self.bright_ratio);
        vector.insert("r_mean", self.r_mean);
        vector.insert("g_mean", self.g_mean);
        vector.insert("b_mean", self.b_mean);
        vector.insert("histogram", self.histogram.clone());
        vector
    }
}

/// Technical descriptors plus the capture-time context.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BasicFeatures {
    pub technical: ImageFeatures,
    pub temporal: TemporalContext,
}

impl BasicFeatures {
    pub fn to_feature_vector(&self) -> FeatureVector {
        let mut vector = self.technical.to_feature_vector();
        vector.extend(self.temporal.to_feature_vector());
        vector
    }
}

/// Edge-map summary of one image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EdgeStats {
    contour_pixels: u64,
    edge_count: u64,
}

/// Extracts [`ImageFeatures`] with pluggable edge and contour primitives.
#[derive(Debug, Clone)]
pub struct BasicFeatureExtractor<E = CannyEdgeDetector, C = ImageprocContourExtractor>
where
    E: EdgeDetector,
    C: ContourExtractor,
{
    pub edge_detector: E,
    pub contour_extractor: C,
    pub canny_low: f32,
    pub canny_high: f32,
}

impl BasicFeatureExtractor {
    /// Canny edges and imageproc contour tracing.
    pub fn standard() -> Self {
        Self::new(CannyEdgeDetector, ImageprocContourExtractor)
    }
}

impl Default for BasicFeatureExtractor {
    fn default() -> Self {
        Self::standard()
    }
}

impl<E, C> BasicFeatureExtractor<E, C>
where
    E: EdgeDetector,
    C: ContourExtractor,
{
    pub fn new(edge_detector: E, contour_extractor: C) -> Self {
        Self {
            edge_detector,
            contour_extractor,
            canny_low: 100.0,
            canny_high: 200.0,
        }
    }

    pub fn extract(&self, image: &LoadedImage) -> ImageFeatures {
        let raster = &image.raster;
        let (width, height) = raster.dimensions();

        let channel = |c: usize| summarize(raster.pixels().map(move |p| p.0[c] as f64));
        let (red, green, blue) = (channel(0), channel(1), channel(2));
        let (r_mean, g_mean, b_mean) = (red.mean, green.mean, blue.mean);

        let brightness = (0.299 * r_mean + 0.587 * g_mean + 0.114 * b_mean) / 255.0;
        let contrast = (red.range() + green.range() + blue.range()) / 3.0;

        let channel_histogram = |c: usize| -> [u64; 10] {
            let counts = histogram(raster.pixels().map(|p| p.0[c] as f64), 10, 0.0, 256.0);
            let mut bins = [0u64; 10];
            bins.copy_from_slice(&counts);
            bins
        };

        let gray = image.gray();
        let gray_summary = summarize(gray.as_raw().iter().map(|&v| v as f64));
        let total = gray_summary.count.max(1) as f64;
        let dark = gray.as_raw().iter().filter(|&&v| v < DARK_GRAY_THRESHOLD).count();
        let bright = gray.as_raw().iter().filter(|&&v| v > BRIGHT_GRAY_THRESHOLD).count();

        let edges = match self.edge_stats(&gray) {
            Ok(stats) => stats,
            Err(err) => {
                warn!("edge analysis failed, using zero edge features: {err}");
                EdgeStats::default()
            }
        };

        let features = ImageFeatures {
            file_size: image.meta.file_size,
            width,
            height,
            aspect_ratio: if height == 0 { 0.0 } else { width as f64 / height as f64 },
            r_mean,
            g_mean,
            b_mean,
            color_dominance: ColorDominance::from_means(r_mean, g_mean, b_mean),
            brightness,
            contrast,
            contour_pixels: edges.contour_pixels,
            edge_count: edges.edge_count,
            texture_variance: gray_summary.variance(),
            dark_ratio: if gray_summary.count == 0 { 0.0 } else { dark as f64 / total },
            bright_ratio: if gray_summary.count == 0 { 0.0 } else { bright as f64 / total },
            histogram: ChannelHistogram {
                red: channel_histogram(0),
                green: channel_histogram(1),
                blue: channel_histogram(2),
            },
        };
        debug!(
            brightness = features.brightness,
            contrast = features.contrast,
            edge_count = features.edge_count,
            "extracted basic features"
        );
        features
    }

    fn edge_stats(&self, gray: &GrayImage) -> Result<EdgeStats> {
        let edges = self.edge_detector.detect_edges(gray, self.canny_low, self.canny_high)?;
        let contours = self.contour_extractor.extract_contours(&edges)?;
        Ok(EdgeStats {
            contour_pixels: count_edge_pixels(&edges),
            edge_count: contours.len() as u64,
        })
    }

    pub fn extract_with_context(&self, image: &LoadedImage, clock: &dyn Clock) -> BasicFeatures {
        BasicFeatures {
            technical: self.extract(image),
            temporal: TemporalContext::capture(clock),
        }
    }
}

/// Decode `source` and extract its basic features with the default primitives.
pub fn extract_basic_features(source: ImageSource<'_>, clock: &dyn Clock) -> Result<BasicFeatures> {
    let image = ImageLoader.load(source)?;
    Ok(BasicFeatureExtractor::standard().extract_with_context(&image, clock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnalysisError, types::Contour};
    use chrono::NaiveDate;
    use image::{Rgb, RgbImage};

    fn saturday_noon() -> FixedClock {
        let moment = NaiveDate::from_ymd_opt(2024, 6, 15)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .expect("Valid date");
        FixedClock(moment)
    }

    fn solid(color: [u8; 3]) -> LoadedImage {
        LoadedImage::from_rgb(RgbImage::from_pixel(40, 20, Rgb(color)), 1234)
    }

    struct FailingEdges;

    impl EdgeDetector for FailingEdges {
        fn detect_edges(&self, _: &GrayImage, _: f32, _: f32) -> Result<GrayImage> {
            Err(AnalysisError::invalid("no edges today"))
        }
    }

    struct ThreeContours;

    impl ContourExtractor for ThreeContours {
        fn extract_contours(&self, _: &GrayImage) -> Result<Vec<Contour>> {
            let contour = Contour { points: vec![], is_hole: false, parent: None };
            Ok(vec![contour.clone(), contour.clone(), contour])
        }
    }

    #[test]
    fn test_key_set_and_order() {
        let features = BasicFeatureExtractor::standard().extract_with_context(&solid([0, 0, 0]), &saturday_noon());
        let vector = features.to_feature_vector();
        let keys: Vec<&str> = vector.keys().collect();
        assert_eq!(keys, BASIC_FEATURE_KEYS.to_vec());
    }

    #[test]
    fn test_solid_black_image() {
        let features = BasicFeatureExtractor::standard().extract(&solid([0, 0, 0]));
        assert_eq!(features.brightness, 0.0);
        assert_eq!(features.contrast, 0.0);
        assert_eq!(features.contour_pixels, 0);
        assert_eq!(features.edge_count, 0);
        assert_eq!(features.dark_ratio, 1.0);
        assert_eq!(features.bright_ratio, 0.0);
        assert_eq!(features.texture_variance, 0.0);
        assert_eq!(features.avg_color(), "rgb(0,0,0)");
        assert_eq!(features.dimensions(), "40x20");
        assert_eq!(features.aspect_ratio, 2.0);
        assert_eq!(features.file_size, 1234);
        assert_eq!(features.histogram.red[0], 800);
    }

    #[test]
    fn test_solid_white_image() {
        let features = BasicFeatureExtractor::standard().extract(&solid([255, 255, 255]));
        assert!((features.brightness - 1.0).abs() < 1e-9);
        assert_eq!(features.bright_ratio, 1.0);
        assert_eq!(features.histogram.blue[9], 800);
    }

    #[test]
    fn test_same_bytes_give_the_same_features() {
        let raster = RgbImage::from_fn(48, 32, |x, y| {
            if (x / 6 + y / 6) % 2 == 0 { Rgb([20, 40, 30]) } else { Rgb([230, 220, 200]) }
        });
        let mut bytes = std::io::Cursor::new(Vec::new());
        raster
            .write_to(&mut bytes, image::ImageFormat::Png)
            .expect("Should encode");
        let bytes = bytes.into_inner();

        let first = extract_basic_features(ImageSource::Bytes(&bytes), &saturday_noon()).expect("Should extract");
        let second = extract_basic_features(ImageSource::Bytes(&bytes), &saturday_noon()).expect("Should extract");
        assert_eq!(first, second);
        assert_eq!(first.to_feature_vector(), second.to_feature_vector());
    }

    #[test]
    fn test_dark_and_bright_ratios_stay_in_unit_range() {
        let rasters = [
            RgbImage::from_fn(64, 16, |x, _| {
                let v = (x * 4) as u8;
                Rgb([v, v, v])
            }),
            RgbImage::from_fn(30, 30, |x, y| if (x + y) % 2 == 0 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }),
            RgbImage::from_fn(25, 17, |x, y| Rgb([(x * 37 % 256) as u8, (y * 91 % 256) as u8, ((x * y) % 256) as u8])),
            RgbImage::from_pixel(8, 8, Rgb([128, 128, 128])),
        ];
        for raster in rasters {
            let features = BasicFeatureExtractor::standard().extract(&LoadedImage::from_rgb(raster, 0));
            assert!((0.0..=1.0).contains(&features.dark_ratio), "{}", features.dark_ratio);
            assert!((0.0..=1.0).contains(&features.bright_ratio), "{}", features.bright_ratio);
            assert!(features.dark_ratio + features.bright_ratio <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn test_color_dominance_ties_go_to_blue() {
        assert_eq!(ColorDominance::from_means(200.0, 10.0, 10.0), ColorDominance::Rouge);
        assert_eq!(ColorDominance::from_means(10.0, 200.0, 10.0), ColorDominance::Vert);
        assert_eq!(ColorDominance::from_means(100.0, 100.0, 10.0), ColorDominance::Bleu);
        assert_eq!(ColorDominance::from_means(0.0, 0.0, 0.0), ColorDominance::Bleu);
    }

    #[test]
    fn test_avg_color_truncates() {
        let mut raster = RgbImage::from_pixel(2, 1, Rgb([10, 10, 10]));
        raster.put_pixel(1, 0, Rgb([11, 11, 12]));
        let features = BasicFeatureExtractor::standard().extract(&LoadedImage::from_rgb(raster, 0));
        assert_eq!(features.avg_color(), "rgb(10,10,11)");
    }

    #[test]
    fn test_edge_failure_degrades_to_zero() {
        let extractor = BasicFeatureExtractor::new(FailingEdges, ImageprocContourExtractor);
        let features = extractor.extract(&solid([120, 30, 30]));
        assert_eq!(features.contour_pixels, 0);
        assert_eq!(features.edge_count, 0);
        assert_eq!(features.color_dominance, ColorDominance::Rouge);
    }

    #[test]
    fn test_edge_count_comes_from_contour_extractor() {
        let extractor = BasicFeatureExtractor::new(CannyEdgeDetector, ThreeContours);
        assert_eq!(extractor.extract(&solid([50, 50, 50])).edge_count, 3);
    }

    #[test]
    fn test_temporal_context() {
        let context = TemporalContext::capture(&saturday_noon());
        assert_eq!(context.day_of_week, "Saturday");
        assert_eq!(context.timestamp, "2024-06-15T12:30:00");
        assert_eq!(context.hour, 12);
        assert!(context.is_weekend);

        let monday = NaiveDate::from_ymd_opt(2024, 6, 17)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("Valid date");
        assert!(!TemporalContext::from_datetime(monday).is_weekend);
    }
}
