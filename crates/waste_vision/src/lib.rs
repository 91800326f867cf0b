//! # Waste Container Vision
//!
//! Image analysis for deciding whether a photographed waste container is full
//! (`pleine`) or empty (`vide`). Three independent analyzers share one set of
//! trait-based image primitives:
//!
//! - **Basic + rules**: a handful of technical descriptors scored by a weighted
//!   rule table, optionally corrected by field observations ([`McCriteria`])
//! - **Canny ratio**: compares edge pixels in the upper and lower halves
//! - **Fusion**: ~200 numeric features in six families, meant as training rows
//!   for an external model
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use waste_vision::{Analyzer, ImageSource};
//!
//! let analyzer = Analyzer::builder().build()?;
//! let analysis = analyzer.analyze(ImageSource::Path("bin.jpg".as_ref()), "bin.jpg")?;
//! println!("{} (score {})", analysis.label(), analysis.rules.score);
//!
//! if let Some(canny) = analysis.canny {
//!     println!("canny says {} at ratio {:.2}", canny.label, canny.ratio);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Custom Primitives
//!
//! ```rust,no_run
//! use waste_vision::{Analyzer, SlicSegmenter, McCriteria, Eclairage};
//!
//! let analyzer = Analyzer::builder()
//!     .set_segmenter(SlicSegmenter { segments: 50, ..SlicSegmenter::default() })
//!     .with_mc_criteria(McCriteria { eclairage: Eclairage::Nuit, ..McCriteria::default() })
//!     .without_canny()
//!     .build()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod types;
pub mod traits;
pub mod algorithms;
pub mod loader;
pub mod basic;
pub mod rules;
pub mod canny;
pub mod fusion;
pub mod pipeline;
pub mod manager;
pub mod batch;

pub use error::{AnalysisError, FeatureError, Result};
pub use types::{
    ChannelHistogram, ClassificationResult, Contour, EdgeCounts, FeatureValue, FeatureVector, Label, Method,
};
pub use traits::*;
pub use algorithms::{CannyEdgeDetector, ImageprocContourExtractor, SegmentMap, SlicSegmenter};
pub use loader::{ImageLoader, ImageSource, LoadedImage};
pub use basic::{
    BasicFeatureExtractor, BasicFeatures, Clock, FixedClock, ImageFeatures, SystemClock, TemporalContext,
    extract_basic_features,
};
pub use rules::{Eclairage, Exposition, McCriteria, RuleClassifier, RuleVerdict, classify_basic};
pub use canny::{CannyConfig, CannyRatioClassifier, CannyVerdict, classify_canny};
pub use fusion::{FusionConfig, FusionFeatureExtractor, extract_fusion_features, feature_names};
pub use pipeline::{Analyzer, ImageAnalysis, builder::AnalyzerBuilder};
pub use manager::{AnalysisCommand, AnalysisOutput, AnalysisSession};
pub use batch::{BatchConfig, BatchReport, BatchRunner, ImageOutcome, Outcome, collect_images};
