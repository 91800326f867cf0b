//! Additive rule scoring with field-observation (MC) hysteresis.
//!
//! The primary score decides the base label (`pleine` iff score ≥ 15). An
//! optional [`McCriteria`] then yields an adjustment score that can flip the
//! base label only when it is strongly against it (≤ −8 or ≥ +8).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::debug;

use crate::{
    basic::ImageFeatures,
    error::{AnalysisError, Result},
    traits::Classifier,
    types::{ClassificationResult, FeatureVector, Label, Method},
};

pub const FULL_SCORE_THRESHOLD: i32 = 15;
pub const FLIP_THRESHOLD: i32 = 8;
/// Edge counts are normalized by this fixed pixel count, whatever the image size.
pub const ASSUMED_PIXEL_COUNT: f64 = 1_000_000.0;

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Eclairage {
    Faible,
    Nuit,
    Sombre,
    #[default]
    Normal,
    Fort,
    Soleil,
    Lumineux,
}

impl Eclairage {
    pub fn adjustment(self) -> i32 {
        match self {
            Self::Faible | Self::Nuit | Self::Sombre => -5,
            Self::Normal => 0,
            Self::Fort | Self::Soleil | Self::Lumineux => 3,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Exposition {
    Pleine,
    #[default]
    Normale,
}

/// Field observations recorded alongside a photo.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct McCriteria {
    pub eclairage: Eclairage,
    pub ouverte: bool,
    pub chevrons: bool,
    pub exposition: Exposition,
}

impl McCriteria {
    /// Build criteria from raw strings; unknown lighting or exposure values are rejected.
    pub fn parse(eclairage: &str, ouverte: bool, chevrons: bool, exposition: &str) -> Result<Self> {
        let eclairage = eclairage
            .trim()
            .parse::<Eclairage>()
            .map_err(|_| AnalysisError::invalid(format!("unknown eclairage '{eclairage}'")))?;
        let exposition = exposition
            .trim()
            .parse::<Exposition>()
            .map_err(|_| AnalysisError::invalid(format!("unknown exposition '{exposition}'")))?;
        Ok(Self {
            eclairage,
            ouverte,
            chevrons,
            exposition,
        })
    }

    /// Criteria as recorded at upload time: missing lighting reads as normal and
    /// sunny lighting implies full exposure.
    pub fn from_observation(eclairage: Option<&str>, ouverte: bool, chevrons: bool) -> Result<Self> {
        let raw = eclairage.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("normal");
        let exposition = if raw.to_lowercase().contains("soleil") { "pleine" } else { "normale" };
        Self::parse(raw, ouverte, chevrons, exposition)
    }

    pub fn adjustment(&self) -> i32 {
        let mut score = self.eclairage.adjustment();
        score += if self.ouverte { 8 } else { -5 };
        if self.chevrons {
            score -= 3;
        }
        if self.exposition == Exposition::Pleine {
            score += 2;
        }
        score
    }

    /// Flip `base` only when the adjustment strongly contradicts it.
    pub fn apply(&self, base: Label) -> Label {
        let adjustment = self.adjustment();
        match base {
            Label::Pleine if adjustment <= -FLIP_THRESHOLD => Label::Vide,
            Label::Vide if adjustment >= FLIP_THRESHOLD => Label::Pleine,
            label => label,
        }
    }
}

#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumIter, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Rule {
    DarkDebris,
    VisualClutter,
    VeryDarkColors,
    DarkColors,
    ShadowedContrast,
    IrregularTexture,
    CriticalCombination,
    UniformBright,
    GreenDominance,
    LowActivity,
}

impl Rule {
    pub fn weight(self) -> i32 {
        match self {
            Self::DarkDebris => 15,
            Self::VisualClutter => 10,
            Self::VeryDarkColors => 12,
            Self::DarkColors => 8,
            Self::ShadowedContrast => 10,
            Self::IrregularTexture => 8,
            Self::CriticalCombination => 20,
            Self::UniformBright => -10,
            Self::GreenDominance => -8,
            Self::LowActivity => -15,
        }
    }
}

/// The subset of image features the rules read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuleInputs {
    pub brightness: f64,
    /// Raw contrast in `[0, 255]`
    pub contrast: f64,
    pub r_mean: f64,
    pub g_mean: f64,
    pub b_mean: f64,
    pub edge_count: f64,
    /// Raw grayscale variance in `[0, 255²]`
    pub texture_variance: f64,
    pub dark_ratio: f64,
}

impl RuleInputs {
    /// Read inputs from a flat feature vector. `brightness` and `contrast` are
    /// required; every other key defaults to 0.
    pub fn from_vector(features: &FeatureVector) -> Result<Self> {
        let required = |key: &str| {
            features
                .get_f64(key)
                .ok_or_else(|| AnalysisError::invalid(format!("missing numeric feature '{key}'")))
        };
        let optional = |key: &str| features.get_f64(key).unwrap_or(0.0);

        Ok(Self {
            brightness: required("brightness")?,
            contrast: required("contrast")?,
            r_mean: optional("r_mean"),
            g_mean: optional("g_mean"),
            b_mean: optional("b_mean"),
            edge_count: optional("edge_count"),
            texture_variance: optional("texture_variance"),
            dark_ratio: optional("dark_ratio"),
        })
    }

    /// Contrast on the unit scale.
    pub fn normalized_contrast(&self) -> f64 {
        self.contrast / 255.0
    }

    /// Variance of the grayscale image rescaled to `[0, 1]`.
    pub fn normalized_texture_variance(&self) -> f64 {
        self.texture_variance / (255.0 * 255.0)
    }

    pub fn edge_density(&self) -> f64 {
        self.edge_count / ASSUMED_PIXEL_COUNT
    }
}

impl From<&ImageFeatures> for RuleInputs {
    fn from(features: &ImageFeatures) -> Self {
        Self {
            brightness: features.brightness,
            contrast: features.contrast,
            r_mean: features.r_mean,
            g_mean: features.g_mean,
            b_mean: features.b_mean,
            edge_count: features.edge_count as f64,
            texture_variance: features.texture_variance,
            dark_ratio: features.dark_ratio,
        }
    }
}

/// Full trace of one rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RuleVerdict {
    pub score: i32,
    pub fired: Vec<Rule>,
    pub base_label: Label,
    pub adjustment: Option<i32>,
    pub label: Label,
}

pub fn fired_rules(inputs: &RuleInputs) -> Vec<Rule> {
    let c = inputs.normalized_contrast();
    let v = inputs.normalized_texture_variance();
    let d = inputs.edge_density();
    let (r, g, b) = (inputs.r_mean, inputs.g_mean, inputs.b_mean);

    let mut fired = Vec::new();
    if inputs.dark_ratio > 0.3 && c > 0.3 {
        fired.push(Rule::DarkDebris);
    }
    if d > 0.001 {
        fired.push(Rule::VisualClutter);
    }
    if r < 50.0 && g < 50.0 && b < 50.0 {
        fired.push(Rule::VeryDarkColors);
    } else if r < 80.0 && g < 80.0 && b < 80.0 {
        fired.push(Rule::DarkColors);
    }
    if inputs.brightness < 0.5 && c > 0.4 {
        fired.push(Rule::ShadowedContrast);
    }
    if v > 0.15 {
        fired.push(Rule::IrregularTexture);
    }
    if inputs.dark_ratio > 0.4 && c > 0.5 && d > 0.0015 {
        fired.push(Rule::CriticalCombination);
    }
    if inputs.brightness > 0.7 && c < 0.2 {
        fired.push(Rule::UniformBright);
    }
    if g > r + 20.0 && g > b + 20.0 {
        fired.push(Rule::GreenDominance);
    }
    if d < 0.0005 && v < 0.05 {
        fired.push(Rule::LowActivity);
    }
    fired
}

/// Rule-based classifier; `mc_criteria` is applied on the [`Classifier`] path.
#[derive(Debug, Clone, Default)]
pub struct RuleClassifier {
    pub mc_criteria: Option<McCriteria>,
}

impl RuleClassifier {
    pub fn new(mc_criteria: Option<McCriteria>) -> Self {
        Self { mc_criteria }
    }

    pub fn evaluate(&self, inputs: &RuleInputs, mc_criteria: Option<&McCriteria>) -> RuleVerdict {
        let fired = fired_rules(inputs);
        let score: i32 = fired.iter().map(|rule| rule.weight()).sum();
        let base_label = Label::from_full(score >= FULL_SCORE_THRESHOLD);
        let label = mc_criteria.map_or(base_label, |mc| mc.apply(base_label));

        debug!(score, ?fired, %base_label, %label, "rule evaluation");
        RuleVerdict {
            score,
            fired,
            base_label,
            adjustment: mc_criteria.map(McCriteria::adjustment),
            label,
        }
    }
}

impl Classifier for RuleClassifier {
    fn classify(&self, features: &FeatureVector) -> Result<ClassificationResult> {
        let inputs = RuleInputs::from_vector(features)?;
        let verdict = self.evaluate(&inputs, self.mc_criteria.as_ref());
        Ok(ClassificationResult {
            label: verdict.label,
            method: Method::Rules,
            score: verdict.score as f64,
            raw_counts: None,
        })
    }
}

/// Label an image from its basic features, optionally corrected by field criteria.
pub fn classify_basic(features: &ImageFeatures, mc_criteria: Option<&McCriteria>) -> Label {
    RuleClassifier::default()
        .evaluate(&RuleInputs::from(features), mc_criteria)
        .label
}
