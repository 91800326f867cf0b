use std::{path::Path, sync::Arc};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::{
    basic::BasicFeatures,
    canny::CannyVerdict,
    error::{AnalysisError, Result},
    loader::{ImageSource, LoadedImage},
    pipeline::{Analyzer, ImageAnalysis, builder::AnalyzerBuilder, file_name},
    rules::{McCriteria, RuleVerdict},
    types::{FeatureVector, Label},
};

#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq,
)]
#[serde(tag = "type", content = "params")]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisCommand {
    /// Technical descriptors and capture-time context
    #[serde(rename = "extract_basic")]
    ExtractBasic,

    /// Rule-based label, optionally corrected by field observations
    #[serde(rename = "classify_rules")]
    ClassifyRules {
        #[serde(default)]
        mc_criteria: Option<McCriteria>,
    },

    /// Top/bottom Canny edge ratio label
    #[serde(rename = "classify_canny")]
    ClassifyCanny,

    /// The full fusion feature vector
    #[serde(rename = "extract_fusion")]
    ExtractFusion,

    /// Basic features, rule verdict and Canny verdict together
    #[serde(rename = "analyze")]
    Analyze,
}

impl AnalysisCommand {
    /// Get the JSON schema for all commands
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisCommand)
    }

    pub fn command_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ExtractBasic => "Extract size, colour, brightness, contrast, edge and histogram descriptors",
            Self::ClassifyRules { .. } => "Label the bin with the weighted rule table and optional field criteria",
            Self::ClassifyCanny => "Label the bin from the ratio of edges in the top and bottom halves",
            Self::ExtractFusion => "Extract the multi-family fusion feature vector",
            Self::Analyze => "Run basic extraction, rule and Canny classification in one pass",
        }
    }

    /// `(name, description, required)` for each parameter
    pub fn parameters_info(&self) -> Vec<(&'static str, &'static str, bool)> {
        match self {
            Self::ClassifyRules { .. } => vec![(
                "mc_criteria",
                "Field observations: eclairage, ouverte, chevrons, exposition",
                false,
            )],
            _ => vec![],
        }
    }
}

/// What a command produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "result", rename_all = "snake_case")]
pub enum AnalysisOutput {
    Basic(BasicFeatures),
    Rules(RuleVerdict),
    Canny(Option<CannyVerdict>),
    Fusion(FeatureVector),
    Analysis(ImageAnalysis),
}

impl AnalysisOutput {
    pub fn label(&self) -> Option<Label> {
        match self {
            Self::Rules(verdict) => Some(verdict.label),
            Self::Canny(verdict) => verdict.map(|v| v.label),
            Self::Analysis(analysis) => Some(analysis.label()),
            Self::Basic(_) | Self::Fusion(_) => None,
        }
    }
}

impl Analyzer {
    pub fn execute(&self, command: &AnalysisCommand, image: &LoadedImage, filename: &str) -> Result<AnalysisOutput> {
        let output = match command {
            AnalysisCommand::ExtractBasic => AnalysisOutput::Basic(self.extract_basic(image)),
            AnalysisCommand::ClassifyRules { mc_criteria } => {
                let features = self.extract_basic(image);
                AnalysisOutput::Rules(self.classify_rules(&features, mc_criteria.as_ref()))
            }
            AnalysisCommand::ClassifyCanny => AnalysisOutput::Canny(self.classify_canny(image)?),
            AnalysisCommand::ExtractFusion => AnalysisOutput::Fusion(self.extract_fusion(image, filename)),
            AnalysisCommand::Analyze => AnalysisOutput::Analysis(self.analyze_image(image, filename)),
        };
        Ok(output)
    }
}

/// An analyzer with one current image, for interactive or command-driven use.
#[derive(Clone)]
pub struct AnalysisSession {
    image: Option<(LoadedImage, String)>,
    analyzer: Arc<Analyzer>,
}

impl AnalysisSession {
    pub fn new() -> Result<Self> {
        Ok(Self::with_analyzer(AnalyzerBuilder::build_default(None)?))
    }

    pub fn with_analyzer(analyzer: Analyzer) -> Self {
        Self {
            image: None,
            analyzer: Arc::new(analyzer),
        }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn load_image(&mut self, path: &Path) -> Result<()> {
        let image = self.analyzer.load(ImageSource::Path(path))?;
        self.image = Some((image, file_name(path)));
        Ok(())
    }

    pub fn load_image_from_bytes(&mut self, bytes: &[u8], filename: &str) -> Result<()> {
        let image = self.analyzer.load(ImageSource::Bytes(bytes))?;
        self.image = Some((image, filename.to_string()));
        Ok(())
    }

    pub fn set_image(&mut self, image: LoadedImage, filename: impl Into<String>) {
        self.image = Some((image, filename.into()));
    }

    pub fn execute(&self, command: &AnalysisCommand) -> Result<AnalysisOutput> {
        let (image, filename) = self.image.as_ref().ok_or(AnalysisError::NoImageLoaded)?;
        self.analyzer.execute(command, image, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Eclairage;
    use image::{Rgb, RgbImage};
    use strum::IntoEnumIterator;

    fn session_with_image() -> AnalysisSession {
        let mut session = AnalysisSession::new().expect("Should build");
        let image = RgbImage::from_fn(32, 32, |x, _| if x < 16 { Rgb([10, 10, 10]) } else { Rgb([230, 230, 230]) });
        session.set_image(LoadedImage::from_rgb(image, 1024), "split.png");
        session
    }

    #[test]
    fn test_command_names_are_snake_case() {
        assert_eq!(
            AnalysisCommand::command_names(),
            &["extract_basic", "classify_rules", "classify_canny", "extract_fusion", "analyze"]
        );
    }

    #[test]
    fn test_commands_round_trip_through_json() {
        let command = AnalysisCommand::ClassifyRules {
            mc_criteria: Some(McCriteria { eclairage: Eclairage::Soleil, ..McCriteria::default() }),
        };
        let json = serde_json::to_string(&command).expect("Should serialize");
        assert!(json.contains("\"type\":\"classify_rules\""));
        let parsed: AnalysisCommand = serde_json::from_str(&json).expect("Should parse");
        assert_eq!(parsed, command);

        let unit: AnalysisCommand = serde_json::from_str(r#"{"type":"classify_canny"}"#).expect("Should parse");
        assert_eq!(unit, AnalysisCommand::ClassifyCanny);
    }

    #[test]
    fn test_schema_lists_every_command() {
        let schema = serde_json::to_string(&AnalysisCommand::schema()).expect("Should serialize");
        for name in AnalysisCommand::command_names() {
            assert!(schema.contains(name), "schema is missing {name}");
        }
    }

    #[test]
    fn test_every_command_has_a_description() {
        for command in AnalysisCommand::iter() {
            assert!(!command.description().is_empty());
        }
    }

    #[test]
    fn test_execute_without_image() {
        let session = AnalysisSession::new().expect("Should build");
        let result = session.execute(&AnalysisCommand::ExtractBasic);
        assert!(matches!(result, Err(AnalysisError::NoImageLoaded)));
    }

    #[test]
    fn test_execute_each_command() {
        let session = session_with_image();

        match session.execute(&AnalysisCommand::ExtractBasic).expect("Should run") {
            AnalysisOutput::Basic(features) => assert_eq!(features.technical.file_size, 1024),
            other => panic!("unexpected output {other:?}"),
        }

        let rules = session
            .execute(&AnalysisCommand::ClassifyRules { mc_criteria: None })
            .expect("Should run");
        assert!(rules.label().is_some());

        let canny = session.execute(&AnalysisCommand::ClassifyCanny).expect("Should run");
        assert!(matches!(canny, AnalysisOutput::Canny(Some(_))));

        match session.execute(&AnalysisCommand::ExtractFusion).expect("Should run") {
            AnalysisOutput::Fusion(row) => {
                assert_eq!(row.get("filename").and_then(|v| v.as_str()), Some("split.png"));
            }
            other => panic!("unexpected output {other:?}"),
        }

        let analysis = session.execute(&AnalysisCommand::Analyze).expect("Should run");
        let json = serde_json::to_value(&analysis).expect("Should serialize");
        assert_eq!(json["type"], "analysis");
        assert_eq!(json["result"]["filename"], "split.png");
    }

    #[test]
    fn test_load_image_from_bytes_rejects_garbage() {
        let mut session = AnalysisSession::new().expect("Should build");
        assert!(session.load_image_from_bytes(b"garbage", "g.png").is_err());
        assert!(matches!(
            session.execute(&AnalysisCommand::Analyze),
            Err(AnalysisError::NoImageLoaded)
        ));
    }
}
