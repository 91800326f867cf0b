use dataset::ExportFormat;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use waste_vision::{AnalysisError, Analyzer, BatchConfig, CannyConfig, FusionConfig, McCriteria};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] AnalysisError),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// Canny thresholds for the basic edge and contour counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct BasicSection {
    pub canny_low: f32,
    pub canny_high: f32,
}

impl Default for BasicSection {
    fn default() -> Self {
        Self {
            canny_low: 100.0,
            canny_high: 200.0,
        }
    }
}

/// Everything the analyzers, the batch pool and the exporter can be tuned with.
///
/// Every section is optional in the file; missing values take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub export_format: ExportFormat,
    /// Turn the Canny ratio classifier off entirely
    pub disable_canny: bool,
    pub basic: BasicSection,
    pub canny: CannyConfig,
    pub fusion: FusionConfig,
    pub batch: BatchConfig,
    /// Field observations applied to every rule verdict
    pub mc_criteria: Option<McCriteria>,
}

impl AnalysisConfig {
    /// Get the JSON schema of the configuration file
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisConfig)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.canny.validate()?;
        self.fusion.validate()?;
        self.batch.validate()?;
        Ok(())
    }

    /// Build an analyzer from this configuration
    pub fn analyzer(&self) -> Result<Analyzer, ConfigError> {
        let mut builder = Analyzer::builder()
            .with_basic_thresholds(self.basic.canny_low, self.basic.canny_high)
            .with_fusion(self.fusion.clone())
            .with_optional_mc_criteria(self.mc_criteria);
        builder = if self.disable_canny {
            builder.without_canny()
        } else {
            builder.with_canny(self.canny)
        };
        Ok(builder.build()?)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load configuration from JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(ConfigError::UnsupportedFileFormat),
        }
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    /// Save configuration to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self.to_json()?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waste_vision::Eclairage;

    fn custom() -> AnalysisConfig {
        let mut config = AnalysisConfig {
            export_format: ExportFormat::CsvJson,
            mc_criteria: Some(McCriteria {
                eclairage: Eclairage::Soleil,
                chevrons: true,
                ..McCriteria::default()
            }),
            ..AnalysisConfig::default()
        };
        config.canny.ratio_threshold = 1.5;
        config.fusion.max_width = 640;
        config.batch.workers = 3;
        config
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("analysis.toml");
        let config = custom();
        config.to_toml_file(&path).expect("Should write");
        let loaded = AnalysisConfig::from_file(&path).expect("Should load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("analysis.json");
        let config = custom();
        config.to_json_file(&path).expect("Should write");
        let loaded = AnalysisConfig::from_file(&path).expect("Should load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AnalysisConfig::from_toml(
            r#"
            export_format = "csv+json"

            [fusion]
            max_width = 400

            [mc_criteria]
            eclairage = "nuit"
            "#,
        )
        .expect("Should parse");
        assert_eq!(config.export_format, ExportFormat::CsvJson);
        assert_eq!(config.fusion.max_width, 400);
        assert_eq!(config.fusion.gabor_max_width, FusionConfig::default().gabor_max_width);
        assert_eq!(config.mc_criteria.map(|c| c.eclairage), Some(Eclairage::Nuit));
        assert_eq!(config.canny, CannyConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let result = AnalysisConfig::from_json(r#"{"batch": {"workers": 0}}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = AnalysisConfig::from_toml("[mc_criteria]\neclairage = \"crepuscule\"\n");
        assert!(matches!(result, Err(ConfigError::TomlDeError(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            AnalysisConfig::from_file("analysis.yaml"),
            Err(ConfigError::UnsupportedFileFormat)
        ));
    }

    #[test]
    fn test_analyzer_follows_config() {
        let config = AnalysisConfig {
            disable_canny: true,
            ..custom()
        };
        let analyzer = config.analyzer().expect("Should build");
        assert!(analyzer.info().contains("canny ratio off"));
        assert_eq!(analyzer.mc_criteria(), config.mc_criteria.as_ref());
    }

    #[test]
    fn test_schema_names_sections() {
        let schema = serde_json::to_string(&AnalysisConfig::schema()).expect("Should serialize");
        for section in ["fusion", "canny", "batch", "mc_criteria", "export_format"] {
            assert!(schema.contains(section), "schema is missing {section}");
        }
    }
}
