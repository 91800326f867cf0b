use waste_vision::{BasicFeatures, FeatureValue, FeatureVector, ImageAnalysis, Label};

use crate::error::{DatasetError, Result};

/// One exported row.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRecord {
    pub filename: String,
    /// `None` for unlabelled rows such as raw fusion features
    pub classification: Option<Label>,
    pub technical: FeatureVector,
    pub temporal: FeatureVector,
}

impl DatasetRecord {
    pub fn from_basic(filename: impl Into<String>, features: &BasicFeatures, classification: Option<Label>) -> Self {
        Self {
            filename: filename.into(),
            classification,
            technical: features.technical.to_feature_vector(),
            temporal: features.temporal.to_feature_vector(),
        }
    }

    /// Basic features labelled by the rule verdict, with the rule score and
    /// any Canny second opinion appended to the technical columns.
    pub fn from_analysis(analysis: &ImageAnalysis) -> Self {
        let mut record = Self::from_basic(&analysis.filename, &analysis.features, Some(analysis.label()));
        record.technical.insert("rule_score", analysis.rules.score);
        if let Some(canny) = &analysis.canny {
            record.technical.extend(canny.to_feature_vector());
        }
        record
    }

    /// An unlabelled fusion row; its `filename` entry becomes the record name.
    pub fn from_fusion(row: &FeatureVector) -> Result<Self> {
        let filename = match row.get("filename").and_then(FeatureValue::as_str) {
            Some(name) => name.to_string(),
            None => {
                return Err(DatasetError::MissingFilename {
                    filename: format!("<{} features>", row.len()),
                });
            }
        };
        let technical = row
            .iter()
            .filter(|(key, _)| *key != "filename")
            .map(|(key, value)| (key, value.clone()))
            .collect();
        Ok(Self {
            filename,
            classification: None,
            technical,
            temporal: FeatureVector::new(),
        })
    }

    /// Technical entries followed by temporal ones.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.technical.iter().chain(self.temporal.iter())
    }
}
