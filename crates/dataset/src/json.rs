use chrono::NaiveDateTime;
use serde::Serialize;
use waste_vision::{FeatureValue, FeatureVector, Label};

use crate::record::DatasetRecord;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatasetDocument {
    pub metadata: Metadata,
    pub images: Vec<ImageEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Metadata {
    /// ISO-8601 export time
    pub date: String,
    pub total_images: usize,
    pub label_counts: LabelCounts,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct LabelCounts {
    pub pleine: usize,
    pub vide: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageEntry {
    pub filename: String,
    pub classification: Option<Label>,
    pub technical: FeatureVector,
    pub temporal: FeatureVector,
}

impl DatasetDocument {
    pub fn new(records: &[DatasetRecord], date: NaiveDateTime) -> Self {
        let mut label_counts = LabelCounts::default();
        for label in records.iter().filter_map(|r| r.classification) {
            match label {
                Label::Pleine => label_counts.pleine += 1,
                Label::Vide => label_counts.vide += 1,
            }
        }

        let images = records
            .iter()
            .map(|record| ImageEntry {
                filename: record.filename.clone(),
                classification: record.classification,
                technical: finite(&record.technical),
                temporal: finite(&record.temporal),
            })
            .collect();

        Self {
            metadata: Metadata {
                date: date.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
                total_images: records.len(),
                label_counts,
            },
            images,
        }
    }
}

/// Copy of `vector` with non-finite floats replaced by `0.0`.
fn finite(vector: &FeatureVector) -> FeatureVector {
    vector
        .iter()
        .map(|(key, value)| match value {
            FeatureValue::Float(v) if !v.is_finite() => (key, FeatureValue::Float(0.0)),
            other => (key, other.clone()),
        })
        .collect()
}
