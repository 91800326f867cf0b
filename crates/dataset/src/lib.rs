//! Tabular export of analyzed images.
//!
//! ```rust,no_run
//! use dataset::{DatasetRecord, ExportFormat, export_dataset};
//! # fn run(analyses: Vec<waste_vision::ImageAnalysis>) -> dataset::Result<()> {
//! let records: Vec<_> = analyses.iter().map(DatasetRecord::from_analysis).collect();
//! let paths = export_dataset(&records, "features.csv", ExportFormat::CsvJson)?;
//! println!("{}", paths.csv.display());
//! # Ok(())
//! # }
//! ```

pub mod csv;
pub mod error;
pub mod json;
pub mod record;

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::Local;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};
use tracing::info;

pub use error::{DatasetError, Result};
pub use json::DatasetDocument;
pub use record::DatasetRecord;

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
pub enum ExportFormat {
    #[default]
    #[serde(rename = "csv")]
    #[strum(serialize = "csv")]
    Csv,
    /// CSV plus a JSON document next to it
    #[serde(rename = "csv+json")]
    #[strum(serialize = "csv+json")]
    CsvJson,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub csv: PathBuf,
    pub json: Option<PathBuf>,
}

/// Write `records` to `output` (and its `.json` sibling for [`ExportFormat::CsvJson`]).
pub fn export_dataset(records: &[DatasetRecord], output: impl AsRef<Path>, format: ExportFormat) -> Result<ExportPaths> {
    if records.is_empty() {
        return Err(DatasetError::EmptyDataset);
    }
    let csv_path = output.as_ref().to_path_buf();
    if let Some(parent) = csv_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(&csv_path)?);
    csv::write_csv(&mut writer, records)?;
    writer.flush()?;
    info!(rows = records.len(), path = %csv_path.display(), "wrote CSV");

    let json_path = match format {
        ExportFormat::Csv => None,
        ExportFormat::CsvJson => {
            let path = csv_path.with_extension("json");
            let document = DatasetDocument::new(records, Local::now().naive_local());
            let mut writer = BufWriter::new(File::create(&path)?);
            serde_json::to_writer_pretty(&mut writer, &document)?;
            writer.flush()?;
            info!(path = %path.display(), "wrote JSON");
            Some(path)
        }
    };

    Ok(ExportPaths {
        csv: csv_path,
        json: json_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use waste_vision::{FeatureValue, FeatureVector, Label};

    fn records() -> Vec<DatasetRecord> {
        ["one.jpg", "two.jpg"]
            .into_iter()
            .zip([Label::Pleine, Label::Vide])
            .map(|(filename, label)| DatasetRecord {
                filename: filename.into(),
                classification: Some(label),
                technical: [("brightness", FeatureValue::Float(0.4))].into_iter().collect(),
                temporal: FeatureVector::new(),
            })
            .collect()
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let result = export_dataset(&[], dir.path().join("out.csv"), ExportFormat::Csv);
        assert!(matches!(result, Err(DatasetError::EmptyDataset)));
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn test_csv_only() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let paths = export_dataset(&records(), dir.path().join("nested/out.csv"), ExportFormat::Csv)
            .expect("Should export");
        assert!(paths.json.is_none());
        let text = fs::read_to_string(&paths.csv).expect("Should read");
        assert_eq!(text, "filename,brightness,classification\none.jpg,0.4,pleine\ntwo.jpg,0.4,vide\n");
    }

    #[test]
    fn test_csv_with_json_sibling() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let paths = export_dataset(&records(), dir.path().join("out.csv"), ExportFormat::CsvJson)
            .expect("Should export");
        let json_path = paths.json.expect("json requested");
        assert_eq!(json_path, dir.path().join("out.json"));

        let document: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(json_path).expect("Should read")).expect("Valid JSON");
        assert_eq!(document["metadata"]["total_images"], 2);
        assert_eq!(document["metadata"]["label_counts"]["pleine"], 1);
        assert_eq!(document["images"][1]["filename"], "two.jpg");
    }

    #[test]
    fn test_format_names() {
        assert_eq!("csv+json".parse::<ExportFormat>().expect("Should parse"), ExportFormat::CsvJson);
        assert_eq!(ExportFormat::Csv.to_string(), "csv");
        let json = serde_json::to_string(&ExportFormat::CsvJson).expect("Should serialize");
        assert_eq!(json, "\"csv+json\"");
    }
}
