//! Flat CSV rendering.
//!
//! Columns are `filename`, every feature key in first-seen order across the
//! records, then `classification`. Histogram values spread over one column per
//! channel and bin. Missing or non-finite cells are left empty.

use std::{
    collections::{HashMap, HashSet},
    io::Write,
};

use waste_vision::{ChannelHistogram, FeatureValue};

use crate::{error::Result, record::DatasetRecord};

const RESERVED: [&str; 2] = ["filename", "classification"];

/// Header row for `records`.
pub fn columns(records: &[DatasetRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = vec![RESERVED[0].to_string()];
    for record in records {
        for (key, value) in record.entries() {
            if RESERVED.contains(&key) {
                continue;
            }
            for column in expand(key, value).into_iter().map(|(column, _)| column) {
                if seen.insert(column.clone()) {
                    columns.push(column);
                }
            }
        }
    }
    columns.push(RESERVED[1].to_string());
    columns
}

/// `(column, cell)` pairs for one value.
fn expand(key: &str, value: &FeatureValue) -> Vec<(String, String)> {
    match value {
        FeatureValue::Histogram(histogram) => histogram_cells(key, histogram),
        other => vec![(key.to_string(), cell(other))],
    }
}

fn histogram_cells(key: &str, histogram: &ChannelHistogram) -> Vec<(String, String)> {
    histogram
        .channels()
        .into_iter()
        .flat_map(|(channel, bins)| {
            bins.iter()
                .enumerate()
                .map(move |(bin, count)| (format!("{key}_{channel}_{bin}"), count.to_string()))
        })
        .collect()
}

fn cell(value: &FeatureValue) -> String {
    match value {
        FeatureValue::Int(v) => v.to_string(),
        FeatureValue::Float(v) if v.is_finite() => v.to_string(),
        FeatureValue::Float(_) => String::new(),
        FeatureValue::Bool(v) => v.to_string(),
        FeatureValue::Text(text) => text.clone(),
        // Expanded by `expand`; never reaches a single cell.
        FeatureValue::Histogram(_) => String::new(),
    }
}

/// RFC 4180 field quoting.
pub fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_row<W: Write>(writer: &mut W, fields: impl Iterator<Item = String>) -> Result<()> {
    let line: Vec<String> = fields.map(|field| quote(&field)).collect();
    writeln!(writer, "{}", line.join(","))?;
    Ok(())
}

pub fn write_csv<W: Write>(writer: &mut W, records: &[DatasetRecord]) -> Result<()> {
    let header = columns(records);
    write_row(writer, header.iter().cloned())?;

    for record in records {
        let cells: HashMap<String, String> = record
            .entries()
            .filter(|(key, _)| !RESERVED.contains(key))
            .flat_map(|(key, value)| expand(key, value))
            .collect();
        let classification = record.classification.map(|label| label.to_string()).unwrap_or_default();

        let row = header.iter().map(|column| match column.as_str() {
            "filename" => record.filename.clone(),
            "classification" => classification.clone(),
            other => cells.get(other).cloned().unwrap_or_default(),
        });
        write_row(writer, row)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use waste_vision::{FeatureVector, Label};

    fn record(filename: &str, technical: FeatureVector, classification: Option<Label>) -> DatasetRecord {
        DatasetRecord {
            filename: filename.to_string(),
            classification,
            technical,
            temporal: [("day_of_week", "Monday")].into_iter().collect(),
        }
    }

    fn render(records: &[DatasetRecord]) -> String {
        let mut out = Vec::new();
        write_csv(&mut out, records).expect("Should write");
        String::from_utf8(out).expect("Valid UTF-8")
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("a,b"), "\"a,b\"");
        assert_eq!(quote("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(quote("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_columns_follow_first_seen_order() {
        let first = record("a.jpg", [("width", FeatureValue::Int(4))].into_iter().collect(), Some(Label::Vide));
        let second = record(
            "b.jpg",
            [("contrast", FeatureValue::Float(0.5)), ("width", FeatureValue::Int(8))]
                .into_iter()
                .collect(),
            Some(Label::Pleine),
        );

        let text = render(&[first, second]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "filename,width,day_of_week,contrast,classification");
        assert_eq!(lines[1], "a.jpg,4,Monday,,vide");
        assert_eq!(lines[2], "b.jpg,8,Monday,0.5,pleine");
    }

    #[test]
    fn test_histogram_expands_to_thirty_columns() {
        let mut histogram = ChannelHistogram::default();
        histogram.green[3] = 7;
        let technical: FeatureVector = [("histogram", FeatureValue::Histogram(histogram))].into_iter().collect();
        let records = [record("h.png", technical, None)];
        let header = columns(&records);

        assert_eq!(header.len(), 1 + 30 + 1 + 1);
        assert_eq!(header[1], "histogram_red_0");
        assert_eq!(header[30], "histogram_blue_9");
        let green_3 = header.iter().position(|c| c == "histogram_green_3").expect("present");

        let text = render(&records);
        let row: Vec<&str> = text.lines().nth(1).expect("data row").split(',').collect();
        assert_eq!(row[green_3], "7");
        assert_eq!(row.last(), Some(&""));
    }

    #[test]
    fn test_text_and_non_finite_cells() {
        let technical: FeatureVector = [
            ("avg_color", FeatureValue::Text("rgb(1,2,3)".into())),
            ("ratio", FeatureValue::Float(f64::NAN)),
        ]
        .into_iter()
        .collect();
        let text = render(&[record("x.jpg", technical, None)]);
        let data = text.lines().nth(1).expect("data row");
        assert_eq!(data, "x.jpg,\"rgb(1,2,3)\",,Monday,");
    }
}
