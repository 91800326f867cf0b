use geo_types::{Coord, LineString, Polygon};
use schemars::JsonSchema;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

/// Fill state of a container.
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Label {
    Pleine,
    Vide,
}

impl Label {
    pub fn from_full(full: bool) -> Self {
        if full { Self::Pleine } else { Self::Vide }
    }

    pub fn is_full(self) -> bool {
        matches!(self, Self::Pleine)
    }
}

/// Which analyzer produced a [`ClassificationResult`].
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Method {
    Rules,
    CannyRatio,
}

/// Edge pixel counts in the upper and lower halves of an image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct EdgeCounts {
    pub top: u64,
    pub bottom: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ClassificationResult {
    pub label: Label,
    pub method: Method,
    /// Rule score for [`Method::Rules`], top/bottom ratio for [`Method::CannyRatio`]
    pub score: f64,
    pub raw_counts: Option<EdgeCounts>,
}

/// 10-bin histograms over [0, 256) for each RGB channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ChannelHistogram {
    pub red: [u64; 10],
    pub green: [u64; 10],
    pub blue: [u64; 10],
}

impl ChannelHistogram {
    pub const BINS: usize = 10;

    pub fn channels(&self) -> [(&'static str, &[u64; 10]); 3] {
        [("red", &self.red), ("green", &self.green), ("blue", &self.blue)]
    }
}

/// A traced border from a binary image.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<[f32; 2]>,
    pub is_hole: bool,
    /// Index of the enclosing contour, `None` for top-level borders
    pub parent: Option<usize>,
}

impl Contour {
    /// Outermost borders only (no holes, no nested shapes).
    pub fn is_external(&self) -> bool {
        !self.is_hole && self.parent.is_none()
    }

    fn to_line_string(&self) -> LineString<f64> {
        let mut coords: Vec<Coord<f64>> = self.points
            .iter()
            .map(|&[x, y]| Coord { x: x as f64, y: y as f64 })
            .collect();
        if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
            if first != last {
                coords.push(first);
            }
        }
        LineString::new(coords)
    }

    /// Closed perimeter length
    pub fn perimeter(&self) -> f64 {
        use geo::EuclideanLength;
        if self.points.len() < 2 {
            return 0.0;
        }
        self.to_line_string().euclidean_length()
    }

    /// Area enclosed by the contour polygon
    pub fn area(&self) -> f64 {
        use geo::Area;
        if self.points.len() < 3 {
            return 0.0;
        }
        Polygon::new(self.to_line_string(), vec![]).unsigned_area()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Float,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Histogram(ChannelHistogram),
}

impl FeatureValue {
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int => Self::Int(0),
            ValueKind::Float => Self::Float(0.0),
        }
    }

    /// Numeric view of the value; booleans read as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Text(_) | Self::Histogram(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Int(_) => Some(ValueKind::Int),
            Self::Float(_) => Some(ValueKind::Float),
            _ => None,
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for FeatureValue {
            fn from(value: $t) -> Self {
                Self::Int(value as i64)
            }
        })*
    };
}

impl_from_int!(i32, i64, u8, u32, u64, usize);

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for FeatureValue {
    fn from(value: f32) -> Self {
        Self::Float(value as f64)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<ChannelHistogram> for FeatureValue {
    fn from(value: ChannelHistogram) -> Self {
        Self::Histogram(value)
    }
}

/// Ordered map from feature name to value.
///
/// Insertion order is kept and becomes the column order of exported tables.
/// Re-inserting an existing key replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(String, FeatureValue)>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FeatureValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FeatureValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FeatureValue::as_f64)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append every entry of `other`, keeping its order.
    pub fn extend(&mut self, other: FeatureVector) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }
}

impl IntoIterator for FeatureVector {
    type Item = (String, FeatureValue);
    type IntoIter = std::vec::IntoIter<(String, FeatureValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<FeatureValue>> FromIterator<(K, V)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vector = Self::new();
        for (key, value) in iter {
            vector.insert(key, value);
        }
        vector
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
