//! Global geometry, intensity distribution and colour-channel statistics.

use crate::{
    algorithms::stats::{EPSILON, gray_summary, percentile, skewness_kurtosis, summarize},
    error::FeatureResult,
    types::{FeatureVector, ValueKind},
};

use super::{FeatureBlock, FeatureFamily, FusionInput, KeySpec, float_keys};

pub const BLOCKS: &[FeatureBlock] = &[
    FeatureBlock {
        family: FeatureFamily::Basic,
        name: "geometry",
        keys: geometry_keys,
        compute: geometry,
    },
    FeatureBlock {
        family: FeatureFamily::Basic,
        name: "intensity",
        keys: intensity_keys,
        compute: intensity,
    },
    FeatureBlock {
        family: FeatureFamily::Basic,
        name: "hsv",
        keys: hsv_keys,
        compute: hsv,
    },
    FeatureBlock {
        family: FeatureFamily::Basic,
        name: "rgb",
        keys: rgb_keys,
        compute: rgb,
    },
];

fn geometry_keys() -> KeySpec {
    let mut keys: KeySpec = ["image_width", "image_height", "total_pixels"]
        .iter()
        .map(|k| (k.to_string(), ValueKind::Int))
        .collect();
    keys.extend(float_keys(&["aspect_ratio", "diagonal"]));
    keys
}

fn geometry(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    let total = input.require_pixels("geometry")?;
    let (width, height) = (input.gray.width(), input.gray.height());
    let mut group = FeatureVector::with_capacity(5);
    group.insert("image_width", width);
    group.insert("image_height", height);
    group.insert("total_pixels", total);
    group.insert("aspect_ratio", width as f64 / height as f64);
    group.insert("diagonal", (width as f64).hypot(height as f64));
    Ok(group)
}

fn intensity_keys() -> KeySpec {
    let mut keys = float_keys(&["global_mean", "global_std"]);
    keys.push(("global_min".into(), ValueKind::Int));
    keys.push(("global_max".into(), ValueKind::Int));
    keys.extend(float_keys(&[
        "global_median",
        "global_range",
        "global_q25",
        "global_q75",
        "global_iqr",
        "global_skewness",
        "global_kurtosis",
        "dark_pixels_ratio",
        "bright_pixels_ratio",
        "mid_pixels_ratio",
        "contrast_ratio",
    ]));
    keys
}

fn intensity(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    let total = input.require_pixels("intensity")? as f64;
    let summary = gray_summary(input.gray);

    let mut sorted_raw = input.gray.as_raw().clone();
    sorted_raw.sort_unstable();
    let sorted: Vec<f64> = sorted_raw.iter().map(|&v| v as f64).collect();
    let (q25, median, q75) = (
        percentile(&sorted, 25.0),
        percentile(&sorted, 50.0),
        percentile(&sorted, 75.0),
    );
    let (skewness, kurtosis) = skewness_kurtosis(&sorted);

    let thresholds = &input.config.pixel_thresholds;
    let dark = sorted_raw.iter().filter(|&&v| v < thresholds.dark_intensity).count() as f64 / total;
    let bright = sorted_raw.iter().filter(|&&v| v > thresholds.bright_intensity).count() as f64 / total;

    let mut group = FeatureVector::with_capacity(15);
    group.insert("global_mean", summary.mean);
    group.insert("global_std", summary.std);
    group.insert("global_min", summary.min as i64);
    group.insert("global_max", summary.max as i64);
    group.insert("global_median", median);
    group.insert("global_range", summary.range());
    group.insert("global_q25", q25);
    group.insert("global_q75", q75);
    group.insert("global_iqr", q75 - q25);
    group.insert("global_skewness", skewness);
    group.insert("global_kurtosis", kurtosis);
    group.insert("dark_pixels_ratio", dark);
    group.insert("bright_pixels_ratio", bright);
    group.insert("mid_pixels_ratio", 1.0 - dark - bright);
    group.insert("contrast_ratio", bright / (dark + EPSILON));
    Ok(group)
}

fn hsv_keys() -> KeySpec {
    float_keys(&[
        "hue_mean",
        "hue_std",
        "saturation_mean",
        "saturation_std",
        "value_mean",
        "value_std",
        "hue_range",
        "saturation_range",
        "value_range",
        "hsv_mean_combined",
        "hsv_std_combined",
        "color_diversity",
    ])
}

fn hsv(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    input.require_pixels("hsv")?;
    let plane = |values: &[u8]| summarize(values.iter().map(|&v| v as f64));
    let (h, s, v) = (
        plane(&input.hsv.hue),
        plane(&input.hsv.saturation),
        plane(&input.hsv.value),
    );

    let mut group = FeatureVector::with_capacity(12);
    group.insert("hue_mean", h.mean);
    group.insert("hue_std", h.std);
    group.insert("saturation_mean", s.mean);
    group.insert("saturation_std", s.std);
    group.insert("value_mean", v.mean);
    group.insert("value_std", v.std);
    group.insert("hue_range", h.range());
    group.insert("saturation_range", s.range());
    group.insert("value_range", v.range());
    group.insert("hsv_mean_combined", (h.mean + s.mean + v.mean) / 3.0);
    group.insert("hsv_std_combined", (h.std + s.std + v.std) / 3.0);
    group.insert("color_diversity", h.std * s.std);
    Ok(group)
}

const CHANNELS: [&str; 3] = ["red", "green", "blue"];

fn rgb_keys() -> KeySpec {
    let mut names: Vec<String> = CHANNELS
        .iter()
        .flat_map(|c| ["mean", "std", "min", "max"].map(|stat| format!("{c}_{stat}")))
        .collect();
    names.push("rgb_balance".into());
    names.push("dominant_channel".into());
    names.into_iter().map(|name| (name, ValueKind::Float)).collect()
}

fn rgb(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    input.require_pixels("rgb")?;
    let mut group = FeatureVector::with_capacity(14);
    let mut means = [0.0f64; 3];
    for (index, name) in CHANNELS.iter().enumerate() {
        let summary = summarize(input.rgb.pixels().map(|p| p.0[index] as f64));
        means[index] = summary.mean;
        group.insert(format!("{name}_mean"), summary.mean);
        group.insert(format!("{name}_std"), summary.std);
        group.insert(format!("{name}_min"), summary.min);
        group.insert(format!("{name}_max"), summary.max);
    }
    let [r, g, b] = means;
    group.insert("rgb_balance", (r - g).abs() + (g - b).abs() + (b - r).abs());
    // First maximum wins on ties.
    let dominant = means
        .iter()
        .enumerate()
        .fold(0usize, |best, (i, &m)| if m > means[best] { i } else { best });
    group.insert("dominant_channel", dominant as f64);
    Ok(group)
}
