//! Colour: HSV range masks and superpixel statistics.

use crate::{
    algorithms::stats::{EPSILON, smoothed_entropy, summarize},
    error::FeatureResult,
    types::{FeatureVector, ValueKind},
};

use super::{FeatureBlock, FeatureFamily, FusionInput, KeySpec, float_keys, primitive};

pub const BLOCKS: &[FeatureBlock] = &[
    FeatureBlock {
        family: FeatureFamily::Color,
        name: "hsv_masks",
        keys: mask_keys,
        compute: masks,
    },
    FeatureBlock {
        family: FeatureFamily::Color,
        name: "superpixels",
        keys: segment_keys,
        compute: segments,
    },
];

/// Segments of this many pixels or fewer are ignored in shape and colour statistics.
const MIN_SEGMENT_AREA: u64 = 10;

fn mask_keys() -> KeySpec {
    float_keys(&[
        "green_pixel_ratio",
        "dark_pixel_ratio",
        "bright_pixel_ratio",
        "red_pixel_ratio",
        "blue_pixel_ratio",
        "color_diversity_hsv",
        "saturation_coverage",
        "brightness_coverage",
        "hue_concentration",
        "color_uniformity",
    ])
}

fn masks(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    let total = input.require_pixels("hsv_masks")? as f64;
    let hsv = input.hsv;
    let thresholds = &input.config.pixel_thresholds;
    // Inclusive (h, s, v) boxes on the 8-bit scale.
    let ranges = [
        ("green", [35, 40, 40], [85, 255, 255]),
        ("dark", [0, 0, 0], [180, 255, thresholds.dark_intensity]),
        ("bright", [0, 0, thresholds.bright_intensity], [180, 30, 255]),
        ("red", [0, 50, 50], [10, 255, 255]),
        ("blue", [100, 50, 50], [130, 255, 255]),
    ];

    let mut group = FeatureVector::with_capacity(10);
    for (name, lower, upper) in ranges {
        group.insert(
            format!("{name}_pixel_ratio"),
            hsv.count_in_range(lower, upper) as f64 / total,
        );
    }

    let hue = summarize(hsv.hue.iter().map(|&v| v as f64));
    let saturation = summarize(hsv.saturation.iter().map(|&v| v as f64));
    let saturated = hsv.saturation.iter().filter(|&&s| s > 50).count() as f64;
    let lit = hsv.value.iter().filter(|&&v| v > 100).count() as f64;

    group.insert("color_diversity_hsv", hue.std * saturation.std);
    group.insert("saturation_coverage", saturated / total);
    group.insert("brightness_coverage", lit / total);
    group.insert("hue_concentration", 1.0 / (1.0 + hue.std));
    group.insert("color_uniformity", 1.0 / (1.0 + saturation.std));
    Ok(group)
}

fn segment_keys() -> KeySpec {
    let mut keys = vec![("color_segments".to_string(), ValueKind::Int)];
    keys.extend(float_keys(&[
        "segment_area_mean",
        "segment_area_std",
        "segment_area_max",
        "segment_color_diversity",
        "segment_brightness_mean",
        "segment_brightness_std",
        "segments_top_bottom_ratio",
        "segment_compactness_mean",
        "segment_compactness_std",
        "segment_entropy",
        "segment_uniformity",
        "largest_segment_dominance",
        "color_fragmentation",
    ]));
    keys
}

fn segments(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    let total = input.require_pixels("superpixels")? as f64;
    let map = input.segmenter.segment(input.rgb).map_err(primitive)?;
    let regions = map.regions(input.rgb);
    let kept: Vec<_> = regions.iter().filter(|r| r.area > MIN_SEGMENT_AREA).collect();

    let mut group = FeatureVector::with_capacity(14);
    group.insert("color_segments", map.count);
    if kept.is_empty() {
        for (key, kind) in segment_keys().into_iter().skip(1) {
            group.insert(key, crate::types::FeatureValue::zero(kind));
        }
        return Ok(group);
    }

    let areas = summarize(kept.iter().map(|r| r.area as f64));
    let channel_means = summarize(kept.iter().flat_map(|r| r.mean_rgb));
    let brightness = summarize(kept.iter().map(|r| r.brightness()));
    let compactness = summarize(kept.iter().map(|r| r.compactness()));

    let mid = input.gray.height() as f64 / 2.0;
    let top = kept.iter().filter(|r| r.centroid_y < mid).count() as f64;
    let bottom = kept.len() as f64 - top;

    let all_areas: Vec<u64> = regions.iter().map(|r| r.area).collect();
    let shares: Vec<f64> = all_areas.iter().map(|&a| a as f64 / total).collect();

    group.insert("segment_area_mean", areas.mean);
    group.insert("segment_area_std", areas.std);
    group.insert("segment_area_max", areas.max);
    group.insert("segment_color_diversity", channel_means.std);
    group.insert("segment_brightness_mean", brightness.mean);
    group.insert("segment_brightness_std", brightness.std);
    group.insert("segments_top_bottom_ratio", top / (bottom + EPSILON));
    group.insert("segment_compactness_mean", compactness.mean);
    group.insert("segment_compactness_std", compactness.std);
    group.insert("segment_entropy", smoothed_entropy(&all_areas));
    group.insert("segment_uniformity", shares.iter().map(|p| p * p).sum::<f64>());
    group.insert("largest_segment_dominance", areas.max / total);
    group.insert("color_fragmentation", map.count as f64 / total.sqrt());
    Ok(group)
}
