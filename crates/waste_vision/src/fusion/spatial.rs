//! Spatial layout: per-quadrant statistics and the bin-specific analysis zones.

use image::GrayImage;

use crate::{
    algorithms::stats::{histogram, smoothed_entropy, summarize},
    error::FeatureResult,
    types::{FeatureVector, ValueKind},
};

use super::{FeatureBlock, FeatureFamily, FusionInput, KeySpec};

pub const BLOCKS: &[FeatureBlock] = &[
    FeatureBlock {
        family: FeatureFamily::Spatial,
        name: "quadrants",
        keys: quadrant_keys,
        compute: quadrants,
    },
    FeatureBlock {
        family: FeatureFamily::Spatial,
        name: "zones",
        keys: zone_keys,
        compute: zones,
    },
];

const QUADRANTS: [&str; 4] = ["top_left", "top_right", "bottom_left", "bottom_right"];
const QUADRANT_METRICS: [&str; 4] = ["mean", "std", "entropy", "activity"];

const ZONES: [&str; 6] = ["ground", "container", "overflow", "left_side", "right_side", "center"];
const ZONE_METRICS: [&str; 3] = ["mean", "std", "contrast"];

/// Row-major pixels of the window `[x0, x1) × [y0, y1)`.
fn window(gray: &GrayImage, (x0, x1): (u32, u32), (y0, y1): (u32, u32)) -> Vec<u8> {
    let (x1, y1) = (x1.min(gray.width()), y1.min(gray.height()));
    if x0 >= x1 || y0 >= y1 {
        return Vec::new();
    }
    let mut pixels = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
    for y in y0..y1 {
        for x in x0..x1 {
            pixels.push(gray.get_pixel(x, y).0[0]);
        }
    }
    pixels
}

fn quadrant_keys() -> KeySpec {
    QUADRANTS
        .iter()
        .flat_map(|q| QUADRANT_METRICS.map(|m| (format!("{q}_{m}"), ValueKind::Float)))
        .collect()
}

fn quadrants(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    input.require_pixels("quadrants")?;
    let (width, height) = input.gray.dimensions();
    let (w_mid, h_mid) = (width / 2, height / 2);
    let windows = [
        ((0, w_mid), (0, h_mid)),
        ((w_mid, width), (0, h_mid)),
        ((0, w_mid), (h_mid, height)),
        ((w_mid, width), (h_mid, height)),
    ];

    let mut group = FeatureVector::with_capacity(16);
    for (name, (xs, ys)) in QUADRANTS.iter().zip(windows) {
        let pixels = window(input.gray, xs, ys);
        let (mut mean, mut std, mut entropy, mut activity) = (0.0, 0.0, 0.0, 0.0);
        if !pixels.is_empty() {
            let summary = summarize(pixels.iter().map(|&v| v as f64));
            mean = summary.mean;
            std = summary.std;
            entropy = smoothed_entropy(&histogram(pixels.iter().map(|&v| v as f64), 8, 0.0, 256.0));
            activity = pixels
                .windows(2)
                .map(|w| (w[1] as f64 - w[0] as f64).abs())
                .sum();
        }
        group.insert(format!("{name}_mean"), mean);
        group.insert(format!("{name}_std"), std);
        group.insert(format!("{name}_entropy"), entropy);
        group.insert(format!("{name}_activity"), activity);
    }
    Ok(group)
}

fn zone_keys() -> KeySpec {
    ZONES
        .iter()
        .flat_map(|z| ZONE_METRICS.map(|m| (format!("zone_{z}_{m}"), ValueKind::Float)))
        .collect()
}

fn zones(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    input.require_pixels("zones")?;
    let (width, height) = input.gray.dimensions();
    let zones = &input.config.zones;
    let rows = |(start, end): (f64, f64)| {
        ((height as f64 * start) as u32, (height as f64 * end) as u32)
    };
    let cols = |(start, end): (f64, f64)| {
        ((width as f64 * start) as u32, (width as f64 * end) as u32)
    };
    let side = (width as f64 * zones.side_fraction) as u32;
    let full_width = (0, width);
    let full_height = (0, height);

    let windows = [
        (full_width, rows(zones.ground)),
        (full_width, rows(zones.container)),
        (full_width, rows(zones.overflow)),
        ((0, side), full_height),
        ((width - side, width), full_height),
        (cols(zones.center), full_height),
    ];

    let mut group = FeatureVector::with_capacity(18);
    for (name, (xs, ys)) in ZONES.iter().zip(windows) {
        let pixels = window(input.gray, xs, ys);
        let summary = summarize(pixels.iter().map(|&v| v as f64));
        group.insert(format!("zone_{name}_mean"), summary.mean);
        group.insert(format!("zone_{name}_std"), summary.std);
        group.insert(format!("zone_{name}_contrast"), summary.range());
    }
    Ok(group)
}
