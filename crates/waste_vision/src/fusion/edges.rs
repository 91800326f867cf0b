//! Edges: multi-scale Canny with contour statistics, Hough lines and Sobel gradient directions.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use crate::{
    algorithms::{
        count_edge_pixels,
        edges::{GradientField, hough_line_angles},
        preprocessing::gaussian_blur,
        stats::{EPSILON, entropy, histogram, normalize, std_dev, summarize},
    },
    error::FeatureResult,
    types::{FeatureVector, ValueKind},
};

use super::{FeatureBlock, FeatureFamily, FusionInput, KeySpec, float_keys, primitive};

pub const BLOCKS: &[FeatureBlock] = &[
    FeatureBlock {
        family: FeatureFamily::Edges,
        name: "multiscale_edges",
        keys: multiscale_keys,
        compute: multiscale,
    },
    FeatureBlock {
        family: FeatureFamily::Edges,
        name: "hough_lines",
        keys: hough_keys,
        compute: hough,
    },
    FeatureBlock {
        family: FeatureFamily::Edges,
        name: "gradients",
        keys: gradient_keys,
        compute: gradients,
    },
];

/// `(sigma, low, high)` per scale.
const SCALES: [(f32, f32, f32); 3] = [(1.0, 50.0, 150.0), (2.0, 30.0, 100.0), (3.0, 20.0, 80.0)];

/// Contours enclosing this area or less are too small to have a meaningful shape.
const MIN_CONTOUR_AREA: f64 = 10.0;

fn multiscale_keys() -> KeySpec {
    (0..SCALES.len())
        .flat_map(|i| {
            [
                (format!("edge_density_scale_{i}"), ValueKind::Float),
                (format!("contour_count_scale_{i}"), ValueKind::Int),
                (format!("contour_length_scale_{i}"), ValueKind::Float),
                (format!("contour_complexity_scale_{i}"), ValueKind::Float),
            ]
        })
        .collect()
}

fn multiscale(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    let total = input.require_pixels("multiscale_edges")? as f64;
    let mut group = FeatureVector::with_capacity(SCALES.len() * 4);

    for (i, (sigma, low, high)) in SCALES.into_iter().enumerate() {
        let blurred = gaussian_blur(input.gray, sigma);
        let edges = input
            .edge_detector
            .detect_edges(&blurred, low, high)
            .map_err(primitive)?;
        let contours = input
            .contour_extractor
            .extract_contours(&edges)
            .map_err(primitive)?;
        let external: Vec<_> = contours.iter().filter(|c| c.is_external()).collect();

        let length: f64 = external.iter().map(|c| c.perimeter()).sum();
        let complexities: Vec<f64> = external
            .iter()
            .filter_map(|c| {
                let area = c.area();
                let perimeter = c.perimeter();
                (area > MIN_CONTOUR_AREA && perimeter > 0.0)
                    .then(|| perimeter * perimeter / (4.0 * PI * area))
            })
            .collect();

        group.insert(format!("edge_density_scale_{i}"), count_edge_pixels(&edges) as f64 / total);
        group.insert(format!("contour_count_scale_{i}"), external.len());
        group.insert(format!("contour_length_scale_{i}"), length);
        group.insert(
            format!("contour_complexity_scale_{i}"),
            summarize(complexities.iter().copied()).mean,
        );
    }
    Ok(group)
}

fn hough_keys() -> KeySpec {
    vec![
        ("hough_lines_count".into(), ValueKind::Int),
        ("hough_lines_angle_mean".into(), ValueKind::Float),
        ("hough_lines_angle_std".into(), ValueKind::Float),
        ("horizontal_lines".into(), ValueKind::Int),
        ("vertical_lines".into(), ValueKind::Int),
        ("line_orientation_ratio".into(), ValueKind::Float),
    ]
}

fn hough(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    input.require_pixels("hough_lines")?;
    let low = input.config.pixel_thresholds.edge_sensitivity as f32;
    let edges = input
        .edge_detector
        .detect_edges(input.gray, low, 3.0 * low)
        .map_err(primitive)?;
    let options = input.config.hough;
    let angles = hough_line_angles(&edges, options.vote_threshold, options.suppression_radius);

    let horizontal = angles
        .iter()
        .filter(|&&theta| theta.abs() < FRAC_PI_4 || (theta - PI).abs() < FRAC_PI_4)
        .count();
    let vertical = angles
        .iter()
        .filter(|&&theta| (theta - FRAC_PI_2).abs() < FRAC_PI_4)
        .count();
    let summary = summarize(angles.iter().copied());

    let mut group = FeatureVector::with_capacity(6);
    group.insert("hough_lines_count", angles.len());
    group.insert("hough_lines_angle_mean", summary.mean);
    group.insert("hough_lines_angle_std", summary.std);
    group.insert("horizontal_lines", horizontal);
    group.insert("vertical_lines", vertical);
    group.insert("line_orientation_ratio", horizontal as f64 / (vertical as f64 + EPSILON));
    Ok(group)
}

const QUADRANTS: [(f64, f64); 4] = [(-PI, -FRAC_PI_2), (-FRAC_PI_2, 0.0), (0.0, FRAC_PI_2), (FRAC_PI_2, PI)];

fn gradient_keys() -> KeySpec {
    let mut keys = float_keys(&[
        "gradient_magnitude_mean",
        "gradient_magnitude_std",
        "gradient_magnitude_max",
        "gradient_direction_entropy",
        "gradient_direction_dominance",
    ]);
    keys.extend((0..QUADRANTS.len()).map(|i| (format!("gradient_quadrant_{i}"), ValueKind::Float)));
    keys.extend(float_keys(&["gradient_coherence", "gradient_anisotropy"]));
    keys
}

fn gradients(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    let total = input.require_pixels("gradients")? as f64;
    let field = GradientField::compute(input.gray);
    let magnitude = summarize(field.magnitudes());
    let directions: Vec<f64> = field.directions().collect();
    let distribution = normalize(&histogram(directions.iter().copied(), 8, -PI, PI));

    let mut group = FeatureVector::with_capacity(11);
    group.insert("gradient_magnitude_mean", magnitude.mean);
    group.insert("gradient_magnitude_std", magnitude.std);
    group.insert("gradient_magnitude_max", magnitude.max);
    group.insert("gradient_direction_entropy", entropy(&distribution));
    group.insert(
        "gradient_direction_dominance",
        distribution.iter().copied().fold(0.0, f64::max),
    );
    for (i, (lo, hi)) in QUADRANTS.into_iter().enumerate() {
        let inside = directions.iter().filter(|&&d| d >= lo && d < hi).count();
        group.insert(format!("gradient_quadrant_{i}"), inside as f64 / total);
    }

    let n = field.len() as f64;
    let dx_mean = field.dx.iter().sum::<f64>() / n;
    let dy_mean = field.dy.iter().sum::<f64>() / n;
    group.insert(
        "gradient_coherence",
        dx_mean.hypot(dy_mean) / (magnitude.mean + EPSILON),
    );
    group.insert("gradient_anisotropy", std_dev(&distribution));
    Ok(group)
}
