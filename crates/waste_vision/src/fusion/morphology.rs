//! Morphology: grayscale open/close family, skeleton of the Otsu mask and an opening granulometry.

use crate::{
    algorithms::{
        morphology::{MorphologyStack, component_areas, open_with_size, skeletonize},
        preprocessing::otsu_binarize,
        stats::{EPSILON, gray_summary, summarize},
    },
    error::FeatureResult,
    types::{FeatureVector, ValueKind},
};

use super::{FeatureBlock, FeatureFamily, FusionInput, KeySpec, float_keys};

pub const BLOCKS: &[FeatureBlock] = &[
    FeatureBlock {
        family: FeatureFamily::Morphology,
        name: "morphology_ops",
        keys: operation_keys,
        compute: operations,
    },
    FeatureBlock {
        family: FeatureFamily::Morphology,
        name: "skeleton",
        keys: skeleton_keys,
        compute: skeleton,
    },
    FeatureBlock {
        family: FeatureFamily::Morphology,
        name: "granulometry",
        keys: granulometry_keys,
        compute: granulometry,
    },
];

/// Radius of the disk approximating a 5×5 elliptical element.
const ELEMENT_RADIUS: u8 = 2;

const GRANULOMETRY_SIZES: [u8; 5] = [1, 3, 5, 7, 9];

fn operation_keys() -> KeySpec {
    float_keys(&[
        "morpho_opening_mean",
        "morpho_closing_mean",
        "morpho_gradient_mean",
        "morpho_tophat_mean",
        "morpho_blackhat_mean",
        "opening_closing_diff",
        "tophat_blackhat_diff",
        "morpho_complexity",
        "morpho_gradient_max",
        "morpho_gradient_range",
    ])
}

fn mean_abs_diff(a: &image::GrayImage, b: &image::GrayImage) -> f64 {
    let n = a.as_raw().len().max(1) as f64;
    a.as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| (x as f64 - y as f64).abs())
        .sum::<f64>()
        / n
}

fn operations(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    input.require_pixels("morphology_ops")?;
    let stack = MorphologyStack::compute(input.gray, ELEMENT_RADIUS);
    let gradient = gray_summary(&stack.gradient);

    let mut group = FeatureVector::with_capacity(10);
    group.insert("morpho_opening_mean", gray_summary(&stack.opened).mean);
    group.insert("morpho_closing_mean", gray_summary(&stack.closed).mean);
    group.insert("morpho_gradient_mean", gradient.mean);
    group.insert("morpho_tophat_mean", gray_summary(&stack.tophat).mean);
    group.insert("morpho_blackhat_mean", gray_summary(&stack.blackhat).mean);
    group.insert("opening_closing_diff", mean_abs_diff(&stack.opened, &stack.closed));
    group.insert("tophat_blackhat_diff", mean_abs_diff(&stack.tophat, &stack.blackhat));
    group.insert("morpho_complexity", gradient.std / (gradient.mean + EPSILON));
    group.insert("morpho_gradient_max", gradient.max);
    group.insert("morpho_gradient_range", gradient.range());
    Ok(group)
}

fn skeleton_keys() -> KeySpec {
    let mut keys = float_keys(&["skeleton_length", "skeleton_density"]);
    keys.push(("skeleton_branches".into(), ValueKind::Int));
    keys.extend(float_keys(&["skeleton_branch_mean", "skeleton_branch_std"]));
    keys
}

fn skeleton(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    let total = input.require_pixels("skeleton")? as f64;
    let thin = skeletonize(&otsu_binarize(input.gray));
    let length = thin.as_raw().iter().filter(|&&v| v > 0).count() as f64;
    let branches = component_areas(&thin);
    let sizes = summarize(branches.iter().map(|&a| a as f64));

    let mut group = FeatureVector::with_capacity(5);
    group.insert("skeleton_length", length);
    group.insert("skeleton_density", length / total);
    group.insert("skeleton_branches", branches.len());
    group.insert("skeleton_branch_mean", sizes.mean);
    group.insert("skeleton_branch_std", sizes.std);
    Ok(group)
}

fn granulometry_keys() -> KeySpec {
    let mut names = vec![
        "granulo_mean".to_string(),
        "granulo_std".into(),
        "granulo_slope".into(),
        "granulo_char_size".into(),
    ];
    names.extend(GRANULOMETRY_SIZES.iter().map(|s| format!("granulo_size_{s}")));
    names.push("granulo_uniformity".into());
    names.into_iter().map(|name| (name, ValueKind::Float)).collect()
}

fn granulometry(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    input.require_pixels("granulometry")?;
    let remaining: Vec<f64> = GRANULOMETRY_SIZES
        .iter()
        .map(|&size| {
            let opened = open_with_size(input.gray, size);
            opened.as_raw().iter().filter(|&&v| v > 0).count() as f64
        })
        .collect();
    let curve = summarize(remaining.iter().copied());
    let n = remaining.len();

    // Size at the steepest step of the curve, first one on ties.
    let char_size = remaining
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .enumerate()
        .fold((0usize, f64::NEG_INFINITY), |best, (i, d)| if d > best.1 { (i, d) } else { best })
        .0;

    let mut group = FeatureVector::with_capacity(10);
    group.insert("granulo_mean", curve.mean);
    group.insert("granulo_std", curve.std);
    group.insert("granulo_slope", (remaining[n - 1] - remaining[0]) / n as f64);
    group.insert("granulo_char_size", GRANULOMETRY_SIZES[char_size] as f64);
    for (size, count) in GRANULOMETRY_SIZES.iter().zip(&remaining) {
        group.insert(format!("granulo_size_{size}"), *count);
    }
    group.insert("granulo_uniformity", 1.0 / (1.0 + curve.variance()));
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::test_support::*;
    use crate::types::FeatureValue;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_blocks_compute_on_scene() {
        assert_family_computes(FeatureFamily::Morphology, &Prepared::new(scene()));
    }

    #[test]
    fn test_flat_image_operations() {
        let prepared = Prepared::new(RgbImage::from_pixel(20, 20, Rgb([100, 100, 100])));
        let group = operations(&prepared.input()).expect("Should compute");
        assert_eq!(group.get_f64("morpho_opening_mean"), Some(100.0));
        assert_eq!(group.get_f64("morpho_gradient_mean"), Some(0.0));
        assert_eq!(group.get_f64("opening_closing_diff"), Some(0.0));
        assert_eq!(group.get_f64("morpho_complexity"), Some(0.0));
    }

    #[test]
    fn test_granulometry_removes_small_specks() {
        // Isolated single bright pixels survive only the 1×1 opening.
        let prepared = Prepared::new(RgbImage::from_fn(30, 30, |x, y| {
            if x % 6 == 3 && y % 6 == 3 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        }));
        let group = granulometry(&prepared.input()).expect("Should compute");
        assert_eq!(group.get_f64("granulo_size_1"), Some(25.0));
        assert_eq!(group.get_f64("granulo_size_3"), Some(0.0));
        assert_eq!(group.get_f64("granulo_char_size"), Some(1.0));
        assert_eq!(group.get_f64("granulo_slope"), Some(-5.0));
    }

    #[test]
    fn test_skeleton_of_a_bar_is_one_branch() {
        let prepared = Prepared::new(RgbImage::from_fn(40, 20, |x, y| {
            if (5..35).contains(&x) && (8..13).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }));
        let group = skeleton(&prepared.input()).expect("Should compute");
        assert_eq!(group.get("skeleton_branches"), Some(&FeatureValue::Int(1)));
        assert!(group.get_f64("skeleton_length").expect("present") > 10.0);
    }
}
