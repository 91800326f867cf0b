//! Texture: uniform LBP at three radii, co-occurrence properties, a Gabor bank and local variance.

use std::f64::consts::PI;

use crate::{
    algorithms::{
        preprocessing::{FloatPlane, gray_resize_to_max_width},
        stats::{entropy, gray_summary, histogram, normalize, smoothed_entropy, summarize},
        texture::{GaborKernel, GlcmProps, glcm_props, lbp_uniform, local_variance},
    },
    error::{FeatureError, FeatureResult},
    types::{FeatureVector, ValueKind},
};

use super::{FeatureBlock, FeatureFamily, FusionInput, KeySpec, float_keys};

pub const BLOCKS: &[FeatureBlock] = &[
    FeatureBlock {
        family: FeatureFamily::Texture,
        name: "lbp",
        keys: lbp_keys,
        compute: lbp,
    },
    FeatureBlock {
        family: FeatureFamily::Texture,
        name: "glcm",
        keys: glcm_keys,
        compute: glcm,
    },
    FeatureBlock {
        family: FeatureFamily::Texture,
        name: "gabor",
        keys: gabor_keys,
        compute: gabor,
    },
    FeatureBlock {
        family: FeatureFamily::Texture,
        name: "local_texture",
        keys: local_keys,
        compute: local,
    },
];

const LBP_RADII: [usize; 3] = [1, 2, 3];
const LBP_METRICS: [&str; 5] = ["mean", "std", "entropy", "uniformity", "contrast"];

const GLCM_LEVELS: usize = 8;
const GLCM_ANGLES: [f64; 4] = [0.0, PI / 4.0, PI / 2.0, 3.0 * PI / 4.0];

const GABOR_FREQUENCIES: [f64; 2] = [0.1, 0.3];

fn lbp_keys() -> KeySpec {
    LBP_RADII
        .iter()
        .flat_map(|r| LBP_METRICS.map(|metric| (format!("lbp_r{r}_{metric}"), ValueKind::Float)))
        .collect()
}

fn lbp(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    input.require_pixels("lbp")?;
    let mut group = FeatureVector::with_capacity(LBP_RADII.len() * LBP_METRICS.len());
    for radius in LBP_RADII {
        let points = 8 * radius;
        let codes = lbp_uniform(input.gray, points, radius as f64);
        let mut counts = vec![0u64; points + 2];
        for &code in &codes {
            counts[(code as usize).min(points + 1)] += 1;
        }
        let summary = summarize(codes.iter().map(|&c| c as f64));
        let p = normalize(&counts);
        let uniformity: f64 = p.iter().map(|v| v * v).sum();
        let contrast: f64 = p
            .iter()
            .enumerate()
            .flat_map(|(i, pi)| {
                p.iter()
                    .enumerate()
                    .map(move |(j, pj)| (i as f64 - j as f64).powi(2) * pi * pj)
            })
            .sum();

        group.insert(format!("lbp_r{radius}_mean"), summary.mean);
        group.insert(format!("lbp_r{radius}_std"), summary.std);
        group.insert(format!("lbp_r{radius}_entropy"), entropy(&p));
        group.insert(format!("lbp_r{radius}_uniformity"), uniformity);
        group.insert(format!("lbp_r{radius}_contrast"), contrast);
    }
    Ok(group)
}

fn glcm_keys() -> KeySpec {
    float_keys(&[
        "glcm_contrast",
        "glcm_dissimilarity",
        "glcm_homogeneity",
        "glcm_energy",
        "glcm_correlation",
        "glcm_ASM",
        "glcm_contrast_std",
        "glcm_contrast_range",
    ])
}

fn glcm(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    input.require_pixels("glcm")?;
    let props = glcm_props(input.gray, GLCM_LEVELS, 1, &GLCM_ANGLES);
    if props.is_empty() {
        return Err(FeatureError::EmptyRegion("glcm"));
    }
    let average = |f: fn(&GlcmProps) -> f64| {
        props.iter().map(f).sum::<f64>() / props.len() as f64
    };
    let contrasts = summarize(props.iter().map(|p| p.contrast));

    let mut group = FeatureVector::with_capacity(8);
    group.insert("glcm_contrast", contrasts.mean);
    group.insert("glcm_dissimilarity", average(|p| p.dissimilarity));
    group.insert("glcm_homogeneity", average(|p| p.homogeneity));
    group.insert("glcm_energy", average(|p| p.energy));
    group.insert("glcm_correlation", average(|p| p.correlation));
    group.insert("glcm_ASM", average(|p| p.asm));
    group.insert("glcm_contrast_std", contrasts.std);
    group.insert("glcm_contrast_range", contrasts.range());
    Ok(group)
}

fn gabor_keys() -> KeySpec {
    float_keys(&[
        "gabor_mean",
        "gabor_std",
        "gabor_min",
        "gabor_max",
        "gabor_range",
        "gabor_energy_mean",
        "gabor_energy_std",
        "gabor_energy_max",
    ])
}

fn gabor(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    input.require_pixels("gabor")?;
    let small = gray_resize_to_max_width(input.gray, input.config.gabor_max_width);
    let plane = FloatPlane::from_gray(&small);

    let responses: Vec<FloatPlane> = GLCM_ANGLES
        .iter()
        .flat_map(|&theta| GABOR_FREQUENCIES.map(|frequency| (frequency, theta)))
        .map(|(frequency, theta)| GaborKernel::new(frequency, theta).apply(&plane))
        .collect();

    let all = summarize(responses.iter().flat_map(|r| r.data.iter().copied()));
    let energies = summarize(
        responses
            .iter()
            .map(|r| r.data.iter().map(|v| v * v).sum::<f64>()),
    );

    let mut group = FeatureVector::with_capacity(8);
    group.insert("gabor_mean", all.mean);
    group.insert("gabor_std", all.std);
    group.insert("gabor_min", all.min);
    group.insert("gabor_max", all.max);
    group.insert("gabor_range", all.range());
    group.insert("gabor_energy_mean", energies.mean);
    group.insert("gabor_energy_std", energies.std);
    group.insert("gabor_energy_max", energies.max);
    Ok(group)
}

fn local_keys() -> KeySpec {
    float_keys(&[
        "local_variance_mean",
        "local_variance_std",
        "local_variance_max",
        "local_variance_min",
        "local_entropy",
        "texture_variance",
        "texture_energy",
        "texture_homogeneity",
        "texture_contrast",
    ])
}

fn local(input: &FusionInput<'_>) -> FeatureResult<FeatureVector> {
    input.require_pixels("local_texture")?;
    let variance = local_variance(&FloatPlane::from_gray(input.gray), 2);
    let local = summarize(variance.data.iter().copied());
    let global = gray_summary(input.gray);
    let counts = histogram(input.gray.as_raw().iter().map(|&v| v as f64), 16, 0.0, 256.0);
    let energy: f64 = input.gray.as_raw().iter().map(|&v| (v as f64).powi(2)).sum();

    let mut group = FeatureVector::with_capacity(9);
    group.insert("local_variance_mean", local.mean);
    group.insert("local_variance_std", local.std);
    group.insert("local_variance_max", local.max);
    group.insert("local_variance_min", local.min);
    group.insert("local_entropy", smoothed_entropy(&counts));
    group.insert("texture_variance", global.variance());
    group.insert("texture_energy", energy);
    group.insert("texture_homogeneity", 1.0 / (1.0 + global.variance()));
    group.insert("texture_contrast", global.range());
    Ok(group)
}
