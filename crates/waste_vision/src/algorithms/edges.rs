use image::GrayImage;
use imageproc::{
    gradients::{horizontal_sobel, vertical_sobel},
    hough::{LineDetectionOptions, detect_lines},
};

/// Angles (radians, `[0, π)`) of the normals of straight lines found by the Hough transform.
pub fn hough_line_angles(edges: &GrayImage, vote_threshold: u32, suppression_radius: u32) -> Vec<f64> {
    if edges.width() == 0 || edges.height() == 0 {
        return Vec::new();
    }
    let options = LineDetectionOptions {
        vote_threshold,
        suppression_radius,
    };
    detect_lines(edges, options)
        .into_iter()
        .map(|line| (line.angle_in_degrees as f64).to_radians())
        .collect()
}

/// Per-pixel 3×3 Sobel derivatives.
#[derive(Debug, Clone)]
pub struct GradientField {
    pub dx: Vec<f64>,
    pub dy: Vec<f64>,
}

impl GradientField {
    pub fn compute(image: &GrayImage) -> Self {
        let dx = horizontal_sobel(image).as_raw().iter().map(|&v| v as f64).collect();
        let dy = vertical_sobel(image).as_raw().iter().map(|&v| v as f64).collect();
        Self { dx, dy }
    }

    pub fn magnitudes(&self) -> impl Iterator<Item = f64> + '_ {
        self.dx.iter().zip(&self.dy).map(|(x, y)| x.hypot(*y))
    }

    /// Directions in `(-π, π]`.
    pub fn directions(&self) -> impl Iterator<Item = f64> + '_ {
        self.dx.iter().zip(&self.dy).map(|(x, y)| y.atan2(*x))
    }

    pub fn len(&self) -> usize {
        self.dx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dx.is_empty()
    }
}
