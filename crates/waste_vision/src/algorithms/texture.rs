//! Texture descriptors: local binary patterns, grey-level co-occurrence and Gabor filtering.

use std::f64::consts::PI;

use image::GrayImage;

use super::preprocessing::{FloatPlane, reflect};

/// Rotation-invariant uniform LBP codes with `points` samples on a circle of `radius`.
///
/// Codes range over `0..=points + 1`; `points + 1` marks non-uniform patterns.
pub fn lbp_uniform(image: &GrayImage, points: usize, radius: f64) -> Vec<u32> {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let plane = FloatPlane::from_gray(image);

    let offsets: Vec<(f64, f64)> = (0..points)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / points as f64;
            let dy = round5(-radius * angle.sin());
            let dx = round5(radius * angle.cos());
            (dy, dx)
        })
        .collect();

    let sample = |y: f64, x: f64| -> f64 {
        let (y0, x0) = (y.floor(), x.floor());
        let (fy, fx) = (y - y0, x - x0);
        let at = |yy: i64, xx: i64| -> f64 {
            if yy < 0 || xx < 0 || yy >= height || xx >= width {
                0.0
            } else {
                plane.get(xx as usize, yy as usize)
            }
        };
        let (yi, xi) = (y0 as i64, x0 as i64);
        let (top_left, top_right) = (at(yi, xi), at(yi, xi + 1));
        let (bottom_left, bottom_right) = (at(yi + 1, xi), at(yi + 1, xi + 1));
        let top = top_left + (top_right - top_left) * fx;
        let bottom = bottom_left + (bottom_right - bottom_left) * fx;
        top + (bottom - top) * fy
    };

    let mut codes = Vec::with_capacity(plane.data.len());
    let mut bits = vec![false; points];
    for y in 0..height {
        for x in 0..width {
            let center = plane.get(x as usize, y as usize);
            for (bit, &(dy, dx)) in bits.iter_mut().zip(&offsets) {
                *bit = sample(y as f64 + dy, x as f64 + dx) - center >= 0.0;
            }
            let transitions = bits.windows(2).filter(|pair| pair[0] != pair[1]).count();
            let code = if transitions <= 2 {
                bits.iter().filter(|&&b| b).count() as u32
            } else {
                points as u32 + 1
            };
            codes.push(code);
        }
    }
    codes
}

fn round5(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}

/// Properties of one normalized co-occurrence matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlcmProps {
    pub contrast: f64,
    pub dissimilarity: f64,
    pub homogeneity: f64,
    pub energy: f64,
    pub correlation: f64,
    pub asm: f64,
}

/// Symmetric, normalized GLCM at `distance` for each angle, returning its properties.
///
/// `levels` grey levels are obtained by integer division of the 8-bit image.
pub fn glcm_props(image: &GrayImage, levels: usize, distance: i64, angles: &[f64]) -> Vec<GlcmProps> {
    let divisor = (256 / levels.max(1)) as u8;
    let quantized: Vec<usize> = image
        .as_raw()
        .iter()
        .map(|&v| ((v / divisor.max(1)) as usize).min(levels - 1))
        .collect();
    let (width, height) = (image.width() as i64, image.height() as i64);

    angles
        .iter()
        .map(|&angle| {
            let dy = (angle.sin() * distance as f64).round() as i64;
            let dx = (angle.cos() * distance as f64).round() as i64;
            let mut matrix = vec![0.0f64; levels * levels];

            for y in 0..height {
                for x in 0..width {
                    let (ny, nx) = (y + dy, x + dx);
                    if ny < 0 || nx < 0 || ny >= height || nx >= width {
                        continue;
                    }
                    let i = quantized[(y * width + x) as usize];
                    let j = quantized[(ny * width + nx) as usize];
                    matrix[i * levels + j] += 1.0;
                    matrix[j * levels + i] += 1.0;
                }
            }

            let total: f64 = matrix.iter().sum();
            if total > 0.0 {
                matrix.iter_mut().for_each(|p| *p /= total);
            }
            props_of(&matrix, levels)
        })
        .collect()
}

fn props_of(matrix: &[f64], levels: usize) -> GlcmProps {
    let mut props = GlcmProps::default();
    let (mut mean_i, mut mean_j) = (0.0, 0.0);

    for i in 0..levels {
        for j in 0..levels {
            let p = matrix[i * levels + j];
            let diff = i as f64 - j as f64;
            props.contrast += p * diff * diff;
            props.dissimilarity += p * diff.abs();
            props.homogeneity += p / (1.0 + diff * diff);
            props.asm += p * p;
            mean_i += i as f64 * p;
            mean_j += j as f64 * p;
        }
    }
    props.energy = props.asm.sqrt();

    let (mut var_i, mut var_j, mut cov) = (0.0, 0.0, 0.0);
    for i in 0..levels {
        for j in 0..levels {
            let p = matrix[i * levels + j];
            let (di, dj) = (i as f64 - mean_i, j as f64 - mean_j);
            var_i += p * di * di;
            var_j += p * dj * dj;
            cov += p * di * dj;
        }
    }
    let (std_i, std_j) = (var_i.sqrt(), var_j.sqrt());
    props.correlation = if std_i < 1e-15 || std_j < 1e-15 {
        1.0
    } else {
        cov / (std_i * std_j)
    };
    props
}

/// Real part of a Gabor kernel with a one-octave bandwidth, truncated at three standard deviations.
#[derive(Debug, Clone)]
pub struct GaborKernel {
    pub half_width: i64,
    pub half_height: i64,
    pub weights: Vec<f64>,
}

impl GaborKernel {
    pub fn new(frequency: f64, theta: f64) -> Self {
        const N_STDS: f64 = 3.0;
        let bandwidth: f64 = 1.0;
        let prefactor = 1.0 / PI * (2f64.ln() / 2.0).sqrt()
            * (2f64.powf(bandwidth) + 1.0)
            / (2f64.powf(bandwidth) - 1.0);
        let sigma = prefactor / frequency;
        let (ct, st) = (theta.cos(), theta.sin());

        let half_width = (N_STDS * sigma * ct).abs().max((N_STDS * sigma * st).abs()).max(1.0).ceil() as i64;
        let half_height = (N_STDS * sigma * ct).abs().max((N_STDS * sigma * st).abs()).max(1.0).ceil() as i64;

        let mut weights = Vec::with_capacity(((2 * half_width + 1) * (2 * half_height + 1)) as usize);
        for y in -half_height..=half_height {
            for x in -half_width..=half_width {
                let (xf, yf) = (x as f64, y as f64);
                let rot_x = xf * ct + yf * st;
                let rot_y = -xf * st + yf * ct;
                let envelope = (-0.5 * (rot_x * rot_x + rot_y * rot_y) / (sigma * sigma)).exp()
                    / (2.0 * PI * sigma * sigma);
                weights.push(envelope * (2.0 * PI * frequency * rot_x).cos());
            }
        }

        Self {
            half_width,
            half_height,
            weights,
        }
    }

    /// Filter response with mirrored borders.
    pub fn apply(&self, plane: &FloatPlane) -> FloatPlane {
        let kernel_width = (2 * self.half_width + 1) as usize;
        FloatPlane::from_fn(plane.width, plane.height, |x, y| {
            let mut acc = 0.0;
            for ky in -self.half_height..=self.half_height {
                let sy = reflect(y as i64 + ky, plane.height);
                let row = ((ky + self.half_height) as usize) * kernel_width;
                for kx in -self.half_width..=self.half_width {
                    let sx = reflect(x as i64 + kx, plane.width);
                    acc += plane.get(sx, sy) * self.weights[row + (kx + self.half_width) as usize];
                }
            }
            acc
        })
    }
}

/// Per-pixel variance over a `(2r+1)²` window.
pub fn local_variance(plane: &FloatPlane, radius: usize) -> FloatPlane {
    let mean = plane.box_mean(radius);
    let squared_mean = plane.map(|v| v * v).box_mean(radius);
    FloatPlane {
        width: plane.width,
        height: plane.height,
        data: squared_mean
            .data
            .iter()
            .zip(&mean.data)
            .map(|(sq, m)| sq - m * m)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_lbp_flat_image_is_all_ones() {
        // Interior pixels of a flat image see every neighbour equal to the centre.
        let image = GrayImage::from_pixel(9, 9, Luma([100]));
        let codes = lbp_uniform(&image, 8, 1.0);
        assert_eq!(codes[4 * 9 + 4], 8);
        assert!(codes.iter().all(|&c| c <= 9));
    }

    #[test]
    fn test_glcm_constant_image() {
        let image = GrayImage::from_pixel(8, 8, Luma([200]));
        let props = glcm_props(&image, 8, 1, &[0.0, PI / 2.0]);
        assert_eq!(props.len(), 2);
        for p in props {
            assert!(p.contrast.abs() < 1e-12);
            assert!((p.homogeneity - 1.0).abs() < 1e-12);
            assert!((p.asm - 1.0).abs() < 1e-12);
            assert_eq!(p.correlation, 1.0);
        }
    }

    #[test]
    fn test_glcm_vertical_stripes() {
        let image = GrayImage::from_fn(8, 8, |x, _| Luma([if x % 2 == 0 { 0 } else { 255 }]));
        let props = glcm_props(&image, 8, 1, &[0.0, PI / 2.0]);
        // Horizontal neighbours always differ by 7 levels, vertical never.
        assert!((props[0].contrast - 49.0).abs() < 1e-9);
        assert!(props[1].contrast.abs() < 1e-12);
    }

    #[test]
    fn test_gabor_kernel_is_symmetric() {
        let kernel = GaborKernel::new(0.3, PI / 4.0);
        let n = kernel.weights.len();
        for i in 0..n {
            assert!((kernel.weights[i] - kernel.weights[n - 1 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_local_variance_of_flat_plane() {
        let plane = FloatPlane::from_fn(7, 7, |_, _| 42.0);
        let variance = local_variance(&plane, 2);
        assert!(variance.data.iter().all(|v| v.abs() < 1e-9));
    }
}
