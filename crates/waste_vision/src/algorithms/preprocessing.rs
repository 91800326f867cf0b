use image::{GrayImage, Luma, RgbImage, imageops::FilterType};

/// Grayscale conversion with BT.601 luma weights (0.299, 0.587, 0.114).
pub fn to_gray(image: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(gray.pixels_mut()) {
        let [r, g, b] = src.0;
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        *dst = Luma([luma.min(255) as u8]);
    }
    gray
}

pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Downscale so the width does not exceed `max_width`, keeping the aspect ratio.
pub fn resize_to_max_width(image: &RgbImage, max_width: u32) -> RgbImage {
    if max_width == 0 || image.width() <= max_width {
        return image.clone();
    }
    let scale = max_width as f64 / image.width() as f64;
    let height = ((image.height() as f64 * scale) as u32).max(1);
    image::imageops::resize(image, max_width, height, FilterType::Triangle)
}

pub fn gray_resize_to_max_width(image: &GrayImage, max_width: u32) -> GrayImage {
    if max_width == 0 || image.width() <= max_width {
        return image.clone();
    }
    let scale = max_width as f64 / image.width() as f64;
    let height = ((image.height() as f64 * scale) as u32).max(1);
    image::imageops::resize(image, max_width, height, FilterType::Triangle)
}

/// Binary image (0 / 255) split at the Otsu level.
pub fn otsu_binarize(image: &GrayImage) -> GrayImage {
    let level = imageproc::contrast::otsu_level(image);
    imageproc::contrast::threshold(image, level, imageproc::contrast::ThresholdType::Binary)
}

/// Mirror an index into `[0, n)` without repeating the edge sample (`dcb|abcd|cba`).
pub fn reflect101(index: i64, n: usize) -> usize {
    let n = n as i64;
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let mut i = index.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

/// Mirror an index into `[0, n)` repeating the edge sample (`cba|abcd|dcb`).
pub fn reflect(index: i64, n: usize) -> usize {
    let n = n as i64;
    let period = 2 * n;
    let i = index.rem_euclid(period);
    if i >= n { (period - 1 - i) as usize } else { i as usize }
}

/// Single-channel f64 raster used by the texture filters.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatPlane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl FloatPlane {
    pub fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data: image.as_raw().iter().map(|&v| v as f64).collect(),
        }
    }

    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Mean over a `(2r+1)²` window, borders mirrored with [`reflect101`].
    pub fn box_mean(&self, radius: usize) -> Self {
        if self.data.is_empty() {
            return self.clone();
        }
        let r = radius as i64;
        let side = (2 * radius + 1) as f64;

        // Separable pass: rows then columns.
        let horizontal = Self::from_fn(self.width, self.height, |x, y| {
            (-r..=r)
                .map(|dx| self.get(reflect101(x as i64 + dx, self.width), y))
                .sum::<f64>()
                / side
        });
        Self::from_fn(self.width, self.height, |x, y| {
            (-r..=r)
                .map(|dy| horizontal.get(x, reflect101(y as i64 + dy, self.height)))
                .sum::<f64>()
                / side
        })
    }
}
