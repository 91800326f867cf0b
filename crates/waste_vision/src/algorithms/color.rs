use image::RgbImage;

/// Planar HSV on the 8-bit scale: hue in `[0, 180)`, saturation and value in `[0, 255]`.
#[derive(Debug, Clone)]
pub struct HsvPlanes {
    pub width: u32,
    pub height: u32,
    pub hue: Vec<u8>,
    pub saturation: Vec<u8>,
    pub value: Vec<u8>,
}

impl HsvPlanes {
    pub fn from_rgb(image: &RgbImage) -> Self {
        let len = (image.width() * image.height()) as usize;
        let mut hue = Vec::with_capacity(len);
        let mut saturation = Vec::with_capacity(len);
        let mut value = Vec::with_capacity(len);

        for pixel in image.pixels() {
            let [h, s, v] = rgb_to_hsv(pixel.0);
            hue.push(h);
            saturation.push(s);
            value.push(v);
        }

        Self {
            width: image.width(),
            height: image.height(),
            hue,
            saturation,
            value,
        }
    }

    pub fn len(&self) -> usize {
        self.hue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hue.is_empty()
    }

    /// Number of pixels whose (h, s, v) lies inside the inclusive box `[lower, upper]`.
    pub fn count_in_range(&self, lower: [u8; 3], upper: [u8; 3]) -> usize {
        self.hue
            .iter()
            .zip(&self.saturation)
            .zip(&self.value)
            .filter(|((h, s), v)| {
                (lower[0]..=upper[0]).contains(*h)
                    && (lower[1]..=upper[1]).contains(*s)
                    && (lower[2]..=upper[2]).contains(*v)
            })
            .count()
    }
}

pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let saturation = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let mut hue = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    let hue = (hue / 2.0).round() as u16 % 180;
    [hue as u8, saturation.round() as u8, max as u8]
}

/// CIE L*a*b* (D65) from 8-bit sRGB.
pub fn rgb_to_lab([r, g, b]: [u8; 3]) -> [f64; 3] {
    fn linearize(channel: u8) -> f64 {
        let c = channel as f64 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }

    fn f(t: f64) -> f64 {
        const DELTA: f64 = 6.0 / 29.0;
        if t > DELTA * DELTA * DELTA {
            t.cbrt()
        } else {
            t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
        }
    }

    let (rl, gl, bl) = (linearize(r), linearize(g), linearize(b));
    let x = (0.412453 * rl + 0.357580 * gl + 0.180423 * bl) / 0.950456;
    let y = 0.212671 * rl + 0.715160 * gl + 0.072169 * bl;
    let z = (0.019334 * rl + 0.119193 * gl + 0.950227 * bl) / 1.088754;

    let (fx, fy, fz) = (f(x), f(y), f(z));
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}
