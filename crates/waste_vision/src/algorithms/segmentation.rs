use image::RgbImage;
use serde::{Deserialize, Serialize};
use schemars::JsonSchema;

use crate::{
    error::{FeatureError, Result},
    traits::Segmenter,
};
use super::color::rgb_to_lab;

/// Dense label image: one segment id per pixel, ids are `0..count`.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentMap {
    pub width: u32,
    pub height: u32,
    pub labels: Vec<u32>,
    pub count: usize,
}

/// Shape and colour statistics of one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionStats {
    pub area: u64,
    /// Pixels of the region touching a 4-neighbour outside it (or the image border)
    pub perimeter: u64,
    pub mean_rgb: [f64; 3],
    pub centroid_y: f64,
}

impl RegionStats {
    /// Isoperimetric compactness `4πA / P²`, 0 for a degenerate perimeter.
    pub fn compactness(&self) -> f64 {
        if self.perimeter == 0 {
            return 0.0;
        }
        4.0 * std::f64::consts::PI * self.area as f64 / (self.perimeter as f64).powi(2)
    }

    pub fn brightness(&self) -> f64 {
        self.mean_rgb.iter().sum::<f64>() / 3.0
    }
}

impl SegmentMap {
    pub fn regions(&self, image: &RgbImage) -> Vec<RegionStats> {
        let (width, height) = (self.width as usize, self.height as usize);
        let mut area = vec![0u64; self.count];
        let mut perimeter = vec![0u64; self.count];
        let mut rgb = vec![[0.0f64; 3]; self.count];
        let mut row_sum = vec![0.0f64; self.count];

        for y in 0..height {
            for x in 0..width {
                let label = self.labels[y * width + x];
                let k = label as usize;
                area[k] += 1;
                row_sum[k] += y as f64;
                let pixel = image.get_pixel(x as u32, y as u32).0;
                for c in 0..3 {
                    rgb[k][c] += pixel[c] as f64;
                }
                let on_border = x == 0 || y == 0 || x + 1 == width || y + 1 == height;
                let differs = !on_border
                    && (self.labels[y * width + x - 1] != label
                        || self.labels[y * width + x + 1] != label
                        || self.labels[(y - 1) * width + x] != label
                        || self.labels[(y + 1) * width + x] != label);
                if on_border || differs {
                    perimeter[k] += 1;
                }
            }
        }

        (0..self.count)
            .filter(|&k| area[k] > 0)
            .map(|k| {
                let n = area[k] as f64;
                RegionStats {
                    area: area[k],
                    perimeter: perimeter[k],
                    mean_rgb: [rgb[k][0] / n, rgb[k][1] / n, rgb[k][2] / n],
                    centroid_y: row_sum[k] / n,
                }
            })
            .collect()
    }
}

/// Simple linear iterative clustering in CIELAB space.
///
/// With `enforce_connectivity` every segment is a single 4-connected region;
/// pieces smaller than `min_size_factor` times the nominal segment area are
/// absorbed by an already labelled neighbour.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct SlicSegmenter {
    pub segments: usize,
    pub compactness: f64,
    pub sigma: f32,
    pub iterations: usize,
    pub enforce_connectivity: bool,
    pub min_size_factor: f64,
}

impl Default for SlicSegmenter {
    fn default() -> Self {
        Self {
            segments: 50,
            compactness: 10.0,
            sigma: 1.0,
            iterations: 10,
            enforce_connectivity: true,
            min_size_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Center {
    lab: [f64; 3],
    x: f64,
    y: f64,
}

impl Segmenter for SlicSegmenter {
    fn segment(&self, image: &RgbImage) -> Result<SegmentMap> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        if width == 0 || height == 0 {
            return Err(FeatureError::EmptyRegion("image").into());
        }

        let smoothed = if self.sigma > 0.0 {
            image::imageops::blur(image, self.sigma)
        } else {
            image.clone()
        };
        let lab: Vec<[f64; 3]> = smoothed.pixels().map(|p| rgb_to_lab(p.0)).collect();

        let n_pixels = (width * height) as f64;
        let step = (n_pixels / self.segments.max(1) as f64).sqrt().max(1.0);
        let mut centers = Vec::new();
        let mut cy = step / 2.0;
        while cy < height as f64 {
            let mut cx = step / 2.0;
            while cx < width as f64 {
                let (xi, yi) = (cx as usize, cy as usize);
                centers.push(Center {
                    lab: lab[yi * width + xi],
                    x: cx,
                    y: cy,
                });
                cx += step;
            }
            cy += step;
        }

        let spatial_weight = (self.compactness / step).powi(2);
        let reach = step.ceil() as i64;
        let mut labels = vec![u32::MAX; width * height];
        let mut distances = vec![f64::INFINITY; width * height];

        for _ in 0..self.iterations.max(1) {
            distances.iter_mut().for_each(|d| *d = f64::INFINITY);

            for (k, center) in centers.iter().enumerate() {
                let x_lo = (center.x as i64 - reach).max(0) as usize;
                let x_hi = ((center.x as i64 + reach) as usize).min(width - 1);
                let y_lo = (center.y as i64 - reach).max(0) as usize;
                let y_hi = ((center.y as i64 + reach) as usize).min(height - 1);
                for y in y_lo..=y_hi {
                    for x in x_lo..=x_hi {
                        let index = y * width + x;
                        let [l, a, b] = lab[index];
                        let color = (l - center.lab[0]).powi(2)
                            + (a - center.lab[1]).powi(2)
                            + (b - center.lab[2]).powi(2);
                        let spatial = (x as f64 - center.x).powi(2) + (y as f64 - center.y).powi(2);
                        let distance = color + spatial * spatial_weight;
                        if distance < distances[index] {
                            distances[index] = distance;
                            labels[index] = k as u32;
                        }
                    }
                }
            }

            let mut sums = vec![([0.0f64; 3], 0.0f64, 0.0f64, 0usize); centers.len()];
            for (index, &label) in labels.iter().enumerate() {
                if label == u32::MAX {
                    continue;
                }
                let entry = &mut sums[label as usize];
                for c in 0..3 {
                    entry.0[c] += lab[index][c];
                }
                entry.1 += (index % width) as f64;
                entry.2 += (index / width) as f64;
                entry.3 += 1;
            }
            for (center, (lab_sum, x_sum, y_sum, n)) in centers.iter_mut().zip(sums) {
                if n == 0 {
                    continue;
                }
                let n = n as f64;
                center.lab = [lab_sum[0] / n, lab_sum[1] / n, lab_sum[2] / n];
                center.x = x_sum / n;
                center.y = y_sum / n;
            }
        }

        // Pixels outside every search window inherit their left (or upper) neighbour.
        for index in 0..labels.len() {
            if labels[index] == u32::MAX {
                labels[index] = if index % width > 0 {
                    labels[index - 1]
                } else if index >= width {
                    labels[index - width]
                } else {
                    0
                };
            }
        }

        let labels = if self.enforce_connectivity {
            let segment_area = n_pixels / centers.len().max(1) as f64;
            let min_size = (segment_area * self.min_size_factor.max(0.0)) as usize;
            enforce_connectivity(width, height, &labels, min_size)
        } else {
            labels
        };

        Ok(compact_labels(width as u32, height as u32, labels))
    }
}

fn neighbours(index: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
    let (x, y) = (index % width, index / width);
    [
        (x > 0).then(|| index - 1),
        (y > 0).then(|| index - width),
        (x + 1 < width).then(|| index + 1),
        (y + 1 < height).then(|| index + width),
    ]
    .into_iter()
    .flatten()
}

/// Relabel so that each 4-connected piece of a cluster gets its own id,
/// merging pieces below `min_size` pixels into a neighbour seen earlier in
/// raster order.
fn enforce_connectivity(width: usize, height: usize, labels: &[u32], min_size: usize) -> Vec<u32> {
    let mut out = vec![u32::MAX; labels.len()];
    let mut queue = Vec::new();
    let mut next = 0u32;

    for start in 0..labels.len() {
        if out[start] != u32::MAX {
            continue;
        }
        let original = labels[start];
        let adjacent = neighbours(start, width, height)
            .map(|n| out[n])
            .find(|&label| label != u32::MAX);

        queue.clear();
        queue.push(start);
        out[start] = next;
        let mut head = 0;
        while head < queue.len() {
            let index = queue[head];
            head += 1;
            for n in neighbours(index, width, height) {
                if out[n] == u32::MAX && labels[n] == original {
                    out[n] = next;
                    queue.push(n);
                }
            }
        }

        match adjacent {
            Some(adjacent) if queue.len() < min_size => {
                for &index in &queue {
                    out[index] = adjacent;
                }
            }
            _ => next += 1,
        }
    }
    out
}

fn compact_labels(width: u32, height: u32, labels: Vec<u32>) -> SegmentMap {
    let max_label = labels.iter().copied().max().unwrap_or(0) as usize;
    let mut remap = vec![u32::MAX; max_label + 1];
    let mut next = 0u32;
    let labels = labels
        .into_iter()
        .map(|label| {
            let slot = &mut remap[label as usize];
            if *slot == u32::MAX {
                *slot = next;
                next += 1;
            }
            *slot
        })
        .collect();

    SegmentMap {
        width,
        height,
        labels,
        count: next as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn two_tone_image() -> RgbImage {
        RgbImage::from_fn(40, 30, |_, y| {
            if y < 15 { Rgb([220, 30, 30]) } else { Rgb([20, 40, 200]) }
        })
    }

    #[test]
    fn test_slic_labels_cover_image() {
        let map = SlicSegmenter::default()
            .segment(&two_tone_image())
            .expect("Should segment");
        assert_eq!(map.labels.len(), 40 * 30);
        assert!(map.count >= 2);
        assert!(map.labels.iter().all(|&l| (l as usize) < map.count));
    }

    #[test]
    fn test_regions_sum_to_image_area() {
        let image = two_tone_image();
        let map = SlicSegmenter { segments: 4, ..Default::default() }
            .segment(&image)
            .expect("Should segment");
        let regions = map.regions(&image);
        let total: u64 = regions.iter().map(|r| r.area).sum();
        assert_eq!(total, 40 * 30);
        assert!(regions.iter().all(|r| r.perimeter > 0 && r.compactness() > 0.0));
    }

    /// Number of 4-connected pieces carrying `label`.
    fn pieces(map: &SegmentMap, label: u32) -> usize {
        let (width, height) = (map.width as usize, map.height as usize);
        let mut seen = vec![false; map.labels.len()];
        let mut count = 0;
        for start in 0..map.labels.len() {
            if seen[start] || map.labels[start] != label {
                continue;
            }
            count += 1;
            let mut stack = vec![start];
            seen[start] = true;
            while let Some(index) = stack.pop() {
                for n in neighbours(index, width, height) {
                    if !seen[n] && map.labels[n] == label {
                        seen[n] = true;
                        stack.push(n);
                    }
                }
            }
        }
        count
    }

    #[test]
    fn test_small_fragments_are_absorbed() {
        // Cluster 0 is split into a large left block and a single stray pixel.
        #[rustfmt::skip]
        let labels = vec![
            0, 0, 1, 1, 1, 1,
            0, 0, 1, 1, 0, 1,
            0, 0, 1, 1, 1, 1,
            0, 0, 1, 1, 1, 1,
        ];
        let relabelled = enforce_connectivity(6, 4, &labels, 3);
        assert_eq!(relabelled[10], relabelled[9]);
        assert!(relabelled.iter().all(|&l| l < 2));

        let kept = enforce_connectivity(6, 4, &labels, 0);
        assert_eq!(kept[10], 2);
        assert_ne!(kept[10], kept[0]);
    }

    #[test]
    fn test_segments_are_connected() {
        let image = RgbImage::from_fn(48, 36, |x, y| {
            let v = ((x * 53 + y * 97) % 256) as u8;
            if (x / 5 + y / 7) % 3 == 0 { Rgb([v, 20, 40]) } else { Rgb([30, v, 200 - v / 2]) }
        });
        let map = SlicSegmenter { segments: 12, ..Default::default() }
            .segment(&image)
            .expect("Should segment");
        for label in 0..map.count as u32 {
            assert_eq!(pieces(&map, label), 1, "segment {label} is fragmented");
        }

        let loose = SlicSegmenter { segments: 12, enforce_connectivity: false, ..Default::default() }
            .segment(&image)
            .expect("Should segment");
        assert_eq!(loose.labels.len(), map.labels.len());
    }

    #[test]
    fn test_empty_image_is_rejected() {
        assert!(SlicSegmenter::default().segment(&RgbImage::new(0, 0)).is_err());
    }
}
