use std::collections::HashMap;

use image::{GrayImage, Luma};
use imageproc::{
    morphology::{Mask, grayscale_close, grayscale_dilate, grayscale_erode, grayscale_open},
    region_labelling::{Connectivity, connected_components},
};

/// Grayscale morphology results for one structuring element.
#[derive(Debug, Clone)]
pub struct MorphologyStack {
    pub opened: GrayImage,
    pub closed: GrayImage,
    pub gradient: GrayImage,
    pub tophat: GrayImage,
    pub blackhat: GrayImage,
}

impl MorphologyStack {
    pub fn compute(image: &GrayImage, radius: u8) -> Self {
        let mask = Mask::disk(radius);
        let opened = grayscale_open(image, &mask);
        let closed = grayscale_close(image, &mask);
        let dilated = grayscale_dilate(image, &mask);
        let eroded = grayscale_erode(image, &mask);

        let gradient = saturating_diff(&dilated, &eroded);
        let tophat = saturating_diff(image, &opened);
        let blackhat = saturating_diff(&closed, image);

        Self {
            opened,
            closed,
            gradient,
            tophat,
            blackhat,
        }
    }
}

fn saturating_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y).0[0].saturating_sub(b.get_pixel(x, y).0[0])])
    })
}

/// Opening with a disk whose diameter is `size` (radius `size / 2`).
pub fn open_with_size(image: &GrayImage, size: u8) -> GrayImage {
    grayscale_open(image, &Mask::disk(size / 2))
}

/// One-pixel-wide skeleton of the non-zero pixels (Zhang-Suen thinning).
pub fn skeletonize(binary: &GrayImage) -> GrayImage {
    let (width, height) = (binary.width() as usize, binary.height() as usize);
    let mut grid: Vec<bool> = binary.as_raw().iter().map(|&v| v > 0).collect();
    if width < 3 || height < 3 {
        return to_image(&grid, width, height);
    }

    let at = |grid: &[bool], x: usize, y: usize| grid[y * width + x];
    let mut to_clear = Vec::new();

    loop {
        let mut changed = false;
        for pass in 0..2 {
            to_clear.clear();
            for y in 1..height - 1 {
                for x in 1..width - 1 {
                    if !at(&grid, x, y) {
                        continue;
                    }
                    // P2..P9 clockwise from north.
                    let n = [
                        at(&grid, x, y - 1),
                        at(&grid, x + 1, y - 1),
                        at(&grid, x + 1, y),
                        at(&grid, x + 1, y + 1),
                        at(&grid, x, y + 1),
                        at(&grid, x - 1, y + 1),
                        at(&grid, x - 1, y),
                        at(&grid, x - 1, y - 1),
                    ];
                    let neighbours = n.iter().filter(|&&b| b).count();
                    if !(2..=6).contains(&neighbours) {
                        continue;
                    }
                    let transitions = (0..8).filter(|&i| !n[i] && n[(i + 1) % 8]).count();
                    if transitions != 1 {
                        continue;
                    }
                    let (p2, p4, p6, p8) = (n[0], n[2], n[4], n[6]);
                    let keep = if pass == 0 {
                        (p2 && p4 && p6) || (p4 && p6 && p8)
                    } else {
                        (p2 && p4 && p8) || (p2 && p6 && p8)
                    };
                    if !keep {
                        to_clear.push(y * width + x);
                    }
                }
            }
            for &index in &to_clear {
                grid[index] = false;
            }
            changed |= !to_clear.is_empty();
        }
        if !changed {
            break;
        }
    }

    to_image(&grid, width, height)
}

fn to_image(grid: &[bool], width: usize, height: usize) -> GrayImage {
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([if grid[y as usize * width + x as usize] { 255 } else { 0 }])
    })
}

/// Pixel counts of each 8-connected component of the non-zero pixels.
pub fn component_areas(binary: &GrayImage) -> Vec<u64> {
    let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));
    let mut areas: HashMap<u32, u64> = HashMap::new();
    for pixel in labels.pixels() {
        let label = pixel.0[0];
        if label != 0 {
            *areas.entry(label).or_default() += 1;
        }
    }
    let mut areas: Vec<(u32, u64)> = areas.into_iter().collect();
    areas.sort_unstable_by_key(|(label, _)| *label);
    areas.into_iter().map(|(_, area)| area).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_image() -> GrayImage {
        GrayImage::from_fn(20, 11, |x, y| {
            Luma([if (3..17).contains(&x) && (3..8).contains(&y) { 255 } else { 0 }])
        })
    }

    #[test]
    fn test_skeleton_of_bar_is_thin() {
        let skeleton = skeletonize(&bar_image());
        let count = skeleton.pixels().filter(|p| p.0[0] > 0).count();
        assert!(count > 0, "Skeleton should not vanish");
        assert!(count < 20, "Skeleton should be roughly one pixel wide, got {count}");
        assert_eq!(component_areas(&skeleton).len(), 1);
    }

    #[test]
    fn test_component_areas() {
        let mut image = GrayImage::new(10, 10);
        image.put_pixel(1, 1, Luma([255]));
        image.put_pixel(2, 2, Luma([255]));
        image.put_pixel(7, 7, Luma([255]));
        let mut areas = component_areas(&image);
        areas.sort_unstable();
        assert_eq!(areas, vec![1, 2]);
    }

    #[test]
    fn test_morphology_stack_on_flat_image() {
        let image = GrayImage::from_pixel(12, 12, Luma([90]));
        let stack = MorphologyStack::compute(&image, 2);
        assert!(stack.gradient.pixels().all(|p| p.0[0] == 0));
        assert!(stack.opened.pixels().all(|p| p.0[0] == 90));
        assert!(stack.tophat.pixels().all(|p| p.0[0] == 0));
    }
}
