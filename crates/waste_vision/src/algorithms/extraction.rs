use image::GrayImage;
use imageproc::contours::BorderType;
use crate::{
    error::Result,
    traits::{ContourExtractor, EdgeDetector},
    types::Contour,
};

/// Imageproc-based contour extractor
#[derive(Debug, Clone, Default)]
pub struct ImageprocContourExtractor;

impl ContourExtractor for ImageprocContourExtractor {
    fn extract_contours(&self, binary_image: &GrayImage) -> Result<Vec<Contour>> {
        let contours = imageproc::contours::find_contours::<i32>(binary_image);

        let result = contours
            .into_iter()
            .map(|contour| Contour {
                points: contour.points
                    .iter()
                    .map(|p| [p.x as f32, p.y as f32])
                    .collect(),
                is_hole: contour.border_type == BorderType::Hole,
                parent: contour.parent,
            })
            .collect();

        Ok(result)
    }
}

/// Imageproc Canny detector (hysteresis thresholds on the gradient magnitude)
#[derive(Debug, Clone, Default)]
pub struct CannyEdgeDetector;

impl EdgeDetector for CannyEdgeDetector {
    fn detect_edges(&self, image: &GrayImage, low: f32, high: f32) -> Result<GrayImage> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(image.clone());
        }
        Ok(imageproc::edges::canny(image, low, high))
    }
}

/// Number of non-zero pixels in an edge map.
pub fn count_edge_pixels(edges: &GrayImage) -> u64 {
    edges.as_raw().iter().filter(|&&v| v > 0).count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square_image() -> GrayImage {
        let mut img = GrayImage::new(60, 60);
        for y in 15..45 {
            for x in 15..45 {
                img.put_pixel(x, y, Luma([255u8]));
            }
        }
        img
    }

    #[test]
    fn test_square_has_one_external_contour() {
        let contours = ImageprocContourExtractor
            .extract_contours(&square_image())
            .expect("Should extract contours");
        let external: Vec<_> = contours.iter().filter(|c| c.is_external()).collect();
        assert_eq!(external.len(), 1);
        assert!(external[0].area() > 700.0);
    }

    #[test]
    fn test_canny_finds_square_border() {
        let edges = CannyEdgeDetector
            .detect_edges(&square_image(), 50.0, 150.0)
            .expect("Should detect edges");
        let count = count_edge_pixels(&edges);
        assert!(count > 60, "Expected border edges, got {count}");
        assert_eq!(edges.get_pixel(30, 30).0[0], 0);
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let flat = GrayImage::from_pixel(32, 32, Luma([128]));
        let edges = CannyEdgeDetector.detect_edges(&flat, 100.0, 200.0).expect("Should run");
        assert_eq!(count_edge_pixels(&edges), 0);
    }
}
