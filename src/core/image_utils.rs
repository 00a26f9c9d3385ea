use image::{Rgb, RgbImage};
use nalgebra::Vector2;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

/// Convert an integer resolution into the floating point image size used by the
/// view transform.
pub fn image_size(resolution: &Vector2<u32>) -> Vector2<f64> {
    Vector2::new(resolution[0] as f64, resolution[1] as f64)
}

/**
 * Describes an axis-aligned rectangular region, either in picture space (pixels) or in
 * world space (the complex plane). The dimensions are never negative.
 */
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ViewRectangle {
    pub center: Vector2<f64>,
    pub dimensions: Vector2<f64>,
}

impl ViewRectangle {
    pub fn new(center: Vector2<f64>, dimensions: Vector2<f64>) -> ViewRectangle {
        ViewRectangle {
            center,
            dimensions: dimensions.abs(),
        }
    }

    /// Rectangle spanned by two opposite corners, given in any order.
    pub fn from_corners(corner_a: &Vector2<f64>, corner_b: &Vector2<f64>) -> ViewRectangle {
        ViewRectangle::from_vertices(&[*corner_a, *corner_b])
    }

    /// Smallest rectangle containing all of the vertices.
    pub fn from_vertices(vertices: &[Vector2<f64>]) -> ViewRectangle {
        assert!(!vertices.is_empty());

        let mut min_corner = vertices[0];
        let mut max_corner = vertices[0];

        for vertex in vertices.iter() {
            min_corner = min_corner.inf(vertex);
            max_corner = max_corner.sup(vertex);
        }

        let center = 0.5 * (min_corner + max_corner);
        let dimensions = max_corner - min_corner;

        ViewRectangle { center, dimensions }
    }

    /// The full picture: from pixel (0,0) to `image_size`.
    pub fn full_image(image_size: &Vector2<f64>) -> ViewRectangle {
        ViewRectangle {
            center: 0.5 * image_size,
            dimensions: *image_size,
        }
    }

    pub fn min_corner(&self) -> Vector2<f64> {
        self.center - 0.5 * self.dimensions
    }

    pub fn max_corner(&self) -> Vector2<f64> {
        self.center + 0.5 * self.dimensions
    }

    /// Corners in picture order: A (min x, min y), B (max x, min y), C (max x, max y),
    /// D (min x, max y). In picture space this is top-left, then clockwise.
    pub fn corners(&self) -> [Vector2<f64>; 4] {
        let low = self.min_corner();
        let upp = self.max_corner();
        [
            low,
            Vector2::new(upp[0], low[1]),
            upp,
            Vector2::new(low[0], upp[1]),
        ]
    }

    /// True if the rectangle has no area, or is not finite.
    pub fn is_degenerate(&self) -> bool {
        let finite = self.center.iter().chain(self.dimensions.iter()).all(|v| v.is_finite());
        !finite || self.dimensions[0] <= 0.0 || self.dimensions[1] <= 0.0
    }

    /**
     * Keep the center and width, but adjust the height so that the rectangle has the
     * same aspect ratio as the image. Used to keep a user-drawn zoom box proportional.
     */
    pub fn with_aspect_ratio_of(&self, image_size: &Vector2<f64>) -> ViewRectangle {
        let height = self.dimensions[0] * image_size[1] / image_size[0];
        ViewRectangle {
            center: self.center,
            dimensions: Vector2::new(self.dimensions[0], height),
        }
    }

    pub fn translate(&self, offset: &Vector2<f64>) -> ViewRectangle {
        ViewRectangle {
            center: self.center + offset,
            dimensions: self.dimensions,
        }
    }
}

/**
 * Width x height grid of per-pixel values. Stored column-major, so the linear index
 * of pixel (x, y) is `x * height + y`.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T: Clone> FrameBuffer<T> {
    pub fn new(width: u32, height: u32, value: T) -> FrameBuffer<T> {
        FrameBuffer {
            width,
            height,
            data: vec![value; (width as usize) * (height as usize)],
        }
    }
}

impl<T> FrameBuffer<T> {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn linear_index(&self, x: u32, y: u32) -> usize {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        (x as usize) * (self.height as usize) + (y as usize)
    }

    /// Inverse of `linear_index`.
    pub fn pixel_coordinate(&self, index: usize) -> (u32, u32) {
        let height = self.height as usize;
        ((index / height) as u32, (index % height) as u32)
    }

    pub fn get(&self, x: u32, y: u32) -> &T {
        &self.data[self.linear_index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let index = self.linear_index(x, y);
        self.data[index] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    /// Apply a function to every value, in parallel. The output does not depend on
    /// how the work was split.
    pub fn par_map<U, F>(&self, function: F) -> FrameBuffer<U>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Sync + Send,
    {
        let mut data = Vec::with_capacity(self.data.len());
        self.data.par_iter().map(function).collect_into_vec(&mut data);
        FrameBuffer {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

impl FrameBuffer<Rgb<u8>> {
    /// Copy into a row-major image, ready to be handed to a display backend.
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut imgbuf = RgbImage::new(self.width, self.height);
        for (x, y, pixel) in imgbuf.enumerate_pixels_mut() {
            *pixel = *self.get(x, y);
        }
        imgbuf
    }

    /// Raw channel bytes in column-major pixel order.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|pixel| pixel.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_view_port_from_vertices() {
        let vertices = vec![
            Vector2::new(1.0, 2.0),
            Vector2::new(3.0, 5.0),
            Vector2::new(-1.0, -2.0),
            Vector2::new(2.0, 3.0),
        ];

        let view_rectangle = ViewRectangle::from_vertices(&vertices);

        assert_eq!(view_rectangle.center, Vector2::new(1.0, 1.5));
        assert_eq!(view_rectangle.dimensions, Vector2::new(4.0, 7.0));
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_view_port_empty_vertices() {
        let vertices: Vec<Vector2<f64>> = Vec::new();
        ViewRectangle::from_vertices(&vertices);
    }

    #[test]
    fn test_corners_in_picture_order() {
        let rect = ViewRectangle::from_corners(&Vector2::new(10.0, 30.0), &Vector2::new(2.0, 6.0));
        let [a, b, c, d] = rect.corners();
        assert_eq!(a, Vector2::new(2.0, 6.0));
        assert_eq!(b, Vector2::new(10.0, 6.0));
        assert_eq!(c, Vector2::new(10.0, 30.0));
        assert_eq!(d, Vector2::new(2.0, 30.0));
    }

    #[test]
    fn test_degenerate_rectangles() {
        let flat = ViewRectangle::from_corners(&Vector2::new(1.0, 1.0), &Vector2::new(5.0, 1.0));
        assert!(flat.is_degenerate());
        let point = ViewRectangle::new(Vector2::new(1.0, 1.0), Vector2::zeros());
        assert!(point.is_degenerate());
        let nan = ViewRectangle::new(Vector2::new(f64::NAN, 1.0), Vector2::new(1.0, 1.0));
        assert!(nan.is_degenerate());
        assert!(!ViewRectangle::full_image(&Vector2::new(4.0, 3.0)).is_degenerate());
    }

    #[test]
    fn test_with_aspect_ratio_of() {
        let rect = ViewRectangle::from_corners(&Vector2::new(100.0, 100.0), &Vector2::new(300.0, 150.0));
        let proportional = rect.with_aspect_ratio_of(&Vector2::new(800.0, 600.0));
        assert_eq!(proportional.center, rect.center);
        assert_relative_eq!(proportional.dimensions[0], 200.0);
        assert_relative_eq!(proportional.dimensions[1], 150.0);
    }

    #[test]
    fn test_frame_buffer_indexing() {
        let mut frame = FrameBuffer::new(3, 2, 0u32);
        frame.set(2, 1, 7);
        assert_eq!(frame.linear_index(2, 1), 5);
        assert_eq!(frame.pixel_coordinate(5), (2, 1));
        assert_eq!(*frame.get(2, 1), 7);
        for index in 0..6 {
            let (x, y) = frame.pixel_coordinate(index);
            assert_eq!(frame.linear_index(x, y), index);
        }
    }

    #[test]
    fn test_frame_buffer_to_image() {
        let mut frame = FrameBuffer::new(2, 3, Rgb([0u8, 0, 0]));
        frame.set(1, 2, Rgb([10, 20, 30]));
        let doubled = frame.par_map(|pixel| Rgb([pixel[0] * 2, pixel[1] * 2, pixel[2] * 2]));
        let image = doubled.to_rgb_image();
        assert_eq!(image.dimensions(), (2, 3));
        assert_eq!(*image.get_pixel(1, 2), Rgb([20, 40, 60]));
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(doubled.to_bytes().len(), 18);
    }
}
