pub mod color_map;
pub mod color_space;
pub mod homography;
pub mod image_utils;
pub mod interpolation;
pub mod playback;
pub mod scheduler;
pub mod stopwatch;
pub mod view_transform;
