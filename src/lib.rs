//! Interactive Mandelbrot set explorer: escape-time evaluation, a pan/zoom/undo view
//! transform with camera playback, a pull-based parallel pixel scheduler, and the
//! color pipeline that turns escape values into an image.

pub mod core;
pub mod fractals;
