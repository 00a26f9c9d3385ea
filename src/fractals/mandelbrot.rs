use std::{fs, io, path::Path};

use image::RgbImage;
use nalgebra::Vector2;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{
    color_map::{ColorMapper, Palette, PaletteParams},
    image_utils::{image_size, FrameBuffer, ViewRectangle},
    interpolation::SplineError,
    scheduler::compute_frame,
    stopwatch::Stopwatch,
    view_transform::{ViewError, ViewTransform},
};

use super::quadratic_map::{EscapeTimeEngine, EscapeTimeParams};

#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("failed to read parameter file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse parameters: {0}")]
    Json(#[from] serde_json::Error),
    #[error("max_iterations must be positive")]
    ZeroMaxIterations,
    #[error("image resolution must be positive, got {0:?}")]
    EmptyResolution([u32; 2]),
    #[error("invalid initial view: {0}")]
    View(#[from] ViewError),
    #[error("invalid hue control points: {0}")]
    Spline(#[from] SplineError),
}

/// Resolution of the rendered frame and the region of the complex plane it shows.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ViewParams {
    pub resolution: Vector2<u32>,
    pub world: ViewRectangle,
}

/**
 * Derive the iteration limit from the zoom depth, so that deep views get enough
 * iterations to resolve detail without slowing down the overview:
 *
 * max_iterations = floor(ln(scale) * resolution / max_log_zoom) + base
 *
 * where `scale` is the zoom factor (pixels per world unit).
 */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AdaptiveIterationParams {
    pub resolution: f64,
    pub max_log_zoom: f64,
    pub base: u32,
}

impl Default for AdaptiveIterationParams {
    fn default() -> Self {
        AdaptiveIterationParams {
            resolution: 1000.0,
            max_log_zoom: 35.0,
            base: 62,
        }
    }
}

impl AdaptiveIterationParams {
    pub fn max_iterations(&self, zoom_factor: f64) -> u32 {
        let extra = (zoom_factor.ln() * self.resolution / self.max_log_zoom).floor();
        let total = extra + self.base as f64;
        if total.is_nan() || total < 1.0 {
            1
        } else {
            total.min(u32::MAX as f64) as u32
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MandelbrotParams {
    pub view: ViewParams,
    pub max_iterations: u32,
    #[serde(default)]
    pub smoothing: bool,
    #[serde(default = "default_true")]
    pub normalize_escape_values: bool,
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,
    #[serde(default)]
    pub palette: PaletteParams,
    /// `[iterations, redistributed]` pairs, both as fractions of `max_iterations`.
    #[serde(default)]
    pub hue_control_points: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub adaptive_iterations: Option<AdaptiveIterationParams>,
}

impl MandelbrotParams {
    pub fn from_json_str(content: &str) -> Result<MandelbrotParams, ParamsError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<MandelbrotParams, ParamsError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn escape_time_params(&self) -> EscapeTimeParams {
        EscapeTimeParams {
            max_iterations: self.max_iterations,
            smoothing: self.smoothing,
        }
    }
}

/// Everything the escape-value frame depends on. Thread count is excluded: the frame
/// does not depend on it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EscapeFrameKey {
    view_revision: u64,
    escape_time: EscapeTimeParams,
    resolution: Vector2<u32>,
    normalized: bool,
}

struct EscapeFrameCache {
    key: EscapeFrameKey,
    frame: FrameBuffer<f64>,
}

/**
 * Linearly rescale the frame so that its minimum maps to 0 and its maximum maps to
 * `max_iterations`. A constant (or empty) frame is left unchanged.
 */
pub fn normalize_escape_values(frame: &mut FrameBuffer<f64>, max_iterations: u32) {
    let values = frame.as_slice().iter().copied().map(OrderedFloat);
    let (min, max) = match (values.clone().min(), values.max()) {
        (Some(min), Some(max)) => (min.into_inner(), max.into_inner()),
        _ => return,
    };
    let range = max - min;
    if !(range > 0.0 && range.is_finite()) {
        return;
    }
    let scale = max_iterations as f64 / range;
    for value in frame.as_mut_slice().iter_mut() {
        *value = (*value - min) * scale;
    }
}

/// Color every escape value of the frame, in parallel.
pub fn colorize<C: ColorMapper + Sync>(color_map: &C, frame: &FrameBuffer<f64>) -> RgbImage {
    frame
        .par_map(|escape_value| color_map.compute_pixel(*escape_value))
        .to_rgb_image()
}

fn evaluate_escape_frame(
    engine: &EscapeTimeEngine,
    view: &ViewTransform,
    resolution: &Vector2<u32>,
    thread_count: usize,
    normalize: bool,
) -> FrameBuffer<f64> {
    let mut frame = compute_frame(resolution[0], resolution[1], thread_count, |x, y| {
        let world = view.map_to_world(&Vector2::new(x as f64, y as f64));
        engine.evaluate(&world)
    });
    if normalize {
        normalize_escape_values(&mut frame, engine.max_iterations());
    }
    frame
}

/**
 * Wires the escape-time kernel, the view transform, the scheduler, and the palette
 * together for one frame at a time. The last escape-value frame is cached, so a
 * palette change can be redrawn without recomputing it.
 */
pub struct MandelbrotExplorer {
    engine: EscapeTimeEngine,
    view: ViewTransform,
    initial_world: ViewRectangle,
    resolution: Vector2<u32>,
    thread_count: usize,
    normalize: bool,
    palette_params: PaletteParams,
    hue_control_points: Option<Vec<[f64; 2]>>,
    palette: Palette,
    adaptive_iterations: Option<AdaptiveIterationParams>,
    cache: Option<EscapeFrameCache>,
}

impl MandelbrotExplorer {
    pub fn new(params: &MandelbrotParams) -> Result<MandelbrotExplorer, ParamsError> {
        if params.max_iterations == 0 {
            return Err(ParamsError::ZeroMaxIterations);
        }
        let resolution = params.view.resolution;
        if resolution[0] == 0 || resolution[1] == 0 {
            return Err(ParamsError::EmptyResolution([resolution[0], resolution[1]]));
        }

        let view = ViewTransform::with_world_view(&image_size(&resolution), &params.view.world)?;
        let palette = Palette::new(
            &params.palette,
            params.max_iterations,
            params.hue_control_points.as_deref(),
        )?;

        log::info!(
            "mandelbrot explorer: {}x{} pixels, {} iterations, {} threads",
            resolution[0],
            resolution[1],
            params.max_iterations,
            params.thread_count
        );

        Ok(MandelbrotExplorer {
            engine: EscapeTimeEngine::new(params.escape_time_params()),
            view,
            initial_world: params.view.world,
            resolution,
            thread_count: params.thread_count,
            normalize: params.normalize_escape_values,
            palette_params: params.palette.clone(),
            hue_control_points: params.hue_control_points.clone(),
            palette,
            adaptive_iterations: params.adaptive_iterations.clone(),
            cache: None,
        })
    }

    pub fn engine(&self) -> &EscapeTimeEngine {
        &self.engine
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    /// Any view change made through this handle invalidates the cached frame.
    pub fn view_mut(&mut self) -> &mut ViewTransform {
        &mut self.view
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn resolution(&self) -> Vector2<u32> {
        self.resolution
    }

    pub fn image_size(&self) -> Vector2<f64> {
        image_size(&self.resolution)
    }

    pub fn max_iterations(&self) -> u32 {
        self.engine.max_iterations()
    }

    /// Go back to the initial view; the history restarts there.
    pub fn reset_view(&mut self) -> Result<(), ViewError> {
        let image_size = self.image_size();
        self.view.initialize(&image_size, &self.initial_world)
    }

    /// Changing the resolution keeps the world region in view and restarts the history.
    pub fn set_resolution(&mut self, resolution: Vector2<u32>) -> Result<(), ParamsError> {
        if resolution[0] == 0 || resolution[1] == 0 {
            return Err(ParamsError::EmptyResolution([resolution[0], resolution[1]]));
        }
        let old_size = self.image_size();
        let world = ViewRectangle::from_corners(
            &self.view.map_to_world(&Vector2::zeros()),
            &self.view.map_to_world(&old_size),
        );
        self.view.initialize(&image_size(&resolution), &world)?;
        self.resolution = resolution;
        Ok(())
    }

    /// Also rebuilds the palette, whose shape depends on the iteration limit.
    pub fn set_max_iterations(&mut self, max_iterations: u32) -> Result<(), ParamsError> {
        if max_iterations == 0 {
            return Err(ParamsError::ZeroMaxIterations);
        }
        if max_iterations == self.engine.max_iterations() {
            return Ok(());
        }
        let palette = Palette::new(
            &self.palette_params,
            max_iterations,
            self.hue_control_points.as_deref(),
        )?;
        self.palette = palette;
        self.engine.set_max_iterations(max_iterations);
        log::debug!("max iterations set to {}", max_iterations);
        Ok(())
    }

    pub fn set_smoothing(&mut self, smoothing: bool) {
        self.engine.set_smoothing(smoothing);
    }

    pub fn set_normalize_escape_values(&mut self, normalize: bool) {
        self.normalize = normalize;
    }

    pub fn set_thread_count(&mut self, thread_count: usize) {
        self.thread_count = thread_count;
    }

    pub fn set_adaptive_iterations(&mut self, adaptive: Option<AdaptiveIterationParams>) {
        self.adaptive_iterations = adaptive;
    }

    /// Switch palettes. The cached escape values stay valid.
    pub fn set_palette(&mut self, palette_params: PaletteParams) -> Result<(), SplineError> {
        self.palette = Palette::new(
            &palette_params,
            self.engine.max_iterations(),
            self.hue_control_points.as_deref(),
        )?;
        self.palette_params = palette_params;
        Ok(())
    }

    /// Override (or with None, restore) the hue redistribution of the spline palette.
    pub fn set_hue_control_points(
        &mut self,
        hue_control_points: Option<Vec<[f64; 2]>>,
    ) -> Result<(), SplineError> {
        self.palette = Palette::new(
            &self.palette_params,
            self.engine.max_iterations(),
            hue_control_points.as_deref(),
        )?;
        self.hue_control_points = hue_control_points;
        Ok(())
    }

    fn apply_adaptive_iterations(&mut self) -> Result<(), ParamsError> {
        if let Some(adaptive) = &self.adaptive_iterations {
            let max_iterations = adaptive.max_iterations(self.view.zoom_factor());
            self.set_max_iterations(max_iterations)?;
        }
        Ok(())
    }

    fn frame_key(&self) -> EscapeFrameKey {
        EscapeFrameKey {
            view_revision: self.view.revision(),
            escape_time: *self.engine.params(),
            resolution: self.resolution,
            normalized: self.normalize,
        }
    }

    /// True if the cached escape values match the current view and settings.
    pub fn is_cache_valid(&self) -> bool {
        match &self.cache {
            Some(cache) => cache.key == self.frame_key(),
            None => false,
        }
    }

    /// Escape value of every pixel in the current view, recomputed only when the view,
    /// the iteration limit, or the smoothing mode changed since the last call.
    pub fn compute_escape_frame(&mut self) -> Result<&FrameBuffer<f64>, ParamsError> {
        self.escape_frame_and_palette().map(|(frame, _)| frame)
    }

    /// Compute (or reuse) the escape values and color them with the current palette.
    pub fn render(&mut self) -> Result<RgbImage, ParamsError> {
        let mut stopwatch = Stopwatch::new("mandelbrot render");
        let was_cached = self.is_cache_valid();
        let (frame, palette) = self.escape_frame_and_palette()?;
        stopwatch.record_split(if was_cached {
            "reuse escape values"
        } else {
            "compute escape values"
        });
        let image = colorize(palette, frame);
        stopwatch.record_split("colorize");
        stopwatch.log_splits();
        Ok(image)
    }

    fn escape_frame_and_palette(
        &mut self,
    ) -> Result<(&FrameBuffer<f64>, &Palette), ParamsError> {
        self.apply_adaptive_iterations()?;
        let key = self.frame_key();
        let cache = match self.cache.take() {
            Some(cache) if cache.key == key => cache,
            _ => EscapeFrameCache {
                key,
                frame: evaluate_escape_frame(
                    &self.engine,
                    &self.view,
                    &self.resolution,
                    self.thread_count,
                    self.normalize,
                ),
            },
        };
        Ok((&self.cache.insert(cache).frame, &self.palette))
    }

    /// Color the cached escape values without recomputing them. None if nothing has
    /// been computed yet.
    pub fn redraw(&self) -> Option<RgbImage> {
        self.cache
            .as_ref()
            .map(|cache| colorize(&self.palette, &cache.frame))
    }
}
