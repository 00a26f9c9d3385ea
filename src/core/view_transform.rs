use nalgebra::{Matrix3, Vector2};
use thiserror::Error;

use super::{
    homography::{find_homography, PointPair, Similarity},
    image_utils::ViewRectangle,
    interpolation::SplineError,
    playback::{PlaybackSplines, RecordedTrack},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("zoom window has zero area or the image size is empty")]
    DegenerateWindow,
    #[error("solving for the new view produced a singular transform")]
    SingularHomography,
    #[error("no views have been recorded for playback")]
    EmptyTrack,
    #[error("playback has not been built")]
    PlaybackNotBuilt,
    #[error("playback time {query} is outside of [0, {last_time}]")]
    PlaybackOutOfRange { query: f64, last_time: f64 },
    #[error(transparent)]
    Spline(#[from] SplineError),
}

/**
 * Bidirectional mapping between picture space (pixels, y grows downward) and world
 * space (the complex plane, y grows upward).
 *
 * Every view change is expressed as a rectangular window in picture space that should
 * become the full image. The window corners are carried into world space with the
 * current transform, and a new transform is solved that maps them onto the image
 * corners. The solve is pinned back onto a `Similarity` before it is installed.
 *
 * The caller passes the image size on every call, so a resize never leaves stale
 * state behind.
 */
#[derive(Clone, Debug)]
pub struct ViewTransform {
    current: Similarity,
    history: Vec<Similarity>,
    revision: u64,
    track: RecordedTrack,
    playback: Option<PlaybackSplines>,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewTransform {
    /// World and picture coincide, up to the y-axis flip.
    pub fn new() -> Self {
        let current = Similarity::identity_with_flip();
        Self {
            current,
            history: vec![current],
            revision: 0,
            track: RecordedTrack::default(),
            playback: None,
        }
    }

    /// Create a transform that shows `world_rect` on an image of `image_size`.
    pub fn with_world_view(
        image_size: &Vector2<f64>,
        world_rect: &ViewRectangle,
    ) -> Result<Self, ViewError> {
        let mut view = Self::new();
        view.initialize(image_size, world_rect)?;
        Ok(view)
    }

    /// Reset to the identity, then show `world_rect` across the whole image. The
    /// history is replaced by this single view.
    pub fn initialize(
        &mut self,
        image_size: &Vector2<f64>,
        world_rect: &ViewRectangle,
    ) -> Result<(), ViewError> {
        let identity = Similarity::identity_with_flip();
        let picture_rect = world_rect_to_picture(&identity, world_rect);
        let solved = solve_zoom_window(&identity, &picture_rect, image_size)?;
        self.history.clear();
        self.install(solved, true);
        log::debug!("initialized view: {:?}", solved);
        Ok(())
    }

    pub fn current(&self) -> &Similarity {
        &self.current
    }

    pub fn world_to_picture_matrix(&self) -> Matrix3<f64> {
        self.current.matrix()
    }

    pub fn map_to_world(&self, picture: &Vector2<f64>) -> Vector2<f64> {
        self.current.picture_to_world(picture)
    }

    pub fn map_to_picture(&self, world: &Vector2<f64>) -> Vector2<f64> {
        self.current.world_to_picture(world)
    }

    /// Incremented every time a new view is installed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Oldest view first; the last entry is the current view.
    pub fn history(&self) -> &[Similarity] {
        &self.history
    }

    /**
     * Zoom about the image center. The window `factor * image_size` becomes the full
     * image, so `factor < 1` zooms in.
     */
    pub fn zoom(
        &mut self,
        factor: f64,
        image_size: &Vector2<f64>,
        save_history: bool,
    ) -> Result<(), ViewError> {
        let window = ViewRectangle::new(0.5 * image_size, factor * image_size);
        self.set_zoom_window_from_picture(&window, image_size, save_history)
    }

    /// Move the view by `offset` pixels.
    pub fn pan(
        &mut self,
        offset: &Vector2<f64>,
        image_size: &Vector2<f64>,
        save_history: bool,
    ) -> Result<(), ViewError> {
        let window = ViewRectangle::full_image(image_size).translate(offset);
        self.set_zoom_window_from_picture(&window, image_size, save_history)
    }

    /// Zoom without saving history, then pan; history is saved at most once.
    pub fn set_relative(
        &mut self,
        factor: f64,
        offset: &Vector2<f64>,
        image_size: &Vector2<f64>,
        save_history: bool,
    ) -> Result<(), ViewError> {
        let window = ViewRectangle::new(0.5 * image_size, factor * image_size);
        let zoomed = solve_zoom_window(&self.current, &window, image_size)?;
        let panned = solve_zoom_window(
            &zoomed,
            &ViewRectangle::full_image(image_size).translate(offset),
            image_size,
        )?;
        self.install(panned, save_history);
        Ok(())
    }

    /// The pixel rectangle `window` (given in the current view) becomes the full image.
    pub fn set_zoom_window_from_picture(
        &mut self,
        window: &ViewRectangle,
        image_size: &Vector2<f64>,
        save_history: bool,
    ) -> Result<(), ViewError> {
        let solved = solve_zoom_window(&self.current, window, image_size).map_err(|err| {
            log::warn!("rejected zoom window {:?}: {}", window, err);
            err
        })?;
        self.install(solved, save_history);
        log::debug!(
            "zoom window: center={:?} scale={:e}",
            self.world_center(image_size),
            solved.scale
        );
        Ok(())
    }

    /// The world rectangle `window` becomes the full image.
    pub fn set_zoom_window_from_world(
        &mut self,
        window: &ViewRectangle,
        image_size: &Vector2<f64>,
        save_history: bool,
    ) -> Result<(), ViewError> {
        let picture_window = world_rect_to_picture(&self.current, window);
        self.set_zoom_window_from_picture(&picture_window, image_size, save_history)
    }

    /// Step back to the previous view. Never removes the initial view.
    pub fn undo(&mut self) {
        if self.history.len() < 2 {
            return;
        }
        self.history.pop();
        if let Some(previous) = self.history.last() {
            self.current = *previous;
            self.revision += 1;
        }
    }

    /// World coordinate at the center of the image.
    pub fn world_center(&self, image_size: &Vector2<f64>) -> Vector2<f64> {
        self.map_to_world(&(0.5 * image_size))
    }

    /// Pixels per world unit.
    pub fn zoom_factor(&self) -> f64 {
        self.current.scale
    }

    /// Human-readable tag of the current position, suitable for a file name.
    pub fn position_identifier(&self, image_size: &Vector2<f64>) -> String {
        let center = self.world_center(image_size);
        format!(
            "MandelBrot X_{:.6} Y_{:.6} F_{:.6}",
            center[0],
            center[1],
            self.zoom_factor()
        )
    }

    /// Append the current view to the camera track.
    pub fn record_current_view(&mut self) {
        self.track.push(self.current);
    }

    pub fn recorded_track(&self) -> &RecordedTrack {
        &self.track
    }

    pub fn clear_recorded_track(&mut self) {
        self.track.clear();
        self.playback = None;
    }

    /// Fit the playback splines over the recorded track.
    ///
    /// @return: the last valid playback time, `sample_count - 1`.
    pub fn build_playback(&mut self) -> Result<f64, ViewError> {
        let playback = PlaybackSplines::new(&self.track)?;
        let last_time = playback.last_time();
        self.playback = Some(playback);
        log::debug!(
            "built playback over {} samples, last time {}",
            self.track.len(),
            last_time
        );
        Ok(last_time)
    }

    /// Install the view reconstructed at playback time `time`. History is untouched.
    pub fn seek_playback(&mut self, time: f64) -> Result<(), ViewError> {
        let playback = self.playback.as_ref().ok_or(ViewError::PlaybackNotBuilt)?;
        let view = playback.sample(time)?;
        self.install(view, false);
        Ok(())
    }

    /// Evenly spaced times over the whole playback, one per output frame.
    pub fn playback_times(&self, frame_count: usize) -> Result<Vec<f64>, ViewError> {
        let playback = self.playback.as_ref().ok_or(ViewError::PlaybackNotBuilt)?;
        Ok(playback.times(frame_count))
    }

    fn install(&mut self, view: Similarity, save_history: bool) {
        self.current = view;
        self.revision += 1;
        if save_history {
            self.history.push(view);
        }
    }
}

fn world_rect_to_picture(view: &Similarity, world_rect: &ViewRectangle) -> ViewRectangle {
    ViewRectangle::from_corners(
        &view.world_to_picture(&world_rect.min_corner()),
        &view.world_to_picture(&world_rect.max_corner()),
    )
}

/**
 * Solve for the view in which `window` (a picture rectangle under `view`) fills an
 * image of `image_size`. Does not modify any state.
 *
 * The world corners are expressed as offsets from the world point under the window
 * center. The offsets are computed from picture differences, so they keep full
 * precision at zoom depths where the absolute corner coordinates differ only in
 * their last few bits.
 */
fn solve_zoom_window(
    view: &Similarity,
    window: &ViewRectangle,
    image_size: &Vector2<f64>,
) -> Result<Similarity, ViewError> {
    if window.is_degenerate() || image_size.iter().any(|v| !(*v > 0.0 && v.is_finite())) {
        return Err(ViewError::DegenerateWindow);
    }

    let image_corners = ViewRectangle::full_image(image_size).corners();
    let window_corners = window.corners();
    let anchor_world = view.picture_to_world(&window.center);

    let mut pairs = [PointPair {
        world: Vector2::zeros(),
        picture: Vector2::zeros(),
    }; 4];
    for (pair, (window_corner, image_corner)) in pairs
        .iter_mut()
        .zip(window_corners.iter().zip(image_corners.iter()))
    {
        let offset = window_corner - window.center;
        pair.world = Vector2::new(offset[0], -offset[1]) / view.scale;
        pair.picture = *image_corner;
    }

    let homography = find_homography(&pairs).ok_or(ViewError::SingularHomography)?;
    Similarity::pin(&homography, &anchor_world, &(0.5 * image_size))
        .ok_or(ViewError::SingularHomography)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn image() -> Vector2<f64> {
        Vector2::new(600.0, 600.0)
    }

    fn initial_world() -> ViewRectangle {
        ViewRectangle::new(Vector2::zeros(), Vector2::new(4.0, 4.0))
    }

    fn initial_view() -> ViewTransform {
        ViewTransform::with_world_view(&image(), &initial_world()).unwrap()
    }

    #[test]
    fn test_initialize_maps_world_rect_onto_image() {
        let view = initial_view();
        assert_eq!(view.history().len(), 1);
        assert_relative_eq!(view.zoom_factor(), 150.0, epsilon = 1e-6);
        assert_relative_eq!(
            view.map_to_world(&Vector2::new(0.0, 0.0)),
            Vector2::new(-2.0, 2.0),
            epsilon = 1e-6
        );
        assert_relative_eq!(
            view.map_to_world(&Vector2::new(600.0, 600.0)),
            Vector2::new(2.0, -2.0),
            epsilon = 1e-6
        );
        assert_relative_eq!(
            view.world_center(&image()),
            Vector2::zeros(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_installed_transform_is_canonical() {
        let mut view = initial_view();
        view.set_zoom_window_from_picture(
            &ViewRectangle::from_corners(&Vector2::new(100.0, 50.0), &Vector2::new(400.0, 320.0)),
            &image(),
            true,
        )
        .unwrap();
        let matrix = view.world_to_picture_matrix();
        assert_eq!(matrix[(0, 1)], 0.0);
        assert_eq!(matrix[(1, 0)], 0.0);
        assert_eq!(matrix[(2, 0)], 0.0);
        assert_eq!(matrix[(2, 1)], 0.0);
        assert_eq!(matrix[(2, 2)], 1.0);
        assert_eq!(matrix[(1, 1)], -matrix[(0, 0)]);
    }

    #[test]
    fn test_zoom_window_corners_round_trip() {
        let mut view = initial_view();
        let window =
            ViewRectangle::from_corners(&Vector2::new(150.0, 150.0), &Vector2::new(450.0, 450.0));
        let world_corners: Vec<Vector2<f64>> = window
            .corners()
            .iter()
            .map(|corner| view.map_to_world(corner))
            .collect();

        view.set_zoom_window_from_picture(&window, &image(), true).unwrap();

        let image_corners = ViewRectangle::full_image(&image()).corners();
        for (world, image_corner) in world_corners.iter().zip(image_corners.iter()) {
            assert_relative_eq!(view.map_to_picture(world), *image_corner, epsilon = 1e-6);
            assert_relative_eq!(view.map_to_world(image_corner), *world, epsilon = 1e-6);
        }
        assert_relative_eq!(view.zoom_factor(), 300.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zoom_and_pan() {
        let mut view = initial_view();
        view.zoom(0.5, &image(), true).unwrap();
        assert_relative_eq!(view.zoom_factor(), 300.0, epsilon = 1e-6);
        assert_relative_eq!(view.world_center(&image()), Vector2::zeros(), epsilon = 1e-6);

        view.pan(&Vector2::new(300.0, 0.0), &image(), true).unwrap();
        assert_relative_eq!(
            view.world_center(&image()),
            Vector2::new(1.0, 0.0),
            epsilon = 1e-6
        );
        assert_eq!(view.history().len(), 3);
    }

    #[test]
    fn test_set_relative_saves_history_once() {
        let mut view = initial_view();
        view.set_relative(0.5, &Vector2::new(0.0, 150.0), &image(), true)
            .unwrap();
        assert_eq!(view.history().len(), 2);
        assert_relative_eq!(view.zoom_factor(), 300.0, epsilon = 1e-6);
        assert_relative_eq!(
            view.world_center(&image()),
            Vector2::new(0.0, -0.5),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_world_window_matches_picture_window() {
        let mut from_world = initial_view();
        let mut from_picture = initial_view();
        from_world
            .set_zoom_window_from_world(
                &ViewRectangle::from_corners(&Vector2::new(-1.0, 1.0), &Vector2::new(1.0, -1.0)),
                &image(),
                true,
            )
            .unwrap();
        from_picture.zoom(0.5, &image(), true).unwrap();
        assert_relative_eq!(
            from_world.current().scale,
            from_picture.current().scale,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            from_world.current().translation,
            from_picture.current().translation,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_degenerate_window_is_rejected() {
        let mut view = initial_view();
        let before = *view.current();
        let revision = view.revision();

        let flat =
            ViewRectangle::from_corners(&Vector2::new(10.0, 10.0), &Vector2::new(200.0, 10.0));
        assert_eq!(
            view.set_zoom_window_from_picture(&flat, &image(), true),
            Err(ViewError::DegenerateWindow)
        );
        assert_eq!(
            view.zoom(0.5, &Vector2::new(0.0, 600.0), true),
            Err(ViewError::DegenerateWindow)
        );
        assert_eq!(view.zoom(0.0, &image(), true), Err(ViewError::DegenerateWindow));

        assert_eq!(*view.current(), before);
        assert_eq!(view.revision(), revision);
        assert_eq!(view.history().len(), 1);
    }

    #[test]
    fn test_repeated_zoom_keeps_scale_and_center() {
        let image_size = image();
        let center = Vector2::new(-0.743643887037151, 0.131825904205330);
        let world = ViewRectangle::new(center, Vector2::new(4.0, 4.0));
        let mut view = ViewTransform::with_world_view(&image_size, &world).unwrap();

        for step in 0..42 {
            let previous_scale = view.zoom_factor();
            let previous_center = view.world_center(&image_size);
            view.zoom(0.5, &image_size, true).unwrap();

            let scale = view.zoom_factor();
            assert!(scale > 0.0, "step {}: scale {:e}", step, scale);
            assert_relative_eq!(scale / previous_scale, 2.0, epsilon = 1e-6);
            let drift_pixels = (view.world_center(&image_size) - previous_center).norm() * scale;
            assert!(drift_pixels < 0.25, "step {}: drift {} px", step, drift_pixels);
        }
        assert_relative_eq!(view.world_center(&image_size), center, epsilon = 1e-12);
        assert_eq!(view.history().len(), 43);
    }

    #[test]
    fn test_undo() {
        let mut view = initial_view();
        let initial = *view.current();
        view.undo();
        view.undo();
        assert_eq!(*view.current(), initial);

        view.zoom(0.5, &image(), true).unwrap();
        let zoomed = *view.current();
        view.zoom(0.5, &image(), true).unwrap();
        view.undo();
        assert_eq!(*view.current(), zoomed);
        view.undo();
        assert_eq!(*view.current(), initial);
        view.undo();
        assert_eq!(*view.current(), initial);
        assert_eq!(view.history().len(), 1);
    }

    #[test]
    fn test_zoom_without_history_is_not_undone() {
        let mut view = initial_view();
        view.zoom(0.5, &image(), false).unwrap();
        assert_eq!(view.history().len(), 1);
        let revision = view.revision();
        view.undo();
        assert_eq!(view.revision(), revision);
        assert_relative_eq!(view.zoom_factor(), 300.0, epsilon = 1e-6);
    }

    #[test]
    fn test_position_identifier() {
        let view = initial_view();
        assert_eq!(
            view.position_identifier(&image()),
            "MandelBrot X_0.000000 Y_0.000000 F_150.000000"
        );
    }

    #[test]
    fn test_playback_with_two_samples() {
        let mut view = initial_view();
        assert_eq!(view.build_playback(), Err(ViewError::EmptyTrack));
        assert_eq!(view.seek_playback(0.0), Err(ViewError::PlaybackNotBuilt));

        view.record_current_view();
        view.zoom(0.5, &image(), true).unwrap();
        view.record_current_view();

        assert_eq!(view.build_playback(), Ok(1.0));
        let before = *view.current();
        assert!(matches!(
            view.seek_playback(1.5),
            Err(ViewError::PlaybackOutOfRange { .. })
        ));
        assert_eq!(*view.current(), before);

        view.seek_playback(0.5).unwrap();
        assert_relative_eq!(view.zoom_factor(), 225.0, epsilon = 1e-6);
        assert_eq!(view.history().len(), 2);

        let times = view.playback_times(3).unwrap();
        assert_eq!(times.len(), 3);
        assert_relative_eq!(times[1], 0.5);
    }
}
