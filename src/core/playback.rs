use iter_num_tools::lin_space;

use super::{
    homography::Similarity,
    interpolation::{InterpolationKeyframe, Interpolator, NaturalCubicSpline, SplineError},
    view_transform::ViewError,
};

/// Camera views recorded one after another. Sample `i` is played back at time `i`.
#[derive(Clone, Debug, Default)]
pub struct RecordedTrack {
    samples: Vec<Similarity>,
}

impl RecordedTrack {
    pub fn push(&mut self, view: Similarity) {
        self.samples.push(view);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Similarity] {
        &self.samples
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

fn fit_channel(
    track: &RecordedTrack,
    extract: fn(&Similarity) -> f64,
) -> Result<NaturalCubicSpline, SplineError> {
    let keyframes: Vec<InterpolationKeyframe> = track
        .samples()
        .iter()
        .enumerate()
        .map(|(i, view)| InterpolationKeyframe::new(i as f64, extract(view)))
        .collect();
    NaturalCubicSpline::new(&keyframes)
}

/**
 * One natural cubic spline per view channel (scale, x translation, y translation),
 * each fit over the sample times of a `RecordedTrack`.
 */
#[derive(Clone, Debug)]
pub struct PlaybackSplines {
    scale: NaturalCubicSpline,
    translation: [NaturalCubicSpline; 2],
    last_time: f64,
}

impl PlaybackSplines {
    pub fn new(track: &RecordedTrack) -> Result<PlaybackSplines, ViewError> {
        if track.is_empty() {
            return Err(ViewError::EmptyTrack);
        }

        Ok(PlaybackSplines {
            scale: fit_channel(track, |view| view.scale)?,
            translation: [
                fit_channel(track, |view| view.translation[0])?,
                fit_channel(track, |view| view.translation[1])?,
            ],
            last_time: (track.len() - 1) as f64,
        })
    }

    pub fn last_time(&self) -> f64 {
        self.last_time
    }

    /// Reconstruct the view at time `t`, which must lie in `[0, last_time]`.
    pub fn sample(&self, time: f64) -> Result<Similarity, ViewError> {
        if !(0.0..=self.last_time).contains(&time) {
            return Err(ViewError::PlaybackOutOfRange {
                query: time,
                last_time: self.last_time,
            });
        }
        let translation = nalgebra::Vector2::new(
            self.translation[0].evaluate(time),
            self.translation[1].evaluate(time),
        );
        Similarity::new(self.scale.evaluate(time), translation)
            .ok_or(ViewError::SingularHomography)
    }

    /// `frame_count` evenly spaced times covering `[0, last_time]`, endpoints included.
    pub fn times(&self, frame_count: usize) -> Vec<f64> {
        match frame_count {
            0 => Vec::new(),
            1 => vec![0.0],
            _ => lin_space(0.0..=self.last_time, frame_count).collect(),
        }
    }
}
