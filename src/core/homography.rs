use nalgebra::{Matrix3, SMatrix, SVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Correspondence between a point in world space and a point in picture space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPair {
    pub world: Vector2<f64>,
    pub picture: Vector2<f64>,
}

/**
 * Canonical world -> picture transform: uniform scale, translation, and a flip of the
 * y axis (picture rows grow downward, the imaginary axis grows upward).
 *
 * ```text
 *      | s   0  tx |
 * H =  | 0  -s  ty |
 *      | 0   0   1 |
 * ```
 *
 * The scale is strictly positive, so the transform is always invertible and never
 * mirrors either axis. The inverse never needs a general matrix inversion.
 */
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub scale: f64,
    pub translation: Vector2<f64>,
}

impl Similarity {
    /// World and picture coordinates coincide, up to the y-axis flip.
    pub fn identity_with_flip() -> Self {
        Self {
            scale: 1.0,
            translation: Vector2::zeros(),
        }
    }

    pub fn new(scale: f64, translation: Vector2<f64>) -> Option<Self> {
        if scale.is_finite() && scale > 0.0 && translation.iter().all(|t| t.is_finite()) {
            Some(Self { scale, translation })
        } else {
            None
        }
    }

    pub fn world_to_picture(&self, world: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            self.scale * world[0] + self.translation[0],
            -self.scale * world[1] + self.translation[1],
        )
    }

    pub fn picture_to_world(&self, picture: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            (picture[0] - self.translation[0]) / self.scale,
            (self.translation[1] - picture[1]) / self.scale,
        )
    }

    /// Homogeneous world -> picture matrix.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.scale,
            0.0,
            self.translation[0],
            0.0,
            -self.scale,
            self.translation[1],
            0.0,
            0.0,
            1.0,
        )
    }

    /// Homogeneous picture -> world matrix, the exact inverse of `matrix()`.
    pub fn inverse_matrix(&self) -> Matrix3<f64> {
        let inv_scale = 1.0 / self.scale;
        Matrix3::new(
            inv_scale,
            0.0,
            -self.translation[0] * inv_scale,
            0.0,
            -inv_scale,
            self.translation[1] * inv_scale,
            0.0,
            0.0,
            1.0,
        )
    }

    /**
     * Pin a general homography back onto the canonical pattern. The scale is the mean
     * of the x scale and the (flipped) y scale; the translation is re-derived so that
     * `anchor_world` still lands on `anchor_picture`. The off-pattern entries, which
     * a general solver leaves as small residuals, are dropped.
     *
     * @return: None if the homography is singular, mirrored, or drops the y flip:
     * both axis scales must be strictly positive.
     */
    pub fn pin(
        homography: &Matrix3<f64>,
        anchor_world: &Vector2<f64>,
        anchor_picture: &Vector2<f64>,
    ) -> Option<Self> {
        let w = homography[(2, 2)];
        if w == 0.0 || !w.is_finite() {
            return None;
        }
        let h = homography / w;

        let scale_x = h[(0, 0)];
        let scale_y = -h[(1, 1)];
        let scale = 0.5 * (scale_x + scale_y);

        log::debug!(
            "pinning homography: scale_x={:e} scale_y={:e} residuals=[{:e}, {:e}, {:e}, {:e}]",
            scale_x,
            scale_y,
            h[(0, 1)],
            h[(1, 0)],
            h[(2, 0)],
            h[(2, 1)]
        );
        if !(scale_x > 0.0 && scale_y > 0.0) {
            log::warn!(
                "rejected homography with axis scales {:e} and {:e}",
                scale_x,
                scale_y
            );
            return None;
        }

        let translation = anchor_picture
            - Vector2::new(scale * anchor_world[0], -scale * anchor_world[1]);
        Self::new(scale, translation)
    }
}

/// Apply a homogeneous transform to a 2D point.
pub fn apply_homography(homography: &Matrix3<f64>, point: &Vector2<f64>) -> Vector2<f64> {
    let mapped = homography * Vector3::new(point[0], point[1], 1.0);
    Vector2::new(mapped[0] / mapped[2], mapped[1] / mapped[2])
}

/**
 * Similarity that moves the centroid of `points` to the origin and scales them to unit
 * RMS distance from it, along with its inverse.
 *
 * @return: None if all points coincide.
 */
fn normalizing_transform(points: &[Vector2<f64>; 4]) -> Option<(Matrix3<f64>, Matrix3<f64>)> {
    let centroid = points.iter().copied().sum::<Vector2<f64>>() / 4.0;
    let mean_square = points
        .iter()
        .map(|point| (point - centroid).norm_squared())
        .sum::<f64>()
        / 4.0;
    let rms = mean_square.sqrt();
    if !(rms > 0.0 && rms.is_finite()) {
        return None;
    }
    let k = 1.0 / rms;
    let forward = Matrix3::new(
        k,
        0.0,
        -k * centroid[0],
        0.0,
        k,
        -k * centroid[1],
        0.0,
        0.0,
        1.0,
    );
    let inverse = Matrix3::new(rms, 0.0, centroid[0], 0.0, rms, centroid[1], 0.0, 0.0, 1.0);
    Some((forward, inverse))
}

/**
 * Solve for the homography mapping each `world` point onto its `picture` point.
 * Direct linear transform with `H[2][2] = 1`: eight unknowns, two equations per
 * correspondence, solved by LU decomposition with partial pivoting.
 *
 * Both point sets are normalized first (centroid at the origin, unit RMS distance),
 * and the normalization is undone on the result. Without it the system becomes
 * ill-conditioned once the world points are tightly clustered away from the origin.
 *
 * @return: None if the correspondences are degenerate (singular system).
 */
pub fn find_homography(pairs: &[PointPair; 4]) -> Option<Matrix3<f64>> {
    let worlds = [pairs[0].world, pairs[1].world, pairs[2].world, pairs[3].world];
    let pictures = [
        pairs[0].picture,
        pairs[1].picture,
        pairs[2].picture,
        pairs[3].picture,
    ];
    let (world_normalize, _) = normalizing_transform(&worlds)?;
    let (picture_normalize, picture_denormalize) = normalizing_transform(&pictures)?;

    let mut system = SMatrix::<f64, 8, 8>::zeros();
    let mut rhs = SVector::<f64, 8>::zeros();

    for (i, (world, picture)) in worlds.iter().zip(pictures.iter()).enumerate() {
        let world = apply_homography(&world_normalize, world);
        let picture = apply_homography(&picture_normalize, picture);
        let (x, y) = (world[0], world[1]);
        let (u, v) = (picture[0], picture[1]);
        let row_u = 2 * i;
        let row_v = row_u + 1;

        system[(row_u, 0)] = x;
        system[(row_u, 1)] = y;
        system[(row_u, 2)] = 1.0;
        system[(row_u, 6)] = -u * x;
        system[(row_u, 7)] = -u * y;
        rhs[row_u] = u;

        system[(row_v, 3)] = x;
        system[(row_v, 4)] = y;
        system[(row_v, 5)] = 1.0;
        system[(row_v, 6)] = -v * x;
        system[(row_v, 7)] = -v * y;
        rhs[row_v] = v;
    }

    let solution = system.lu().solve(&rhs)?;
    if solution.iter().any(|entry| !entry.is_finite()) {
        return None;
    }

    let normalized = Matrix3::new(
        solution[0],
        solution[1],
        solution[2],
        solution[3],
        solution[4],
        solution[5],
        solution[6],
        solution[7],
        1.0,
    );
    let homography = picture_denormalize * normalized * world_normalize;
    let w = homography[(2, 2)];
    if w == 0.0 || !w.is_finite() {
        return None;
    }
    Some(homography / w)
}
