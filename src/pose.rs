//! Iterative pose-from-4-points estimation (POSIT family).
//!
//! Recovers a marker's rigid transform relative to the camera from its
//! four detected corners, the known physical marker size, and a focal
//! length approximated from the image width. The solver alternates
//! between a scaled-orthographic least-squares estimate and a
//! depth-induced scale correction until the angular reprojection
//! residual stabilizes.

use nalgebra::{Matrix3, Vector3};
use tracing::debug;

use crate::error::PoseError;
use crate::Point2;

/// Iteration cap for the refinement loop. Together with the residual
/// floor below this bounds per-marker work inside a render tick.
const MAX_ITERATIONS: usize = 100;

/// Stop refining once the angular residual (degrees) drops this low.
const RESIDUAL_FLOOR: f64 = 2.0;

/// Minimum squared pixel distance between two corners before they count
/// as coincident.
const MIN_CORNER_SEPARATION_SQ: f64 = 1e-12;

/// Quad areas (squared pixels) below this are treated as collinear.
const MIN_QUAD_AREA: f64 = 1e-9;

/// A marker's rigid transform relative to the camera.
///
/// `translation` is in the physical unit of the marker size used for
/// estimation; `rotation` aligns marker-local axes to camera axes;
/// `error` is the solver's angular reprojection residual in degrees -
/// lower is better, and acceptance policy is the caller's.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub translation: Vector3<f64>,
    pub rotation: Matrix3<f64>,
    pub error: f64,
}

/// Pose estimator with a cached solver keyed on `(marker_size,
/// image_width)`. The focal length is approximated as the image width,
/// so the solver must be rebuilt whenever the source resolution changes.
#[derive(Default)]
pub struct PoseEstimator {
    cache: Option<ModelCache>,
}

struct ModelCache {
    marker_size: f64,
    image_width: u32,
    solver: Posit,
}

impl PoseEstimator {
    pub fn new() -> Self {
        Self { cache: None }
    }

    /// Estimate the pose of a marker from its four corners in image
    /// pixel space (top-left origin, y down; detector corner order
    /// preserved).
    pub fn estimate(
        &mut self,
        corners: &[Point2; 4],
        image_width: u32,
        image_height: u32,
        marker_size_mm: f64,
    ) -> Result<Pose, PoseError> {
        // Top-left pixel convention -> centered, y-up, right-handed.
        let half_w = f64::from(image_width) / 2.0;
        let half_h = f64::from(image_height) / 2.0;
        let centered = [
            Point2::new(corners[0].x - half_w, half_h - corners[0].y),
            Point2::new(corners[1].x - half_w, half_h - corners[1].y),
            Point2::new(corners[2].x - half_w, half_h - corners[2].y),
            Point2::new(corners[3].x - half_w, half_h - corners[3].y),
        ];

        if is_degenerate(&centered) {
            return Err(PoseError::DegenerateGeometry);
        }

        let stale = !matches!(
            &self.cache,
            Some(c) if c.image_width == image_width && c.marker_size == marker_size_mm
        );
        if stale {
            let focal_length = f64::from(image_width);
            debug!(
                marker_size_mm,
                image_width, focal_length, "rebuilding pose solver"
            );
            let solver =
                Posit::new(marker_size_mm, focal_length).ok_or(PoseError::DegenerateGeometry)?;
            self.cache = Some(ModelCache {
                marker_size: marker_size_mm,
                image_width,
                solver,
            });
        }

        match &self.cache {
            Some(cache) => Ok(cache.solver.pose(&centered)),
            None => Err(PoseError::DegenerateGeometry),
        }
    }

    #[cfg(test)]
    fn cached_focal(&self) -> Option<f64> {
        self.cache.as_ref().map(|c| c.solver.focal_length)
    }
}

/// Exactly coincident or collinear corners make the problem ill-posed.
fn is_degenerate(points: &[Point2; 4]) -> bool {
    for i in 0..4 {
        for j in (i + 1)..4 {
            if (points[i] - points[j]).norm_squared() < MIN_CORNER_SEPARATION_SQ {
                return true;
            }
        }
    }

    // Shoelace area of the quad; zero means all four points sit on one
    // line.
    let mut area = 0.0;
    for i in 0..4 {
        let a = points[i];
        let b = points[(i + 1) % 4];
        area += a.x * b.y - b.x * a.y;
    }
    area.abs() < MIN_QUAD_AREA
}

/// POSIT solver for a square marker of known physical size.
///
/// The model is the marker's four corners in its local frame; the
/// pseudo-inverse of the corner-difference matrix and the model plane
/// normal are precomputed once per `(size, focal)` pairing.
struct Posit {
    model: [Vector3<f64>; 4],
    focal_length: f64,
    model_vectors: Matrix3<f64>,
    model_normal: Vector3<f64>,
    model_pseudo_inverse: Matrix3<f64>,
}

impl Posit {
    /// Returns `None` only if the model-vector matrix defies
    /// decomposition, which a square marker of positive size never does.
    fn new(model_size: f64, focal_length: f64) -> Option<Self> {
        let half = model_size / 2.0;
        let model = [
            Vector3::new(-half, half, 0.0),
            Vector3::new(half, half, 0.0),
            Vector3::new(half, -half, 0.0),
            Vector3::new(-half, -half, 0.0),
        ];

        let model_vectors = Matrix3::from_rows(&[
            (model[1] - model[0]).transpose(),
            (model[2] - model[0]).transpose(),
            (model[3] - model[0]).transpose(),
        ]);

        let svd = model_vectors.svd(true, true);
        let u = svd.u?;
        let v_t = svd.v_t?;
        let d = svd.singular_values;

        // Moore-Penrose pseudo-inverse; the marker plane makes the
        // matrix rank 2, so the smallest singular value is dropped.
        let tolerance = 1e-9 * d[0].max(1.0);
        let d_inv = Vector3::new(
            if d[0] > tolerance { 1.0 / d[0] } else { 0.0 },
            if d[1] > tolerance { 1.0 / d[1] } else { 0.0 },
            if d[2] > tolerance { 1.0 / d[2] } else { 0.0 },
        );
        let model_pseudo_inverse =
            v_t.transpose() * Matrix3::from_diagonal(&d_inv) * u.transpose();

        // Right-singular vector of the smallest singular value spans the
        // model plane normal. nalgebra sorts singular values descending.
        let model_normal = v_t.row(2).transpose();

        Some(Self {
            model,
            focal_length,
            model_vectors,
            model_normal,
            model_pseudo_inverse,
        })
    }

    /// Full pose recovery: both scaled-orthographic branches are refined
    /// and the lower-residual pose wins.
    fn pose(&self, points: &[Point2; 4]) -> Pose {
        let eps = Vector3::new(1.0, 1.0, 1.0);
        let (mut candidate1, mut candidate2) = self.pos(points, &eps);

        let error1 = self.refine(points, &mut candidate1);
        let error2 = self.refine(points, &mut candidate2);

        let (best, error) = if error1 < error2 {
            (candidate1, error1)
        } else {
            (candidate2, error2)
        };

        // The solver tracks the reference corner's translation; shift to
        // the model origin (marker center) for the reported pose.
        let (rotation, reference_translation) = best;
        let translation = reference_translation - rotation * self.model[0];

        Pose {
            translation,
            rotation,
            error,
        }
    }

    /// One scaled-orthographic (POS) step. Returns the two candidate
    /// `(rotation, reference-corner translation)` pairs the planar
    /// ambiguity admits.
    #[allow(clippy::type_complexity)]
    fn pos(
        &self,
        points: &[Point2; 4],
        eps: &Vector3<f64>,
    ) -> ((Matrix3<f64>, Vector3<f64>), (Matrix3<f64>, Vector3<f64>)) {
        let xi = Vector3::new(points[1].x, points[2].x, points[3].x);
        let yi = Vector3::new(points[1].y, points[2].y, points[3].y);

        let xs = xi.component_mul(eps).add_scalar(-points[0].x);
        let ys = yi.component_mul(eps).add_scalar(-points[0].y);

        let i0 = self.model_pseudo_inverse * xs;
        let j0 = self.model_pseudo_inverse * ys;

        let s = j0.norm_squared() - i0.norm_squared();
        let ij = i0.dot(&j0);

        let r;
        let mut theta;
        if s == 0.0 {
            r = (2.0 * ij).abs().sqrt();
            theta = (-std::f64::consts::PI / 2.0)
                * if ij < 0.0 {
                    -1.0
                } else if ij > 0.0 {
                    1.0
                } else {
                    0.0
                };
        } else {
            r = (s * s + 4.0 * ij * ij).sqrt().sqrt();
            theta = (-2.0 * ij / s).atan();
            if s < 0.0 {
                theta += std::f64::consts::PI;
            }
            theta /= 2.0;
        }

        let lambda = r * theta.cos();
        let mu = r * theta.sin();

        let branch = |sign: f64| {
            let mut i = i0 + self.model_normal * (sign * lambda);
            let mut j = j0 + self.model_normal * (sign * mu);
            let i_norm = i.normalize_mut();
            let j_norm = j.normalize_mut();
            let k = i.cross(&j);
            // Rows are the camera axes expressed in the model frame, so
            // R * m lands points in camera coordinates.
            let rotation = Matrix3::from_rows(&[i.transpose(), j.transpose(), k.transpose()]);

            let scale = (i_norm + j_norm) / 2.0;
            let translation = Vector3::new(
                points[0].x / scale,
                points[0].y / scale,
                self.focal_length / scale,
            );
            (rotation, translation)
        };

        (branch(1.0), branch(-1.0))
    }

    /// Iterate POS steps, correcting each point's depth-induced scale
    /// from the previous estimate, until the residual drops to the floor
    /// or stops improving.
    fn refine(&self, points: &[Point2; 4], candidate: &mut (Matrix3<f64>, Vector3<f64>)) -> f64 {
        let mut prev_error = f64::INFINITY;
        let mut error = self.reprojection_error(points, candidate);

        for _ in 0..MAX_ITERATIONS {
            let (rotation, translation) = &*candidate;
            let k_row = rotation.row(2).transpose();
            let eps = ((self.model_vectors * k_row) / translation.z).add_scalar(1.0);

            let (candidate1, candidate2) = self.pos(points, &eps);
            let error1 = self.reprojection_error(points, &candidate1);
            let error2 = self.reprojection_error(points, &candidate2);

            if error1 < error2 {
                *candidate = candidate1;
                error = error1;
            } else {
                *candidate = candidate2;
                error = error2;
            }

            if error <= RESIDUAL_FLOOR || error > prev_error {
                break;
            }
            prev_error = error;
        }

        error
    }

    /// Average absolute difference (degrees) between the inner angles of
    /// the detected quad and those of the reprojected model.
    fn reprojection_error(
        &self,
        points: &[Point2; 4],
        candidate: &(Matrix3<f64>, Vector3<f64>),
    ) -> f64 {
        let (rotation, translation) = candidate;
        let project = |index: usize| {
            let v = rotation * (self.model[index] - self.model[0]) + translation;
            Point2::new(
                v.x * self.focal_length / v.z,
                v.y * self.focal_length / v.z,
            )
        };
        let modeled = [project(0), project(1), project(2), project(3)];

        let mut total = 0.0;
        for i in 0..4 {
            let prev = (i + 3) % 4;
            let next = (i + 1) % 4;
            let detected = corner_angle(&points[i], &points[next], &points[prev]);
            let reprojected = corner_angle(&modeled[i], &modeled[next], &modeled[prev]);
            total += (detected - reprojected).abs();
        }
        total / 4.0
    }
}

/// Inner angle at `a` between rays to `b` and `c`, in degrees.
fn corner_angle(a: &Point2, b: &Point2, c: &Point2) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let cos_val = (ab.dot(&ac) / (ab.norm() * ac.norm())).clamp(-1.0, 1.0);
    cos_val.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const WIDTH: u32 = 640;
    const HEIGHT: u32 = 480;

    /// Project a marker of `size` under ground-truth pose `(r, t)` into
    /// pixel space, using the same focal convention as the estimator.
    fn project_marker(
        size: f64,
        r: &Matrix3<f64>,
        t: &Vector3<f64>,
        width: u32,
        height: u32,
    ) -> [Point2; 4] {
        let half = size / 2.0;
        let model = [
            Vector3::new(-half, half, 0.0),
            Vector3::new(half, half, 0.0),
            Vector3::new(half, -half, 0.0),
            Vector3::new(-half, -half, 0.0),
        ];
        let focal = f64::from(width);
        model.map(|m| {
            let p = r * m + t;
            let u = p.x * focal / p.z;
            let v = p.y * focal / p.z;
            Point2::new(u + f64::from(width) / 2.0, f64::from(height) / 2.0 - v)
        })
    }

    fn assert_orthonormal(r: &Matrix3<f64>, tolerance: f64) {
        let gram = r.transpose() * r;
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (gram[(i, j)] - expected).abs() < tolerance,
                    "R^T R deviates at ({i},{j}): {}",
                    gram[(i, j)]
                );
            }
        }
        assert!((r.determinant() - 1.0).abs() < tolerance, "det != +1");
    }

    #[test]
    fn frontal_marker_recovers_exact_depth() {
        let mut estimator = PoseEstimator::new();

        // 35mm marker filling a 100x100 pixel square dead center.
        let corners = [
            Point2::new(270.0, 190.0),
            Point2::new(370.0, 190.0),
            Point2::new(370.0, 290.0),
            Point2::new(270.0, 290.0),
        ];
        let pose = estimator.estimate(&corners, WIDTH, HEIGHT, 35.0).unwrap();

        // Depth = focal * size / screen size = 640 * 35 / 100.
        assert_relative_eq!(pose.translation.z, 224.0, max_relative = 0.01);
        assert!(pose.translation.x.abs() < 1.0);
        assert!(pose.translation.y.abs() < 1.0);
        assert!(pose.error < 1.0);
        assert_orthonormal(&pose.rotation, 1e-3);
    }

    #[test]
    fn tilted_marker_recovers_ground_truth() {
        let mut estimator = PoseEstimator::new();

        let angle = 15f64.to_radians();
        let truth_r = Matrix3::new(
            1.0,
            0.0,
            0.0,
            0.0,
            angle.cos(),
            -angle.sin(),
            0.0,
            angle.sin(),
            angle.cos(),
        );
        let truth_t = Vector3::new(20.0, -10.0, 400.0);

        let corners = project_marker(50.0, &truth_r, &truth_t, WIDTH, HEIGHT);
        let pose = estimator.estimate(&corners, WIDTH, HEIGHT, 50.0).unwrap();

        assert!(
            (pose.translation - truth_t).norm() < 20.0,
            "translation off: {:?}",
            pose.translation
        );
        for i in 0..3 {
            for j in 0..3 {
                assert!(
                    (pose.rotation[(i, j)] - truth_r[(i, j)]).abs() < 0.15,
                    "rotation deviates at ({i},{j})"
                );
            }
        }
        assert_orthonormal(&pose.rotation, 1e-2);
    }

    #[test]
    fn collinear_corners_are_degenerate() {
        let mut estimator = PoseEstimator::new();
        let corners = [
            Point2::new(100.0, 100.0),
            Point2::new(200.0, 200.0),
            Point2::new(300.0, 300.0),
            Point2::new(400.0, 400.0),
        ];
        assert!(matches!(
            estimator.estimate(&corners, WIDTH, HEIGHT, 50.0),
            Err(PoseError::DegenerateGeometry)
        ));
    }

    #[test]
    fn coincident_corners_are_degenerate() {
        let mut estimator = PoseEstimator::new();
        let corners = [
            Point2::new(100.0, 100.0),
            Point2::new(100.0, 100.0),
            Point2::new(300.0, 100.0),
            Point2::new(300.0, 300.0),
        ];
        assert!(matches!(
            estimator.estimate(&corners, WIDTH, HEIGHT, 50.0),
            Err(PoseError::DegenerateGeometry)
        ));
    }

    #[test]
    fn solver_rebuilds_when_image_width_changes() {
        let mut estimator = PoseEstimator::new();
        let corners = [
            Point2::new(270.0, 190.0),
            Point2::new(370.0, 190.0),
            Point2::new(370.0, 290.0),
            Point2::new(270.0, 290.0),
        ];

        estimator.estimate(&corners, 640, 480, 50.0).unwrap();
        assert_eq!(estimator.cached_focal(), Some(640.0));

        estimator.estimate(&corners, 1280, 720, 50.0).unwrap();
        assert_eq!(estimator.cached_focal(), Some(1280.0));
    }

    #[test]
    fn near_degenerate_input_still_reports_a_residual() {
        let mut estimator = PoseEstimator::new();
        // Nearly edge-on: a very flat quad, but not exactly collinear.
        let corners = [
            Point2::new(200.0, 240.0),
            Point2::new(300.0, 241.0),
            Point2::new(400.0, 242.5),
            Point2::new(500.0, 243.0),
        ];
        let pose = estimator.estimate(&corners, WIDTH, HEIGHT, 50.0).unwrap();
        assert!(pose.error.is_finite());
    }
}
