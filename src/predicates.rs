use std::cell::Cell;

use crate::data::Circumcircle;
use crate::extended::DoubleDouble;
use crate::thresholds::Thresholds;

/// Twice the signed area of the triangle (a, b, c). Positive when the
/// points wind counterclockwise.
pub fn area(a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]) -> f64 {
  (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// Counters describing how often each predicate ran and how often it had
/// to promote to extended precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredicateDiagnostics {
  pub half_plane_calls: u64,
  pub half_plane_extended: u64,
  pub in_circle_calls: u64,
  pub in_circle_extended: u64,
  pub circumcircle_calls: u64,
  pub circumcircle_extended: u64,
}

/// Geometric predicates with an adaptive extended-precision fallback.
///
/// Every predicate computes in plain doubles first and re-runs in
/// [`DoubleDouble`] arithmetic only when the double result falls below the
/// scale-dependent threshold for that operation. All predicates are total:
/// degeneracies surface as zero signs or infinite circumcircles, never as
/// panics.
#[derive(Debug, Clone)]
pub struct Predicates {
  thresholds: Thresholds,
  half_plane_calls: Cell<u64>,
  half_plane_extended: Cell<u64>,
  in_circle_calls: Cell<u64>,
  in_circle_extended: Cell<u64>,
  circumcircle_calls: Cell<u64>,
  circumcircle_extended: Cell<u64>,
}

impl Predicates {
  pub fn new(thresholds: Thresholds) -> Predicates {
    Predicates {
      thresholds,
      half_plane_calls: Cell::new(0),
      half_plane_extended: Cell::new(0),
      in_circle_calls: Cell::new(0),
      in_circle_extended: Cell::new(0),
      circumcircle_calls: Cell::new(0),
      circumcircle_extended: Cell::new(0),
    }
  }

  pub fn thresholds(&self) -> &Thresholds {
    &self.thresholds
  }

  pub fn diagnostics(&self) -> PredicateDiagnostics {
    PredicateDiagnostics {
      half_plane_calls: self.half_plane_calls.get(),
      half_plane_extended: self.half_plane_extended.get(),
      in_circle_calls: self.in_circle_calls.get(),
      in_circle_extended: self.in_circle_extended.get(),
      circumcircle_calls: self.circumcircle_calls.get(),
      circumcircle_extended: self.circumcircle_extended.get(),
    }
  }

  pub fn reset_diagnostics(&self) {
    self.half_plane_calls.set(0);
    self.half_plane_extended.set(0);
    self.in_circle_calls.set(0);
    self.in_circle_extended.set(0);
    self.circumcircle_calls.set(0);
    self.circumcircle_extended.set(0);
  }

  /// Sign of c relative to the directed line a -> b, positive on the left.
  /// Promotes to extended precision below the half-plane threshold.
  pub fn half_plane(&self, a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]) -> f64 {
    self.half_plane_calls.set(self.half_plane_calls.get() + 1);
    let det = area(a, b, c);
    if det.abs() >= self.thresholds.half_plane_threshold() {
      return det;
    }
    self.half_plane_extended.set(self.half_plane_extended.get() + 1);
    area_extended(a, b, c).to_f64()
  }

  /// Same sign as [`area`], refined adaptively.
  pub fn orientation(&self, a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]) -> f64 {
    self.half_plane(a, b, c)
  }

  /// Collapses [`Predicates::orientation`] to -1, 0, or +1.
  pub fn orientation_test(&self, a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]) -> i32 {
    sign(self.orientation(a, b, c))
  }

  /// Positive when d lies strictly inside the circumcircle of the
  /// counterclockwise triangle (a, b, c), negative outside, near zero on
  /// the circle.
  pub fn in_circle(&self, a: &[f64; 2], b: &[f64; 2], c: &[f64; 2], d: &[f64; 2]) -> f64 {
    self.in_circle_calls.set(self.in_circle_calls.get() + 1);
    let adx = a[0] - d[0];
    let ady = a[1] - d[1];
    let bdx = b[0] - d[0];
    let bdy = b[1] - d[1];
    let cdx = c[0] - d[0];
    let cdy = c[1] - d[1];
    let det = (adx * adx + ady * ady) * (bdx * cdy - cdx * bdy)
      + (bdx * bdx + bdy * bdy) * (cdx * ady - adx * cdy)
      + (cdx * cdx + cdy * cdy) * (adx * bdy - bdx * ady);
    if det.abs() >= self.thresholds.in_circle_threshold() {
      return det;
    }
    self.in_circle_extended.set(self.in_circle_extended.get() + 1);
    in_circle_extended(a, b, c, d).to_f64()
  }

  /// Collapses [`Predicates::in_circle`] to -1, 0, or +1.
  pub fn in_circle_test(&self, a: &[f64; 2], b: &[f64; 2], c: &[f64; 2], d: &[f64; 2]) -> i32 {
    sign(self.in_circle(a, b, c, d))
  }

  /// Fills `circle` with the circumcircle of (a, b, c). Returns false and
  /// fills the infinite sentinel when the points are collinear within
  /// threshold.
  pub fn circumcircle(
    &self,
    a: &[f64; 2],
    b: &[f64; 2],
    c: &[f64; 2],
    circle: &mut Circumcircle,
  ) -> bool {
    self.circumcircle_calls.set(self.circumcircle_calls.get() + 1);
    let bx = b[0] - a[0];
    let by = b[1] - a[1];
    let cx = c[0] - a[0];
    let cy = c[1] - a[1];
    let det = 2.0 * (bx * cy - by * cx);
    if det.abs() >= self.thresholds.circumcircle_determinant_threshold() {
      let b2 = bx * bx + by * by;
      let c2 = cx * cx + cy * cy;
      let ux = (cy * b2 - by * c2) / det;
      let uy = (bx * c2 - cx * b2) / det;
      *circle = Circumcircle::new(a[0] + ux, a[1] + uy, ux * ux + uy * uy);
      return true;
    }
    self.circumcircle_extended.set(self.circumcircle_extended.get() + 1);
    let bx = DoubleDouble::from_difference(b[0], a[0]);
    let by = DoubleDouble::from_difference(b[1], a[1]);
    let cx = DoubleDouble::from_difference(c[0], a[0]);
    let cy = DoubleDouble::from_difference(c[1], a[1]);
    let det = (bx * cy - by * cx) * 2.0;
    if det.signum() == 0 || !det.is_finite() {
      *circle = Circumcircle::undefined();
      return false;
    }
    let b2 = bx.square() + by.square();
    let c2 = cx.square() + cy.square();
    let ux = (cy * b2 - by * c2) / det;
    let uy = (bx * c2 - cx * b2) / det;
    let r2 = ux.square() + uy.square();
    *circle = Circumcircle::new(
      (ux + a[0]).to_f64(),
      (uy + a[1]).to_f64(),
      r2.to_f64(),
    );
    true
  }
}

fn sign(value: f64) -> i32 {
  if value > 0.0 {
    1
  } else if value < 0.0 {
    -1
  } else {
    0
  }
}

fn area_extended(a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]) -> DoubleDouble {
  let bx = DoubleDouble::from_difference(b[0], a[0]);
  let by = DoubleDouble::from_difference(b[1], a[1]);
  let cx = DoubleDouble::from_difference(c[0], a[0]);
  let cy = DoubleDouble::from_difference(c[1], a[1]);
  bx * cy - by * cx
}

fn in_circle_extended(
  a: &[f64; 2],
  b: &[f64; 2],
  c: &[f64; 2],
  d: &[f64; 2],
) -> DoubleDouble {
  let adx = DoubleDouble::from_difference(a[0], d[0]);
  let ady = DoubleDouble::from_difference(a[1], d[1]);
  let bdx = DoubleDouble::from_difference(b[0], d[0]);
  let bdy = DoubleDouble::from_difference(b[1], d[1]);
  let cdx = DoubleDouble::from_difference(c[0], d[0]);
  let cdy = DoubleDouble::from_difference(c[1], d[1]);
  (adx.square() + ady.square()) * (bdx * cdy - cdx * bdy)
    + (bdx.square() + bdy.square()) * (cdx * ady - adx * cdy)
    + (cdx.square() + cdy.square()) * (adx * bdy - bdx * ady)
}
