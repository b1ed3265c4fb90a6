use crate::Error;

/// Scale-dependent tolerances derived once from the nominal point spacing
/// of the data set. Immutable after construction.
///
/// The factors are applied to the unit-in-the-last-place of the spacing
/// raised to the power matching the units of each predicate: half-plane
/// and Delaunay results carry squared-length units, the in-circle
/// determinant carries fourth-power units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
  nominal_point_spacing: f64,
  precision_threshold: f64,
  half_plane_threshold: f64,
  delaunay_threshold: f64,
  in_circle_threshold: f64,
  circumcircle_determinant_threshold: f64,
  vertex_tolerance: f64,
  vertex_tolerance_sq: f64,
}

const PRECISION_THRESHOLD_FACTOR: f64 = 256.0;
const HALF_PLANE_THRESHOLD_FACTOR: f64 = 256.0;
const DELAUNAY_THRESHOLD_FACTOR: f64 = 256.0;
const IN_CIRCLE_THRESHOLD_FACTOR: f64 = 1_048_576.0;
const VERTEX_TOLERANCE_DIVISOR: f64 = 1.0e5;

// Distance to the next representable double above |x|.
fn ulp(x: f64) -> f64 {
  let x = x.abs();
  if !x.is_finite() {
    return f64::NAN;
  }
  let next = f64::from_bits(x.to_bits() + 1);
  next - x
}

impl Thresholds {
  /// Fails with `Error::NominalSpacingOutOfRange` unless the spacing is a
  /// finite positive value.
  pub fn new(nominal_point_spacing: f64) -> Result<Thresholds, Error> {
    if !nominal_point_spacing.is_finite() || nominal_point_spacing <= 0.0 {
      return Err(Error::NominalSpacingOutOfRange);
    }
    let s = nominal_point_spacing;
    let s2 = s * s;
    let in_circle_threshold = IN_CIRCLE_THRESHOLD_FACTOR * ulp(s2 * s2);
    let vertex_tolerance = s / VERTEX_TOLERANCE_DIVISOR;
    Ok(Thresholds {
      nominal_point_spacing: s,
      precision_threshold: PRECISION_THRESHOLD_FACTOR * ulp(s),
      half_plane_threshold: HALF_PLANE_THRESHOLD_FACTOR * ulp(s2),
      delaunay_threshold: DELAUNAY_THRESHOLD_FACTOR * ulp(s2),
      in_circle_threshold,
      // restores the squared-length units of the circumcircle determinant
      circumcircle_determinant_threshold: in_circle_threshold / s2,
      vertex_tolerance,
      vertex_tolerance_sq: vertex_tolerance * vertex_tolerance,
    })
  }

  pub fn nominal_point_spacing(&self) -> f64 {
    self.nominal_point_spacing
  }

  pub fn precision_threshold(&self) -> f64 {
    self.precision_threshold
  }

  pub fn half_plane_threshold(&self) -> f64 {
    self.half_plane_threshold
  }

  pub fn delaunay_threshold(&self) -> f64 {
    self.delaunay_threshold
  }

  pub fn in_circle_threshold(&self) -> f64 {
    self.in_circle_threshold
  }

  pub fn circumcircle_determinant_threshold(&self) -> f64 {
    self.circumcircle_determinant_threshold
  }

  pub fn vertex_tolerance(&self) -> f64 {
    self.vertex_tolerance
  }

  pub fn vertex_tolerance_sq(&self) -> f64 {
    self.vertex_tolerance_sq
  }
}

impl Default for Thresholds {
  fn default() -> Thresholds {
    Thresholds::new(1.0).unwrap()
  }
}
