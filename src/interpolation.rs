use crate::algorithms::triangulation::{IncrementalTin, TinNavigator};
use crate::data::Vertex;
use crate::predicates;

/// Maps a vertex to the value being interpolated. The default reads z;
/// callers substitute their own to interpolate other per-vertex data.
pub trait VertexValuator {
  fn value(&self, vertex: &Vertex) -> f64;
}

/// The default valuator: the vertex elevation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZValuator;

impl VertexValuator for ZValuator {
  fn value(&self, vertex: &Vertex) -> f64 {
    vertex.z()
  }
}

/// Surface-interpolation contract consumed by the refiner and by the
/// constraint processor's z pre-interpolation. NaN signals failure.
pub trait Interpolator {
  fn interpolate(&mut self, x: f64, y: f64) -> f64 {
    self.interpolate_with_valuator(x, y, &ZValuator)
  }

  fn interpolate_with_valuator(&mut self, x: f64, y: f64, valuator: &dyn VertexValuator) -> f64;

  fn interpolate_with_exterior_support(&mut self, x: f64, y: f64) -> f64 {
    self.interpolate_with_exterior_support_valuator(x, y, &ZValuator)
  }

  fn interpolate_with_exterior_support_valuator(
    &mut self,
    x: f64,
    y: f64,
    valuator: &dyn VertexValuator,
  ) -> f64;
}

/// Linear interpolation over the triangular facet containing the query:
/// barycentric weights over the three corners. Queries outside the hull
/// return NaN unless exterior support is requested, in which case the
/// query projects onto the nearest perimeter edge.
pub struct TriangularFacetInterpolator<'a> {
  tin: &'a IncrementalTin,
  navigator: TinNavigator<'a>,
}

impl<'a> TriangularFacetInterpolator<'a> {
  pub fn new(tin: &'a IncrementalTin) -> TriangularFacetInterpolator<'a> {
    TriangularFacetInterpolator {
      tin,
      navigator: tin.navigator(),
    }
  }
}

impl<'a> Interpolator for TriangularFacetInterpolator<'a> {
  fn interpolate_with_valuator(&mut self, x: f64, y: f64, valuator: &dyn VertexValuator) -> f64 {
    let tri = match self.navigator.containing_triangle(x, y) {
      Some(tri) => tri,
      None => return f64::NAN,
    };
    let a = tri.vertex_a();
    let b = tri.vertex_b();
    let c = tri.vertex_c();
    let q = [x, y];
    let total = predicates::area(&a.coords(), &b.coords(), &c.coords());
    if total <= 0.0 || !total.is_finite() {
      return f64::NAN;
    }
    let wa = predicates::area(&q, &b.coords(), &c.coords());
    let wb = predicates::area(&a.coords(), &q, &c.coords());
    let wc = predicates::area(&a.coords(), &b.coords(), &q);
    (wa * valuator.value(a) + wb * valuator.value(b) + wc * valuator.value(c)) / total
  }

  fn interpolate_with_exterior_support_valuator(
    &mut self,
    x: f64,
    y: f64,
    valuator: &dyn VertexValuator,
  ) -> f64 {
    let interior = self.interpolate_with_valuator(x, y, valuator);
    if !interior.is_nan() {
      return interior;
    }
    // project the query onto the nearest perimeter edge and interpolate
    // linearly along it
    let mut best = f64::INFINITY;
    let mut value = f64::NAN;
    for edge in self.tin.perimeter() {
      let a = edge.a();
      let b = edge.b();
      let dx = b.x() - a.x();
      let dy = b.y() - a.y();
      let len_sq = dx * dx + dy * dy;
      if len_sq <= 0.0 {
        continue;
      }
      let t = (((x - a.x()) * dx + (y - a.y()) * dy) / len_sq).clamp(0.0, 1.0);
      let px = a.x() + t * dx;
      let py = a.y() + t * dy;
      let d = (x - px) * (x - px) + (y - py) * (y - py);
      if d < best {
        best = d;
        value = valuator.value(a) * (1.0 - t) + valuator.value(b) * t;
      }
    }
    value
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn v(x: f64, y: f64, z: f64) -> Vertex {
    Vertex::new(x, y, z)
  }

  fn planar_tin() -> IncrementalTin {
    // points sampled from z = 2x + 3y + 1
    let mut tin = IncrementalTin::new(1.0).unwrap();
    let mut pts = Vec::new();
    for i in 0..4 {
      for j in 0..4 {
        let (x, y) = (i as f64, j as f64);
        pts.push(v(x, y, 2.0 * x + 3.0 * y + 1.0));
      }
    }
    tin.add_vertices(pts).unwrap();
    tin
  }

  #[test]
  fn facet_interpolation_reproduces_a_plane() {
    let tin = planar_tin();
    let mut interp = TriangularFacetInterpolator::new(&tin);
    for (x, y) in [(0.5, 0.5), (1.25, 2.75), (2.9, 0.1), (1.0, 1.0)] {
      let got = interp.interpolate(x, y);
      let want = 2.0 * x + 3.0 * y + 1.0;
      assert!((got - want).abs() < 1e-9, "({}, {}) -> {} != {}", x, y, got, want);
    }
  }

  #[test]
  fn exterior_queries_fail_without_support() {
    let tin = planar_tin();
    let mut interp = TriangularFacetInterpolator::new(&tin);
    assert!(interp.interpolate(10.0, 10.0).is_nan());
    // with exterior support the query lands on the hull
    let got = interp.interpolate_with_exterior_support(4.0, 1.5);
    let want = 2.0 * 3.0 + 3.0 * 1.5 + 1.0; // projected to x = 3
    assert!((got - want).abs() < 1e-9);
  }

  #[test]
  fn custom_valuator_is_honored() {
    struct Doubler;
    impl VertexValuator for Doubler {
      fn value(&self, vertex: &Vertex) -> f64 {
        2.0 * vertex.z()
      }
    }
    let tin = planar_tin();
    let mut interp = TriangularFacetInterpolator::new(&tin);
    let got = interp.interpolate_with_valuator(1.5, 1.5, &Doubler);
    let want = 2.0 * (2.0 * 1.5 + 3.0 * 1.5 + 1.0);
    assert!((got - want).abs() < 1e-9);
  }
}
