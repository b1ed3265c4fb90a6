use std::any::Any;
use std::rc::Rc;

use crate::data::vertex::Vertex;
use crate::predicates;
use crate::Error;

/// A caller-supplied constraint: an ordered chain of vertices forced into
/// the mesh as edges. The TIN takes ownership after `add_constraints`
/// completes and assigns the constraint its index.
///
/// Vertex replacement: when an endpoint falls within vertex tolerance of
/// an existing TIN vertex, the existing vertex is substituted. The stored
/// constraint reflects the vertices actually used, via `with_geometry`.
pub trait Constraint {
  fn vertices(&self) -> &[Vertex];

  /// True for polygon constraints, which bound a region.
  fn defines_constrained_region(&self) -> bool;

  /// Holes invert the membership polarity of the region they bound.
  fn is_hole(&self) -> bool;

  fn constraint_index(&self) -> Option<usize>;

  fn set_constraint_index(&mut self, index: usize);

  fn application_data(&self) -> Option<Rc<dyn Any>>;

  fn set_application_data(&mut self, data: Rc<dyn Any>);

  /// Same constraint kind and attributes over a different vertex chain.
  fn with_geometry(&self, vertices: Vec<Vertex>) -> Box<dyn Constraint>;

  fn clone_box(&self) -> Box<dyn Constraint>;
}

impl Clone for Box<dyn Constraint> {
  fn clone(&self) -> Box<dyn Constraint> {
    self.clone_box()
  }
}

impl std::fmt::Debug for Box<dyn Constraint> {
  fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(
      fmt,
      "Constraint(region={}, hole={}, n={}, index={:?})",
      self.defines_constrained_region(),
      self.is_hole(),
      self.vertices().len(),
      self.constraint_index()
    )
  }
}

/// An open chain of two or more vertices; never a region.
#[derive(Clone, Default)]
pub struct LinearConstraint {
  vertices: Vec<Vertex>,
  constraint_index: Option<usize>,
  application_data: Option<Rc<dyn Any>>,
}

impl LinearConstraint {
  pub fn new() -> LinearConstraint {
    LinearConstraint::default()
  }

  pub fn from_vertices(vertices: Vec<Vertex>) -> LinearConstraint {
    LinearConstraint {
      vertices,
      constraint_index: None,
      application_data: None,
    }
  }

  pub fn add_vertex(&mut self, v: Vertex) {
    self.vertices.push(v);
  }

  pub fn segment_count(&self) -> usize {
    self.vertices.len().saturating_sub(1)
  }

  pub fn is_valid(&self) -> bool {
    self.vertices.len() >= 2
  }
}

impl Constraint for LinearConstraint {
  fn vertices(&self) -> &[Vertex] {
    &self.vertices
  }

  fn defines_constrained_region(&self) -> bool {
    false
  }

  fn is_hole(&self) -> bool {
    false
  }

  fn constraint_index(&self) -> Option<usize> {
    self.constraint_index
  }

  fn set_constraint_index(&mut self, index: usize) {
    self.constraint_index = Some(index);
  }

  fn application_data(&self) -> Option<Rc<dyn Any>> {
    self.application_data.clone()
  }

  fn set_application_data(&mut self, data: Rc<dyn Any>) {
    self.application_data = Some(data);
  }

  fn with_geometry(&self, vertices: Vec<Vertex>) -> Box<dyn Constraint> {
    Box::new(LinearConstraint {
      vertices,
      constraint_index: self.constraint_index,
      application_data: self.application_data.clone(),
    })
  }

  fn clone_box(&self) -> Box<dyn Constraint> {
    Box::new(self.clone())
  }
}

/// A closed polygon of three or more vertices bounding a region.
///
/// `complete` fixes the winding: ordinary regions become counterclockwise,
/// holes clockwise. The vertex chain is stored open (the closing segment
/// from last back to first is implied).
#[derive(Clone, Default)]
pub struct PolygonConstraint {
  vertices: Vec<Vertex>,
  is_hole: bool,
  complete: bool,
  constraint_index: Option<usize>,
  application_data: Option<Rc<dyn Any>>,
}

impl PolygonConstraint {
  pub fn new() -> PolygonConstraint {
    PolygonConstraint::default()
  }

  pub fn from_vertices(vertices: Vec<Vertex>) -> PolygonConstraint {
    let mut p = PolygonConstraint {
      vertices,
      ..PolygonConstraint::default()
    };
    p.complete();
    p
  }

  pub fn new_hole(vertices: Vec<Vertex>) -> PolygonConstraint {
    let mut p = PolygonConstraint {
      vertices,
      is_hole: true,
      ..PolygonConstraint::default()
    };
    p.complete();
    p
  }

  pub fn add_vertex(&mut self, v: Vertex) {
    debug_assert!(!self.complete, "vertex added to a completed polygon");
    self.vertices.push(v);
  }

  /// Closes the polygon, dropping a duplicated closing vertex if the
  /// caller supplied one, and fixes the winding for the hole polarity.
  pub fn complete(&mut self) {
    if self.complete {
      return;
    }
    if self.vertices.len() > 1 {
      let first = self.vertices[0];
      let last = *self.vertices.last().unwrap();
      if first.x() == last.x() && first.y() == last.y() {
        self.vertices.pop();
      }
    }
    let ccw = self.signed_area() > 0.0;
    if ccw == self.is_hole {
      self.vertices.reverse();
    }
    self.complete = true;
  }

  pub fn is_valid(&self) -> bool {
    self.vertices.len() >= 3 && self.signed_area() != 0.0
  }

  /// Rejects chains whose segments cross; shared endpoints of adjacent
  /// segments do not count.
  pub fn validate_simple(&self) -> Result<(), Error> {
    if ring_is_simple(&self.vertices) {
      Ok(())
    } else {
      Err(Error::SelfIntersectingConstraint)
    }
  }

  pub fn signed_area(&self) -> f64 {
    ring_signed_area(&self.vertices)
  }

  pub fn area(&self) -> f64 {
    self.signed_area().abs()
  }

  pub fn perimeter(&self) -> f64 {
    let n = self.vertices.len();
    if n < 2 {
      return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
      sum += self.vertices[i].distance(&self.vertices[(i + 1) % n]);
    }
    sum
  }

  pub fn is_counterclockwise(&self) -> bool {
    self.signed_area() > 0.0
  }

  /// Ray-cast membership test against the polygon boundary itself (not
  /// the embedded mesh edges). Hole polarity is the caller's concern.
  pub fn is_point_inside(&self, x: f64, y: f64) -> bool {
    ring_contains(&self.vertices, x, y)
  }
}

/// Shoelace area of a closed ring given as an open vertex chain.
pub(crate) fn ring_signed_area(vertices: &[Vertex]) -> f64 {
  let n = vertices.len();
  if n < 3 {
    return 0.0;
  }
  let mut sum = 0.0;
  for i in 0..n {
    let p = &vertices[i];
    let q = &vertices[(i + 1) % n];
    sum += p.x() * q.y() - q.x() * p.y();
  }
  sum / 2.0
}

/// True when no two non-adjacent segments of the closed ring cross.
pub(crate) fn ring_is_simple(vertices: &[Vertex]) -> bool {
  let n = vertices.len();
  for i in 0..n {
    let (a1, a2) = (&vertices[i], &vertices[(i + 1) % n]);
    for j in i + 1..n {
      // skip segments adjacent to segment i
      if j == i || (j + 1) % n == i || (i + 1) % n == j {
        continue;
      }
      let (b1, b2) = (&vertices[j], &vertices[(j + 1) % n]);
      if segments_cross(a1, a2, b1, b2) {
        return false;
      }
    }
  }
  true
}

/// Even-odd ray cast against a closed ring given as an open vertex chain.
pub(crate) fn ring_contains(vertices: &[Vertex], x: f64, y: f64) -> bool {
  let n = vertices.len();
  if n < 3 {
    return false;
  }
  let mut inside = false;
  let mut j = n - 1;
  for i in 0..n {
    let pi = &vertices[i];
    let pj = &vertices[j];
    if (pi.y() > y) != (pj.y() > y) {
      let x_cross = pj.x() + (pi.x() - pj.x()) * (y - pj.y()) / (pi.y() - pj.y());
      if x < x_cross {
        inside = !inside;
      }
    }
    j = i;
  }
  inside
}

impl Constraint for PolygonConstraint {
  fn vertices(&self) -> &[Vertex] {
    &self.vertices
  }

  fn defines_constrained_region(&self) -> bool {
    true
  }

  fn is_hole(&self) -> bool {
    self.is_hole
  }

  fn constraint_index(&self) -> Option<usize> {
    self.constraint_index
  }

  fn set_constraint_index(&mut self, index: usize) {
    self.constraint_index = Some(index);
  }

  fn application_data(&self) -> Option<Rc<dyn Any>> {
    self.application_data.clone()
  }

  fn set_application_data(&mut self, data: Rc<dyn Any>) {
    self.application_data = Some(data);
  }

  fn with_geometry(&self, vertices: Vec<Vertex>) -> Box<dyn Constraint> {
    let mut p = PolygonConstraint {
      vertices,
      is_hole: self.is_hole,
      complete: false,
      constraint_index: self.constraint_index,
      application_data: self.application_data.clone(),
    };
    p.complete();
    Box::new(p)
  }

  fn clone_box(&self) -> Box<dyn Constraint> {
    Box::new(self.clone())
  }
}

// Proper crossing or one endpoint strictly interior to the other segment.
fn segments_cross(a1: &Vertex, a2: &Vertex, b1: &Vertex, b2: &Vertex) -> bool {
  let d1 = predicates::area(&b1.coords(), &b2.coords(), &a1.coords());
  let d2 = predicates::area(&b1.coords(), &b2.coords(), &a2.coords());
  let d3 = predicates::area(&a1.coords(), &a2.coords(), &b1.coords());
  let d4 = predicates::area(&a1.coords(), &a2.coords(), &b2.coords());
  ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
    && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}
