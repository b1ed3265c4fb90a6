use std::collections::{HashSet, VecDeque};

use log::{debug, warn};

use crate::algorithms::triangulation::incremental::{IncrementalTin, Insertion};
use crate::data::constraint::ring_is_simple;
use crate::data::quad_edge::{EdgeId, MAX_CONSTRAINT_INDEX};
use crate::data::vertex::{Vertex, VertexId};
use crate::data::Constraint;
use crate::interpolation::{Interpolator, TriangularFacetInterpolator};
use crate::Error;

type Result<T> = std::result::Result<T, Error>;

/// Options for [`IncrementalTin::add_constraints_with_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintOptions {
  /// Re-Delaunize the edges exposed by constraint tunnelling afterwards.
  pub restore_conformity: bool,
  /// Fill NaN z values of constraint vertices from the pre-constraint
  /// surface through a transient triangular-facet interpolation.
  pub pre_interpolate_z: bool,
}

// How the final edges of one constraint chain get marked.
#[derive(Debug, Clone, Copy)]
enum ConstraintMark {
  Line(usize),
  Border(usize),
}

enum Scan {
  /// A mesh vertex sits on the segment; process the two halves.
  Intermediate(VertexId),
  /// Edges crossed by the segment, in order from the start vertex.
  Crossings(VecDeque<EdgeId>),
}

enum Resolution {
  Done,
  /// Flipping cannot progress past this edge; split it at the segment
  /// intersection.
  Blocked(EdgeId),
}

impl IncrementalTin {
  /// Embeds the constraints into the mesh and takes ownership of them.
  /// Polygon (region) constraints are processed first and constraint
  /// indices are assigned in processing order.
  pub fn add_constraints(
    &mut self,
    constraints: Vec<Box<dyn Constraint>>,
    restore_conformity: bool,
  ) -> Result<()> {
    self.add_constraints_with_options(
      constraints,
      ConstraintOptions {
        restore_conformity,
        pre_interpolate_z: false,
      },
    )
  }

  pub fn add_constraints_with_options(
    &mut self,
    mut constraints: Vec<Box<dyn Constraint>>,
    options: ConstraintOptions,
  ) -> Result<()> {
    self.check_mutable()?;
    if constraints.is_empty() {
      return Err(Error::EmptyConstraintList);
    }
    if !self.is_bootstrapped() {
      return Err(Error::NotBootstrapped);
    }
    if self.constraints.len() + constraints.len() > MAX_CONSTRAINT_INDEX + 1 {
      return Err(Error::TooManyConstraints);
    }
    for c in &constraints {
      if c.defines_constrained_region() {
        if c.vertices().len() < 3 {
          return Err(Error::InsufficientVertices);
        }
        if !ring_is_simple(c.vertices()) {
          return Err(Error::SelfIntersectingConstraint);
        }
      } else if c.vertices().len() < 2 {
        return Err(Error::InsufficientVertices);
      }
    }

    if options.pre_interpolate_z {
      self.pre_interpolate_z(&mut constraints);
    }

    // polygons first, linear constraints after
    let (regions, lines): (Vec<_>, Vec<_>) = constraints
      .into_iter()
      .partition(|c| c.defines_constrained_region());

    let mut exposed: Vec<EdgeId> = Vec::new();
    for c in regions.into_iter().chain(lines) {
      let index = self.constraints.len();
      let is_region = c.defines_constrained_region();
      let mark = if is_region {
        ConstraintMark::Border(index)
      } else {
        ConstraintMark::Line(index)
      };
      let (used, border_seeds) = self.embed_constraint_chain(&*c, mark, &mut exposed)?;
      let mut completed = c.with_geometry(used);
      completed.set_constraint_index(index);
      let is_hole = completed.is_hole();
      self.constraints.push(completed);
      if is_region {
        self.region_constraint_count += 1;
        if !is_hole {
          self.flood_fill_region(index, &border_seeds);
        }
      }
      debug!("constraint {} embedded ({} seed edges)", index, border_seeds.len());
    }

    if options.restore_conformity {
      let mut stack = exposed;
      self.restore_delaunay(&mut stack);
    }
    Ok(())
  }

  // Replaces NaN z values using the surface that exists before any of the
  // new constraints mutate the mesh. Failures stay NaN.
  fn pre_interpolate_z(&mut self, constraints: &mut [Box<dyn Constraint>]) {
    let mut replacements: Vec<Option<Vec<Vertex>>> = Vec::with_capacity(constraints.len());
    {
      let mut interp = TriangularFacetInterpolator::new(self);
      for c in constraints.iter() {
        if !c.vertices().iter().any(|v| v.z().is_nan()) {
          replacements.push(None);
          continue;
        }
        let updated = c
          .vertices()
          .iter()
          .map(|v| {
            if v.z().is_nan() {
              v.with_z(interp.interpolate_with_exterior_support(v.x(), v.y()))
            } else {
              *v
            }
          })
          .collect();
        replacements.push(Some(updated));
      }
    }
    for (c, replacement) in constraints.iter_mut().zip(replacements) {
      if let Some(vertices) = replacement {
        *c = c.with_geometry(vertices);
      }
    }
  }

  // Inserts the chain vertices (substituting nearby existing vertices),
  // embeds every segment, and returns the vertices actually used plus the
  // directed border-seed edges for region flood fill.
  fn embed_constraint_chain(
    &mut self,
    constraint: &dyn Constraint,
    mark: ConstraintMark,
    exposed: &mut Vec<EdgeId>,
  ) -> Result<(Vec<Vertex>, Vec<EdgeId>)> {
    let closed = constraint.defines_constrained_region();

    let mut ids: Vec<VertexId> = Vec::with_capacity(constraint.vertices().len());
    for v in constraint.vertices() {
      let id = match self.insert_coordinates(v.as_constraint_member()) {
        Insertion::Inserted(id) => id,
        Insertion::Merged(id) => {
          // vertex replacement: the nearby existing vertex substitutes
          self.vertices[id.as_usize()] = self.vertices[id.as_usize()].as_constraint_member();
          id
        }
      };
      if ids.last() != Some(&id) {
        ids.push(id);
      }
    }
    if closed && ids.len() > 1 && ids.first() == ids.last() {
      ids.pop();
    }
    if (closed && ids.len() < 3) || (!closed && ids.len() < 2) {
      return Err(Error::InsufficientVertices);
    }

    let mut used: Vec<Vertex> = ids.iter().map(|&id| *self.vertex(id)).collect();
    if closed {
      // regions run counterclockwise, holes clockwise, so the interior of
      // the flood always lies left of the travel direction
      let ccw = crate::data::constraint::ring_signed_area(&used) > 0.0;
      if ccw == constraint.is_hole() {
        ids.reverse();
        used.reverse();
      }
    }
    let mut seeds = Vec::new();
    let n = ids.len();
    let last = if closed { n } else { n - 1 };
    for i in 0..last {
      self.embed_segment(ids[i], ids[(i + 1) % n], mark, exposed, &mut seeds)?;
    }
    Ok((used, seeds))
  }

  // Forces the segment u -> v into the mesh: a direct edge is marked, a
  // vertex on the line splits the segment, and everything else tunnels by
  // flips with a Steiner split when a flip cannot progress.
  fn embed_segment(
    &mut self,
    u: VertexId,
    v: VertexId,
    mark: ConstraintMark,
    exposed: &mut Vec<EdgeId>,
    seeds: &mut Vec<EdgeId>,
  ) -> Result<()> {
    let mut work = vec![(u, v)];
    let mut guard = 0usize;
    while let Some((u, v)) = work.pop() {
      guard += 1;
      if guard > 4 * self.pool.count() + 64 {
        return Err(Error::InvariantViolation);
      }
      if u == v {
        continue;
      }
      if let Some(e) = self.find_edge_between(u, v) {
        self.mark_constraint_edge(e, mark, seeds);
        continue;
      }
      match self.scan_segment(u, v)? {
        Scan::Intermediate(w) => {
          work.push((w, v));
          work.push((u, w));
        }
        Scan::Crossings(list) => match self.resolve_crossings(u, v, list, exposed)? {
          Resolution::Done => {
            let e = self
              .find_edge_between(u, v)
              .ok_or(Error::InvariantViolation)?;
            self.mark_constraint_edge(e, mark, seeds);
          }
          Resolution::Blocked(edge) => {
            let w = self.split_crossing_edge(edge, u, v, exposed)?;
            work.push((w, v));
            work.push((u, w));
          }
        },
      }
    }
    Ok(())
  }

  fn mark_constraint_edge(&mut self, e: EdgeId, mark: ConstraintMark, seeds: &mut Vec<EdgeId>) {
    match mark {
      ConstraintMark::Line(k) => self.pool.set_constraint_line_index(e, k),
      ConstraintMark::Border(k) => {
        self.pool.set_constraint_region_border_index(e, k);
        seeds.push(e);
      }
    }
  }

  // Walks the triangles from u toward v and reports either a vertex lying
  // on the segment or the ordered list of crossed edges.
  fn scan_segment(&self, u: VertexId, v: VertexId) -> Result<Scan> {
    let pu = self.vertex(u).coords();
    let pv = self.vertex(v).coords();
    let anchor = self.edge_with_origin(u).ok_or(Error::InvariantViolation)?;

    for spoke in self.pool.pinwheel(anchor) {
      let a = self.pool.destination(spoke);
      if a.is_ghost() {
        continue;
      }
      let ahead = self.pool.forward(spoke);
      let b = self.pool.destination(ahead);
      if b.is_ghost() {
        continue;
      }
      let pa = self.vertex(a).coords();
      let pb = self.vertex(b).coords();
      let oa = self.predicates.orientation_test(&pu, &pa, &pv);
      if oa == 0 {
        if let Some(w) = self.vertex_between(u, v, a) {
          return Ok(Scan::Intermediate(w));
        }
        continue;
      }
      let ob = self.predicates.orientation_test(&pu, &pb, &pv);
      if ob == 0 {
        if let Some(w) = self.vertex_between(u, v, b) {
          return Ok(Scan::Intermediate(w));
        }
        continue;
      }
      if oa < 0 || ob > 0 {
        continue;
      }

      // the segment leaves u through the face (u, a, b)
      let mut crossing = ahead;
      let mut list = VecDeque::new();
      list.push_back(crossing);
      let mut guard = 0usize;
      loop {
        guard += 1;
        if guard > 2 * self.pool.count() + 16 {
          return Err(Error::InvariantViolation);
        }
        let across = crossing.dual();
        let e1 = self.pool.forward(across);
        let w = self.pool.destination(e1);
        if w == v {
          return Ok(Scan::Crossings(list));
        }
        if w.is_ghost() {
          return Err(Error::InvariantViolation);
        }
        if self.vertex_near_segment(&pu, &pv, w) {
          return Ok(Scan::Intermediate(w));
        }
        let pw = self.vertex(w).coords();
        let ow = self.predicates.orientation_test(&pu, &pv, &pw);
        crossing = if ow > 0 {
          e1
        } else {
          self.pool.forward(e1)
        };
        list.push_back(crossing);
      }
    }
    Err(Error::InvariantViolation)
  }

  // w counts as an intermediate vertex when its projection falls strictly
  // between u and v. Collinearity was established by the caller.
  fn vertex_between(&self, u: VertexId, v: VertexId, w: VertexId) -> Option<VertexId> {
    if w == u || w == v {
      return None;
    }
    let pu = self.vertex(u).coords();
    let pv = self.vertex(v).coords();
    let pw = self.vertex(w).coords();
    let dx = pv[0] - pu[0];
    let dy = pv[1] - pu[1];
    let t = ((pw[0] - pu[0]) * dx + (pw[1] - pu[1]) * dy) / (dx * dx + dy * dy);
    if t > 0.0 && t < 1.0 {
      Some(w)
    } else {
      None
    }
  }

  // True when w lies within the vertex tolerance of the open segment.
  fn vertex_near_segment(&self, pu: &[f64; 2], pv: &[f64; 2], w: VertexId) -> bool {
    let pw = self.vertex(w).coords();
    let dx = pv[0] - pu[0];
    let dy = pv[1] - pu[1];
    let len_sq = dx * dx + dy * dy;
    let t = ((pw[0] - pu[0]) * dx + (pw[1] - pu[1]) * dy) / len_sq;
    if t <= 0.0 || t >= 1.0 {
      return false;
    }
    let det = crate::predicates::area(pu, pv, &pw);
    det * det < self.thresholds().vertex_tolerance_sq() * len_sq
  }

  // Lawson tunnelling: flip crossing edges whose quadrilateral is convex
  // until none cross; report the edge that blocks progress otherwise.
  fn resolve_crossings(
    &mut self,
    u: VertexId,
    v: VertexId,
    mut queue: VecDeque<EdgeId>,
    exposed: &mut Vec<EdgeId>,
  ) -> Result<Resolution> {
    let mut stall = 0usize;
    let mut scratch = Vec::new();
    while let Some(e) = queue.pop_front() {
      if !self.pool.is_live(e) {
        continue;
      }
      if !self.edge_crosses_segment(e, u, v) {
        exposed.push(e);
        continue;
      }
      if self.pool.is_constrained(e) {
        return Ok(Resolution::Blocked(e));
      }
      let m = self.pool.destination(self.pool.forward(e));
      let w = self.pool.destination(self.pool.forward(e.dual()));
      if m.is_ghost() || w.is_ghost() {
        return Ok(Resolution::Blocked(e));
      }
      let pm = self.vertex(m).coords();
      let pw = self.vertex(w).coords();
      let px = self.vertex(self.pool.origin(e)).coords();
      let py = self.vertex(self.pool.destination(e)).coords();
      let s1 = self.predicates.orientation_test(&pm, &pw, &px);
      let s2 = self.predicates.orientation_test(&pm, &pw, &py);
      if s1 * s2 < 0 {
        // convex quadrilateral: the replacement diagonal separates the
        // old endpoints
        self.flip(e, &mut scratch);
        exposed.append(&mut scratch);
        stall = 0;
        if self.edge_crosses_segment(e, u, v) {
          queue.push_back(e);
        } else {
          exposed.push(e);
        }
      } else {
        stall += 1;
        if stall > queue.len() + 1 {
          warn!("constraint tunnelling blocked, inserting intersection vertex");
          return Ok(Resolution::Blocked(e));
        }
        queue.push_back(e);
      }
    }
    Ok(Resolution::Done)
  }

  fn edge_crosses_segment(&self, e: EdgeId, u: VertexId, v: VertexId) -> bool {
    let x = self.pool.origin(e);
    let y = self.pool.destination(e);
    if x == u || x == v || y == u || y == v || x.is_ghost() || y.is_ghost() {
      return false;
    }
    let pu = self.vertex(u).coords();
    let pv = self.vertex(v).coords();
    let px = self.vertex(x).coords();
    let py = self.vertex(y).coords();
    let s1 = self.predicates.orientation_test(&pu, &pv, &px);
    let s2 = self.predicates.orientation_test(&pu, &pv, &py);
    if s1 * s2 >= 0 {
      return false;
    }
    let s3 = self.predicates.orientation_test(&px, &py, &pu);
    let s4 = self.predicates.orientation_test(&px, &py, &pv);
    s3 * s4 < 0
  }

  // Splits the blocking edge at its intersection with the segment,
  // yielding a synthetic constraint-member vertex. When the intersection
  // degenerates onto an endpoint, that endpoint substitutes.
  fn split_crossing_edge(
    &mut self,
    e: EdgeId,
    u: VertexId,
    v: VertexId,
    exposed: &mut Vec<EdgeId>,
  ) -> Result<VertexId> {
    let a = self.pool.origin(e);
    let b = self.pool.destination(e);
    let pa = self.vertex(a).coords();
    let pb = self.vertex(b).coords();
    let pu = self.vertex(u).coords();
    let pv = self.vertex(v).coords();

    let ex = pb[0] - pa[0];
    let ey = pb[1] - pa[1];
    let sx = pv[0] - pu[0];
    let sy = pv[1] - pu[1];
    let denom = ex * sy - ey * sx;
    if denom == 0.0 {
      return Err(Error::InvariantViolation);
    }
    let t = ((pu[0] - pa[0]) * sy - (pu[1] - pa[1]) * sx) / denom;

    let len = (ex * ex + ey * ey).sqrt();
    let tol = self.thresholds().vertex_tolerance();
    if t * len < tol {
      // the intersection collapses onto an existing endpoint
      self.vertices[a.as_usize()] = self.vertices[a.as_usize()].as_constraint_member();
      return Ok(a);
    }
    if (1.0 - t) * len < tol {
      self.vertices[b.as_usize()] = self.vertices[b.as_usize()].as_constraint_member();
      return Ok(b);
    }

    let za = self.vertex(a).z();
    let zb = self.vertex(b).z();
    let vertex = Vertex::new(pa[0] + t * ex, pa[1] + t * ey, za + t * (zb - za))
      .with_index(self.next_synthetic_index())
      .as_synthetic()
      .as_constraint_member();
    let vid = self.store_vertex(vertex);
    let mut stack = Vec::new();
    self.split_edge_core(e, vid, &mut stack);
    exposed.append(&mut stack);
    Ok(vid)
  }

  // Breadth-first region marking: start at the border seeds (interior on
  // the left), mark every non-border edge of each reached face with the
  // interior index, and cross it; any border edge stops the flood.
  fn flood_fill_region(&mut self, k: usize, seeds: &[EdgeId]) {
    let mut queue: VecDeque<EdgeId> = seeds.iter().copied().collect();
    let mut visited: HashSet<EdgeId> = HashSet::new();
    while let Some(e) = queue.pop_front() {
      if !self.pool.is_live(e) {
        continue;
      }
      let key = self.face_key(e);
      if !visited.insert(key) {
        continue;
      }
      let edges = [e, self.pool.forward(e), self.pool.forward(self.pool.forward(e))];
      if edges
        .iter()
        .any(|&d| self.pool.origin(d).is_ghost() || self.pool.destination(d).is_ghost())
      {
        continue;
      }
      for d in edges {
        if self.pool.is_constraint_region_border(d) {
          continue;
        }
        self.pool.set_constraint_region_interior_index(d, k);
        queue.push_back(d.dual());
      }
    }
  }

  fn face_key(&self, e: EdgeId) -> EdgeId {
    let f = self.pool.forward(e);
    let r = self.pool.reverse(e);
    EdgeId((e.index().min(f.index()).min(r.index())) as u32)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::data::{LinearConstraint, PolygonConstraint};

  fn v(x: f64, y: f64) -> Vertex {
    Vertex::new(x, y, 0.0)
  }

  fn boxed(c: impl Constraint + 'static) -> Box<dyn Constraint> {
    Box::new(c)
  }

  #[test]
  fn linear_constraint_on_square_diagonal_row() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin
      .add_vertices(vec![
        v(0.0, 0.0),
        v(4.0, 0.0),
        v(4.0, 4.0),
        v(0.0, 4.0),
        v(2.0, 2.0),
      ])
      .unwrap();
    let c = LinearConstraint::from_vertices(vec![v(0.0, 2.0), v(4.0, 2.0)]);
    tin.add_constraints(vec![boxed(c)], true).unwrap();

    let marked: Vec<_> = tin
      .edges()
      .filter(|e| e.is_constraint_line_member())
      .collect();
    assert!(!marked.is_empty());
    for e in &marked {
      assert_eq!(e.constraint_line_index(), Some(0));
      assert!(e.is_constrained());
      assert!(e.dual().is_constrained());
    }
    assert!(tin.is_conformant());
    assert_eq!(tin.constraints().len(), 1);
    assert_eq!(tin.constraints()[0].constraint_index(), Some(0));
  }

  #[test]
  fn diamond_polygon_region() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin
      .add_vertices(vec![
        v(-2.0, -2.0),
        v(6.0, -2.0),
        v(6.0, 6.0),
        v(-2.0, 6.0),
        v(2.0, 2.0),
      ])
      .unwrap();
    let poly =
      PolygonConstraint::from_vertices(vec![v(0.0, 0.0), v(4.0, 0.0), v(2.0, 3.0)]);
    tin.add_constraints(vec![boxed(poly)], true).unwrap();

    let borders: Vec<_> = tin
      .edges()
      .filter(|e| e.constraint_region_border_index() == Some(0))
      .collect();
    assert_eq!(borders.len(), 3);
    for e in &borders {
      assert!(e.is_constrained());
      assert!(e.is_constraint_region_member());
    }
    // the background vertex (2, 2) sits inside the polygon, so the flood
    // reaches the three fan triangles around it
    let interior: Vec<_> = tin
      .edges()
      .filter(|e| e.constraint_region_interior_index() == Some(0))
      .collect();
    assert_eq!(interior.len(), 3);
    for e in &interior {
      assert!(!e.is_constrained());
      assert!(e.is_constraint_region_member());
    }
    assert!(tin.constraints()[0].defines_constrained_region());
    assert_eq!(tin.count_triangles().constrained, 3);
  }

  #[test]
  fn constraint_through_existing_vertex_splits() {
    // 3x3 grid at (400, 300) spacing; the constraint runs through the
    // center vertex and must split into two marked sub-segments
    let mut tin = IncrementalTin::new(300.0).unwrap();
    let mut pts = Vec::new();
    for i in 0..3 {
      for j in 0..3 {
        pts.push(v(i as f64 * 400.0, j as f64 * 300.0));
      }
    }
    tin.add_vertices(pts).unwrap();
    let c = LinearConstraint::from_vertices(vec![v(740.0, 60.0), v(60.0, 540.0)]);
    tin.add_constraints(vec![boxed(c)], true).unwrap();

    let marked: Vec<_> = tin
      .edges()
      .filter(|e| e.constraint_line_index() == Some(0))
      .collect();
    assert!(marked.len() >= 2);
    // the chain passes through the grid center
    let touches_center = marked
      .iter()
      .any(|e| e.a().coords() == [400.0, 300.0] || e.b().coords() == [400.0, 300.0]);
    assert!(touches_center);
  }

  #[test]
  fn vertex_replacement_substitutes_nearby_vertex() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin
      .add_vertices(vec![v(0.0, 0.0), v(4.0, 0.0), v(2.0, 3.0), v(2.0, -2.0)])
      .unwrap();
    // endpoint within vertex tolerance of (4, 0)
    let c = LinearConstraint::from_vertices(vec![v(0.0, 0.0), v(4.0 + 1e-7, 1e-7)]);
    let n = tin.vertex_count();
    tin.add_constraints(vec![boxed(c)], true).unwrap();
    assert_eq!(tin.vertex_count(), n);
    // the stored constraint reports the substituted vertex
    let stored = &tin.constraints()[0];
    assert_eq!(stored.vertices()[1].coords(), [4.0, 0.0]);
    assert!(stored.vertices()[1].is_constraint_member());
  }

  #[test]
  fn hole_marks_border_but_does_not_flood() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin
      .add_vertices(vec![
        v(-2.0, -2.0),
        v(6.0, -2.0),
        v(6.0, 6.0),
        v(-2.0, 6.0),
        v(2.0, 2.0),
      ])
      .unwrap();
    let hole = PolygonConstraint::new_hole(vec![v(0.0, 0.0), v(4.0, 0.0), v(2.0, 3.0)]);
    tin.add_constraints(vec![boxed(hole)], true).unwrap();
    assert_eq!(
      tin
        .edges()
        .filter(|e| e.constraint_region_border_index() == Some(0))
        .count(),
      3
    );
    assert_eq!(
      tin
        .edges()
        .filter(|e| e.is_constraint_region_interior())
        .count(),
      0
    );
  }

  #[test]
  fn constraint_api_rejects_bad_input() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin
      .add_vertices(vec![v(0.0, 0.0), v(1.0, 0.0), v(0.0, 1.0)])
      .unwrap();
    assert_eq!(
      tin.add_constraints(Vec::new(), true),
      Err(Error::EmptyConstraintList)
    );
    let short = LinearConstraint::from_vertices(vec![v(0.0, 0.0)]);
    assert_eq!(
      tin.add_constraints(vec![boxed(short)], true),
      Err(Error::InsufficientVertices)
    );
    let bowtie = PolygonConstraint::from_vertices(vec![
      v(0.0, 0.0),
      v(2.0, 2.0),
      v(2.0, 0.0),
      v(0.0, 2.0),
    ]);
    assert_eq!(
      tin.add_constraints(vec![boxed(bowtie)], true),
      Err(Error::SelfIntersectingConstraint)
    );
  }

  #[test]
  fn constraints_are_idempotent_under_reapplication() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin
      .add_vertices(vec![
        v(0.0, 0.0),
        v(4.0, 0.0),
        v(4.0, 4.0),
        v(0.0, 4.0),
        v(2.0, 2.0),
      ])
      .unwrap();
    let c = LinearConstraint::from_vertices(vec![v(0.0, 2.0), v(4.0, 2.0)]);
    tin.add_constraints(vec![c.clone_box()], true).unwrap();
    let before: Vec<_> = tin
      .edges()
      .filter(|e| e.is_constraint_line_member())
      .map(|e| (e.a().coords(), e.b().coords()))
      .collect();
    let n_vertices = tin.vertex_count();

    tin.add_constraints(vec![boxed(c)], true).unwrap();
    let after: Vec<_> = tin
      .edges()
      .filter(|e| e.is_constraint_line_member())
      .map(|e| (e.a().coords(), e.b().coords()))
      .collect();
    assert_eq!(tin.vertex_count(), n_vertices);
    assert_eq!(before, after);
  }

  #[test]
  fn pre_interpolation_fills_nan_z() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    let mut pts = Vec::new();
    for i in 0..4 {
      for j in 0..4 {
        let (x, y) = (i as f64, j as f64);
        pts.push(Vertex::new(x, y, x + y));
      }
    }
    tin.add_vertices(pts).unwrap();
    let c = LinearConstraint::from_vertices(vec![
      Vertex::new(0.5, 0.5, f64::NAN),
      Vertex::new(2.5, 1.5, f64::NAN),
    ]);
    tin
      .add_constraints_with_options(
        vec![boxed(c)],
        ConstraintOptions {
          restore_conformity: true,
          pre_interpolate_z: true,
        },
      )
      .unwrap();
    let stored = &tin.constraints()[0];
    assert!((stored.vertices()[0].z() - 1.0).abs() < 1e-9);
    assert!((stored.vertices()[1].z() - 4.0).abs() < 1e-9);
  }
}
