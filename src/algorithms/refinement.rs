use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use log::{debug, warn};
use ordered_float::NotNan;

use crate::algorithms::triangulation::incremental::Insertion;
use crate::algorithms::triangulation::IncrementalTin;
use crate::data::quad_edge::EdgeId;
use crate::data::vertex::{Vertex, VertexId};
use crate::data::{Bounds, PolygonConstraint};
use crate::interpolation::{Interpolator, TriangularFacetInterpolator};
use crate::Error;

type Result<T> = std::result::Result<T, Error>;

/// Configuration for [`RuppertRefiner`].
#[derive(Debug, Clone)]
pub struct RefinementOptions {
  /// Target minimum triangle angle, exclusive range (0, 60) degrees.
  pub min_angle_degrees: f64,
  /// Triangles at or below this area are never refined.
  pub min_triangle_area: f64,
  /// Clamp the radius-to-edge target at sqrt(2), the provable
  /// termination bound.
  pub enforce_sqrt2_guard: bool,
  pub skip_seditious_triangles: bool,
  pub ignore_seditious_encroachments: bool,
  /// Assign z to Steiner vertices from a snapshot of the pre-refinement
  /// surface instead of zero.
  pub interpolate_z: bool,
  /// Restrict refinement to triangles inside polygon-constraint regions;
  /// with no region constraints present every triangle is a candidate.
  pub refine_only_inside_constraints: bool,
  /// Ring the data with a polygonal constraint just outside the bounds
  /// before refining.
  pub add_bounding_box_constraint: bool,
  pub bounding_box_buffer_percent: f64,
  pub max_iterations: usize,
  /// Bound on rejected candidates within one `refine_once` call.
  pub max_skips_per_call: usize,
}

impl Default for RefinementOptions {
  fn default() -> RefinementOptions {
    RefinementOptions {
      min_angle_degrees: 20.0,
      min_triangle_area: 0.0,
      enforce_sqrt2_guard: true,
      skip_seditious_triangles: true,
      ignore_seditious_encroachments: true,
      interpolate_z: false,
      refine_only_inside_constraints: false,
      add_bounding_box_constraint: false,
      bounding_box_buffer_percent: 10.0,
      max_iterations: 100_000,
      max_skips_per_call: 100,
    }
  }
}

/// Provenance of a vertex with respect to the refiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteinerKind {
  Input,
  Midpoint,
  Offcenter,
  Circumcenter,
}

#[derive(Debug, Clone, Copy)]
struct VertexInfo {
  kind: SteinerKind,
  critical_corner: Option<VertexId>,
  shell: i32,
}

// Bad-triangle queue entry, largest squared area first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BadTriangle {
  key: NotNan<f64>,
  edge: EdgeId,
}

impl Ord for BadTriangle {
  fn cmp(&self, other: &BadTriangle) -> std::cmp::Ordering {
    self.key.cmp(&other.key).then(self.edge.cmp(&other.edge))
  }
}

impl PartialOrd for BadTriangle {
  fn partial_cmp(&self, other: &BadTriangle) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

/// Ruppert refinement with Shewchuk off-centers over a constrained TIN.
///
/// The refiner owns its queues and vertex metadata and mutates the TIN it
/// was built over; `refine_once` inserts at most one Steiner vertex per
/// call and is safe to interleave with read-only queries between calls.
pub struct RuppertRefiner<'a> {
  tin: &'a mut IncrementalTin,
  options: RefinementOptions,
  beta: f64,
  rho_min_sq: f64,
  bad_triangles: BinaryHeap<BadTriangle>,
  bad_set: HashSet<usize>,
  encroached: VecDeque<EdgeId>,
  encroached_set: HashSet<usize>,
  segments: HashSet<usize>,
  vertex_info: HashMap<VertexId, VertexInfo>,
  corner_angle: HashMap<VertexId, f64>,
  sanity_bounds: Bounds,
  snapshot: Option<Box<IncrementalTin>>,
  iterations: usize,
}

impl<'a> RuppertRefiner<'a> {
  pub fn new(tin: &'a mut IncrementalTin, options: RefinementOptions) -> Result<RuppertRefiner<'a>> {
    tin.check_mutable()?;
    if !tin.is_bootstrapped() {
      return Err(Error::NotBootstrapped);
    }
    if !(options.min_angle_degrees > 0.0 && options.min_angle_degrees < 60.0) {
      return Err(Error::MinAngleOutOfRange);
    }
    let sin_theta = options.min_angle_degrees.to_radians().sin();
    let beta = 1.0 / (2.0 * sin_theta);
    let rho_min = if options.enforce_sqrt2_guard {
      beta.max(std::f64::consts::SQRT_2)
    } else {
      beta
    };
    let bounds = tin.bounds().ok_or(Error::NotBootstrapped)?;
    let pad = 10.0 * bounds.width().max(bounds.height()).max(1.0);

    let mut refiner = RuppertRefiner {
      tin,
      options,
      beta,
      rho_min_sq: rho_min * rho_min,
      bad_triangles: BinaryHeap::new(),
      bad_set: HashSet::new(),
      encroached: VecDeque::new(),
      encroached_set: HashSet::new(),
      segments: HashSet::new(),
      vertex_info: HashMap::new(),
      corner_angle: HashMap::new(),
      sanity_bounds: bounds.padded(pad),
      snapshot: None,
      iterations: 0,
    };

    if refiner.options.add_bounding_box_constraint {
      refiner.add_bounding_box_constraint()?;
    }
    if refiner.options.interpolate_z {
      refiner.snapshot = Some(Box::new(refiner.tin.clone()));
    }
    refiner.collect_segments();
    refiner.collect_corner_angles();
    refiner.scan_all_segments();
    refiner.scan_all_triangles();
    Ok(refiner)
  }

  pub fn options(&self) -> &RefinementOptions {
    &self.options
  }

  pub fn iterations(&self) -> usize {
    self.iterations
  }

  /// Runs `refine_once` until the mesh meets the criteria or the
  /// iteration cap trips; true means natural termination.
  pub fn refine(&mut self) -> bool {
    while self.iterations < self.options.max_iterations {
      if self.refine_once().is_none() {
        return true;
      }
    }
    warn!(
      "refinement stopped at the {}-iteration cap",
      self.options.max_iterations
    );
    false
  }

  /// Inserts at most one Steiner vertex; None means the mesh already
  /// satisfies the refinement criteria.
  pub fn refine_once(&mut self) -> Option<Vertex> {
    self.iterations += 1;
    let mut skips = 0usize;

    // encroachment phase
    while let Some(seg) = self.pop_encroached() {
      if let Some(vid) = self.handle_encroached_segment(seg) {
        return Some(*self.tin.vertex(vid));
      }
    }

    // bad-triangle phase
    while let Some(entry) = self.bad_triangles.pop() {
      self.bad_set.remove(&entry.edge.base_index());
      if !self.tin.pool.is_live(entry.edge) {
        continue;
      }
      let face = self.face_key(entry.edge);
      if !self.is_bad_triangle(face) {
        continue;
      }
      if self.options.skip_seditious_triangles && self.is_seditious_triangle(face) {
        continue;
      }
      match self.refine_triangle(face, &mut skips) {
        Step::Inserted(vid) => return Some(*self.tin.vertex(vid)),
        Step::Skip => {
          if skips > self.options.max_skips_per_call {
            debug!("giving up after {} rejected candidates", skips);
            return None;
          }
        }
      }
    }
    None
  }

  // -- setup -------------------------------------------------------------

  fn collect_segments(&mut self) {
    self.segments.clear();
    let bases: Vec<EdgeId> = self.tin.pool.base_edges().collect();
    for e in bases {
      if self.tin.pool.is_constrained(e) {
        self.segments.insert(e.base_index());
      }
    }
  }

  // Minimum angle between constrained spokes at every vertex; corners
  // under 60 degrees are the critical ones that seed seditious handling.
  fn collect_corner_angles(&mut self) {
    let mut spokes: HashMap<VertexId, Vec<f64>> = HashMap::new();
    for e in self.tin.pool.base_edges() {
      if !self.tin.pool.is_constrained(e) {
        continue;
      }
      for d in [e, e.dual()] {
        let o = self.tin.pool.origin(d);
        let t = self.tin.pool.destination(d);
        if o.is_ghost() || t.is_ghost() {
          continue;
        }
        let po = self.tin.vertex(o).coords();
        let pt = self.tin.vertex(t).coords();
        spokes
          .entry(o)
          .or_default()
          .push((pt[1] - po[1]).atan2(pt[0] - po[0]));
      }
    }
    for (v, mut angles) in spokes {
      if angles.len() < 2 {
        continue;
      }
      angles.sort_by(|a, b| a.partial_cmp(b).unwrap());
      let mut min_gap = f64::INFINITY;
      for i in 1..angles.len() {
        min_gap = min_gap.min(angles[i] - angles[i - 1]);
      }
      min_gap = min_gap.min(angles[0] + 2.0 * std::f64::consts::PI - angles[angles.len() - 1]);
      self.corner_angle.insert(v, min_gap.to_degrees());
    }
  }

  fn scan_all_segments(&mut self) {
    let segs: Vec<usize> = self.segments.iter().copied().collect();
    for base in segs {
      let e = EdgeId((base * 2) as u32);
      if self.segment_witness(e).is_some() {
        self.queue_encroached(e);
      }
    }
  }

  fn scan_all_triangles(&mut self) {
    let cap = self.tin.pool.base_capacity() * 2;
    for raw in 0..cap as u32 {
      let e = EdgeId(raw);
      if !self.tin.pool.is_live(e) {
        continue;
      }
      let face = self.face_key(e);
      if face != e {
        continue;
      }
      if self.is_bad_triangle(face) {
        self.queue_bad_triangle(face);
      }
    }
  }

  // -- queues ------------------------------------------------------------

  fn queue_encroached(&mut self, seg: EdgeId) {
    if self.encroached_set.insert(seg.base_index()) {
      self.encroached.push_back(seg.base());
    }
  }

  fn pop_encroached(&mut self) -> Option<EdgeId> {
    let seg = self.encroached.pop_front()?;
    self.encroached_set.remove(&seg.base_index());
    Some(seg)
  }

  fn queue_bad_triangle(&mut self, face: EdgeId) {
    let area = self.face_area2(face);
    if !area.is_finite() {
      return;
    }
    if let Ok(key) = NotNan::new(area * area) {
      if self.bad_set.insert(face.base_index()) {
        self.bad_triangles.push(BadTriangle { key, edge: face });
      }
    }
  }

  // Re-examines the star of a freshly inserted vertex: its faces for
  // badness and its constrained spokes and face edges for encroachment.
  fn requeue_around(&mut self, vid: VertexId) {
    let anchor = match self.tin.edge_with_origin(vid) {
      Some(e) => e,
      None => return,
    };
    let spokes: Vec<EdgeId> = self.tin.pool.pinwheel(anchor).collect();
    for spoke in spokes {
      if self.tin.pool.destination(spoke).is_ghost() {
        continue;
      }
      let face_edges = [
        spoke,
        self.tin.pool.forward(spoke),
        self.tin.pool.reverse(spoke),
      ];
      let mut ghost_face = false;
      for d in face_edges {
        if self.tin.pool.origin(d).is_ghost() || self.tin.pool.destination(d).is_ghost() {
          ghost_face = true;
        }
      }
      for d in face_edges {
        if self.tin.pool.is_constrained(d) {
          self.segments.insert(d.base_index());
          if self.segment_witness(d).is_some() {
            self.queue_encroached(d);
          }
        }
      }
      if ghost_face {
        continue;
      }
      let face = self.face_key(spoke);
      if self.is_bad_triangle(face) {
        self.queue_bad_triangle(face);
      }
    }
  }

  // -- predicates over faces and segments ---------------------------------

  fn face_key(&self, e: EdgeId) -> EdgeId {
    let f = self.tin.pool.forward(e);
    let r = self.tin.pool.reverse(e);
    EdgeId(e.index().min(f.index()).min(r.index()) as u32)
  }

  fn face_vertices(&self, face: EdgeId) -> [VertexId; 3] {
    let f = self.tin.pool.forward(face);
    [
      self.tin.pool.origin(face),
      self.tin.pool.destination(face),
      self.tin.pool.destination(f),
    ]
  }

  fn face_area2(&self, face: EdgeId) -> f64 {
    let [a, b, c] = self.face_vertices(face);
    if a.is_ghost() || b.is_ghost() || c.is_ghost() {
      return f64::NAN;
    }
    crate::predicates::area(
      &self.tin.vertex(a).coords(),
      &self.tin.vertex(b).coords(),
      &self.tin.vertex(c).coords(),
    )
  }

  // Shortest edge of the face as a directed edge id.
  fn face_shortest_edge(&self, face: EdgeId) -> EdgeId {
    let f = self.tin.pool.forward(face);
    let r = self.tin.pool.reverse(face);
    let mut best = face;
    let mut best_len = self.edge_length_sq(face);
    for d in [f, r] {
      let len = self.edge_length_sq(d);
      if len < best_len {
        best = d;
        best_len = len;
      }
    }
    best
  }

  fn edge_length_sq(&self, e: EdgeId) -> f64 {
    let a = self.tin.vertex(self.tin.pool.origin(e));
    let b = self.tin.vertex(self.tin.pool.destination(e));
    a.distance_sq(b)
  }

  // Radius-to-shortest-edge quality test plus the area floor and the
  // region filter.
  fn is_bad_triangle(&self, face: EdgeId) -> bool {
    let [a, b, c] = self.face_vertices(face);
    if a.is_ghost() || b.is_ghost() || c.is_ghost() {
      return false;
    }
    let area2 = self.face_area2(face);
    if !(area2 > 2.0 * self.options.min_triangle_area) {
      return false;
    }
    if self.options.refine_only_inside_constraints && self.tin.region_constraint_count > 0 {
      let f = self.tin.pool.forward(face);
      let r = self.tin.pool.reverse(face);
      for d in [face, f, r] {
        if !self.tin.pool.is_constraint_region_member(d) {
          return false;
        }
      }
    }
    let l0 = self.edge_length_sq(face);
    let l1 = self.edge_length_sq(self.tin.pool.forward(face));
    let l2 = self.edge_length_sq(self.tin.pool.reverse(face));
    let shortest = l0.min(l1).min(l2);
    let product_of_longer = (l0 * l1 * l2) / shortest;
    // R/s >= rho  <=>  (product of two longer squared sides) >= 4 rho^2 (2A)^2
    product_of_longer >= 4.0 * self.rho_min_sq * area2 * area2
  }

  fn info(&self, vid: VertexId) -> VertexInfo {
    self
      .vertex_info
      .get(&vid)
      .copied()
      .unwrap_or(VertexInfo {
        kind: SteinerKind::Input,
        critical_corner: None,
        shell: 0,
      })
  }

  fn is_critical_corner(&self, vid: VertexId) -> bool {
    self.corner_angle.get(&vid).map_or(false, |a| *a < 60.0)
  }

  // Concentric shell index of point p around the corner z.
  fn shell_index(&self, p: [f64; 2], corner: VertexId) -> i32 {
    let c = self.tin.vertex(corner);
    let d = c.distance_to(p[0], p[1]);
    if d <= self.tin.thresholds().vertex_tolerance() {
      0
    } else {
      (d.log2() + 0.5).floor() as i32
    }
  }

  // A triangle is seditious when its shortest edge links two midpoints on
  // the same shell around the same critical corner.
  fn is_seditious_triangle(&self, face: EdgeId) -> bool {
    let shortest = self.face_shortest_edge(face);
    self.is_seditious_edge(
      self.tin.pool.origin(shortest),
      self.tin.pool.destination(shortest),
    )
  }

  fn is_seditious_edge(&self, a: VertexId, b: VertexId) -> bool {
    let ia = self.info(a);
    let ib = self.info(b);
    if ia.kind != SteinerKind::Midpoint || ib.kind != SteinerKind::Midpoint {
      return false;
    }
    match (ia.critical_corner, ib.critical_corner) {
      (Some(za), Some(zb)) => za == zb && ia.shell == ib.shell && self.is_critical_corner(za),
      _ => false,
    }
  }

  // The apex strictly inside the diametral disk of the segment, if any.
  fn segment_witness(&self, seg: EdgeId) -> Option<VertexId> {
    let a = self.tin.vertex(self.tin.pool.origin(seg));
    let b = self.tin.vertex(self.tin.pool.destination(seg));
    let mx = (a.x() + b.x()) / 2.0;
    let my = (a.y() + b.y()) / 2.0;
    let radius_sq = a.distance_sq(b) / 4.0;
    for d in [seg, seg.dual()] {
      let apex = self.tin.pool.destination(self.tin.pool.forward(d));
      if apex.is_ghost() {
        continue;
      }
      if self.tin.vertex(apex).distance_to_sq(mx, my) < radius_sq {
        if self.options.ignore_seditious_encroachments
          && self.is_seditious_witness(seg, apex)
        {
          continue;
        }
        return Some(apex);
      }
    }
    None
  }

  // Midpoint witness on the same shell around the same critical corner as
  // the segment endpoints: splitting would only churn.
  fn is_seditious_witness(&self, seg: EdgeId, witness: VertexId) -> bool {
    let wi = self.info(witness);
    if wi.kind != SteinerKind::Midpoint {
      return false;
    }
    let corner = match wi.critical_corner {
      Some(z) if self.is_critical_corner(z) => z,
      _ => return false,
    };
    let a = self.tin.pool.origin(seg);
    let b = self.tin.pool.destination(seg);
    let sa = self.shell_index(self.tin.vertex(a).coords(), corner);
    let sb = self.shell_index(self.tin.vertex(b).coords(), corner);
    sa == wi.shell && sb == wi.shell
  }

  fn point_encroaches_segment(&self, base: usize, x: f64, y: f64) -> bool {
    let seg = EdgeId((base * 2) as u32);
    if !self.tin.pool.is_live(seg) || !self.tin.pool.is_constrained(seg) {
      return false;
    }
    let a = self.tin.vertex(self.tin.pool.origin(seg));
    let b = self.tin.vertex(self.tin.pool.destination(seg));
    let mx = (a.x() + b.x()) / 2.0;
    let my = (a.y() + b.y()) / 2.0;
    let radius_sq = a.distance_sq(b) / 4.0;
    let dx = x - mx;
    let dy = y - my;
    dx * dx + dy * dy < radius_sq
  }

  // -- the two refinement steps -------------------------------------------

  fn handle_encroached_segment(&mut self, seg: EdgeId) -> Option<VertexId> {
    if !self.tin.pool.is_live(seg) || !self.tin.pool.is_constrained(seg) {
      return None;
    }
    self.segment_witness(seg)?;
    self.split_segment(seg)
  }

  // Midpoint split of a constrained segment with shell bookkeeping.
  fn split_segment(&mut self, seg: EdgeId) -> Option<VertexId> {
    let a = self.tin.pool.origin(seg);
    let b = self.tin.pool.destination(seg);
    let va = *self.tin.vertex(a);
    let vb = *self.tin.vertex(b);
    let z = (va.z() + vb.z()) / 2.0;
    let vid = self.tin.split_edge(seg, 0.5, z).ok().flatten()?;

    self.segments.remove(&seg.base_index());

    // critical-corner inheritance for the new midpoint
    let corner = if self.is_critical_corner(a) {
      Some(a)
    } else if self.is_critical_corner(b) {
      Some(b)
    } else if self.info(a).critical_corner.is_some() {
      self.info(a).critical_corner
    } else {
      self.info(b).critical_corner
    };
    let p = self.tin.vertex(vid).coords();
    let shell = corner.map_or(0, |z| self.shell_index(p, z));
    self.vertex_info.insert(
      vid,
      VertexInfo {
        kind: SteinerKind::Midpoint,
        critical_corner: corner,
        shell,
      },
    );
    self.requeue_around(vid);
    Some(vid)
  }

  fn refine_triangle(&mut self, face: EdgeId, skips: &mut usize) -> Step {
    let shortest = self.face_shortest_edge(face);
    let sa = *self.tin.vertex(self.tin.pool.origin(shortest));
    let sb = *self.tin.vertex(self.tin.pool.destination(shortest));
    let shortest_len = sa.distance(&sb);
    let mx = (sa.x() + sb.x()) / 2.0;
    let my = (sa.y() + sb.y()) / 2.0;

    let circle = {
      let tri = crate::data::SimpleTriangle::from_edge(
        &self.tin.pool,
        &self.tin.vertices,
        &self.tin.predicates,
        face,
      );
      *tri.circumcircle()
    };

    // off-center: march from the shortest-edge midpoint toward the
    // circumcenter, no farther than beta times the shortest edge
    let mut candidate = None;
    if circle.is_defined() {
      let dx = circle.x() - mx;
      let dy = circle.y() - my;
      let dist = (dx * dx + dy * dy).sqrt();
      if dist.is_finite() && dist > 0.0 {
        let d = dist.min(self.beta * shortest_len);
        let x = mx + dx / dist * d;
        let y = my + dy / dist * d;
        if self.sanity_bounds.contains(x, y) {
          candidate = Some((x, y, SteinerKind::Offcenter));
        }
      }
    }
    // fall back to the circumcenter when the off-center is ill-defined
    if candidate.is_none()
      && circle.is_defined()
      && self.sanity_bounds.contains(circle.x(), circle.y())
    {
      candidate = Some((circle.x(), circle.y(), SteinerKind::Circumcenter));
    }
    let (x, y, kind) = match candidate {
      Some(c) => c,
      None => {
        *skips += 1;
        return Step::Skip;
      }
    };

    // a candidate that encroaches a constrained segment splits the
    // segment instead
    let encroached: Vec<usize> = self
      .segments
      .iter()
      .copied()
      .filter(|&s| self.point_encroaches_segment(s, x, y))
      .collect();
    if !encroached.is_empty() {
      for base in &encroached {
        self.queue_encroached(EdgeId((base * 2) as u32));
      }
      let seg = EdgeId((encroached[0] * 2) as u32);
      return match self.split_segment(seg) {
        Some(vid) => Step::Inserted(vid),
        None => {
          *skips += 1;
          Step::Skip
        }
      };
    }

    // near-vertex and near-constrained-edge rejection
    let near = {
      let mut nav = self.tin.navigator();
      nav.nearest_vertex(x, y).map(|v| v.distance_to(x, y))
    };
    if let Some(d) = near {
      if d < 1.0e-9 * shortest_len {
        *skips += 1;
        return Step::Skip;
      }
    }
    if let Some(seg) = self.nearest_touching_segment(x, y) {
      return match self.split_segment(seg) {
        Some(vid) => Step::Inserted(vid),
        None => {
          *skips += 1;
          Step::Skip
        }
      };
    }

    let z = self.steiner_z(x, y, face);
    let index = self.tin.next_synthetic_index();
    let vertex = Vertex::new(x, y, z).with_index(index).as_synthetic();
    match self.tin.insert_coordinates(vertex) {
      Insertion::Inserted(vid) => {
        self.vertex_info.insert(
          vid,
          VertexInfo {
            kind,
            critical_corner: None,
            shell: 0,
          },
        );
        self.requeue_around(vid);
        Step::Inserted(vid)
      }
      Insertion::Merged(_) => {
        *skips += 1;
        Step::Skip
      }
    }
  }

  // A constrained segment whose interior passes within vertex tolerance
  // of (x, y).
  fn nearest_touching_segment(&self, x: f64, y: f64) -> Option<EdgeId> {
    let tol_sq = self.tin.thresholds().vertex_tolerance_sq();
    for &base in &self.segments {
      let seg = EdgeId((base * 2) as u32);
      if !self.tin.pool.is_live(seg) {
        continue;
      }
      let a = self.tin.vertex(self.tin.pool.origin(seg));
      let b = self.tin.vertex(self.tin.pool.destination(seg));
      let dx = b.x() - a.x();
      let dy = b.y() - a.y();
      let len_sq = dx * dx + dy * dy;
      if len_sq <= 0.0 {
        continue;
      }
      let t = ((x - a.x()) * dx + (y - a.y()) * dy) / len_sq;
      if t <= 0.0 || t >= 1.0 {
        continue;
      }
      let px = a.x() + t * dx;
      let py = a.y() + t * dy;
      let d = (x - px) * (x - px) + (y - py) * (y - py);
      if d < tol_sq {
        return Some(seg);
      }
    }
    None
  }

  // z for an off-center or circumcenter vertex: snapshot surface when
  // enabled, the face's z average as the fallback, zero otherwise.
  fn steiner_z(&self, x: f64, y: f64, face: EdgeId) -> f64 {
    if !self.options.interpolate_z {
      return 0.0;
    }
    if let Some(snapshot) = &self.snapshot {
      let z = TriangularFacetInterpolator::new(snapshot).interpolate(x, y);
      if !z.is_nan() {
        return z;
      }
    }
    let [a, b, c] = self.face_vertices(face);
    (self.tin.vertex(a).z() + self.tin.vertex(b).z() + self.tin.vertex(c).z()) / 3.0
  }

  // Rings the data with a polygon constraint just outside the bounds,
  // plus four corner vertices beyond it so the constraint edges stay
  // interior.
  fn add_bounding_box_constraint(&mut self) -> Result<()> {
    let bounds = self.tin.bounds().ok_or(Error::NotBootstrapped)?;
    let buffer =
      bounds.width().max(bounds.height()) * self.options.bounding_box_buffer_percent / 100.0;
    let inner = bounds.padded(buffer.max(f64::MIN_POSITIVE));
    let outer = bounds.padded(2.0 * buffer.max(f64::MIN_POSITIVE));

    // points per side grow with the vertex count
    let n = ((self.tin.vertex_count() as f64).sqrt().ceil() as usize).max(2);

    let mut ring: Vec<Vertex> = Vec::with_capacity(4 * n);
    let corners = [
      (inner.min_x(), inner.min_y()),
      (inner.max_x(), inner.min_y()),
      (inner.max_x(), inner.max_y()),
      (inner.min_x(), inner.max_y()),
    ];
    {
      let mut interp = TriangularFacetInterpolator::new(self.tin);
      for side in 0..4 {
        let (x0, y0) = corners[side];
        let (x1, y1) = corners[(side + 1) % 4];
        for i in 0..n {
          let t = i as f64 / n as f64;
          let x = x0 + t * (x1 - x0);
          let y = y0 + t * (y1 - y0);
          let z = interp.interpolate_with_exterior_support(x, y);
          ring.push(Vertex::new(x, y, z));
        }
      }
    }
    let outer_corners: Vec<Vertex> = {
      let mut interp = TriangularFacetInterpolator::new(self.tin);
      [
        (outer.min_x(), outer.min_y()),
        (outer.max_x(), outer.min_y()),
        (outer.max_x(), outer.max_y()),
        (outer.min_x(), outer.max_y()),
      ]
      .iter()
      .map(|&(x, y)| Vertex::new(x, y, interp.interpolate_with_exterior_support(x, y)))
      .collect()
    };
    for corner in outer_corners {
      self.tin.add(corner)?;
    }
    let constraint = PolygonConstraint::from_vertices(ring);
    self
      .tin
      .add_constraints(vec![Box::new(constraint)], true)?;
    debug!("bounding-box constraint added with {} points per side", n);
    Ok(())
  }
}

enum Step {
  Inserted(VertexId),
  Skip,
}
