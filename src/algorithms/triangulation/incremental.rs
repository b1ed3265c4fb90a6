use log::debug;

use crate::algorithms::triangulation::walk::{StochasticLawsonWalk, WalkDiagnostics};
use crate::data::quad_edge::{EdgeHandle, EdgeId, EdgePool};
use crate::data::vertex::{Vertex, VertexId, GHOST_VERTEX};
use crate::data::{Bounds, Constraint, SimpleTriangle};
use crate::predicates::{PredicateDiagnostics, Predicates};
use crate::thresholds::Thresholds;
use crate::Error;

type Result<T> = std::result::Result<T, Error>;

/// Outcome of one point insertion, internal to the crate: either a fresh
/// vertex entered the mesh or the point merged with an existing vertex
/// inside the vertex tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Insertion {
  Inserted(VertexId),
  Merged(VertexId),
}

impl Insertion {
  pub(crate) fn vertex(self) -> VertexId {
    match self {
      Insertion::Inserted(v) | Insertion::Merged(v) => v,
    }
  }
}

/// Triangle tally returned by [`IncrementalTin::count_triangles`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriangleCount {
  /// Faces with three real vertices.
  pub valid: usize,
  /// Faces incident to the ghost vertex, tiling the unbounded face.
  pub ghost: usize,
  /// Valid faces all of whose edges are constraint-region members.
  pub constrained: usize,
}

/// An incrementally built Delaunay triangulation with ghost-vertex convex
/// hull, vertex arena, and quad-edge topology.
///
/// Vertices are buffered until a non-collinear triple arrives; the mesh
/// then bootstraps to a first triangle ringed by ghost faces and every
/// further vertex goes through locate-insert-flip. Constraint embedding
/// and refinement build on top of this structure.
#[derive(Debug, Clone)]
pub struct IncrementalTin {
  pub(crate) vertices: Vec<Vertex>,
  pub(crate) pool: EdgePool,
  pub(crate) predicates: Predicates,
  pub(crate) walker: StochasticLawsonWalk,
  pub(crate) search_edge: EdgeId,
  bootstrapped: bool,
  bootstrap_buffer: Vec<VertexId>,
  bounds: Option<Bounds>,
  pub(crate) constraints: Vec<Box<dyn Constraint>>,
  pub(crate) region_constraint_count: usize,
  pub(crate) synthetic_count: u32,
  disposed: bool,
}

const DEFAULT_WALK_SEED: u64 = 0x5eed_1a50;

impl IncrementalTin {
  /// A TIN over data with roughly unit point spacing uses `new(1.0)`;
  /// thresholds and the vertex tolerance scale from the spacing.
  pub fn new(nominal_point_spacing: f64) -> Result<IncrementalTin> {
    IncrementalTin::with_seed(nominal_point_spacing, DEFAULT_WALK_SEED)
  }

  /// Same as [`IncrementalTin::new`] with a caller-chosen seed for the
  /// stochastic walk, for reproducible runs.
  pub fn with_seed(nominal_point_spacing: f64, walk_seed: u64) -> Result<IncrementalTin> {
    let thresholds = Thresholds::new(nominal_point_spacing)?;
    Ok(IncrementalTin {
      vertices: Vec::new(),
      pool: EdgePool::new(),
      predicates: Predicates::new(thresholds),
      walker: StochasticLawsonWalk::new(walk_seed),
      search_edge: EdgeId::NONE,
      bootstrapped: false,
      bootstrap_buffer: Vec::new(),
      bounds: None,
      constraints: Vec::new(),
      region_constraint_count: 0,
      synthetic_count: 0,
      disposed: false,
    })
  }

  // -- accessors ---------------------------------------------------------

  pub fn is_bootstrapped(&self) -> bool {
    self.bootstrapped
  }

  pub fn is_disposed(&self) -> bool {
    self.disposed
  }

  pub fn thresholds(&self) -> &Thresholds {
    self.predicates.thresholds()
  }

  pub fn nominal_point_spacing(&self) -> f64 {
    self.thresholds().nominal_point_spacing()
  }

  pub fn bounds(&self) -> Option<Bounds> {
    self.bounds
  }

  pub fn vertex_count(&self) -> usize {
    self.vertices.len()
  }

  pub fn edge_count(&self) -> usize {
    self.pool.count()
  }

  pub fn vertex(&self, id: VertexId) -> &Vertex {
    if id.is_ghost() {
      &GHOST_VERTEX
    } else {
      &self.vertices[id.as_usize()]
    }
  }

  pub fn predicate_diagnostics(&self) -> PredicateDiagnostics {
    self.predicates.diagnostics()
  }

  pub fn walk_diagnostics(&self) -> WalkDiagnostics {
    self.walker.diagnostics()
  }

  /// Constraints owned by this TIN, indexed by their constraint index.
  pub fn constraints(&self) -> &[Box<dyn Constraint>] {
    &self.constraints
  }

  pub(crate) fn edge_pool(&self) -> &EdgePool {
    &self.pool
  }

  pub(crate) fn vertex_arena(&self) -> &[Vertex] {
    &self.vertices
  }

  pub(crate) fn predicates(&self) -> &Predicates {
    &self.predicates
  }

  pub(crate) fn starting_edge(&self) -> Option<EdgeId> {
    if self.bootstrapped {
      Some(self.search_edge)
    } else {
      None
    }
  }

  fn coords(&self, id: VertexId) -> [f64; 2] {
    self.vertex(id).coords()
  }

  pub(crate) fn handle(&self, id: EdgeId) -> EdgeHandle<'_> {
    EdgeHandle::new(&self.pool, &self.vertices, id)
  }

  // -- public mutation ---------------------------------------------------

  /// Adds one vertex. Returns true when the vertex entered the mesh (or
  /// the bootstrap buffer), false when it merged with an existing vertex
  /// within the vertex tolerance or carried the withheld bit.
  pub fn add(&mut self, vertex: Vertex) -> Result<bool> {
    self.check_mutable()?;
    if !vertex.x().is_finite() || !vertex.y().is_finite() {
      return Err(Error::NonFiniteCoordinate);
    }
    if vertex.is_withheld() {
      return Ok(false);
    }
    let outcome = if self.bootstrapped {
      self.insert_coordinates(vertex)
    } else {
      self.add_before_bootstrap(vertex)
    };
    match outcome {
      Insertion::Inserted(_) => Ok(true),
      Insertion::Merged(_) => Ok(false),
    }
  }

  /// Adds a batch of vertices; returns true when the TIN is bootstrapped
  /// afterwards. Duplicates within tolerance merge, first occurrence wins.
  pub fn add_vertices<I>(&mut self, vertices: I) -> Result<bool>
  where
    I: IntoIterator<Item = Vertex>,
  {
    for v in vertices {
      self.add(v)?;
    }
    Ok(self.bootstrapped)
  }

  /// Batch insertion for input already sorted by x then y. The walk seeds
  /// from the previous insertion, so pre-sorted input keeps every locate
  /// step short; the insertion logic itself is unchanged.
  pub fn add_vertices_sorted<I>(&mut self, vertices: I) -> Result<bool>
  where
    I: IntoIterator<Item = Vertex>,
  {
    self.add_vertices(vertices)
  }

  /// Adds a vertex and returns an edge whose origin is that vertex, or
  /// None when the TIN has not bootstrapped yet.
  pub fn add_and_return_edge(&mut self, vertex: Vertex) -> Result<Option<EdgeHandle<'_>>> {
    self.check_mutable()?;
    if !vertex.x().is_finite() || !vertex.y().is_finite() {
      return Err(Error::NonFiniteCoordinate);
    }
    if vertex.is_withheld() {
      return Ok(None);
    }
    let vid = if self.bootstrapped {
      self.insert_coordinates(vertex).vertex()
    } else {
      let outcome = self.add_before_bootstrap(vertex);
      if !self.bootstrapped {
        return Ok(None);
      }
      outcome.vertex()
    };
    match self.edge_with_origin(vid) {
      Some(e) => Ok(Some(self.handle(e))),
      None => Ok(None),
    }
  }

  /// Splits `edge` at parameter `t`, inserting a synthetic vertex with the
  /// given z. Returns None when t falls within vertex tolerance of either
  /// endpoint. Constraint membership carries over to both halves.
  pub fn split_edge(&mut self, edge: EdgeId, t: f64, z: f64) -> Result<Option<VertexId>> {
    self.check_mutable()?;
    if !self.pool.is_live(edge) {
      return Ok(None);
    }
    let a = self.pool.origin(edge);
    let b = self.pool.destination(edge);
    if a.is_ghost() || b.is_ghost() {
      return Ok(None);
    }
    let pa = self.coords(a);
    let pb = self.coords(b);
    let len = ((pb[0] - pa[0]).powi(2) + (pb[1] - pa[1]).powi(2)).sqrt();
    let tol = self.thresholds().vertex_tolerance();
    if !(0.0..=1.0).contains(&t) || t * len < tol || (1.0 - t) * len < tol {
      return Ok(None);
    }
    let x = pa[0] + t * (pb[0] - pa[0]);
    let y = pa[1] + t * (pb[1] - pa[1]);
    let mut v = Vertex::new(x, y, z)
      .with_index(self.next_synthetic_index())
      .as_synthetic();
    if self.pool.is_constrained(edge) {
      v = v.as_constraint_member();
    }
    let vid = self.store_vertex(v);
    let mut stack = Vec::new();
    self.split_edge_core(edge, vid, &mut stack);
    self.restore_delaunay(&mut stack);
    Ok(Some(vid))
  }

  /// Releases the mesh. Every later mutation fails with
  /// `Error::TinDisposed`.
  pub fn dispose(&mut self) {
    self.vertices = Vec::new();
    self.pool = EdgePool::new();
    self.constraints = Vec::new();
    self.bootstrap_buffer = Vec::new();
    self.bootstrapped = false;
    self.search_edge = EdgeId::NONE;
    self.bounds = None;
    self.disposed = true;
  }

  pub(crate) fn check_mutable(&self) -> Result<()> {
    if self.disposed {
      Err(Error::TinDisposed)
    } else {
      Ok(())
    }
  }

  // -- iteration ---------------------------------------------------------

  /// Live undirected edges, as handles on their canonical direction.
  pub fn edges(&self) -> impl Iterator<Item = EdgeHandle<'_>> {
    let pool = &self.pool;
    let vertices = &self.vertices[..];
    pool
      .base_edges()
      .map(move |id| EdgeHandle::new(pool, vertices, id))
  }

  /// Mesh vertices in insertion order.
  pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
    self.vertices.iter()
  }

  /// Every face, ghosts included, each reported once through its
  /// lowest-index edge.
  pub fn triangles(&self) -> impl Iterator<Item = SimpleTriangle<'_>> {
    let pool = &self.pool;
    let vertices = &self.vertices[..];
    let predicates = &self.predicates;
    let cap = pool.base_capacity() * 2;
    (0..cap as u32)
      .map(EdgeId)
      .filter(move |&e| pool.is_live(e) && is_face_representative(pool, e))
      .map(move |e| SimpleTriangle::from_edge(pool, vertices, predicates, e))
  }

  /// (valid, ghost, constrained) face counts.
  pub fn count_triangles(&self) -> TriangleCount {
    let mut count = TriangleCount::default();
    for tri in self.triangles() {
      if tri.is_ghost() {
        count.ghost += 1;
      } else {
        count.valid += 1;
        if tri.edge_a().is_constraint_region_member()
          && tri.edge_b().is_constraint_region_member()
          && tri.edge_c().is_constraint_region_member()
        {
          count.constrained += 1;
        }
      }
    }
    count
  }

  /// The convex hull as directed edges in counterclockwise perimeter
  /// order (interior on the left). Empty before bootstrap.
  pub fn perimeter(&self) -> Vec<EdgeHandle<'_>> {
    let start = match self.any_hull_edge() {
      Some(e) => e,
      None => return Vec::new(),
    };
    let mut result = Vec::new();
    let mut e = start;
    loop {
      result.push(self.handle(e));
      e = self.next_hull_edge(e);
      if e == start || result.len() > self.pool.count() {
        break;
      }
    }
    result
  }

  /// A read-only point-location utility with its own walk state.
  pub fn navigator(&self) -> TinNavigator<'_> {
    TinNavigator {
      tin: self,
      walker: StochasticLawsonWalk::new(DEFAULT_WALK_SEED),
      search: self.starting_edge(),
    }
  }

  /// True when every unconstrained interior edge meets the local Delaunay
  /// criterion; constrained edges are exempt by definition.
  pub fn is_conformant(&self) -> bool {
    for e in self.pool.base_edges() {
      if self.pool.is_constrained(e) {
        continue;
      }
      let p = self.pool.origin(e);
      let q = self.pool.destination(e);
      if p.is_ghost() || q.is_ghost() {
        continue;
      }
      let r = self.pool.destination(self.pool.forward(e));
      let s = self.pool.destination(self.pool.forward(e.dual()));
      if r.is_ghost() || s.is_ghost() {
        continue;
      }
      let test = self.predicates.in_circle_test(
        &self.coords(p),
        &self.coords(q),
        &self.coords(r),
        &self.coords(s),
      );
      if test > 0 {
        return false;
      }
    }
    true
  }

  // -- bootstrap ---------------------------------------------------------

  fn add_before_bootstrap(&mut self, vertex: Vertex) -> Insertion {
    let tol_sq = self.thresholds().vertex_tolerance_sq();
    for &id in &self.bootstrap_buffer {
      if self.vertices[id.as_usize()].distance_to_sq(vertex.x(), vertex.y()) < tol_sq {
        return Insertion::Merged(id);
      }
    }
    let id = self.store_vertex(vertex);
    self.bootstrap_buffer.push(id);
    self.try_bootstrap();
    Insertion::Inserted(id)
  }

  // Buffered vertices stay collinear until a triple with area beyond the
  // half-plane threshold shows up; that triple seeds the first triangle
  // and the rest of the buffer inserts normally. Earlier buffer contents
  // are pairwise collinear, so only triples involving the newest vertex
  // need testing.
  fn try_bootstrap(&mut self) {
    if self.bootstrap_buffer.len() < 3 {
      return;
    }
    let threshold = self.thresholds().half_plane_threshold();
    let buffer = self.bootstrap_buffer.clone();
    let k = buffer.len() - 1;
    for i in 0..k {
      for j in (i + 1)..k {
        let det = crate::predicates::area(
          &self.coords(buffer[i]),
          &self.coords(buffer[j]),
          &self.coords(buffer[k]),
        );
        if det.abs() < threshold {
          continue;
        }
        let (a, b, c) = if det > 0.0 {
          (buffer[i], buffer[j], buffer[k])
        } else {
          (buffer[i], buffer[k], buffer[j])
        };
        self.build_first_triangle(a, b, c);
        debug!("bootstrap complete after {} buffered vertices", buffer.len());
        let mut stack = Vec::new();
        for &id in &buffer {
          if id == buffer[i] || id == buffer[j] || id == buffer[k] {
            continue;
          }
          self.insert_existing(id, &mut stack);
        }
        self.bootstrap_buffer = Vec::new();
        return;
      }
    }
  }

  fn build_first_triangle(&mut self, a: VertexId, b: VertexId, c: VertexId) {
    let g = VertexId::GHOST;
    let ab = self.pool.allocate(a, b);
    let bc = self.pool.allocate(b, c);
    let ca = self.pool.allocate(c, a);
    let ag = self.pool.allocate(a, g);
    let bg = self.pool.allocate(b, g);
    let cg = self.pool.allocate(c, g);

    // interior face (a, b, c)
    self.pool.set_forward(ab, bc);
    self.pool.set_forward(bc, ca);
    self.pool.set_forward(ca, ab);
    // ghost face over ab: (b, a, g)
    self.pool.set_forward(ab.dual(), ag);
    self.pool.set_forward(ag, bg.dual());
    self.pool.set_forward(bg.dual(), ab.dual());
    // ghost face over bc: (c, b, g)
    self.pool.set_forward(bc.dual(), bg);
    self.pool.set_forward(bg, cg.dual());
    self.pool.set_forward(cg.dual(), bc.dual());
    // ghost face over ca: (a, c, g)
    self.pool.set_forward(ca.dual(), cg);
    self.pool.set_forward(cg, ag.dual());
    self.pool.set_forward(ag.dual(), ca.dual());

    self.search_edge = ab;
    self.bootstrapped = true;
  }

  // -- insertion core ----------------------------------------------------

  pub(crate) fn store_vertex(&mut self, vertex: Vertex) -> VertexId {
    let id = VertexId(self.vertices.len() as u32);
    match &mut self.bounds {
      Some(b) => b.extend(vertex.x(), vertex.y()),
      None => self.bounds = Some(Bounds::of_point(vertex.x(), vertex.y())),
    }
    self.vertices.push(vertex);
    id
  }

  pub(crate) fn next_synthetic_index(&mut self) -> u32 {
    self.synthetic_count += 1;
    self.synthetic_count
  }

  /// Inserts a vertex into a bootstrapped mesh, merging with an existing
  /// vertex inside the vertex tolerance.
  pub(crate) fn insert_coordinates(&mut self, vertex: Vertex) -> Insertion {
    debug_assert!(self.bootstrapped);
    let x = vertex.x();
    let y = vertex.y();
    let located = self.locate(x, y);

    if let Some(existing) = self.nearby_vertex(located, x, y) {
      return Insertion::Merged(existing);
    }

    let vid = self.store_vertex(vertex);
    let mut stack = Vec::new();
    self.insert_at(located, vid, &mut stack);
    self.restore_delaunay(&mut stack);
    Insertion::Inserted(vid)
  }

  // Re-inserts a vertex already present in the arena (bootstrap buffer).
  fn insert_existing(&mut self, vid: VertexId, stack: &mut Vec<EdgeId>) {
    let [x, y] = self.coords(vid);
    let located = self.locate(x, y);
    if self.nearby_vertex(located, x, y).is_some() {
      // buffered duplicates were already filtered; a hit here means two
      // buffered vertices merged during bootstrap, keep the first
      return;
    }
    self.insert_at(located, vid, stack);
    self.restore_delaunay(stack);
  }

  fn locate(&mut self, x: f64, y: f64) -> EdgeId {
    self.walker.locate(
      &self.pool,
      &self.vertices,
      &self.predicates,
      self.search_edge,
      x,
      y,
    )
  }

  // The existing vertex within tolerance of (x, y) around the located
  // face, if any.
  fn nearby_vertex(&self, located: EdgeId, x: f64, y: f64) -> Option<VertexId> {
    let tol_sq = self.thresholds().vertex_tolerance_sq();
    let mut candidates = [VertexId::GHOST; 4];
    candidates[0] = self.pool.origin(located);
    candidates[1] = self.pool.destination(located);
    candidates[2] = self.pool.destination(self.pool.forward(located));
    candidates[3] = self.pool.destination(self.pool.forward(located.dual()));
    for id in candidates {
      if id.is_ghost() {
        continue;
      }
      if self.vertices[id.as_usize()].distance_to_sq(x, y) < tol_sq {
        return Some(id);
      }
    }
    None
  }

  fn insert_at(&mut self, located: EdgeId, vid: VertexId, stack: &mut Vec<EdgeId>) {
    let apex = self.pool.destination(self.pool.forward(located));
    if apex.is_ghost() {
      self.insert_exterior(located, vid, stack);
    } else {
      self.insert_in_face(located, vid, stack);
    }
  }

  // Subdivides the real face left of e0 into three triangles around vid;
  // falls back to an edge split when the point sits on a face edge.
  fn insert_in_face(&mut self, e0: EdgeId, vid: VertexId, stack: &mut Vec<EdgeId>) {
    let [x, y] = self.coords(vid);
    let e1 = self.pool.forward(e0);
    let e2 = self.pool.forward(e1);

    for edge in [e0, e1, e2] {
      let a = self.coords(self.pool.origin(edge));
      let b = self.coords(self.pool.destination(edge));
      if self.predicates.orientation_test(&a, &b, &[x, y]) <= 0 {
        self.split_edge_core(edge, vid, stack);
        return;
      }
    }

    let region = self.face_region_interior_index(e0);
    let p = self.pool.origin(e0);
    let q = self.pool.origin(e1);
    let r = self.pool.origin(e2);
    let vp = self.pool.allocate(vid, p);
    let vq = self.pool.allocate(vid, q);
    let vr = self.pool.allocate(vid, r);
    self.mark_spokes_interior(region, &[vp, vq, vr]);

    // face (p, q, v)
    self.pool.set_forward(e0, vq.dual());
    self.pool.set_forward(vq.dual(), vp);
    self.pool.set_forward(vp, e0);
    // face (q, r, v)
    self.pool.set_forward(e1, vr.dual());
    self.pool.set_forward(vr.dual(), vq);
    self.pool.set_forward(vq, e1);
    // face (r, p, v)
    self.pool.set_forward(e2, vp.dual());
    self.pool.set_forward(vp.dual(), vr);
    self.pool.set_forward(vr, e2);

    stack.push(e0);
    stack.push(e1);
    stack.push(e2);
    self.search_edge = vp;
  }

  // Splits edge e (both endpoints real) at vid, which lies on it. Handles
  // a ghost face on either side; constraint marks flow to both halves.
  pub(crate) fn split_edge_core(&mut self, e: EdgeId, vid: VertexId, stack: &mut Vec<EdgeId>) {
    let mut e = e;
    // operate with a real face on the left when one side is ghost
    if self
      .pool
      .destination(self.pool.forward(e))
      .is_ghost()
    {
      e = e.dual();
    }
    let p = self.pool.origin(e);
    let q = self.pool.destination(e);
    debug_assert!(!p.is_ghost() && !q.is_ghost());
    let left_region = self.face_region_interior_index(e);
    let right_region = self.face_region_interior_index(e.dual());
    let f1 = self.pool.forward(e);
    let f2 = self.pool.reverse(e);
    let r = self.pool.destination(f1);
    let d = e.dual();
    let g1 = self.pool.forward(d);
    let g2 = self.pool.reverse(d);
    let s = self.pool.destination(g1);

    // e shrinks to p -> v, vq spans v -> q
    self.pool.set_vertices(e, p, vid);
    let vq = self.pool.allocate(vid, q);
    self.pool.copy_constraint_marks(e, vq);

    // left side: (p, v, r) and (v, q, r)
    debug_assert!(!r.is_ghost());
    let vr = self.pool.allocate(vid, r);
    self.mark_spokes_interior(left_region, &[vr]);
    self.pool.set_forward(e, vr);
    self.pool.set_forward(vr, f2);
    self.pool.set_forward(f2, e);
    self.pool.set_forward(vq, f1);
    self.pool.set_forward(f1, vr.dual());
    self.pool.set_forward(vr.dual(), vq);
    stack.push(f1);
    stack.push(f2);

    if s.is_ghost() {
      // hull edge: rebuild the two ghost faces with a new ghost spoke
      let pg = g1; // p -> g
      let gq = g2; // g -> q
      let gv = self.pool.allocate(vid, VertexId::GHOST);
      self.pool.set_forward(d, pg);
      self.pool.set_forward(pg, gv.dual());
      self.pool.set_forward(gv.dual(), d);
      self.pool.set_forward(vq.dual(), gv);
      self.pool.set_forward(gv, gq);
      self.pool.set_forward(gq, vq.dual());
    } else {
      // right side: (v, p, s) and (q, v, s)
      let vs = self.pool.allocate(vid, s);
      self.mark_spokes_interior(right_region, &[vs]);
      self.pool.set_forward(d, g1);
      self.pool.set_forward(g1, vs.dual());
      self.pool.set_forward(vs.dual(), d);
      self.pool.set_forward(vq.dual(), vs);
      self.pool.set_forward(vs, g2);
      self.pool.set_forward(g2, vq.dual());
      stack.push(g1);
      stack.push(g2);
    }
    self.search_edge = vq;
  }

  // Extends the convex hull: fans vid to every hull edge it can see,
  // splices it between the two extreme boundary edges, and rebuilds the
  // ghost triangles.
  fn insert_exterior(&mut self, located: EdgeId, vid: VertexId, stack: &mut Vec<EdgeId>) {
    let [x, y] = self.coords(vid);
    let q = [x, y];
    // located edge has the ghost face on its left; its dual runs along
    // the perimeter with the interior on the left
    let start = located.dual();

    // the point may sit exactly on the hull edge
    {
      let a = self.coords(self.pool.origin(start));
      let b = self.coords(self.pool.destination(start));
      let det = self.predicates.half_plane(&a, &b, &q);
      let len_sq = (b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2);
      if det <= 0.0 && det * det <= self.thresholds().vertex_tolerance_sq() * len_sq {
        let t = ((q[0] - a[0]) * (b[0] - a[0]) + (q[1] - a[1]) * (b[1] - a[1])) / len_sq;
        if (0.0..=1.0).contains(&t) {
          self.split_edge_core(start, vid, stack);
          return;
        }
      }
    }

    // find a visible hull edge, then grow the contiguous visible run
    let perimeter_cap = self.pool.count() + 2;
    let mut first = start;
    let mut found = false;
    for _ in 0..perimeter_cap {
      if self.hull_edge_visible(first, &q) {
        found = true;
        break;
      }
      first = self.next_hull_edge(first);
    }
    if !found {
      // numerically trapped between faces; attach to the nearest hull edge
      debug!("exterior insertion found no visible hull edge, splitting nearest");
      let nearest = self.nearest_hull_edge(&q);
      self.split_edge_core(nearest, vid, stack);
      return;
    }
    let mut run = vec![first];
    for _ in 0..perimeter_cap {
      let prev = self.prev_hull_edge(run[0]);
      if prev != *run.last().unwrap() && self.hull_edge_visible(prev, &q) {
        run.insert(0, prev);
      } else {
        break;
      }
    }
    for _ in 0..perimeter_cap {
      let next = self.next_hull_edge(*run.last().unwrap());
      if next != run[0] && self.hull_edge_visible(next, &q) {
        run.push(next);
      } else {
        break;
      }
    }

    // hull chain a_0 .. a_k spanned by the visible run
    let k = run.len();
    let mut chain = Vec::with_capacity(k + 1);
    chain.push(self.pool.origin(run[0]));
    for &h in &run {
      chain.push(self.pool.destination(h));
    }

    // ghost spokes at the ends survive; the interior ones are freed
    let a0_spoke = self.pool.forward(run[0].dual()); // a_0 -> g
    let g_ak = self.pool.reverse(run[k - 1].dual()); // g -> a_k
    let interior_spokes: Vec<EdgeId> = run[1..]
      .iter()
      .map(|&h| self.pool.forward(h.dual()))
      .collect();

    let spokes: Vec<EdgeId> = chain
      .iter()
      .map(|&a| self.pool.allocate(vid, a))
      .collect();
    let gv = self.pool.allocate(vid, VertexId::GHOST);

    // real fan triangles (a_{i+1}, a_i, v)
    for i in 0..k {
      let h = run[i];
      self.pool.set_forward(h.dual(), spokes[i].dual());
      self.pool.set_forward(spokes[i].dual(), spokes[i + 1]);
      self.pool.set_forward(spokes[i + 1], h.dual());
      stack.push(h);
    }
    // ghost face (v, a_0, g)
    self.pool.set_forward(spokes[0], a0_spoke);
    self.pool.set_forward(a0_spoke, gv.dual());
    self.pool.set_forward(gv.dual(), spokes[0]);
    // ghost face (a_k, v, g)
    self.pool.set_forward(spokes[k].dual(), gv);
    self.pool.set_forward(gv, g_ak);
    self.pool.set_forward(g_ak, spokes[k].dual());

    for spoke in interior_spokes {
      self.pool.free(spoke);
    }
    self.search_edge = spokes[0];
  }

  fn hull_edge_visible(&self, h: EdgeId, q: &[f64; 2]) -> bool {
    let a = self.coords(self.pool.origin(h));
    let b = self.coords(self.pool.destination(h));
    self.predicates.half_plane(&a, &b, q) < 0.0
  }

  fn nearest_hull_edge(&self, q: &[f64; 2]) -> EdgeId {
    let start = self
      .any_hull_edge()
      .expect("bootstrapped mesh has a hull");
    let mut best = start;
    let mut best_dist = f64::INFINITY;
    let mut h = start;
    loop {
      let a = self.coords(self.pool.origin(h));
      let b = self.coords(self.pool.destination(h));
      let len_sq = (b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2);
      let det = crate::predicates::area(&a, &b, q);
      let dist = det * det / len_sq.max(f64::MIN_POSITIVE);
      if dist < best_dist {
        best_dist = dist;
        best = h;
      }
      h = self.next_hull_edge(h);
      if h == start {
        break;
      }
    }
    best
  }

  // Perimeter navigation; h runs counterclockwise with the interior on
  // its left and the ghost face left of its dual.
  pub(crate) fn next_hull_edge(&self, h: EdgeId) -> EdgeId {
    let s = self.pool.reverse(h.dual()); // g -> q
    self.pool.reverse(s.dual()).dual()
  }

  pub(crate) fn prev_hull_edge(&self, h: EdgeId) -> EdgeId {
    let s = self.pool.forward(h.dual()); // p -> g
    self.pool.forward(s.dual()).dual()
  }

  fn any_hull_edge(&self) -> Option<EdgeId> {
    for e in self.pool.base_edges() {
      if self.pool.destination(e).is_ghost() {
        // spoke x -> g: the hull edge leaving x
        return Some(self.pool.reverse(e).dual());
      }
      if self.pool.origin(e).is_ghost() {
        return Some(self.pool.reverse(e.dual()).dual());
      }
    }
    None
  }

  // -- Delaunay restoration ---------------------------------------------

  /// Drains the flip stack in LIFO order, flipping every unconstrained
  /// edge whose quadrilateral violates the in-circle criterion. A zero
  /// predicate means "not strictly inside" and never flips.
  pub(crate) fn restore_delaunay(&mut self, stack: &mut Vec<EdgeId>) {
    while let Some(e) = stack.pop() {
      if !self.pool.is_live(e) || self.pool.is_constrained(e) {
        continue;
      }
      let p = self.pool.origin(e);
      let q = self.pool.destination(e);
      if p.is_ghost() || q.is_ghost() {
        continue;
      }
      let f1 = self.pool.forward(e);
      let r = self.pool.destination(f1);
      let s = self.pool.destination(self.pool.forward(e.dual()));
      if r.is_ghost() || s.is_ghost() {
        continue;
      }
      let verdict = self.predicates.in_circle(
        &self.coords(p),
        &self.coords(q),
        &self.coords(r),
        &self.coords(s),
      );
      if verdict > 0.0 {
        self.flip(e, stack);
      }
    }
  }

  // Lawson flip of the diagonal e = p->q between (p,q,r) and (q,p,s);
  // afterwards e spans r->s between (s,q,r) and (p,s,r).
  pub(crate) fn flip(&mut self, e: EdgeId, stack: &mut Vec<EdgeId>) {
    let d = e.dual();
    let f1 = self.pool.forward(e); // q -> r
    let f2 = self.pool.reverse(e); // r -> p
    let g1 = self.pool.forward(d); // p -> s
    let g2 = self.pool.reverse(d); // s -> q
    let r = self.pool.destination(f1);
    let s = self.pool.destination(g1);

    self.pool.set_vertices(e, r, s);
    // face (s, q, r)
    self.pool.set_forward(e, g2);
    self.pool.set_forward(g2, f1);
    self.pool.set_forward(f1, e);
    // face (p, s, r)
    self.pool.set_forward(d, f2);
    self.pool.set_forward(f2, g1);
    self.pool.set_forward(g1, d);

    stack.push(f1);
    stack.push(f2);
    stack.push(g1);
    stack.push(g2);
    self.search_edge = e;
  }

  // -- lookups -----------------------------------------------------------

  pub(crate) fn edge_with_origin(&self, vid: VertexId) -> Option<EdgeId> {
    if self.pool.is_live(self.search_edge) {
      if self.pool.origin(self.search_edge) == vid {
        return Some(self.search_edge);
      }
      for e in self.pool.pinwheel(self.search_edge) {
        if self.pool.origin(e) == vid {
          return Some(e);
        }
      }
    }
    for e in self.pool.base_edges() {
      if self.pool.origin(e) == vid {
        return Some(e);
      }
      if self.pool.destination(e) == vid {
        return Some(e.dual());
      }
    }
    None
  }

  /// Searches the pinwheel of `from` for the directed edge to `to`.
  pub(crate) fn find_edge_between(&self, from: VertexId, to: VertexId) -> Option<EdgeId> {
    let anchor = self.edge_with_origin(from)?;
    for e in self.pool.pinwheel(anchor) {
      if self.pool.destination(e) == to {
        return Some(e);
      }
    }
    None
  }

  // -- constraint-region bookkeeping ------------------------------------

  // Region-interior index of the face left of e. Usually read straight
  // off an interior-marked edge; a face walled in by borders on all three
  // sides falls back to centroid containment.
  pub(crate) fn face_region_interior_index(&self, e: EdgeId) -> Option<usize> {
    let edges = [e, self.pool.forward(e), self.pool.reverse(e)];
    let mut all_members = true;
    for d in edges {
      if let Some(k) = self.pool.constraint_region_interior_index(d) {
        return Some(k);
      }
      if !self.pool.is_constraint_region_border(d) {
        all_members = false;
      }
    }
    if !all_members {
      return None;
    }
    let p = self.pool.origin(e);
    let q = self.pool.destination(e);
    let a = self.pool.destination(self.pool.forward(e));
    if p.is_ghost() || q.is_ghost() || a.is_ghost() {
      return None;
    }
    let [px, py] = self.coords(p);
    let [qx, qy] = self.coords(q);
    let [ax, ay] = self.coords(a);
    self.region_index_at((px + qx + ax) / 3.0, (py + qy + ay) / 3.0)
  }

  /// Innermost region constraint containing (x, y), hole polarity
  /// respected: a point whose innermost containing ring is a hole belongs
  /// to no region.
  pub(crate) fn region_index_at(&self, x: f64, y: f64) -> Option<usize> {
    use crate::data::constraint::{ring_contains, ring_signed_area};
    let mut best: Option<(usize, f64, bool)> = None;
    for (k, c) in self.constraints.iter().enumerate() {
      if !c.defines_constrained_region() {
        continue;
      }
      if !ring_contains(c.vertices(), x, y) {
        continue;
      }
      let area = ring_signed_area(c.vertices()).abs();
      if best.map_or(true, |(_, smallest, _)| area < smallest) {
        best = Some((k, area, c.is_hole()));
      }
    }
    match best {
      Some((_, _, true)) | None => None,
      Some((k, _, false)) => Some(k),
    }
  }

  // Propagates an interior-region mark to freshly allocated spokes.
  fn mark_spokes_interior(&mut self, region: Option<usize>, spokes: &[EdgeId]) {
    if let Some(k) = region {
      for &s in spokes {
        self.pool.set_constraint_region_interior_index(s, k);
      }
    }
  }
}

fn is_face_representative(pool: &EdgePool, e: EdgeId) -> bool {
  let f = pool.forward(e);
  let r = pool.reverse(e);
  !f.is_none() && !r.is_none() && e.index() < f.index() && e.index() < r.index()
}

/// Read-only point location over a finished TIN. Owns its walk state so
/// queries never disturb the triangulation's own search edge.
pub struct TinNavigator<'a> {
  tin: &'a IncrementalTin,
  walker: StochasticLawsonWalk,
  search: Option<EdgeId>,
}

impl<'a> TinNavigator<'a> {
  /// The triangle containing (x, y), or None when the query lies outside
  /// the convex hull or the TIN is not bootstrapped.
  pub fn containing_triangle(&mut self, x: f64, y: f64) -> Option<SimpleTriangle<'a>> {
    let e = self.locate(x, y)?;
    let apex = self.tin.pool.destination(self.tin.pool.forward(e));
    if apex.is_ghost() {
      return None;
    }
    Some(SimpleTriangle::from_edge(
      &self.tin.pool,
      &self.tin.vertices,
      &self.tin.predicates,
      e,
    ))
  }

  /// The located edge itself; for exterior queries this borders the ghost
  /// face on the exit side.
  pub fn containing_edge(&mut self, x: f64, y: f64) -> Option<EdgeHandle<'a>> {
    let e = self.locate(x, y)?;
    Some(EdgeHandle::new(&self.tin.pool, &self.tin.vertices, e))
  }

  /// Nearest mesh vertex by greedy descent from the located face.
  pub fn nearest_vertex(&mut self, x: f64, y: f64) -> Option<&'a Vertex> {
    let e = self.locate(x, y)?;
    let pool = &self.tin.pool;
    let mut best = pool.origin(e);
    if best.is_ghost() {
      best = pool.destination(e);
    }
    let mut best_dist = self.tin.vertex(best).distance_to_sq(x, y);
    let mut improved = true;
    while improved {
      improved = false;
      let anchor = self.tin.edge_with_origin(best)?;
      for spoke in pool.pinwheel(anchor) {
        let n = pool.destination(spoke);
        if n.is_ghost() {
          continue;
        }
        let d = self.tin.vertex(n).distance_to_sq(x, y);
        if d < best_dist {
          best = n;
          best_dist = d;
          improved = true;
        }
      }
    }
    Some(self.tin.vertex(best))
  }

  fn locate(&mut self, x: f64, y: f64) -> Option<EdgeId> {
    let seed = self.search?;
    let e = self.walker.locate(
      &self.tin.pool,
      &self.tin.vertices,
      &self.tin.predicates,
      seed,
      x,
      y,
    );
    self.search = Some(e);
    Some(e)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn v(x: f64, y: f64) -> Vertex {
    Vertex::new(x, y, 0.0)
  }

  fn grid(n: usize, spacing: f64) -> Vec<Vertex> {
    let mut pts = Vec::new();
    for i in 0..n {
      for j in 0..n {
        pts.push(v(i as f64 * spacing, j as f64 * spacing));
      }
    }
    pts
  }

  #[test]
  fn bootstrap_needs_noncollinear_points() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    assert!(!tin.add_vertices(vec![v(0.0, 0.0), v(1.0, 0.0), v(2.0, 0.0)]).unwrap());
    assert!(!tin.is_bootstrapped());
    // a vertex off the line completes the bootstrap and empties the buffer
    assert!(tin.add(v(1.0, 1.0)).unwrap());
    assert!(tin.is_bootstrapped());
    assert_eq!(tin.vertex_count(), 4);
    // two triangles; the hull carries four edges because (1,0) lies on it
    let count = tin.count_triangles();
    assert_eq!(count.valid, 2);
    assert_eq!(count.ghost, 4);
    assert!(tin.is_conformant());
  }

  #[test]
  fn three_by_three_grid() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin.add_vertices(grid(3, 1.0)).unwrap();
    let count = tin.count_triangles();
    assert_eq!(count.valid, 8);
    assert_eq!(count.ghost, 8);
    let b = tin.bounds().unwrap();
    assert_eq!((b.min_x(), b.min_y(), b.max_x(), b.max_y()), (0.0, 0.0, 2.0, 2.0));
    assert!(tin.is_conformant());
  }

  #[test]
  fn five_by_five_grid() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin.add_vertices(grid(5, 1.0)).unwrap();
    assert_eq!(tin.count_triangles().valid, 32);
    assert!(tin.is_conformant());
  }

  #[test]
  fn duplicate_vertices_merge() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin.add_vertices(grid(3, 1.0)).unwrap();
    let n = tin.vertex_count();
    assert!(!tin.add(v(1.0, 1.0)).unwrap());
    // nudge within the vertex tolerance also merges
    assert!(!tin.add(v(1.0 + 1e-7, 1.0)).unwrap());
    assert_eq!(tin.vertex_count(), n);
    assert_eq!(tin.count_triangles().valid, 8);
  }

  #[test]
  fn hull_extension_keeps_delaunay() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin.add_vertices(grid(3, 1.0)).unwrap();
    // far outside the hull on each side
    for p in [v(5.0, 1.0), v(-4.0, 1.0), v(1.0, 6.0), v(1.0, -5.0)] {
      assert!(tin.add(p).unwrap());
      assert!(tin.is_conformant());
    }
    assert_eq!(tin.perimeter().len(), 4);
  }

  #[test]
  fn euler_invariant_on_random_cloud() {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    let mut rng = SmallRng::seed_from_u64(7);
    let mut tin = IncrementalTin::new(0.1).unwrap();
    let mut inserted = 0usize;
    for _ in 0..200 {
      let x: f64 = rng.gen_range(0.0..10.0);
      let y: f64 = rng.gen_range(0.0..10.0);
      if tin.add(v(x, y)).unwrap() {
        inserted += 1;
      }
    }
    assert!(tin.is_bootstrapped());
    assert_eq!(tin.vertex_count(), inserted);
    assert!(tin.is_conformant());
    // counting the ghost as one extra vertex, Euler's formula holds:
    // V - E + F = 2 with F = valid + ghost + nothing else
    let count = tin.count_triangles();
    let vtx = tin.vertex_count() + 1;
    let faces = count.valid + count.ghost;
    assert_eq!(vtx + faces, tin.edge_count() + 2);
  }

  #[test]
  fn perimeter_is_closed_and_ccw() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin.add_vertices(grid(4, 1.0)).unwrap();
    let hull = tin.perimeter();
    assert_eq!(hull.len(), 12);
    for pair in hull.windows(2) {
      assert_eq!(pair[0].b().coords(), pair[1].a().coords());
    }
    assert_eq!(hull.last().unwrap().b().coords(), hull[0].a().coords());
    // shoelace over the hull is positive
    let area: f64 = hull
      .iter()
      .map(|e| e.a().x() * e.b().y() - e.b().x() * e.a().y())
      .sum();
    assert!(area > 0.0);
  }

  #[test]
  fn split_edge_at_midpoint() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin.add_vertices(vec![v(0.0, 0.0), v(2.0, 0.0), v(1.0, 2.0), v(1.0, -2.0)]).unwrap();
    let edge = tin.find_edge_between(VertexId(0), VertexId(1)).unwrap();
    let original = tin.handle(edge).length();
    let vid = tin.split_edge(edge, 0.5, 7.0).unwrap().unwrap();
    let mid = tin.vertex(vid);
    assert!(mid.is_synthetic());
    assert_eq!(mid.z(), 7.0);
    assert_eq!(mid.x(), 1.0);
    assert_eq!(mid.y(), 0.0);
    // the two halves cover the original edge
    let h1 = tin.find_edge_between(VertexId(0), vid).unwrap();
    let h2 = tin.find_edge_between(vid, VertexId(1)).unwrap();
    let total = tin.handle(h1).length() + tin.handle(h2).length();
    assert!((total - original).abs() <= 1e-12 * original);
    assert!(tin.is_conformant());
  }

  #[test]
  fn split_edge_rejects_endpoint_parameters() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin.add_vertices(vec![v(0.0, 0.0), v(1.0, 0.0), v(0.5, 1.0)]).unwrap();
    let edge = tin.find_edge_between(VertexId(0), VertexId(1)).unwrap();
    assert_eq!(tin.split_edge(edge, 1e-9, 0.0).unwrap(), None);
    assert_eq!(tin.split_edge(edge, 1.0 - 1e-9, 0.0).unwrap(), None);
  }

  #[test]
  fn add_and_return_edge_origin() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    assert!(tin.add_and_return_edge(v(0.0, 0.0)).unwrap().is_none());
    assert!(tin.add_and_return_edge(v(1.0, 0.0)).unwrap().is_none());
    let e = tin.add_and_return_edge(v(0.5, 1.0)).unwrap().unwrap();
    assert_eq!(e.a().coords(), [0.5, 1.0]);
    let e = tin.add_and_return_edge(v(0.5, 0.25)).unwrap().unwrap();
    assert_eq!(e.a().coords(), [0.5, 0.25]);
  }

  #[test]
  fn rejects_non_finite_and_disposed() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    assert_eq!(tin.add(v(f64::NAN, 0.0)), Err(Error::NonFiniteCoordinate));
    tin.dispose();
    assert_eq!(tin.add(v(0.0, 0.0)), Err(Error::TinDisposed));
    assert!(tin.is_disposed());
  }

  #[test]
  fn withheld_vertices_are_skipped() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    assert!(!tin.add(v(0.0, 0.0).as_withheld()).unwrap());
    assert_eq!(tin.vertex_count(), 0);
  }

  #[test]
  fn navigator_nearest_vertex() {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin.add_vertices(grid(3, 1.0)).unwrap();
    let mut nav = tin.navigator();
    let n = nav.nearest_vertex(1.2, 1.1).unwrap();
    assert_eq!(n.coords(), [1.0, 1.0]);
    let n = nav.nearest_vertex(10.0, 10.0).unwrap();
    assert_eq!(n.coords(), [2.0, 2.0]);
  }

  use proptest::prelude::*;

  proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // every unconstrained interior edge of a freshly built mesh satisfies
    // the local Delaunay criterion, whatever the insertion order
    #[test]
    fn random_clouds_are_delaunay(
      seed in 0u64..1000,
      n in 10usize..80,
    ) {
      use rand::rngs::SmallRng;
      use rand::{Rng, SeedableRng};
      let mut rng = SmallRng::seed_from_u64(seed);
      let mut tin = IncrementalTin::with_seed(0.5, seed).unwrap();
      for _ in 0..n {
        let x: f64 = rng.gen_range(-5.0..5.0);
        let y: f64 = rng.gen_range(-5.0..5.0);
        tin.add(v(x, y)).unwrap();
      }
      prop_assume!(tin.is_bootstrapped());
      prop_assert!(tin.is_conformant());
      let count = tin.count_triangles();
      // closed topology: Euler's formula with the ghost as one vertex
      prop_assert_eq!(
        tin.vertex_count() + 1 + count.valid + count.ghost,
        tin.edge_count() + 2
      );
      // the ghost faces tile the unbounded face: one per hull edge
      prop_assert_eq!(count.ghost, tin.perimeter().len());
    }

    // re-inserting every vertex of a mesh changes nothing
    #[test]
    fn reinsertion_is_idempotent(seed in 0u64..1000) {
      use rand::rngs::SmallRng;
      use rand::{Rng, SeedableRng};
      let mut rng = SmallRng::seed_from_u64(seed);
      let pts: Vec<Vertex> = (0..30)
        .map(|_| v(rng.gen_range(0.0..4.0), rng.gen_range(0.0..4.0)))
        .collect();
      let mut tin = IncrementalTin::new(0.5).unwrap();
      tin.add_vertices(pts.clone()).unwrap();
      prop_assume!(tin.is_bootstrapped());
      let vertices = tin.vertex_count();
      let edges = tin.edge_count();
      for p in pts {
        prop_assert!(!tin.add(p).unwrap());
      }
      prop_assert_eq!(tin.vertex_count(), vertices);
      prop_assert_eq!(tin.edge_count(), edges);
    }
  }
}
