use std::cell::OnceCell;

use crate::data::quad_edge::{EdgeHandle, EdgeId, EdgePool};
use crate::data::vertex::{CoordinatePair, Vertex};
use crate::data::Circumcircle;
use crate::predicates::{self, Predicates};

/// A transient view of one triangular face: three cyclically linked
/// directed edges and a lazily memoized circumcircle.
///
/// Vertex A lies opposite edge A (trigonometric convention), so vertex A
/// is the origin of edge C, vertex B the origin of edge A, and vertex C
/// the origin of edge B.
pub struct SimpleTriangle<'a> {
  pool: &'a EdgePool,
  vertices: &'a [Vertex],
  predicates: &'a Predicates,
  edge_a: EdgeId,
  edge_b: EdgeId,
  edge_c: EdgeId,
  circumcircle: OnceCell<Circumcircle>,
}

impl<'a> std::fmt::Debug for SimpleTriangle<'a> {
  fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(
      fmt,
      "t{}({:?}, {:?}, {:?})",
      self.index(),
      self.edge_a,
      self.edge_b,
      self.edge_c
    )
  }
}

impl<'a> SimpleTriangle<'a> {
  /// Builds the view of the face to the left of `edge`, discovering the
  /// other two edges through the forward links.
  pub(crate) fn from_edge(
    pool: &'a EdgePool,
    vertices: &'a [Vertex],
    predicates: &'a Predicates,
    edge: EdgeId,
  ) -> SimpleTriangle<'a> {
    let edge_b = pool.forward(edge);
    let edge_c = pool.forward(edge_b);
    debug_assert_eq!(pool.forward(edge_c), edge, "face is not a triangle");
    SimpleTriangle {
      pool,
      vertices,
      predicates,
      edge_a: edge,
      edge_b,
      edge_c,
      circumcircle: OnceCell::new(),
    }
  }

  fn handle(&self, id: EdgeId) -> EdgeHandle<'a> {
    EdgeHandle::new(self.pool, self.vertices, id)
  }

  pub fn edge_a(&self) -> EdgeHandle<'a> {
    self.handle(self.edge_a)
  }

  pub fn edge_b(&self) -> EdgeHandle<'a> {
    self.handle(self.edge_b)
  }

  pub fn edge_c(&self) -> EdgeHandle<'a> {
    self.handle(self.edge_c)
  }

  pub fn vertex_a(&self) -> &'a Vertex {
    self.handle(self.edge_c).a()
  }

  pub fn vertex_b(&self) -> &'a Vertex {
    self.handle(self.edge_a).a()
  }

  pub fn vertex_c(&self) -> &'a Vertex {
    self.handle(self.edge_b).a()
  }

  /// Smallest base index of the three edges; stable for a given face.
  pub fn index(&self) -> usize {
    self
      .edge_a
      .base_index()
      .min(self.edge_b.base_index())
      .min(self.edge_c.base_index())
  }

  pub fn is_ghost(&self) -> bool {
    self.vertex_a().is_null_vertex()
      || self.vertex_b().is_null_vertex()
      || self.vertex_c().is_null_vertex()
  }

  /// Signed area; positive for the counterclockwise faces the TIN
  /// maintains, NaN for ghosts.
  pub fn area(&self) -> f64 {
    predicates::area(
      &self.vertex_a().coords(),
      &self.vertex_b().coords(),
      &self.vertex_c().coords(),
    ) / 2.0
  }

  pub fn centroid(&self) -> CoordinatePair {
    let a = self.vertex_a();
    let b = self.vertex_b();
    let c = self.vertex_c();
    CoordinatePair::new(
      (a.x() + b.x() + c.x()) / 3.0,
      (a.y() + b.y() + c.y()) / 3.0,
    )
  }

  pub fn shortest_edge(&self) -> EdgeHandle<'a> {
    let mut best = self.edge_a();
    let mut best_len = best.length_sq();
    for candidate in [self.edge_b(), self.edge_c()] {
      let len = candidate.length_sq();
      if len < best_len {
        best = candidate;
        best_len = len;
      }
    }
    best
  }

  /// Circumcircle of the face, computed on first use and memoized for the
  /// lifetime of the view. Ghost and collinear faces yield the infinite
  /// sentinel.
  pub fn circumcircle(&self) -> &Circumcircle {
    self.circumcircle.get_or_init(|| {
      if self.is_ghost() {
        return Circumcircle::undefined();
      }
      let mut circle = Circumcircle::undefined();
      self.predicates.circumcircle(
        &self.vertex_a().coords(),
        &self.vertex_b().coords(),
        &self.vertex_c().coords(),
        &mut circle,
      );
      circle
    })
  }
}
