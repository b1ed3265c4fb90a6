use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::data::quad_edge::{EdgeId, EdgePool};
use crate::data::vertex::{Vertex, VertexId};
use crate::predicates::Predicates;

/// Counters accumulated across all walks performed by one walker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkDiagnostics {
  pub walks: u64,
  pub tests: u64,
  pub exterior_walks: u64,
  pub steps: u64,
  pub failures: u64,
}

/// Point location by stochastic Lawson walk.
///
/// From a seed edge, each step tests the two edges of the current triangle
/// not shared with the previous one, in randomized order, and crosses the
/// first whose half-plane test puts the query on the right. The walk ends
/// inside a triangle, or at the hull when it crosses into a ghost face.
///
/// The random source is seeded by the caller so runs are reproducible.
#[derive(Debug, Clone)]
pub struct StochasticLawsonWalk {
  rng: SmallRng,
  walks: u64,
  tests: u64,
  exterior_walks: u64,
  steps: u64,
  failures: u64,
}

impl StochasticLawsonWalk {
  pub fn new(seed: u64) -> StochasticLawsonWalk {
    StochasticLawsonWalk {
      rng: SmallRng::seed_from_u64(seed),
      walks: 0,
      tests: 0,
      exterior_walks: 0,
      steps: 0,
      failures: 0,
    }
  }

  pub fn diagnostics(&self) -> WalkDiagnostics {
    WalkDiagnostics {
      walks: self.walks,
      tests: self.tests,
      exterior_walks: self.exterior_walks,
      steps: self.steps,
      failures: self.failures,
    }
  }

  pub fn reset_diagnostics(&mut self) {
    self.walks = 0;
    self.tests = 0;
    self.exterior_walks = 0;
    self.steps = 0;
    self.failures = 0;
  }

  /// Locates (x, y) starting from `seed`. The result is a directed edge
  /// whose left face contains the query; if the query lies outside the
  /// convex hull, the left face of the result is the ghost face on the
  /// exit side and both endpoints of the result are real.
  pub fn locate(
    &mut self,
    pool: &EdgePool,
    vertices: &[Vertex],
    predicates: &Predicates,
    seed: EdgeId,
    x: f64,
    y: f64,
  ) -> EdgeId {
    let q = [x, y];
    self.walks += 1;

    let mut e = interior_side(pool, seed);
    // start with the query on the left of e
    self.tests += 1;
    if predicates.half_plane(&coords(vertices, pool.origin(e)), &coords(vertices, pool.destination(e)), &q) < 0.0
    {
      e = e.dual();
    }

    let max_steps = (pool.base_capacity() as u64 + 2) * 2;
    let mut walk_steps = 0u64;
    loop {
      self.steps += 1;
      walk_steps += 1;
      if walk_steps > max_steps {
        // runaway walk; report the best edge found so far
        self.failures += 1;
        return e;
      }

      let f = pool.forward(e);
      let apex = pool.destination(f);
      if apex.is_ghost() {
        self.exterior_walks += 1;
        return e;
      }
      let r = pool.reverse(e);

      let (first, second) = if self.rng.gen_bool(0.5) {
        (f, r)
      } else {
        (r, f)
      };
      match self.cross(pool, vertices, predicates, first, &q) {
        Some(next) => {
          e = next;
          continue;
        }
        None => {}
      }
      match self.cross(pool, vertices, predicates, second, &q) {
        Some(next) => {
          e = next;
          continue;
        }
        None => {}
      }
      return e;
    }
  }

  // Crosses `edge` when the query is strictly on its right; the returned
  // edge has the query on its left side again.
  fn cross(
    &mut self,
    pool: &EdgePool,
    vertices: &[Vertex],
    predicates: &Predicates,
    edge: EdgeId,
    q: &[f64; 2],
  ) -> Option<EdgeId> {
    self.tests += 1;
    let a = coords(vertices, pool.origin(edge));
    let b = coords(vertices, pool.destination(edge));
    if predicates.half_plane(&a, &b, q) < 0.0 {
      Some(edge.dual())
    } else {
      None
    }
  }
}

fn coords(vertices: &[Vertex], id: VertexId) -> [f64; 2] {
  debug_assert!(!id.is_ghost(), "ghost vertex in a predicate");
  vertices[id.as_usize()].coords()
}

// Any edge of a ghost face maps to the hull edge with both endpoints real;
// real faces pass through unchanged.
fn interior_side(pool: &EdgePool, e: EdgeId) -> EdgeId {
  let mut edge = e;
  for _ in 0..3 {
    if !pool.origin(edge).is_ghost() && !pool.destination(edge).is_ghost() {
      return edge;
    }
    edge = pool.forward(edge);
  }
  edge
}
