//! Incremental constrained Delaunay triangulation with mesh refinement.
//!
//! The crate builds a triangulated irregular network (TIN) over a planar
//! point set one vertex at a time, embeds linear and polygonal constraints
//! into the result, and optionally refines the mesh to a minimum-angle
//! quality target with Ruppert's algorithm using Shewchuk off-centers.
//!
//! ```
//! use tinmesh::data::Vertex;
//! use tinmesh::IncrementalTin;
//!
//! let mut tin = IncrementalTin::new(1.0)?;
//! for i in 0..3 {
//!   for j in 0..3 {
//!     tin.add(Vertex::new(i as f64, j as f64, 0.0))?;
//!   }
//! }
//! assert_eq!(tin.count_triangles().valid, 8);
//! # Ok::<(), tinmesh::Error>(())
//! ```
//!
//! The mesh lives in a quad-edge arena closed at the convex hull by ghost
//! triangles around a single shared ghost vertex. Point location runs a
//! stochastic Lawson walk, and the geometric predicates fall back to
//! extended (double-double) precision whenever a plain double result is
//! indistinguishable from zero at the mesh's tolerance scale.

use thiserror::Error as ThisError;

pub mod algorithms;
pub mod data;
mod extended;
pub mod interpolation;
pub(crate) mod predicates;
mod thresholds;

pub use algorithms::refinement::{RefinementOptions, RuppertRefiner, SteinerKind};
pub use algorithms::triangulation::{
  ConstraintOptions, IncrementalTin, TinNavigator, TriangleCount, WalkDiagnostics,
};
pub use extended::DoubleDouble;
pub use predicates::{area, PredicateDiagnostics, Predicates};
pub use thresholds::Thresholds;

/// Errors surfaced by the public API. Geometric degeneracies are never
/// errors; they flow through predicate results as signed zeros and
/// infinite circumcircles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum Error {
  /// A constraint carried fewer vertices than its kind requires.
  #[error("constraint has too few vertices")]
  InsufficientVertices,
  #[error("vertex coordinate is NaN or infinite")]
  NonFiniteCoordinate,
  #[error("auxiliary index exceeds one byte")]
  AuxiliaryIndexOutOfRange,
  #[error("nominal point spacing must be a positive finite value")]
  NominalSpacingOutOfRange,
  #[error("minimum angle must lie strictly between 0 and 60 degrees")]
  MinAngleOutOfRange,
  #[error("constraint list is empty")]
  EmptyConstraintList,
  #[error("constraint capacity of 8190 exceeded")]
  TooManyConstraints,
  #[error("polygon constraint intersects itself")]
  SelfIntersectingConstraint,
  /// The operation needs a bootstrapped mesh.
  #[error("triangulation is not bootstrapped")]
  NotBootstrapped,
  #[error("triangulation has been disposed")]
  TinDisposed,
  /// Internal topology left an inconsistent state; the mesh should be
  /// considered unusable.
  #[error("internal invariant violated")]
  InvariantViolation,
}
