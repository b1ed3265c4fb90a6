pub mod refinement;
pub mod triangulation;

#[doc(inline)]
pub use refinement::{RefinementOptions, RuppertRefiner, SteinerKind};
#[doc(inline)]
pub use triangulation::IncrementalTin;
