pub(crate) mod constraints;
pub(crate) mod incremental;
pub(crate) mod walk;

pub use constraints::ConstraintOptions;
pub use incremental::{IncrementalTin, TinNavigator, TriangleCount};
pub use walk::{StochasticLawsonWalk, WalkDiagnostics};
