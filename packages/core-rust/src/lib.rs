//! Scoring registry core: engine descriptors, metainfo validation, and the
//! listing sort order.

pub mod metainfo;
pub mod sort;
pub mod types;

pub use metainfo::{Metainfo, MetainfoError};
pub use sort::{compare_engines, compare_positions, ParseSortError, SortDir, SortKey, SortValue};
pub use types::{
    validate_name, EnginePatch, EngineSpec, ExecutionTarget, NameError, ResourceLimits,
    ScoringEngine,
};
