//! Query executor module.

mod aggregate;
mod distinct;
mod eval;
mod filter;
pub mod join;
mod limit;
mod project;
mod relation;
mod runner;
mod scan;
mod set_op;
mod sort;

pub use aggregate::{AggregateExecutor, AggregateSpec};
pub use distinct::DistinctExecutor;
pub use eval::ExprEvaluator;
pub use filter::FilterExecutor;
pub use join::{HashJoin, NestedLoopJoin, SortMergeJoin};
pub use limit::LimitExecutor;
pub use project::ProjectExecutor;
pub use relation::{Relation, RelationEntry, SharedSources};
pub use runner::PlanRunner;
pub use scan::ScanExecutor;
pub use set_op::SetOpExecutor;
pub use sort::SortExecutor;
