//! Query planner module.

mod physical;
mod query_planner;

pub use physical::{JoinAlgorithm, JoinKeys, PhysicalPlan, QueryPlan};
pub use query_planner::QueryPlanner;
