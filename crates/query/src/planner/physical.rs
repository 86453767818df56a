//! Physical query plan definitions.

use crate::analyzer::{BoundAggregate, BoundExpr};
use crate::ast::{ApplyType, JoinType, SetOperator, SortOrder};
use crate::context::QueryHints;
use crate::source::SchemaHandle;
use crate::table::OutputColumn;
use std::fmt::{self, Write as _};

/// Join algorithm selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinAlgorithm {
    /// Hash join - equality conditions, build on the right input.
    Hash,
    /// Sort-merge join - equality conditions, both inputs sorted on the keys.
    SortMerge,
    /// Nested loop join - fallback for any other condition.
    NestedLoop,
}

impl JoinAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            JoinAlgorithm::Hash => "HashJoin",
            JoinAlgorithm::SortMerge => "SortMergeJoin",
            JoinAlgorithm::NestedLoop => "NestedLoopJoin",
        }
    }
}

/// Equality keys of a join. `left[i] = right[i]` for every `i`; the left
/// expressions are over the left row, the right ones over the right row.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinKeys {
    pub left: Vec<BoundExpr>,
    pub right: Vec<BoundExpr>,
}

impl JoinKeys {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Physical query plan node.
#[derive(Clone, Debug)]
pub enum PhysicalPlan {
    /// Calls a schema method. Arguments are evaluated against the outer row
    /// of an APPLY, or against an empty row.
    Scan {
        alias: String,
        schema: SchemaHandle,
        method: String,
        args: Vec<BoundExpr>,
        /// Provider columns kept, in output order.
        projection: Option<Vec<usize>>,
        /// Values per row announced by the provider.
        provider_width: usize,
        hints: QueryHints,
    },

    /// Reads a materialized common table expression.
    CteScan { alias: String, name: String },

    /// Filter operator.
    Filter {
        input: Box<PhysicalPlan>,
        predicate: BoundExpr,
    },

    /// Projection operator.
    Project {
        input: Box<PhysicalPlan>,
        columns: Vec<BoundExpr>,
    },

    /// Hash join.
    HashJoin {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        keys: JoinKeys,
        join_type: JoinType,
    },

    /// Sort-merge join.
    SortMergeJoin {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        keys: JoinKeys,
        join_type: JoinType,
    },

    /// Nested loop join. The condition is over the combined row.
    NestedLoopJoin {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        condition: BoundExpr,
        join_type: JoinType,
    },

    /// Runs `right` once per left row.
    Apply {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        apply_type: ApplyType,
    },

    /// Hash aggregate. Output rows are the group keys followed by the
    /// aggregates.
    HashAggregate {
        input: Box<PhysicalPlan>,
        group_by: Vec<BoundExpr>,
        aggregates: Vec<BoundAggregate>,
    },

    /// Sort operator.
    Sort {
        input: Box<PhysicalPlan>,
        order_by: Vec<(BoundExpr, SortOrder)>,
    },

    /// SKIP / TAKE.
    Limit {
        input: Box<PhysicalPlan>,
        skip: Option<i64>,
        take: Option<i64>,
    },

    /// Drops repeated rows, keeping the first occurrence.
    Distinct { input: Box<PhysicalPlan> },

    /// Keyed set operation.
    SetOperation {
        op: SetOperator,
        keys: Vec<String>,
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        left_columns: Vec<String>,
        right_columns: Vec<String>,
    },
}

impl PhysicalPlan {
    /// Creates a filter plan.
    pub fn filter(input: PhysicalPlan, predicate: BoundExpr) -> Self {
        PhysicalPlan::Filter {
            input: Box::new(input),
            predicate,
        }
    }

    /// Creates a projection plan.
    pub fn project(input: PhysicalPlan, columns: Vec<BoundExpr>) -> Self {
        PhysicalPlan::Project {
            input: Box::new(input),
            columns,
        }
    }

    /// Creates a hash join plan.
    pub fn hash_join(
        left: PhysicalPlan,
        right: PhysicalPlan,
        keys: JoinKeys,
        join_type: JoinType,
    ) -> Self {
        PhysicalPlan::HashJoin {
            left: Box::new(left),
            right: Box::new(right),
            keys,
            join_type,
        }
    }

    /// Creates a sort-merge join plan.
    pub fn sort_merge_join(
        left: PhysicalPlan,
        right: PhysicalPlan,
        keys: JoinKeys,
        join_type: JoinType,
    ) -> Self {
        PhysicalPlan::SortMergeJoin {
            left: Box::new(left),
            right: Box::new(right),
            keys,
            join_type,
        }
    }

    /// Creates a nested loop join plan.
    pub fn nested_loop_join(
        left: PhysicalPlan,
        right: PhysicalPlan,
        condition: BoundExpr,
        join_type: JoinType,
    ) -> Self {
        PhysicalPlan::NestedLoopJoin {
            left: Box::new(left),
            right: Box::new(right),
            condition,
            join_type,
        }
    }

    /// Creates an apply plan.
    pub fn apply(left: PhysicalPlan, right: PhysicalPlan, apply_type: ApplyType) -> Self {
        PhysicalPlan::Apply {
            left: Box::new(left),
            right: Box::new(right),
            apply_type,
        }
    }

    /// Creates a hash aggregate plan.
    pub fn hash_aggregate(input: PhysicalPlan, group_by: Vec<BoundExpr>, aggregates: Vec<BoundAggregate>) -> Self {
        PhysicalPlan::HashAggregate {
            input: Box::new(input),
            group_by,
            aggregates,
        }
    }

    /// Creates a sort plan.
    pub fn sort(input: PhysicalPlan, order_by: Vec<(BoundExpr, SortOrder)>) -> Self {
        PhysicalPlan::Sort {
            input: Box::new(input),
            order_by,
        }
    }

    /// Creates a limit plan.
    pub fn limit(input: PhysicalPlan, skip: Option<i64>, take: Option<i64>) -> Self {
        PhysicalPlan::Limit {
            input: Box::new(input),
            skip,
            take,
        }
    }

    pub fn distinct(input: PhysicalPlan) -> Self {
        PhysicalPlan::Distinct { input: Box::new(input) }
    }

    /// Returns the join algorithm of a join node.
    pub fn join_algorithm(&self) -> Option<JoinAlgorithm> {
        match self {
            PhysicalPlan::HashJoin { .. } => Some(JoinAlgorithm::Hash),
            PhysicalPlan::SortMergeJoin { .. } => Some(JoinAlgorithm::SortMerge),
            PhysicalPlan::NestedLoopJoin { .. } => Some(JoinAlgorithm::NestedLoop),
            _ => None,
        }
    }

    /// Returns the input plan(s) of this node.
    pub fn inputs(&self) -> Vec<&PhysicalPlan> {
        match self {
            PhysicalPlan::Scan { .. } | PhysicalPlan::CteScan { .. } => vec![],
            PhysicalPlan::Filter { input, .. }
            | PhysicalPlan::Project { input, .. }
            | PhysicalPlan::HashAggregate { input, .. }
            | PhysicalPlan::Sort { input, .. }
            | PhysicalPlan::Limit { input, .. }
            | PhysicalPlan::Distinct { input } => vec![input.as_ref()],
            PhysicalPlan::HashJoin { left, right, .. }
            | PhysicalPlan::SortMergeJoin { left, right, .. }
            | PhysicalPlan::NestedLoopJoin { left, right, .. }
            | PhysicalPlan::Apply { left, right, .. }
            | PhysicalPlan::SetOperation { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        }
    }

    /// Collects every node of the tree in pre-order.
    pub fn walk<'a>(&'a self, out: &mut Vec<&'a PhysicalPlan>) {
        out.push(self);
        for input in self.inputs() {
            input.walk(out);
        }
    }

    fn label(&self) -> String {
        fn list(exprs: &[BoundExpr]) -> String {
            exprs.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        }
        fn keys(keys: &JoinKeys) -> String {
            keys.left
                .iter()
                .zip(&keys.right)
                .map(|(l, r)| format!("{} = {}", l, r))
                .collect::<Vec<_>>()
                .join(" and ")
        }
        match self {
            PhysicalPlan::Scan {
                alias,
                schema,
                method,
                args,
                hints,
                ..
            } => {
                let mut label = format!("Scan {} = #{}.{}({})", alias, schema.name, method, list(args));
                if hints.has_optimization_hints {
                    label.push_str(" [hinted]");
                }
                label
            }
            PhysicalPlan::CteScan { alias, name } => format!("CteScan {} = {}", alias, name),
            PhysicalPlan::Filter { predicate, .. } => format!("Filter {}", predicate),
            PhysicalPlan::Project { columns, .. } => format!("Project [{}]", list(columns)),
            PhysicalPlan::HashJoin {
                keys: k, join_type, ..
            }
            | PhysicalPlan::SortMergeJoin {
                keys: k, join_type, ..
            } => format!(
                "{} {:?} on {}",
                self.join_algorithm().map_or("", |a| a.name()),
                join_type,
                keys(k)
            ),
            PhysicalPlan::NestedLoopJoin {
                condition, join_type, ..
            } => format!("NestedLoopJoin {:?} on {}", join_type, condition),
            PhysicalPlan::Apply { apply_type, .. } => format!("Apply {:?}", apply_type),
            PhysicalPlan::HashAggregate {
                group_by, aggregates, ..
            } => {
                let aggs: Vec<String> = aggregates
                    .iter()
                    .map(|a| match &a.arg {
                        Some(arg) if a.distinct => format!("{}(distinct {})", a.func, arg),
                        Some(arg) => format!("{}({})", a.func, arg),
                        None => format!("{}(*)", a.func),
                    })
                    .collect();
                format!("HashAggregate keys=[{}] aggregates=[{}]", list(group_by), aggs.join(", "))
            }
            PhysicalPlan::Sort { order_by, .. } => {
                let items: Vec<String> = order_by
                    .iter()
                    .map(|(e, o)| match o {
                        SortOrder::Asc => e.to_string(),
                        SortOrder::Desc => format!("{} desc", e),
                    })
                    .collect();
                format!("Sort [{}]", items.join(", "))
            }
            PhysicalPlan::Limit { skip, take, .. } => {
                let mut label = String::from("Limit");
                if let Some(skip) = skip {
                    let _ = write!(label, " skip={}", skip);
                }
                if let Some(take) = take {
                    let _ = write!(label, " take={}", take);
                }
                label
            }
            PhysicalPlan::Distinct { .. } => "Distinct".to_string(),
            PhysicalPlan::SetOperation { op, keys, .. } => format!("{} ({})", op.name(), keys.join(", ")),
        }
    }

    fn fmt_tree(&self, depth: usize, out: &mut String) {
        let _ = writeln!(out, "{}{}", "  ".repeat(depth), self.label());
        for input in self.inputs() {
            input.fmt_tree(depth + 1, out);
        }
    }
}

/// An executable query: CTEs in declaration order, then the body.
#[derive(Clone, Debug)]
pub struct QueryPlan {
    pub ctes: Vec<(String, PhysicalPlan)>,
    pub root: PhysicalPlan,
    pub columns: Vec<OutputColumn>,
}

impl QueryPlan {
    /// Renders the plan as an indented tree.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        for (name, plan) in &self.ctes {
            let _ = writeln!(out, "Cte {}", name);
            plan.fmt_tree(1, &mut out);
        }
        self.root.fmt_tree(0, &mut out);
        out
    }

    /// Returns every scan of the plan, CTE bodies included.
    pub fn scans(&self) -> Vec<&PhysicalPlan> {
        let mut nodes = Vec::new();
        for (_, plan) in &self.ctes {
            plan.walk(&mut nodes);
        }
        self.root.walk(&mut nodes);
        nodes
            .into_iter()
            .filter(|n| matches!(n, PhysicalPlan::Scan { .. } | PhysicalPlan::CteScan { .. }))
            .collect()
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explain())
    }
}
