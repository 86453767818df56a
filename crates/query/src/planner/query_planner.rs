//! Builds physical plans from analyzed queries.
//!
//! Each select block becomes a left-deep pipeline:
//!
//! 1. sources, joined left to right (hash, sort-merge or nested loop)
//! 2. WHERE
//! 3. aggregation, then HAVING
//! 4. ORDER BY
//! 5. SKIP / TAKE
//! 6. projection
//!
//! A block that is DISTINCT over an explicit GROUP BY projects before it
//! de-duplicates, so SKIP / TAKE move after the projection.

use crate::analyzer::{
    BoundExpr, BoundExprKind, BoundJoinKind, BoundQuery, BoundSelect, BoundSetExpr, BoundSource,
    BoundSourceKind,
};
use crate::ast::BinaryOp;
use crate::config::CompilerOptions;
use crate::context::QueryHints;
use crate::planner::{JoinAlgorithm, JoinKeys, PhysicalPlan, QueryPlan};

/// Turns a [`BoundQuery`] into a [`QueryPlan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryPlanner {
    options: CompilerOptions,
}

impl QueryPlanner {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// Plans the CTEs in declaration order, then the body.
    pub fn plan(&self, query: &BoundQuery) -> QueryPlan {
        let ctes = query
            .ctes
            .iter()
            .map(|cte| (cte.name.clone(), self.plan_set_expr(&cte.body)))
            .collect();
        QueryPlan {
            ctes,
            root: self.plan_set_expr(&query.body),
            columns: query.columns().to_vec(),
        }
    }

    fn plan_set_expr(&self, expr: &BoundSetExpr) -> PhysicalPlan {
        match expr {
            BoundSetExpr::Select(select) => self.plan_select(select),
            BoundSetExpr::SetOperation {
                op, keys, left, right, ..
            } => PhysicalPlan::SetOperation {
                op: *op,
                keys: keys.clone(),
                left: Box::new(self.plan_set_expr(left)),
                right: Box::new(self.plan_set_expr(right)),
                left_columns: left.columns().iter().map(|c| c.name.clone()).collect(),
                right_columns: right.columns().iter().map(|c| c.name.clone()).collect(),
            },
        }
    }

    fn plan_select(&self, select: &BoundSelect) -> PhysicalPlan {
        let hints = block_hints(select);
        tracing::debug!(source = %select.from.alias, ?hints, "computed block hints");

        let mut plan = source_plan(&select.from, hints);
        for join in &select.joins {
            let right = source_plan(&join.source, hints);
            plan = match &join.kind {
                BoundJoinKind::Join { join_type, on } => {
                    let left_width = join.source.offset;
                    let keys = extract_equi_keys(on, left_width);
                    let algorithm = self.choose_join_algorithm(keys.as_ref());
                    tracing::debug!(
                        source = %join.source.alias,
                        algorithm = algorithm.name(),
                        ?join_type,
                        "selected join algorithm"
                    );
                    match (algorithm, keys) {
                        (JoinAlgorithm::Hash, Some(keys)) => {
                            PhysicalPlan::hash_join(plan, right, keys, *join_type)
                        }
                        (JoinAlgorithm::SortMerge, Some(keys)) => {
                            PhysicalPlan::sort_merge_join(plan, right, keys, *join_type)
                        }
                        _ => PhysicalPlan::nested_loop_join(plan, right, on.clone(), *join_type),
                    }
                }
                BoundJoinKind::Apply { apply_type } => PhysicalPlan::apply(plan, right, *apply_type),
            };
        }

        if let Some(filter) = &select.filter {
            plan = PhysicalPlan::filter(plan, filter.clone());
        }
        if let Some(aggregation) = &select.aggregation {
            plan = PhysicalPlan::hash_aggregate(plan, aggregation.group_by.clone(), aggregation.aggregates.clone());
        }
        if let Some(having) = &select.having {
            plan = PhysicalPlan::filter(plan, having.clone());
        }
        if !select.order_by.is_empty() {
            plan = PhysicalPlan::sort(plan, select.order_by.clone());
        }
        let limited = select.skip.is_some() || select.take.is_some();
        if select.distinct_after_projection {
            plan = PhysicalPlan::distinct(PhysicalPlan::project(plan, select.projection.clone()));
            if limited {
                plan = PhysicalPlan::limit(plan, select.skip, select.take);
            }
        } else {
            if limited {
                plan = PhysicalPlan::limit(plan, select.skip, select.take);
            }
            plan = PhysicalPlan::project(plan, select.projection.clone());
        }
        plan
    }

    fn choose_join_algorithm(&self, keys: Option<&JoinKeys>) -> JoinAlgorithm {
        match keys {
            Some(_) if self.options.enable_hash_join => JoinAlgorithm::Hash,
            Some(_) if self.options.enable_sort_merge_join => JoinAlgorithm::SortMerge,
            _ => JoinAlgorithm::NestedLoop,
        }
    }
}

/// Hints handed to the sources of one block.
fn block_hints(select: &BoundSelect) -> QueryHints {
    QueryHints {
        skip: select.skip,
        take: select.take,
        is_distinct: select.distinct,
        has_optimization_hints: select.joins.is_empty()
            && select.order_by.is_empty()
            && !select.has_group_by
            && select.aggregation.is_none()
            && !select.distinct,
    }
}

fn source_plan(source: &BoundSource, hints: QueryHints) -> PhysicalPlan {
    match &source.kind {
        BoundSourceKind::Schema {
            schema,
            method,
            args,
            projection,
            provider_width,
        } => PhysicalPlan::Scan {
            alias: source.alias.clone(),
            schema: schema.clone(),
            method: method.clone(),
            args: args.clone(),
            projection: projection.clone(),
            provider_width: *provider_width,
            hints,
        },
        BoundSourceKind::Cte { name } => PhysicalPlan::CteScan {
            alias: source.alias.clone(),
            name: name.clone(),
        },
    }
}

/// Splits an ON condition into equality keys when it is a conjunction of
/// `left = right` terms, each side reading one join input only. Right keys
/// are rebased onto the right row.
fn extract_equi_keys(on: &BoundExpr, left_width: usize) -> Option<JoinKeys> {
    let mut conjuncts = Vec::new();
    split_conjunction(on, &mut conjuncts);

    let mut keys = JoinKeys {
        left: Vec::new(),
        right: Vec::new(),
    };
    for conjunct in conjuncts {
        let BoundExprKind::Binary {
            left,
            op: BinaryOp::Eq,
            right,
        } = &conjunct.kind
        else {
            return None;
        };
        match (side_of(left, left_width)?, side_of(right, left_width)?) {
            (Side::Left, Side::Right) => {
                keys.left.push((**left).clone());
                keys.right.push(right.shift_columns(left_width));
            }
            (Side::Right, Side::Left) => {
                keys.left.push((**right).clone());
                keys.right.push(left.shift_columns(left_width));
            }
            _ => return None,
        }
    }
    Some(keys)
}

fn split_conjunction<'a>(expr: &'a BoundExpr, out: &mut Vec<&'a BoundExpr>) {
    match &expr.kind {
        BoundExprKind::Binary {
            left,
            op: BinaryOp::And,
            right,
        } => {
            split_conjunction(left, out);
            split_conjunction(right, out);
        }
        _ => out.push(expr),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// The join input an expression reads from; `None` when it reads both or
/// neither.
fn side_of(expr: &BoundExpr, left_width: usize) -> Option<Side> {
    let columns = expr.referenced_columns();
    if columns.is_empty() {
        None
    } else if columns.iter().all(|&c| c < left_width) {
        Some(Side::Left)
    } else if columns.iter().all(|&c| c >= left_width) {
        Some(Side::Right)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::context::Environment;
    use crate::memory::{InMemorySchema, InMemorySchemaProvider};
    use crate::parser::parse;
    use quarry_core::schema::{Column, TableMetadata};
    use quarry_core::DataType;

    fn provider() -> InMemorySchemaProvider {
        let people = TableMetadata::new(
            "people",
            vec![Column::new("Id", DataType::Int32), Column::new("Name", DataType::String)],
        );
        let orders = TableMetadata::new(
            "orders",
            vec![Column::new("PersonId", DataType::Int64), Column::new("Amount", DataType::Float64)],
        );
        InMemorySchemaProvider::new().with_schema(
            "db",
            InMemorySchema::new()
                .with_table("people", people, Vec::new())
                .with_table("orders", orders, Vec::new()),
        )
    }

    fn plan_with(text: &str, options: CompilerOptions) -> QueryPlan {
        let script = parse(text).unwrap();
        let query = analyze(&script, text, 1, &provider(), &Environment::new(), &options).unwrap();
        QueryPlanner::new(options).plan(&query)
    }

    fn plan(text: &str) -> QueryPlan {
        plan_with(text, CompilerOptions::default())
    }

    fn join_of(plan: &QueryPlan) -> &PhysicalPlan {
        let mut nodes = Vec::new();
        plan.root.walk(&mut nodes);
        nodes
            .into_iter()
            .find(|n| n.join_algorithm().is_some())
            .expect("plan has a join")
    }

    const EQUI_JOIN: &str = "select p.Name, o.Amount from #db.people() p \
                             inner join #db.orders() o on p.Id = o.PersonId";

    #[test]
    fn test_join_algorithm_follows_options() {
        assert_eq!(join_of(&plan(EQUI_JOIN)).join_algorithm(), Some(JoinAlgorithm::Hash));

        let merge = CompilerOptions {
            enable_hash_join: false,
            ..CompilerOptions::default()
        };
        assert_eq!(
            join_of(&plan_with(EQUI_JOIN, merge)).join_algorithm(),
            Some(JoinAlgorithm::SortMerge)
        );

        let nested = CompilerOptions {
            enable_hash_join: false,
            enable_sort_merge_join: false,
            ..CompilerOptions::default()
        };
        assert_eq!(
            join_of(&plan_with(EQUI_JOIN, nested)).join_algorithm(),
            Some(JoinAlgorithm::NestedLoop)
        );
    }

    #[test]
    fn test_non_equi_condition_uses_nested_loop() {
        let plan = plan(
            "select p.Name from #db.people() p left join #db.orders() o \
             on p.Id = o.PersonId and o.Amount > 10",
        );
        assert_eq!(join_of(&plan).join_algorithm(), Some(JoinAlgorithm::NestedLoop));
    }

    #[test]
    fn test_equi_keys_are_rebased() {
        let plan = plan(
            "select p.Name from #db.people() p inner join #db.orders() o \
             on o.PersonId = p.Id and p.Name = ToString(o.Amount)",
        );
        match join_of(&plan) {
            PhysicalPlan::HashJoin { keys, .. } => {
                assert_eq!(keys.len(), 2);
                assert_eq!(keys.left[0].referenced_columns(), vec![0]);
                assert_eq!(keys.right[0].referenced_columns(), vec![0]);
                assert_eq!(keys.left[1].referenced_columns(), vec![1]);
                assert_eq!(keys.right[1].referenced_columns(), vec![1]);
            }
            other => panic!("expected a hash join, got {:?}", other),
        }
    }

    #[test]
    fn test_hints() {
        let plan = plan("select Name from #db.people() where Id > 1 skip 2 take 3");
        match plan.scans()[0] {
            PhysicalPlan::Scan { hints, .. } => {
                assert!(hints.has_optimization_hints);
                assert_eq!(hints.skip, Some(2));
                assert_eq!(hints.take, Some(3));
            }
            other => panic!("expected a scan, got {:?}", other),
        }

        for text in [
            "select Name from #db.people() order by Name",
            "select distinct Name from #db.people()",
            "select Name from #db.people() group by Name",
            "select Count(*) from #db.people()",
            EQUI_JOIN,
        ] {
            let plan = self::plan(text);
            for scan in plan.scans() {
                if let PhysicalPlan::Scan { hints, .. } = scan {
                    assert!(!hints.has_optimization_hints, "{}", text);
                }
            }
        }
    }

    #[test]
    fn test_pipeline_order() {
        let plan = plan(
            "select Name, Count(*) from #db.people() where Id > 0 group by Name \
             having Count(*) > 1 order by Name skip 1 take 2",
        );
        let labels: Vec<String> = plan
            .explain()
            .lines()
            .map(|l| l.trim().split(' ').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            labels,
            vec!["Project", "Limit", "Sort", "Filter", "HashAggregate", "Filter", "Scan"]
        );

        let plan = self::plan("select distinct Count(*) from #db.people() group by Name take 1");
        let labels: Vec<String> = plan
            .explain()
            .lines()
            .map(|l| l.trim().split(' ').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(labels, vec!["Limit", "Distinct", "Project", "HashAggregate", "Scan"]);
    }

    #[test]
    fn test_ctes_are_planned_in_order() {
        let plan = plan(
            "with a as (select Id from #db.people()), b as (select Id from a) \
             select Id from b union all (Id) select Id from a",
        );
        let names: Vec<&str> = plan.ctes.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(matches!(plan.root, PhysicalPlan::SetOperation { .. }));
    }
}
