//! Physical plan runner - executes a [`QueryPlan`] against the schemas it
//! was compiled for.
//!
//! Plans are evaluated recursively, every node materializing its output
//! [`Relation`] before its parent runs. CTEs are materialized once, in
//! declaration order, before the body.

use crate::analyzer::{BoundAggregate, BoundExpr};
use crate::ast::{ApplyType, JoinType, SetOperator, SortOrder};
use crate::config::CompilerOptions;
use crate::context::RuntimeContext;
use crate::error::{ExecutionError, ExecutionResult};
use crate::executor::join::{join_key, JoinKey};
use crate::executor::{
    AggregateExecutor, AggregateSpec, DistinctExecutor, ExprEvaluator, FilterExecutor, HashJoin,
    LimitExecutor, NestedLoopJoin, ProjectExecutor, Relation, RelationEntry, ScanExecutor,
    SetOpExecutor, SharedSources, SortExecutor, SortMergeJoin,
};
use crate::planner::{JoinKeys, PhysicalPlan, QueryPlan};
use crate::table::Table;
use quarry_core::Value;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Runs physical plans within one runtime context.
pub struct PlanRunner<'a> {
    ctx: &'a RuntimeContext,
    options: CompilerOptions,
    evaluator: ExprEvaluator,
    ctes: HashMap<String, Relation>,
}

impl<'a> PlanRunner<'a> {
    /// Creates a new runner for one execution.
    pub fn new(ctx: &'a RuntimeContext, options: CompilerOptions) -> Self {
        Self {
            ctx,
            options,
            evaluator: ExprEvaluator::new(),
            ctes: HashMap::new(),
        }
    }

    /// Executes a whole query and collects its rows.
    pub fn run(mut self, plan: &QueryPlan) -> ExecutionResult<Table> {
        for (name, cte) in &plan.ctes {
            let relation = self.execute(cte)?;
            tracing::debug!(query_id = self.ctx.query_id(), cte = %name, rows = relation.len(), "cte materialized");
            self.ctes.insert(name.clone(), relation);
        }
        let relation = self.execute(&plan.root)?;

        let mut table = Table::builder(plan.columns.clone());
        table.extend(relation.into_rows());
        Ok(table.build())
    }

    /// Executes a physical plan and returns the result relation.
    pub fn execute(&self, plan: &PhysicalPlan) -> ExecutionResult<Relation> {
        self.execute_with_outer(plan, &[])
    }

    /// Executes a plan whose scans evaluate their arguments against `outer`,
    /// the left row of an enclosing APPLY.
    fn execute_with_outer(&self, plan: &PhysicalPlan, outer: &[Value]) -> ExecutionResult<Relation> {
        match plan {
            PhysicalPlan::Scan {
                alias,
                schema,
                method,
                args,
                projection,
                provider_width,
                hints,
            } => {
                let args = self.evaluator.eval_all(args, outer)?;
                ScanExecutor::new(alias, schema, method, *provider_width)
                    .with_projection(projection.as_deref())
                    .with_hints(*hints)
                    .with_progress_interval(self.options.progress_interval)
                    .execute(self.ctx, &args)
            }

            PhysicalPlan::CteScan { alias, name } => self.execute_cte_scan(alias, name),

            PhysicalPlan::Filter { input, predicate } => {
                let input_rel = self.execute_with_outer(input, outer)?;
                FilterExecutor::new(predicate).execute(input_rel, &self.evaluator)
            }

            PhysicalPlan::Project { input, columns } => {
                let input_rel = self.execute_with_outer(input, outer)?;
                ProjectExecutor::new(columns).execute(input_rel, &self.evaluator)
            }

            PhysicalPlan::HashJoin {
                left,
                right,
                keys,
                join_type,
            } => {
                let (left_rel, right_rel) = self.execute_pair(left, right, outer)?;
                self.execute_hash_join(left_rel, right_rel, keys, *join_type)
            }

            PhysicalPlan::SortMergeJoin {
                left,
                right,
                keys,
                join_type,
            } => {
                let (left_rel, right_rel) = self.execute_pair(left, right, outer)?;
                self.execute_sort_merge_join(left_rel, right_rel, keys, *join_type)
            }

            PhysicalPlan::NestedLoopJoin {
                left,
                right,
                condition,
                join_type,
            } => {
                let (left_rel, right_rel) = self.execute_pair(left, right, outer)?;
                self.ctx.check_cancelled()?;
                NestedLoopJoin::new(*join_type).execute(left_rel, right_rel, |row| {
                    self.evaluator.eval_predicate(condition, row)
                })
            }

            PhysicalPlan::Apply {
                left,
                right,
                apply_type,
            } => {
                let left_rel = self.execute_with_outer(left, outer)?;
                self.execute_apply(left_rel, right, *apply_type)
            }

            PhysicalPlan::HashAggregate {
                input,
                group_by,
                aggregates,
            } => {
                let input_rel = self.execute_with_outer(input, outer)?;
                self.execute_hash_aggregate(input_rel, group_by, aggregates)
            }

            PhysicalPlan::Sort { input, order_by } => {
                let input_rel = self.execute_with_outer(input, outer)?;
                self.execute_sort(input_rel, order_by)
            }

            PhysicalPlan::Limit { input, skip, take } => {
                let input_rel = self.execute_with_outer(input, outer)?;
                Ok(LimitExecutor::new(*skip, *take).execute(input_rel))
            }

            PhysicalPlan::Distinct { input } => {
                let input_rel = self.execute_with_outer(input, outer)?;
                Ok(DistinctExecutor::execute(input_rel))
            }

            PhysicalPlan::SetOperation {
                op,
                keys,
                left,
                right,
                left_columns,
                right_columns,
            } => {
                let (left_rel, right_rel) = self.execute_pair(left, right, outer)?;
                self.execute_set_operation(*op, keys, left_rel, right_rel, left_columns, right_columns)
            }
        }
    }

    fn execute_pair(
        &self,
        left: &PhysicalPlan,
        right: &PhysicalPlan,
        outer: &[Value],
    ) -> ExecutionResult<(Relation, Relation)> {
        let left_rel = self.execute_with_outer(left, outer)?;
        let right_rel = self.execute_with_outer(right, outer)?;
        Ok((left_rel, right_rel))
    }

    // ========== Scan Operations ==========

    fn execute_cte_scan(&self, alias: &str, name: &str) -> ExecutionResult<Relation> {
        let cte = self
            .ctes
            .get(name)
            .ok_or_else(|| ExecutionError::MissingCte(name.to_string()))?;
        let sources = vec![alias.to_string()];
        let shared: SharedSources = Arc::from(sources.as_slice());
        let entries = cte
            .iter()
            .map(|e| RelationEntry::new(Rc::clone(&e.row), Arc::clone(&shared)))
            .collect();
        Ok(Relation {
            entries,
            sources,
            source_column_counts: vec![cte.width()],
        })
    }

    // ========== Join Operations ==========

    fn join_keys(&self, relation: &Relation, exprs: &[BoundExpr]) -> ExecutionResult<Vec<JoinKey>> {
        relation
            .iter()
            .map(|entry| Ok(join_key(self.evaluator.eval_all(exprs, entry.values())?)))
            .collect()
    }

    fn execute_hash_join(
        &self,
        left: Relation,
        right: Relation,
        keys: &JoinKeys,
        join_type: JoinType,
    ) -> ExecutionResult<Relation> {
        self.ctx.check_cancelled()?;
        let left_keys = self.join_keys(&left, &keys.left)?;
        let right_keys = self.join_keys(&right, &keys.right)?;
        Ok(HashJoin::new(join_type).execute(left, &left_keys, right, &right_keys))
    }

    fn execute_sort_merge_join(
        &self,
        left: Relation,
        right: Relation,
        keys: &JoinKeys,
        join_type: JoinType,
    ) -> ExecutionResult<Relation> {
        self.ctx.check_cancelled()?;
        let left_keys = self.join_keys(&left, &keys.left)?;
        let right_keys = self.join_keys(&right, &keys.right)?;
        Ok(SortMergeJoin::new(join_type).execute(left, &left_keys, right, &right_keys))
    }

    fn execute_apply(&self, left: Relation, right: &PhysicalPlan, apply_type: ApplyType) -> ExecutionResult<Relation> {
        self.ctx.check_cancelled()?;
        let right_layout = Relation::new(vec![self.alias_of(right)], vec![self.width_of(right)]);
        let mut result = left.joined_layout(&right_layout);
        let combined_sources = left.combined_sources(&right_layout);

        for left_entry in left.iter() {
            let right_rel = self.execute_with_outer(right, left_entry.values())?;
            if right_rel.is_empty() {
                if apply_type == ApplyType::Outer {
                    result.push(RelationEntry::combine_with_null(
                        left_entry,
                        right_layout.width(),
                        Arc::clone(&combined_sources),
                    ));
                }
                continue;
            }
            for right_entry in right_rel.iter() {
                result.push(RelationEntry::combine(
                    left_entry,
                    right_entry,
                    Arc::clone(&combined_sources),
                ));
            }
        }
        Ok(result)
    }

    // ========== Aggregate Operation ==========

    /// Stages every input row as its group keys followed by the evaluated
    /// aggregate arguments, then aggregates the staged rows.
    fn execute_hash_aggregate(
        &self,
        input: Relation,
        group_by: &[BoundExpr],
        aggregates: &[BoundAggregate],
    ) -> ExecutionResult<Relation> {
        self.ctx.check_cancelled()?;
        let group_count = group_by.len();
        let mut specs = Vec::with_capacity(aggregates.len());
        let mut args = Vec::new();
        for aggregate in aggregates {
            let column = aggregate.arg.as_ref().map(|arg| {
                args.push(arg.clone());
                group_count + args.len() - 1
            });
            let spec = AggregateSpec::new(aggregate.func, column);
            specs.push(if aggregate.distinct { spec.distinct() } else { spec });
        }

        let shared: SharedSources = Arc::from(input.sources());
        let mut staged = Relation::new(input.sources().to_vec(), vec![group_count + args.len()]);
        for entry in input.iter() {
            let mut values = self.evaluator.eval_all(group_by, entry.values())?;
            values.extend(self.evaluator.eval_all(&args, entry.values())?);
            staged.push(RelationEntry::from_values(values, Arc::clone(&shared)));
        }

        Ok(AggregateExecutor::new(group_count, specs).execute(staged))
    }

    // ========== Sort Operation ==========

    fn execute_sort(&self, input: Relation, order_by: &[(BoundExpr, SortOrder)]) -> ExecutionResult<Relation> {
        self.ctx.check_cancelled()?;
        SortExecutor::new(order_by).execute(input, &self.evaluator)
    }

    // ========== Set Operations ==========

    fn execute_set_operation(
        &self,
        op: SetOperator,
        keys: &[String],
        left: Relation,
        right: Relation,
        left_columns: &[String],
        right_columns: &[String],
    ) -> ExecutionResult<Relation> {
        self.ctx.check_cancelled()?;
        SetOpExecutor::new(op, keys).execute(left, right, left_columns, right_columns)
    }

    // ========== Layout ==========

    fn alias_of(&self, plan: &PhysicalPlan) -> String {
        match plan {
            PhysicalPlan::Scan { alias, .. } | PhysicalPlan::CteScan { alias, .. } => alias.clone(),
            other => other
                .inputs()
                .first()
                .map_or_else(String::new, |input| self.alias_of(input)),
        }
    }

    /// Number of values of every row produced by `plan`.
    fn width_of(&self, plan: &PhysicalPlan) -> usize {
        match plan {
            PhysicalPlan::Scan {
                projection,
                provider_width,
                ..
            } => projection.as_ref().map_or(*provider_width, Vec::len),
            PhysicalPlan::CteScan { name, .. } => self.ctes.get(name).map_or(0, Relation::width),
            PhysicalPlan::Project { columns, .. } => columns.len(),
            PhysicalPlan::HashAggregate {
                group_by, aggregates, ..
            } => group_by.len() + aggregates.len(),
            PhysicalPlan::SetOperation { left_columns, .. } => left_columns.len(),
            PhysicalPlan::Filter { input, .. }
            | PhysicalPlan::Sort { input, .. }
            | PhysicalPlan::Limit { input, .. }
            | PhysicalPlan::Distinct { input } => self.width_of(input),
            PhysicalPlan::HashJoin { left, right, .. }
            | PhysicalPlan::SortMergeJoin { left, right, .. }
            | PhysicalPlan::NestedLoopJoin { left, right, .. }
            | PhysicalPlan::Apply { left, right, .. } => self.width_of(left) + self.width_of(right),
        }
    }
}
