//! Semantic analysis.
//!
//! The analyzer resolves every name of a parsed [`Script`] against the
//! script's declarations, the CTEs in scope and the schemas of a
//! [`SchemaProvider`], type-checks expressions and splits aggregation out
//! of grouped blocks. The result is a [`BoundQuery`] ready for planning, or
//! every diagnostic found.

mod bound;
mod expr;
mod grouping;

pub use bound::{
    BoundAggregate, BoundAggregation, BoundCte, BoundExpr, BoundExprKind, BoundJoin, BoundJoinKind,
    BoundQuery, BoundSelect, BoundSetExpr, BoundSource, BoundSourceKind, FunctionHandle,
};

use crate::ast::{
    ExprKind, FromItem, FromSource, JoinClause, Query, Script, Select, SelectItem, SetExpr,
};
use crate::config::CompilerOptions;
use crate::context::{Environment, QueryId, SchemaContext};
use crate::diagnostics::suggest::did_you_mean;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticContext, Diagnostics};
use crate::functions::FunctionRegistry;
use crate::resolver::{CteLookup, CteShape, Declarations, FrameId, ScopeArena, SourceKind};
use crate::source::{SchemaHandle, SchemaProvider};
use crate::table::OutputColumn;
use expr::{type_name, Clause, ExprScope};
use grouping::GroupingRewriter;
use quarry_core::schema::TableMetadata;
use quarry_core::{DataType, Error, Value};
use std::collections::{HashMap, HashSet};

/// Analyzes a parsed script.
pub fn analyze(
    script: &Script,
    text: &str,
    query_id: QueryId,
    provider: &dyn SchemaProvider,
    environment: &Environment,
    options: &CompilerOptions,
) -> Result<BoundQuery, Diagnostics> {
    let mut diagnostics = DiagnosticContext::new();
    let declarations = Declarations::collect(&script.definitions, &mut diagnostics);
    let mut analyzer = Analyzer {
        text,
        query_id,
        provider,
        environment,
        options,
        declarations,
        schemas: HashMap::new(),
        functions: FunctionRegistry::with_builtins(),
        scopes: ScopeArena::new(),
        failed_ctes: HashSet::new(),
        diagnostics,
    };
    analyzer.load_schemas(script);
    let query = analyzer.analyze_query(&script.query);
    match query {
        Some(query) => analyzer.diagnostics.finish(query),
        None => Err(analyzer.diagnostics.into_diagnostics()),
    }
}

pub(crate) struct Analyzer<'a> {
    text: &'a str,
    query_id: QueryId,
    provider: &'a dyn SchemaProvider,
    environment: &'a Environment,
    options: &'a CompilerOptions,
    declarations: Declarations,
    /// Schemas named by the script; `None` when the provider does not know one.
    schemas: HashMap<String, Option<SchemaHandle>>,
    functions: FunctionRegistry,
    scopes: ScopeArena,
    /// CTEs whose body failed; references to them are not reported again.
    failed_ctes: HashSet<String>,
    diagnostics: DiagnosticContext,
}

fn from_items(expr: &SetExpr, out: &mut Vec<FromItem>) {
    match expr {
        SetExpr::Select(select) => {
            out.push(select.from.clone());
            for join in &select.joins {
                match join {
                    JoinClause::Join { item, .. } | JoinClause::Apply { item, .. } => out.push(item.clone()),
                }
            }
        }
        SetExpr::SetOperation { left, right, .. } => {
            from_items(left, out);
            from_items(right, out);
        }
    }
}

impl<'a> Analyzer<'a> {
    /// Resolves every schema the script names and registers its functions.
    fn load_schemas(&mut self, script: &Script) {
        let mut items = Vec::new();
        for cte in &script.query.ctes {
            from_items(&cte.body, &mut items);
        }
        from_items(&script.query.body, &mut items);

        let mut names: Vec<String> = items
            .iter()
            .filter_map(|item| match &item.source {
                FromSource::SchemaCall { schema, .. } => Some(schema.value.clone()),
                _ => None,
            })
            .collect();
        names.extend(self.declarations.coupled_schemas().map(str::to_string));

        for name in names {
            if self.schemas.contains_key(&name) {
                continue;
            }
            let handle = self.provider.schema(&name).map(|schema| SchemaHandle {
                name: name.clone(),
                schema,
            });
            if let Some(handle) = &handle {
                for function in handle.schema.functions() {
                    self.functions.register(function);
                }
            }
            tracing::trace!(schema = %name, found = handle.is_some(), "resolved schema");
            self.schemas.insert(name, handle);
        }
    }

    fn analyze_query(&mut self, query: &Query) -> Option<BoundQuery> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut unique = Vec::new();
        for cte in &query.ctes {
            if seen.insert(cte.name.as_str()) {
                unique.push(cte);
            } else {
                self.diagnostics.error(
                    DiagnosticCode::DuplicateCte,
                    cte.name.span,
                    format!("common table expression '{}' is defined more than once", cte.name),
                );
            }
        }
        self.scopes
            .declare_ctes(ScopeArena::ROOT, unique.iter().map(|c| c.name.value.clone()));

        let mut ctes = Vec::with_capacity(unique.len());
        for cte in unique {
            let frame = self.scopes.push_cte_frame(ScopeArena::ROOT, cte.name.as_str());
            match self.analyze_set_expr(&cte.body, frame) {
                Some(body) => {
                    self.scopes.define_cte(
                        ScopeArena::ROOT,
                        CteShape {
                            name: cte.name.value.clone(),
                            columns: body.columns().to_vec(),
                        },
                    );
                    ctes.push(BoundCte {
                        name: cte.name.value.clone(),
                        body,
                    });
                }
                None => {
                    self.failed_ctes.insert(cte.name.value.clone());
                }
            }
        }

        let body = self.analyze_set_expr(&query.body, ScopeArena::ROOT)?;
        Some(BoundQuery { ctes, body })
    }

    fn analyze_set_expr(&mut self, expr: &SetExpr, parent: FrameId) -> Option<BoundSetExpr> {
        let (op, keys, left, right, span) = match expr {
            SetExpr::Select(select) => {
                let frame = self.scopes.push_frame(parent);
                return self
                    .analyze_select(select, frame)
                    .map(|s| BoundSetExpr::Select(Box::new(s)));
            }
            SetExpr::SetOperation {
                op,
                keys,
                left,
                right,
                span,
            } => (*op, keys, left, right, *span),
        };

        let left = self.analyze_set_expr(left, parent);
        let right = self.analyze_set_expr(right, parent);
        if keys.is_empty() {
            self.diagnostics.report(
                Diagnostic::error(
                    DiagnosticCode::SetOperatorEmptyKeys,
                    span,
                    format!("{} needs at least one key column", op.name()),
                )
                .with_hint(format!("list the key columns, e.g. {} (Name)", op.name())),
            );
        }
        let (left, right) = (left?, right?);
        if keys.is_empty() {
            return None;
        }

        let (lc, rc) = (left.columns(), right.columns());
        if lc.len() != rc.len() {
            self.diagnostics.error(
                DiagnosticCode::SetOperatorColumnCount,
                span,
                format!(
                    "{} branches have different column counts: {} and {}",
                    op.name(),
                    lc.len(),
                    rc.len()
                ),
            );
            return None;
        }
        let mut columns = Vec::with_capacity(lc.len());
        let mut mismatched = false;
        for (i, (l, r)) in lc.iter().zip(rc).enumerate() {
            if let (Some(a), Some(b)) = (l.data_type, r.data_type) {
                if a != b {
                    self.diagnostics.error(
                        DiagnosticCode::SetOperatorColumnType,
                        span,
                        format!(
                            "column {} ('{}') of {} is '{}' on the left and '{}' on the right",
                            i + 1,
                            l.name,
                            op.name(),
                            a,
                            b
                        ),
                    );
                    mismatched = true;
                }
            }
            columns.push(OutputColumn::new(l.name.clone(), l.data_type.or(r.data_type)));
        }
        if mismatched {
            return None;
        }

        Some(BoundSetExpr::SetOperation {
            op,
            keys: keys.iter().map(|k| k.value.clone()).collect(),
            left: Box::new(left),
            right: Box::new(right),
            columns,
        })
    }

    fn analyze_select(&mut self, select: &Select, frame: FrameId) -> Option<BoundSelect> {
        let errors_before = self.diagnostics.error_count();
        let aliases: Vec<String> = select
            .items
            .iter()
            .filter_map(|item| match item {
                SelectItem::Expr { alias: Some(a), .. } => Some(a.value.clone()),
                _ => None,
            })
            .collect();
        let scope = |clause| ExprScope::new(frame, clause, &aliases);

        // Sources. After a source fails, later ones are still resolved but
        // no expression over them is bound.
        let from = self.bind_source(&select.from, frame, Clause::SourceArgs);
        let mut sources_ok = from.is_some();
        let mut joins = Vec::with_capacity(select.joins.len());
        for clause in &select.joins {
            match clause {
                JoinClause::Join { join_type, item, on } => {
                    let source = self.bind_source(item, frame, Clause::SourceArgs);
                    sources_ok &= source.is_some();
                    if !sources_ok {
                        continue;
                    }
                    let on = self.bind_condition(on, scope(Clause::On));
                    if let (Some(source), Some(on)) = (source, on) {
                        joins.push(BoundJoin {
                            kind: BoundJoinKind::Join {
                                join_type: *join_type,
                                on,
                            },
                            source,
                        });
                    }
                }
                JoinClause::Apply { apply_type, item } => {
                    if !sources_ok {
                        continue;
                    }
                    match self.bind_source(item, frame, Clause::ApplyArgs) {
                        Some(source) => joins.push(BoundJoin {
                            kind: BoundJoinKind::Apply {
                                apply_type: *apply_type,
                            },
                            source,
                        }),
                        None => sources_ok = false,
                    }
                }
            }
        }
        if !sources_ok {
            return None;
        }
        let from = from?;

        let filter = select
            .selection
            .as_ref()
            .map(|e| self.bind_condition(e, scope(Clause::Where)));
        let group_by: Vec<Option<BoundExpr>> = select
            .group_by
            .iter()
            .map(|e| self.bind_expr(e, scope(Clause::GroupBy)))
            .collect();

        // (expression, output name, alias)
        let mut items: Vec<(BoundExpr, String, Option<&str>)> = Vec::new();
        for item in &select.items {
            match item {
                SelectItem::Wildcard(span) => {
                    for source in self.scopes.sources(frame) {
                        for (i, column) in source.columns.iter().enumerate() {
                            let expr = BoundExpr::column(source.offset + i, column.name.clone(), column.data_type, *span);
                            items.push((expr, column.name.clone(), None));
                        }
                    }
                }
                SelectItem::QualifiedWildcard(qualifier) => {
                    let source = self
                        .scopes
                        .source(frame, qualifier.as_str())
                        .map(|s| (s.offset, s.columns.clone()));
                    match source {
                        Some((offset, columns)) => {
                            for (i, column) in columns.into_iter().enumerate() {
                                let expr = BoundExpr::column(offset + i, column.name.clone(), column.data_type, qualifier.span);
                                items.push((expr, column.name, None));
                            }
                        }
                        None => {
                            let hint = {
                                let known = self.scopes.sources(frame).iter().map(|s| s.alias.as_str());
                                did_you_mean(qualifier.as_str(), known)
                            };
                            self.diagnostics.report(
                                Diagnostic::error(
                                    DiagnosticCode::UnknownAlias,
                                    qualifier.span,
                                    format!("unknown alias '{}'", qualifier),
                                )
                                .with_optional_hint(hint),
                            );
                        }
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    if let Some(bound) = self.bind_expr(expr, scope(Clause::Select)) {
                        let name = match (alias, &expr.kind) {
                            (Some(alias), _) => alias.value.clone(),
                            (None, ExprKind::Column { name, .. }) => name.value.clone(),
                            (None, _) => expr.span.slice(self.text).to_string(),
                        };
                        items.push((bound, name, alias.as_ref().map(|a| a.as_str())));
                    }
                }
            }
        }

        let having = select
            .having
            .as_ref()
            .map(|e| self.bind_condition(e, scope(Clause::Having)));

        let mut order_by = Vec::with_capacity(select.order_by.len());
        for item in &select.order_by {
            let aliased = match &item.expr.kind {
                ExprKind::Column { qualifier: None, name } => items
                    .iter()
                    .find(|(_, _, alias)| *alias == Some(name.as_str()))
                    .map(|(expr, _, _)| expr.clone()),
                _ => None,
            };
            let bound = match aliased {
                Some(expr) => Some(expr),
                None => self.bind_expr(&item.expr, scope(Clause::OrderBy)),
            };
            if let Some(bound) = bound {
                order_by.push((bound, item.order));
            }
        }

        if self.diagnostics.error_count() > errors_before {
            return None;
        }
        let filter = filter.flatten();
        let group_by: Vec<BoundExpr> = group_by.into_iter().flatten().collect();
        let having = having.flatten();

        let columns: Vec<OutputColumn> = items
            .iter()
            .map(|(expr, name, _)| OutputColumn::new(name.clone(), expr.ty))
            .collect();
        let projection: Vec<BoundExpr> = items.into_iter().map(|(expr, _, _)| expr).collect();

        let has_group_by = !select.group_by.is_empty();
        let grouped = has_group_by
            || having.is_some()
            || projection.iter().any(BoundExpr::contains_aggregate)
            || order_by.iter().any(|(e, _)| e.contains_aggregate());

        let (aggregation, projection, having, order_by, distinct_after_projection) = if grouped {
            let mut rewriter = GroupingRewriter::new(group_by);
            let projection = rewriter.rewrite_all(&projection, &mut self.diagnostics);
            let having = having.map(|h| rewriter.rewrite(&h, &mut self.diagnostics));
            let order_by = self.rewrite_order_by(&mut rewriter, order_by);
            let (projection, order_by) = (projection?, order_by?);
            let having = match having {
                Some(h) => Some(h?),
                None => None,
            };
            (Some(rewriter.finish()), projection, having, order_by, select.distinct)
        } else if select.distinct {
            let mut rewriter = GroupingRewriter::for_distinct(projection.clone());
            let order_by = self.rewrite_order_by(&mut rewriter, order_by)?;
            let projection = projection
                .iter()
                .enumerate()
                .map(|(i, e)| BoundExpr::column(i, e.to_string(), e.ty, e.span))
                .collect();
            (Some(rewriter.finish()), projection, None, order_by, false)
        } else {
            (None, projection, None, order_by, false)
        };

        Some(BoundSelect {
            from,
            joins,
            filter,
            aggregation,
            having,
            order_by,
            skip: select.skip,
            take: select.take,
            projection,
            distinct: select.distinct,
            distinct_after_projection,
            has_group_by,
            columns,
        })
    }

    fn rewrite_order_by(
        &mut self,
        rewriter: &mut GroupingRewriter,
        order_by: Vec<(BoundExpr, crate::ast::SortOrder)>,
    ) -> Option<Vec<(BoundExpr, crate::ast::SortOrder)>> {
        let out: Vec<Option<(BoundExpr, crate::ast::SortOrder)>> = order_by
            .into_iter()
            .map(|(e, order)| rewriter.rewrite(&e, &mut self.diagnostics).map(|e| (e, order)))
            .collect();
        out.into_iter().collect()
    }

    fn schema_handle(&mut self, name: &crate::ast::Ident) -> Option<SchemaHandle> {
        if let Some(Some(handle)) = self.schemas.get(name.as_str()) {
            return Some(handle.clone());
        }
        let known = self.provider.schema_names();
        let hint = did_you_mean(name.as_str(), known.iter().map(String::as_str));
        self.diagnostics.report(
            Diagnostic::error(
                DiagnosticCode::UnknownSchema,
                name.span,
                format!("unknown schema '{}'", name),
            )
            .with_optional_hint(hint),
        );
        None
    }

    /// Asks a schema to describe a method call.
    fn describe(
        &mut self,
        handle: &SchemaHandle,
        method: &crate::ast::Ident,
        args: &[BoundExpr],
        declared: Option<&[(String, DataType)]>,
    ) -> Option<TableMetadata> {
        let literals: Vec<Option<Value>> = args
            .iter()
            .map(|a| match &a.kind {
                BoundExprKind::Literal(v) => Some(v.clone()),
                _ => None,
            })
            .collect();
        let ctx = SchemaContext {
            query_id: self.query_id,
            environment: self.environment,
            records: self.declarations.records(),
            declared_columns: declared,
        };
        match handle.schema.table_metadata(method.as_str(), &ctx, &literals) {
            Ok(metadata) => Some(metadata),
            Err(Error::TableNotFound { .. }) => {
                self.diagnostics.error(
                    DiagnosticCode::UnknownTable,
                    method.span,
                    format!("schema '{}' has no method '{}'", handle.name, method),
                );
                None
            }
            Err(error) => {
                tracing::warn!(schema = %handle.name, method = %method, %error, "source metadata failed");
                self.diagnostics.error(
                    DiagnosticCode::SourceMetadataError,
                    method.span,
                    format!("schema '{}' failed to describe '{}': {}", handle.name, method, error),
                );
                None
            }
        }
    }

    /// Resolves a FROM / JOIN / APPLY item and binds it in `frame`.
    ///
    /// Arguments of FROM and JOIN items see no columns. APPLY arguments see
    /// every source bound before the item.
    fn bind_source(&mut self, item: &FromItem, frame: FrameId, args_clause: Clause) -> Option<BoundSource> {
        let arg_frame = match args_clause {
            Clause::ApplyArgs => frame,
            _ => self.scopes.push_frame(frame),
        };
        let bind_args = |this: &mut Self, args: &[crate::ast::Expr]| -> Option<Vec<BoundExpr>> {
            let scope = ExprScope::new(arg_frame, args_clause, &[]);
            let bound: Vec<Option<BoundExpr>> = args.iter().map(|a| this.bind_expr(a, scope)).collect();
            bound.into_iter().collect()
        };

        let (default_alias, kind, source_kind, columns) = match &item.source {
            FromSource::SchemaCall { schema, method, args } => {
                let args = bind_args(self, args);
                let handle = self.schema_handle(schema)?;
                let args = args?;
                let metadata = self.describe(&handle, method, &args, None)?;
                let columns: Vec<OutputColumn> = metadata
                    .columns()
                    .iter()
                    .map(|c| OutputColumn::new(c.name(), Some(c.data_type())))
                    .collect();
                let kind = BoundSourceKind::Schema {
                    schema: handle,
                    method: method.value.clone(),
                    args,
                    projection: None,
                    provider_width: columns.len(),
                };
                (method.value.clone(), kind, SourceKind::Table, columns)
            }
            FromSource::Coupled { name, args } => {
                let args = bind_args(self, args);
                let Some((couple, table)) = self.declarations.coupled(name.as_str()) else {
                    let hint = {
                        let mut known: Vec<&str> = self.declarations.coupled_aliases().collect();
                        known.extend(self.scopes.visible_ctes(frame));
                        did_you_mean(name.as_str(), known)
                    };
                    self.diagnostics.report(
                        Diagnostic::error(
                            DiagnosticCode::UnknownTable,
                            name.span,
                            format!("no coupled source named '{}'", name),
                        )
                        .with_optional_hint(hint),
                    );
                    return None;
                };
                let (couple, table) = (couple.clone(), table.clone());
                let schema_ident = crate::ast::Ident::new(couple.schema.clone(), name.span);
                let method_ident = crate::ast::Ident::new(couple.method.clone(), name.span);
                let handle = self.schema_handle(&schema_ident)?;
                let args = args?;
                let metadata = self.describe(&handle, &method_ident, &args, Some(&table.columns))?;

                let mut projection = Vec::with_capacity(table.columns.len());
                let mut failed = false;
                for (column, declared_type) in &table.columns {
                    let Some(index) = metadata.get_column_index(column) else {
                        self.diagnostics.error(
                            DiagnosticCode::CoupledColumnMissing,
                            name.span,
                            format!(
                                "column '{}' of table '{}' is not provided by {}.{}",
                                column, table.name, couple.schema, couple.method
                            ),
                        );
                        failed = true;
                        continue;
                    };
                    let provided = metadata.columns()[index].data_type();
                    if self.options.enable_primitive_type_validation && !provided.can_widen_to(*declared_type) {
                        self.diagnostics.error(
                            DiagnosticCode::CoupledColumnType,
                            name.span,
                            format!(
                                "column '{}' of table '{}' is declared '{}' but {}.{} provides '{}'",
                                column,
                                table.name,
                                declared_type,
                                couple.schema,
                                couple.method,
                                type_name(Some(provided))
                            ),
                        );
                        failed = true;
                    }
                    projection.push(index);
                }
                if failed {
                    return None;
                }
                let columns = table
                    .columns
                    .iter()
                    .map(|(n, t)| OutputColumn::new(n.clone(), Some(*t)))
                    .collect();
                let kind = BoundSourceKind::Schema {
                    schema: handle,
                    method: couple.method.clone(),
                    args,
                    projection: Some(projection),
                    provider_width: metadata.column_count(),
                };
                (couple.alias.clone(), kind, SourceKind::Table, columns)
            }
            FromSource::Reference { name } => {
                if self.failed_ctes.contains(name.as_str()) {
                    return None;
                }
                let columns = match self.scopes.lookup_cte(frame, name.as_str()) {
                    CteLookup::Defined(shape) => Ok(shape.columns.clone()),
                    CteLookup::Forward => Err(Diagnostic::error(
                        DiagnosticCode::CteForwardReference,
                        name.span,
                        format!("common table expression '{}' is referenced before it is defined", name),
                    )
                    .with_hint("define it earlier in the WITH clause")),
                    CteLookup::SelfReference => Err(Diagnostic::error(
                        DiagnosticCode::RecursiveCte,
                        name.span,
                        format!("common table expression '{}' refers to itself", name),
                    )),
                    CteLookup::Unknown => {
                        let mut known = self.scopes.visible_ctes(frame);
                        known.extend(self.declarations.coupled_aliases());
                        let hint = did_you_mean(name.as_str(), known);
                        Err(Diagnostic::error(
                            DiagnosticCode::UnknownTable,
                            name.span,
                            format!("unknown table or common table expression '{}'", name),
                        )
                        .with_optional_hint(hint))
                    }
                };
                let columns = match columns {
                    Ok(columns) => columns,
                    Err(diagnostic) => {
                        self.diagnostics.report(diagnostic);
                        return None;
                    }
                };
                let kind = BoundSourceKind::Cte {
                    name: name.value.clone(),
                };
                (name.value.clone(), kind, SourceKind::Cte, columns)
            }
        };

        let alias = item.alias.as_ref().map_or(default_alias, |a| a.value.clone());
        match self.scopes.add_source(frame, &alias, source_kind, columns.clone()) {
            Ok(offset) => Some(BoundSource {
                alias,
                kind,
                columns,
                offset,
            }),
            Err(_) => {
                let span = item.alias.as_ref().map_or(item.span, |a| a.span);
                self.diagnostics.report(
                    Diagnostic::error(
                        DiagnosticCode::DuplicateAlias,
                        span,
                        format!("alias '{}' is already used in this query block", alias),
                    )
                    .with_hint("give the source a distinct alias with AS"),
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests;
