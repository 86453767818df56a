use super::*;
use crate::diagnostics::DiagnosticCode as Code;
use crate::functions::{FunctionDef, ParamType, ReturnType};
use crate::memory::{InMemorySchema, InMemorySchemaProvider};
use crate::parser::parse;
use quarry_core::schema::Column;

fn provider() -> InMemorySchemaProvider {
    let entities = TableMetadata::new(
        "entities",
        vec![
            Column::new("Name", DataType::String),
            Column::new("City", DataType::String),
            Column::new("Population", DataType::Int64),
        ],
    );
    let orders = TableMetadata::new(
        "orders",
        vec![
            Column::new("Id", DataType::Int32),
            Column::new("City", DataType::String),
            Column::new("Amount", DataType::Float64),
        ],
    );
    InMemorySchemaProvider::new().with_schema(
        "mem",
        InMemorySchema::new()
            .with_table("entities", entities, Vec::new())
            .with_table("orders", orders, Vec::new()),
    )
}

fn analyze_text(text: &str) -> Result<BoundQuery, Diagnostics> {
    let script = parse(text).unwrap();
    analyze(
        &script,
        text,
        7,
        &provider(),
        &Environment::new(),
        &CompilerOptions::default(),
    )
}

fn codes(text: &str) -> Vec<Code> {
    analyze_text(text).unwrap_err().codes()
}

fn select_of(query: &BoundQuery) -> &BoundSelect {
    match &query.body {
        BoundSetExpr::Select(select) => select,
        other => panic!("expected a select block, got {:?}", other),
    }
}

#[test]
fn test_resolves_columns_and_types() {
    let query = analyze_text("select Name, Population * 2 as Twice from #mem.entities() e where e.City = 'Warsaw'").unwrap();
    let select = select_of(&query);
    assert_eq!(select.from.alias, "e");
    assert_eq!(select.columns[0], OutputColumn::new("Name", Some(DataType::String)));
    assert_eq!(select.columns[1], OutputColumn::new("Twice", Some(DataType::Int64)));
    assert_eq!(select.filter.as_ref().unwrap().referenced_columns(), vec![1]);
    assert!(select.aggregation.is_none());
}

#[test]
fn test_expression_output_name_is_source_text() {
    let query = analyze_text("select ToUpper(Name), Count(*) from #mem.entities() group by ToUpper(Name)").unwrap();
    let names: Vec<&str> = query.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["ToUpper(Name)", "Count(*)"]);
}

#[test]
fn test_join_offsets_and_ambiguity() {
    let query = analyze_text(
        "select o.Amount, e.Name from #mem.entities() e inner join #mem.orders() o on e.City = o.City",
    )
    .unwrap();
    let select = select_of(&query);
    assert_eq!(select.joins[0].source.offset, 3);
    assert_eq!(select.projection[0].referenced_columns(), vec![5]);

    let err = analyze_text("select City from #mem.entities() e inner join #mem.orders() o on e.City = o.City")
        .unwrap_err();
    assert_eq!(err.codes(), vec![Code::AmbiguousColumn]);
    assert_eq!(err.as_slice()[0].hint.as_deref(), Some("qualify it with one of: e, o"));
}

#[test]
fn test_select_alias_is_not_visible_in_where() {
    let err = analyze_text("select Population as P from #mem.entities() where P > 10").unwrap_err();
    assert_eq!(err.codes(), vec![Code::UnknownColumn]);
    assert!(err.as_slice()[0].hint.as_deref().unwrap().contains("SELECT alias"));
}

#[test]
fn test_order_by_prefers_select_alias() {
    let query = analyze_text("select Population * 2 as Name from #mem.entities() order by Name").unwrap();
    let select = select_of(&query);
    assert_eq!(select.order_by[0].0, select.projection[0]);
}

#[test]
fn test_unknown_names_have_hints() {
    let err = analyze_text("select Nme from #mem.entities()").unwrap_err();
    assert_eq!(err.as_slice()[0].hint.as_deref(), Some("did you mean 'Name'?"));

    let err = analyze_text("select Name from #memo.entities()").unwrap_err();
    assert_eq!(err.codes(), vec![Code::UnknownSchema]);
    assert_eq!(err.as_slice()[0].hint.as_deref(), Some("did you mean 'mem'?"));

    assert_eq!(codes("select Name from #mem.people()"), vec![Code::UnknownTable]);
    assert_eq!(codes("select x.Name from #mem.entities() e"), vec![Code::UnknownAlias]);
}

#[test]
fn test_independent_errors_are_all_reported() {
    let err = analyze_text(
        "select Nope, Name + 1 from #mem.entities() where Population / 0 > 1 order by Missing",
    )
    .unwrap_err();
    assert_eq!(
        err.codes(),
        vec![
            Code::DivisionByZero,
            Code::UnknownColumn,
            Code::InvalidOperandTypes,
            Code::UnknownColumn,
        ]
    );
}

#[test]
fn test_duplicate_alias() {
    assert_eq!(
        codes("select 1 from #mem.entities() a inner join #mem.orders() a on 1 = 1"),
        vec![Code::DuplicateAlias]
    );
}

#[test]
fn test_grouping_rewrites_post_aggregation_expressions() {
    let query = analyze_text(
        "select City, Count(*) as C, Sum(Population) / Count(*) from #mem.entities() \
         group by City having Count(*) > 1 order by City",
    )
    .unwrap();
    let select = select_of(&query);
    let aggregation = select.aggregation.as_ref().unwrap();
    assert_eq!(aggregation.group_by.len(), 1);
    assert_eq!(aggregation.aggregates.len(), 2);
    assert_eq!(select.projection[1].referenced_columns(), vec![1]);
    assert_eq!(select.projection[2].referenced_columns(), vec![2, 1]);
    assert_eq!(select.having.as_ref().unwrap().referenced_columns(), vec![1]);
    assert_eq!(select.columns[1].data_type, Some(DataType::Int64));
    assert!(select.has_group_by);
}

#[test]
fn test_group_by_violations() {
    assert_eq!(
        codes("select * from #mem.entities() group by City"),
        vec![Code::NonAggregatedColumn, Code::NonAggregatedColumn]
    );
    assert_eq!(
        codes("select Name, Count(*) from #mem.entities()"),
        vec![Code::NonAggregatedColumn]
    );
    assert_eq!(
        codes("select City from #mem.entities() where Count(*) > 1 group by City"),
        vec![Code::AggregateNotAllowed]
    );
    assert_eq!(
        codes("select Sum(Count(*)) from #mem.entities()"),
        vec![Code::NestedAggregate]
    );
    assert_eq!(
        codes("select Sum(Name) from #mem.entities()"),
        vec![Code::CannotResolveMethod]
    );
}

#[test]
fn test_distinct_becomes_grouping() {
    let query = analyze_text("select distinct City from #mem.entities()").unwrap();
    let select = select_of(&query);
    let aggregation = select.aggregation.as_ref().unwrap();
    assert_eq!(aggregation.group_by.len(), 1);
    assert!(aggregation.aggregates.is_empty());
    assert!(!select.distinct_after_projection);

    let query = analyze_text("select distinct Count(*) from #mem.entities() group by City").unwrap();
    assert!(select_of(&query).distinct_after_projection);

    assert_eq!(
        codes("select distinct City from #mem.entities() order by Name"),
        vec![Code::NonAggregatedColumn]
    );
}

#[test]
fn test_type_errors() {
    assert_eq!(
        codes("select Name from #mem.entities() where Population"),
        vec![Code::NonBooleanCondition]
    );
    assert_eq!(
        codes("select case when Population > 1 then Name else 1 end from #mem.entities()"),
        vec![Code::CaseBranchTypeMismatch]
    );
    assert_eq!(
        codes("select Name from #mem.entities() where Name and true"),
        vec![Code::InvalidOperandTypes]
    );
    assert_eq!(codes("select Abs(null) from #mem.entities()"), vec![Code::AmbiguousMethodCall]);

    let err = analyze_text("select ToUppr(Name) from #mem.entities()").unwrap_err();
    assert_eq!(err.codes(), vec![Code::CannotResolveMethod]);
    assert_eq!(err.as_slice()[0].hint.as_deref(), Some("did you mean 'ToUpper'?"));
}

#[test]
fn test_function_calls_bind_overloads() {
    let query = analyze_text("select Substring(Name, 1, 2), Coalesce(null, Population, 1) from #mem.entities()").unwrap();
    let select = select_of(&query);
    assert_eq!(select.columns[0].data_type, Some(DataType::String));
    assert_eq!(select.columns[1].data_type, Some(DataType::Int64));
}

#[test]
fn test_cte_references() {
    let query = analyze_text(
        "with big as (select Name, City from #mem.entities() where Population > 100) \
         select b.Name, o.Amount from big b inner join #mem.orders() o on b.City = o.City",
    )
    .unwrap();
    assert_eq!(query.ctes.len(), 1);
    assert!(matches!(select_of(&query).from.kind, BoundSourceKind::Cte { ref name } if name == "big"));

    assert_eq!(
        codes("with a as (select Name from b), b as (select Name from #mem.entities()) select Name from a"),
        vec![Code::CteForwardReference]
    );
    assert_eq!(
        codes("with a as (select Name from #mem.entities()), a as (select Name from a) select Name from a"),
        vec![Code::DuplicateCte]
    );
    assert_eq!(
        codes("with a as (select Name from a) select Name from #mem.entities()"),
        vec![Code::RecursiveCte]
    );
    // a failed CTE is reported once
    assert_eq!(
        codes("with a as (select Nope from #mem.entities()) select Name from a"),
        vec![Code::UnknownColumn]
    );
}

#[test]
fn test_set_operations() {
    let query = analyze_text(
        "select Name, City from #mem.entities() union (Name) select City, City from #mem.orders()",
    )
    .unwrap();
    match &query.body {
        BoundSetExpr::SetOperation { keys, columns, .. } => {
            assert_eq!(keys, &vec!["Name".to_string()]);
            assert_eq!(columns[0].name, "Name");
        }
        other => panic!("expected a set operation, got {:?}", other),
    }

    assert_eq!(
        codes("select Name from #mem.entities() union all () select City from #mem.orders()"),
        vec![Code::SetOperatorEmptyKeys]
    );
    assert_eq!(
        codes("select Name, City from #mem.entities() except (Name) select City from #mem.orders()"),
        vec![Code::SetOperatorColumnCount]
    );
    assert_eq!(
        codes("select Name from #mem.entities() intersect (Name) select Id from #mem.orders()"),
        vec![Code::SetOperatorColumnType]
    );
}

#[test]
fn test_coupled_sources() {
    let query = analyze_text(
        "table Towns { City string, Population long }; \
         couple #mem.entities with table Towns as Towns; \
         select City from Towns() t",
    )
    .unwrap();
    match &select_of(&query).from.kind {
        BoundSourceKind::Schema {
            projection,
            provider_width,
            ..
        } => {
            assert_eq!(projection.as_deref(), Some(&[1usize, 2][..]));
            assert_eq!(*provider_width, 3);
        }
        other => panic!("expected a schema source, got {:?}", other),
    }

    assert_eq!(
        codes("table T { Country string }; couple #mem.entities with table T as X; select Country from X()"),
        vec![Code::CoupledColumnMissing]
    );
    assert_eq!(
        codes("table T { Population int }; couple #mem.entities with table T as X; select Population from X()"),
        vec![Code::CoupledColumnType]
    );
    assert_eq!(
        codes("table T { Name string }; couple #mem.entities with table T as X; select Name from Y()"),
        vec![Code::UnknownTable]
    );
}

#[test]
fn test_apply_arguments_see_previous_sources() {
    let query = analyze_text(
        "select e.Name, o.Id from #mem.entities() e cross apply #mem.orders() o where o.City = e.City",
    )
    .unwrap();
    assert!(matches!(
        select_of(&query).joins[0].kind,
        BoundJoinKind::Apply { .. }
    ));

    // FROM and JOIN arguments see no columns
    assert_eq!(
        codes("select 1 from #mem.entities() e inner join #mem.orders(e.Name) o on 1 = 1"),
        vec![Code::UnknownAlias]
    );
}

#[test]
fn test_same_function_from_two_schemas_is_ambiguous() {
    let twice = FunctionDef::new(
        "Twice",
        vec![ParamType::Exact(DataType::Int64)],
        ReturnType::Fixed(DataType::Int64),
        |args: &[Value]| args[0].clone(),
    );
    let metadata = TableMetadata::new("entities", vec![Column::new("Population", DataType::Int64)]);
    let schema = || {
        InMemorySchema::new()
            .with_table("entities", metadata.clone(), Vec::new())
            .with_function(twice.clone())
    };
    let provider = InMemorySchemaProvider::new()
        .with_schema("a", schema())
        .with_schema("b", schema());

    let text = "select Twice(x.Population) from #a.entities() x inner join #b.entities() y on x.Population = y.Population";
    let script = parse(text).unwrap();
    let err = analyze(&script, text, 7, &provider, &Environment::new(), &CompilerOptions::default()).unwrap_err();
    assert_eq!(err.codes(), vec![Code::AmbiguousMethodCall]);

    // One contributing schema resolves normally
    let text = "select Twice(x.Population) from #a.entities() x";
    let script = parse(text).unwrap();
    assert!(analyze(&script, text, 7, &provider, &Environment::new(), &CompilerOptions::default()).is_ok());
}
