//! End-to-end tests: query text in, table out.

use quarry_core::schema::{Column, TableMetadata};
use quarry_core::{DataType, Value};
use quarry_query::memory::{InMemorySchema, InMemorySchemaProvider};
use quarry_query::{
    compile, CancellationToken, CompilerOptions, DiagnosticCode, ProgressLog, ProgressPhase, QueryCompiler,
    QueryError, QueryHints, RowSource, RuntimeContext, Schema, SchemaContext, SchemaProvider, Table,
    VecRowSource,
};
use std::sync::{Arc, Mutex};
use std::thread;

fn entities_metadata() -> TableMetadata {
    TableMetadata::new(
        "Entities",
        vec![
            Column::new("Name", DataType::String),
            Column::new("City", DataType::String),
            Column::new("Population", DataType::Int64),
        ],
    )
}

fn entity(name: &str, city: &str, population: i64) -> Vec<Value> {
    vec![Value::from(name), Value::from(city), Value::Int64(population)]
}

fn entities() -> Vec<Vec<Value>> {
    vec![
        entity("A", "Warsaw", 50_000),
        entity("B", "Gdansk", 200_000),
        entity("C", "Warsaw", 1_000_000),
        entity("D", "Krakow", 100_000),
        entity("E", "Gdansk", 500_000),
    ]
}

fn orders_metadata() -> TableMetadata {
    TableMetadata::new(
        "Orders",
        vec![Column::new("City", DataType::String), Column::new("Amount", DataType::Float64)],
    )
}

fn orders() -> Vec<Vec<Value>> {
    vec![
        vec![Value::from("Warsaw"), Value::Float64(10.0)],
        vec![Value::from("Gdansk"), Value::Float64(2.5)],
        vec![Value::from("Warsaw"), Value::Float64(4.0)],
    ]
}

fn provider() -> Arc<dyn SchemaProvider> {
    let shop = InMemorySchema::new()
        .with_table("Orders", orders_metadata(), orders())
        .with_method("OrdersIn", orders_metadata(), |args| {
            let city = args.first().cloned().unwrap_or(Value::Null);
            Ok(orders().into_iter().filter(|row| row[0] == city).collect())
        });
    Arc::new(
        InMemorySchemaProvider::new()
            .with_schema("A", InMemorySchema::new().with_table("Entities", entities_metadata(), entities()))
            .with_schema("shop", shop),
    )
}

fn run(text: &str) -> Table {
    compile(text, 1, provider(), CompilerOptions::default())
        .unwrap_or_else(|e| panic!("{text}: {e}"))
        .run(&CancellationToken::new())
        .unwrap()
}

fn compile_error(text: &str) -> QueryError {
    compile(text, 1, provider(), CompilerOptions::default()).unwrap_err()
}

fn strings(table: &Table, column: &str) -> Vec<String> {
    table
        .column_values(column)
        .unwrap()
        .into_iter()
        .map(|v| v.to_string())
        .collect()
}

#[test]
fn test_between_includes_both_bounds() {
    let table = run("select Name from #A.Entities() where Population between 100000 and 500000");
    assert_eq!(table.len(), 3);
    assert_eq!(strings(&table, "Name"), vec!["B", "D", "E"]);
}

#[test]
fn test_where_order_skip_take() {
    let table = run(
        "select e.Name, e.Population from #A.Entities() e where e.City <> 'Krakow' \
         order by e.Population desc skip 1 take 2",
    );
    assert_eq!(strings(&table, "Name"), vec!["E", "B"]);
}

#[test]
fn test_grouping_and_having() {
    let table = run(
        "select City, Count(*) as Cities, Sum(Population) as Total from #A.Entities() \
         group by City having Count(*) > 1 order by City",
    );
    assert_eq!(strings(&table, "City"), vec!["Gdansk", "Warsaw"]);
    assert_eq!(table.value(0, "Cities"), Some(&Value::Int64(2)));
    assert_eq!(table.value(1, "Total"), Some(&Value::Int64(1_050_000)));
}

#[test]
fn test_distinct() {
    let table = run("select distinct City from #A.Entities()");
    assert_eq!(strings(&table, "City"), vec!["Warsaw", "Gdansk", "Krakow"]);
}

#[test]
fn test_cross_apply_passes_previous_columns() {
    let table = run(
        "select e.Name, o.Amount from #A.Entities() e cross apply #shop.OrdersIn(e.City) o \
         where e.Population > 100000",
    );
    // B and E in Gdansk get one order each, C in Warsaw gets two
    assert_eq!(strings(&table, "Name"), vec!["B", "C", "C", "E"]);

    let table = run("select e.Name, o.Amount from #A.Entities() e outer apply #shop.OrdersIn(e.City) o");
    assert_eq!(table.len(), 7);
    assert_eq!(table.value(5, "Name"), Some(&Value::from("D")));
    assert_eq!(table.value(5, "Amount"), Some(&Value::Null));
}

#[test]
fn test_cross_schema_apply_inside_later_cte() {
    let table = run(
        "with Cities as (select e.City from #A.Entities() e where e.Population >= 500000), \
         Sales as (select c.City, o.Amount from Cities c cross apply #shop.OrdersIn(c.City) o) \
         select s.City, s.Amount from Sales s order by s.Amount",
    );
    assert_eq!(
        table.column_values("Amount").unwrap(),
        vec![&Value::Float64(2.5), &Value::Float64(4.0), &Value::Float64(10.0)]
    );
}

#[test]
fn test_union_all_with_key_list_in_ctes() {
    let text = "with Big as (select Name from #A.Entities() where Population > 100000), \
                Small as (select Name from #A.Entities() where Population <= 100000) \
                select Name from Big union all (Name) select Name from Small";
    assert_eq!(run(text).len(), 5);

    let err = compile_error(
        "with Big as (select Name from #A.Entities()), Small as (select Name from #A.Entities()) \
         select Name from Big union all select Name from Small",
    );
    assert!(err.syntax_error().is_some());

    let err = compile_error("select Name from #A.Entities() union all () select Name from #A.Entities()");
    assert!(err.has_code(DiagnosticCode::SetOperatorEmptyKeys));
}

#[test]
fn test_keyed_set_operations() {
    let table = run(
        "select City, Name from #A.Entities() union (City) select City, 'x' from #shop.Orders()",
    );
    assert_eq!(strings(&table, "Name"), vec!["A", "B", "D"]);

    let table = run("select City from #A.Entities() except (City) select City from #shop.Orders()");
    assert_eq!(strings(&table, "City"), vec!["Krakow"]);

    let table = run("select City, Name from #A.Entities() intersect (City) select City, 'x' from #shop.Orders()");
    assert_eq!(strings(&table, "Name"), vec!["A", "B", "C", "E"]);
}

#[test]
fn test_forward_cte_reference_fails_at_compile_time() {
    let err = compile_error(
        "with First as (select * from Second s), Second as (select Name from #A.Entities()) \
         select Name from First",
    );
    assert!(err.has_code(DiagnosticCode::CteForwardReference));
    assert!(!err.diagnostics().is_empty());
}

#[test]
fn test_diagnostics_are_collected() {
    let err = compile_error("select Nme, Count(*) from #A.Entities() e where e.Population / 0 > 1");
    let codes: Vec<DiagnosticCode> = err.diagnostics().iter().map(|d| d.code).collect();
    assert!(codes.contains(&DiagnosticCode::UnknownColumn));
    assert!(codes.contains(&DiagnosticCode::DivisionByZero));

    let err = compile_error("select * from #A.Entities() group by City");
    assert!(err.has_code(DiagnosticCode::NonAggregatedColumn));

    let err = compile_error("select Name from #A.Entities() limit 5");
    assert!(err.syntax_error().is_some());

    let err = compile_error("select Name from #B.Entities()");
    assert!(err.has_code(DiagnosticCode::UnknownSchema));
}

#[test]
fn test_progress_is_reported_per_source() {
    let log = Arc::new(ProgressLog::new());
    let options = CompilerOptions {
        progress_interval: 2,
        ..CompilerOptions::default()
    };
    let query = QueryCompiler::new(provider())
        .options(options)
        .progress(log.clone())
        .compile("select e.Name, o.Amount from #A.Entities() e inner join #shop.Orders() o on e.City = o.City", 42)
        .unwrap();
    query.run(&CancellationToken::new()).unwrap();

    assert_eq!(
        log.phases_of("e"),
        vec![
            ProgressPhase::Begin,
            ProgressPhase::RowsKnown { total: 5 },
            ProgressPhase::RowsRead { read: 2 },
            ProgressPhase::RowsRead { read: 4 },
            ProgressPhase::RowsRead { read: 5 },
            ProgressPhase::End { total: 5 },
        ]
    );
    assert_eq!(log.phases_of("o").last(), Some(&ProgressPhase::End { total: 3 }));
    assert!(log.events().iter().all(|e| e.query_id == 42));
}

/// A schema that records the hints of every row source it opens.
struct RecordingSchema {
    seen: Mutex<Vec<QueryHints>>,
}

impl Schema for RecordingSchema {
    fn table_metadata(
        &self,
        _method: &str,
        _ctx: &SchemaContext<'_>,
        _args: &[Option<Value>],
    ) -> quarry_core::Result<TableMetadata> {
        Ok(entities_metadata())
    }

    fn row_source(
        &self,
        _method: &str,
        ctx: &RuntimeContext,
        _args: &[Value],
    ) -> quarry_core::Result<Box<dyn RowSource>> {
        self.seen.lock().unwrap().push(ctx.hints());
        Ok(Box::new(VecRowSource::new(entities())))
    }
}

struct SingleSchema(Arc<RecordingSchema>);

impl SchemaProvider for SingleSchema {
    fn schema(&self, name: &str) -> Option<Arc<dyn Schema>> {
        (name == "rec").then(|| Arc::clone(&self.0) as Arc<dyn Schema>)
    }
}

#[test]
fn test_hints_reach_the_row_source() {
    let schema = Arc::new(RecordingSchema { seen: Mutex::new(Vec::new()) });
    let provider: Arc<dyn SchemaProvider> = Arc::new(SingleSchema(Arc::clone(&schema)));

    let table = compile("select Name from #rec.rows() skip 1 take 2", 1, Arc::clone(&provider), CompilerOptions::default())
        .unwrap()
        .run(&CancellationToken::new())
        .unwrap();
    // Hints are advisory, the engine still applies SKIP / TAKE
    assert_eq!(strings(&table, "Name"), vec!["B", "C"]);

    compile("select Name from #rec.rows() order by Name take 1", 1, provider, CompilerOptions::default())
        .unwrap()
        .run(&CancellationToken::new())
        .unwrap();

    let seen = schema.seen.lock().unwrap();
    assert_eq!(
        seen[0],
        QueryHints {
            skip: Some(1),
            take: Some(2),
            is_distinct: false,
            has_optimization_hints: true,
        }
    );
    assert!(!seen[1].has_optimization_hints);
}

/// A row source that cancels its own query after a number of rows.
struct CancellingSource {
    token: CancellationToken,
    emitted: usize,
    cancel_after: usize,
}

impl RowSource for CancellingSource {
    fn next_row(&mut self) -> quarry_core::Result<Option<Vec<Value>>> {
        if self.emitted == self.cancel_after {
            self.token.cancel();
        }
        self.emitted += 1;
        Ok(Some(entity("x", "y", self.emitted as i64)))
    }
}

struct EndlessSchema {
    token: CancellationToken,
}

impl Schema for EndlessSchema {
    fn table_metadata(&self, _: &str, _: &SchemaContext<'_>, _: &[Option<Value>]) -> quarry_core::Result<TableMetadata> {
        Ok(entities_metadata())
    }

    fn row_source(&self, _: &str, _: &RuntimeContext, _: &[Value]) -> quarry_core::Result<Box<dyn RowSource>> {
        Ok(Box::new(CancellingSource {
            token: self.token.clone(),
            emitted: 0,
            cancel_after: 10,
        }))
    }
}

#[test]
fn test_cancellation_stops_an_endless_source() {
    let token = CancellationToken::new();
    let provider = InMemorySchemaProvider::new().with_schema("inf", EndlessSchema { token: token.clone() });
    let log = Arc::new(ProgressLog::new());
    let query = QueryCompiler::new(Arc::new(provider))
        .progress(log.clone())
        .compile("select Name from #inf.rows() r", 3)
        .unwrap();

    let err = query.run(&token).unwrap_err();
    assert!(err.is_cancelled());
    let phases = log.phases_of("r");
    assert_eq!(phases.first(), Some(&ProgressPhase::Begin));
    assert!(!phases.iter().any(|p| matches!(p, ProgressPhase::End { .. })));
}

#[test]
fn test_compiled_query_runs_on_another_thread() {
    let query = compile("select Name from #A.Entities()", 1, provider(), CompilerOptions::default()).unwrap();
    let rows = thread::spawn(move || query.run(&CancellationToken::new()).map(|t| t.len()))
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(rows, 5);
}

#[test]
fn test_explain() {
    let query = compile(
        "select e.Name from #A.Entities() e inner join #shop.Orders() o on e.City = o.City",
        1,
        provider(),
        CompilerOptions::default(),
    )
    .unwrap();
    let explain = query.explain();
    assert!(explain.starts_with("Project"), "{explain}");
    assert!(explain.contains("HashJoin"), "{explain}");
    assert!(explain.contains("  Scan e = #A.Entities()"), "{explain}");
}
