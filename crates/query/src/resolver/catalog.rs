//! Declarations made by the script itself: `TABLE`, `COUPLE` and record
//! layouts.

use crate::ast::{Definition, RecordDefinition};
use crate::diagnostics::suggest::did_you_mean;
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticContext, Span};
use quarry_core::DataType;
use std::collections::HashMap;

/// A `TABLE` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclaredTable {
    pub name: String,
    pub columns: Vec<(String, DataType)>,
    pub span: Span,
}

/// A `COUPLE` declaration: `alias(args)` calls `schema.method(args)` and
/// exposes the columns of `table`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoupledSource {
    pub alias: String,
    pub schema: String,
    pub method: String,
    pub table: String,
    pub span: Span,
}

/// Every declaration of a script, validated.
#[derive(Clone, Debug, Default)]
pub struct Declarations {
    tables: HashMap<String, DeclaredTable>,
    couples: HashMap<String, CoupledSource>,
    records: Vec<RecordDefinition>,
}

impl Declarations {
    /// Collects declarations, reporting duplicates and dangling references.
    pub fn collect(definitions: &[Definition], diagnostics: &mut DiagnosticContext) -> Self {
        let mut decls = Declarations::default();

        for definition in definitions {
            match definition {
                Definition::Table(table) => {
                    let name = table.name.as_str();
                    if decls.tables.contains_key(name) {
                        diagnostics.error(
                            DiagnosticCode::DuplicateDefinition,
                            table.name.span,
                            format!("table '{}' is declared more than once", name),
                        );
                        continue;
                    }
                    let mut columns: Vec<(String, DataType)> = Vec::new();
                    for column in &table.columns {
                        if columns.iter().any(|(n, _)| n == column.name.as_str()) {
                            diagnostics.error(
                                DiagnosticCode::DuplicateDefinition,
                                column.name.span,
                                format!("column '{}' is declared more than once in table '{}'", column.name, name),
                            );
                            continue;
                        }
                        if let Some(data_type) = DataType::from_name(column.type_name.as_str()) {
                            columns.push((column.name.value.clone(), data_type));
                        }
                    }
                    decls.tables.insert(
                        name.to_string(),
                        DeclaredTable {
                            name: name.to_string(),
                            columns,
                            span: table.span,
                        },
                    );
                }
                Definition::Couple(couple) => {
                    let alias = couple.alias.as_str();
                    if decls.couples.contains_key(alias) {
                        diagnostics.error(
                            DiagnosticCode::DuplicateDefinition,
                            couple.alias.span,
                            format!("coupled source '{}' is declared more than once", alias),
                        );
                        continue;
                    }
                    if !decls.tables.contains_key(couple.table.as_str()) {
                        let hint = did_you_mean(couple.table.as_str(), decls.tables.keys().map(String::as_str));
                        diagnostics.report(
                            Diagnostic::error(
                                DiagnosticCode::UnknownTable,
                                couple.table.span,
                                format!("table '{}' is not declared", couple.table),
                            )
                            .with_optional_hint(hint),
                        );
                        continue;
                    }
                    decls.couples.insert(
                        alias.to_string(),
                        CoupledSource {
                            alias: alias.to_string(),
                            schema: couple.schema.value.clone(),
                            method: couple.method.value.clone(),
                            table: couple.table.value.clone(),
                            span: couple.span,
                        },
                    );
                }
                Definition::Record(record) => {
                    if decls.records.iter().any(|r| r.name.value == record.name.value) {
                        diagnostics.error(
                            DiagnosticCode::DuplicateDefinition,
                            record.name.span,
                            format!("record '{}' is declared more than once", record.name),
                        );
                        continue;
                    }
                    decls.records.push(record.clone());
                }
            }
        }
        decls
    }

    /// Looks up a coupled source and its declared table.
    pub fn coupled(&self, alias: &str) -> Option<(&CoupledSource, &DeclaredTable)> {
        let couple = self.couples.get(alias)?;
        let table = self.tables.get(&couple.table)?;
        Some((couple, table))
    }

    /// Aliases of every coupled source.
    pub fn coupled_aliases(&self) -> impl Iterator<Item = &str> {
        self.couples.keys().map(String::as_str)
    }

    /// Schemas named by `COUPLE` declarations.
    pub fn coupled_schemas(&self) -> impl Iterator<Item = &str> {
        self.couples.values().map(|c| c.schema.as_str())
    }

    pub fn records(&self) -> &[RecordDefinition] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn collect(text: &str) -> (Declarations, DiagnosticContext) {
        let script = parse(text).unwrap();
        let mut diagnostics = DiagnosticContext::new();
        let decls = Declarations::collect(&script.definitions, &mut diagnostics);
        (decls, diagnostics)
    }

    #[test]
    fn test_couple_binds_declared_table() {
        let (decls, diagnostics) = collect(
            "table People { Name string, Age int }; couple #csv.file with table People as P; select Name from P()",
        );
        assert!(!diagnostics.has_errors());
        let (couple, table) = decls.coupled("P").unwrap();
        assert_eq!((couple.schema.as_str(), couple.method.as_str()), ("csv", "file"));
        assert_eq!(
            table.columns,
            vec![("Name".to_string(), DataType::String), ("Age".to_string(), DataType::Int32)]
        );
        assert_eq!(decls.coupled_schemas().collect::<Vec<_>>(), vec!["csv"]);
    }

    #[test]
    fn test_duplicates_and_dangling_tables() {
        let (decls, diagnostics) = collect(
            "table T { A int, A string }; table T { B int }; couple #s.m with table Tx as X; \
             text R { a: string }; text R { b: string }; select A from #s.m()",
        );
        let codes: Vec<DiagnosticCode> = diagnostics.diagnostics().iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiagnosticCode::DuplicateDefinition,
                DiagnosticCode::DuplicateDefinition,
                DiagnosticCode::UnknownTable,
                DiagnosticCode::DuplicateDefinition,
            ]
        );
        assert_eq!(diagnostics.diagnostics()[2].hint.as_deref(), Some("did you mean 'T'?"));
        assert!(decls.coupled("X").is_none());
        assert_eq!(decls.records().len(), 1);
    }
}
