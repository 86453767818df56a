//! Coded, spanned compile-time diagnostics.
//!
//! Every problem found while parsing, resolving or analyzing a query is a
//! [`Diagnostic`] carrying a stable [`DiagnosticCode`], a message and the
//! byte [`Span`] of the offending text. Diagnostics of one compilation are
//! collected in a [`DiagnosticContext`] so independent parts of a query can
//! all be checked before compilation fails.
//!
//! # Code ranges
//!
//! | Range | Category |
//! |-------|----------|
//! | `QRY-1001`..`QRY-1099` | Syntax |
//! | `QRY-2001`..`QRY-2099` | Scope and name resolution |
//! | `QRY-3001`..`QRY-3099` | Types and function resolution |
//! | `QRY-4001`..`QRY-4099` | Aggregation |
//! | `QRY-5001`..`QRY-5099` | CTEs and set operations |

pub mod suggest;

use std::fmt;

/// A byte range into the query text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    /// Inclusive start offset.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the smallest span covering both spans.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Returns the text covered by this span, or an empty string when the
    /// span does not fit the source.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }

    /// Returns the 1-based line and column of the span start.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let prefix = source.get(..self.start.min(source.len())).unwrap_or(source);
        let line = prefix.matches('\n').count() + 1;
        let line_start = prefix.rfind('\n').map_or(0, |i| i + 1);
        let column = prefix[line_start..].chars().count() + 1;
        (line, column)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Severity of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Compilation cannot succeed.
    Error,
    /// Suspicious but compilable.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

macro_rules! diagnostic_codes {
    ($($(#[$doc:meta])* $name:ident => $code:literal,)*) => {
        /// Stable diagnostic codes.
        ///
        /// The string form returned by [`DiagnosticCode::as_str`] is part of
        /// the public contract used by tooling; never renumber a variant.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum DiagnosticCode {
            $($(#[$doc])* $name,)*
        }

        impl DiagnosticCode {
            /// All codes in numeric order.
            pub const ALL: &'static [DiagnosticCode] = &[$(DiagnosticCode::$name,)*];

            /// Returns the code string, e.g. `QRY-2001`.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(DiagnosticCode::$name => $code,)*
                }
            }
        }
    };
}

diagnostic_codes! {
    // ========== Syntax ==========
    /// A token that cannot appear at this position.
    UnexpectedToken => "QRY-1001",
    /// The query ended while more input was expected.
    UnexpectedEndOfInput => "QRY-1002",
    /// A string literal without closing quote.
    UnterminatedString => "QRY-1003",
    /// A numeric literal that cannot be represented.
    InvalidNumber => "QRY-1004",
    /// A character outside the query alphabet.
    UnknownCharacter => "QRY-1005",
    /// A keyword from another SQL dialect (LIMIT, OFFSET, TOP, FETCH).
    UnsupportedKeyword => "QRY-1006",
    /// JOIN without ON.
    MissingJoinCondition => "QRY-1007",
    /// Set operator without parenthesized key list.
    SetOperatorMissingKeys => "QRY-1008",
    /// Subquery used as an expression.
    SubqueryNotSupported => "QRY-1009",
    /// Unknown type name in a TABLE declaration.
    InvalidTypeName => "QRY-1010",
    /// Expression nested deeper than the parser accepts.
    NestingTooDeep => "QRY-1011",

    // ========== Scope ==========
    /// Column reference that matches no source.
    UnknownColumn => "QRY-2001",
    /// Unqualified column declared by several sources.
    AmbiguousColumn => "QRY-2002",
    /// Qualifier that names no alias in scope.
    UnknownAlias => "QRY-2003",
    /// Alias declared twice in one FROM/JOIN/APPLY chain.
    DuplicateAlias => "QRY-2004",
    /// Schema name the provider does not know.
    UnknownSchema => "QRY-2005",
    /// Table, coupled source or CTE that does not exist.
    UnknownTable => "QRY-2006",
    /// TABLE or COUPLE name declared twice.
    DuplicateDefinition => "QRY-2007",
    /// Declared column missing from the coupled source.
    CoupledColumnMissing => "QRY-2008",
    /// The provider failed to describe a table.
    SourceMetadataError => "QRY-2009",

    // ========== Types ==========
    /// Operand types not accepted by an arithmetic or boolean operator.
    InvalidOperandTypes => "QRY-3001",
    /// No function overload matches name, arity and argument types.
    CannotResolveMethod => "QRY-3002",
    /// Several overloads match because an argument is null.
    AmbiguousMethodCall => "QRY-3003",
    /// CASE branches with incompatible result types.
    CaseBranchTypeMismatch => "QRY-3004",
    /// Division or modulo by a literal zero.
    DivisionByZero => "QRY-3005",
    /// Declared column type differs from the coupled source type.
    CoupledColumnType => "QRY-3006",
    /// WHERE, HAVING, ON or WHEN condition that is not boolean.
    NonBooleanCondition => "QRY-3007",

    // ========== Aggregation ==========
    /// Selected column neither grouped nor aggregated.
    NonAggregatedColumn => "QRY-4001",
    /// Aggregate call in a clause evaluated before grouping.
    AggregateNotAllowed => "QRY-4002",
    /// Aggregate call nested in another aggregate.
    NestedAggregate => "QRY-4003",

    // ========== CTEs and set operations ==========
    /// CTE name declared twice.
    DuplicateCte => "QRY-5001",
    /// Reference to a CTE declared later in the same WITH.
    CteForwardReference => "QRY-5002",
    /// CTE referencing itself, or WITH RECURSIVE.
    RecursiveCte => "QRY-5003",
    /// Set operator with an empty key list.
    SetOperatorEmptyKeys => "QRY-5004",
    /// Set operator branches with different column counts.
    SetOperatorColumnCount => "QRY-5005",
    /// Set operator branches with different column types at one position.
    SetOperatorColumnType => "QRY-5006",
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coded, spanned description of a compile-time problem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Stable code.
    pub code: DiagnosticCode,
    /// Human readable message.
    pub message: String,
    /// Offending text.
    pub span: Span,
    /// Severity.
    pub severity: Severity,
    /// Optional fix suggestion.
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    pub fn error(code: DiagnosticCode, span: Span, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            span,
            severity: Severity::Error,
            hint: None,
        }
    }

    /// Creates a warning diagnostic.
    pub fn warning(code: DiagnosticCode, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, span, message)
        }
    }

    /// Attaches a hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attaches a hint when one is available.
    pub fn with_optional_hint(mut self, hint: Option<String>) -> Self {
        self.hint = hint;
        self
    }

    /// Renders the diagnostic with the offending line underlined.
    pub fn render(&self, source: &str) -> String {
        let (line, column) = self.span.line_col(source);
        let text = source.lines().nth(line - 1).unwrap_or("");
        let gutter = line.to_string().len();
        let width = self.span.slice(source).chars().take_while(|c| *c != '\n').count().max(1);

        let mut out = format!(
            "{}[{}]: {}\n{:>g$}--> {}:{}\n{:>g$} |\n{} | {}\n{:>g$} | {}{}",
            self.severity,
            self.code,
            self.message,
            "",
            line,
            column,
            "",
            line,
            text,
            "",
            " ".repeat(column - 1),
            "^".repeat(width),
            g = gutter
        );
        if let Some(hint) = &self.hint {
            out.push_str(&format!("\n{:>g$} = hint: {}", "", hint, g = gutter));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} at {}", self.code, self.message, self.span)?;
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {})", hint)?;
        }
        Ok(())
    }
}

/// A non-empty list of diagnostics returned by a failed compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Returns the diagnostics in report order.
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.0
    }

    /// Returns true if any diagnostic has the given code.
    pub fn has_code(&self, code: DiagnosticCode) -> bool {
        self.0.iter().any(|d| d.code == code)
    }

    /// Returns the codes in report order.
    pub fn codes(&self) -> Vec<DiagnosticCode> {
        self.0.iter().map(|d| d.code).collect()
    }

    /// Returns the number of diagnostics.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders all diagnostics against the query text.
    pub fn render(&self, source: &str) -> String {
        self.0
            .iter()
            .map(|d| d.render(source))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Accumulates diagnostics during one compilation.
#[derive(Debug, Default)]
pub struct DiagnosticContext {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(code = %diagnostic.code, message = %diagnostic.message, "diagnostic");
        self.diagnostics.push(diagnostic);
    }

    /// Records an error diagnostic.
    pub fn error(&mut self, code: DiagnosticCode, span: Span, message: impl Into<String>) {
        self.report(Diagnostic::error(code, span, message));
    }

    /// Returns true when at least one error was recorded.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Returns the recorded diagnostics.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Number of errors recorded so far.
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Returns every recorded diagnostic.
    pub fn into_diagnostics(self) -> Diagnostics {
        Diagnostics(self.diagnostics)
    }

    /// Returns `value` if no error was recorded, all diagnostics otherwise.
    pub fn finish<T>(self, value: T) -> Result<T, Diagnostics> {
        if self.has_errors() {
            Err(Diagnostics(self.diagnostics))
        } else {
            Ok(value)
        }
    }
}
