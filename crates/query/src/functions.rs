//! Function registry: built-in scalar functions, schema-contributed
//! functions and aggregate functions.
//!
//! Scalar calls resolve by name, arity and argument types. Each candidate
//! overload is scored per argument (exact type > widening > wildcard) and the
//! best score wins. A tie that only exists because an argument has no type
//! (a null literal) is reported as ambiguous.

use quarry_core::{DataType, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Implementation of a scalar function.
pub type ScalarImpl = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Parameter type of a scalar function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    Any,
    Numeric,
    Exact(DataType),
}

/// How the result type of a call is determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReturnType {
    Fixed(DataType),
    /// Same type as the argument at this position.
    SameAsArg(usize),
    /// Widest type of all typed arguments.
    CommonOfArgs,
}

/// A scalar function overload.
#[derive(Clone)]
pub struct FunctionDef {
    name: String,
    params: Vec<ParamType>,
    /// The last parameter may repeat.
    variadic: bool,
    returns: ReturnType,
    implementation: ScalarImpl,
}

impl FunctionDef {
    /// Creates an overload with a fixed parameter list.
    pub fn new(
        name: impl Into<String>,
        params: Vec<ParamType>,
        returns: ReturnType,
        implementation: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            variadic: false,
            returns,
            implementation: Arc::new(implementation),
        }
    }

    /// Lets the last parameter repeat any number of times.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls the function.
    #[inline]
    pub fn invoke(&self, args: &[Value]) -> Value {
        (self.implementation)(args)
    }

    /// Human readable signature, e.g. `Substring(string, int, int)`.
    pub fn signature(&self) -> String {
        let mut params: Vec<String> = self
            .params
            .iter()
            .map(|p| match p {
                ParamType::Any => "any".to_string(),
                ParamType::Numeric => "numeric".to_string(),
                ParamType::Exact(t) => t.name().to_string(),
            })
            .collect();
        if self.variadic {
            if let Some(last) = params.last_mut() {
                last.push_str("...");
            }
        }
        format!("{}({})", self.name, params.join(", "))
    }

    fn accepts_arity(&self, n: usize) -> bool {
        if self.variadic {
            n >= self.params.len()
        } else {
            n == self.params.len()
        }
    }

    fn param_at(&self, i: usize) -> ParamType {
        match self.params.get(i) {
            Some(p) => *p,
            None => self.params.last().copied().unwrap_or(ParamType::Any),
        }
    }

    /// Scores the overload against argument types; `None` if it does not apply.
    fn score(&self, args: &[Option<DataType>]) -> Option<u32> {
        if !self.accepts_arity(args.len()) {
            return None;
        }
        let mut total = 0;
        for (i, arg) in args.iter().enumerate() {
            total += match (self.param_at(i), arg) {
                (_, None) => 0,
                (ParamType::Any, Some(_)) => 1,
                (ParamType::Numeric, Some(t)) if t.is_numeric() => 2,
                (ParamType::Exact(p), Some(t)) if p == *t => 3,
                (ParamType::Exact(p), Some(t)) if t.can_widen_to(p) => 2,
                _ => return None,
            };
        }
        Some(total)
    }

    fn return_type(&self, args: &[Option<DataType>]) -> Option<DataType> {
        match self.returns {
            ReturnType::Fixed(t) => Some(t),
            ReturnType::SameAsArg(i) => args.get(i).copied().flatten(),
            ReturnType::CommonOfArgs => args
                .iter()
                .flatten()
                .copied()
                .try_fold(None, |acc: Option<DataType>, t| match acc {
                    None => Some(Some(t)),
                    Some(prev) => prev.widen(t).map(Some),
                })
                .flatten(),
        }
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// A resolved call target.
#[derive(Clone, Debug)]
pub struct ResolvedFunction {
    pub function: Arc<FunctionDef>,
    pub return_type: Option<DataType>,
}

/// Why a call could not be resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// No function of that name is registered.
    UnknownFunction,
    /// Functions of that name exist but none accepts the arguments.
    NoMatchingOverload { candidates: Vec<String> },
    /// Several overloads fit the argument types equally well.
    Ambiguous { candidates: Vec<String> },
    /// Several overloads fit equally well because an argument is untyped.
    AmbiguousNull { candidates: Vec<String> },
}

/// Registry of scalar functions keyed by case-insensitive name.
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Vec<Arc<FunctionDef>>>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for def in builtins() {
            registry.register(def);
        }
        registry
    }

    /// Adds an overload.
    pub fn register(&mut self, def: FunctionDef) {
        self.functions
            .entry(def.name.to_ascii_lowercase())
            .or_default()
            .push(Arc::new(def));
    }

    /// Names of all registered functions.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions
            .values()
            .filter_map(|defs| defs.first().map(|d| d.name()))
    }

    /// Resolves a call by name and argument types.
    pub fn resolve(
        &self,
        name: &str,
        args: &[Option<DataType>],
    ) -> Result<ResolvedFunction, ResolveError> {
        let overloads = self
            .functions
            .get(&name.to_ascii_lowercase())
            .ok_or(ResolveError::UnknownFunction)?;

        let scored: Vec<(u32, &Arc<FunctionDef>)> = overloads
            .iter()
            .filter_map(|def| def.score(args).map(|s| (s, def)))
            .collect();
        let Some(best) = scored.iter().map(|(s, _)| *s).max() else {
            return Err(ResolveError::NoMatchingOverload {
                candidates: overloads.iter().map(|d| d.signature()).collect(),
            });
        };
        let winners: Vec<&Arc<FunctionDef>> = scored
            .iter()
            .filter(|(s, _)| *s == best)
            .map(|(_, d)| *d)
            .collect();

        if winners.len() > 1 {
            let candidates = winners.iter().map(|d| d.signature()).collect();
            return Err(if args.iter().any(Option::is_none) {
                ResolveError::AmbiguousNull { candidates }
            } else {
                ResolveError::Ambiguous { candidates }
            });
        }
        let function = Arc::clone(winners[0]);
        let return_type = function.return_type(args);
        Ok(ResolvedFunction {
            function,
            return_type,
        })
    }
}

fn string_fn(
    f: impl Fn(&str) -> Value + Send + Sync + 'static,
) -> impl Fn(&[Value]) -> Value + Send + Sync + 'static {
    move |args: &[Value]| match args.first() {
        Some(Value::Null) | None => Value::Null,
        Some(Value::String(s)) => f(s),
        Some(other) => f(&other.to_string()),
    }
}

fn substring(args: &[Value]) -> Value {
    let (Some(text), Some(start)) = (
        args.first().and_then(Value::as_str),
        args.get(1).and_then(Value::as_i64),
    ) else {
        return Value::Null;
    };
    let Ok(start) = usize::try_from(start) else {
        return Value::Null;
    };
    let chars = text.chars().skip(start);
    match args.get(2) {
        None => Value::String(chars.collect()),
        Some(len) => match len.as_i64().and_then(|l| usize::try_from(l).ok()) {
            Some(len) => Value::String(chars.take(len).collect()),
            None => Value::Null,
        },
    }
}

fn round(args: &[Value]) -> Value {
    let Some(v) = args.first().and_then(Value::as_f64) else {
        return Value::Null;
    };
    let digits = match args.get(1) {
        None => 0,
        Some(d) => match d.as_i64() {
            Some(d) => d.clamp(-15, 15) as i32,
            None => return Value::Null,
        },
    };
    let factor = 10f64.powi(digits);
    Value::Float64((v * factor).round() / factor)
}

fn abs(args: &[Value]) -> Value {
    match args.first() {
        Some(Value::Int32(v)) => v.checked_abs().map_or(Value::Null, Value::Int32),
        Some(Value::Int64(v)) => v.checked_abs().map_or(Value::Null, Value::Int64),
        Some(Value::Float64(v)) => Value::Float64(v.abs()),
        _ => Value::Null,
    }
}

/// The built-in scalar functions.
pub fn builtins() -> Vec<FunctionDef> {
    use DataType::*;
    use ParamType::{Any, Exact};

    vec![
        FunctionDef::new("ToUpper", vec![Exact(String)], ReturnType::Fixed(String), string_fn(|s| Value::String(s.to_uppercase()))),
        FunctionDef::new("ToLower", vec![Exact(String)], ReturnType::Fixed(String), string_fn(|s| Value::String(s.to_lowercase()))),
        FunctionDef::new("Trim", vec![Exact(String)], ReturnType::Fixed(String), string_fn(|s| Value::String(s.trim().to_string()))),
        FunctionDef::new("Length", vec![Exact(String)], ReturnType::Fixed(Int32), string_fn(|s| {
            i32::try_from(s.chars().count()).map_or(Value::Null, Value::Int32)
        })),
        FunctionDef::new("Substring", vec![Exact(String), Exact(Int64)], ReturnType::Fixed(String), substring),
        FunctionDef::new("Substring", vec![Exact(String), Exact(Int64), Exact(Int64)], ReturnType::Fixed(String), substring),
        FunctionDef::new("Concat", vec![Any], ReturnType::Fixed(String), |args: &[Value]| {
            let mut out = std::string::String::new();
            for v in args.iter().filter(|v| !v.is_null()) {
                out.push_str(&v.to_string());
            }
            Value::String(out)
        })
        .variadic(),
        FunctionDef::new("Abs", vec![Exact(Int32)], ReturnType::Fixed(Int32), abs),
        FunctionDef::new("Abs", vec![Exact(Int64)], ReturnType::Fixed(Int64), abs),
        FunctionDef::new("Abs", vec![Exact(Float64)], ReturnType::Fixed(Float64), abs),
        FunctionDef::new("Round", vec![Exact(Float64)], ReturnType::Fixed(Float64), round),
        FunctionDef::new("Round", vec![Exact(Float64), Exact(Int32)], ReturnType::Fixed(Float64), round),
        FunctionDef::new("Coalesce", vec![Any], ReturnType::CommonOfArgs, |args: &[Value]| {
            args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)
        })
        .variadic(),
        FunctionDef::new("ToString", vec![Any], ReturnType::Fixed(String), |args: &[Value]| match args.first() {
            Some(Value::Null) | None => Value::Null,
            Some(v) => Value::String(v.to_string()),
        }),
        FunctionDef::new("ToInt", vec![Any], ReturnType::Fixed(Int32), |args: &[Value]| {
            args.first()
                .and_then(Value::coerce_i64)
                .and_then(|v| i32::try_from(v).ok())
                .map_or(Value::Null, Value::Int32)
        }),
        FunctionDef::new("ToDecimal", vec![Any], ReturnType::Fixed(Float64), |args: &[Value]| {
            args.first().and_then(Value::coerce_f64).map_or(Value::Null, Value::Float64)
        }),
    ]
}

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    StdDev,
}

impl AggregateFunc {
    /// Looks up an aggregate by case-insensitive name.
    pub fn from_name(name: &str) -> Option<AggregateFunc> {
        [
            AggregateFunc::Count,
            AggregateFunc::Sum,
            AggregateFunc::Avg,
            AggregateFunc::Min,
            AggregateFunc::Max,
            AggregateFunc::StdDev,
        ]
        .into_iter()
        .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "Count",
            AggregateFunc::Sum => "Sum",
            AggregateFunc::Avg => "Avg",
            AggregateFunc::Min => "Min",
            AggregateFunc::Max => "Max",
            AggregateFunc::StdDev => "StdDev",
        }
    }

    /// Returns true if the argument must be numeric.
    pub fn requires_numeric(&self) -> bool {
        matches!(self, AggregateFunc::Sum | AggregateFunc::Avg | AggregateFunc::StdDev)
    }

    /// Result type for an argument of the given type.
    pub fn return_type(&self, arg: Option<DataType>) -> Option<DataType> {
        match self {
            AggregateFunc::Count => Some(DataType::Int64),
            AggregateFunc::Sum => match arg {
                Some(DataType::Int32 | DataType::Int64) => Some(DataType::Int64),
                _ => Some(DataType::Float64),
            },
            AggregateFunc::Avg | AggregateFunc::StdDev => Some(DataType::Float64),
            AggregateFunc::Min | AggregateFunc::Max => arg,
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(registry: &FunctionRegistry, name: &str, args: Vec<Value>) -> Value {
        let types: Vec<Option<DataType>> = args.iter().map(Value::data_type).collect();
        registry.resolve(name, &types).unwrap().function.invoke(&args)
    }

    #[test]
    fn test_resolve_prefers_exact_overload() {
        let registry = FunctionRegistry::with_builtins();
        let resolved = registry.resolve("abs", &[Some(DataType::Int32)]).unwrap();
        assert_eq!(resolved.return_type, Some(DataType::Int32));
        let resolved = registry.resolve("Abs", &[Some(DataType::Int64)]).unwrap();
        assert_eq!(resolved.return_type, Some(DataType::Int64));
    }

    #[test]
    fn test_null_argument_is_ambiguous() {
        let registry = FunctionRegistry::with_builtins();
        match registry.resolve("Abs", &[None]) {
            Err(ResolveError::AmbiguousNull { candidates }) => assert_eq!(candidates.len(), 3),
            other => panic!("expected ambiguity, got {:?}", other),
        }
        // A single overload accepts a null argument.
        assert!(registry.resolve("ToUpper", &[None]).is_ok());
    }

    #[test]
    fn test_identical_overloads_are_ambiguous() {
        let mut registry = FunctionRegistry::new();
        for _ in 0..2 {
            registry.register(FunctionDef::new(
                "Twice",
                vec![ParamType::Exact(DataType::Int64)],
                ReturnType::Fixed(DataType::Int64),
                |args: &[Value]| args[0].clone(),
            ));
        }
        match registry.resolve("Twice", &[Some(DataType::Int64)]) {
            Err(ResolveError::Ambiguous { candidates }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_unresolvable_calls() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(registry.resolve("Nope", &[]).unwrap_err(), ResolveError::UnknownFunction);
        assert!(matches!(
            registry.resolve("ToUpper", &[Some(DataType::Int32)]),
            Err(ResolveError::NoMatchingOverload { .. })
        ));
        assert!(matches!(
            registry.resolve("Substring", &[Some(DataType::String)]),
            Err(ResolveError::NoMatchingOverload { .. })
        ));
    }

    #[test]
    fn test_variadic_and_common_type() {
        let registry = FunctionRegistry::with_builtins();
        let resolved = registry
            .resolve("Coalesce", &[None, Some(DataType::Int32), Some(DataType::Int64)])
            .unwrap();
        assert_eq!(resolved.return_type, Some(DataType::Int64));
        assert!(registry.resolve("Concat", &[]).is_err());
        assert_eq!(
            call(&registry, "Concat", vec![Value::from("a"), Value::Null, Value::Int32(1)]),
            Value::from("a1")
        );
    }

    #[test]
    fn test_builtin_behavior() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(call(&registry, "ToUpper", vec![Value::from("abc")]), Value::from("ABC"));
        assert_eq!(call(&registry, "Length", vec![Value::from("héllo")]), Value::Int32(5));
        assert_eq!(
            call(&registry, "Substring", vec![Value::from("hello"), Value::Int32(1), Value::Int32(3)]),
            Value::from("ell")
        );
        assert_eq!(call(&registry, "Round", vec![Value::Float64(2.567), Value::Int32(2)]), Value::Float64(2.57));
        assert_eq!(call(&registry, "ToInt", vec![Value::from("42")]), Value::Int32(42));
        assert_eq!(call(&registry, "ToInt", vec![Value::from("x")]), Value::Null);
        assert_eq!(call(&registry, "Abs", vec![Value::Int32(i32::MIN)]), Value::Null);
        assert_eq!(call(&registry, "ToString", vec![Value::Int64(7)]), Value::from("7"));
    }

    #[test]
    fn test_signature_rendering() {
        let registry = FunctionRegistry::with_builtins();
        let resolved = registry.resolve("Concat", &[Some(DataType::String)]).unwrap();
        assert_eq!(resolved.function.signature(), "Concat(any...)");
    }

    #[test]
    fn test_aggregate_lookup() {
        assert_eq!(AggregateFunc::from_name("count"), Some(AggregateFunc::Count));
        assert_eq!(AggregateFunc::from_name("STDDEV"), Some(AggregateFunc::StdDev));
        assert_eq!(AggregateFunc::from_name("Median"), None);
        assert_eq!(AggregateFunc::Sum.return_type(Some(DataType::Int32)), Some(DataType::Int64));
        assert_eq!(AggregateFunc::Max.return_type(Some(DataType::String)), Some(DataType::String));
    }
}
