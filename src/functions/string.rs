use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use regex::Regex;

use super::Builtin;
use crate::types::{
    EvalError, EvaluationContext, Function, FunctionArgs, FunctionDescriptor, ParameterDescriptor,
    Value, ValueType,
};

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    vec![
        Builtin::new(
            FunctionDescriptor::new("concat", ValueType::String)
                .param(ParameterDescriptor::required("first", ValueType::String))
                .param(ParameterDescriptor::required("second", ValueType::String)),
            concat,
        ),
        Builtin::new(
            FunctionDescriptor::new("substring", ValueType::String)
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::required("start", ValueType::Long))
                .param(ParameterDescriptor::optional("end", ValueType::Long)),
            substring,
        ),
        Builtin::new(
            FunctionDescriptor::new("lowercase", ValueType::String)
                .param(ParameterDescriptor::required("value", ValueType::String)),
            lowercase,
        ),
        Builtin::new(
            FunctionDescriptor::new("uppercase", ValueType::String)
                .param(ParameterDescriptor::required("value", ValueType::String)),
            uppercase,
        ),
        Builtin::new(
            FunctionDescriptor::new("contains", ValueType::Bool)
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::required("search", ValueType::String))
                .param(ParameterDescriptor::optional("ignore_case", ValueType::Bool).with_default(false)),
            contains,
        ),
        Arc::new(RegexMatch::default()) as Arc<dyn Function>,
    ]
}

fn concat(
    args: &FunctionArgs<'_>,
    _ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    let first = args.required_str("first")?;
    let second = args.required_str("second")?;
    Ok(Some(Value::String(format!("{first}{second}"))))
}

/// Character-based substring. Negative positions count from the end, and
/// positions past either end are clamped.
fn substring(
    args: &FunctionArgs<'_>,
    _ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    let value = args.required_str("value")?;
    let start = args.required_long("start")?;
    let end = args.optional_long("end")?;
    Ok(Some(Value::String(char_range(value, start, end))))
}

fn char_range(value: &str, start: i64, end: Option<i64>) -> String {
    let len = i64::try_from(value.chars().count()).unwrap_or(i64::MAX);
    let resolve = |pos: i64| if pos < 0 { pos.saturating_add(len) } else { pos };
    let start = resolve(start).clamp(0, len);
    let end = end.map_or(len, resolve).clamp(0, len);
    if start >= end {
        return String::new();
    }
    let skip = usize::try_from(start).unwrap_or(usize::MAX);
    let take = usize::try_from(end - start).unwrap_or(0);
    value.chars().skip(skip).take(take).collect()
}

fn lowercase(
    args: &FunctionArgs<'_>,
    _ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    Ok(Some(Value::String(args.required_str("value")?.to_lowercase())))
}

fn uppercase(
    args: &FunctionArgs<'_>,
    _ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    Ok(Some(Value::String(args.required_str("value")?.to_uppercase())))
}

fn contains(
    args: &FunctionArgs<'_>,
    _ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    let value = args.required_str("value")?;
    let search = args.required_str("search")?;
    let found = if args.optional_bool("ignore_case")?.unwrap_or(false) {
        value.to_lowercase().contains(&search.to_lowercase())
    } else {
        value.contains(search)
    };
    Ok(Some(Value::Bool(found)))
}

/// Most patterns a [`RegexCache`] keeps compiled at once.
pub(super) const REGEX_CACHE_CAPACITY: usize = 128;

/// Compiled regexes keyed by their source, shared by every evaluation.
///
/// Patterns can come from message data, so the cache holds at most
/// [`REGEX_CACHE_CAPACITY`] entries and evicts the oldest one when full.
#[derive(Debug, Default)]
pub(super) struct RegexCache {
    inner: RwLock<CacheEntries>,
}

#[derive(Debug, Default)]
struct CacheEntries {
    compiled: HashMap<String, Regex>,
    order: VecDeque<String>,
}

impl RegexCache {
    pub(super) fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        if let Some(regex) = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .compiled
            .get(pattern)
        {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)?;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.compiled.contains_key(pattern) {
            while inner.order.len() >= REGEX_CACHE_CAPACITY {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                inner.compiled.remove(&oldest);
            }
            inner.order.push_back(pattern.to_owned());
            inner.compiled.insert(pattern.to_owned(), regex.clone());
        }
        Ok(regex)
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .compiled
            .len()
    }
}

/// `regex(pattern, value, group_names)`: a map with a `matches` flag and one
/// entry per capture group, keyed by the given group name or by the
/// zero-based group position.
#[derive(Debug)]
struct RegexMatch {
    descriptor: FunctionDescriptor,
    cache: RegexCache,
}

impl Default for RegexMatch {
    fn default() -> Self {
        Self {
            descriptor: FunctionDescriptor::new("regex", ValueType::Map)
                .param(ParameterDescriptor::required("pattern", ValueType::String))
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(ParameterDescriptor::optional("group_names", ValueType::List)),
            cache: RegexCache::default(),
        }
    }
}

impl Function for RegexMatch {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        args: &FunctionArgs<'_>,
        _ctx: &mut EvaluationContext<'_>,
    ) -> Result<Option<Value>, EvalError> {
        let pattern = args.required_str("pattern")?;
        let value = args.required_str("value")?;
        let names: Vec<String> = match args.get("group_names") {
            Some(Value::List(items)) => items.iter().map(Value::render).collect(),
            _ => Vec::new(),
        };
        let regex = self
            .cache
            .get_or_compile(pattern)
            .map_err(|e| EvalError::function("regex", e.to_string()))?;

        let mut result = BTreeMap::new();
        let captures = regex.captures(value);
        result.insert("matches".to_owned(), Value::Bool(captures.is_some()));
        if let Some(captures) = captures {
            for (i, group) in captures.iter().enumerate().skip(1) {
                let key = names.get(i - 1).cloned().unwrap_or_else(|| (i - 1).to_string());
                if let Some(group) = group {
                    result.insert(key, Value::from(group.as_str()));
                }
            }
        }
        Ok(Some(Value::Map(result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallArgs, Expr, FunctionRegistry, MemoryMessage, lit};

    fn call(name: &str, args: impl Into<CallArgs>) -> Result<Option<Value>, EvalError> {
        let expr = FunctionRegistry::with_builtins().call(name, args).unwrap();
        let mut msg = MemoryMessage::new();
        let mut ctx = EvaluationContext::new(&mut msg);
        expr.evaluate(&mut ctx)
    }

    #[test]
    fn substring_start_and_end() {
        assert_eq!(
            call("substring", vec![lit("hello"), lit(1_i64), lit(3_i64)]).unwrap(),
            Some(Value::from("el"))
        );
        assert_eq!(
            call("substring", vec![lit("hello"), lit(1_i64)]).unwrap(),
            Some(Value::from("ello"))
        );
    }

    #[test]
    fn substring_clamps_and_counts_from_end() {
        assert_eq!(char_range("hello", -3, None), "llo");
        assert_eq!(char_range("hello", 0, Some(-1)), "hell");
        assert_eq!(char_range("hello", 2, Some(100)), "llo");
        assert_eq!(char_range("hello", 4, Some(2)), "");
        assert_eq!(char_range("hello", -100, Some(2)), "he");
        assert_eq!(char_range("héllo", 1, Some(2)), "é");
    }

    #[test]
    fn concat_identity() {
        assert_eq!(
            call("concat", vec![lit("abc"), lit("")]).unwrap(),
            Some(Value::from("abc"))
        );
        assert_eq!(call("concat", vec![lit(""), lit("abc")]).unwrap(), Some(Value::from("abc")));
    }

    #[test]
    fn case_functions() {
        assert_eq!(call("lowercase", vec![lit("MiXeD")]).unwrap(), Some(Value::from("mixed")));
        assert_eq!(call("uppercase", vec![lit("MiXeD")]).unwrap(), Some(Value::from("MIXED")));
    }

    #[test]
    fn contains_with_case() {
        assert_eq!(
            call("contains", vec![lit("Hello"), lit("hell")]).unwrap(),
            Some(Value::Bool(false))
        );
        assert_eq!(
            call(
                "contains",
                CallArgs::Named(vec![
                    ("value".into(), lit("Hello")),
                    ("search".into(), lit("hell")),
                    ("ignore_case".into(), lit(true)),
                ])
            )
            .unwrap(),
            Some(Value::Bool(true))
        );
    }

    #[test]
    fn regex_groups() {
        let result = call(
            "regex",
            vec![lit(r"^(\w+)=(\d+)$"), lit("port=22"), Expr::Array(vec![lit("key")])],
        )
        .unwrap()
        .unwrap();
        let map = result.as_map().unwrap();
        assert_eq!(map.get("matches"), Some(&Value::Bool(true)));
        assert_eq!(map.get("key"), Some(&Value::from("port")));
        assert_eq!(map.get("1"), Some(&Value::from("22")));
    }

    #[test]
    fn regex_no_match_and_invalid_pattern() {
        let result = call("regex", vec![lit("^x$"), lit("y")]).unwrap().unwrap();
        assert_eq!(result.as_map().map(BTreeMap::len), Some(1));
        assert!(matches!(
            call("regex", vec![lit("("), lit("y")]),
            Err(EvalError::Function { .. })
        ));
    }

    #[test]
    fn regex_cache_stays_bounded() {
        let function = RegexMatch::default();
        let mut msg = MemoryMessage::new();
        let mut ctx = EvaluationContext::new(&mut msg);
        for i in 0..REGEX_CACHE_CAPACITY * 3 {
            let values = vec![Some(Value::String(format!("^n{i}$"))), Some(Value::from("n1")), None];
            let args = FunctionArgs::new(function.descriptor(), values);
            function.evaluate(&args, &mut ctx).unwrap();
            assert!(function.cache.len() <= REGEX_CACHE_CAPACITY);
        }
        assert_eq!(function.cache.len(), REGEX_CACHE_CAPACITY);

        let cache = RegexCache::default();
        for i in 0..REGEX_CACHE_CAPACITY + 1 {
            cache.get_or_compile(&format!("p{i}")).unwrap();
        }
        cache.get_or_compile("p0").unwrap();
        assert_eq!(cache.len(), REGEX_CACHE_CAPACITY);
    }
}
