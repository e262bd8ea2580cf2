use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::string::RegexCache;
use crate::types::{
    EvalError, EvaluationContext, Function, FunctionArgs, FunctionDescriptor, ParameterDescriptor,
    Value, ValueType,
};

const MAX_DEPTH: usize = 16;

/// Named regex fragments referenced from grok patterns as `%{NAME}` or
/// `%{NAME:field}`.
#[derive(Debug, Clone)]
pub struct GrokPatterns {
    patterns: HashMap<String, String>,
}

impl Default for GrokPatterns {
    fn default() -> Self {
        let mut patterns = Self::empty();
        for (name, pattern) in [
            ("WORD", r"\b\w+\b"),
            ("NOTSPACE", r"\S+"),
            ("SPACE", r"\s*"),
            ("DATA", r".*?"),
            ("GREEDYDATA", r".*"),
            ("GREEDY", r".*"),
            ("INT", r"(?:[+-]?(?:[0-9]+))"),
            ("POSINT", r"\b(?:[1-9][0-9]*)\b"),
            ("BASE10NUM", r"(?:[+-]?(?:(?:[0-9]+(?:\.[0-9]+)?)|(?:\.[0-9]+)))"),
            ("NUMBER", r"(?:%{BASE10NUM})"),
            ("USERNAME", r"[a-zA-Z0-9._-]+"),
            (
                "IPV4",
                r"(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)",
            ),
            (
                "HOSTNAME",
                r"\b(?:[0-9A-Za-z][0-9A-Za-z-]{0,62})(?:\.(?:[0-9A-Za-z][0-9A-Za-z-]{0,62}))*(?:\.?|\b)",
            ),
            ("LOGLEVEL", r"(?i:trace|debug|info|notice|warn(?:ing)?|err(?:or)?|crit(?:ical)?|fatal|severe|emerg(?:ency)?)"),
        ] {
            patterns.patterns.insert(name.to_owned(), pattern.to_owned());
        }
        patterns
    }
}

impl GrokPatterns {
    /// A table without any patterns.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            patterns: HashMap::new(),
        }
    }

    /// Add or replace a pattern.
    #[must_use]
    pub fn with_pattern(mut self, name: &str, pattern: &str) -> Self {
        self.patterns.insert(name.to_owned(), pattern.to_owned());
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.patterns.get(name).map(String::as_str)
    }

    /// Expand every `%{...}` reference of `pattern` into a plain regex.
    ///
    /// Top-level references become capture groups named `__g<n>`; references
    /// nested inside pattern definitions are not captured.
    pub(crate) fn expand(&self, pattern: &str) -> Result<Expansion, GrokError> {
        let mut expansion = Expansion {
            regex: String::new(),
            captures: Vec::new(),
        };
        self.expand_into(pattern, 0, &mut expansion)?;
        Ok(expansion)
    }

    fn expand_into(&self, pattern: &str, depth: usize, out: &mut Expansion) -> Result<(), GrokError> {
        if depth > MAX_DEPTH {
            return Err(GrokError::TooDeep);
        }
        let mut rest = pattern;
        while let Some(start) = rest.find("%{") {
            out.regex.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(GrokError::Unterminated(pattern.to_owned()));
            };
            let reference = &after[..end];
            rest = &after[end + 1..];

            let mut parts = reference.splitn(2, ':');
            let name = parts.next().unwrap_or_default();
            let field = parts.next().filter(|f| !f.is_empty());
            let definition = self
                .get(name)
                .ok_or_else(|| GrokError::UnknownPattern(name.to_owned()))?;

            if depth == 0 {
                let group = format!("__g{}", out.captures.len());
                out.captures.push(Capture {
                    group: group.clone(),
                    pattern: name.to_owned(),
                    field: field.map(str::to_owned),
                });
                out.regex.push_str(&format!("(?P<{group}>"));
            } else {
                out.regex.push_str("(?:");
            }
            self.expand_into(definition, depth + 1, out)?;
            out.regex.push(')');
        }
        out.regex.push_str(rest);
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct Expansion {
    regex: String,
    captures: Vec<Capture>,
}

#[derive(Debug)]
struct Capture {
    group: String,
    pattern: String,
    field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub(crate) enum GrokError {
    #[error("unknown grok pattern '{0}'")]
    UnknownPattern(String),
    #[error("unterminated pattern reference in '{0}'")]
    Unterminated(String),
    #[error("grok patterns nest too deeply")]
    TooDeep,
}

/// `grok(pattern, value, only_named_captures)`: match `value` against a grok
/// pattern and return the captures as a map.
///
/// Named references (`%{IPV4:src}`) are keyed by their field name, unnamed
/// ones by the pattern name unless `only_named_captures` is set. No match
/// yields an empty map.
pub struct GrokMatch {
    descriptor: FunctionDescriptor,
    patterns: GrokPatterns,
    cache: RegexCache,
}

impl GrokMatch {
    #[must_use]
    pub fn new(patterns: GrokPatterns) -> Self {
        Self {
            descriptor: FunctionDescriptor::new("grok", ValueType::Map)
                .param(ParameterDescriptor::required("pattern", ValueType::String))
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(
                    ParameterDescriptor::optional("only_named_captures", ValueType::Bool)
                        .with_default(false),
                ),
            patterns,
            cache: RegexCache::default(),
        }
    }
}

impl fmt::Debug for GrokMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrokMatch")
            .field("patterns", &self.patterns.patterns.len())
            .finish_non_exhaustive()
    }
}

impl Function for GrokMatch {
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
        let only_named = args.optional_bool("only_named_captures")?.unwrap_or(false);

        let expansion = self
            .patterns
            .expand(pattern)
            .map_err(|e| EvalError::function("grok", e.to_string()))?;
        let regex = self
            .cache
            .get_or_compile(&expansion.regex)
            .map_err(|e| EvalError::function("grok", e.to_string()))?;

        let mut result = BTreeMap::new();
        let Some(captures) = regex.captures(value) else {
            return Ok(Some(Value::Map(result)));
        };
        for capture in &expansion.captures {
            let key = match (&capture.field, only_named) {
                (Some(field), _) => field,
                (None, false) => &capture.pattern,
                (None, true) => continue,
            };
            if let Some(m) = captures.name(&capture.group) {
                result.insert(key.clone(), Value::from(m.as_str()));
            }
        }
        Ok(Some(Value::Map(result)))
    }
}
