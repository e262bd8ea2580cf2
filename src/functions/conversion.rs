use std::sync::Arc;

use super::Builtin;
use crate::types::{
    EvalError, EvaluationContext, Function, FunctionArgs, FunctionDescriptor, ParameterDescriptor,
    Value, ValueType,
};

// Conversions take an optional `value` so that an undefined input falls back
// to `default` instead of failing the call.
pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    vec![
        Builtin::new(
            FunctionDescriptor::new("to_string", ValueType::String)
                .param(ParameterDescriptor::optional("value", ValueType::Any))
                .param(ParameterDescriptor::optional("default", ValueType::String).with_default("")),
            to_string,
        ),
        Builtin::new(
            FunctionDescriptor::new("to_long", ValueType::Long)
                .param(ParameterDescriptor::optional("value", ValueType::Any))
                .param(ParameterDescriptor::optional("default", ValueType::Long).with_default(0_i64)),
            to_long,
        ),
        Builtin::new(
            FunctionDescriptor::new("to_double", ValueType::Double)
                .param(ParameterDescriptor::optional("value", ValueType::Any))
                .param(
                    ParameterDescriptor::optional("default", ValueType::Double).with_default(0.0_f64),
                ),
            to_double,
        ),
        Builtin::new(
            FunctionDescriptor::new("to_bool", ValueType::Bool)
                .param(ParameterDescriptor::optional("value", ValueType::Any)),
            to_bool,
        ),
    ]
}

fn to_string(
    args: &FunctionArgs<'_>,
    _ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    let converted = match args.get("value") {
        Some(value) => value.render(),
        None => args.optional_str("default")?.unwrap_or_default().to_owned(),
    };
    Ok(Some(Value::String(converted)))
}

#[allow(clippy::cast_possible_truncation)]
fn to_long(
    args: &FunctionArgs<'_>,
    _ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    let converted = match args.get("value") {
        Some(Value::Long(v)) => Some(*v),
        Some(Value::Double(v)) if v.is_finite() => Some(*v as i64),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
        }
        _ => None,
    };
    match converted {
        Some(v) => Ok(Some(Value::Long(v))),
        None => Ok(Some(Value::Long(args.optional_long("default")?.unwrap_or(0)))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_double(
    args: &FunctionArgs<'_>,
    _ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    let converted = match args.get("value") {
        Some(Value::Long(v)) => Some(*v as f64),
        Some(Value::Double(v)) => Some(*v),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let value = match converted {
        Some(v) => v,
        None => args.get("default").and_then(Value::as_double).unwrap_or(0.0),
    };
    Ok(Some(Value::Double(value)))
}

fn to_bool(
    args: &FunctionArgs<'_>,
    _ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    let converted = match args.get("value") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        Some(Value::Long(v)) => *v != 0,
        Some(Value::Double(v)) => *v != 0.0,
        _ => false,
    };
    Ok(Some(Value::Bool(converted)))
}

#[cfg(test)]
mod tests {
    use crate::{EvaluationContext, Expr, FunctionRegistry, MemoryMessage, Value, lit, message_field};

    fn call(name: &str, args: Vec<Expr>) -> Option<Value> {
        let expr = FunctionRegistry::with_builtins().call(name, args).unwrap();
        let mut msg = MemoryMessage::new();
        let mut ctx = EvaluationContext::new(&mut msg);
        expr.evaluate(&mut ctx).unwrap()
    }

    #[test]
    fn to_string_renders_and_defaults() {
        assert_eq!(call("to_string", vec![lit(42_i64)]), Some(Value::from("42")));
        assert_eq!(call("to_string", vec![lit("s")]), Some(Value::from("s")));
        assert_eq!(
            call("to_string", vec![message_field("x"), lit("none")]),
            Some(Value::from("none"))
        );
        assert_eq!(call("to_string", vec![message_field("x")]), Some(Value::from("")));
    }

    #[test]
    fn to_long_parses_and_truncates() {
        assert_eq!(call("to_long", vec![lit(" 12 ")]), Some(Value::Long(12)));
        assert_eq!(call("to_long", vec![lit(3.9_f64)]), Some(Value::Long(3)));
        assert_eq!(call("to_long", vec![lit("1.5")]), Some(Value::Long(1)));
        assert_eq!(call("to_long", vec![lit("abc"), lit(7_i64)]), Some(Value::Long(7)));
        assert_eq!(call("to_long", vec![lit(true)]), Some(Value::Long(0)));
    }

    #[test]
    fn to_double_widens() {
        assert_eq!(call("to_double", vec![lit(2_i64)]), Some(Value::Double(2.0)));
        assert_eq!(call("to_double", vec![lit("0.25")]), Some(Value::Double(0.25)));
        assert_eq!(call("to_double", vec![lit("x"), lit(1_i64)]), Some(Value::Double(1.0)));
    }

    #[test]
    fn to_bool_conversions() {
        assert_eq!(call("to_bool", vec![lit("TRUE")]), Some(Value::Bool(true)));
        assert_eq!(call("to_bool", vec![lit("yes")]), Some(Value::Bool(false)));
        assert_eq!(call("to_bool", vec![lit(1_i64)]), Some(Value::Bool(true)));
        assert_eq!(call("to_bool", vec![message_field("x")]), Some(Value::Bool(false)));
    }
}
