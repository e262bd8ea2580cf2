use std::sync::Arc;

use super::Builtin;
use crate::types::{
    EvalError, EvaluationContext, Function, FunctionArgs, FunctionDescriptor, ParameterDescriptor,
    Value, ValueType,
};

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    vec![
        Builtin::new(
            FunctionDescriptor::new("has_field", ValueType::Bool)
                .param(ParameterDescriptor::required("field", ValueType::String)),
            has_field,
        ),
        Builtin::new(
            FunctionDescriptor::new("set_field", ValueType::Any)
                .param(ParameterDescriptor::required("field", ValueType::String))
                .param(ParameterDescriptor::required("value", ValueType::Any)),
            set_field,
        ),
        Builtin::new(
            FunctionDescriptor::new("set_fields", ValueType::Any)
                .param(ParameterDescriptor::required("fields", ValueType::Map))
                .param(ParameterDescriptor::optional("prefix", ValueType::String)),
            set_fields,
        ),
        Builtin::new(
            FunctionDescriptor::new("remove_field", ValueType::Any)
                .param(ParameterDescriptor::required("field", ValueType::String)),
            remove_field,
        ),
    ]
}

fn has_field(
    args: &FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    let field = args.required_str("field")?;
    Ok(Some(Value::Bool(ctx.message().has_field(field))))
}

fn set_field(
    args: &FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    let field = args.required_str("field")?;
    let value = args.required("value")?;
    ctx.message_mut().set(field, value.clone());
    Ok(None)
}

fn set_fields(
    args: &FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    let fields = args.required("fields")?;
    let prefix = args.optional_str("prefix")?.unwrap_or_default();
    let Some(fields) = fields.as_map() else {
        return Ok(None);
    };
    for (name, value) in fields {
        ctx.message_mut().set(&format!("{prefix}{name}"), value.clone());
    }
    Ok(None)
}

fn remove_field(
    args: &FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
) -> Result<Option<Value>, EvalError> {
    let field = args.required_str("field")?;
    ctx.message_mut().remove(field);
    Ok(None)
}
