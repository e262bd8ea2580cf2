use std::collections::BTreeMap;

use crate::types::{
    ArithOp, CompareOp, EvalError, EvaluationContext, Expr, Function, FunctionArgs, FunctionCall,
    Value,
};

pub(crate) type EvalResult = Result<Option<Value>, EvalError>;

impl Expr {
    /// Evaluate this expression. `Ok(None)` is the undefined value.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] on type mismatches, arithmetic faults and
    /// function failures.
    pub fn evaluate(&self, ctx: &mut EvaluationContext<'_>) -> Result<Option<Value>, EvalError> {
        eval_expr(self, ctx)
    }
}

pub(crate) fn eval_expr(expr: &Expr, ctx: &mut EvaluationContext<'_>) -> EvalResult {
    match expr {
        Expr::Bool(v) => Ok(Some(Value::Bool(*v))),
        Expr::Long(v) => Ok(Some(Value::Long(*v))),
        Expr::Double(v) => Ok(Some(Value::Double(*v))),
        Expr::String(v) | Expr::FieldRef(v) => Ok(Some(Value::String(v.clone()))),
        // A literal with an undefined element is undefined as a whole, so
        // positions never shift.
        Expr::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                let Some(value) = eval_expr(item, ctx)? else {
                    return Ok(None);
                };
                values.push(value);
            }
            Ok(Some(Value::List(values)))
        }
        Expr::Map(entries) => {
            let mut map = BTreeMap::new();
            for (key, value) in entries {
                let Some(value) = eval_expr(value, ctx)? else {
                    return Ok(None);
                };
                map.insert(key.clone(), value);
            }
            Ok(Some(Value::Map(map)))
        }
        Expr::VarRef { name, .. } => Ok(ctx.var(name).cloned()),
        Expr::MessageRef(field) => {
            let name = eval_expr(field, ctx)?;
            let Some(name) = field_name(name)? else {
                return Ok(None);
            };
            Ok(ctx.message().get(&name).cloned())
        }
        Expr::FieldAccess { target, field } => {
            let target = eval_expr(target, ctx)?;
            let field = eval_expr(field, ctx)?;
            field_access(target, field)
        }
        Expr::Index { target, index } => {
            let target = eval_expr(target, ctx)?;
            let index = eval_expr(index, ctx)?;
            index_into(target, index)
        }
        Expr::Function(call) => eval_call(call, ctx),
        Expr::Not(inner) => Ok(Some(Value::Bool(!eval_bool(inner, ctx)?))),
        Expr::And(a, b) => {
            let result = eval_bool(a, ctx)? && eval_bool(b, ctx)?;
            Ok(Some(Value::Bool(result)))
        }
        Expr::Or(a, b) => {
            let result = eval_bool(a, ctx)? || eval_bool(b, ctx)?;
            Ok(Some(Value::Bool(result)))
        }
        Expr::Signed { negative, expr } => {
            let value = eval_expr(expr, ctx)?;
            signed(*negative, value)
        }
        Expr::Arith { op, left, right } => {
            let left = eval_expr(left, ctx)?;
            let right = eval_expr(right, ctx)?;
            arith(*op, left, right)
        }
        Expr::Compare { op, left, right } => {
            let left = eval_expr(left, ctx)?;
            let right = eval_expr(right, ctx)?;
            Ok(Some(Value::Bool(compare(*op, left.as_ref(), right.as_ref())?)))
        }
    }
}

/// Evaluate in boolean position. Undefined counts as `false`.
pub(crate) fn eval_bool(expr: &Expr, ctx: &mut EvaluationContext<'_>) -> Result<bool, EvalError> {
    truthy(eval_expr(expr, ctx)?)
}

pub(crate) fn truthy(value: Option<Value>) -> Result<bool, EvalError> {
    match value {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(b),
        Some(other) => Err(EvalError::type_mismatch(
            "boolean expression",
            "bool",
            other.value_type(),
        )),
    }
}

/// Evaluate every argument exactly once, in parameter order, then call.
pub(crate) fn eval_call(call: &FunctionCall, ctx: &mut EvaluationContext<'_>) -> EvalResult {
    let mut values = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        values.push(match arg {
            Some(e) => eval_expr(e, ctx)?,
            None => None,
        });
    }
    invoke(call.function.as_ref(), values, ctx)
}

/// Bind evaluated argument values to the parameters and call the function.
pub(crate) fn invoke(
    function: &dyn Function,
    values: Vec<Option<Value>>,
    ctx: &mut EvaluationContext<'_>,
) -> EvalResult {
    let descriptor = function.descriptor();
    let mut bound = Vec::with_capacity(values.len());
    for (param, value) in descriptor.params().iter().zip(values) {
        bound.push(param.bind(descriptor.name(), value)?);
    }
    let args = FunctionArgs::new(descriptor, bound);
    function.evaluate(&args, ctx)
}

pub(crate) fn field_name(value: Option<Value>) -> Result<Option<String>, EvalError> {
    match value {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(EvalError::type_mismatch(
            "field reference",
            "string",
            other.value_type(),
        )),
    }
}

pub(crate) fn field_access(target: Option<Value>, field: Option<Value>) -> EvalResult {
    let Some(name) = field_name(field)? else {
        return Ok(None);
    };
    match target {
        Some(Value::Map(mut map)) => Ok(map.remove(&name)),
        _ => Ok(None),
    }
}

pub(crate) fn index_into(target: Option<Value>, index: Option<Value>) -> EvalResult {
    let (Some(target), Some(index)) = (target, index) else {
        return Ok(None);
    };
    match (target, index) {
        (Value::List(mut items), Value::Long(i)) => match usize::try_from(i) {
            Ok(i) if i < items.len() => Ok(Some(items.swap_remove(i))),
            _ => Ok(None),
        },
        (Value::Map(mut map), Value::String(key)) => Ok(map.remove(&key)),
        (Value::List(_), other) => Err(EvalError::type_mismatch(
            "list index",
            "long",
            other.value_type(),
        )),
        (Value::Map(_), other) => Err(EvalError::type_mismatch(
            "map index",
            "string",
            other.value_type(),
        )),
        (other, _) => Err(EvalError::type_mismatch(
            "indexed access",
            "list or map",
            other.value_type(),
        )),
    }
}

pub(crate) fn signed(negative: bool, value: Option<Value>) -> EvalResult {
    match value {
        None => Ok(None),
        Some(Value::Long(v)) if negative => v
            .checked_neg()
            .map(|v| Some(Value::Long(v)))
            .ok_or_else(|| EvalError::arithmetic("integer overflow in negation")),
        Some(Value::Double(v)) if negative => Ok(Some(Value::Double(-v))),
        Some(v @ (Value::Long(_) | Value::Double(_))) => Ok(Some(v)),
        Some(other) => Err(EvalError::type_mismatch(
            "sign",
            "number",
            other.value_type(),
        )),
    }
}

/// Arithmetic with long/double promotion. `+` concatenates when either
/// operand is a string. An undefined operand makes the result undefined.
pub(crate) fn arith(op: ArithOp, left: Option<Value>, right: Option<Value>) -> EvalResult {
    let (Some(left), Some(right)) = (left, right) else {
        return Ok(None);
    };
    if op == ArithOp::Add
        && (matches!(left, Value::String(_)) || matches!(right, Value::String(_)))
    {
        let mut s = left.render();
        s.push_str(&right.render());
        return Ok(Some(Value::String(s)));
    }
    match (&left, &right) {
        (Value::Long(a), Value::Long(b)) => long_arith(op, *a, *b).map(|v| Some(Value::Long(v))),
        _ => match (left.as_double(), right.as_double()) {
            (Some(a), Some(b)) => Ok(Some(Value::Double(double_arith(op, a, b)))),
            _ => {
                let offending = if left.as_double().is_none() { &left } else { &right };
                Err(EvalError::type_mismatch(
                    op_name(op),
                    "number",
                    offending.value_type(),
                ))
            }
        },
    }
}

fn long_arith(op: ArithOp, a: i64, b: i64) -> Result<i64, EvalError> {
    if matches!(op, ArithOp::Div | ArithOp::Mod) && b == 0 {
        return Err(EvalError::arithmetic("division by zero"));
    }
    let result = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => a.checked_div(b),
        ArithOp::Mod => a.checked_rem(b),
    };
    result.ok_or_else(|| EvalError::arithmetic(format!("integer overflow in {}", op_name(op))))
}

fn double_arith(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Mod => a % b,
    }
}

fn op_name(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "addition",
        ArithOp::Sub => "subtraction",
        ArithOp::Mul => "multiplication",
        ArithOp::Div => "division",
        ArithOp::Mod => "modulo",
    }
}

/// `==`/`!=` never fail; ordering operators fail on operands that have no
/// common ordering and yield `false` when either side is undefined.
pub(crate) fn compare(
    op: CompareOp,
    left: Option<&Value>,
    right: Option<&Value>,
) -> Result<bool, EvalError> {
    if op.is_equality() {
        let equal = match (left, right) {
            (None, None) => true,
            (Some(a), Some(b)) => a.loosely_equals(b),
            _ => false,
        };
        return Ok(if op == CompareOp::Eq { equal } else { !equal });
    }
    let (Some(left), Some(right)) = (left, right) else {
        return Ok(false);
    };
    let Some(ordering) = left.compare_to(right) else {
        if left.as_double().is_some() && right.as_double().is_some() {
            // NaN
            return Ok(false);
        }
        return Err(EvalError::type_mismatch(
            format!("comparison '{op}'"),
            left.value_type().to_string(),
            right.value_type(),
        ));
    };
    Ok(match op {
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Gte => ordering.is_ge(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Lte => ordering.is_le(),
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::Neq => ordering.is_ne(),
    })
}
