use std::collections::HashSet;
use std::sync::Arc;

use crate::types::{
    ArithOp, CallArgs, CheckError, Expr, Function, FunctionCall, Statement, ValueType,
};

/// Bind call-site arguments to a function's declared parameters.
///
/// Collects every problem rather than stopping at the first one.
pub(crate) fn bind_call(
    function: Arc<dyn Function>,
    args: CallArgs,
) -> Result<FunctionCall, Vec<CheckError>> {
    let descriptor = function.descriptor();
    let params = descriptor.params();
    let name = descriptor.name();
    let has_optional = descriptor.has_optional_params();
    let mut errors = Vec::new();
    let mut bound: Vec<Option<Expr>> = vec![None; params.len()];

    let wrong_count = |given: usize| CheckError::WrongNumberOfArgs {
        function: name.to_owned(),
        expected: if has_optional {
            format!("{}..={}", descriptor.required_count(), params.len())
        } else {
            params.len().to_string()
        },
        given,
    };

    match args {
        CallArgs::Named(named) => {
            let given = named.len();
            let mut seen = HashSet::new();
            for (param_name, expr) in named {
                if !seen.insert(param_name.clone()) {
                    errors.push(CheckError::DuplicateArgument {
                        function: name.to_owned(),
                        parameter: param_name,
                    });
                    continue;
                }
                match descriptor.param_index(&param_name) {
                    Some(idx) => bound[idx] = Some(expr),
                    None => errors.push(CheckError::UnknownParameter {
                        function: name.to_owned(),
                        parameter: param_name,
                    }),
                }
            }
            if !has_optional && given != params.len() {
                errors.push(wrong_count(given));
            } else {
                for (param, arg) in params.iter().zip(&bound) {
                    if !param.is_optional() && arg.is_none() {
                        errors.push(CheckError::MissingRequiredParam {
                            function: name.to_owned(),
                            parameter: param.name().to_owned(),
                        });
                    }
                }
            }
        }
        CallArgs::Positional(positional) => {
            let given = positional.len();
            if given > params.len() || (!has_optional && given != params.len()) {
                errors.push(wrong_count(given));
            } else if has_optional && required_after_optional(function.as_ref()) {
                errors.push(CheckError::OptionalParametersMustBeNamed {
                    function: name.to_owned(),
                });
            } else if descriptor.required_count() > given {
                errors.push(wrong_count(given));
            } else {
                for (slot, expr) in bound.iter_mut().zip(positional) {
                    *slot = Some(expr);
                }
            }
        }
    }

    for (param, arg) in params.iter().zip(&bound) {
        if let Some(arg) = arg {
            let actual = arg.return_type();
            if !param.value_type().accepts(actual) {
                errors.push(CheckError::IncompatibleArgumentType {
                    function: name.to_owned(),
                    parameter: param.name().to_owned(),
                    expected: param.value_type(),
                    actual,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(FunctionCall {
            function,
            args: bound,
        })
    } else {
        Err(errors)
    }
}

fn required_after_optional(function: &dyn Function) -> bool {
    let mut optional_seen = false;
    for param in function.descriptor().params() {
        if param.is_optional() {
            optional_seen = true;
        } else if optional_seen {
            return true;
        }
    }
    false
}

/// Type-check a single node against the static types of its children.
pub(crate) fn check_node(expr: &Expr) -> Result<(), CheckError> {
    use ValueType as T;
    match expr {
        Expr::Not(inner) => expect_type(inner, T::Bool),
        Expr::And(a, b) | Expr::Or(a, b) => {
            expect_type(a, T::Bool)?;
            expect_type(b, T::Bool)
        }
        Expr::Signed { expr: inner, .. } => {
            let ty = inner.return_type();
            if ty.is_numeric() || ty == T::Any {
                Ok(())
            } else {
                Err(CheckError::IncompatibleType {
                    expr: expr.to_string(),
                    expected: T::Double,
                    actual: ty,
                })
            }
        }
        Expr::Arith { op, left, right } => {
            let (l, r) = (left.return_type(), right.return_type());
            let numeric = |t: T| t.is_numeric() || t == T::Any;
            let ok = if *op == ArithOp::Add {
                l == T::String || r == T::String || (numeric(l) && numeric(r))
            } else {
                numeric(l) && numeric(r)
            };
            if ok {
                Ok(())
            } else {
                Err(CheckError::IncompatibleTypes {
                    op: op.to_string(),
                    left: l,
                    right: r,
                })
            }
        }
        Expr::Compare { op, left, right } if !op.is_equality() => {
            let (l, r) = (left.return_type(), right.return_type());
            let ok = l == T::Any
                || r == T::Any
                || (l.is_numeric() && r.is_numeric())
                || (l == T::String && r == T::String);
            if ok {
                Ok(())
            } else {
                Err(CheckError::IncompatibleTypes {
                    op: op.to_string(),
                    left: l,
                    right: r,
                })
            }
        }
        Expr::Index { target, index } => {
            let target_ty = target.return_type();
            let expected = match target_ty {
                T::List => T::Long,
                T::Map => T::String,
                T::Any => return Ok(()),
                other => return Err(CheckError::NonIndexableType { actual: other }),
            };
            let actual = index.return_type();
            if expected.accepts(actual) {
                Ok(())
            } else {
                Err(CheckError::IncompatibleIndexType {
                    target: target_ty,
                    expected,
                    actual,
                })
            }
        }
        Expr::MessageRef(field) | Expr::FieldAccess { field, .. } => expect_type(field, T::String),
        _ => Ok(()),
    }
}

fn expect_type(expr: &Expr, expected: ValueType) -> Result<(), CheckError> {
    let actual = expr.return_type();
    if expected.accepts(actual) {
        Ok(())
    } else {
        Err(CheckError::IncompatibleType {
            expr: expr.to_string(),
            expected,
            actual,
        })
    }
}

/// Type-check an expression tree, collecting every error.
#[must_use]
pub fn check_expr(expr: &Expr) -> Vec<CheckError> {
    let mut errors = Vec::new();
    check_expr_into(expr, &mut errors);
    errors
}

fn check_expr_into(expr: &Expr, errors: &mut Vec<CheckError>) {
    match expr {
        Expr::Array(items) => items.iter().for_each(|e| check_expr_into(e, errors)),
        Expr::Map(entries) => entries.iter().for_each(|(_, e)| check_expr_into(e, errors)),
        Expr::MessageRef(inner) | Expr::Not(inner) | Expr::Signed { expr: inner, .. } => {
            check_expr_into(inner, errors);
        }
        Expr::FieldAccess { target, field } => {
            check_expr_into(target, errors);
            check_expr_into(field, errors);
        }
        Expr::Index { target, index } => {
            check_expr_into(target, errors);
            check_expr_into(index, errors);
        }
        Expr::Function(call) => call
            .args
            .iter()
            .flatten()
            .for_each(|e| check_expr_into(e, errors)),
        Expr::Arith { left, right, .. } | Expr::Compare { left, right, .. } => {
            check_expr_into(left, errors);
            check_expr_into(right, errors);
        }
        Expr::And(a, b) | Expr::Or(a, b) => {
            check_expr_into(a, errors);
            check_expr_into(b, errors);
        }
        Expr::Bool(_)
        | Expr::Long(_)
        | Expr::Double(_)
        | Expr::String(_)
        | Expr::VarRef { .. }
        | Expr::FieldRef(_) => {}
    }
    if let Err(e) = check_node(expr) {
        errors.push(e);
    }
}

/// Check a rule: its condition must be boolean (or only known at runtime),
/// every node must type-check and variables must be bound before use.
pub(crate) fn check_rule(name: &str, when: &Expr, then: &[Statement]) -> Vec<CheckError> {
    let mut errors = check_expr(when);
    let ty = when.return_type();
    if !ValueType::Bool.accepts(ty) {
        errors.push(CheckError::NonBooleanCondition {
            rule: name.to_owned(),
            actual: ty,
        });
    }
    collect_var_refs(when, &HashSet::new(), &mut errors);

    let mut declared = HashSet::new();
    for stmt in then {
        match stmt {
            Statement::Call(call) => {
                for arg in call.args.iter().flatten() {
                    errors.extend(check_expr(arg));
                    collect_var_refs(arg, &declared, &mut errors);
                }
            }
            Statement::Let { name, expr } => {
                errors.extend(check_expr(expr));
                collect_var_refs(expr, &declared, &mut errors);
                declared.insert(name.clone());
            }
        }
    }
    errors
}

fn collect_var_refs(expr: &Expr, declared: &HashSet<String>, errors: &mut Vec<CheckError>) {
    match expr {
        Expr::VarRef { name, .. } => {
            if !declared.contains(name) {
                errors.push(CheckError::UndeclaredVariable { name: name.clone() });
            }
        }
        Expr::Array(items) => items.iter().for_each(|e| collect_var_refs(e, declared, errors)),
        Expr::Map(entries) => entries
            .iter()
            .for_each(|(_, e)| collect_var_refs(e, declared, errors)),
        Expr::MessageRef(inner) | Expr::Not(inner) | Expr::Signed { expr: inner, .. } => {
            collect_var_refs(inner, declared, errors);
        }
        Expr::FieldAccess { target: a, field: b }
        | Expr::Index { target: a, index: b }
        | Expr::Arith { left: a, right: b, .. }
        | Expr::Compare { left: a, right: b, .. }
        | Expr::And(a, b)
        | Expr::Or(a, b) => {
            collect_var_refs(a, declared, errors);
            collect_var_refs(b, declared, errors);
        }
        Expr::Function(call) => call
            .args
            .iter()
            .flatten()
            .for_each(|e| collect_var_refs(e, declared, errors)),
        Expr::Bool(_) | Expr::Long(_) | Expr::Double(_) | Expr::String(_) | Expr::FieldRef(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FunctionRegistry, lit, message_field, var};

    fn registry() -> FunctionRegistry {
        FunctionRegistry::with_builtins()
    }

    fn bind(name: &str, args: CallArgs) -> Result<FunctionCall, Vec<CheckError>> {
        bind_call(registry().lookup(name).unwrap(), args)
    }

    #[test]
    fn positional_binding_fills_in_order() {
        let call = bind("substring", vec![lit("hello"), lit(1_i64)].into()).unwrap();
        assert_eq!(call.args.len(), 3);
        assert_eq!(call.args[0], Some(lit("hello")));
        assert_eq!(call.args[2], None);
    }

    #[test]
    fn named_binding_reorders() {
        let call = bind(
            "substring",
            CallArgs::Named(vec![
                ("start".into(), lit(1_i64)),
                ("value".into(), lit("hello")),
            ]),
        )
        .unwrap();
        assert_eq!(call.args[0], Some(lit("hello")));
        assert_eq!(call.args[1], Some(lit(1_i64)));
    }

    #[test]
    fn too_few_positional_args() {
        let errs = bind("substring", vec![lit("hello")].into()).unwrap_err();
        assert!(matches!(errs[0], CheckError::WrongNumberOfArgs { given: 1, .. }));
    }

    #[test]
    fn too_many_args_for_required_only_function() {
        let errs = bind("lowercase", vec![lit("a"), lit("b")].into()).unwrap_err();
        assert!(matches!(errs[0], CheckError::WrongNumberOfArgs { given: 2, .. }));
    }

    #[test]
    fn missing_required_named_param() {
        let errs = bind(
            "substring",
            CallArgs::Named(vec![("value".into(), lit("hello"))]),
        )
        .unwrap_err();
        assert_eq!(
            errs,
            vec![CheckError::MissingRequiredParam {
                function: "substring".into(),
                parameter: "start".into(),
            }]
        );
    }

    #[test]
    fn unknown_named_param() {
        let errs = bind(
            "lowercase",
            CallArgs::Named(vec![("valu".into(), lit("A"))]),
        )
        .unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, CheckError::UnknownParameter { .. })));
    }

    #[test]
    fn incompatible_argument_type() {
        let errs = bind("substring", vec![lit("hello"), lit("one")].into()).unwrap_err();
        assert!(matches!(
            errs[0],
            CheckError::IncompatibleArgumentType {
                expected: ValueType::Long,
                actual: ValueType::String,
                ..
            }
        ));
    }

    #[test]
    fn string_subtraction_rejected() {
        let errs = check_expr(&(lit("a") - lit("b")));
        assert_eq!(
            errs,
            vec![CheckError::IncompatibleTypes {
                op: "-".into(),
                left: ValueType::String,
                right: ValueType::String,
            }]
        );
    }

    #[test]
    fn string_concatenation_allowed() {
        assert!(check_expr(&(lit("a") + lit(1_i64))).is_empty());
    }

    #[test]
    fn ordering_between_string_and_number_rejected() {
        let errs = check_expr(&lit("a").lt(lit(1_i64)));
        assert!(matches!(errs[0], CheckError::IncompatibleTypes { .. }));
        assert!(check_expr(&lit("a").equals(lit(1_i64))).is_empty());
    }

    #[test]
    fn non_indexable_type() {
        let errs = check_expr(&lit(5_i64).index(lit(0_i64)));
        assert_eq!(errs, vec![CheckError::NonIndexableType { actual: ValueType::Long }]);
    }

    #[test]
    fn incompatible_index_type() {
        let list = lit(vec![crate::Value::Long(1)]);
        let errs = check_expr(&list.index(lit("x")));
        assert!(matches!(errs[0], CheckError::IncompatibleIndexType { .. }));
    }

    #[test]
    fn not_requires_boolean() {
        let errs = check_expr(&!lit(1_i64));
        assert!(matches!(
            errs[0],
            CheckError::IncompatibleType {
                expected: ValueType::Bool,
                actual: ValueType::Long,
                ..
            }
        ));
        assert!(check_expr(&!message_field("flag")).is_empty());
    }

    #[test]
    fn rule_condition_must_be_boolean() {
        let errs = check_rule("r", &lit(1_i64), &[]);
        assert!(matches!(errs[0], CheckError::NonBooleanCondition { .. }));
    }

    #[test]
    fn variables_must_be_declared_before_use() {
        let set_field = registry()
            .call("set_field", vec![lit("f"), var("x")])
            .unwrap();
        let errs = check_rule(
            "r",
            &lit(true),
            &[
                Statement::try_from(set_field.clone()).unwrap(),
                Statement::assign("x", lit(1_i64)),
                Statement::try_from(set_field).unwrap(),
            ],
        );
        assert_eq!(errs, vec![CheckError::UndeclaredVariable { name: "x".into() }]);
    }
}
