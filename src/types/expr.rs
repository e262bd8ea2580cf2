use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Not, Rem, Sub};
use std::sync::Arc;

use super::function::Function;
use super::value::{Value, ValueType, write_quoted};

/// Comparison operators supported in rule expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Neq)
    }
}

/// Arithmetic operators: additive (`+ -`) and multiplicative (`* / %`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Typed expression tree.
///
/// Built by the parser or by hand with the helpers in this module. Function
/// calls are already bound to a registered [`Function`]; use
/// [`FunctionRegistry::call()`](super::FunctionRegistry::call) to create one.
#[derive(Clone, PartialEq)]
pub enum Expr {
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Array(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    /// A variable bound by an earlier `let` statement.
    VarRef { name: String, ty: ValueType },
    /// A field name in field-access position; evaluates to the name itself.
    FieldRef(String),
    /// `$message.<field>`: reads the message field named by the inner expression.
    MessageRef(Box<Expr>),
    /// `<target>.<field>`: property lookup on a map value.
    FieldAccess { target: Box<Expr>, field: Box<Expr> },
    /// `<target>[<index>]` on a list or a map.
    Index { target: Box<Expr>, index: Box<Expr> },
    Function(FunctionCall),
    Not(Box<Expr>),
    Signed { negative: bool, expr: Box<Expr> },
    Arith { op: ArithOp, left: Box<Expr>, right: Box<Expr> },
    Compare { op: CompareOp, left: Box<Expr>, right: Box<Expr> },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// A function invocation with its arguments arranged in parameter order.
///
/// `args[i]` belongs to the i-th declared parameter; `None` marks an omitted
/// optional parameter.
#[derive(Clone)]
pub struct FunctionCall {
    pub(crate) function: Arc<dyn Function>,
    pub(crate) args: Vec<Option<Expr>>,
}

impl FunctionCall {
    #[must_use]
    pub fn name(&self) -> &str {
        self.function.descriptor().name()
    }

    #[must_use]
    pub fn function(&self) -> &Arc<dyn Function> {
        &self.function
    }

    #[must_use]
    pub fn args(&self) -> &[Option<Expr>] {
        &self.args
    }
}

impl PartialEq for FunctionCall {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.function, &other.function) && self.args == other.args
    }
}

impl fmt::Debug for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCall")
            .field("name", &self.name())
            .field("args", &self.args)
            .finish()
    }
}

/// Arguments at a call site before they are bound to parameters.
#[derive(Debug, Clone)]
pub enum CallArgs {
    Positional(Vec<Expr>),
    Named(Vec<(String, Expr)>),
}

impl CallArgs {
    #[must_use]
    pub fn none() -> Self {
        CallArgs::Positional(Vec::new())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            CallArgs::Positional(a) => a.len(),
            CallArgs::Named(a) => a.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Expr>> for CallArgs {
    fn from(args: Vec<Expr>) -> Self {
        CallArgs::Positional(args)
    }
}

impl Expr {
    /// Static return type. `Any` when it is only known at evaluation time.
    #[must_use]
    pub fn return_type(&self) -> ValueType {
        match self {
            Expr::Bool(_) | Expr::Not(_) | Expr::Compare { .. } | Expr::And(..) | Expr::Or(..) => {
                ValueType::Bool
            }
            Expr::Long(_) => ValueType::Long,
            Expr::Double(_) => ValueType::Double,
            Expr::String(_) | Expr::FieldRef(_) => ValueType::String,
            Expr::Array(_) => ValueType::List,
            Expr::Map(_) => ValueType::Map,
            Expr::VarRef { ty, .. } => *ty,
            Expr::MessageRef(_) | Expr::FieldAccess { .. } | Expr::Index { .. } => ValueType::Any,
            Expr::Function(call) => call.function.descriptor().return_type(),
            Expr::Signed { expr, .. } => expr.return_type(),
            Expr::Arith { op, left, right } => arith_type(*op, left.return_type(), right.return_type()),
        }
    }

    /// Literal expression for a value; lists and maps become array and map literals.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Expr {
        match value.into() {
            Value::Bool(v) => Expr::Bool(v),
            Value::Long(v) => Expr::Long(v),
            Value::Double(v) => Expr::Double(v),
            Value::String(v) => Expr::String(v),
            Value::List(items) => Expr::Array(items.into_iter().map(Expr::literal).collect()),
            Value::Map(entries) => Expr::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Expr::literal(v)))
                    .collect(),
            ),
        }
    }

    #[must_use]
    pub fn and(self, other: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn equals(self, other: Expr) -> Expr {
        self.compare(CompareOp::Eq, other)
    }

    #[must_use]
    pub fn not_equals(self, other: Expr) -> Expr {
        self.compare(CompareOp::Neq, other)
    }

    #[must_use]
    pub fn gt(self, other: Expr) -> Expr {
        self.compare(CompareOp::Gt, other)
    }

    #[must_use]
    pub fn gte(self, other: Expr) -> Expr {
        self.compare(CompareOp::Gte, other)
    }

    #[must_use]
    pub fn lt(self, other: Expr) -> Expr {
        self.compare(CompareOp::Lt, other)
    }

    #[must_use]
    pub fn lte(self, other: Expr) -> Expr {
        self.compare(CompareOp::Lte, other)
    }

    #[must_use]
    pub fn compare(self, op: CompareOp, other: Expr) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// `self.<name>` property access.
    #[must_use]
    pub fn field(self, name: &str) -> Expr {
        Expr::FieldAccess {
            target: Box::new(self),
            field: Box::new(Expr::FieldRef(name.to_owned())),
        }
    }

    /// `self[index]` indexed access.
    #[must_use]
    pub fn index(self, index: Expr) -> Expr {
        Expr::Index {
            target: Box::new(self),
            index: Box::new(index),
        }
    }

    fn arith(self, op: ArithOp, other: Expr) -> Expr {
        Expr::Arith {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }
}

/// Result type of an arithmetic node given its operand types.
pub(crate) fn arith_type(op: ArithOp, left: ValueType, right: ValueType) -> ValueType {
    use ValueType as T;
    match (op, left, right) {
        (ArithOp::Add, T::String, _) | (ArithOp::Add, _, T::String) => T::String,
        (_, T::Long, T::Long) => T::Long,
        (_, T::Double, T::Long | T::Double) | (_, T::Long, T::Double) => T::Double,
        _ => T::Any,
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Signed {
            negative: true,
            expr: Box::new(self),
        }
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        self.arith(ArithOp::Add, rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self.arith(ArithOp::Sub, rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        self.arith(ArithOp::Mul, rhs)
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        self.arith(ArithOp::Div, rhs)
    }
}

impl Rem for Expr {
    type Output = Expr;

    fn rem(self, rhs: Expr) -> Expr {
        self.arith(ArithOp::Mod, rhs)
    }
}

/// `$message.<name>`
#[must_use]
pub fn message_field(name: &str) -> Expr {
    Expr::MessageRef(Box::new(Expr::FieldRef(name.to_owned())))
}

/// Reference to a variable of unknown static type.
#[must_use]
pub fn var(name: &str) -> Expr {
    Expr::VarRef {
        name: name.to_owned(),
        ty: ValueType::Any,
    }
}

#[must_use]
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::literal(value)
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::Neq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithOp::Add => write!(f, "+"),
            ArithOp::Sub => write!(f, "-"),
            ArithOp::Mul => write!(f, "*"),
            ArithOp::Div => write!(f, "/"),
            ArithOp::Mod => write!(f, "%"),
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name())?;
        let params = self.function.descriptor().params();
        let mut first = true;
        for (param, arg) in params.iter().zip(&self.args) {
            if let Some(arg) = arg {
                if !first {
                    f.write_str(", ")?;
                }
                first = false;
                write!(f, "{}: {arg}", param.name())?;
            }
        }
        f.write_str(")")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Bool(v) => write!(f, "{v}"),
            Expr::Long(v) => write!(f, "{v}"),
            Expr::Double(v) => write!(f, "{v:?}"),
            Expr::String(v) => write_quoted(f, v),
            Expr::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Expr::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Expr::VarRef { name, .. } | Expr::FieldRef(name) => write!(f, "{name}"),
            Expr::MessageRef(field) => write!(f, "$message.{field}"),
            Expr::FieldAccess { target, field } => write!(f, "{target}.{field}"),
            Expr::Index { target, index } => write!(f, "{target}[{index}]"),
            Expr::Function(call) => write!(f, "{call}"),
            Expr::Not(inner) => write!(f, "(NOT {inner})"),
            Expr::Signed { negative, expr } => {
                write!(f, "{}{expr}", if *negative { "-" } else { "+" })
            }
            Expr::Arith { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Compare { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::And(a, b) => write!(f, "({a} AND {b})"),
            Expr::Or(a, b) => write!(f, "({a} OR {b})"),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Function(call) => fmt::Debug::fmt(call, f),
            other => write!(f, "Expr({other})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_from_value() {
        assert_eq!(lit(18_i64), Expr::Long(18));
        assert_eq!(lit("active"), Expr::String("active".to_owned()));
        assert_eq!(
            Expr::literal(Value::List(vec![Value::Bool(true)])),
            Expr::Array(vec![Expr::Bool(true)])
        );
    }

    #[test]
    fn message_field_builds_message_ref() {
        assert_eq!(
            message_field("src"),
            Expr::MessageRef(Box::new(Expr::FieldRef("src".to_owned())))
        );
    }

    #[test]
    fn operator_overloads_build_arith_nodes() {
        let expr = lit(1_i64) + lit(2.5_f64) * lit(2_i64);
        match expr {
            Expr::Arith {
                op: ArithOp::Add,
                right,
                ..
            } => assert!(matches!(*right, Expr::Arith { op: ArithOp::Mul, .. })),
            other => panic!("expected Add, got {other:?}"),
        }
    }

    #[test]
    fn return_types() {
        assert_eq!((lit(1_i64) + lit(2_i64)).return_type(), ValueType::Long);
        assert_eq!((lit(1_i64) + lit(2.0_f64)).return_type(), ValueType::Double);
        assert_eq!((lit("a") + lit(1_i64)).return_type(), ValueType::String);
        assert_eq!((lit(1_i64) - message_field("x")).return_type(), ValueType::Any);
        assert_eq!(lit(1_i64).gt(lit(0_i64)).return_type(), ValueType::Bool);
        assert_eq!((-lit(2.0_f64)).return_type(), ValueType::Double);
        assert_eq!(message_field("x").return_type(), ValueType::Any);
        assert_eq!(lit(vec![Value::Long(1)]).return_type(), ValueType::List);
    }

    #[test]
    fn boolean_chaining() {
        let expr = lit(true).and(lit(false)).or(!lit(true));
        match &expr {
            Expr::Or(left, right) => {
                assert!(matches!(left.as_ref(), Expr::And(..)));
                assert!(matches!(right.as_ref(), Expr::Not(_)));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn display() {
        let expr = message_field("bytes").gte(lit(1024_i64)).and(!var("seen"));
        assert_eq!(expr.to_string(), "(($message.bytes >= 1024) AND (NOT seen))");
        assert_eq!(var("m").field("k").index(lit(0_i64)).to_string(), "m.k[0]");
        assert_eq!(lit("a\"b").to_string(), "\"a\\\"b\"");
    }
}
