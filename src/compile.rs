use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::evaluate::{
    EvalResult, arith, compare, field_access, field_name, index_into, invoke, signed, truthy,
};
use crate::types::{EvalError, EvaluationContext, Expr, Statement, Value, VarSlots};

type Slots = [Option<Value>];
type CompiledExpr = Box<dyn Fn(&mut EvaluationContext<'_>, &mut Slots) -> EvalResult + Send + Sync>;
type CompiledStatement =
    Box<dyn Fn(&mut EvaluationContext<'_>, &mut Slots) -> Result<(), EvalError> + Send + Sync>;

/// A rule compiled into a tree of closures with variables resolved to slots.
///
/// Shared and immutable. Each evaluation takes a fresh [`RuleInvocation`]
/// from [`new_instance()`](Self::new_instance); invocations are never shared.
pub struct GeneratedRule {
    when: CompiledExpr,
    then: Vec<CompiledStatement>,
    slot_count: usize,
}

impl GeneratedRule {
    pub(crate) fn generate(when: &Expr, then: &[Statement]) -> Self {
        let mut compiler = Compiler {
            slots: VarSlots::new(),
        };
        let when = compiler.expr(when);
        let then = then.iter().map(|s| compiler.statement(s)).collect();
        Self {
            when,
            then,
            slot_count: compiler.slots.len(),
        }
    }

    #[must_use]
    pub fn new_instance(self: &Arc<Self>) -> RuleInvocation {
        RuleInvocation {
            class: Arc::clone(self),
            slots: vec![None; self.slot_count],
        }
    }
}

impl fmt::Debug for GeneratedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedRule")
            .field("statements", &self.then.len())
            .field("slots", &self.slot_count)
            .finish_non_exhaustive()
    }
}

/// One evaluation of a [`GeneratedRule`], owning its variable slots.
#[derive(Debug)]
pub struct RuleInvocation {
    class: Arc<GeneratedRule>,
    slots: Vec<Option<Value>>,
}

impl RuleInvocation {
    /// # Errors
    ///
    /// Propagates the condition's evaluation error.
    pub fn when(&mut self, ctx: &mut EvaluationContext<'_>) -> Result<bool, EvalError> {
        truthy((self.class.when)(ctx, &mut self.slots)?)
    }

    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.class.then.len()
    }

    /// Execute the `index`-th statement of the `then` block.
    ///
    /// # Errors
    ///
    /// Propagates the statement's evaluation error.
    pub fn execute(&mut self, index: usize, ctx: &mut EvaluationContext<'_>) -> Result<(), EvalError> {
        match self.class.then.get(index) {
            Some(statement) => statement(ctx, &mut self.slots),
            None => Ok(()),
        }
    }
}

struct Compiler {
    slots: VarSlots,
}

impl Compiler {
    fn statement(&mut self, statement: &Statement) -> CompiledStatement {
        match statement {
            Statement::Call(call) => {
                let call = self.expr(&Expr::Function(call.clone()));
                Box::new(move |ctx, slots| call(ctx, slots).map(|_| ()))
            }
            Statement::Let { name, expr } => {
                let value = self.expr(expr);
                let slot = self.slots.register(name);
                Box::new(move |ctx, slots| {
                    slots[slot] = value(ctx, slots)?;
                    Ok(())
                })
            }
        }
    }

    fn expr(&mut self, expr: &Expr) -> CompiledExpr {
        if let Some(value) = constant(expr) {
            return Box::new(move |_, _| Ok(Some(value.clone())));
        }
        match expr {
            Expr::Array(items) => {
                let items: Vec<CompiledExpr> = items.iter().map(|e| self.expr(e)).collect();
                Box::new(move |ctx, slots| {
                    let mut values = Vec::with_capacity(items.len());
                    for item in &items {
                        let Some(value) = item(ctx, slots)? else {
                            return Ok(None);
                        };
                        values.push(value);
                    }
                    Ok(Some(Value::List(values)))
                })
            }
            Expr::Map(entries) => {
                let entries: Vec<(String, CompiledExpr)> = entries
                    .iter()
                    .map(|(k, e)| (k.clone(), self.expr(e)))
                    .collect();
                Box::new(move |ctx, slots| {
                    let mut map = BTreeMap::new();
                    for (key, value) in &entries {
                        let Some(value) = value(ctx, slots)? else {
                            return Ok(None);
                        };
                        map.insert(key.clone(), value);
                    }
                    Ok(Some(Value::Map(map)))
                })
            }
            Expr::VarRef { name, .. } => {
                let slot = self.slots.register(name);
                Box::new(move |_, slots| Ok(slots[slot].clone()))
            }
            Expr::MessageRef(field) => {
                if let Expr::FieldRef(name) = field.as_ref() {
                    let name = name.clone();
                    return Box::new(move |ctx, _| Ok(ctx.message().get(&name).cloned()));
                }
                let field = self.expr(field);
                Box::new(move |ctx, slots| {
                    let Some(name) = field_name(field(ctx, slots)?)? else {
                        return Ok(None);
                    };
                    Ok(ctx.message().get(&name).cloned())
                })
            }
            Expr::FieldAccess { target, field } => {
                let (target, field) = (self.expr(target), self.expr(field));
                Box::new(move |ctx, slots| {
                    let t = target(ctx, slots)?;
                    let f = field(ctx, slots)?;
                    field_access(t, f)
                })
            }
            Expr::Index { target, index } => {
                let (target, index) = (self.expr(target), self.expr(index));
                Box::new(move |ctx, slots| {
                    let t = target(ctx, slots)?;
                    let i = index(ctx, slots)?;
                    index_into(t, i)
                })
            }
            Expr::Function(call) => {
                let function = Arc::clone(&call.function);
                let args: Vec<Option<CompiledExpr>> = call
                    .args
                    .iter()
                    .map(|a| a.as_ref().map(|e| self.expr(e)))
                    .collect();
                Box::new(move |ctx, slots| {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in &args {
                        values.push(match arg {
                            Some(a) => a(ctx, slots)?,
                            None => None,
                        });
                    }
                    invoke(function.as_ref(), values, ctx)
                })
            }
            Expr::Not(inner) => {
                let inner = self.expr(inner);
                Box::new(move |ctx, slots| Ok(Some(Value::Bool(!truthy(inner(ctx, slots)?)?))))
            }
            Expr::And(a, b) => {
                let (a, b) = (self.expr(a), self.expr(b));
                Box::new(move |ctx, slots| {
                    let result = truthy(a(ctx, slots)?)? && truthy(b(ctx, slots)?)?;
                    Ok(Some(Value::Bool(result)))
                })
            }
            Expr::Or(a, b) => {
                let (a, b) = (self.expr(a), self.expr(b));
                Box::new(move |ctx, slots| {
                    let result = truthy(a(ctx, slots)?)? || truthy(b(ctx, slots)?)?;
                    Ok(Some(Value::Bool(result)))
                })
            }
            Expr::Signed { negative, expr } => {
                let (negative, inner) = (*negative, self.expr(expr));
                Box::new(move |ctx, slots| signed(negative, inner(ctx, slots)?))
            }
            Expr::Arith { op, left, right } => {
                let (op, left, right) = (*op, self.expr(left), self.expr(right));
                Box::new(move |ctx, slots| {
                    let l = left(ctx, slots)?;
                    let r = right(ctx, slots)?;
                    arith(op, l, r)
                })
            }
            Expr::Compare { op, left, right } => {
                let (op, left, right) = (*op, self.expr(left), self.expr(right));
                Box::new(move |ctx, slots| {
                    let l = left(ctx, slots)?;
                    let r = right(ctx, slots)?;
                    Ok(Some(Value::Bool(compare(op, l.as_ref(), r.as_ref())?)))
                })
            }
            // Literals are folded by `constant` above.
            Expr::Bool(_) | Expr::Long(_) | Expr::Double(_) | Expr::String(_) | Expr::FieldRef(_) => {
                Box::new(|_, _| Ok(None))
            }
        }
    }
}

/// Value of a subtree made only of literals.
fn constant(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Bool(v) => Some(Value::Bool(*v)),
        Expr::Long(v) => Some(Value::Long(*v)),
        Expr::Double(v) => Some(Value::Double(*v)),
        Expr::String(v) | Expr::FieldRef(v) => Some(Value::String(v.clone())),
        Expr::Array(items) => items
            .iter()
            .map(constant)
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        Expr::Map(entries) => entries
            .iter()
            .map(|(k, e)| constant(e).map(|v| (k.clone(), v)))
            .collect::<Option<BTreeMap<_, _>>>()
            .map(Value::Map),
        _ => None,
    }
}
