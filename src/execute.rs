use crate::evaluate::{eval_call, eval_expr, truthy};
use crate::types::{EvalError, EvaluationContext, Message, Rule, Statement};

impl Statement {
    /// Run this statement against the context.
    ///
    /// A `let` whose expression is undefined removes the binding.
    ///
    /// # Errors
    ///
    /// Returns the [`EvalError`] raised while evaluating the statement.
    pub fn execute(&self, ctx: &mut EvaluationContext<'_>) -> Result<(), EvalError> {
        match self {
            Statement::Call(call) => eval_call(call, ctx).map(|_| ()),
            Statement::Let { name, expr } => {
                match eval_expr(expr, ctx)? {
                    Some(value) => ctx.define(name, value),
                    None => ctx.undefine(name),
                }
                Ok(())
            }
        }
    }
}

/// Evaluate a rule's condition on a fresh context.
pub(crate) fn run_when(rule: &Rule, message: &mut dyn Message) -> Result<bool, EvalError> {
    let mut ctx = EvaluationContext::new(message);
    match rule.generated() {
        Some(generated) => generated.new_instance().when(&mut ctx),
        None => truthy(eval_expr(rule.when(), &mut ctx)?),
    }
}

/// Execute a rule's statements in order, returning every error raised.
///
/// With `stop_on_error` the first failing statement ends the block.
pub(crate) fn run_then(rule: &Rule, message: &mut dyn Message, stop_on_error: bool) -> Vec<EvalError> {
    let mut ctx = EvaluationContext::new(message);
    match rule.generated() {
        Some(generated) => {
            let mut invocation = generated.new_instance();
            for i in 0..invocation.statement_count() {
                if let Err(e) = invocation.execute(i, &mut ctx) {
                    ctx.add_error(e);
                    if stop_on_error {
                        break;
                    }
                }
            }
        }
        None => {
            for statement in rule.then() {
                if let Err(e) = statement.execute(&mut ctx) {
                    ctx.add_error(e);
                    if stop_on_error {
                        break;
                    }
                }
            }
        }
    }
    ctx.errors().to_vec()
}
