use std::fmt;

use super::expr::{Expr, FunctionCall};

/// One action of a rule's `then` block.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Invoke a function for its side effect, discarding the result.
    Call(FunctionCall),
    /// `let name = expr;` binds a variable for the statements that follow.
    Let { name: String, expr: Expr },
}

impl Statement {
    #[must_use]
    pub fn call(call: FunctionCall) -> Self {
        Statement::Call(call)
    }

    #[must_use]
    pub fn assign(name: &str, expr: Expr) -> Self {
        Statement::Let {
            name: name.to_owned(),
            expr,
        }
    }
}

impl TryFrom<Expr> for Statement {
    type Error = Expr;

    /// Only a function-call expression can stand alone as a statement.
    fn try_from(expr: Expr) -> Result<Self, Expr> {
        match expr {
            Expr::Function(call) => Ok(Statement::Call(call)),
            other => Err(other),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Call(call) => write!(f, "{call};"),
            Statement::Let { name, expr } => write!(f, "let {name} = {expr};"),
        }
    }
}
