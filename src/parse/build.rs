use std::collections::{HashMap, HashSet};

use super::ast::{Pos, RawArgs, RawExpr, RawKind, RawPipeline, RawRule, RawStatement};
use super::error::{ParseError, SyntaxError, SyntaxErrorKind};
use crate::check::check_node;
use crate::types::{
    CallArgs, CheckError, DefinitionError, Expr, FunctionRegistry, Pipeline, Rule, Stage,
    Statement, ValueType,
};

/// Turns raw syntax into checked rules and pipelines, collecting every
/// resolution and type error with its position.
pub(crate) struct AstBuilder<'a> {
    source: &'a str,
    registry: Option<&'a FunctionRegistry>,
    vars: HashMap<String, ValueType>,
    errors: Vec<SyntaxError>,
}

impl<'a> AstBuilder<'a> {
    pub(crate) fn new(source: &'a str, registry: Option<&'a FunctionRegistry>) -> Self {
        Self {
            source,
            registry,
            vars: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn finish<T>(self, value: T) -> Result<T, ParseError> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(ParseError::new(self.errors))
        }
    }

    fn error(&mut self, at: Pos, kind: impl Into<SyntaxErrorKind>) {
        let offset = self.source.len().saturating_sub(at);
        self.errors.push(SyntaxError::at(self.source, offset, kind.into()));
    }

    pub(crate) fn rule(&mut self, raw: RawRule) -> Option<Rule> {
        self.vars.clear();
        let before = self.errors.len();
        let when_at = raw.when.at;
        let when = self.expr(raw.when);
        let ty = when.return_type();
        if !ValueType::Bool.accepts(ty) {
            self.error(
                when_at,
                CheckError::NonBooleanCondition {
                    rule: raw.name.clone(),
                    actual: ty,
                },
            );
        }
        let then: Vec<Statement> = raw
            .then
            .into_iter()
            .filter_map(|stmt| self.statement(stmt))
            .collect();
        if self.errors.len() > before {
            return None;
        }
        match Rule::builder(&raw.name).when(when).statements(then).build() {
            Ok(rule) => Some(rule),
            Err(errors) => {
                for error in errors {
                    self.error(raw.at, error);
                }
                None
            }
        }
    }

    pub(crate) fn pipeline(&mut self, raw: RawPipeline) -> Option<Pipeline> {
        let mut builder = Pipeline::builder(&raw.name);
        let mut seen = HashSet::new();
        let mut valid = true;
        for stage in raw.stages {
            if !seen.insert(stage.stage) {
                self.error(
                    stage.at,
                    DefinitionError::DuplicateStage {
                        pipeline: raw.name.clone(),
                        stage: stage.stage,
                    },
                );
                valid = false;
                continue;
            }
            builder = builder.stage(Stage::new(stage.stage, stage.policy).rules(stage.rules));
        }
        if !valid {
            return None;
        }
        match builder.build() {
            Ok(pipeline) => Some(pipeline),
            Err(error) => {
                self.error(raw.at, error);
                None
            }
        }
    }

    fn statement(&mut self, raw: RawStatement) -> Option<Statement> {
        match raw {
            RawStatement::Let { name, value } => {
                let value = self.expr(value);
                self.vars.insert(name.clone(), value.return_type());
                Some(Statement::assign(&name, value))
            }
            RawStatement::Call { at, name, args } => match self.call(at, &name, args) {
                Expr::Function(call) => Some(Statement::Call(call)),
                _ => None,
            },
        }
    }

    fn call(&mut self, at: Pos, name: &str, args: RawArgs) -> Expr {
        let args = match args {
            RawArgs::Positional(args) => {
                CallArgs::Positional(args.into_iter().map(|a| self.expr(a)).collect())
            }
            RawArgs::Named(args) => CallArgs::Named(
                args.into_iter()
                    .map(|(param, a)| (param, self.expr(a)))
                    .collect(),
            ),
        };
        let bound = match self.registry {
            Some(registry) => registry.call(name, args),
            None => Err(vec![CheckError::UndeclaredFunction {
                name: name.to_owned(),
            }]),
        };
        match bound {
            Ok(expr) => expr,
            Err(errors) => {
                for error in errors {
                    self.error(at, error);
                }
                unresolved()
            }
        }
    }

    fn expr(&mut self, raw: RawExpr) -> Expr {
        let at = raw.at;
        let expr = match raw.kind {
            RawKind::Bool(v) => Expr::Bool(v),
            RawKind::Long(v) => Expr::Long(v),
            RawKind::Double(v) => Expr::Double(v),
            RawKind::String(v) => Expr::String(v),
            RawKind::Array(items) => Expr::Array(items.into_iter().map(|e| self.expr(e)).collect()),
            RawKind::Map(entries) => Expr::Map(
                entries
                    .into_iter()
                    .map(|(key, e)| (key, self.expr(e)))
                    .collect(),
            ),
            RawKind::Ident(name) => match self.vars.get(&name) {
                Some(&ty) => Expr::VarRef { name, ty },
                None => {
                    self.error(at, CheckError::UndeclaredVariable { name: name.clone() });
                    Expr::VarRef {
                        name,
                        ty: ValueType::Any,
                    }
                }
            },
            RawKind::MessageRef(field) => Expr::MessageRef(Box::new(Expr::FieldRef(field))),
            RawKind::Call { name, args } => self.call(at, &name, args),
            RawKind::FieldAccess { target, field } => Expr::FieldAccess {
                target: Box::new(self.expr(*target)),
                field: Box::new(Expr::FieldRef(field)),
            },
            RawKind::Index { target, index } => Expr::Index {
                target: Box::new(self.expr(*target)),
                index: Box::new(self.expr(*index)),
            },
            RawKind::Not(inner) => Expr::Not(Box::new(self.expr(*inner))),
            RawKind::Signed { negative, expr } => signed(negative, self.expr(*expr)),
            RawKind::Arith { op, left, right } => Expr::Arith {
                op,
                left: Box::new(self.expr(*left)),
                right: Box::new(self.expr(*right)),
            },
            RawKind::Compare { op, left, right } => Expr::Compare {
                op,
                left: Box::new(self.expr(*left)),
                right: Box::new(self.expr(*right)),
            },
            RawKind::And(a, b) => Expr::And(Box::new(self.expr(*a)), Box::new(self.expr(*b))),
            RawKind::Or(a, b) => Expr::Or(Box::new(self.expr(*a)), Box::new(self.expr(*b))),
        };
        if let Err(error) = check_node(&expr) {
            self.error(at, error);
        }
        expr
    }
}

/// Sign applied to a numeric literal folds into the literal.
fn signed(negative: bool, inner: Expr) -> Expr {
    match (negative, inner) {
        (true, Expr::Long(v)) if v != i64::MIN => Expr::Long(-v),
        (true, Expr::Double(v)) => Expr::Double(-v),
        (false, lit @ (Expr::Long(_) | Expr::Double(_))) => lit,
        (negative, inner) => Expr::Signed {
            negative,
            expr: Box::new(inner),
        },
    }
}

/// Stand-in for a call that failed to bind. Typed `Any` so the error does not
/// cascade into the enclosing nodes.
fn unresolved() -> Expr {
    Expr::VarRef {
        name: String::new(),
        ty: ValueType::Any,
    }
}
