use crate::types::{ArithOp, CompareOp, StageMatch};

/// Source position of a node, stored as the length of the input that
/// remained when the node started. Converted to line and column only when
/// an error is reported.
pub(crate) type Pos = usize;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawExpr {
    pub(crate) at: Pos,
    pub(crate) kind: RawKind,
}

/// Expression tree as written, before names are resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawKind {
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Array(Vec<RawExpr>),
    Map(Vec<(String, RawExpr)>),
    Ident(String),
    MessageRef(String),
    Call { name: String, args: RawArgs },
    FieldAccess { target: Box<RawExpr>, field: String },
    Index { target: Box<RawExpr>, index: Box<RawExpr> },
    Not(Box<RawExpr>),
    Signed { negative: bool, expr: Box<RawExpr> },
    Arith { op: ArithOp, left: Box<RawExpr>, right: Box<RawExpr> },
    Compare { op: CompareOp, left: Box<RawExpr>, right: Box<RawExpr> },
    And(Box<RawExpr>, Box<RawExpr>),
    Or(Box<RawExpr>, Box<RawExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawArgs {
    Positional(Vec<RawExpr>),
    Named(Vec<(String, RawExpr)>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawStatement {
    Let { name: String, value: RawExpr },
    Call { at: Pos, name: String, args: RawArgs },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawRule {
    pub(crate) at: Pos,
    pub(crate) name: String,
    pub(crate) when: RawExpr,
    pub(crate) then: Vec<RawStatement>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawStage {
    pub(crate) at: Pos,
    pub(crate) stage: i32,
    pub(crate) policy: StageMatch,
    pub(crate) rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawPipeline {
    pub(crate) at: Pos,
    pub(crate) name: String,
    pub(crate) stages: Vec<RawStage>,
}
