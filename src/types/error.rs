use thiserror::Error;

use super::value::ValueType;

/// Static errors found while validating expressions, statements and rules
/// against a [`FunctionRegistry`](super::FunctionRegistry).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckError {
    #[error("unknown function '{name}'")]
    UndeclaredFunction { name: String },

    #[error("undeclared variable '{name}'")]
    UndeclaredVariable { name: String },

    #[error("function '{function}' expects {expected} argument(s), got {given}")]
    WrongNumberOfArgs {
        function: String,
        expected: String,
        given: usize,
    },

    #[error("missing required parameter '{parameter}' for function '{function}'")]
    MissingRequiredParam { function: String, parameter: String },

    #[error("function '{function}' has no parameter named '{parameter}'")]
    UnknownParameter { function: String, parameter: String },

    #[error("parameter '{parameter}' given more than once in call to '{function}'")]
    DuplicateArgument { function: String, parameter: String },

    #[error("function '{function}' has optional parameters, arguments must be named")]
    OptionalParametersMustBeNamed { function: String },

    #[error(
        "parameter '{parameter}' of function '{function}' expects {expected}, got {actual}"
    )]
    IncompatibleArgumentType {
        function: String,
        parameter: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("expected {expected}, got {actual} in '{expr}'")]
    IncompatibleType {
        expr: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("incompatible types {left} and {right} for operator '{op}'")]
    IncompatibleTypes {
        op: String,
        left: ValueType,
        right: ValueType,
    },

    #[error("cannot index into a value of type {actual}")]
    NonIndexableType { actual: ValueType },

    #[error("index into {target} must be {expected}, got {actual}")]
    IncompatibleIndexType {
        target: ValueType,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("condition of rule '{rule}' must be bool, got {actual}")]
    NonBooleanCondition { rule: String, actual: ValueType },
}

/// Errors raised while assembling registries, pipelines and stages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("duplicate stage number {stage} in pipeline '{pipeline}'")]
    DuplicateStage { pipeline: String, stage: i32 },

    #[error("function '{name}' is already registered")]
    DuplicateFunction { name: String },

    #[error("duplicate parameter '{parameter}' in function '{function}'")]
    DuplicateParameter { function: String, parameter: String },
}

/// Runtime failures. Captured at the rule boundary and never propagated
/// to the pipeline interpreter's caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("type mismatch in {operation}: expected {expected}, got {actual}")]
    TypeMismatch {
        operation: String,
        expected: String,
        actual: ValueType,
    },

    #[error("missing required parameter '{parameter}' for function '{function}'")]
    MissingParameter { function: String, parameter: String },

    #[error(
        "parameter '{parameter}' of function '{function}' expects {expected}, got {actual}"
    )]
    ArgumentType {
        function: String,
        parameter: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("arithmetic error: {message}")]
    Arithmetic { message: String },

    #[error("error in function '{function}': {message}")]
    Function { function: String, message: String },
}

impl EvalError {
    pub(crate) fn type_mismatch(
        operation: impl Into<String>,
        expected: impl Into<String>,
        actual: ValueType,
    ) -> Self {
        EvalError::TypeMismatch {
            operation: operation.into(),
            expected: expected.into(),
            actual,
        }
    }

    /// Failure raised from inside a function body.
    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        EvalError::Function {
            function: function.into(),
            message: message.into(),
        }
    }

    pub(crate) fn arithmetic(message: impl Into<String>) -> Self {
        EvalError::Arithmetic {
            message: message.into(),
        }
    }
}
