mod context;
mod error;
mod expr;
mod function;
mod message;
mod pipeline;
mod registry;
mod report;
mod rule;
mod stage;
mod statement;
mod value;
mod var_slots;

pub use context::EvaluationContext;
pub use error::{CheckError, DefinitionError, EvalError};
pub use expr::{ArithOp, CallArgs, CompareOp, Expr, FunctionCall, lit, message_field, var};
pub use function::{Function, FunctionArgs, FunctionDescriptor, ParameterDescriptor, Transform};
pub use message::{MemoryMessage, Message};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use registry::{FunctionRegistry, FunctionRegistryBuilder};
pub use report::{PipelineOutcome, PipelineReport, ProcessingReport, StageReport};
pub use rule::{Rule, RuleBuilder};
pub use stage::{Stage, StageMatch};
pub use statement::Statement;
pub use value::{Value, ValueType};
pub(crate) use var_slots::VarSlots;
