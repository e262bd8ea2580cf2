use std::fmt;

use super::context::EvaluationContext;
use super::error::EvalError;
use super::value::{Value, ValueType};

/// Post-processing applied to a bound argument value before the function sees it.
/// Returning `None` turns the argument into undefined.
pub type Transform = fn(Value) -> Option<Value>;

/// One declared parameter of a function.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    name: String,
    ty: ValueType,
    optional: bool,
    default: Option<Value>,
    transform: Option<Transform>,
}

impl ParameterDescriptor {
    #[must_use]
    pub fn required(name: &str, ty: ValueType) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            optional: false,
            default: None,
            transform: None,
        }
    }

    #[must_use]
    pub fn optional(name: &str, ty: ValueType) -> Self {
        Self {
            optional: true,
            ..Self::required(name, ty)
        }
    }

    /// Value used when the argument is omitted or evaluates to undefined.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Turn an evaluated argument into the value handed to the function:
    /// apply the default, coerce to the declared type, then run the transform.
    pub(crate) fn bind(&self, function: &str, value: Option<Value>) -> Result<Option<Value>, EvalError> {
        let Some(value) = value.or_else(|| self.default.clone()) else {
            if self.optional {
                return Ok(None);
            }
            return Err(EvalError::MissingParameter {
                function: function.to_owned(),
                parameter: self.name.clone(),
            });
        };
        let value = self.coerce(function, value)?;
        let value = match self.transform {
            Some(transform) => transform(value),
            None => Some(value),
        };
        if value.is_none() && !self.optional {
            return Err(EvalError::MissingParameter {
                function: function.to_owned(),
                parameter: self.name.clone(),
            });
        }
        Ok(value)
    }

    #[allow(clippy::cast_precision_loss)]
    fn coerce(&self, function: &str, value: Value) -> Result<Value, EvalError> {
        match (self.ty, value) {
            (ValueType::Any, v) => Ok(v),
            (ValueType::Double, Value::Long(v)) => Ok(Value::Double(v as f64)),
            (expected, v) if v.value_type() == expected => Ok(v),
            (expected, v) => Err(EvalError::ArgumentType {
                function: function.to_owned(),
                parameter: self.name.clone(),
                expected,
                actual: v.value_type(),
            }),
        }
    }
}

/// Signature of a callable function: name, parameters and return type.
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    name: String,
    return_type: ValueType,
    params: Vec<ParameterDescriptor>,
}

impl FunctionDescriptor {
    #[must_use]
    pub fn new(name: &str, return_type: ValueType) -> Self {
        Self {
            name: name.to_owned(),
            return_type,
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParameterDescriptor) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn return_type(&self) -> ValueType {
        self.return_type
    }

    #[must_use]
    pub fn params(&self) -> &[ParameterDescriptor] {
        &self.params
    }

    #[must_use]
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    #[must_use]
    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| !p.optional).count()
    }

    #[must_use]
    pub fn has_optional_params(&self) -> bool {
        self.params.iter().any(|p| p.optional)
    }
}

impl fmt::Display for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", p.name, p.ty)?;
            if p.optional {
                f.write_str("?")?;
            }
        }
        write!(f, ") -> {}", self.return_type)
    }
}

/// A callable registered in a [`FunctionRegistry`](super::FunctionRegistry).
///
/// Implementations must be stateless or internally synchronized: one instance
/// is shared by every rule and every thread.
pub trait Function: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &FunctionDescriptor;

    /// Run the function on already-bound arguments.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] when the function cannot produce a result.
    fn evaluate(
        &self,
        args: &FunctionArgs<'_>,
        ctx: &mut EvaluationContext<'_>,
    ) -> Result<Option<Value>, EvalError>;
}

/// Bound argument values, one slot per declared parameter in declaration order.
#[derive(Debug)]
pub struct FunctionArgs<'a> {
    descriptor: &'a FunctionDescriptor,
    values: Vec<Option<Value>>,
}

impl<'a> FunctionArgs<'a> {
    pub(crate) fn new(descriptor: &'a FunctionDescriptor, values: Vec<Option<Value>>) -> Self {
        Self { descriptor, values }
    }

    /// Value of a parameter, `None` when omitted and without default.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.descriptor.param_index(name)?;
        self.values.get(idx).and_then(Option::as_ref)
    }

    /// # Errors
    ///
    /// Returns [`EvalError::MissingParameter`] when the parameter has no value.
    pub fn required(&self, name: &str) -> Result<&Value, EvalError> {
        self.get(name).ok_or_else(|| EvalError::MissingParameter {
            function: self.descriptor.name.clone(),
            parameter: name.to_owned(),
        })
    }

    /// # Errors
    ///
    /// Missing parameter or a non-string value.
    pub fn required_str(&self, name: &str) -> Result<&str, EvalError> {
        let value = self.required(name)?;
        value.as_str().ok_or_else(|| self.wrong_type(name, ValueType::String, value))
    }

    /// # Errors
    ///
    /// Missing parameter or a non-long value.
    pub fn required_long(&self, name: &str) -> Result<i64, EvalError> {
        let value = self.required(name)?;
        value.as_long().ok_or_else(|| self.wrong_type(name, ValueType::Long, value))
    }

    /// # Errors
    ///
    /// A present value that is not a string.
    pub fn optional_str(&self, name: &str) -> Result<Option<&str>, EvalError> {
        self.get(name)
            .map(|v| v.as_str().ok_or_else(|| self.wrong_type(name, ValueType::String, v)))
            .transpose()
    }

    /// # Errors
    ///
    /// A present value that is not a long.
    pub fn optional_long(&self, name: &str) -> Result<Option<i64>, EvalError> {
        self.get(name)
            .map(|v| v.as_long().ok_or_else(|| self.wrong_type(name, ValueType::Long, v)))
            .transpose()
    }

    /// # Errors
    ///
    /// A present value that is not a bool.
    pub fn optional_bool(&self, name: &str) -> Result<Option<bool>, EvalError> {
        self.get(name)
            .map(|v| v.as_bool().ok_or_else(|| self.wrong_type(name, ValueType::Bool, v)))
            .transpose()
    }

    fn wrong_type(&self, name: &str, expected: ValueType, actual: &Value) -> EvalError {
        EvalError::ArgumentType {
            function: self.descriptor.name.clone(),
            parameter: name.to_owned(),
            expected,
            actual: actual.value_type(),
        }
    }
}
