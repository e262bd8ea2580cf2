use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use super::error::{CheckError, DefinitionError};
use super::expr::{CallArgs, Expr};
use super::function::Function;

/// Name-indexed catalog of callable functions.
///
/// Immutable once built and shared behind `Arc` by the parser and every rule.
/// Function names are unique; registering a name twice is a startup error.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionRegistry {
    #[must_use]
    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::default()
    }

    /// A registry holding the built-in function set.
    #[must_use]
    pub fn with_builtins() -> Self {
        let functions = crate::functions::builtins()
            .into_iter()
            .map(|f| (f.descriptor().name().to_owned(), f))
            .collect();
        Self { functions }
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(name).cloned()
    }

    /// Build a checked function-call expression.
    ///
    /// # Errors
    ///
    /// Returns every [`CheckError`] found while binding the arguments, or
    /// [`CheckError::UndeclaredFunction`] for an unknown name.
    pub fn call(&self, name: &str, args: impl Into<CallArgs>) -> Result<Expr, Vec<CheckError>> {
        let function = self.lookup(name).ok_or_else(|| {
            vec![CheckError::UndeclaredFunction {
                name: name.to_owned(),
            }]
        })?;
        crate::check::bind_call(function, args.into()).map(Expr::Function)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered function names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Builder for [`FunctionRegistry`]; validates names and parameter lists.
#[derive(Debug, Default)]
#[must_use]
pub struct FunctionRegistryBuilder {
    functions: Vec<Arc<dyn Function>>,
}

impl FunctionRegistryBuilder {
    pub fn register(mut self, function: impl Function + 'static) -> Self {
        self.functions.push(Arc::new(function));
        self
    }

    pub fn register_arc(mut self, function: Arc<dyn Function>) -> Self {
        self.functions.push(function);
        self
    }

    /// Add the built-in function set.
    pub fn builtins(mut self) -> Self {
        self.functions.extend(crate::functions::builtins());
        self
    }

    /// # Errors
    ///
    /// Returns [`DefinitionError::DuplicateFunction`] when two functions share a
    /// name and [`DefinitionError::DuplicateParameter`] when a descriptor repeats
    /// a parameter name.
    pub fn build(self) -> Result<FunctionRegistry, DefinitionError> {
        let mut functions = HashMap::with_capacity(self.functions.len());
        for function in self.functions {
            let descriptor = function.descriptor();
            let mut seen = HashSet::new();
            for param in descriptor.params() {
                if !seen.insert(param.name()) {
                    return Err(DefinitionError::DuplicateParameter {
                        function: descriptor.name().to_owned(),
                        parameter: param.name().to_owned(),
                    });
                }
            }
            let name = descriptor.name().to_owned();
            if functions.contains_key(&name) {
                return Err(DefinitionError::DuplicateFunction { name });
            }
            functions.insert(name, function);
        }
        Ok(FunctionRegistry { functions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        EvalError, EvaluationContext, FunctionArgs, FunctionDescriptor, ParameterDescriptor,
        Value, ValueType,
    };

    #[derive(Debug)]
    struct Named(FunctionDescriptor);

    impl Function for Named {
        fn descriptor(&self) -> &FunctionDescriptor {
            &self.0
        }

        fn evaluate(
            &self,
            _args: &FunctionArgs<'_>,
            _ctx: &mut EvaluationContext<'_>,
        ) -> Result<Option<Value>, EvalError> {
            Ok(None)
        }
    }

    fn named(name: &str) -> Named {
        Named(FunctionDescriptor::new(name, ValueType::Any))
    }

    #[test]
    fn lookup_registered() {
        let registry = FunctionRegistry::builder()
            .register(named("a"))
            .register(named("b"))
            .build()
            .unwrap();
        assert!(registry.lookup("a").is_some());
        assert!(registry.lookup("c").is_none());
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_name_rejected() {
        let err = FunctionRegistry::builder()
            .register(named("a"))
            .register(named("a"))
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateFunction { name: "a".into() });
    }

    #[test]
    fn duplicate_parameter_rejected() {
        let f = Named(
            FunctionDescriptor::new("f", ValueType::Any)
                .param(ParameterDescriptor::required("x", ValueType::Any))
                .param(ParameterDescriptor::optional("x", ValueType::Any)),
        );
        let err = FunctionRegistry::builder().register(f).build().unwrap_err();
        assert_eq!(
            err,
            DefinitionError::DuplicateParameter {
                function: "f".into(),
                parameter: "x".into(),
            }
        );
    }

    #[test]
    fn call_unknown_function() {
        let registry = FunctionRegistry::builder().build().unwrap();
        let errs = registry.call("nope", CallArgs::none()).unwrap_err();
        assert_eq!(errs, vec![CheckError::UndeclaredFunction { name: "nope".into() }]);
    }

    #[test]
    fn builtins_pass_validation() {
        let registry = FunctionRegistry::builder().builtins().build().unwrap();
        assert_eq!(registry.len(), FunctionRegistry::with_builtins().len());
        let clash = FunctionRegistry::builder()
            .builtins()
            .register(named("concat"))
            .build();
        assert!(clash.is_err());
    }

    #[test]
    fn builtins_are_available() {
        let registry = FunctionRegistry::with_builtins();
        for name in ["has_field", "set_field", "substring", "grok", "concat"] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
    }
}
