use std::collections::HashMap;

/// Maps variable names bound by `let` statements to flat slot indices.
///
/// Built while compiling a rule into its generated form. Each invocation of
/// that rule owns a `Vec<Option<Value>>` of this length.
#[derive(Debug, Clone, Default)]
pub(crate) struct VarSlots {
    names: HashMap<String, usize>,
    len: usize,
}

impl VarSlots {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a variable, returning its slot. Repeated names share a slot.
    pub(crate) fn register(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.names.get(name) {
            return idx;
        }
        let idx = self.len;
        self.names.insert(name.to_owned(), idx);
        self.len += 1;
        idx
    }

    pub(crate) fn get(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
