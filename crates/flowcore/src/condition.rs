use crate::storage::{StorageName, StorageTable};
use crate::variables::{ScopeId, VariableScopes};
use crate::{ExecutionError, Token};

/// Boolean test consulted by branching control actors (if-then-else, switch, count)
pub trait Condition: Send {
    /// Unique type identifier (e.g., "counting", "variable_equals")
    fn condition_type(&self) -> &str;

    /// Evaluates against the current variables, storage and token
    fn evaluate(
        &mut self,
        ctx: &ConditionContext<'_>,
        token: Option<&Token>,
    ) -> Result<bool, ExecutionError>;

    /// Optional: clear internal state when the owning scope restarts
    fn reset(&mut self) {}
}

/// Read-only view of flow state handed to conditions
pub struct ConditionContext<'a> {
    scope: ScopeId,
    variables: &'a VariableScopes,
    storage: &'a StorageTable,
}

impl<'a> ConditionContext<'a> {
    pub fn new(scope: ScopeId, variables: &'a VariableScopes, storage: &'a StorageTable) -> Self {
        Self {
            scope,
            variables,
            storage,
        }
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(self.scope, name)
    }

    pub fn expand(&self, template: &str) -> Result<String, ExecutionError> {
        self.variables.expand(self.scope, template)
    }

    pub fn has_storage(&self, name: &StorageName) -> bool {
        self.storage.has(name)
    }

    pub fn storage(&self) -> &StorageTable {
        self.storage
    }
}
