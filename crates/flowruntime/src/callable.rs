use crate::control::{CallableRole, ControlActor};
use crate::tree::{role_shape, ActorTree, InputMode, NodeId};
use flowcore::SetupError;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Name lookup for the children of every `standalone.callable_actors` container
#[derive(Debug, Default)]
pub struct CallableActorRegistry {
    containers: HashMap<NodeId, HashMap<String, NodeId>>,
}

impl CallableActorRegistry {
    pub fn build(tree: &ActorTree) -> Self {
        let mut containers = HashMap::new();
        for id in tree.pre_order() {
            let node = tree.node(id);
            if let Some(ControlActor::CallableActors) = node.control() {
                let entries = node
                    .children()
                    .iter()
                    .map(|&child| (tree.node(child).name().to_string(), child))
                    .collect();
                containers.insert(id, entries);
            }
        }
        Self { containers }
    }

    /// Walks outwards from `from`, the nearest enclosing container wins
    pub fn resolve(&self, tree: &ActorTree, from: NodeId, name: &str) -> Option<NodeId> {
        for scope in tree.ancestors(from) {
            for child in tree.node(scope).children() {
                let found = self
                    .containers
                    .get(child)
                    .and_then(|entries| entries.get(name));
                if let Some(&target) = found {
                    return Some(target);
                }
            }
        }
        None
    }

    /// Resolves every callable reference of the tree.
    ///
    /// Returns `(reference, target)` pairs; fails on unknown names,
    /// incompatible targets and references that end up calling themselves.
    pub fn resolve_all(&self, tree: &ActorTree) -> Result<Vec<(NodeId, NodeId)>, SetupError> {
        let mut resolved = Vec::new();
        for id in tree.pre_order() {
            let node = tree.node(id);
            let (role, reference) = match node.control() {
                Some(ControlActor::Callable {
                    role, reference, ..
                }) => (*role, reference),
                _ => continue,
            };

            let target = self
                .resolve(tree, id, reference)
                .ok_or_else(|| SetupError::UnresolvedCallable {
                    actor: node.path().to_string(),
                    name: reference.clone(),
                })?;
            check_role(tree, id, role, target)?;
            resolved.push((id, target));
        }

        check_recursion(tree, &resolved)?;
        Ok(resolved)
    }
}

fn check_role(
    tree: &ActorTree,
    reference: NodeId,
    role: CallableRole,
    target: NodeId,
) -> Result<(), SetupError> {
    let shape = tree.node(target).shape();
    let expected = role_shape(role);
    let compatible = match role {
        CallableRole::Source => shape.output && shape.input != InputMode::Required,
        CallableRole::Transformer => shape.output && shape.input != InputMode::None,
        CallableRole::Sink => shape.input != InputMode::None,
    };
    if compatible {
        Ok(())
    } else {
        Err(SetupError::InvalidStructure {
            actor: tree.node(reference).path().to_string(),
            reason: format!(
                "callable '{}' does not fit here (needs input: {:?}, output: {})",
                tree.node(target).name(),
                expected.input,
                expected.output
            ),
        })
    }
}

/// Fails if following references from inside a callable target can lead back to it
fn check_recursion(tree: &ActorTree, resolved: &[(NodeId, NodeId)]) -> Result<(), SetupError> {
    let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
    let mut indices: HashMap<NodeId, NodeIndex> = HashMap::new();

    for &(_, target) in resolved {
        indices
            .entry(target)
            .or_insert_with(|| graph.add_node(target));
    }

    for &(reference, target) in resolved {
        let callee = indices[&target];
        // the target itself may contain the reference
        let callers = std::iter::once(reference)
            .chain(tree.ancestors(reference))
            .filter_map(|id| indices.get(&id).copied());
        for caller in callers.collect::<Vec<_>>() {
            graph.add_edge(caller, callee, ());
        }
    }

    toposort(&graph, None).map(|_| ()).map_err(|cycle| {
        let node = graph[cycle.node_id()];
        SetupError::RecursiveCallable(tree.node(node).name().to_string())
    })
}
