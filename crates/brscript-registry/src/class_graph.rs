//! Native class hierarchy.
//!
//! Uses `petgraph::DiGraph` with:
//! - Nodes: [`NativeClass`] (methods, properties, signals, enums, constants)
//! - Edges: [`ClassEdge::Inherits`] from a class to its parent

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;

use brscript_core::{MethodInfo, PropertyInfo};

use crate::{NativeMethodFn, RegistrationError};

/// Edge types in the class graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassEdge {
    /// Child class inherits from parent class.
    Inherits,
}

/// A native method with its optional implementation.
#[derive(Clone)]
pub struct NativeMethod {
    pub info: MethodInfo,
    pub implementation: Option<NativeMethodFn>,
}

impl std::fmt::Debug for NativeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeMethod")
            .field("info", &self.info)
            .field("implemented", &self.implementation.is_some())
            .finish()
    }
}

/// Data stored for one native class.
#[derive(Debug, Default)]
pub struct NativeClass {
    pub name: String,
    pub methods: FxHashMap<String, NativeMethod>,
    pub properties: FxHashMap<String, PropertyInfo>,
    pub signals: FxHashMap<String, MethodInfo>,
    /// Enum name to ordered values.
    pub enums: FxHashMap<String, Vec<(String, i64)>>,
    /// Integer constants, including enum values.
    pub constants: FxHashMap<String, i64>,
    /// Whether scripts may create instances of this class.
    pub instantiable: bool,
}

impl NativeClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instantiable: true,
            ..Default::default()
        }
    }
}

/// The class graph. Lookups walk the `Inherits` edges toward the root.
pub struct ClassGraph {
    graph: DiGraph<NativeClass, ClassEdge>,
    by_name: FxHashMap<String, NodeIndex>,
}

impl Default for ClassGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            by_name: FxHashMap::default(),
        }
    }

    /// Add a class under `parent`. The parent must already exist.
    pub fn add_class(
        &mut self,
        class: NativeClass,
        parent: Option<&str>,
    ) -> Result<NodeIndex, RegistrationError> {
        if self.by_name.contains_key(&class.name) {
            return Err(RegistrationError::DuplicateClass(class.name));
        }
        let parent_node = match parent {
            Some(parent) => Some(
                *self
                    .by_name
                    .get(parent)
                    .ok_or_else(|| RegistrationError::UnknownParent {
                        class: class.name.clone(),
                        parent: parent.to_string(),
                    })?,
            ),
            None => None,
        };

        let name = class.name.clone();
        let node = self.graph.add_node(class);
        if let Some(parent_node) = parent_node {
            self.graph.add_edge(node, parent_node, ClassEdge::Inherits);
        }
        self.by_name.insert(name, node);
        Ok(node)
    }

    pub fn node(&self, name: &str) -> Option<NodeIndex> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&NativeClass> {
        self.node(name).and_then(|node| self.graph.node_weight(node))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut NativeClass> {
        let node = self.node(name)?;
        self.graph.node_weight_mut(node)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Direct parent of a class.
    pub fn parent(&self, name: &str) -> Option<&str> {
        let node = self.node(name)?;
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .find(|edge| *edge.weight() == ClassEdge::Inherits)
            .and_then(|edge| self.graph.node_weight(edge.target()))
            .map(|class| class.name.as_str())
    }

    /// The class followed by its ancestors up to the root.
    pub fn ancestry(&self, name: &str) -> Vec<&NativeClass> {
        let mut chain = Vec::new();
        let mut current = self.node(name);
        while let Some(node) = current {
            let Some(class) = self.graph.node_weight(node) else {
                break;
            };
            chain.push(class);
            current = self
                .graph
                .edges_directed(node, Direction::Outgoing)
                .find(|edge| *edge.weight() == ClassEdge::Inherits)
                .map(|edge| edge.target());
        }
        chain
    }

    /// Whether `name` is `ancestor` or inherits from it.
    pub fn is_parent_class(&self, name: &str, ancestor: &str) -> bool {
        self.ancestry(name).iter().any(|class| class.name == ancestor)
    }

    /// Direct subclasses of a class.
    pub fn children(&self, name: &str) -> Vec<&str> {
        let Some(node) = self.node(name) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(node, Direction::Incoming)
            .filter_map(|edge| self.graph.node_weight(edge.source()))
            .map(|class| class.name.as_str())
            .collect()
    }

    /// Find the first class in the ancestry for which `f` returns a value.
    pub fn find_in_ancestry<'a, T>(
        &'a self,
        name: &str,
        f: impl Fn(&'a NativeClass) -> Option<T>,
    ) -> Option<T> {
        self.ancestry(name).into_iter().find_map(f)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> ClassGraph {
        let mut graph = ClassGraph::new();
        graph.add_class(NativeClass::new("Object"), None).unwrap();
        graph
            .add_class(NativeClass::new("RefCounted"), Some("Object"))
            .unwrap();
        graph
            .add_class(NativeClass::new("Resource"), Some("RefCounted"))
            .unwrap();
        graph.add_class(NativeClass::new("Node"), Some("Object")).unwrap();
        graph
    }

    #[test]
    fn ancestry_walks_to_root() {
        let graph = graph();
        let names: Vec<_> = graph
            .ancestry("Resource")
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, vec!["Resource", "RefCounted", "Object"]);
        assert_eq!(graph.parent("Node"), Some("Object"));
        assert_eq!(graph.parent("Object"), None);
    }

    #[test]
    fn parent_class_queries() {
        let graph = graph();
        assert!(graph.is_parent_class("Resource", "Object"));
        assert!(graph.is_parent_class("Node", "Node"));
        assert!(!graph.is_parent_class("Node", "RefCounted"));
        let mut children = graph.children("Object");
        children.sort();
        assert_eq!(children, vec!["Node", "RefCounted"]);
    }

    #[test]
    fn rejects_unknown_parent_and_duplicates() {
        let mut graph = graph();
        assert!(matches!(
            graph.add_class(NativeClass::new("Sprite"), Some("Node2D")),
            Err(RegistrationError::UnknownParent { .. })
        ));
        assert!(matches!(
            graph.add_class(NativeClass::new("Node"), Some("Object")),
            Err(RegistrationError::DuplicateClass(_))
        ));
    }
}
