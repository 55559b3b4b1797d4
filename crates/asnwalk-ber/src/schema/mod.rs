//! Compiled ASN.1 grammar modules.
//!
//! A [`Module`] is an immutable arena of schema nodes, shared freely
//! between threads. Decoding never touches it; every run expands the
//! entry point into its own [`ValueTree`].

mod builder;

pub use builder::{ModuleBuilder, TagMode, TypeDef};

use std::io::Write;

use asnwalk_types::{BerError, NodeType, TagClass};
use tracing::debug;

use crate::tree::{ValueNode, ValueTree};

/// Expansion deeper than this is treated as a runaway recursive type.
const MAX_EXPAND_DEPTH: usize = 1000;
/// Longest chain of `Foo ::= Bar` references followed.
const MAX_REFERENCE_CHAIN: usize = 20;

/// Attribute bits carried by schema and value nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFlags {
    /// Class of a TAG node.
    pub class: TagClass,
    pub optional: bool,
    pub has_default: bool,
    /// Tagging mode of a TAG node.
    pub explicit: bool,
    /// The enclosing TAG is implicit; this node has no header of its own.
    pub is_implicit: bool,
    pub in_choice: bool,
    pub in_array: bool,
}

/// Literal payload of a schema node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodeValue {
    #[default]
    None,
    /// Tag number of a TAG node.
    TagNumber(u64),
    /// DEFAULT value, SIZE constraint or referenced type name.
    Text(String),
}

/// One element of a compiled grammar.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub(crate) name: Option<String>,
    pub(crate) ty: NodeType,
    pub(crate) flags: NodeFlags,
    pub(crate) value: NodeValue,
    pub(crate) children: Vec<usize>,
}

impl SchemaNode {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn node_type(&self) -> NodeType {
        self.ty
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn value(&self) -> &NodeValue {
        &self.value
    }
}

/// A compiled grammar module.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) name: String,
    pub(crate) nodes: Vec<SchemaNode>,
    pub(crate) assignments: Vec<(String, usize)>,
}

impl Module {
    /// Start building a module called `name`.
    pub fn builder(name: &str) -> ModuleBuilder {
        ModuleBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the type assignments in declaration order.
    pub fn assignments(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|(name, _)| name.as_str())
    }

    fn assignment(&self, name: &str) -> Option<usize> {
        self.assignments
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, idx)| idx)
    }

    /// Follow IDENTIFIER references until a concrete type is reached.
    fn resolve(&self, mut idx: usize) -> Result<usize, BerError> {
        for _ in 0..MAX_REFERENCE_CHAIN {
            let node = &self.nodes[idx];
            if node.ty != NodeType::Identifier {
                return Ok(idx);
            }
            let target = match &node.value {
                NodeValue::Text(target) => target,
                _ => return Err(BerError::InvalidSchema("reference without target".into())),
            };
            idx = self
                .assignment(target)
                .ok_or_else(|| BerError::UnresolvedIdentifier(target.clone()))?;
        }
        Err(BerError::InvalidSchema("reference chain too long".into()))
    }

    /// Look up a node by dotted path, e.g. `Certificate.tbsCertificate.version`.
    ///
    /// The module name may prefix the path. References are followed, and a
    /// TAG node is looked through to the type it tags.
    pub fn find(&self, path: &str) -> Result<&SchemaNode, BerError> {
        self.find_index(path).map(|idx| &self.nodes[idx])
    }

    fn find_index(&self, path: &str) -> Result<usize, BerError> {
        let not_found = || BerError::ElementNotFound(path.to_string());
        let mut parts = path.split('.').peekable();
        if parts.peek() == Some(&self.name.as_str()) {
            parts.next();
        }
        let first = parts.next().ok_or_else(not_found)?;
        let mut idx = self.assignment(first).ok_or_else(not_found)?;

        for part in parts {
            let mut container = self.resolve(idx)?;
            if self.nodes[container].ty == NodeType::Tag {
                let inner = self.nodes[container]
                    .children
                    .iter()
                    .copied()
                    .find(|&c| self.nodes[c].ty != NodeType::Default)
                    .ok_or_else(not_found)?;
                container = self.resolve(inner)?;
            }
            idx = self.nodes[container]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].name.as_deref() == Some(part))
                .ok_or_else(not_found)?;
        }
        Ok(idx)
    }

    /// Expand the type at `entry` into a fresh value tree.
    pub fn expand(&self, entry: &str) -> Result<ValueTree, BerError> {
        let idx = self.find_index(entry)?;
        let mut tree = ValueTree::empty();
        self.expand_into(&mut tree, idx, None, 0)?;
        debug!(module = %self.name, entry, nodes = tree.len(), "expanded schema");
        Ok(tree)
    }

    fn expand_into(
        &self,
        tree: &mut ValueTree,
        idx: usize,
        parent: Option<crate::tree::NodeId>,
        depth: usize,
    ) -> Result<(), BerError> {
        if depth > MAX_EXPAND_DEPTH {
            return Err(BerError::InvalidSchema("schema tree too deep".into()));
        }
        let src = &self.nodes[idx];
        if src.ty != NodeType::Identifier {
            let id = tree.append(ValueNode::from_schema(src), parent);
            for &child in &src.children {
                self.expand_into(tree, child, Some(id), depth + 1)?;
            }
            return Ok(());
        }

        let target_idx = self.resolve(idx)?;
        let target = &self.nodes[target_idx];
        let mut node = ValueNode::from_schema(target);
        node.name = src.name.clone();
        node.flags.optional |= src.flags.optional;
        node.flags.has_default |= src.flags.has_default;
        node.flags.in_choice |= src.flags.in_choice;
        node.flags.in_array |= src.flags.in_array;
        if !matches!(target.ty, NodeType::Choice | NodeType::Tag) {
            node.flags.is_implicit |= src.flags.is_implicit;
        }
        let id = tree.append(node, parent);
        // DEFAULT and SIZE attached to the reference come first.
        for &child in src.children.iter().chain(&target.children) {
            self.expand_into(tree, child, Some(id), depth + 1)?;
        }
        Ok(())
    }

    /// Print the expanded tree for `entry`.
    pub fn dump_tree<W: Write + ?Sized>(&self, entry: &str, sink: &mut W) -> Result<(), BerError> {
        self.expand(entry)?.dump(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn algorithm_module() -> Module {
        Module::builder("Demo")
            .define(
                "AlgorithmIdentifier",
                TypeDef::sequence([
                    TypeDef::object_identifier().named("algorithm"),
                    TypeDef::any().named("parameters").optional(),
                ]),
            )
            .define(
                "Signed",
                TypeDef::sequence([
                    TypeDef::integer()
                        .named("version")
                        .explicit(0)
                        .default("0"),
                    TypeDef::reference("AlgorithmIdentifier").named("algorithm"),
                    TypeDef::sequence_of(TypeDef::reference("AlgorithmIdentifier"))
                        .named("extra")
                        .implicit(1)
                        .optional(),
                ]),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_find_paths() {
        let m = algorithm_module();
        assert_eq!(m.find("Signed").unwrap().node_type(), NodeType::Sequence);
        assert_eq!(m.find("Demo.Signed").unwrap().node_type(), NodeType::Sequence);

        let version = m.find("Signed.version").unwrap();
        assert_eq!(version.node_type(), NodeType::Tag);
        assert!(version.flags().has_default);
        assert!(version.flags().explicit);

        let params = m.find("Signed.algorithm.parameters").unwrap();
        assert_eq!(params.node_type(), NodeType::Any);
        assert!(params.flags().optional);

        assert!(matches!(
            m.find("Signed.nothing"),
            Err(BerError::ElementNotFound(_))
        ));
        assert!(m.find("Missing").is_err());
    }

    #[test]
    fn test_expand_resolves_references() {
        let m = algorithm_module();
        let tree = m.expand("Signed").unwrap();
        let alg = tree.find("Signed.algorithm").unwrap();
        let node = tree.node(alg);
        assert_eq!(node.node_type(), NodeType::Sequence);
        assert_eq!(node.name(), Some("algorithm"));
        assert_eq!(tree.children(alg).count(), 2);

        let extra = tree.find("Signed.extra").unwrap();
        assert_eq!(tree.node(extra).node_type(), NodeType::Tag);
        let seq_of = tree.first_child(extra).unwrap();
        assert!(tree.node(seq_of).flags().is_implicit);
        let elem = tree.first_child(seq_of).unwrap();
        assert!(tree.node(elem).flags().in_array);
        assert_eq!(tree.node(elem).node_type(), NodeType::Sequence);
    }

    #[test]
    fn test_expand_is_independent() {
        let m = algorithm_module();
        let mut a = m.expand("AlgorithmIdentifier").unwrap();
        let b = m.expand("AlgorithmIdentifier").unwrap();
        let alg = a.find("AlgorithmIdentifier.algorithm").unwrap();
        a.insert_copy(alg);
        assert_eq!(a.len(), b.len() + 1);
    }

    #[test]
    fn test_recursive_type_rejected() {
        let m = Module::builder("Loop")
            .define(
                "Node",
                TypeDef::sequence([
                    TypeDef::integer().named("value"),
                    TypeDef::reference("Node").named("next").optional(),
                ]),
            )
            .build()
            .unwrap();
        assert!(matches!(m.expand("Node"), Err(BerError::InvalidSchema(_))));
    }

    #[test]
    fn test_dump_tree() {
        let m = algorithm_module();
        let mut out = Vec::new();
        m.dump_tree("AlgorithmIdentifier", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("AlgorithmIdentifier SEQUENCE"));
        assert!(lines[1].starts_with("  algorithm OBJECT IDENTIFIER"));
        assert!(lines[2].contains("optional"));
    }
}
