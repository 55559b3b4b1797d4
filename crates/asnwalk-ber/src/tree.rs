//! Value trees: per-run copies of a schema subtree annotated with the
//! location of every matched value inside the decoded image.

use std::fmt;
use std::io::Write;

use asnwalk_types::{BerError, NodeType, TagClass};

use crate::schema::{NodeFlags, NodeValue, SchemaNode};

/// Index of a node inside its [`ValueTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which alternative of a CHOICE the decoder settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChoiceArm {
    /// Not evaluated yet.
    #[default]
    Pending,
    Taken(NodeId),
    /// No alternative matched.
    Declined,
}

/// One node of a value tree.
#[derive(Debug, Clone)]
pub struct ValueNode {
    pub(crate) name: Option<String>,
    pub(crate) ty: NodeType,
    pub(crate) flags: NodeFlags,
    pub(crate) value: NodeValue,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
    pub(crate) off: Option<usize>,
    pub(crate) nhdr: usize,
    pub(crate) len: usize,
    pub(crate) actual_tag: Option<(TagClass, u64)>,
    pub(crate) choice: ChoiceArm,
    pub(crate) defaulted: bool,
    pub(crate) content: Option<Vec<u8>>,
}

impl ValueNode {
    pub(crate) fn from_schema(src: &SchemaNode) -> Self {
        Self {
            name: src.name.clone(),
            ty: src.ty,
            flags: src.flags,
            value: src.value.clone(),
            parent: None,
            first_child: None,
            next_sibling: None,
            off: None,
            nhdr: 0,
            len: 0,
            actual_tag: None,
            choice: ChoiceArm::Pending,
            defaulted: false,
            content: None,
        }
    }

    /// Copy for a fresh repetition: structure kept, run state dropped.
    fn blank_copy(&self) -> Self {
        Self {
            parent: None,
            first_child: None,
            next_sibling: None,
            off: None,
            nhdr: 0,
            len: 0,
            actual_tag: None,
            choice: ChoiceArm::Pending,
            defaulted: false,
            content: None,
            ..self.clone()
        }
    }

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

    /// Tag number of a TAG node.
    pub fn tag_number(&self) -> Option<u64> {
        match self.value {
            NodeValue::TagNumber(n) => Some(n),
            _ => None,
        }
    }

    /// Offset of the value's header within the image, if it was matched.
    pub fn off(&self) -> Option<usize> {
        self.off
    }

    pub fn nhdr(&self) -> usize {
        self.nhdr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Class and number of the TLV an ANY node matched.
    pub fn actual_tag(&self) -> Option<(TagClass, u64)> {
        self.actual_tag
    }

    /// The value was absent and its DEFAULT applies.
    pub fn is_defaulted(&self) -> bool {
        self.defaulted
    }

    /// Content stored for encoding.
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }
}

impl fmt::Display for ValueNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_deref().unwrap_or("-"))?;
        write!(f, " {}", self.ty)?;
        match &self.value {
            NodeValue::TagNumber(n) => write!(f, " [{} {n}]", self.flags.class)?,
            NodeValue::Text(text) => write!(f, " val={text}")?,
            NodeValue::None => {}
        }
        if let Some((class, tag)) = self.actual_tag {
            write!(f, " actual=[{class} {tag}]")?;
        }
        let flags = [
            (self.ty == NodeType::Tag && self.flags.explicit, "explicit"),
            (self.ty == NodeType::Tag && !self.flags.explicit, "implicit"),
            (self.flags.is_implicit, "is_implicit"),
            (self.flags.optional, "optional"),
            (self.flags.has_default, "default"),
            (self.flags.in_choice, "in_choice"),
            (self.flags.in_array, "in_array"),
            (self.defaulted, "defaulted"),
        ];
        let mut sep = ' ';
        for (_, label) in flags.iter().filter(|(set, _)| *set) {
            write!(f, "{sep}{label}")?;
            sep = ',';
        }
        if let Some(off) = self.off {
            write!(f, " {off}.{}.{}", self.nhdr, self.len)?;
        }
        Ok(())
    }
}

/// Arena-backed value tree.
#[derive(Debug, Clone)]
pub struct ValueTree {
    nodes: Vec<ValueNode>,
}

impl ValueTree {
    pub(crate) fn empty() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Append `node` as the last child of `parent`, or as the root.
    pub(crate) fn append(&mut self, mut node: ValueNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = parent;
        node.first_child = None;
        node.next_sibling = None;
        self.nodes.push(node);
        if let Some(parent) = parent {
            match self.last_child(parent) {
                Some(last) => self.nodes[last.0].next_sibling = Some(id),
                None => self.nodes[parent.0].first_child = Some(id),
            }
        }
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &ValueNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut ValueNode {
        &mut self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].first_child
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].next_sibling
    }

    fn last_child(&self, id: NodeId) -> Option<NodeId> {
        let mut child = self.first_child(id)?;
        while let Some(next) = self.next_sibling(child) {
            child = next;
        }
        Some(child)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.first_child(id), move |&c| self.next_sibling(c))
    }

    /// Preorder successor of `id`, staying below the root.
    pub fn walk(&self, id: NodeId) -> Option<NodeId> {
        self.walk_within(self.root(), id)
    }

    /// All nodes in preorder, starting at the root.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        let start = (!self.is_empty()).then(|| self.root());
        std::iter::successors(start, move |&id| self.walk(id))
    }

    /// Number of levels between `id` and the root.
    pub fn depth(&self, id: NodeId) -> usize {
        std::iter::successors(self.parent(id), |&p| self.parent(p)).count()
    }

    /// Clone the subtree at `id` and link the copy in as its right sibling.
    /// The copy starts without annotations or CHOICE decisions.
    pub fn insert_copy(&mut self, id: NodeId) -> NodeId {
        let parent = self.parent(id);
        let copy = self.copy_subtree(id, parent);
        self.nodes[copy.0].next_sibling = self.nodes[id.0].next_sibling;
        self.nodes[id.0].next_sibling = Some(copy);
        copy
    }

    fn copy_subtree(&mut self, src: NodeId, parent: Option<NodeId>) -> NodeId {
        let mut node = self.nodes[src.0].blank_copy();
        node.parent = parent;
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);

        let mut prev: Option<NodeId> = None;
        let mut child = self.first_child(src);
        while let Some(c) = child {
            let copied = self.copy_subtree(c, Some(id));
            match prev {
                Some(p) => self.nodes[p.0].next_sibling = Some(copied),
                None => self.nodes[id.0].first_child = Some(copied),
            }
            prev = Some(copied);
            child = self.next_sibling(c);
        }
        id
    }

    /// Find a node by dotted path starting with the root's name.
    ///
    /// `?LAST` selects the last sibling at that level; an empty component
    /// steps into the first child without comparing names.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let mut parts = path.split('.');
        let root = self.root();
        if self.is_empty() || parts.next()? != self.node(root).name()? {
            return None;
        }
        let mut node = root;
        for part in parts {
            let first = self.first_child(node)?;
            node = match part {
                "?LAST" => self.last_child(node)?,
                "" => first,
                _ => self.children(node).find(|&c| self.node(c).name() == Some(part))?,
            };
        }
        Some(node)
    }

    /// Dotted name of `id`; unnamed levels show their type.
    pub fn path(&self, id: NodeId) -> String {
        let mut parts: Vec<String> = std::iter::successors(Some(id), |&n| self.parent(n))
            .map(|n| {
                let node = self.node(n);
                node.name()
                    .map_or_else(|| node.ty.name().to_string(), str::to_string)
            })
            .collect();
        parts.reverse();
        parts.join(".")
    }

    /// Walk the subtree at `start` for SEQUENCEs whose first child is an
    /// OBJECT IDENTIFIER with content `oid`; return the right sibling of
    /// that OID in the `idx`-th such SEQUENCE.
    pub fn find_type_value(
        &self,
        image: &[u8],
        start: NodeId,
        mut idx: usize,
        oid: &[u8],
    ) -> Option<NodeId> {
        let mut node = Some(start);
        while let Some(n) = node {
            if self.node(n).ty == NodeType::Sequence {
                if let Some(first) = self.first_child(n) {
                    let child = self.node(first);
                    if child.ty == NodeType::ObjectId && self.content(image, first) == Some(oid) {
                        if idx == 0 {
                            return self.next_sibling(first);
                        }
                        idx -= 1;
                    }
                }
            }
            node = self.walk_within(start, n);
        }
        None
    }

    fn walk_within(&self, top: NodeId, id: NodeId) -> Option<NodeId> {
        if let Some(child) = self.first_child(id) {
            return Some(child);
        }
        let mut node = id;
        loop {
            if node == top {
                return None;
            }
            if let Some(next) = self.next_sibling(node) {
                return Some(next);
            }
            node = self.parent(node)?;
        }
    }

    /// A CHOICE has no header of its own; its value is the chosen arm's.
    fn settled(&self, mut id: NodeId) -> NodeId {
        while let Some(alt) = self.chosen_alternative(id) {
            id = alt;
        }
        id
    }

    /// The complete TLV bytes of a matched node.
    pub fn raw<'i>(&self, image: &'i [u8], id: NodeId) -> Option<&'i [u8]> {
        let node = self.node(self.settled(id));
        let start = node.off?;
        image.get(start..start.checked_add(node.nhdr)?.checked_add(node.len)?)
    }

    /// The content octets of a matched node.
    pub fn content<'i>(&self, image: &'i [u8], id: NodeId) -> Option<&'i [u8]> {
        let node = self.node(self.settled(id));
        let start = node.off?.checked_add(node.nhdr)?;
        image.get(start..start.checked_add(node.len)?)
    }

    /// The alternative a CHOICE node settled on.
    pub fn chosen_alternative(&self, choice: NodeId) -> Option<NodeId> {
        match self.node(choice).choice {
            ChoiceArm::Taken(alt) => Some(alt),
            _ => None,
        }
    }

    /// A CHOICE alternative that lost the selection.
    pub(crate) fn is_skipped(&self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        let parent = self.node(parent);
        if parent.ty != NodeType::Choice {
            return false;
        }
        match parent.choice {
            ChoiceArm::Pending => false,
            ChoiceArm::Taken(alt) => alt != id,
            ChoiceArm::Declined => true,
        }
    }

    /// Store content for [`crate::der::encode_tree`].
    pub fn set_content(&mut self, id: NodeId, content: &[u8]) {
        self.nodes[id.0].content = Some(content.to_vec());
    }

    /// Give every matched ANY node the type it actually carried.
    pub fn fixup_any(&mut self) {
        for node in &mut self.nodes {
            if node.ty != NodeType::Any || node.off.is_none() {
                continue;
            }
            if let Some((TagClass::Universal, tag)) = node.actual_tag {
                if let Some(ty) = NodeType::from_universal(tag) {
                    node.ty = ty;
                }
            }
        }
    }

    /// Print one line per node, indented by depth.
    pub fn dump<W: Write + ?Sized>(&self, sink: &mut W) -> Result<(), BerError> {
        for id in self.iter() {
            let indent = self.depth(id) * 2;
            writeln!(sink, "{:indent$}{}", "", self.node(id))?;
        }
        Ok(())
    }
}
