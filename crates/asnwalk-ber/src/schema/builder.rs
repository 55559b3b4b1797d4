//! Declarative construction of grammar modules.

use std::collections::HashSet;

use asnwalk_types::{BerError, NodeType, TagClass};

use super::{Module, NodeFlags, NodeValue, SchemaNode};

/// Tagging mode of a tagged type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    Explicit,
    Implicit,
    /// Whatever the module declares as its default.
    Module,
}

/// Description of one grammar element, lowered into schema nodes by
/// [`ModuleBuilder::build`].
#[derive(Debug, Clone)]
pub struct TypeDef {
    name: Option<String>,
    ty: NodeType,
    reference: Option<String>,
    optional: bool,
    default: Option<String>,
    size: Option<String>,
    tag: Option<(TagClass, u64, TagMode)>,
    children: Vec<TypeDef>,
}

impl TypeDef {
    pub fn new(ty: NodeType) -> Self {
        Self {
            name: None,
            ty,
            reference: None,
            optional: false,
            default: None,
            size: None,
            tag: None,
            children: Vec::new(),
        }
    }

    fn composite(ty: NodeType, children: impl IntoIterator<Item = TypeDef>) -> Self {
        Self {
            children: children.into_iter().collect(),
            ..Self::new(ty)
        }
    }

    pub fn boolean() -> Self {
        Self::new(NodeType::Boolean)
    }

    pub fn integer() -> Self {
        Self::new(NodeType::Integer)
    }

    pub fn bit_string() -> Self {
        Self::new(NodeType::BitString)
    }

    pub fn octet_string() -> Self {
        Self::new(NodeType::OctetString)
    }

    pub fn null() -> Self {
        Self::new(NodeType::Null)
    }

    pub fn object_identifier() -> Self {
        Self::new(NodeType::ObjectId)
    }

    pub fn enumerated() -> Self {
        Self::new(NodeType::Enumerated)
    }

    pub fn utf8_string() -> Self {
        Self::new(NodeType::Utf8String)
    }

    pub fn printable_string() -> Self {
        Self::new(NodeType::PrintableString)
    }

    pub fn ia5_string() -> Self {
        Self::new(NodeType::Ia5String)
    }

    pub fn utc_time() -> Self {
        Self::new(NodeType::UtcTime)
    }

    pub fn generalized_time() -> Self {
        Self::new(NodeType::GeneralizedTime)
    }

    /// Open type.
    pub fn any() -> Self {
        Self::new(NodeType::Any)
    }

    pub fn sequence(fields: impl IntoIterator<Item = TypeDef>) -> Self {
        Self::composite(NodeType::Sequence, fields)
    }

    pub fn set(fields: impl IntoIterator<Item = TypeDef>) -> Self {
        Self::composite(NodeType::Set, fields)
    }

    pub fn sequence_of(element: TypeDef) -> Self {
        Self::composite(NodeType::SequenceOf, [element])
    }

    pub fn set_of(element: TypeDef) -> Self {
        Self::composite(NodeType::SetOf, [element])
    }

    pub fn choice(alternatives: impl IntoIterator<Item = TypeDef>) -> Self {
        Self::composite(NodeType::Choice, alternatives)
    }

    /// Reference to another type assignment of the same module.
    pub fn reference(type_name: &str) -> Self {
        Self {
            reference: Some(type_name.to_string()),
            ..Self::new(NodeType::Identifier)
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Default value, kept as its ASN.1 value notation.
    pub fn default(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    /// SIZE constraint, kept as text; the decoder only steps over it.
    pub fn size(mut self, constraint: &str) -> Self {
        self.size = Some(constraint.to_string());
        self
    }

    /// `[number] EXPLICIT`, context class.
    pub fn explicit(self, number: u64) -> Self {
        self.tagged(TagClass::ContextSpecific, number, TagMode::Explicit)
    }

    /// `[number] IMPLICIT`, context class.
    pub fn implicit(self, number: u64) -> Self {
        self.tagged(TagClass::ContextSpecific, number, TagMode::Implicit)
    }

    pub fn tagged(mut self, class: TagClass, number: u64, mode: TagMode) -> Self {
        self.tag = Some((class, number, mode));
        self
    }
}

/// Builder for [`Module`].
#[derive(Debug)]
pub struct ModuleBuilder {
    name: String,
    implicit_tags: bool,
    definitions: Vec<(String, TypeDef)>,
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            implicit_tags: false,
            definitions: Vec::new(),
        }
    }

    /// `DEFINITIONS IMPLICIT TAGS`: untagged-mode tags become implicit.
    pub fn implicit_tags(mut self) -> Self {
        self.implicit_tags = true;
        self
    }

    /// Add the type assignment `name ::= def`.
    pub fn define(mut self, name: &str, def: TypeDef) -> Self {
        self.definitions.push((name.to_string(), def));
        self
    }

    pub fn build(self) -> Result<Module, BerError> {
        if self.name.is_empty() {
            return Err(BerError::InvalidSchema("module without a name".into()));
        }
        let mut lowering = Lowering {
            nodes: Vec::new(),
            implicit_tags: self.implicit_tags,
        };
        let mut seen = HashSet::new();
        let mut assignments = Vec::with_capacity(self.definitions.len());
        for (name, def) in &self.definitions {
            if name.is_empty() || name.contains('.') {
                return Err(BerError::InvalidSchema(format!("bad type name '{name}'")));
            }
            if !seen.insert(name.as_str()) {
                return Err(BerError::InvalidSchema(format!("duplicate type '{name}'")));
            }
            let idx = lowering.lower(def)?;
            lowering.nodes[idx].name = Some(name.clone());
            assignments.push((name.clone(), idx));
        }

        for node in &lowering.nodes {
            if let (NodeType::Identifier, NodeValue::Text(target)) = (node.ty, &node.value) {
                if !seen.contains(target.as_str()) {
                    return Err(BerError::UnresolvedIdentifier(target.clone()));
                }
            }
        }

        Ok(Module {
            name: self.name,
            nodes: lowering.nodes,
            assignments,
        })
    }
}

struct Lowering {
    nodes: Vec<SchemaNode>,
    implicit_tags: bool,
}

impl Lowering {
    fn push(&mut self, ty: NodeType, value: NodeValue) -> usize {
        self.nodes.push(SchemaNode {
            name: None,
            ty,
            flags: NodeFlags::default(),
            value,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn lower(&mut self, def: &TypeDef) -> Result<usize, BerError> {
        let label = || def.name.clone().unwrap_or_else(|| def.ty.name().to_string());
        match def.ty {
            NodeType::SequenceOf | NodeType::SetOf if def.children.len() != 1 => {
                return Err(BerError::InvalidSchema(format!(
                    "{} needs exactly one element type",
                    label()
                )));
            }
            NodeType::Choice if def.children.is_empty() => {
                return Err(BerError::InvalidSchema(format!(
                    "{} has no alternatives",
                    label()
                )));
            }
            NodeType::Tag | NodeType::Default | NodeType::Size => {
                return Err(BerError::InvalidSchema(format!(
                    "{} cannot be declared directly",
                    def.ty
                )));
            }
            _ => {}
        }

        let value = match &def.reference {
            Some(target) => NodeValue::Text(target.clone()),
            None => NodeValue::None,
        };
        let inner = self.push(def.ty, value);
        let mut inner_children = Vec::new();
        if let Some(size) = &def.size {
            inner_children.push(self.push(NodeType::Size, NodeValue::Text(size.clone())));
        }
        for child in &def.children {
            let idx = self.lower(child)?;
            match def.ty {
                NodeType::Choice => self.nodes[idx].flags.in_choice = true,
                NodeType::SequenceOf | NodeType::SetOf => self.nodes[idx].flags.in_array = true,
                _ => {}
            }
            inner_children.push(idx);
        }
        self.nodes[inner].children = inner_children;

        let default = def
            .default
            .as_ref()
            .map(|value| self.push(NodeType::Default, NodeValue::Text(value.clone())));

        let outer = match def.tag {
            Some((class, number, mode)) => {
                let explicit = match mode {
                    TagMode::Explicit => true,
                    TagMode::Implicit => false,
                    TagMode::Module => !self.implicit_tags,
                };
                if !explicit && !matches!(def.ty, NodeType::Choice) {
                    self.nodes[inner].flags.is_implicit = true;
                }
                let tag = self.push(NodeType::Tag, NodeValue::TagNumber(number));
                self.nodes[tag].flags.class = class;
                self.nodes[tag].flags.explicit = explicit;
                self.nodes[tag].children = default.into_iter().chain([inner]).collect();
                tag
            }
            None => {
                if let Some(default) = default {
                    self.nodes[inner].children.insert(0, default);
                }
                inner
            }
        };

        let node = &mut self.nodes[outer];
        node.name = def.name.clone();
        node.flags.optional = def.optional;
        node.flags.has_default = def.default.is_some();
        Ok(outer)
    }
}
