//! DER encoding of a value tree.
//!
//! Values are attached with [`ValueTree::set_content`]; the encoder sizes
//! every node first and then writes headers and content in one sweep.

use asnwalk_types::{tags, BerError, NodeType, TagClass};
use tracing::debug;

use crate::tlv::{count_tl, encode_tl, parse_tl, MAX_HEADER_LEN};
use crate::tree::{NodeId, ValueTree};

/// Size of one encoded node. A node without an extent is omitted.
#[derive(Debug, Clone, Copy)]
struct Extent {
    nhdr: usize,
    len: usize,
    constructed: bool,
}

impl Extent {
    fn total(self) -> usize {
        self.nhdr + self.len
    }
}

/// Encode `tree` and annotate it so that [`ValueTree::raw`] and
/// [`ValueTree::content`] work on the returned image.
pub fn encode_tree(tree: &mut ValueTree) -> Result<Vec<u8>, BerError> {
    if tree.is_empty() {
        return Ok(Vec::new());
    }
    let mut extents = vec![None; tree.len()];
    let root = tree.root();
    let Some(total) = measure(tree, root, &mut extents)?.map(Extent::total) else {
        return Ok(Vec::new());
    };

    for id in tree.iter().collect::<Vec<_>>() {
        let node = tree.node_mut(id);
        node.off = None;
        node.nhdr = 0;
        node.len = 0;
    }
    let mut out = Vec::with_capacity(total);
    emit(tree, root, &extents, &mut out, true)?;
    debug!(bytes = out.len(), "encoded value tree");
    Ok(out)
}

fn problem(tree: &ValueTree, id: NodeId, what: &str) -> BerError {
    BerError::EncodingProblem(format!("{}: {what}", tree.path(id)))
}

fn sum(tree: &ValueTree, id: NodeId, a: usize, b: usize) -> Result<usize, BerError> {
    a.checked_add(b)
        .ok_or_else(|| problem(tree, id, "value too large"))
}

fn measure(
    tree: &ValueTree,
    id: NodeId,
    extents: &mut [Option<Extent>],
) -> Result<Option<Extent>, BerError> {
    let node = tree.node(id);
    let extent = match node.ty {
        NodeType::Size | NodeType::Default | NodeType::Identifier => None,

        NodeType::Any => match node.content() {
            Some(tlv) if !tlv.is_empty() => {
                let (ti, rest) = parse_tl(tlv)?;
                if ti.ndef || rest.len() != ti.length {
                    return Err(problem(tree, id, "open type value is not a single TLV"));
                }
                Some(Extent {
                    nhdr: ti.nhdr,
                    len: ti.length,
                    constructed: ti.is_constructed,
                })
            }
            _ => None,
        },

        NodeType::Choice => {
            let mut present = Vec::new();
            for child in tree.children(id) {
                if measure(tree, child, extents)?.is_some() {
                    present.push(child);
                }
            }
            let pick = match tree.chosen_alternative(id) {
                Some(alt) => Some(alt),
                None if present.len() > 1 => {
                    return Err(problem(tree, id, "more than one alternative present"))
                }
                None => present.first().copied(),
            };
            for &child in present.iter().filter(|&&c| Some(c) != pick) {
                extents[child.index()] = None;
            }
            pick.and_then(|alt| extents[alt.index()])
        }

        NodeType::Tag => {
            let number = node
                .tag_number()
                .ok_or_else(|| problem(tree, id, "tag without a number"))?;
            let class = node.flags.class;
            let inner = inner_of_tag(tree, id);
            let explicit = is_explicit(tree, id, inner);
            if let Some(content) = own_content(tree, id) {
                let primitive = inner.is_some_and(|c| tree.node(c).ty.is_primitive());
                if explicit || !primitive {
                    return Err(problem(tree, id, "tag cannot carry content directly"));
                }
                let extent = Extent {
                    nhdr: count_tl(number, class, false, content.len()),
                    len: content.len(),
                    constructed: false,
                };
                extents[id.index()] = Some(extent);
                return Ok(Some(extent));
            }
            let inner = match inner {
                Some(inner) => measure(tree, inner, extents)?,
                None => None,
            };
            match inner {
                None => None,
                Some(inner) if explicit => {
                    let len = inner.total();
                    Some(Extent {
                        nhdr: count_tl(number, class, true, len),
                        len,
                        constructed: true,
                    })
                }
                Some(inner) if inner.len == 0 => {
                    return Err(problem(tree, id, "empty value under an implicit tag"))
                }
                Some(inner) => Some(Extent {
                    nhdr: count_tl(number, class, inner.constructed, inner.len),
                    len: inner.len,
                    constructed: inner.constructed,
                }),
            }
        }

        NodeType::Sequence | NodeType::Set | NodeType::SequenceOf | NodeType::SetOf => {
            let mut len = 0usize;
            for child in tree.children(id) {
                if let Some(child) = measure(tree, child, extents)? {
                    len = sum(tree, id, len, child.total())?;
                }
            }
            let number = universal_tag(tree, id)?;
            (len > 0).then(|| Extent {
                nhdr: count_tl(number, TagClass::Universal, true, len),
                len,
                constructed: true,
            })
        }

        NodeType::Null if !node.flags.optional || node.content().is_some() => Some(Extent {
            nhdr: count_tl(tags::NULL, TagClass::Universal, false, 0),
            len: 0,
            constructed: false,
        }),

        _ => match node.content() {
            Some(content) if !content.is_empty() => {
                let number = universal_tag(tree, id)?;
                Some(Extent {
                    nhdr: count_tl(number, TagClass::Universal, false, content.len()),
                    len: content.len(),
                    constructed: false,
                })
            }
            _ => None,
        },
    };
    extents[id.index()] = extent;
    Ok(extent)
}

/// Content set directly on a TAG node, as the decoder reports it for
/// implicitly tagged primitives.
fn own_content(tree: &ValueTree, id: NodeId) -> Option<&[u8]> {
    tree.node(id).content().filter(|c| !c.is_empty())
}

fn inner_of_tag(tree: &ValueTree, id: NodeId) -> Option<NodeId> {
    tree.children(id)
        .find(|&c| tree.node(c).ty != NodeType::Default)
}

/// A tagged CHOICE keeps the alternative's own header.
fn is_explicit(tree: &ValueTree, id: NodeId, inner: Option<NodeId>) -> bool {
    tree.node(id).flags.explicit
        || inner.is_some_and(|c| tree.node(c).ty == NodeType::Choice)
}

fn universal_tag(tree: &ValueTree, id: NodeId) -> Result<u64, BerError> {
    tree.node(id)
        .ty
        .universal_tag()
        .ok_or_else(|| problem(tree, id, "no universal tag for this type"))
}

fn write_header(
    out: &mut Vec<u8>,
    number: u64,
    class: TagClass,
    extent: Extent,
) -> Result<(), BerError> {
    let mut buf = [0u8; MAX_HEADER_LEN];
    let n = encode_tl(&mut buf, number, class, extent.constructed, extent.len)?;
    out.extend_from_slice(&buf[..n]);
    Ok(())
}

/// Write node `id`. With `header` false only the content is written; the
/// caller has already emitted an implicit tag in its place.
fn emit(
    tree: &mut ValueTree,
    id: NodeId,
    extents: &[Option<Extent>],
    out: &mut Vec<u8>,
    header: bool,
) -> Result<(), BerError> {
    let Some(extent) = extents[id.index()] else {
        return Ok(());
    };
    let ty = tree.node(id).ty;

    if ty == NodeType::Choice {
        let children: Vec<NodeId> = tree.children(id).collect();
        for child in children {
            emit(tree, child, extents, out, true)?;
        }
        return Ok(());
    }

    if header {
        let node = tree.node_mut(id);
        node.off = Some(out.len());
        node.nhdr = extent.nhdr;
        node.len = extent.len;
    }

    match ty {
        NodeType::Any => {
            let tlv = tree.node(id).content().unwrap_or_default();
            if header {
                out.extend_from_slice(tlv);
            } else {
                out.extend_from_slice(tlv.get(extent.nhdr..).unwrap_or_default());
            }
        }
        NodeType::Tag => {
            let node = tree.node(id);
            let number = node
                .tag_number()
                .ok_or_else(|| problem(tree, id, "tag without a number"))?;
            let explicit = is_explicit(tree, id, inner_of_tag(tree, id));
            if header {
                write_header(out, number, node.flags.class, extent)?;
            }
            if let Some(content) = own_content(tree, id) {
                out.extend_from_slice(content);
                return Ok(());
            }
            let children: Vec<NodeId> = tree.children(id).collect();
            for child in children {
                emit(tree, child, extents, out, explicit)?;
            }
        }
        NodeType::Sequence | NodeType::Set | NodeType::SequenceOf | NodeType::SetOf => {
            if header {
                write_header(out, universal_tag(tree, id)?, TagClass::Universal, extent)?;
            }
            let children: Vec<NodeId> = tree.children(id).collect();
            for child in children {
                emit(tree, child, extents, out, true)?;
            }
        }
        _ => {
            if header {
                write_header(out, universal_tag(tree, id)?, TagClass::Universal, extent)?;
            }
            out.extend_from_slice(tree.node(id).content().unwrap_or_default());
        }
    }
    Ok(())
}
