//! Transition function of the decoding automaton: moves the schema cursor
//! and decides how the current header relates to the node under it.

use asnwalk_types::{tags, NodeType, TagClass};
use tracing::trace;

use super::state::DecoderState;
use crate::tlv::TagInfo;
use crate::tree::{ChoiceArm, NodeId, ValueNode, ValueTree};

/// Outcome of one matcher step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// The cursor moved; evaluate the same header again.
    Again,
    /// The node under the cursor is absent and takes its DEFAULT.
    Default(NodeId),
    Match(NodeId),
    /// An open type matched a constructed value.
    AnyMatch(NodeId),
    /// The node under the cursor does not account for the header.
    Fail(NodeId),
    /// No schema position is left.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagMatch {
    No,
    Primitive,
    Open,
}

fn cmp_tag(node: &ValueNode, ti: &TagInfo) -> TagMatch {
    let open = if ti.is_constructed {
        TagMatch::Open
    } else {
        TagMatch::Primitive
    };
    if node.flags.class != ti.class {
        return if node.ty == NodeType::Any { open } else { TagMatch::No };
    }
    match node.ty {
        NodeType::Tag if node.tag_number() == Some(ti.tag) => TagMatch::Primitive,
        NodeType::Any if ti.class == TagClass::Universal => open,
        NodeType::SequenceOf if ti.tag == tags::SEQUENCE => TagMatch::Primitive,
        NodeType::SetOf if ti.tag == tags::SET => TagMatch::Primitive,
        NodeType::SequenceOf | NodeType::SetOf | NodeType::Tag => TagMatch::No,
        ty if ty.universal_tag() == Some(ti.tag) => TagMatch::Primitive,
        _ => TagMatch::No,
    }
}

/// First node in preorder whose tag fits the header.
fn find_anchor(tree: &mut ValueTree, ti: &TagInfo) -> Option<NodeId> {
    let anchor = tree
        .iter()
        .find(|&id| cmp_tag(tree.node(id), ti) != TagMatch::No)?;
    if let Some(parent) = tree.parent(anchor) {
        if tree.node(parent).ty == NodeType::Choice {
            tree.node_mut(parent).choice = ChoiceArm::Taken(anchor);
        }
    }
    Some(anchor)
}

/// Next repetition of `element`, if it sits inside a SEQUENCE OF / SET OF.
fn repeat(tree: &mut ValueTree, element: NodeId) -> Option<NodeId> {
    let parent = tree.parent(element)?;
    if tree.node(parent).ty.is_repeated() {
        Some(tree.insert_copy(element))
    } else {
        None
    }
}

fn right_or_repeat(tree: &mut ValueTree, node: NodeId) -> Option<NodeId> {
    match tree.next_sibling(node) {
        Some(right) => Some(right),
        None => repeat(tree, node),
    }
}

/// Step past `node`: its right sibling, or the first right sibling of an
/// ancestor. Leaving the last element of a repetition starts a new one.
fn advance_past(tree: &mut ValueTree, node: NodeId) -> Option<NodeId> {
    let mut node = node;
    loop {
        if let Some(right) = tree.next_sibling(node) {
            return Some(right);
        }
        let parent = tree.parent(node)?;
        if tree.node(parent).ty.is_repeated() {
            return Some(tree.insert_copy(node));
        }
        node = parent;
    }
}

fn move_cursor(tree: &mut ValueTree, ds: &DecoderState, cur: NodeId) -> Option<NodeId> {
    let node = tree.node(cur);
    let (ty, flags) = (node.ty, node.flags);
    let went_up = ds.cur.went_up > 0;

    if ty.is_primitive() || matches!(ty, NodeType::Any | NodeType::Size | NodeType::Default) {
        if let Some(right) = tree.next_sibling(cur) {
            return Some(right);
        }
        if flags.in_choice {
            // Leave the CHOICE altogether.
            let choice = tree.parent(cur)?;
            return right_or_repeat(tree, choice);
        }
        if flags.is_implicit {
            // The implicit TAG is the field; step past it.
            let tag = tree.parent(cur)?;
            return right_or_repeat(tree, tag);
        }
        return repeat(tree, cur);
    }

    if ty.is_repeated() {
        if (went_up && !flags.in_array) || ds.frame_complete() {
            return advance_past(tree, cur);
        }
        if flags.in_array && went_up {
            return Some(tree.insert_copy(cur));
        }
        return tree.first_child(cur);
    }

    if flags.in_array && went_up {
        return Some(tree.insert_copy(cur));
    }
    if went_up || ds.cur.next_tag || tree.is_skipped(cur) {
        return advance_past(tree, cur);
    }
    tree.first_child(cur)
}

/// Advance the cursor one position and judge the header against it.
pub(crate) fn match_der(
    tree: &mut ValueTree,
    ti: &TagInfo,
    ds: &mut DecoderState,
    debug: bool,
) -> Verdict {
    let next = match ds.cur.node {
        None => find_anchor(tree, ti),
        Some(cur) => move_cursor(tree, ds, cur),
    };
    let Some(node) = next else {
        if debug {
            trace!("cursor ran off the schema");
        }
        return Verdict::Exhausted;
    };
    ds.cur.node = Some(node);
    ds.cur.went_up = 0;
    ds.cur.next_tag = false;
    if debug {
        trace!(node = node.index(), "cursor at {}", tree.node(node));
    }

    let n = tree.node(node);
    if tree.is_skipped(node)
        || matches!(n.ty, NodeType::Size | NodeType::Default)
        || n.flags.is_implicit
    {
        return Verdict::Again;
    }
    match cmp_tag(n, ti) {
        TagMatch::Primitive => return Verdict::Match(node),
        TagMatch::Open => return Verdict::AnyMatch(node),
        TagMatch::No => {}
    }

    if n.ty == NodeType::Choice {
        let taken = tree
            .children(node)
            .find(|&alt| !tree.is_skipped(alt) && cmp_tag(tree.node(alt), ti) == TagMatch::Primitive);
        match taken {
            Some(alt) => {
                if debug {
                    trace!(choice = node.index(), alternative = alt.index(), "choice selected");
                }
                tree.node_mut(node).choice = ChoiceArm::Taken(alt);
                return Verdict::Again;
            }
            None => tree.node_mut(node).choice = ChoiceArm::Declined,
        }
    }

    let n = tree.node(node);
    if n.flags.in_choice {
        return Verdict::Again;
    }
    if n.flags.optional {
        if n.ty == NodeType::Tag {
            ds.cur.next_tag = true;
        }
        return Verdict::Again;
    }
    if n.flags.has_default {
        if n.ty == NodeType::Tag {
            ds.cur.next_tag = true;
        }
        return Verdict::Default(node);
    }
    Verdict::Fail(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Module, TypeDef};
    use crate::tlv::parse_tl;

    fn header(bytes: &[u8]) -> TagInfo {
        parse_tl(bytes).unwrap().0
    }

    fn choice_tree() -> ValueTree {
        Module::builder("T")
            .define(
                "Holder",
                TypeDef::sequence([TypeDef::choice([
                    TypeDef::integer().named("num"),
                    TypeDef::utf8_string().named("text"),
                    TypeDef::octet_string().named("blob").implicit(0),
                ])
                .named("value")]),
            )
            .build()
            .unwrap()
            .expand("Holder")
            .unwrap()
    }

    /// Run the matcher until it settles on a verdict other than Again.
    fn settle(tree: &mut ValueTree, ds: &mut DecoderState, ti: &TagInfo) -> Verdict {
        loop {
            match match_der(tree, ti, ds, false) {
                Verdict::Again | Verdict::Default(_) => continue,
                other => return other,
            }
        }
    }

    #[test]
    fn test_cmp_tag_rules() {
        let tree = choice_tree();
        let root = tree.node(tree.root());
        assert_eq!(cmp_tag(root, &header(&[0x30, 0x00])), TagMatch::Primitive);
        assert_eq!(cmp_tag(root, &header(&[0x31, 0x00])), TagMatch::No);

        let any = Module::builder("T")
            .define("Open", TypeDef::any())
            .define("Many", TypeDef::set_of(TypeDef::integer()))
            .build()
            .unwrap();
        let open = any.expand("Open").unwrap();
        let open = open.node(open.root());
        assert_eq!(cmp_tag(open, &header(&[0x04, 0x00])), TagMatch::Primitive);
        assert_eq!(cmp_tag(open, &header(&[0x30, 0x00])), TagMatch::Open);
        assert_eq!(cmp_tag(open, &header(&[0xA1, 0x00])), TagMatch::Open);
        assert_eq!(cmp_tag(open, &header(&[0x81, 0x00])), TagMatch::Primitive);

        let many = any.expand("Many").unwrap();
        let many = many.node(many.root());
        assert_eq!(cmp_tag(many, &header(&[0x31, 0x00])), TagMatch::Primitive);
        assert_eq!(cmp_tag(many, &header(&[0x30, 0x00])), TagMatch::No);
    }

    #[test]
    fn test_choice_selects_each_alternative() {
        let cases: [(&[u8], &str); 3] = [
            (&[0x02, 0x01], "num"),
            (&[0x0C, 0x01], "text"),
            (&[0x80, 0x01], "blob"),
        ];
        for (bytes, expected) in cases {
            let mut tree = choice_tree();
            let mut ds = DecoderState::new(8);
            let seq = header(&[0x30, 0x03]);
            assert_eq!(settle(&mut tree, &mut ds, &seq), Verdict::Match(tree.root()));
            ds.push().unwrap();

            let ti = header(bytes);
            let verdict = settle(&mut tree, &mut ds, &ti);
            let choice = tree.find("Holder.value").unwrap();
            let alt = tree.chosen_alternative(choice).unwrap();
            assert_eq!(tree.node(alt).name(), Some(expected));
            assert_eq!(verdict, Verdict::Match(alt));
            for other in tree.children(choice).filter(|&c| c != alt) {
                assert!(tree.is_skipped(other));
            }
            assert!(!tree.is_skipped(alt));
        }
    }

    #[test]
    fn test_choice_without_match_fails() {
        let mut tree = choice_tree();
        let mut ds = DecoderState::new(8);
        settle(&mut tree, &mut ds, &header(&[0x30, 0x03]));
        ds.push().unwrap();

        let verdict = settle(&mut tree, &mut ds, &header(&[0x01, 0x01]));
        let choice = tree.find("Holder.value").unwrap();
        assert_eq!(verdict, Verdict::Fail(choice));
        assert_eq!(tree.chosen_alternative(choice), None);
        assert!(tree.children(choice).all(|c| tree.is_skipped(c)));
    }

    #[test]
    fn test_anchor_search() {
        let mut tree = choice_tree();
        let mut ds = DecoderState::new(8);
        // Starting inside the structure anchors on the alternative.
        let verdict = settle(&mut tree, &mut ds, &header(&[0x0C, 0x00]));
        let text = tree.find("Holder.value.text").unwrap();
        assert_eq!(verdict, Verdict::Match(text));
        let choice = tree.find("Holder.value").unwrap();
        assert_eq!(tree.chosen_alternative(choice), Some(text));

        let mut tree = choice_tree();
        let mut ds = DecoderState::new(8);
        assert_eq!(
            settle(&mut tree, &mut ds, &header(&[0x05, 0x00])),
            Verdict::Exhausted
        );
    }

    #[test]
    fn test_optional_and_default_fields() {
        let mut tree = Module::builder("T")
            .define(
                "Rec",
                TypeDef::sequence([
                    TypeDef::integer().named("version").explicit(0).default("0"),
                    TypeDef::boolean().named("flag").optional(),
                    TypeDef::octet_string().named("data"),
                ]),
            )
            .build()
            .unwrap()
            .expand("Rec")
            .unwrap();
        let mut ds = DecoderState::new(8);
        settle(&mut tree, &mut ds, &header(&[0x30, 0x03]));
        ds.push().unwrap();

        let version = tree.find("Rec.version").unwrap();
        let data = tree.find("Rec.data").unwrap();
        let ti = header(&[0x04, 0x01]);
        assert_eq!(match_der(&mut tree, &ti, &mut ds, false), Verdict::Default(version));
        assert!(ds.cur.next_tag);
        // The TAG is skipped, then the absent optional flag.
        assert_eq!(match_der(&mut tree, &ti, &mut ds, false), Verdict::Again);
        assert_eq!(match_der(&mut tree, &ti, &mut ds, false), Verdict::Match(data));
    }
}
