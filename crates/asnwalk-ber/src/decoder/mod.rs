//! Grammar-driven BER decoder.
//!
//! The driver pulls one header at a time from a [`ByteSource`], lets the
//! matcher place it in the value tree, keeps the stack of open constructed
//! values balanced, and copies every consumed byte into the image so that
//! matched values can be cut out again byte for byte.

mod matcher;
mod state;

use std::io::Write;

use asnwalk_types::{tags, BerError, NodeType, TagClass};
use tracing::{debug, trace, warn};

use crate::config::DecoderConfig;
use crate::oid::Oid;
use crate::reader::{ByteSource, Reader};
use crate::schema::Module;
use crate::tlv::{read_tl, TagInfo};
use crate::tree::{NodeId, ValueTree};
use matcher::{match_der, Verdict};
use state::DecoderState;

/// Result of a successful decode run.
#[derive(Debug, Clone)]
pub struct Decoded {
    /// The expanded schema, annotated with byte locations.
    pub tree: ValueTree,
    /// Every byte consumed by the run.
    pub image: Vec<u8>,
    bypassed_at: Option<u64>,
}

impl Decoded {
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.tree.find(path)
    }

    /// Complete TLV of a matched node.
    pub fn raw(&self, id: NodeId) -> Option<&[u8]> {
        self.tree.raw(&self.image, id)
    }

    /// Content octets of a matched node.
    pub fn content(&self, id: NodeId) -> Option<&[u8]> {
        self.tree.content(&self.image, id)
    }

    /// Complete TLV of the node at `path`.
    pub fn raw_at(&self, path: &str) -> Option<&[u8]> {
        self.raw(self.find(path)?)
    }

    /// See [`ValueTree::find_type_value`].
    pub fn find_type_value(&self, start: NodeId, idx: usize, oid: &[u8]) -> Option<NodeId> {
        self.tree.find_type_value(&self.image, start, idx, oid)
    }

    /// Stream offset at which matching gave up, when the run was allowed
    /// to continue without the schema.
    pub fn bypassed_at(&self) -> Option<u64> {
        self.bypassed_at
    }
}

/// A decoder bound to a byte source and, optionally, a schema module.
pub struct BerDecoder<'m, S> {
    module: Option<&'m Module>,
    source: S,
    config: DecoderConfig,
}

impl<'m, S: ByteSource> BerDecoder<'m, S> {
    pub fn new(module: &'m Module, source: S) -> Self {
        Self {
            module: Some(module),
            source,
            config: DecoderConfig::default(),
        }
    }

    /// A decoder without a grammar; only [`BerDecoder::dump`] is useful.
    pub fn schemaless(source: S) -> Self {
        Self {
            module: None,
            source,
            config: DecoderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Decode one value of type `entry`.
    ///
    /// Bytes following a complete value are left in the source, so a
    /// stream of concatenated values can be decoded with repeated calls.
    pub fn decode(&mut self, entry: &str) -> Result<Decoded, BerError> {
        let module = self
            .module
            .ok_or_else(|| BerError::ElementNotFound(entry.to_string()))?;
        let tree = module.expand(entry)?;
        let start = self.source.tell();
        debug!(module = module.name(), entry, offset = start, "decode started");

        let mut run = Run::new(
            &mut self.source,
            &self.config,
            Some(tree),
            self.config.honor_module_end,
            true,
        );
        while let Step::Value(val) = run.next()? {
            if let Some(id) = val.node {
                if !val.info.is_end_tag() {
                    run.annotate(id, &val.info);
                }
            }
            if !val.info.is_constructed {
                run.source.read_into(&mut run.image, val.info.length)?;
            }
        }

        if run.image.is_empty() {
            return Err(BerError::Eof);
        }
        let bypassed_at = run.bypassed_at;
        let image = std::mem::take(&mut run.image);
        let mut tree = run
            .tree
            .take()
            .ok_or_else(|| BerError::ElementNotFound(entry.to_string()))?;
        tree.fixup_any();

        if self.config.debug {
            let mut out = Vec::new();
            tree.dump(&mut out)?;
            debug!("value tree:\n{}", String::from_utf8_lossy(&out));
        }
        debug!(entry, bytes = image.len(), "decode finished");
        Ok(Decoded {
            tree,
            image,
            bypassed_at,
        })
    }

    /// Print every TLV of the input, guided by `entry` when a module is
    /// present. Mismatches switch to a plain TLV listing instead of failing.
    pub fn dump<W: Write + ?Sized>(
        &mut self,
        entry: Option<&str>,
        sink: &mut W,
    ) -> Result<(), BerError> {
        let tree = match (self.module, entry) {
            (Some(module), Some(entry)) => Some(module.expand(entry)?),
            _ => None,
        };
        let mut run = Run::new(&mut self.source, &self.config, tree, false, false);
        // End offsets of the open constructed values; None for indefinite.
        let mut open: Vec<Option<u64>> = Vec::new();

        while let Step::Value(val) = run.next()? {
            let ti = &val.info;
            let offset = run.source.tell().saturating_sub(ti.nhdr as u64);
            while let Some(Some(end)) = open.last() {
                if *end > offset {
                    break;
                }
                open.pop();
            }

            let indent = open.len() * 2;
            let length = if ti.ndef {
                "ndef".to_string()
            } else {
                ti.length.to_string()
            };
            write!(sink, "{offset:4} {length:>4}: {:indent$}", "")?;
            let node = val.node.zip(run.tree.as_ref());
            match node {
                Some((id, tree)) => write!(sink, "{}", tree.node(id))?,
                None => write!(sink, "[No matching node] {ti}")?,
            }

            if ti.is_constructed {
                writeln!(sink)?;
                let end = if ti.ndef {
                    None
                } else {
                    let end = offset
                        .checked_add(ti.nhdr as u64)
                        .and_then(|n| n.checked_add(ti.length as u64))
                        .ok_or(BerError::MalformedHeader("object length overflow"))?;
                    Some(end)
                };
                open.push(end);
            } else if ti.is_end_tag() {
                writeln!(sink)?;
                if let Some(None) = open.last() {
                    open.pop();
                }
            } else {
                let ty = node.map(|(id, tree)| tree.node(id).node_type());
                let shown = if is_oid(ti, ty) {
                    ti.length
                } else {
                    ti.length.min(MAX_SHOWN)
                };
                let mut value = Vec::new();
                run.source.read_into(&mut value, shown)?;
                run.source.skip(ti.length - shown)?;
                writeln!(sink, "  ({})", format_value(ti, ty, &value))?;
            }
        }
        Ok(())
    }
}

impl<'a> BerDecoder<'static, Reader<&'a [u8]>> {
    /// A schema-less decoder over an in-memory buffer.
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self::schemaless(Reader::from_slice(data))
    }
}

/// Decode `data` as one value of type `entry`.
pub fn decode_slice(
    module: &Module,
    entry: &str,
    config: DecoderConfig,
    data: &[u8],
) -> Result<Decoded, BerError> {
    BerDecoder::new(module, Reader::from_slice(data))
        .with_config(config)
        .decode(entry)
}

/// Bytes of a primitive value printed by `dump`; the rest is skipped.
const MAX_SHOWN: usize = 20;

fn is_oid(ti: &TagInfo, ty: Option<NodeType>) -> bool {
    match ty {
        Some(ty) => ty == NodeType::ObjectId,
        None => ti.class == TagClass::Universal && ti.tag == tags::OID,
    }
}

/// `bytes` holds at most [`MAX_SHOWN`] bytes unless the value is an OID.
fn format_value(ti: &TagInfo, ty: Option<NodeType>, bytes: &[u8]) -> String {
    if is_oid(ti, ty) {
        if let Ok(oid) = Oid::from_der_value(bytes) {
            return oid.to_string();
        }
    }
    let mut out = hex::encode(&bytes[..bytes.len().min(MAX_SHOWN)]);
    if ti.length > MAX_SHOWN {
        out.push_str("..more..");
    }
    out
}

// ---------------------------------------------------------------------------
// Decode run
// ---------------------------------------------------------------------------

struct Value {
    info: TagInfo,
    /// Matched node; None without a schema position.
    node: Option<NodeId>,
}

enum Step {
    Value(Value),
    End,
}

enum Selected {
    Node(Option<NodeId>),
    End,
}

struct Run<'a, S: ?Sized> {
    source: &'a mut S,
    config: &'a DecoderConfig,
    tree: Option<ValueTree>,
    state: DecoderState,
    honor_module_end: bool,
    bypass: bool,
    bypassed_at: Option<u64>,
    use_image: bool,
    image: Vec<u8>,
    first_tag_seen: bool,
    outer_sequence_length: Option<usize>,
    ignore_garbage: bool,
    matched_any: bool,
}

impl<'a, S: ByteSource + ?Sized> Run<'a, S> {
    fn new(
        source: &'a mut S,
        config: &'a DecoderConfig,
        tree: Option<ValueTree>,
        honor_module_end: bool,
        use_image: bool,
    ) -> Self {
        Self {
            source,
            config,
            bypass: tree.is_none(),
            tree,
            state: DecoderState::new(config.max_depth),
            honor_module_end,
            bypassed_at: None,
            use_image,
            image: Vec::new(),
            first_tag_seen: false,
            outer_sequence_length: None,
            ignore_garbage: false,
            matched_any: false,
        }
    }

    fn next(&mut self) -> Result<Step, BerError> {
        if self.ignore_garbage && self.config.fast_stop {
            debug!("outer structure complete; stopping");
            return Ok(Step::End);
        }
        let ti = match read_tl(&mut *self.source) {
            Ok(ti) => ti,
            Err(BerError::Eof) if !self.bypass && self.state.depth() > 0 => {
                return Err(BerError::PrematureEof)
            }
            Err(BerError::Eof) => return Ok(Step::End),
            Err(BerError::PrematureEof) if self.ignore_garbage && self.config.tolerate_garbage => {
                debug!("ignoring truncated data after the outer structure");
                return Ok(Step::End);
            }
            Err(e) => return Err(e),
        };
        if self.use_image {
            self.image.extend_from_slice(ti.header());
        }
        if !self.first_tag_seen {
            self.first_tag_seen = true;
            if ti.class == TagClass::Universal
                && ti.tag == tags::SEQUENCE
                && !ti.ndef
                && ti.length > 0
            {
                self.outer_sequence_length = Some(ti.length);
            }
        }
        if self.config.debug {
            trace!(offset = self.source.tell(), "header {ti}");
        }

        match self.select(&ti)? {
            Selected::Node(node) => Ok(Step::Value(Value { info: ti, node })),
            Selected::End => Ok(Step::End),
        }
    }

    fn select(&mut self, ti: &TagInfo) -> Result<Selected, BerError> {
        if self.bypass {
            return Ok(Selected::Node(None));
        }
        if self.state.cur.in_any {
            // Only an indefinite open value is closed by an end tag.
            let closes = ti.is_end_tag() && self.state.top().is_some_and(|t| t.ndef_length);
            self.account(ti, closes, None, false)?;
            return Ok(Selected::Node(None));
        }
        if ti.is_end_tag() {
            if !self.state.top().is_some_and(|t| t.ndef_length) {
                return Err(BerError::MalformedHeader("unexpected end-of-contents"));
            }
            self.account(ti, true, None, false)?;
            return Ok(Selected::Node(None));
        }

        let Some(tree) = self.tree.as_mut() else {
            return Ok(Selected::Node(None));
        };
        let verdict = loop {
            match match_der(tree, ti, &mut self.state, self.config.debug) {
                Verdict::Again => continue,
                Verdict::Default(id) => {
                    tree.node_mut(id).defaulted = true;
                    continue;
                }
                other => break other,
            }
        };

        let (node, open) = match verdict {
            Verdict::Match(id) => (id, false),
            Verdict::AnyMatch(id) => (id, true),
            Verdict::Fail(id) => return self.mismatch(ti, Some(id)),
            _ => return self.mismatch(ti, None),
        };
        self.matched_any = true;
        self.account(ti, false, Some(node), open)?;
        Ok(Selected::Node(Some(node)))
    }

    /// Update the byte counts for one header, close the values it
    /// completes and open a new level for a constructed value. With
    /// `open_any` the new level holds an open type and is not matched;
    /// the level it was opened from keeps matching once it closes.
    fn account(
        &mut self,
        ti: &TagInfo,
        mut end_tag: bool,
        node: Option<NodeId>,
        open_any: bool,
    ) -> Result<(), BerError> {
        const OVERFLOW: BerError = BerError::MalformedHeader("object length overflow");
        let ds = &mut self.state;
        let consumed = if ti.is_constructed {
            Some(ti.nhdr)
        } else {
            ti.nhdr.checked_add(ti.length)
        };
        ds.cur.nread = consumed
            .and_then(|n| ds.cur.nread.checked_add(n))
            .ok_or(OVERFLOW)?;
        ds.cur.went_up = 0;

        loop {
            if ds.depth() == 1 && Some(ds.cur.nread) == self.outer_sequence_length {
                self.ignore_garbage = true;
            }
            if let Some(top) = ds.top() {
                if !top.ndef_length && ds.cur.nread > top.length {
                    return Err(BerError::MalformedHeader("object length field too large"));
                }
            }
            if ds.depth() > 0 && (end_tag || ds.frame_complete()) {
                let inner = ds.pop()?;
                ds.cur.nread = ds.cur.nread.checked_add(inner.nread).ok_or(OVERFLOW)?;
                ds.cur.went_up += 1;
                if ds.cur.ndef_length {
                    if let (Some(tree), Some(id)) = (self.tree.as_mut(), ds.cur.value) {
                        tree.node_mut(id).len = inner.nread;
                    }
                }
                if self.config.debug {
                    trace!(depth = ds.depth(), bytes = inner.nread, "closed constructed value");
                }
            }
            end_tag = false;
            if !ds.frame_complete() {
                break;
            }
        }

        if ti.is_constructed {
            if ti.length > 0 || ti.ndef {
                ds.cur.length = ti.length;
                ds.cur.ndef_length = ti.ndef;
                ds.cur.value = node;
                ds.push()?;
                ds.cur.length = 0;
                ds.cur.ndef_length = false;
                ds.cur.nread = 0;
                ds.cur.value = None;
                ds.cur.in_any |= open_any;
                if self.config.debug {
                    trace!(depth = ds.depth(), "opened constructed value");
                }
            } else {
                // Nothing inside; the cursor must not descend.
                ds.cur.went_up = ds.cur.went_up.max(1);
            }
        }
        if self.config.debug {
            ds.trace();
        }
        Ok(())
    }

    fn mismatch(&mut self, ti: &TagInfo, at: Option<NodeId>) -> Result<Selected, BerError> {
        let offset = self.source.tell().saturating_sub(ti.nhdr as u64);
        if !self.honor_module_end {
            warn!(offset, "no schema position for {ti}; continuing without schema");
            self.bypass = true;
            self.bypassed_at = Some(offset);
            return Ok(Selected::Node(None));
        }
        if self.matched_any && self.state.depth() == 0 {
            debug!(offset, "value complete; leaving {ti} unread");
            self.source.unread(ti.header())?;
            if self.use_image {
                let keep = self.image.len().saturating_sub(ti.nhdr);
                self.image.truncate(keep);
            }
            return Ok(Selected::End);
        }

        let tag = ti.to_string();
        let Some(tree) = self.tree.as_ref() else {
            return Err(BerError::GrammarExhausted { offset });
        };
        match at {
            Some(id) => Err(BerError::UnexpectedTag {
                node: tree.path(id),
                tag,
                offset,
            }),
            None if !self.matched_any => Err(BerError::UnexpectedTag {
                node: tree.path(tree.root()),
                tag,
                offset,
            }),
            None => Err(BerError::GrammarExhausted { offset }),
        }
    }

    fn annotate(&mut self, id: NodeId, ti: &TagInfo) {
        let off = self.image.len().saturating_sub(ti.nhdr);
        if let Some(tree) = self.tree.as_mut() {
            let node = tree.node_mut(id);
            node.off = Some(off);
            node.nhdr = ti.nhdr;
            node.len = ti.length;
            if node.ty == NodeType::Any {
                node.actual_tag = Some((ti.class, ti.tag));
            }
        }
    }
}
