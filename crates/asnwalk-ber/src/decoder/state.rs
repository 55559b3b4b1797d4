//! Decoder stack of open constructed values.

use asnwalk_types::BerError;
use tracing::trace;

use crate::tree::NodeId;

/// Cursor and bookkeeping for one nesting level.
#[derive(Debug, Clone, Default)]
pub(crate) struct StateItem {
    /// Schema position of the cursor.
    pub node: Option<NodeId>,
    /// Levels closed since the cursor last moved.
    pub went_up: u32,
    /// Inside a constructed open-type value; nothing is matched.
    pub in_any: bool,
    /// An absent tagged field was skipped; step past its TAG node.
    pub next_tag: bool,
    /// Declared length of the constructed value this level stands for.
    pub length: usize,
    pub ndef_length: bool,
    /// Bytes consumed at this level.
    pub nread: usize,
    /// Node reported for the constructed value that opened the next level.
    pub value: Option<NodeId>,
}

#[derive(Debug)]
pub(crate) struct DecoderState {
    pub cur: StateItem,
    stack: Vec<StateItem>,
    max_depth: usize,
}

impl DecoderState {
    pub fn new(max_depth: usize) -> Self {
        Self {
            cur: StateItem {
                ndef_length: true,
                ..StateItem::default()
            },
            stack: Vec::new(),
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn top(&self) -> Option<&StateItem> {
        self.stack.last()
    }

    pub fn push(&mut self) -> Result<(), BerError> {
        if self.stack.len() >= self.max_depth {
            return Err(BerError::StackDepthExceeded(self.max_depth));
        }
        self.stack.push(self.cur.clone());
        Ok(())
    }

    pub fn pop(&mut self) -> Result<StateItem, BerError> {
        let saved = self
            .stack
            .pop()
            .ok_or(BerError::MalformedHeader("decoder stack underflow"))?;
        Ok(std::mem::replace(&mut self.cur, saved))
    }

    /// The innermost open value has a definite length that is used up.
    pub fn frame_complete(&self) -> bool {
        self.top()
            .is_some_and(|top| !top.ndef_length && self.cur.nread >= top.length)
    }

    pub fn trace(&self) {
        for (depth, item) in self.stack.iter().chain([&self.cur]).enumerate() {
            trace!(
                depth,
                node = ?item.node.map(NodeId::index),
                went_up = item.went_up,
                in_any = item.in_any,
                next_tag = item.next_tag,
                length = item.length,
                ndef = item.ndef_length,
                nread = item.nread,
                "decoder state"
            );
        }
    }
}
