#![forbid(unsafe_code)]
#![doc = "Grammar-driven BER/DER decoding and DER encoding for asnwalk."]

pub mod config;
pub mod decoder;
pub mod der;
pub mod oid;
#[cfg(feature = "pkix")]
pub mod pkix;
pub mod reader;
pub mod schema;
pub mod tlv;
pub mod tree;

pub use asnwalk_types::{BerError, NodeType, TagClass};
pub use config::{DecoderConfig, DecoderConfigBuilder};
pub use decoder::{decode_slice, BerDecoder, Decoded};
pub use der::encode_tree;
pub use oid::Oid;
pub use reader::{ByteSource, Reader};
pub use schema::{Module, ModuleBuilder, TagMode, TypeDef};
pub use tlv::{count_tl, encode_tl, parse_tl, read_tl, write_tl, TagInfo};
pub use tree::{NodeId, ValueNode, ValueTree};
