/// BER/DER decoding and encoding errors.
#[derive(Debug, thiserror::Error)]
pub enum BerError {
    // Header errors
    #[error("end of input")]
    Eof,
    #[error("premature end of input")]
    PrematureEof,
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),
    #[error("forbidden length octet 0xff")]
    ForbiddenLength,
    #[error("length field of {0} octets exceeds the native integer width")]
    LengthTooLarge(usize),

    // Encoding errors
    #[error("tag number {0} needs the long identifier form")]
    NotImplemented(u64),
    #[error("buffer length not enough: need {need}, got {got}")]
    BufferTooSmall { need: usize, got: usize },
    #[error("encoding problem: {0}")]
    EncodingProblem(String),

    // Matching errors
    #[error("unexpected tag {tag} at offset {offset} (expected {node})")]
    UnexpectedTag {
        node: String,
        tag: String,
        offset: u64,
    },
    #[error("grammar exhausted at offset {offset}")]
    GrammarExhausted { offset: u64 },
    #[error("decoder stack depth {0} exceeded")]
    StackDepthExceeded(usize),

    // Schema errors
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("unresolved identifier: {0}")]
    UnresolvedIdentifier(String),

    // Value errors
    #[error("invalid object identifier")]
    InvalidOid,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BerError {
    /// Whether this error marks a clean end of input at a TLV boundary.
    pub fn is_eof(&self) -> bool {
        matches!(self, BerError::Eof)
    }
}
