use thiserror::Error;

/// Errors while reading, editing, or writing BRRES containers.
#[derive(Debug, Error)]
pub enum BrresError {
    /// A container or sub-file begins with an unexpected four byte tag.
    #[error(
        "expected magic {} but found {}",
        String::from_utf8_lossy(.expected),
        String::from_utf8_lossy(.found)
    )]
    InvalidMagic { expected: [u8; 4], found: [u8; 4] },

    /// The version has no entry in the sub-file's version to section count table.
    #[error("version {version} is not supported for {magic}")]
    UnsupportedVersion { magic: &'static str, version: u32 },

    /// A read would pass the end of the buffer.
    #[error("unexpected end of file at offset {offset}")]
    UnexpectedEof { offset: usize },

    /// A read would pass the recorded length of the enclosing section.
    #[error("offset {offset} is outside the current section of length {length}")]
    OversizedLength { offset: usize, length: usize },

    /// A region finished packing with pointer slots that were never written.
    #[error("{count} marked reference slots were never resolved")]
    UnresolvedReferences { count: usize },

    /// A stored or marked reference was requested that does not exist.
    #[error("no stored reference at index {index} for region {base:#x}")]
    MissingReference { base: usize, index: usize },

    /// A bone, material, layer, or group index refers past the containing list.
    #[error("{kind} index {index} is out of range for a list of length {len}")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    /// A reference targets a name that no open container can resolve.
    #[error("no resolver for the name {0:?}")]
    UnknownName(String),

    /// Mesh encoding or decoding produced data the packer cannot represent.
    #[error("conversion failed: {0}")]
    Convert(String),

    /// A structural contradiction was discovered at pack time.
    #[error("packing failed: {0}")]
    Packing(String),

    /// The image codec failed to encode a texture payload.
    #[error("image encoding failed: {0}")]
    Encode(String),

    /// The image codec failed to decode a texture payload.
    #[error("image decoding failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
