/// ASN.1 BER/DER codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("null or empty input")]
    NullInput,
    #[error("truncated element")]
    Truncated,
    #[error("invalid tag encoding")]
    InvalidTag,
    #[error("invalid length encoding")]
    InvalidLength,
    #[error("unexpected tag: expected {expected:#04x}, got {got:#04x}")]
    UnexpectedTag { expected: u8, got: u8 },
    #[error("indefinite length not permitted here")]
    IndefiniteLength,
    #[error("missing end-of-contents octets")]
    MissingEoc,
    #[error("trailing data after element")]
    TrailingData,
    #[error("invalid object identifier encoding")]
    InvalidOid,
    #[error("nesting too deep")]
    NestingTooDeep,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// CMS engine errors.
///
/// The taxonomy separates format errors, algorithm-support errors,
/// cryptographic failures, authentication failures, and caller sequencing
/// mistakes so that callers can tell a broken message from a broken program.
#[derive(Debug, thiserror::Error)]
pub enum CmsError {
    /// Structural error in the message: wrong tag, missing required field,
    /// size mismatch. Always fatal.
    #[error("malformed structure: {0}")]
    Malformed(&'static str),

    /// An error from the ASN.1 codec layer.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An algorithm identifier not present in the registry.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A cryptographic operation (wrap, unwrap, transform) failed.
    ///
    /// The display message is deliberately uniform: unwrap failures must not
    /// reveal whether padding or the key was wrong. The underlying cause is
    /// retained as the error source for diagnostics only.
    #[error("cryptographic operation failed")]
    OperationFailed {
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// MAC or AEAD tag verification failed. Fail-closed: any content already
    /// surfaced before this point must be treated as unauthenticated.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Authenticated attributes are required (content type is not id-data)
    /// but absent from the message.
    #[error("missing required authenticated attributes")]
    MissingAuthAttrs,

    /// No recipient record matched the supplied identifier.
    #[error("recipient not found")]
    RecipientNotFound,

    /// The supplied credential does not match the kind of the matched
    /// recipient record (e.g. a password offered for a key-transport record).
    #[error("recipient credential does not match recipient info kind")]
    RecipientKindMismatch,

    /// Construction-time key size mismatch against the algorithm's
    /// canonical size (and its accepted legacy alternates).
    #[error("invalid key length: expected {expected} bits, got {got} bits")]
    InvalidKeyLength { expected: usize, got: usize },

    /// Caller invoked operations in an impossible order (programmer error,
    /// distinct from format and crypto errors).
    #[error("invalid call sequence: {0}")]
    Sequencing(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The secure random source failed.
    #[error("random source failure")]
    Rng,
}

impl CmsError {
    /// Wrap an internal cause as an opaque operation failure.
    pub fn op_failed<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CmsError::OperationFailed {
            source: Some(Box::new(source)),
        }
    }

    /// An operation failure with no recorded cause.
    pub fn op_failed_opaque() -> Self {
        CmsError::OperationFailed { source: None }
    }
}
