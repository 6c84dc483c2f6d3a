use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures a [`crate::suppliers::PackageSupplier`] can report. Kept as a
/// narrower enum than [`Error`] so a supplier implementation can be
/// written and tested against this contract alone.
#[derive(Error, Debug)]
pub enum SupplierError {
    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("transient I/O failure: {0}")]
    TransientIoFailure(String),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("rate limited: {0}")]
    RateLimited(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // --- input errors (§7) ---
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid version range: {0}")]
    InvalidRange(String),

    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    #[error("unsupported selections file format version: {0}")]
    UnsupportedSelectionsVersion(u32),

    // --- resolution errors (§7) ---
    #[error(
        "could not resolve dependency '{name}': no version satisfies all constraints\n\n\
         Constraints:\n{constraints}"
    )]
    UnresolvableDependency { name: String, constraints: String },

    #[error("no version of '{name}' matches constraint '{range}'")]
    NoMatchingVersion { name: String, range: String },

    #[error("missing dependency '{name}' required by '{required_by}'")]
    MissingDependency { name: String, required_by: String },

    #[error("unable to fetch dependency '{name}': {reason}")]
    UnableToFetch { name: String, reason: String },

    // --- supplier errors (§7), surfaced from SupplierError ---
    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("transient I/O failure: {0}")]
    TransientIoFailure(String),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    // --- store errors (§7) ---
    #[error("timed out waiting for a lock on {0}")]
    LockTimeout(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("destination already occupied: {0}")]
    DestinationOccupied(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a retry of the operation that produced this error is
    /// worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientIoFailure(_) | Error::Io(_) | Error::Http(_))
    }
}

impl From<SupplierError> for Error {
    fn from(e: SupplierError) -> Self {
        match e {
            SupplierError::PackageNotFound(s) => Error::PackageNotFound(s),
            SupplierError::TransientIoFailure(s) => Error::TransientIoFailure(s),
            SupplierError::AuthFailure(s) => Error::AuthFailure(s),
            SupplierError::ProtocolError(s) => Error::ProtocolError(s),
            SupplierError::Unsupported(s) => Error::Unsupported(s),
        }
    }
}
