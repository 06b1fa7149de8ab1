use thiserror::Error;

/// High-level error type shared across all Pantheon components.
#[derive(Debug, Error)]
pub enum PantheonError {
    #[error("invalid path: {0}")]
    BadPath(String),
    #[error("path security violation: {0}")]
    PathSecurity(String),
    #[error("sandbox security violation: {0}")]
    Security(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("circular import detected: {chain}")]
    CircularImport { chain: String },
    #[error("schema compilation failed: {0}")]
    SchemaCompile(String),
    #[error("schema validation failed:\n{0}")]
    SchemaValidation(String),
    #[error("template rendering failed in {template}: {message}")]
    TemplateRender { template: String, message: String },
    #[error("invalid semantic URI {uri}: {message}")]
    MalformedUri { uri: String, message: String },
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid template combination: {0}")]
    OperationDetect(String),
    #[error("section '{section}' not found in {file}")]
    MissingSection { section: String, file: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("missing required template key: {0}")]
    MissingTemplateKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PantheonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<serde_yaml::Error> for PantheonError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PantheonError>;
