use thiserror::Error;

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("malformed header key {0:?}: expected a run of 1 to 6 '#' characters")]
    InvalidHeaderKey(String),

    #[error("unknown splitter {0:?}")]
    UnknownSplitter(String),

    #[error("invalid splitter config: {0}")]
    InvalidSplitterConfig(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("failed to parse yaml file {path}: {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {service}: {details}")]
    ServiceResponse { service: String, details: String },

    #[error("file not found: {0}")]
    MissingFile(String),

    #[error("no prompt registered for {0}")]
    MissingPrompt(String),

    #[error("api key is not set ({0})")]
    MissingApiKey(String),

    #[error("corpus copy checksum mismatch: {0}")]
    CopyMismatch(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T, E = PrepError> = std::result::Result<T, E>;
