/// Transport-level failure talking to the Tinxy backend.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Listing devices failed; the discovery pass contributes nothing.
#[derive(Debug, thiserror::Error)]
#[error("failed to list devices: {source}")]
pub struct FetchError {
    #[from]
    pub source: ClientError,
}

/// Reading the state of a single unit failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to read state of device {device_id} unit {unit_index}: {source}")]
pub struct ReadError {
    pub device_id: String,
    pub unit_index: usize,
    #[source]
    pub source: ClientError,
}

/// Commanding a single unit failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to set state of device {device_id} unit {unit_index}: {source}")]
pub struct WriteError {
    pub device_id: String,
    pub unit_index: usize,
    #[source]
    pub source: ClientError,
}

/// The platform cannot start with the given configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("API token not provided")]
    MissingCredential,

    #[error("API token is not a valid header value")]
    InvalidCredential,

    #[error("invalid API base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
