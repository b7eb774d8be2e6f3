//! Error taxonomy shared by the resolver, the formatter, and hosts.
//!
//! Every variant except [`Error::Host`] is a client error: the request was
//! well-formed HTTP but named something that does not exist, is ambiguous,
//! or is not available. Those become `400` replies and are never retried.
//! [`Error::Host`] wraps unexpected failures from the host and becomes `500`.

/// Convenience alias used across the crate and by host implementations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The key matches neither citation key grammar.
    #[error("citation key must be of the form DoeTitle2000 or doe:2000title: {0}")]
    MalformedKey(String),

    /// A well-formed key or identifier with no matching item.
    #[error("{0}")]
    NotFound(String),

    /// A well-formed key matching more than one item after disambiguation.
    #[error("{0}")]
    Ambiguous(String),

    /// A required query parameter or body field is absent.
    #[error("{0}")]
    MissingParam(String),

    /// An optional capability (citation keys, a translator) is not available.
    #[error("{0}")]
    Unsupported(String),

    /// A parameter is present but unusable (bad format name, bad JSON body).
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Style {0} is not installed.")]
    StyleNotInstalled(String),

    /// Any other failure raised by the host.
    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

impl Error {
    /// Returns `true` for errors caused by client input.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Error::Host(_))
    }

    /// Short machine-readable name, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedKey(_) => "malformed_key",
            Error::NotFound(_) => "not_found",
            Error::Ambiguous(_) => "ambiguous",
            Error::MissingParam(_) => "missing_param",
            Error::Unsupported(_) => "unsupported",
            Error::InvalidRequest(_) => "invalid_request",
            Error::StyleNotInstalled(_) => "style_not_installed",
            Error::Host(_) => "host",
        }
    }
}
