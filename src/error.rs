use std::fmt::Debug;
use std::fmt::{self, Display, Formatter};

use serde::Deserialize;

/// Result that is a wrapper of `Result<T, coldvault::Error>`
pub type Result<T> = std::result::Result<T, Error>;

/// ErrorKind is all kinds of Error of coldvault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The caller handed us something unusable: empty credentials, a limit
    /// outside `[1, 1000]`, a part size that is not a power-of-two number
    /// of MiB, and the like.
    Config,
    /// A request component could not be canonicalized: a malformed URL
    /// query, or a `Date` header that is not in RFC 1123 form.
    Encoding,
    /// Reading or seeking a payload stream failed while hashing.
    PayloadIo,
    /// The underlying HTTP exchange failed; surfaced verbatim.
    Transport,
    /// The service answered with a non-success status. The structured
    /// `{code, message, type}` body, when decodable, is attached as the
    /// source and reachable via [`Error::service_error`].
    Service,
    /// A computed tree hash does not match the one the service returned.
    Integrity,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => write!(f, "Config"),
            ErrorKind::Encoding => write!(f, "Encoding"),
            ErrorKind::PayloadIo => write!(f, "PayloadIo"),
            ErrorKind::Transport => write!(f, "Transport"),
            ErrorKind::Service => write!(f, "Service"),
            ErrorKind::Integrity => write!(f, "Integrity"),
        }
    }
}

/// Errors that returned by coldvault.
pub struct Error {
    kind: ErrorKind,
    message: String,
    operation: &'static str,
    source: Option<anyhow::Error>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.operation)?;

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("operation", &self.operation);
            de.field("source", &self.source);
            return de.finish();
        }

        write!(f, "{} at {}", self.kind, self.operation)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source: {source:?}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref())
    }
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_string(),

            operation: "",
            source: None,
        }
    }

    /// Update error's operation.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = operation;
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here.
    pub fn set_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");

        self.source = Some(src.into());
        self
    }

    /// Return error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The structured error the service reported, if this is a
    /// [`ErrorKind::Service`] error with a decodable body.
    pub fn service_error(&self) -> Option<&ServiceError> {
        self.source.as_ref()?.downcast_ref::<ServiceError>()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self {
            kind: ErrorKind::PayloadIo,
            message: "reading stream failed".to_string(),

            operation: "io",
            source: Some(err.into()),
        }
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Self {
            kind: ErrorKind::Encoding,
            message: "formatting request string failed".to_string(),

            operation: "fmt",
            source: Some(err.into()),
        }
    }
}

/// The structured error body the service attaches to non-success
/// responses.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceError {
    /// Machine readable error code, e.g. `ResourceNotFoundException`.
    pub code: String,
    /// Human readable description of the failure.
    pub message: String,
    /// Error class, e.g. `Client` or `Server`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.code, self.kind, self.message)
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_error_body() {
        let content = r#"{"code":"ResourceNotFoundException","message":"Vault not found for ARN: example","type":"Client"}"#;
        let err: ServiceError = serde_json::from_str(content).expect("must deserialize");
        assert_eq!(err.code, "ResourceNotFoundException");
        assert_eq!(err.kind, "Client");
        assert_eq!(err.message, "Vault not found for ARN: example");
    }

    #[test]
    fn test_service_error_downcast() {
        let service = ServiceError {
            code: "MissingParameterValueException".to_string(),
            message: "Required parameter missing".to_string(),
            kind: "Client".to_string(),
        };
        let err = Error::new(ErrorKind::Service, "service returned status 400")
            .with_operation("connection::execute")
            .set_source(service);

        assert_eq!(err.kind(), ErrorKind::Service);
        let inner = err.service_error().expect("source must downcast");
        assert_eq!(inner.code, "MissingParameterValueException");
    }

    #[test]
    fn test_service_error_missing_fields() {
        let err: ServiceError = serde_json::from_str("{}").expect("must deserialize");
        assert!(err.code.is_empty());
        assert!(err.message.is_empty());
    }
}
