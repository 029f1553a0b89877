use miette::Diagnostic;
use thiserror::Error;

/// Error type for cluster API operations
#[derive(Error, Debug, Diagnostic)]
pub enum ClientError {
    /// The API server could not be reached or the connection broke
    #[error("Cluster connection failed: {message}")]
    #[diagnostic(
        code(ferry::client::connection_failed),
        help("Verify the API server endpoint is reachable and the credentials are valid")
    )]
    ConnectionFailed {
        #[allow(unused)]
        message: String,
    },

    /// The API server answered with an error status
    #[error("API request failed with status {code}: {message}")]
    #[diagnostic(
        code(ferry::client::api_error),
        help("Check the scheduler's RBAC permissions for nodes, pods and pods/binding")
    )]
    Api {
        #[allow(unused)]
        code: u16,
        #[allow(unused)]
        message: String,
    },

    /// A request exceeded its deadline
    #[error("{operation} timed out after {seconds}s")]
    #[diagnostic(
        code(ferry::client::timeout),
        help("The API server is slow or unreachable. The request will be retried on the next cycle")
    )]
    Timeout {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        seconds: u64,
    },

    /// The watch stream failed mid-flight
    #[error("Watch stream error: {message}")]
    #[diagnostic(
        code(ferry::client::stream_error),
        help("The watch will be reopened after the reconnect delay")
    )]
    StreamError {
        #[allow(unused)]
        message: String,
    },

    /// Client configuration could not be loaded
    #[error("Invalid client configuration: {message}")]
    #[diagnostic(code(ferry::client::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Internal error
    #[error("Internal client error: {message}")]
    #[diagnostic(
        code(ferry::client::internal_error),
        help("This is likely a bug in ferry-client. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    pub fn api(code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    pub fn stream_error(message: impl Into<String>) -> Self {
        Self::StreamError {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if the server answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<kube::Error> for ClientError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(ae) => ClientError::api(ae.code, ae.message),
            other => ClientError::connection_failed(other.to_string()),
        }
    }
}
