use thiserror::Error;

/// Failures that abort a single request. Every variant maps onto one
/// error envelope; none of them closes the connection that carried it.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{message}")]
    RequestMalformed {
        message: String,
        detail: Option<String>,
    },

    #[error("Unknown {kind}: '{value}'{}", scope_suffix(.scope))]
    UnknownOperation {
        kind: &'static str,
        value: String,
        /// The domain an unknown action was looked up in.
        scope: Option<&'static str>,
    },

    #[error("{0}")]
    EntityNotFound(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("{0}")]
    CollaboratorFailure(String),

    #[error("Port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("Scene owner is not accepting work")]
    DispatcherClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::RequestMalformed {
            message: message.into(),
            detail: None,
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::malformed(format!("'{field}' parameter is required."))
    }

    pub fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownOperation {
            kind,
            value: value.into(),
            scope: None,
        }
    }

    pub fn unknown_action(action: impl Into<String>, domain: &'static str) -> Self {
        Self::UnknownOperation {
            kind: "action",
            value: action.into(),
            scope: Some(domain),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::EntityNotFound(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::CollaboratorFailure(message.into())
    }

    /// Secondary text carried in the envelope's `detail` field.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::RequestMalformed { detail, .. } => detail.clone(),
            _ => None,
        }
    }
}

fn scope_suffix(scope: &Option<&'static str>) -> String {
    scope.map(|domain| format!(" in '{domain}'")).unwrap_or_default()
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::RequestMalformed {
            message: "Invalid JSON format".to_string(),
            detail: Some(err.to_string()),
        }
    }
}

/// Per-key failure inside a bulk mutation. These are folded into the
/// warning list of an otherwise successful response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MemberError {
    #[error("member '{member}' not found on '{owner}'")]
    NotFound { owner: String, member: String },

    #[error("member '{member}' on '{owner}' is read-only")]
    ReadOnly { owner: String, member: String },

    #[error("path '{path}' broken at '{segment}'")]
    BrokenPath { path: String, segment: String },

    #[error("cannot convert {value} to {expected} for '{member}'")]
    Conversion {
        member: String,
        expected: &'static str,
        value: String,
    },
}

pub type BridgeResult<T> = Result<T, BridgeError>;
