use miette::Diagnostic;
use thiserror::Error;

/// Controller error type for cluster API and suspend/resume operations
#[derive(Error, Debug, Diagnostic)]
pub enum ControllerError {
    /// Object not found
    #[error("{kind} not found: {name}")]
    #[diagnostic(
        code(arrears::controller::not_found),
        help("The object may have been deleted concurrently. Deletes treat this as success")
    )]
    NotFound {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        name: String,
    },

    /// Object already exists
    #[error("{kind} already exists: {name}")]
    #[diagnostic(
        code(arrears::controller::already_exists),
        help("A previous generation with the same name is still present. Wait for its deletion before recreating it")
    )]
    AlreadyExists {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        name: String,
    },

    /// Admission rejected the request
    #[error("Creation of {kind} '{name}' was forbidden: {reason}")]
    #[diagnostic(
        code(arrears::controller::forbidden),
        help("Check the ResourceQuota objects in the namespace. A suspended namespace rejects any pod with resource limits")
    )]
    Forbidden {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        name: String,
        #[allow(unused)]
        reason: String,
    },

    /// API request failed
    #[error("API request failed: {message}")]
    #[diagnostic(
        code(arrears::controller::api_error),
        help("The request is retried on the next reconciliation. Verify the API server is reachable")
    )]
    ApiError {
        #[allow(unused)]
        message: String,
    },

    /// Watch stream ended before the awaited event
    #[error("Watch on namespace '{namespace}' closed before pod '{pod}' was confirmed deleted")]
    #[diagnostic(
        code(arrears::controller::watch_closed),
        help("The pod was deleted but its replacement is not created yet. The controller holds the replacement and creates it on its next pass over the namespace")
    )]
    WatchClosed {
        #[allow(unused)]
        namespace: String,
        #[allow(unused)]
        pod: String,
    },

    /// Deletion confirmation did not arrive in time
    #[error("Timed out after {timeout_secs}s waiting for deletion of pod '{namespace}/{pod}'")]
    #[diagnostic(
        code(arrears::controller::watch_timeout),
        help("The wait covers the pod's termination grace period plus recreate_timeout. The replacement is held and created once the old pod is gone")
    )]
    WatchTimeout {
        #[allow(unused)]
        namespace: String,
        #[allow(unused)]
        pod: String,
        #[allow(unused)]
        timeout_secs: u64,
    },

    /// Unmanaged pods kept appearing while the namespace was being blocked
    #[error("Namespace '{namespace}' still has {count} unparked unmanaged pod(s)")]
    #[diagnostic(
        code(arrears::controller::pods_not_parked),
        help("Something keeps creating pods without an owner. The suspend is retried on the next reconciliation")
    )]
    PodsNotParked {
        #[allow(unused)]
        namespace: String,
        #[allow(unused)]
        count: usize,
    },

    /// Update rejected because the object changed since it was read
    #[error("Conflict updating {kind} '{name}': {message}")]
    #[diagnostic(
        code(arrears::controller::conflict),
        help("The object was modified concurrently. Re-read it and retry the update")
    )]
    Conflict {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        name: String,
        #[allow(unused)]
        message: String,
    },

    /// Watch stream reported an error
    #[error("Watch failed: {message}")]
    #[diagnostic(
        code(arrears::controller::watch_failed),
        help("The watch is re-established on the next attempt")
    )]
    WatchFailed {
        #[allow(unused)]
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(arrears::controller::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Core library error
    #[error(transparent)]
    #[diagnostic(transparent)]
    CoreError(#[from] arrears_core::ArrearsError),
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;

impl ControllerError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn forbidden(
        kind: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Forbidden {
            kind: kind.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::ApiError {
            message: message.into(),
        }
    }

    pub fn watch_closed(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        Self::WatchClosed {
            namespace: namespace.into(),
            pod: pod.into(),
        }
    }

    pub fn watch_timeout(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self::WatchTimeout {
            namespace: namespace.into(),
            pod: pod.into(),
            timeout_secs,
        }
    }

    pub fn pods_not_parked(namespace: impl Into<String>, count: usize) -> Self {
        Self::PodsNotParked {
            namespace: namespace.into(),
            count,
        }
    }

    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn watch_failed(message: impl Into<String>) -> Self {
        Self::WatchFailed {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// True for the benign "object is already gone" condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<arrears_core::ResourceError> for ControllerError {
    fn from(e: arrears_core::ResourceError) -> Self {
        Self::CoreError(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(ControllerError::not_found("Pod", "tenant-a/web").is_not_found());
        assert!(!ControllerError::api_error("connection reset").is_not_found());
        assert!(ControllerError::already_exists("Pod", "tenant-a/web").is_already_exists());
    }

    #[test]
    fn test_watch_timeout_message() {
        let err = ControllerError::watch_timeout("tenant-a", "web", 10);
        assert_eq!(
            err.to_string(),
            "Timed out after 10s waiting for deletion of pod 'tenant-a/web'"
        );
    }

    #[test]
    fn test_resource_error_converts_through_core() {
        let err: ControllerError =
            arrears_core::ResourceError::MissingField("metadata.name".to_string()).into();
        assert!(matches!(err, ControllerError::CoreError(_)));
    }
}
