//! Error types for the infra backup operator
//!
//! Errors carry structured fields so log lines and status messages can say
//! which relation endpoint or resource kind was involved.

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Failure while reading or writing relation data
    #[error("relation error [{endpoint}]: {message}")]
    Relation {
        /// Relation endpoint name (e.g., "cluster-infra-backup")
        endpoint: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The payload kind being serialized (if known)
        kind: Option<String>,
    },
}

impl Error {
    /// Create a relation error for the given endpoint
    pub fn relation(endpoint: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Relation {
            endpoint: endpoint.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with payload kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_errors_name_the_endpoint() {
        let err = Error::relation("cluster-infra-backup", "patch rejected");
        assert_eq!(
            err.to_string(),
            "relation error [cluster-infra-backup]: patch rejected"
        );
    }

    #[test]
    fn serialization_errors_keep_kind() {
        let err = Error::serialization_for_kind("BackupSpec", "missing field");
        match &err {
            Error::Serialization { kind, .. } => assert_eq!(kind.as_deref(), Some("BackupSpec")),
            _ => panic!("Expected Serialization variant"),
        }
        assert_eq!(err.to_string(), "serialization error: missing field");
    }

    /// Story: a failed status write surfaces the API server's reason
    #[test]
    fn story_kube_errors_convert_with_question_mark() {
        fn write_status() -> Result<(), Error> {
            Err(kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: "configmaps is forbidden".to_string(),
                reason: "Forbidden".to_string(),
                code: 403,
            }))?;
            Ok(())
        }

        let err = write_status().unwrap_err();
        assert!(matches!(err, Error::Kube { .. }));
        assert!(err.to_string().contains("configmaps is forbidden"));
    }
}
