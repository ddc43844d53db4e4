use std::path::PathBuf;

/// Failures reported by a compute backend.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// No hypervisor family handles the declared disk format.
    #[error("no hypervisor can run disk format {0:?}")]
    HypervisorUnresolved(String),

    /// Neither session nor system endpoint is configured for the family.
    #[error("no connection endpoint configured for hypervisor {0}")]
    NoEndpoint(String),

    /// Any fault raised by the hypervisor control library.
    #[error("hypervisor call on {uri} failed")]
    Connection {
        uri: String,
        #[source]
        source: anyhow::Error,
    },

    /// Stop or suspend on a compute that was never started.
    #[error("compute {0} has no endpoint association, start it first")]
    NotAssociated(String),

    /// Cleanup of a per-compute file failed.
    #[error("filesystem operation on {path:?} failed")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted domain description is missing.
    #[error("domain description {0:?} not found")]
    DescriptionNotFound(PathBuf),

    /// The domain description could not be produced.
    #[error("couldn't marshal compute {id}")]
    Marshal {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A wait was aborted by its canceller.
    #[error("operation on compute {0} cancelled")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, ComputeError>;
