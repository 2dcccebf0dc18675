use common::pod::PodError;
use common::Digest;

/// Errors surfaced by the Lakota engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying pod failure (transient I/O after retries, or a plain
    /// not-found outside the content-addressed area).
    #[error(transparent)]
    Pod(#[from] PodError),

    /// A revision references a blob that is absent from the pod. Never
    /// hidden: a read that would drop rows fails instead.
    #[error("missing blob: {digest}")]
    DataMissing { digest: Digest },

    /// Input frame does not match the collection schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Malformed manifest, commit blob, revision key or column payload.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("label not found: {0}")]
    LabelNotFound(String),

    #[error("label already exists: {0}")]
    LabelExists(String),

    #[error("invalid label: {0}")]
    InvalidLabel(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Maps a pod miss on a content-addressed key to [`Error::DataMissing`].
    pub(crate) fn blob(digest: Digest) -> impl FnOnce(PodError) -> Error {
        move |err| match err {
            PodError::NotFound(_) => Error::DataMissing { digest },
            other => Error::Pod(other),
        }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Error {
        Error::Corrupt(msg.into())
    }
}
