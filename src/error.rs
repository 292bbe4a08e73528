use thiserror::Error;

/// Which daily cap was hit when a send gets deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityScope {
    Tenant,
    Mailbox,
}

/// Failures in the dispatch and tracking domain.
///
/// The dispatcher branches on the variant: capacity errors defer the job
/// without burning an attempt, transient transport errors retry with backoff,
/// permanent transport errors revoke the identity and fail the job outright.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A daily limit is exhausted. Not an attempt failure: the job stays PENDING.
    #[error("daily send capacity exhausted ({0:?})")]
    CapacityExhausted(CapacityScope),

    /// The tenant has no usable mailbox at all. Counts against attempts.
    #[error("no active mailbox identity for tenant {0}")]
    NoActiveIdentity(String),

    /// Transient transport failure (network, 5xx). Retried with backoff.
    #[error("transport error: {0}")]
    Transport(String),

    /// Unrecoverable transport failure (authorization revoked).
    #[error("permanent transport error: {0}")]
    TransportPermanent(String),

    /// Unknown pixel/click token. Logged, never surfaced to the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl DispatchError {
    /// Capacity deferrals are not failures; everything else burns an attempt.
    pub fn is_capacity(&self) -> bool {
        matches!(self, DispatchError::CapacityExhausted(_))
    }
}
