use std::net::IpAddr;

use config::SubnetId;
use lease_store::RepositoryError;
use thiserror::Error;

/// Why an allocation was rejected
#[derive(Error, Debug)]
pub enum AllocError {
    #[error("no eligible subnet for client")]
    NoSubnetSelected,
    #[error("client has no usable identifier")]
    MissingIdentifier,
    #[error("no free address in subnet {subnet}")]
    PoolExhausted { subnet: SubnetId },
    #[error("reserved address {addr} is in use by {holder}")]
    ReservationConflict { addr: IpAddr, holder: String },
    /// someone else wrote the address first
    #[error("lost race for {addr}")]
    RepositoryConflict { addr: IpAddr },
    #[error("lease repository unavailable: {0}")]
    RepositoryTransient(String),
    #[error(transparent)]
    Repository(RepositoryError),
    #[error("lease for {addr} skipped by hook")]
    HookSkipped { addr: IpAddr },
    #[error("no lease for {addr} held by client")]
    LeaseNotFound { addr: IpAddr },
}

impl AllocError {
    /// running selection and allocation again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AllocError::RepositoryConflict { .. } | AllocError::RepositoryTransient(_)
        )
    }
}

impl From<RepositoryError> for AllocError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Transient(msg) => AllocError::RepositoryTransient(msg),
            err => AllocError::Repository(err),
        }
    }
}
