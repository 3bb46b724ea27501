//! Error kinds returned by the management operations.

use thiserror::Error;

/// Errors a management operation (`ADD` / `DEL` / `LIST`) can return to its
/// caller. The hot path never surfaces these: its failures are counted as
/// drops instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GwError {
    /// Malformed attribute, unknown `gwtype`, out-of-domain checksum index,
    /// or an `ADD` request with a zero source/destination index.
    #[error("invalid argument")]
    InvalidArg,
    /// Header `family != CAN`.
    #[error("address family not supported")]
    FamilyUnsupported,
    /// Job or buffer allocation failed.
    #[error("out of memory")]
    NoMem,
    /// An interface index does not resolve, or resolves to the wrong
    /// link-layer type.
    #[error("no such device")]
    NoDev,
    /// `DEL` found no byte-equal job.
    #[error("not found")]
    NotFound,
    /// Serialization overflow while building a `LIST` response batch; the
    /// current batch is truncated at the attribute boundary and the caller
    /// retries with the next cursor.
    #[error("message too large for this batch")]
    MsgTooLarge,
}
