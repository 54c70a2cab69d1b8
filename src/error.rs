use ethers::types::H256;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid schema: {0}")]
    Schema(String),
    #[error("error while encoding attestation data: {0}")]
    Encoding(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("contract call failed: {0}")]
    Contract(String),
    #[error("transaction {0:?} dropped before confirmation")]
    Dropped(H256),
    #[error("transaction {0:?} reverted")]
    Reverted(H256),
    #[error("transaction {0:?} emitted no {1} event")]
    MissingEvent(H256, &'static str),
    #[error("attestation {0:?} not found")]
    AttestationNotFound(H256),
}
