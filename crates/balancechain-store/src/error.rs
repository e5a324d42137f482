use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sled I/O failure: {0}")]
    Io(String),
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
    #[error("commit conflicted with a concurrent writer, retry")]
    Conflict,
    #[error("serialization failure: {0}")]
    Codec(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

impl From<balancechain_crypto::CodecError> for StoreError {
    fn from(e: balancechain_crypto::CodecError) -> Self {
        StoreError::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<StoreError> for balancechain_core::BalanceChainError {
    fn from(e: StoreError) -> Self {
        balancechain_core::BalanceChainError::Store(balancechain_core::StoreError::Io(e.to_string()))
    }
}
