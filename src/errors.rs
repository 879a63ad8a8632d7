//! Error types for the crash game service
//!
//! Command-level errors are returned to the caller untouched; ledger and
//! store failures are wrapped so the engine can decide whether they block.

use rust_decimal::Decimal;

/// Root error type for service start-up and wiring
#[derive(Debug, thiserror::Error)]
pub enum CrashError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Errors surfaced by round engine commands and transitions
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("player already joined game")]
    AlreadyJoined,

    #[error("action invalid for current game state")]
    WrongState,

    #[error("player not found in round")]
    NotFound,

    #[error("player already cashed out")]
    AlreadyCashedOut,

    #[error("insufficient balance for bet")]
    InsufficientFunds,

    #[error("invalid bet amount: {0}")]
    InvalidAmount(Decimal),

    #[error("ledger operation failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("round store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("unable to draw round parameters: {0}")]
    Randomness(String),
}

impl GameError {
    /// Stable machine-readable code sent back to clients
    pub fn code(&self) -> &'static str {
        match self {
            GameError::AlreadyJoined => "ALREADY_JOINED",
            GameError::WrongState => "WRONG_STATE",
            GameError::NotFound => "NOT_FOUND",
            GameError::AlreadyCashedOut => "ALREADY_CASHED_OUT",
            GameError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            GameError::InvalidAmount(_) => "INVALID_AMOUNT",
            GameError::Ledger(_) => "LEDGER_FAILURE",
            GameError::Store(_) => "STORE_FAILURE",
            GameError::Randomness(_) => "RANDOMNESS_FAILURE",
        }
    }
}

/// Ledger capability failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient funds in {wallet}/{currency}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        wallet: String,
        currency: String,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("unknown wallet {wallet}/{currency}")]
    UnknownWallet { wallet: String, currency: String },

    #[error("ledger backend failure: {0}")]
    Backend(String),
}

/// Storage system errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::WriteFailed(e.to_string())
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        LedgerError::Backend(e.to_string())
    }
}

// Convenience type alias for Results
pub type CrashResult<T> = Result<T, CrashError>;
