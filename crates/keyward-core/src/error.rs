use thiserror::Error;

pub type KeywardResult<T> = Result<T, KeywardError>;

#[derive(Debug, Error)]
pub enum KeywardError {
    /// Derivation request outside every authorized namespace.
    #[error("forbidden key path: {path}")]
    ForbiddenPath { path: String },

    /// A share from a different split was offered to an in-progress share set.
    #[error("share set mismatch: {0}")]
    ShareSetMismatch(String),

    /// Persisted share set is internally inconsistent.
    #[error("corrupt share set: {0}")]
    CorruptShareSet(String),

    #[error("device is already initialized")]
    AlreadyInitialized,

    #[error("device is not initialized")]
    NotInitialized,

    #[error("unknown mnemonic standard: {0:#04x}")]
    UnknownStandard(u8),

    #[error("unknown curve: {0}")]
    UnknownCurve(String),

    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("invalid share: {0}")]
    InvalidShare(String),

    /// The combined shares do not satisfy the share set digest (a wrong share was entered).
    #[error("share digest mismatch: the entered shares do not belong together")]
    ShareDigestMismatch,

    #[error("share set incomplete: {remaining} more share(s) required")]
    IncompleteShareSet { remaining: u8 },

    /// Dry-run recovery: the entered mnemonic is valid but differs from the stored one.
    #[error("mnemonic is valid but does not match the one stored on the device")]
    MnemonicMismatch,

    #[error("invalid strength: {0} bits")]
    InvalidStrength(u32),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("key derivation error: {0}")]
    Derivation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
