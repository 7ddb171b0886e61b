pub mod config;
pub mod error;
pub mod types;

pub use error::{KeywardError, KeywardResult};
pub use types::{
    format_path, parse_path, share_word_count, Curve, MnemonicStandard, Namespace, HARDENED,
    SHARE_LENGTHS,
};
