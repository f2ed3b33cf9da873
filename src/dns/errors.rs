//! Error types for the domain store

use derive_more::{Display, Error, From};

#[derive(Debug, Display, From, Error)]
pub enum StoreError {
    #[display(fmt = "i/o error: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "bad mapping record: {}", _0)]
    Json(serde_json::Error),
    #[display(fmt = "bad mapping expiry: {}", _0)]
    Timestamp(chrono::ParseError),
    #[display(fmt = "bad configuration: {}", _0)]
    Config(toml::de::Error),
    #[display(fmt = "unrecognised format version: {}", version)]
    #[from(ignore)]
    UnsupportedVersion { version: String },
    #[display(fmt = "invalid configuration: {}", reason)]
    #[from(ignore)]
    InvalidConfig { reason: String },
    #[display(fmt = "domain store already started")]
    #[from(ignore)]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StoreError::UnsupportedVersion {
            version: "7".to_string(),
        };
        assert_eq!(format!("{}", error), "unrecognised format version: 7");

        let io: StoreError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(format!("{}", io).contains("gone"));
    }
}
