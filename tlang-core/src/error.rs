use thiserror::Error;

/// Host-facing diagnostics. Runtime failures inside the language are
/// in-band `Err` values, not variants here; this enum covers the
/// channels the driver reports before or around evaluation.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum Error {
    #[error("parser error: {msg}")]
    Parser { msg: String },

    #[error("could not read {path}: {msg}")]
    Io { path: String, msg: String },
}

impl Error {
    pub fn parser(msg: impl Into<String>) -> Self {
        Error::Parser { msg: msg.into() }
    }

    pub fn io(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Io {
            path: path.into(),
            msg: msg.into(),
        }
    }
}
