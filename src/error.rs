use crate::peg::ParseError;

/// A `Result` alias where the `Err` case is `pkgdep::Error`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    PegParse(ParseError),
    #[error("invalid atom: {atom:?}: {err}")]
    InvalidAtom { atom: String, err: String },
    #[error("{msg}")]
    InvalidDepString { msg: String, token: Option<usize> },
    #[error("{0}")]
    UnknownFlag(String),
    #[error("{0}")]
    Eapi(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("{0}")]
    InvalidValue(String),
    #[error("{0}")]
    Overflow(String),
}

impl Error {
    /// Create a dependency string error tied to a 1-based token position.
    pub(crate) fn dep_string<S: Into<String>>(msg: S, token: usize) -> Self {
        Error::InvalidDepString {
            msg: format!("{}, token {token}", msg.into()),
            token: Some(token),
        }
    }

    /// Create a dependency string error without a position.
    pub(crate) fn malformed<S: Into<String>>(msg: S) -> Self {
        Error::InvalidDepString { msg: msg.into(), token: None }
    }

    /// Return true if the error was triggered by a USE flag missing from IUSE.
    pub fn is_unknown_flag(&self) -> bool {
        matches!(self, Error::UnknownFlag(_))
    }

    /// Return true if the error was triggered by an EAPI policy violation.
    pub fn is_eapi(&self) -> bool {
        matches!(self, Error::Eapi(_))
    }

    /// Return the 1-based token position of a dependency string error, if known.
    pub fn token(&self) -> Option<usize> {
        match self {
            Error::InvalidDepString { token, .. } => *token,
            _ => None,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
