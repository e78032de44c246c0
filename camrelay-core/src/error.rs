use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("connection to {host}:{port} timed out")]
    ProbeTimeout { host: String, port: u16 },

    #[error("connection failed: {source}")]
    ProbeConnect {
        #[source]
        source: std::io::Error,
    },

    #[error("invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("failed to launch decoder `{binary}`: {source}")]
    DecoderLaunch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
