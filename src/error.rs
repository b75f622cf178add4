use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid cluster configuration: {0}")]
    Config(String),

    #[error("term store i/o failure: {0}")]
    Storage(#[from] std::io::Error),

    #[error("term store record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("transport failure: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
