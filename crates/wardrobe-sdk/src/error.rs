use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("fixture error: {0}")]
    Fixture(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] wardrobe_store::StoreError),

    #[error("cascade error: {0}")]
    Cascade(#[from] wardrobe_fabric::FabricError),
}

impl From<toml::de::Error> for SdkError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
