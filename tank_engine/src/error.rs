use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("pool exhausted: {requested} environment(s) requested, {available} available")]
    PoolExhausted { requested: usize, available: usize },
    #[error("failed to extract `{path}`")]
    ExtractionFailed {
        path: String,
        #[source]
        source: Box<Error>,
    },
    #[error("sandbox failure: {0}")]
    SandboxFailure(String),
    #[error("testcase #{index} failed")]
    DomainFailure {
        index: usize,
        #[source]
        source: Box<Error>,
    },
    #[error("invalid session use: {0}")]
    InvalidSessionUse(String),
    #[error("worker panicked: {0}")]
    WorkerPanic(String),
    #[error("entity `{0}` not found")]
    NotFound(String),
    #[error("failed in IO")]
    IO(#[from] std::io::Error),
    #[error("argument provided is error: {0}")]
    Argument(String),
    #[error("broken archive")]
    Archive(#[from] zip::result::ZipError),
    #[error("config error")]
    Config(#[from] serde_yaml::Error),
    #[error("environment error: {0}")]
    Environment(String),
}

impl Error {
    pub(crate) fn extraction(path: &str, source: Error) -> Self {
        Error::ExtractionFailed {
            path: path.to_string(),
            source: Box::new(source),
        }
    }
}
