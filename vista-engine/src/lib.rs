pub mod camera;
pub mod command;
pub mod context;
pub mod host;
pub mod levels;
pub mod memory;
pub mod reconciler;
pub mod registry;
pub mod sections;
pub mod transaction;

pub mod errors {
    use thiserror::Error;
    use vista_core::model::ModelError;
    use vista_io::IoError;

    use crate::host::HostError;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("invalid input: {0}")]
        Validation(String),
        #[error("{what} `{name}` not found")]
        NotFound { what: &'static str, name: String },
        #[error("{what} `{name}` already exists")]
        Duplicate { what: &'static str, name: String },
        #[error("persistence failure: {0}")]
        Persistence(#[from] IoError),
        #[error("host state: {0}")]
        HostState(String),
        #[error("host operation failed: {0}")]
        Host(#[from] HostError),
    }

    impl EngineError {
        pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
            Self::NotFound {
                what,
                name: name.into(),
            }
        }

        pub fn duplicate(what: &'static str, name: impl Into<String>) -> Self {
            Self::Duplicate {
                what,
                name: name.into(),
            }
        }

        /// 错误分类名，便于结果信封与日志使用。
        pub fn kind(&self) -> &'static str {
            match self {
                EngineError::Validation(_) => "validation",
                EngineError::NotFound { .. } => "not_found",
                EngineError::Duplicate { .. } => "duplicate",
                EngineError::Persistence(_) => "persistence",
                EngineError::HostState(_) => "host_state",
                EngineError::Host(_) => "host",
            }
        }
    }

    impl From<ModelError> for EngineError {
        fn from(value: ModelError) -> Self {
            match value {
                ModelError::DuplicateName(name) => EngineError::duplicate("configuration", name),
                other => EngineError::Validation(other.to_string()),
            }
        }
    }

    pub type EngineResult<T> = Result<T, EngineError>;
}

pub use context::{EngineSettings, SessionContext};
pub use errors::{EngineError, EngineResult};
pub use host::SceneHost;
pub use levels::LevelManager;
pub use memory::MemoryHost;
pub use reconciler::Reconciler;
pub use registry::ViewConfigRegistry;
pub use sections::SectionGroupManager;
