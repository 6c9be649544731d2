use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed reference record `{key}`: {reason}")]
    Malformed { key: String, reason: String },
}

/// Failure inside one rule engine. The orchestrator nulls that engine's
/// result and keeps going with the others.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{engine} engine could not read reference data: {source}")]
    Reference {
        engine: &'static str,
        #[source]
        source: ReferenceError,
    },
}

impl EngineError {
    pub fn reference(engine: &'static str) -> impl FnOnce(ReferenceError) -> Self {
        move |source| Self::Reference { engine, source }
    }

    pub fn engine(&self) -> &'static str {
        match self {
            Self::Reference { engine, .. } => engine,
        }
    }
}
