use thiserror::Error;

use crate::core::handlers::error::HandlerError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Handler '{tag}' failed to create forces: {source}")]
    Handler {
        tag: String,
        #[source]
        source: HandlerError,
    },

    #[error("Handler dependencies form a cycle among: {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("Topology has {topology} atoms but the system was sized for {system}")]
    ParticleCountMismatch { topology: usize, system: usize },
}
