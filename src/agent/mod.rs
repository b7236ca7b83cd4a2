//! Chat/agent capability abstraction.
//!
//! The [`ChatAgent`] trait decouples the daemon, runner, and gateway from
//! any particular language-model backend.

pub mod openai;

use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;

use crate::models::event::ExecutionChunk;
use crate::Result;

pub use openai::OpenAiCompatibleAgent;

/// Finite, non-restartable sequence of chunks produced by one `run`.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ExecutionChunk>> + Send>>;

/// Language-model capability consumed by the rest of the application.
pub trait ChatAgent: Send + Sync {
    /// Produce a single complete reply to `text`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Agent`](crate::AppError::Agent) if the backend fails.
    fn chat(&self, text: &str) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Start a run over `text`, yielding output chunks lazily.
    ///
    /// An `Err` item signals failure; consumers stop reading at that point.
    fn run(&self, text: &str) -> ChunkStream;
}
