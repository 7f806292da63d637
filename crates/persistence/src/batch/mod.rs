//! Chunked bulk operations.
//!
//! - [`BatchExecutor`] - create, update, upsert and delete records in chunks
//! - [`stream_batch_process`] - page through a producer with bounded memory
//! - [`parallel_batch_process`] - run chunk processing with bounded concurrency
//!
//! Each chunk commits on its own. A failure in a later chunk never rolls back
//! earlier ones; with `ignore_errors` the failure is recorded and processing
//! continues, otherwise the call stops at the first failed chunk.

mod config;
mod executor;
mod result;
mod stream;

pub use config::{BatchConfig, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY};
pub use executor::BatchExecutor;
pub use result::{BatchOperationResult, ChunkFailure};
pub use stream::{chunk, parallel_batch_process, stream_batch_process};
