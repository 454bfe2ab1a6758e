//! In-memory state behind the dispatcher.
//!
//! - [`instances`]: async operation instances and their chunk chains
//! - [`idempotency`]: replay cache for side-effecting calls
//! - [`todos`]: the reference domain's todo table
//! - [`media`]: uploaded attachments

pub mod idempotency;
pub mod instances;
pub mod media;
pub mod todos;

pub use idempotency::{IdempotencyCache, IdempotencyKey};
pub use instances::{ChunkLookupError, InstanceStore};
pub use media::{InMemoryMediaStore, MediaStore, StoredMedia};
pub use todos::{Todo, TodoStore};
