//! Personal data hoarder: pluggable producers streaming uniform records.
//!
//! hoard pulls personal data (shell history, code-forge activity, replayed
//! exports, ...) from independent *producers* into one searchable record
//! model. Storage, scheduling and presentation live outside this crate; what
//! lives here is the contract that lets an open set of producers plug in:
//!
//! | Piece | Role |
//! |-------|------|
//! | [`record`] | Uniform [`Record`](record::Record) capability, the storage-oriented [`GenericRecord`](record::GenericRecord), and total attribute extractors |
//! | [`producer`] | The [`Producer`](producer::Producer) trait: identity, schema, streaming fetch, configuration lifecycle, factory |
//! | [`registry`] | Prototype catalog (by type) and instance catalog (by name) behind reader-writer locks |
//! | [`ingest`] | Helpers that drive fetches into bounded queues with cancellation |
//! | [`sources`] | Built-in producers: `shell_history`, `jsonl`, `forge` |
//!
//! # Lifecycle
//!
//! 1. Startup registers prototypes ([`sources::register_builtin`]).
//! 2. A driver builds a [`Registry`](registry::Registry) with
//!    `Registry::from_global()` and calls `create_instance(name, type, config)`.
//! 3. The driver calls `fetch_blocks` with a cancellation token and a queue,
//!    and persists whatever comes out, via
//!    [`Record::to_generic`](record::Record::to_generic).
//! 4. On reload, `Registry::reconstruct(type, generic, origin)` rebuilds the
//!    typed record.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`error`]: Registry, fetch and configuration error types

pub mod config;
pub mod error;
pub mod ingest;
pub mod producer;
pub mod record;
pub mod registry;
pub mod sources;

pub use error::{ConfigError, FetchError, RegistryError};
pub use producer::{Producer, ProducerConfig, ProducerRef};
pub use record::{Attributes, GenericRecord, Record, RecordHeader};
pub use registry::Registry;
