//! The producer contract.
//!
//! A [`Producer`] is one configured data source. The registry keeps one
//! zero-configuration *prototype* per producer type and calls its
//! [`Producer::factory`] to build named, configured instances. Drivers then
//! call [`Producer::fetch_blocks`] with a cancellation token and a bounded
//! queue, and read records off the other end.
//!
//! Producers must observe cancellation at every blocking point. The helpers
//! [`emit`], [`pause`] and [`guarded`] race a send, a delay or an upstream
//! future against the token and return [`FetchError::Cancelled`] when it
//! fires first.

pub mod config;
pub mod schema;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, FetchError};
use crate::record::Record;

pub use config::{downcast_config, validate_config, ConfigSlot, EmptyConfig, ProducerConfig, Validate};
pub use schema::{schema_of, ColumnKind, Schema};

/// Sending half of the record queue handed to `fetch_blocks`.
pub type RecordSender = mpsc::Sender<Box<dyn Record>>;

/// Receiving half, owned by the driver.
pub type RecordReceiver = mpsc::Receiver<Box<dyn Record>>;

/// Shared handle to a live producer.
pub type ProducerRef = Arc<dyn Producer>;

#[async_trait]
pub trait Producer: fmt::Debug + Send + Sync {
    /// Producer type, e.g. `"shell_history"`. Same for every instance.
    fn kind(&self) -> &str;

    /// Instance name. Records emitted by this instance carry it as `origin`.
    fn name(&self) -> &str;

    /// Attributes this producer writes and how to store them.
    fn schema(&self) -> Schema;

    /// Stream records into `out` until done, failed or cancelled.
    ///
    /// The queue belongs to the caller and is never closed here. Records
    /// pushed before an error stay pushed. A failed run leaves the instance
    /// usable for the next call.
    async fn fetch_blocks(
        &self,
        cancel: &CancellationToken,
        out: &RecordSender,
    ) -> Result<(), FetchError>;

    /// Default-valued configuration of this producer's shape. Drivers decode
    /// external settings through it.
    fn config_type(&self) -> Box<dyn ProducerConfig>;

    /// Validate and atomically install `config`.
    fn set_config(&self, config: Box<dyn ProducerConfig>) -> Result<(), ConfigError>;

    fn get_config(&self) -> Box<dyn ProducerConfig>;

    /// Release resources held by this instance.
    fn close(&self) -> anyhow::Result<()>;

    /// Build a new, fully initialized instance named `name`.
    async fn factory(
        &self,
        name: &str,
        config: Box<dyn ProducerConfig>,
    ) -> anyhow::Result<ProducerRef>;

    /// Zero-valued typed record, used to reach this type's
    /// [`Record::reconstruct`].
    fn block_prototype(&self) -> Box<dyn Record>;
}

/// Push one record, giving up if `cancel` fires while the queue is full.
pub async fn emit(
    cancel: &CancellationToken,
    out: &RecordSender,
    record: Box<dyn Record>,
) -> Result<(), FetchError> {
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        sent = out.send(record) => sent.map_err(|_| FetchError::QueueClosed),
    }
}

/// Sleep for `delay` unless cancelled first.
pub async fn pause(cancel: &CancellationToken, delay: Duration) -> Result<(), FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Await an upstream operation unless cancelled first.
pub async fn guarded<F>(cancel: &CancellationToken, upstream: F) -> Result<F::Output, FetchError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        output = upstream => Ok(output),
    }
}
