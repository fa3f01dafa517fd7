#![allow(dead_code)]

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hoard::error::{ConfigError, FetchError};
use hoard::producer::{
    emit, pause, schema_of, ColumnKind, ConfigSlot, Producer, ProducerConfig, ProducerRef,
    RecordSender, Schema, Validate,
};
use hoard::record::{Attributes, GenericRecord, Record, RecordHeader};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Settings for [`MockProducer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Records emitted per fetch.
    pub records: usize,
    /// Delay before each record, simulating a slow upstream.
    pub delay_ms: u64,
    /// Fail the fetch once this many records were emitted.
    pub fail_after: Option<usize>,
    pub fail_factory: bool,
    pub fail_close: bool,
}

impl Validate for MockConfig {
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.records <= 1000, "records must be at most 1000");
        Ok(())
    }
}

hoard::producer_config!(MockConfig, validated);

/// Names of closed instances in close order, as `name#generation`.
pub type CloseLog = Arc<Mutex<Vec<String>>>;

/// Test producer emitting numbered [`NoteRecord`]s.
#[derive(Debug)]
pub struct MockProducer {
    kind: String,
    name: String,
    generation: usize,
    config: ConfigSlot<MockConfig>,
    generations: Arc<AtomicUsize>,
    closes: CloseLog,
}

impl MockProducer {
    /// Prototype for producer type `kind`, plus the log its instances close into.
    pub fn prototype(kind: &str) -> (ProducerRef, CloseLog) {
        let closes = CloseLog::default();
        let prototype = Arc::new(Self {
            kind: kind.to_string(),
            name: String::new(),
            generation: 0,
            config: ConfigSlot::new(MockConfig::default()),
            generations: Arc::new(AtomicUsize::new(0)),
            closes: closes.clone(),
        });
        (prototype, closes)
    }
}

#[async_trait]
impl Producer for MockProducer {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Schema {
        schema_of(&[("title", ColumnKind::Text), ("seq", ColumnKind::Integer)])
    }

    async fn fetch_blocks(
        &self,
        cancel: &CancellationToken,
        out: &RecordSender,
    ) -> Result<(), FetchError> {
        let config = self.config.load();
        for seq in 0..config.records {
            if config.fail_after == Some(seq) {
                return Err(FetchError::Failed(anyhow::anyhow!("upstream broke at {seq}")));
            }
            if config.delay_ms > 0 {
                pause(cancel, Duration::from_millis(config.delay_ms)).await?;
            }
            emit(cancel, out, Box::new(NoteRecord::numbered(&self.name, seq))).await?;
        }
        Ok(())
    }

    fn config_type(&self) -> Box<dyn ProducerConfig> {
        Box::new(MockConfig::default())
    }

    fn set_config(&self, config: Box<dyn ProducerConfig>) -> Result<(), ConfigError> {
        self.config.replace(config.as_ref())
    }

    fn get_config(&self) -> Box<dyn ProducerConfig> {
        Box::new((*self.config.load()).clone())
    }

    fn close(&self) -> anyhow::Result<()> {
        self.closes
            .lock()
            .unwrap()
            .push(format!("{}#{}", self.name, self.generation));
        anyhow::ensure!(!self.config.load().fail_close, "close failed for {}", self.name);
        Ok(())
    }

    async fn factory(
        &self,
        name: &str,
        config: Box<dyn ProducerConfig>,
    ) -> anyhow::Result<ProducerRef> {
        let config = hoard::producer::downcast_config::<MockConfig>(config.as_ref())?;
        anyhow::ensure!(!config.fail_factory, "upstream unreachable");
        Ok(Arc::new(Self {
            kind: self.kind.clone(),
            name: name.to_string(),
            generation: self.generations.fetch_add(1, Ordering::SeqCst) + 1,
            config: ConfigSlot::new(config),
            generations: self.generations.clone(),
            closes: self.closes.clone(),
        }))
    }

    fn block_prototype(&self) -> Box<dyn Record> {
        Box::new(NoteRecord::default())
    }
}

/// Typed record with a `title` accessor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteRecord {
    pub header: RecordHeader,
    pub title: String,
    pub seq: i64,
}

impl NoteRecord {
    pub fn numbered(origin: &str, seq: usize) -> Self {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::seconds(seq as i64);
        Self {
            header: RecordHeader::new(format!("note-{seq}"), format!("note {seq}"), created, origin),
            title: format!("Note {seq}"),
            seq: seq as i64,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

impl Record for NoteRecord {
    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn attributes(&self) -> Attributes {
        Attributes::new()
            .with("title", self.title.as_str())
            .with("seq", self.seq)
    }

    fn render(&self) -> String {
        format!("{}\n  seq: {}", self.title, self.seq)
    }

    fn reconstruct(&self, generic: &GenericRecord, origin: &str) -> Box<dyn Record> {
        Box::new(NoteRecord {
            header: RecordHeader::relabeled(generic, origin),
            title: generic.attributes.get_string("title", ""),
            seq: generic.attributes.get_i64("seq", 0),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry with a `mock` prototype registered under `kind`.
pub fn registry_with(kind: &str) -> (hoard::Registry, CloseLog) {
    let registry = hoard::Registry::new();
    let (prototype, closes) = MockProducer::prototype(kind);
    registry.register_prototype(prototype).unwrap();
    (registry, closes)
}

pub fn mock_config(config: MockConfig) -> Option<Box<dyn ProducerConfig>> {
    Some(Box::new(config))
}

/// Run one fetch and collect everything it emitted.
pub async fn collect(
    producer: &ProducerRef,
    cancel: &CancellationToken,
) -> (Vec<Box<dyn Record>>, Result<(), FetchError>) {
    let (tx, mut rx) = mpsc::channel(16);
    let fetch = async move { producer.fetch_blocks(cancel, &tx).await };
    let drain = async move {
        let mut records = Vec::new();
        while let Some(record) = rx.recv().await {
            records.push(record);
        }
        records
    };
    let (result, records) = tokio::join!(fetch, drain);
    (records, result)
}
