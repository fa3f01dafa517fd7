//! JSON-lines replay producer.
//!
//! Reads a file where every line is a serialized [`GenericRecord`] (the
//! format `hoard fetch` writes) and emits those records again, relabeled with
//! this instance's name. Used to bulk-import an export under a new origin.
//! Lines that fail to parse are skipped and counted.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::expand_tilde;
use crate::error::{ConfigError, FetchError};
use crate::producer::{
    emit, guarded, ConfigSlot, Producer, ProducerConfig, ProducerRef, RecordSender, Schema,
    Validate,
};
use crate::record::{GenericRecord, Record, RecordHeader};

pub const KIND: &str = "jsonl";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonLinesConfig {
    pub path: String,
}

impl Validate for JsonLinesConfig {
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.path.trim().is_empty(), "path must not be empty");
        Ok(())
    }
}

crate::producer_config!(JsonLinesConfig, validated);

#[derive(Debug)]
pub struct JsonLines {
    name: String,
    config: ConfigSlot<JsonLinesConfig>,
}

impl JsonLines {
    pub fn prototype() -> ProducerRef {
        Arc::new(Self {
            name: String::new(),
            config: ConfigSlot::new(JsonLinesConfig::default()),
        })
    }
}

#[async_trait]
impl Producer for JsonLines {
    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Attributes are whatever the exported records carried.
    fn schema(&self) -> Schema {
        Schema::new()
    }

    async fn fetch_blocks(
        &self,
        cancel: &CancellationToken,
        out: &RecordSender,
    ) -> Result<(), FetchError> {
        let config = self.config.load();
        let path = expand_tilde(&config.path);
        let file = guarded(cancel, tokio::fs::File::open(&path))
            .await?
            .with_context(|| format!("failed to open {}", path.display()))?;

        let mut lines = BufReader::new(file).lines();
        let mut emitted = 0usize;
        let mut skipped = 0usize;
        let mut line_no = 0usize;

        while let Some(line) = guarded(cancel, lines.next_line())
            .await?
            .with_context(|| format!("failed to read {}", path.display()))?
        {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let generic: GenericRecord = match serde_json::from_str(&line) {
                Ok(generic) => generic,
                Err(e) => {
                    warn!(name = %self.name, line = line_no, error = %e, "skipping malformed record");
                    skipped += 1;
                    continue;
                }
            };
            // Replayed records belong to this instance, whatever they were
            // exported from.
            let record =
                GenericRecord::new(RecordHeader::relabeled(&generic, &self.name), generic.attributes);
            emit(cancel, out, Box::new(record)).await?;
            emitted += 1;
        }

        info!(name = %self.name, emitted, skipped, "replay finished");
        Ok(())
    }

    fn config_type(&self) -> Box<dyn ProducerConfig> {
        Box::new(JsonLinesConfig::default())
    }

    fn set_config(&self, config: Box<dyn ProducerConfig>) -> Result<(), ConfigError> {
        self.config.replace(config.as_ref())
    }

    fn get_config(&self) -> Box<dyn ProducerConfig> {
        Box::new((*self.config.load()).clone())
    }

    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn factory(
        &self,
        name: &str,
        config: Box<dyn ProducerConfig>,
    ) -> anyhow::Result<ProducerRef> {
        let config = crate::producer::downcast_config::<JsonLinesConfig>(config.as_ref())?;
        config.validate()?;

        let path = expand_tilde(&config.path);
        anyhow::ensure!(
            tokio::fs::try_exists(&path).await.unwrap_or(false),
            "replay file {} does not exist",
            path.display()
        );

        Ok(Arc::new(Self {
            name: name.to_string(),
            config: ConfigSlot::new(config),
        }))
    }

    fn block_prototype(&self) -> Box<dyn Record> {
        Box::new(GenericRecord::default())
    }
}
