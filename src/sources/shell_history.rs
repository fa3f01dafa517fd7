//! Shell history producer.
//!
//! Reads a shell history file and emits one [`CommandRecord`] per command,
//! newest first. Both plain history (one command per line) and the zsh
//! extended format (`: <epoch>:<duration>;<command>`) are understood;
//! trailing-backslash continuation lines are joined into one command. Plain
//! entries carry no timestamp and are stamped with the file's modification
//! time. Record ids never depend on line numbers or the modification time;
//! see [`HistoryEntry::record_id`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::expand_tilde;
use crate::error::{ConfigError, FetchError};
use crate::producer::{
    emit, guarded, schema_of, ColumnKind, ConfigSlot, Producer, ProducerConfig, ProducerRef,
    RecordSender, Schema, Validate,
};
use crate::record::{Attributes, GenericRecord, Record, RecordHeader};

pub const KIND: &str = "shell_history";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellHistoryConfig {
    /// History file; `~/` is expanded.
    pub path: String,
    /// Emit at most this many of the newest commands. `0` means all.
    pub max_entries: usize,
    /// Commands starting with any of these prefixes are skipped.
    pub ignore_prefixes: Vec<String>,
}

impl Default for ShellHistoryConfig {
    fn default() -> Self {
        Self {
            path: "~/.zsh_history".into(),
            max_entries: 0,
            ignore_prefixes: Vec::new(),
        }
    }
}

impl Validate for ShellHistoryConfig {
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.path.trim().is_empty(), "path must not be empty");
        anyhow::ensure!(
            self.ignore_prefixes.iter().all(|p| !p.is_empty()),
            "ignore_prefixes must not contain empty strings"
        );
        Ok(())
    }
}

crate::producer_config!(ShellHistoryConfig, validated);

#[derive(Debug)]
pub struct ShellHistory {
    name: String,
    config: ConfigSlot<ShellHistoryConfig>,
    closed: AtomicBool,
}

impl ShellHistory {
    /// Zero-configuration prototype for registration.
    pub fn prototype() -> ProducerRef {
        Arc::new(Self::with_config(String::new(), ShellHistoryConfig::default()))
    }

    fn with_config(name: String, config: ShellHistoryConfig) -> Self {
        Self {
            name,
            config: ConfigSlot::new(config),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Producer for ShellHistory {
    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Schema {
        schema_of(&[
            ("command", ColumnKind::Text),
            ("program", ColumnKind::Text),
            ("arguments", ColumnKind::Text),
            ("duration_secs", ColumnKind::Integer),
            ("line", ColumnKind::Integer),
            ("extended", ColumnKind::Integer),
            ("executed_at", ColumnKind::Text),
        ])
    }

    async fn fetch_blocks(
        &self,
        cancel: &CancellationToken,
        out: &RecordSender,
    ) -> Result<(), FetchError> {
        let config = self.config.load();
        let path = expand_tilde(&config.path);

        let bytes = guarded(cancel, tokio::fs::read(&path))
            .await?
            .with_context(|| format!("failed to read history file {}", path.display()))?;
        let modified = guarded(cancel, tokio::fs::metadata(&path))
            .await?
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from)
            .unwrap_or_default();

        let contents = String::from_utf8_lossy(&bytes);
        let mut entries = parse_history(&contents);
        entries.retain(|e| {
            !config
                .ignore_prefixes
                .iter()
                .any(|prefix| e.command.starts_with(prefix.as_str()))
        });
        entries.reverse();
        if config.max_entries > 0 {
            entries.truncate(config.max_entries);
        }

        info!(name = %self.name, path = %path.display(), entries = entries.len(), "reading shell history");

        for entry in entries {
            let record = CommandRecord::from_entry(entry, modified, &self.name);
            debug!(id = %record.header.id, "emitting command");
            emit(cancel, out, Box::new(record)).await?;
        }
        Ok(())
    }

    fn config_type(&self) -> Box<dyn ProducerConfig> {
        Box::new(ShellHistoryConfig::default())
    }

    fn set_config(&self, config: Box<dyn ProducerConfig>) -> Result<(), ConfigError> {
        self.config.replace(config.as_ref())
    }

    fn get_config(&self) -> Box<dyn ProducerConfig> {
        Box::new((*self.config.load()).clone())
    }

    fn close(&self) -> anyhow::Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(name = %self.name, "shell history closed");
        }
        Ok(())
    }

    async fn factory(
        &self,
        name: &str,
        config: Box<dyn ProducerConfig>,
    ) -> anyhow::Result<ProducerRef> {
        let producer = Self::with_config(name.to_string(), ShellHistoryConfig::default());
        producer.config.replace(config.as_ref())?;

        let path = expand_tilde(&producer.config.load().path);
        let meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("history file {} is not readable", path.display()))?;
        anyhow::ensure!(meta.is_file(), "{} is not a file", path.display());

        Ok(Arc::new(producer))
    }

    fn block_prototype(&self) -> Box<dyn Record> {
        Box::new(CommandRecord::default())
    }
}

/// One parsed history line (or joined continuation lines).
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// 1-based line where the entry starts.
    pub line: usize,
    pub command: String,
    pub executed_at: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    /// Earlier entries in the file with the same command and timestamp.
    pub occurrence: usize,
}

impl HistoryEntry {
    /// Record id, independent of line numbers and file metadata so that
    /// appending to or trimming the history keeps existing ids.
    ///
    /// Extended entries use `<epoch>:<digest>`, plus `#<n>` for the n-th
    /// repeat within the same second. Plain entries use `<digest>:<n>`.
    pub fn record_id(&self) -> String {
        let digest = command_digest(&self.command);
        match self.executed_at {
            Some(at) if self.occurrence == 0 => format!("{}:{digest}", at.timestamp()),
            Some(at) => format!("{}:{digest}#{}", at.timestamp(), self.occurrence),
            None => format!("{digest}:{}", self.occurrence),
        }
    }
}

/// First 16 hex digits of the command's SHA-256.
fn command_digest(command: &str) -> String {
    let hash = Sha256::digest(command.as_bytes());
    hash.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Parse history text into entries, oldest first.
pub fn parse_history(contents: &str) -> Vec<HistoryEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<HistoryEntry> = None;

    for (idx, raw) in contents.lines().enumerate() {
        if pending.is_none() {
            if raw.trim().is_empty() {
                continue;
            }
            pending = Some(parse_line(idx + 1, raw));
        } else if let Some(entry) = pending.as_mut() {
            entry.command.push('\n');
            entry.command.push_str(raw);
        }

        let continues = pending
            .as_ref()
            .map(|e| e.command.ends_with('\\'))
            .unwrap_or(false);
        if continues {
            if let Some(entry) = pending.as_mut() {
                entry.command.pop();
            }
        } else if let Some(entry) = pending.take() {
            if !entry.command.trim().is_empty() {
                entries.push(entry);
            }
        }
    }

    if let Some(entry) = pending {
        if !entry.command.trim().is_empty() {
            entries.push(entry);
        }
    }

    let mut seen: HashMap<(Option<i64>, String), usize> = HashMap::new();
    for entry in &mut entries {
        let key = (entry.executed_at.map(|at| at.timestamp()), entry.command.clone());
        let count = seen.entry(key).or_default();
        entry.occurrence = *count;
        *count += 1;
    }
    entries
}

fn parse_line(line: usize, raw: &str) -> HistoryEntry {
    let plain = HistoryEntry {
        line,
        command: raw.to_string(),
        executed_at: None,
        duration_secs: 0,
        occurrence: 0,
    };

    let Some(rest) = raw.strip_prefix(": ") else {
        return plain;
    };
    let Some((meta, command)) = rest.split_once(';') else {
        return plain;
    };
    let Some((epoch, duration)) = meta.split_once(':') else {
        return plain;
    };
    let Some(executed_at) = epoch
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    else {
        return plain;
    };

    HistoryEntry {
        line,
        command: command.to_string(),
        executed_at: Some(executed_at),
        duration_secs: duration.trim().parse().unwrap_or(0),
        occurrence: 0,
    }
}

/// A shell command from history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandRecord {
    pub header: RecordHeader,
    pub command: String,
    pub program: String,
    pub arguments: Vec<String>,
    pub duration_secs: i64,
    pub line: i64,
    /// Whether the entry came with its own timestamp.
    pub extended: bool,
    pub executed_at: DateTime<Utc>,
}

impl CommandRecord {
    fn from_entry(entry: HistoryEntry, fallback_time: DateTime<Utc>, origin: &str) -> Self {
        let id = entry.record_id();
        let executed_at = entry.executed_at.unwrap_or(fallback_time);
        let mut words = entry.command.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_default();
        let arguments: Vec<String> = words.collect();

        Self {
            header: RecordHeader::new(
                id,
                entry.command.clone(),
                executed_at,
                origin,
            ),
            command: entry.command,
            program,
            arguments,
            duration_secs: entry.duration_secs,
            line: entry.line as i64,
            extended: entry.executed_at.is_some(),
            executed_at,
        }
    }
}

impl Record for CommandRecord {
    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn attributes(&self) -> Attributes {
        Attributes::new()
            .with("command", self.command.as_str())
            .with("program", self.program.as_str())
            .with("arguments", self.arguments.clone())
            .with("duration_secs", self.duration_secs)
            .with("line", self.line)
            .with("extended", self.extended)
            .with("executed_at", self.executed_at.to_rfc3339())
    }

    fn render(&self) -> String {
        let mut out = format!("$ {}", self.command);
        out.push_str(&format!("\n  at:       {}", self.executed_at.to_rfc3339()));
        if self.duration_secs > 0 {
            out.push_str(&format!("\n  duration: {}s", self.duration_secs));
        }
        out.push_str(&format!("\n  origin:   {} (line {})", self.header.origin, self.line));
        out
    }

    fn summary(&self) -> String {
        crate::record::truncate_chars(
            &format!("$ {}", self.command.replace('\n', " ")),
            crate::record::SUMMARY_MAX_CHARS,
        )
    }

    // Records written before `arguments` was a list stored it space-separated.
    fn reconstruct(&self, generic: &GenericRecord, origin: &str) -> Box<dyn Record> {
        let attrs = &generic.attributes;
        let command = attrs.get_string("command", &generic.header.text);
        Box::new(CommandRecord {
            header: RecordHeader::relabeled(generic, origin),
            program: attrs.get_string("program", ""),
            arguments: attrs.get_string_list("arguments", ' '),
            duration_secs: attrs.get_i64("duration_secs", 0),
            line: attrs.get_i64("line", 0),
            extended: attrs.get_bool("extended", false),
            executed_at: attrs.get_time("executed_at", generic.header.created_at),
            command,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
