//! The uniform record model.
//!
//! Every producer emits values implementing [`Record`]. A record has two
//! shapes: the storage-oriented [`GenericRecord`] (header plus an
//! [`Attributes`] map) and any number of producer-specific typed records.
//! Typed records flatten themselves to a generic record with
//! [`Record::to_generic`] and are rebuilt from one with
//! [`Record::reconstruct`], which must round-trip every field except
//! `origin`, which is taken from the caller.

pub mod attributes;

use std::any::Any;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use attributes::{parse_timestamp, Attributes};

/// Maximum length of [`Record::summary`] output, in characters.
pub const SUMMARY_MAX_CHARS: usize = 100;

/// Fields shared by every record, typed or generic.
///
/// The default header is empty with `created_at` at the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Producer-chosen key, deterministic and unique within the producer.
    pub id: String,
    /// Flattened text used for full-text search.
    pub text: String,
    /// When the underlying event happened (not when it was ingested).
    pub created_at: DateTime<Utc>,
    /// Instance name of the producer that emitted the record.
    pub origin: String,
}

impl RecordHeader {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            created_at,
            origin: origin.into(),
        }
    }

    /// Copy of `generic`'s header with the origin replaced.
    pub fn relabeled(generic: &GenericRecord, origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            ..generic.header.clone()
        }
    }
}

/// The capability every emitted record provides.
///
/// Object safe: producers push `Box<dyn Record>` into the output queue and
/// storage dispatches reconstruction through a prototype `Box<dyn Record>`.
pub trait Record: fmt::Debug + Send + Sync {
    fn header(&self) -> &RecordHeader;

    /// Everything needed to rebuild this record, keyed by attribute name.
    fn attributes(&self) -> Attributes;

    /// Multi-line human-readable rendering.
    fn render(&self) -> String;

    /// Rebuild a record of this record's concrete type from `generic`,
    /// labeling it with `origin`. Pure and deterministic; never fails.
    fn reconstruct(&self, generic: &GenericRecord, origin: &str) -> Box<dyn Record>;

    fn as_any(&self) -> &dyn Any;

    fn id(&self) -> &str {
        &self.header().id
    }

    fn text(&self) -> &str {
        &self.header().text
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.header().created_at
    }

    fn origin(&self) -> &str {
        &self.header().origin
    }

    /// Single-line summary, truncated to [`SUMMARY_MAX_CHARS`].
    fn summary(&self) -> String {
        let first_line = self.text().lines().next().unwrap_or_default();
        truncate_chars(first_line, SUMMARY_MAX_CHARS)
    }

    fn to_generic(&self) -> GenericRecord {
        GenericRecord {
            header: self.header().clone(),
            attributes: self.attributes(),
        }
    }
}

impl dyn Record {
    /// Downcast to a concrete typed record.
    pub fn downcast_ref<T: Record + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Storage and transport form of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericRecord {
    #[serde(flatten)]
    pub header: RecordHeader,
    #[serde(default)]
    pub attributes: Attributes,
}

impl GenericRecord {
    pub fn new(header: RecordHeader, attributes: Attributes) -> Self {
        Self { header, attributes }
    }
}

impl Record for GenericRecord {
    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn attributes(&self) -> Attributes {
        self.attributes.clone()
    }

    fn render(&self) -> String {
        let mut out = format!(
            "{}\n  id:      {}\n  origin:  {}\n  created: {}",
            self.summary(),
            self.header.id,
            self.header.origin,
            self.header.created_at.to_rfc3339()
        );
        for (key, value) in self.attributes.iter() {
            out.push_str(&format!("\n  {key}: {value}"));
        }
        out
    }

    fn reconstruct(&self, generic: &GenericRecord, origin: &str) -> Box<dyn Record> {
        Box::new(GenericRecord {
            header: RecordHeader::relabeled(generic, origin),
            attributes: generic.attributes.clone(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Truncate on a char boundary, appending `...` when anything was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
