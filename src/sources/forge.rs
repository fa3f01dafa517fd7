//! Code-forge activity producer.
//!
//! Polls a GitHub-compatible public events endpoint
//! (`{api_url}/users/{user}/events`) page by page and emits one
//! [`ForgeEvent`] per event, newest first. Paging stops at `max_pages` or at
//! the first short page.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ConfigError, FetchError};
use crate::producer::{
    emit, guarded, pause, schema_of, ColumnKind, ConfigSlot, Producer, ProducerConfig,
    ProducerRef, RecordSender, Schema, Validate,
};
use crate::record::{parse_timestamp, Attributes, GenericRecord, Record, RecordHeader};

pub const KIND: &str = "forge";

const USER_AGENT: &str = concat!("hoard/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub api_url: String,
    pub user: String,
    /// Bearer token; raises rate limits and exposes private activity.
    pub token: Option<String>,
    pub max_pages: u32,
    pub per_page: u32,
    /// Delay between page requests.
    pub page_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Check `{api_url}/users/{user}` while constructing the instance.
    pub verify: bool,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".into(),
            user: String::new(),
            token: None,
            max_pages: 3,
            per_page: 30,
            page_delay_ms: 0,
            request_timeout_secs: 30,
            verify: false,
        }
    }
}

impl ForgeConfig {
    /// Web root matching `api_url`: `https://api.github.com` maps to
    /// `https://github.com`, and an enterprise or Gitea-style
    /// `https://host/api/v3` maps to `https://host`.
    pub fn web_url(&self) -> String {
        let api = self.api_url.trim_end_matches('/');
        for suffix in ["/api/v3", "/api/v1", "/api"] {
            if let Some(root) = api.strip_suffix(suffix) {
                return root.to_string();
            }
        }
        match api.split_once("://") {
            Some((scheme, host)) => match host.strip_prefix("api.") {
                Some(rest) => format!("{scheme}://{rest}"),
                None => api.to_string(),
            },
            None => api.to_string(),
        }
    }
}

impl Validate for ForgeConfig {
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.user.trim().is_empty(), "user must not be empty");
        anyhow::ensure!(
            self.api_url.starts_with("http://") || self.api_url.starts_with("https://"),
            "api_url must be an http(s) URL, got '{}'",
            self.api_url
        );
        anyhow::ensure!(self.max_pages >= 1, "max_pages must be at least 1");
        anyhow::ensure!(
            (1..=100).contains(&self.per_page),
            "per_page must be between 1 and 100"
        );
        anyhow::ensure!(self.request_timeout_secs > 0, "request_timeout_secs must be positive");
        Ok(())
    }
}

crate::producer_config!(ForgeConfig, validated);

#[derive(Debug)]
pub struct Forge {
    name: String,
    config: ConfigSlot<ForgeConfig>,
    client: reqwest::Client,
}

impl Forge {
    pub fn prototype() -> ProducerRef {
        Arc::new(Self {
            name: String::new(),
            config: ConfigSlot::new(ForgeConfig::default()),
            client: reqwest::Client::new(),
        })
    }

    fn request(&self, config: &ForgeConfig, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(Duration::from_secs(config.request_timeout_secs));
        match &config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_page(&self, config: &ForgeConfig, page: u32) -> anyhow::Result<Vec<Value>> {
        let url = format!(
            "{}/users/{}/events?per_page={}&page={}",
            config.api_url.trim_end_matches('/'),
            config.user,
            config.per_page,
            page
        );
        let response = self
            .request(config, &url)
            .send()
            .await
            .with_context(|| format!("request failed for {url}"))?;

        anyhow::ensure!(
            response.status().is_success(),
            "{url} returned HTTP {}",
            response.status()
        );

        response
            .json::<Vec<Value>>()
            .await
            .with_context(|| format!("unexpected response body from {url}"))
    }
}

#[async_trait]
impl Producer for Forge {
    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Schema {
        schema_of(&[
            ("event_type", ColumnKind::Text),
            ("repo", ColumnKind::Text),
            ("actor", ColumnKind::Text),
            ("url", ColumnKind::Text),
            ("action", ColumnKind::Text),
            ("git_ref", ColumnKind::Text),
            ("commits", ColumnKind::Text),
            ("public", ColumnKind::Integer),
        ])
    }

    async fn fetch_blocks(
        &self,
        cancel: &CancellationToken,
        out: &RecordSender,
    ) -> Result<(), FetchError> {
        let config = self.config.load();
        let delay = Duration::from_millis(config.page_delay_ms);
        let web_url = config.web_url();
        let mut emitted = 0usize;

        for page in 1..=config.max_pages {
            if page > 1 && !delay.is_zero() {
                pause(cancel, delay).await?;
            }

            let events = guarded(cancel, self.fetch_page(&config, page)).await??;
            debug!(name = %self.name, page, events = events.len(), "fetched page");

            let short_page = events.len() < config.per_page as usize;
            for event in &events {
                let Some(record) = ForgeEvent::from_api(event, &web_url, &self.name) else {
                    debug!(name = %self.name, "skipping event without id");
                    continue;
                };
                emit(cancel, out, Box::new(record)).await?;
                emitted += 1;
            }

            if short_page {
                break;
            }
        }

        info!(name = %self.name, user = %config.user, emitted, "forge fetch finished");
        Ok(())
    }

    fn config_type(&self) -> Box<dyn ProducerConfig> {
        Box::new(ForgeConfig::default())
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
        let config = crate::producer::downcast_config::<ForgeConfig>(config.as_ref())?;
        config.validate()?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;

        let producer = Self {
            name: name.to_string(),
            config: ConfigSlot::new(config.clone()),
            client,
        };

        if config.verify {
            let url = format!("{}/users/{}", config.api_url.trim_end_matches('/'), config.user);
            let response = producer
                .request(&config, &url)
                .send()
                .await
                .with_context(|| format!("cannot reach {url}"))?;
            anyhow::ensure!(
                response.status().is_success(),
                "{url} returned HTTP {}",
                response.status()
            );
            info!(name = %name, user = %config.user, "forge account verified");
        }

        Ok(Arc::new(producer))
    }

    fn block_prototype(&self) -> Box<dyn Record> {
        Box::new(ForgeEvent::default())
    }
}

/// One activity event from a code forge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForgeEvent {
    pub header: RecordHeader,
    /// Event type as reported by the API, e.g. `PushEvent`.
    pub event_type: String,
    /// `owner/name`.
    pub repo: String,
    pub actor: String,
    pub url: String,
    pub action: String,
    pub git_ref: String,
    /// Commit messages, for push events.
    pub commits: Vec<String>,
    pub public: bool,
}

impl ForgeEvent {
    /// Build from one element of the events API response, linking the
    /// repository under `web_url`. `None` when the event has no id.
    pub fn from_api(event: &Value, web_url: &str, origin: &str) -> Option<Self> {
        let id = match event.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let str_at = |pointer: &str| {
            event
                .pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let event_type = str_at("/type");
        let repo = str_at("/repo/name");
        let actor = str_at("/actor/login");
        let action = str_at("/payload/action");
        let git_ref = str_at("/payload/ref");
        let commits: Vec<String> = event
            .pointer("/payload/commits")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| c.get("message").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let created_at: DateTime<Utc> = event
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .unwrap_or_default();
        let url = if repo.is_empty() {
            String::new()
        } else {
            format!("{}/{repo}", web_url.trim_end_matches('/'))
        };

        let mut text = format!("{actor} {} {repo}", describe(&event_type, &action));
        for message in &commits {
            text.push('\n');
            text.push_str(message);
        }

        Some(Self {
            header: RecordHeader::new(id, text, created_at, origin),
            public: event.get("public").and_then(Value::as_bool).unwrap_or(true),
            event_type,
            repo,
            actor,
            url,
            action,
            git_ref,
            commits,
        })
    }
}

fn describe(event_type: &str, action: &str) -> String {
    let verb = match event_type {
        "PushEvent" => "pushed to",
        "CreateEvent" => "created",
        "DeleteEvent" => "deleted",
        "ForkEvent" => "forked",
        "WatchEvent" => "starred",
        "IssuesEvent" => "issue",
        "PullRequestEvent" => "pull request",
        "IssueCommentEvent" => "commented on",
        "ReleaseEvent" => "released",
        other => other,
    };
    if action.is_empty() {
        verb.to_string()
    } else {
        format!("{verb} {action}")
    }
}

impl Record for ForgeEvent {
    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn attributes(&self) -> Attributes {
        Attributes::new()
            .with("event_type", self.event_type.as_str())
            .with("repo", self.repo.as_str())
            .with("actor", self.actor.as_str())
            .with("url", self.url.as_str())
            .with("action", self.action.as_str())
            .with("git_ref", self.git_ref.as_str())
            .with("commits", self.commits.clone())
            .with("public", self.public)
    }

    fn render(&self) -> String {
        let mut out = format!(
            "{} [{}]\n  repo:  {}\n  when:  {}\n  url:   {}",
            self.summary(),
            self.event_type,
            self.repo,
            self.header.created_at.to_rfc3339(),
            self.url
        );
        if !self.git_ref.is_empty() {
            out.push_str(&format!("\n  ref:   {}", self.git_ref));
        }
        for message in &self.commits {
            out.push_str(&format!("\n  - {}", message.lines().next().unwrap_or_default()));
        }
        out
    }

    // Older exports kept commit messages newline-joined in one string.
    fn reconstruct(&self, generic: &GenericRecord, origin: &str) -> Box<dyn Record> {
        let attrs = &generic.attributes;
        Box::new(ForgeEvent {
            header: RecordHeader::relabeled(generic, origin),
            event_type: attrs.get_string("event_type", ""),
            repo: attrs.get_string("repo", ""),
            actor: attrs.get_string("actor", ""),
            url: attrs.get_string("url", ""),
            action: attrs.get_string("action", ""),
            git_ref: attrs.get_string("git_ref", ""),
            commits: attrs.get_string_list("commits", '\n'),
            public: attrs.get_bool("public", true),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const GITHUB: &str = "https://github.com";

    fn push_event() -> Value {
        json!({
            "id": "30000000001",
            "type": "PushEvent",
            "actor": {"login": "octo"},
            "repo": {"name": "octo/hoard"},
            "payload": {
                "ref": "refs/heads/main",
                "commits": [
                    {"message": "fix registry close order"},
                    {"message": "add shell history source"}
                ]
            },
            "public": true,
            "created_at": "2024-03-01T08:00:00Z"
        })
    }

    #[test]
    fn builds_event_from_api_payload() {
        let event = ForgeEvent::from_api(&push_event(), GITHUB, "gh").unwrap();
        assert_eq!(event.header.id, "30000000001");
        assert_eq!(event.header.origin, "gh");
        assert_eq!(event.repo, "octo/hoard");
        assert_eq!(event.url, "https://github.com/octo/hoard");
        assert_eq!(event.commits.len(), 2);
        assert_eq!(
            event.header.created_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
        );
        assert!(event.summary().starts_with("octo pushed to octo/hoard"));
        assert!(event.text().contains("add shell history source"));
    }

    #[test]
    fn links_follow_the_configured_forge() {
        let web_url = |api_url: &str| {
            ForgeConfig {
                api_url: api_url.into(),
                ..Default::default()
            }
            .web_url()
        };
        assert_eq!(web_url("https://api.github.com"), "https://github.com");
        assert_eq!(web_url("https://git.corp.example/api/v3/"), "https://git.corp.example");
        assert_eq!(web_url("https://codeberg.org/api/v1"), "https://codeberg.org");
        assert_eq!(web_url("http://127.0.0.1:8080"), "http://127.0.0.1:8080");

        let event =
            ForgeEvent::from_api(&push_event(), &web_url("https://codeberg.org/api/v1"), "cb")
                .unwrap();
        assert_eq!(event.url, "https://codeberg.org/octo/hoard");
    }

    #[test]
    fn event_without_id_is_skipped() {
        assert!(ForgeEvent::from_api(&json!({"type": "PushEvent"}), GITHUB, "gh").is_none());
    }

    #[test]
    fn event_round_trips() {
        let event = ForgeEvent::from_api(&push_event(), GITHUB, "gh").unwrap();
        let rebuilt = event.reconstruct(&event.to_generic(), "work");
        let rebuilt = rebuilt.downcast_ref::<ForgeEvent>().unwrap();

        let mut expected = event.clone();
        expected.header.origin = "work".into();
        assert_eq!(rebuilt, &expected);

        // Reconstructing twice gives the same record.
        let again = event.reconstruct(&event.to_generic(), "work");
        assert_eq!(again.downcast_ref::<ForgeEvent>(), Some(rebuilt));
    }

    #[test]
    fn reconstruct_accepts_joined_commits() {
        let generic = GenericRecord::new(
            RecordHeader::new("1", "t", Utc::now(), "old"),
            Attributes::new()
                .with("commits", "first\nsecond")
                .with("public", 0),
        );
        let rebuilt = ForgeEvent::default().reconstruct(&generic, "new");
        let rebuilt = rebuilt.downcast_ref::<ForgeEvent>().unwrap();
        assert_eq!(rebuilt.commits, vec!["first", "second"]);
        assert!(!rebuilt.public);
        assert_eq!(rebuilt.event_type, "");
    }

    #[test]
    fn validation() {
        let ok = ForgeConfig {
            user: "octo".into(),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        assert!(ForgeConfig::default().validate().is_err());
        assert!(ForgeConfig {
            per_page: 500,
            ..ok.clone()
        }
        .validate()
        .is_err());
        assert!(ForgeConfig {
            api_url: "ftp://example.com".into(),
            ..ok
        }
        .validate()
        .is_err());
    }
}
