use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use slog::{Drain, OwnedKVList, Record};
use url::Url;

use crate::config::Level;
use crate::error::{Error, Result};
use crate::transports::{record_fields, Kind};

/// Options for the elasticsearch transport. All fields are optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ElasticsearchOptions {
    pub level: Level,
    /// Base URL of the cluster.
    pub url: String,
    /// Exact index name; overrides the prefix + date suffix scheme.
    pub index: Option<String>,
    pub index_prefix: String,
    /// `chrono` format string appended to the prefix.
    pub index_suffix_pattern: String,
    pub flush_interval_ms: u64,
    /// Documents buffered before a bulk flush. While flushes fail, at most
    /// ten times this many documents are retained, oldest dropped first.
    pub buffer_limit: usize,
    pub healthcheck_timeout_ms: u64,
}

impl Default for ElasticsearchOptions {
    fn default() -> Self {
        Self {
            level: Level::default(),
            url: "http://localhost:9200".to_string(),
            index: None,
            index_prefix: "logs".to_string(),
            index_suffix_pattern: "%Y.%m.%d".to_string(),
            flush_interval_ms: 2000,
            buffer_limit: 400,
            healthcheck_timeout_ms: 30_000,
        }
    }
}

impl ElasticsearchOptions {
    pub(crate) fn check(&self) -> Result<()> {
        Url::parse(&self.url).map_err(|e| Error::InvalidOption {
            kind: Kind::Elasticsearch,
            field: "url",
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn index_name(&self) -> String {
        match &self.index {
            Some(index) => index.clone(),
            None => format!(
                "{}-{}",
                self.index_prefix,
                Utc::now().format(&self.index_suffix_pattern)
            ),
        }
    }
}

struct BulkState {
    buffer: VecDeque<Value>,
    last_flush: Instant,
    healthchecked: bool,
    // Set after a failed flush; no delivery is attempted before it passes.
    backoff_until: Option<Instant>,
}

/// Buffers documents and ships them to the cluster's `_bulk` endpoint when
/// the buffer limit or the flush interval is reached. The first flush pings
/// the cluster health endpoint once. A failed flush holds delivery back for
/// one flush interval while the buffer keeps filling up to its cap.
pub struct ElasticsearchDrain {
    options: ElasticsearchOptions,
    client: reqwest::blocking::Client,
    state: Mutex<BulkState>,
}

pub(crate) fn drain(options: &ElasticsearchOptions) -> reqwest::Result<ElasticsearchDrain> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_millis(options.healthcheck_timeout_ms))
        .build()?;
    Ok(ElasticsearchDrain {
        options: options.clone(),
        client,
        state: Mutex::new(BulkState {
            buffer: VecDeque::new(),
            last_flush: Instant::now(),
            healthchecked: false,
            backoff_until: None,
        }),
    })
}

impl ElasticsearchDrain {
    fn document(&self, record: &Record, values: &OwnedKVList) -> Value {
        json!({
            "@timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "severity": record.level().as_str().to_lowercase(),
            "message": format!("{}", record.msg()),
            "fields": record_fields(record, values),
        })
    }

    fn flush(&self, state: &mut BulkState) -> io::Result<()> {
        if !state.healthchecked {
            let health = format!("{}/_cluster/health", self.options.url.trim_end_matches('/'));
            self.client
                .get(health)
                .send()
                .and_then(reqwest::blocking::Response::error_for_status)
                .map_err(io::Error::other)?;
            state.healthchecked = true;
        }

        let index = self.options.index_name();
        let mut body = String::new();
        for doc in &state.buffer {
            body.push_str(&json!({ "index": { "_index": index } }).to_string());
            body.push('\n');
            body.push_str(&doc.to_string());
            body.push('\n');
        }

        let bulk = format!("{}/_bulk", self.options.url.trim_end_matches('/'));
        self.client
            .post(bulk)
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(io::Error::other)?;

        state.buffer.clear();
        state.last_flush = Instant::now();
        state.backoff_until = None;
        Ok(())
    }
}

impl Drain for ElasticsearchDrain {
    type Ok = ();
    type Err = io::Error;

    fn log(&self, record: &Record, values: &OwnedKVList) -> io::Result<()> {
        let doc = self.document(record, values);
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::other("elasticsearch buffer state poisoned"))?;
        state.buffer.push_back(doc);
        let cap = self.options.buffer_limit.saturating_mul(10).max(1);
        while state.buffer.len() > cap {
            state.buffer.pop_front();
        }
        let interval = Duration::from_millis(self.options.flush_interval_ms);
        let due = state.buffer.len() >= self.options.buffer_limit
            || state.last_flush.elapsed() >= interval;
        let held_back = state.backoff_until.is_some_and(|at| Instant::now() < at);
        if due && !held_back {
            if let Err(err) = self.flush(&mut state) {
                state.backoff_until = Some(Instant::now() + interval);
                return Err(err);
            }
        }
        Ok(())
    }
}
