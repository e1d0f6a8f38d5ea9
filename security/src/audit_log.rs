//! Audit Logging
//!
//! Security events (authentication, privilege changes, admin actions, rate
//! limit blocks) are built into [`AuditEvent`]s and fanned out to sinks:
//! - [`TracingSink`]: structured records on the `audit` tracing target
//! - [`FileSink`]: append-only JSON lines with a SHA-256 hash chain
//!
//! Logging never fails the caller. Sink errors are reported and dropped.

use crate::clock::{system_clock, SharedClock};
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Tracing target used for audit records
pub const AUDIT_TARGET: &str = "audit";

/// Audit severity level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuditSeverity::Low => "low",
            AuditSeverity::Medium => "medium",
            AuditSeverity::High => "high",
            AuditSeverity::Critical => "critical",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for AuditSeverity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(AuditSeverity::Low),
            "medium" => Ok(AuditSeverity::Medium),
            "high" => Ok(AuditSeverity::High),
            "critical" => Ok(AuditSeverity::Critical),
            other => Err(format!("unknown audit severity: {}", other)),
        }
    }
}

/// Audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub event_id: Uuid,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Event name (`auth_attempt`, `admin_action`, ...)
    pub event: String,

    /// Severity level
    pub severity: AuditSeverity,

    /// Actor (user/service/system)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Client IP address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Structured detail
    #[serde(default)]
    pub detail: Map<String, Value>,

    /// Compliance tags
    #[serde(default)]
    pub compliance_tags: Vec<String>,

    /// Previous event hash (empty outside a hash chain)
    #[serde(default)]
    pub previous_hash: String,

    /// Current event hash
    #[serde(default)]
    pub hash: String,
}

/// Fields covered by the event hash
#[derive(Serialize)]
struct HashedFields<'a> {
    event_id: &'a Uuid,
    timestamp: &'a DateTime<Utc>,
    event: &'a str,
    severity: AuditSeverity,
    actor: &'a Option<String>,
    ip_address: &'a Option<String>,
    detail: &'a Map<String, Value>,
    compliance_tags: &'a [String],
    previous_hash: &'a str,
}

impl AuditEvent {
    /// Create new audit event
    pub fn new(
        event: impl Into<String>,
        severity: AuditSeverity,
        detail: Map<String, Value>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut event = Self {
            event_id: Uuid::new_v4(),
            timestamp,
            event: event.into(),
            severity,
            actor: None,
            ip_address: None,
            detail,
            compliance_tags: Vec::new(),
            previous_hash: String::new(),
            hash: String::new(),
        };
        event.hash = event.compute_hash();
        event
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self.hash = self.compute_hash();
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self.hash = self.compute_hash();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compliance_tags = tags.into_iter().map(Into::into).collect();
        self.hash = self.compute_hash();
        self
    }

    fn compute_hash(&self) -> String {
        let fields = HashedFields {
            event_id: &self.event_id,
            timestamp: &self.timestamp,
            event: &self.event,
            severity: self.severity,
            actor: &self.actor,
            ip_address: &self.ip_address,
            detail: &self.detail,
            compliance_tags: &self.compliance_tags,
            previous_hash: &self.previous_hash,
        };
        // Plain data with string keys always serializes
        let bytes = serde_json::to_vec(&fields).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Verify event hash
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Link to the previous event in a chain
    pub fn set_previous_hash(&mut self, previous_hash: String) {
        self.previous_hash = previous_hash;
        self.hash = self.compute_hash();
    }
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    /// Short name used in error reports
    fn name(&self) -> &str;

    /// Persist or forward one event
    fn write(&self, event: &AuditEvent) -> Result<()>;
}

/// Emits events on the `audit` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn write(&self, event: &AuditEvent) -> Result<()> {
        let detail = Value::Object(event.detail.clone()).to_string();
        let actor = event.actor.as_deref().unwrap_or("-");
        let ip = event.ip_address.as_deref().unwrap_or("-");
        let tags = event.compliance_tags.join(",");

        match event.severity {
            AuditSeverity::Low | AuditSeverity::Medium => info!(
                target: AUDIT_TARGET,
                event_id = %event.event_id,
                event = %event.event,
                severity = %event.severity,
                actor,
                ip,
                tags = %tags,
                detail = %detail,
                "audit event"
            ),
            AuditSeverity::High => warn!(
                target: AUDIT_TARGET,
                event_id = %event.event_id,
                event = %event.event,
                severity = %event.severity,
                actor,
                ip,
                tags = %tags,
                detail = %detail,
                "audit event"
            ),
            AuditSeverity::Critical => error!(
                target: AUDIT_TARGET,
                event_id = %event.event_id,
                event = %event.event,
                severity = %event.severity,
                actor,
                ip,
                tags = %tags,
                detail = %detail,
                "audit event"
            ),
        }
        Ok(())
    }
}

/// Collects events in memory; handy for tests and admin views
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn write(&self, event: &AuditEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Outcome of walking a hash-chained log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    /// Every line verified
    Intact { events: usize },
    /// First bad line (1-based) and what was wrong
    Broken { line: usize, reason: String },
}

impl IntegrityStatus {
    pub fn is_intact(&self) -> bool {
        matches!(self, IntegrityStatus::Intact { .. })
    }
}

struct FileState {
    file: File,
    last_hash: String,
}

/// Append-only JSON lines file with a hash chain
pub struct FileSink {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink").field("path", &self.path).finish()
    }
}

impl FileSink {
    /// Open (or create) the log, resuming the chain from its last line
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let last_hash = Self::last_hash(&path)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!("Audit log opened at {:?}", path);
        Ok(Self {
            path,
            state: Mutex::new(FileState { file, last_hash }),
        })
    }

    fn last_hash(path: &Path) -> Result<String> {
        if !path.exists() {
            return Ok(String::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut last_line = None;
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }

        match last_line {
            Some(line) => match serde_json::from_str::<AuditEvent>(&line) {
                Ok(event) => Ok(event.hash),
                Err(e) => {
                    warn!("Last audit line in {:?} is unreadable: {}", path, e);
                    Ok(String::new())
                }
            },
            None => Ok(String::new()),
        }
    }

    /// Log file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify log integrity (hash chain)
    pub fn verify_integrity(&self) -> Result<IntegrityStatus> {
        // Hold the writer lock so the chain is not extended mid-walk
        let _guard = self.state.lock();
        let reader = BufReader::new(File::open(&self.path)?);

        let mut previous_hash = String::new();
        let mut events = 0;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: AuditEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(e) => {
                    return Ok(IntegrityStatus::Broken {
                        line: i + 1,
                        reason: format!("unparseable event: {}", e),
                    })
                }
            };

            if !event.verify_hash() {
                return Ok(IntegrityStatus::Broken {
                    line: i + 1,
                    reason: "event hash mismatch".to_string(),
                });
            }
            if event.previous_hash != previous_hash {
                return Ok(IntegrityStatus::Broken {
                    line: i + 1,
                    reason: "hash chain broken".to_string(),
                });
            }

            previous_hash = event.hash;
            events += 1;
        }

        Ok(IntegrityStatus::Intact { events })
    }

    /// Search audit log
    pub fn search(
        &self,
        event: Option<&str>,
        actor: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEvent>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut results = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEvent = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable audit line: {}", e);
                    continue;
                }
            };

            if event.is_some_and(|name| entry.event != name) {
                continue;
            }
            if actor.is_some_and(|a| entry.actor.as_deref() != Some(a)) {
                continue;
            }
            if from.is_some_and(|start| entry.timestamp < start) {
                continue;
            }
            if to.is_some_and(|end| entry.timestamp > end) {
                continue;
            }

            results.push(entry);
        }

        Ok(results)
    }
}

impl AuditSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn write(&self, event: &AuditEvent) -> Result<()> {
        let mut state = self.state.lock();

        let mut event = event.clone();
        event.set_previous_hash(state.last_hash.clone());

        let mut line = serde_json::to_string(&event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        state.file.write_all(line.as_bytes())?;
        state.file.flush()?;
        state.last_hash = event.hash;
        Ok(())
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditLogConfig {
    /// Minimum severity to log
    pub min_severity: AuditSeverity,

    /// Emit events on the `audit` tracing target
    pub tracing: bool,

    /// Hash-chained log file, if any
    pub file_path: Option<PathBuf>,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            min_severity: AuditSeverity::Low,
            tracing: true,
            file_path: None,
        }
    }
}

/// Audit logger
pub struct AuditLogger {
    min_severity: AuditSeverity,
    sinks: Vec<Arc<dyn AuditSink>>,
    clock: SharedClock,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sinks: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("AuditLogger")
            .field("min_severity", &self.min_severity)
            .field("sinks", &sinks)
            .finish()
    }
}

impl AuditLogger {
    /// Logger with no sinks
    pub fn new(min_severity: AuditSeverity) -> Self {
        Self {
            min_severity,
            sinks: Vec::new(),
            clock: system_clock(),
        }
    }

    /// Build the sinks named in `config`
    pub fn from_config(config: &AuditLogConfig) -> Result<Self> {
        let mut logger = Self::new(config.min_severity);
        if config.tracing {
            logger = logger.with_sink(Arc::new(TracingSink));
        }
        if let Some(path) = &config.file_path {
            logger = logger.with_sink(Arc::new(FileSink::open(path)?));
        }
        Ok(logger)
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Build and record an event
    pub fn log(
        &self,
        event: &str,
        detail: Map<String, Value>,
        severity: AuditSeverity,
        compliance_tags: &[&str],
    ) {
        let event = AuditEvent::new(event, severity, detail, self.clock.now())
            .with_tags(compliance_tags.iter().copied());
        self.record(event);
    }

    /// Hand a prepared event to every sink
    pub fn record(&self, event: AuditEvent) {
        if event.severity < self.min_severity {
            return;
        }
        for sink in &self.sinks {
            if let Err(e) = sink.write(&event) {
                error!(
                    "Audit sink {} failed for event {} ({}): {}",
                    sink.name(),
                    event.event_id,
                    event.event,
                    e
                );
            }
        }
    }

    pub fn auth_attempt(&self, actor: &str, success: bool, ip: Option<&str>) {
        let severity = if success {
            AuditSeverity::Low
        } else {
            AuditSeverity::Medium
        };
        let mut event = AuditEvent::new(
            "auth_attempt",
            severity,
            detail(json!({ "success": success })),
            self.clock.now(),
        )
        .with_actor(actor)
        .with_tags(["pci-dss:10.2.4"]);
        if let Some(ip) = ip {
            event = event.with_ip(ip);
        }
        self.record(event);
    }

    pub fn suspicious_activity(&self, actor: &str, reason: &str) {
        let event = AuditEvent::new(
            "suspicious_activity",
            AuditSeverity::High,
            detail(json!({ "reason": reason })),
            self.clock.now(),
        )
        .with_actor(actor);
        self.record(event);
    }

    pub fn privilege_escalation(&self, actor: &str, from_role: &str, to_role: &str) {
        let event = AuditEvent::new(
            "privilege_escalation",
            AuditSeverity::Critical,
            detail(json!({ "from": from_role, "to": to_role })),
            self.clock.now(),
        )
        .with_actor(actor)
        .with_tags(["pci-dss:10.2.5"]);
        self.record(event);
    }

    pub fn admin_action(&self, actor: &str, action: &str, target: &str) {
        let event = AuditEvent::new(
            "admin_action",
            AuditSeverity::Medium,
            detail(json!({ "action": action, "target": target })),
            self.clock.now(),
        )
        .with_actor(actor)
        .with_tags(["pci-dss:10.2.2"]);
        self.record(event);
    }

    pub fn file_access(&self, actor: &str, path: &str, operation: &str) {
        let event = AuditEvent::new(
            "file_access",
            AuditSeverity::Low,
            detail(json!({ "path": path, "operation": operation })),
            self.clock.now(),
        )
        .with_actor(actor)
        .with_tags(["pci-dss:10.2.1"]);
        self.record(event);
    }

    pub fn config_change(&self, actor: &str, key: &str) {
        let event = AuditEvent::new(
            "config_change",
            AuditSeverity::High,
            detail(json!({ "key": key })),
            self.clock.now(),
        )
        .with_actor(actor)
        .with_tags(["pci-dss:10.2.2"]);
        self.record(event);
    }

    /// A rate limiter just imposed a block on `identifier`
    pub fn rate_limit_exceeded(&self, identifier: &str, blocked_until: DateTime<Utc>) {
        let event = AuditEvent::new(
            "rate_limit_exceeded",
            AuditSeverity::Medium,
            detail(json!({
                "identifier": identifier,
                "blocked_until": blocked_until.to_rfc3339(),
            })),
            self.clock.now(),
        );
        self.record(event);
    }
}

fn detail(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
