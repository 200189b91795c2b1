//! Built-in event subscribers.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::config::MutationConfig;
use super::events::{EventBus, EventSubscriber, MutationEvent, SubscriberError, now_timestamp_ms};
use super::mutant::{Mutant, Verdict};
use super::process::truncate_preview;

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl EventSubscriber for TracingProgress {
    fn name(&self) -> &str {
        "tracing-progress"
    }

    fn on_event(&self, event: &MutationEvent) -> Result<(), SubscriberError> {
        match event {
            MutationEvent::BaselineStarted => info!("baseline started"),
            MutationEvent::BaselineFinished {
                successful,
                outcome,
            } => {
                if *successful {
                    info!(duration_ms = outcome.duration.as_millis() as u64, "baseline finished");
                } else {
                    warn!(
                        exit_code = ?outcome.exit_code,
                        reason = outcome.exit_code_text(),
                        "baseline did not pass"
                    );
                }
            }
            MutationEvent::MutationTestingStarted { total } => {
                info!(total, "mutation testing started")
            }
            MutationEvent::MutantTested {
                mutant,
                completed,
                total,
                ..
            } => info!(
                "[{completed}/{total}] {} {}",
                mutant.verdict(),
                mutant.id()
            ),
            MutationEvent::MutationTestingFinished { counts } => info!(
                killed = counts.killed,
                escaped = counts.escaped,
                timeout = counts.timeout,
                error = counts.error,
                "mutation testing finished"
            ),
        }
        Ok(())
    }
}

/// Appends one JSON record per event to a file.
///
/// Records carry a `timestamp_ms` field; captured output is cut to a preview.
#[derive(Debug)]
pub struct JsonlEventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlEventLog {
    /// Open `path` for appending, creating parent directories.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, SubscriberError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn event_record(event: &MutationEvent) -> Result<Value, SubscriberError> {
    let mut value = serde_json::to_value(event)?;
    for pointer in ["/outcome", "/mutant/outcome"] {
        if let Some(outcome) = value.pointer_mut(pointer) {
            for stream in ["stdout", "stderr"] {
                if let Some(Value::String(text)) = outcome.get_mut(stream) {
                    *text = truncate_preview(text);
                }
            }
        }
    }
    if let Value::Object(map) = &mut value {
        map.insert("timestamp_ms".to_string(), now_timestamp_ms().into());
    }
    Ok(value)
}

impl EventSubscriber for JsonlEventLog {
    fn name(&self) -> &str {
        "jsonl-event-log"
    }

    fn on_event(&self, event: &MutationEvent) -> Result<(), SubscriberError> {
        let mut line = serde_json::to_string(&event_record(event)?)?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Writes each mutant's captured output to `<dir>/<id>.stdout.log` and `.stderr.log`.
///
/// Empty streams are skipped, except for `Error` mutants, which always get both files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    /// Writer storing files under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Artifact directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, mutant: &Mutant) -> Result<(), SubscriberError> {
        std::fs::create_dir_all(&self.dir)?;
        let safe_id = sanitize_file_stem(mutant.id());
        let always = mutant.verdict() == Verdict::Error;
        let outcome = mutant.outcome();
        for (stream, text) in [("stdout", &outcome.stdout), ("stderr", &outcome.stderr)] {
            if always || !text.is_empty() {
                std::fs::write(self.dir.join(format!("{safe_id}.{stream}.log")), text)?;
            }
        }
        Ok(())
    }
}

impl EventSubscriber for ArtifactWriter {
    fn name(&self) -> &str {
        "artifact-writer"
    }

    fn on_event(&self, event: &MutationEvent) -> Result<(), SubscriberError> {
        match event {
            MutationEvent::MutantTested { mutant, .. } => self.write(mutant),
            _ => Ok(()),
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Keeps every delivered event in memory.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<MutationEvent>>,
}

impl EventRecorder {
    /// Recorded events in delivery order.
    pub fn events(&self) -> Vec<MutationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of recorded events in delivery order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(MutationEvent::name)
            .collect()
    }
}

impl EventSubscriber for EventRecorder {
    fn name(&self) -> &str {
        "event-recorder"
    }

    fn on_event(&self, event: &MutationEvent) -> Result<(), SubscriberError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Event bus with the subscribers `config` asks for.
///
/// Always includes [`TracingProgress`]; adds [`JsonlEventLog`] and
/// [`ArtifactWriter`] when `events_log` / `artifacts_dir` are set.
pub fn event_bus_for(config: &MutationConfig) -> Result<EventBus, SubscriberError> {
    let mut bus = EventBus::new().with_subscriber(TracingProgress);
    if let Some(path) = &config.events_log {
        let log = JsonlEventLog::create(path)?;
        debug!(path = %log.path().display(), "appending events");
        bus.subscribe(log);
    }
    if let Some(dir) = &config.artifacts_dir {
        let writer = ArtifactWriter::new(dir);
        debug!(dir = %writer.dir().display(), "writing mutant artifacts");
        bus.subscribe(writer);
    }
    Ok(bus)
}
