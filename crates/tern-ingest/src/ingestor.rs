//! Converts [`BrowserEvent`]s into base facts and pushes them to the fact
//! store, throttling `dom_updated` and buffering against momentary fact
//! store contention so the browser driver is never made to block.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tern_facts::{Atom, Fact, FactStore};

use crate::error::IngestError;
use crate::event::BrowserEvent;

/// Backpressure buffer bound: if the fact store is momentarily contended,
/// up to this many pending facts queue before the oldest is dropped.
const MAX_BUFFERED_FACTS: usize = 2_000;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub event_throttle_ms: u64,
    pub docker_enabled: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            event_throttle_ms: 50,
            docker_enabled: false,
        }
    }
}

struct ThrottleState {
    window_start: Instant,
    pending: Option<Fact>,
}

pub struct EventIngestor {
    facts: std::sync::Arc<FactStore>,
    config: IngestConfig,
    /// `dom_updated` throttle state, one entry per session.
    throttle: Mutex<std::collections::HashMap<String, ThrottleState>>,
    buffer: Mutex<VecDeque<Fact>>,
}

impl EventIngestor {
    pub fn new(facts: std::sync::Arc<FactStore>, config: IngestConfig) -> Self {
        Self {
            facts,
            config,
            throttle: Mutex::new(std::collections::HashMap::new()),
            buffer: Mutex::new(VecDeque::new()),
        }
    }

    /// Converts and enqueues one event scoped to `session_id`. Docker
    /// events have no session and must go through
    /// [`EventIngestor::handle_backend_event`] instead.
    pub fn handle_session_event(
        &self,
        session_id: &str,
        event: BrowserEvent,
    ) -> Result<(), IngestError> {
        if event.is_docker() {
            return Err(IngestError::MalformedEvent(
                "docker events have no session; use handle_backend_event".to_string(),
            ));
        }
        let predicate = event.predicate();
        let Some(fact) = to_session_fact(session_id, &event) else {
            return Err(IngestError::MalformedEvent(format!(
                "could not build a fact for {predicate} event"
            )));
        };

        if predicate == "dom_updated" {
            self.emit_throttled(session_id, fact);
        } else {
            self.enqueue(fact);
        }
        Ok(())
    }

    /// Converts and enqueues a backend-log event. A no-op (logged) unless
    /// `docker.enabled` — the caller is not expected to gate this itself.
    pub fn handle_backend_event(&self, event: BrowserEvent) -> Result<(), IngestError> {
        if !event.is_docker() {
            return Err(IngestError::MalformedEvent(
                "non-docker event passed to handle_backend_event".to_string(),
            ));
        }
        if !self.config.docker_enabled {
            debug!("dropping backend-log event: docker integration disabled");
            return Ok(());
        }
        let Some(fact) = to_backend_fact(&event) else {
            return Err(IngestError::MalformedEvent(
                "could not build a fact for docker event".to_string(),
            ));
        };
        self.enqueue(fact);
        Ok(())
    }

    /// Applies the window/coalesce logic for a throttled predicate: emits
    /// immediately if the session's window has elapsed, otherwise replaces
    /// whatever was pending so the most recent event in a burst survives.
    fn emit_throttled(&self, session_id: &str, fact: Fact) {
        let mut throttle = self.throttle.lock().expect("throttle lock poisoned");
        let now = Instant::now();
        let window = std::time::Duration::from_millis(self.config.event_throttle_ms);
        match throttle.get_mut(session_id) {
            Some(state) if now.duration_since(state.window_start) < window => {
                state.pending = Some(fact);
            }
            _ => {
                throttle.insert(
                    session_id.to_string(),
                    ThrottleState {
                        window_start: now,
                        pending: None,
                    },
                );
                drop(throttle);
                self.enqueue(fact);
            }
        }
    }

    /// Flushes any pending coalesced fact whose window has elapsed.
    /// Called periodically by [`EventIngestor::run`] so the last event of
    /// a throttled burst is never silently dropped.
    fn flush_throttle_windows(&self) {
        let mut throttle = self.throttle.lock().expect("throttle lock poisoned");
        let now = Instant::now();
        let window = std::time::Duration::from_millis(self.config.event_throttle_ms);
        let mut ready = Vec::new();
        for (session_id, state) in throttle.iter_mut() {
            if now.duration_since(state.window_start) >= window {
                if let Some(fact) = state.pending.take() {
                    ready.push(fact);
                }
                state.window_start = now;
            }
        }
        let stale: Vec<String> = throttle
            .iter()
            .filter(|(_, s)| s.pending.is_none() && now.duration_since(s.window_start) >= window * 4)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            throttle.remove(&key);
        }
        drop(throttle);
        for fact in ready {
            self.enqueue(fact);
        }
    }

    fn enqueue(&self, fact: Fact) {
        let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
        if buffer.len() >= MAX_BUFFERED_FACTS {
            buffer.pop_front();
            warn!(
                max = MAX_BUFFERED_FACTS,
                "ingest buffer full, dropping oldest fact"
            );
        }
        buffer.push_back(fact);
    }

    fn drain_into_store(&self) -> usize {
        let drained: Vec<Fact> = {
            let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
            buffer.drain(..).collect()
        };
        if drained.is_empty() {
            return 0;
        }
        let count = drained.len();
        trace!(count, "draining ingested facts into fact store");
        self.facts.push(drained)
    }

    /// Background pump: drains the buffer and flushes elapsed throttle
    /// windows every `tick` until `cancel` fires. Run this as a spawned
    /// task alongside the rest of the process's tokio runtime.
    pub async fn run(&self, tick: std::time::Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.drain_into_store();
                    info!("event ingestor shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.flush_throttle_windows();
                    self.drain_into_store();
                }
            }
        }
    }
}

fn to_session_fact(session_id: &str, event: &BrowserEvent) -> Option<Fact> {
    let s = Atom::Str(session_id.to_string());
    match event {
        BrowserEvent::RequestIssued { request_id, method, url, initiator, t } => Some(Fact::new(
            "net_request",
            vec![
                s,
                Atom::Str(request_id.clone()),
                Atom::Str(method.clone()),
                Atom::Str(url.clone()),
                Atom::Str(initiator.clone()),
                Atom::Int(*t),
            ],
            *t,
        )),
        BrowserEvent::ResponseReceived { request_id, status, latency_ms, duration_ms, t } => {
            // net_response has no declared T arg; `t` lives only in the
            // fact's own timestamp metadata, which is what the complex
            // native derivations key their temporal-proximity joins on.
            Some(Fact::new(
                "net_response",
                vec![
                    s,
                    Atom::Str(request_id.clone()),
                    Atom::Int(*status),
                    Atom::Int(*latency_ms),
                    Atom::Int(*duration_ms),
                ],
                *t,
            ))
        }
        BrowserEvent::ConsoleMessage { level, message, t } => Some(Fact::new(
            "console_event",
            vec![s, Atom::Str(level.clone()), Atom::Str(message.clone())],
            *t,
        )),
        BrowserEvent::NavigationCommitted { url, t } => Some(Fact::new(
            "navigation_event",
            vec![s, Atom::Str(url.clone())],
            *t,
        )),
        BrowserEvent::DomMutationBatch { t } => Some(Fact::new("dom_updated", vec![s], *t)),
        BrowserEvent::ToastObserved { text, level, source, t } => Some(Fact::new(
            "toast_notification",
            vec![
                s,
                Atom::Str(text.clone()),
                Atom::Str(level.clone()),
                Atom::Str(source.clone()),
            ],
            *t,
        )),
        BrowserEvent::DockerLogLine { .. } | BrowserEvent::DockerLogCorrelation { .. } => None,
    }
}

fn to_backend_fact(event: &BrowserEvent) -> Option<Fact> {
    match event {
        BrowserEvent::DockerLogLine { container, level, tag, message, t } => Some(Fact::new(
            "docker_log",
            vec![
                Atom::Str(container.clone()),
                Atom::Str(level.clone()),
                Atom::Str(tag.clone()),
                Atom::Str(message.clone()),
            ],
            *t,
        )),
        BrowserEvent::DockerLogCorrelation { container, key_type, key_value, message, t } => {
            Some(Fact::new(
                "docker_log_correlation",
                vec![
                    Atom::Str(container.clone()),
                    Atom::Str(key_type.clone()),
                    Atom::Str(key_value.clone()),
                    Atom::Str(message.clone()),
                ],
                *t,
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ingestor() -> EventIngestor {
        EventIngestor::new(Arc::new(FactStore::new(1_000)), IngestConfig::default())
    }

    #[test]
    fn net_request_converts_with_session_as_first_arg() {
        let ingestor = ingestor();
        ingestor
            .handle_session_event(
                "s1",
                BrowserEvent::RequestIssued {
                    request_id: "r1".to_string(),
                    method: "GET".to_string(),
                    url: "/x".to_string(),
                    initiator: "fetch".to_string(),
                    t: 100,
                },
            )
            .unwrap();
        ingestor.drain_into_store();
        let facts = ingestor.facts.by_predicate("net_request");
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].args[0], Atom::Str("s1".to_string()));
    }

    #[test]
    fn docker_event_rejected_from_session_handler() {
        let ingestor = ingestor();
        let err = ingestor
            .handle_session_event(
                "s1",
                BrowserEvent::DockerLogLine {
                    container: "api".to_string(),
                    level: "error".to_string(),
                    tag: "api".to_string(),
                    message: "boom".to_string(),
                    t: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(err, IngestError::MalformedEvent(_)));
    }

    #[test]
    fn backend_event_dropped_when_docker_disabled() {
        let ingestor = ingestor();
        ingestor
            .handle_backend_event(BrowserEvent::DockerLogLine {
                container: "api".to_string(),
                level: "error".to_string(),
                tag: "api".to_string(),
                message: "boom".to_string(),
                t: 1,
            })
            .unwrap();
        ingestor.drain_into_store();
        assert!(ingestor.facts.by_predicate("docker_log").is_empty());
    }

    #[test]
    fn backend_event_ingested_when_docker_enabled() {
        let ingestor = EventIngestor::new(
            Arc::new(FactStore::new(1_000)),
            IngestConfig { event_throttle_ms: 50, docker_enabled: true },
        );
        ingestor
            .handle_backend_event(BrowserEvent::DockerLogCorrelation {
                container: "api".to_string(),
                key_type: "request_id".to_string(),
                key_value: "r1".to_string(),
                message: "handling r1".to_string(),
                t: 1,
            })
            .unwrap();
        ingestor.drain_into_store();
        assert_eq!(ingestor.facts.by_predicate("docker_log_correlation").len(), 1);
    }

    #[test]
    fn dom_updated_first_event_in_window_emits_immediately() {
        let ingestor = ingestor();
        ingestor
            .handle_session_event("s1", BrowserEvent::DomMutationBatch { t: 1 })
            .unwrap();
        ingestor.drain_into_store();
        assert_eq!(ingestor.facts.by_predicate("dom_updated").len(), 1);
    }

    #[test]
    fn dom_updated_burst_within_window_coalesces_to_latest() {
        let ingestor = ingestor();
        ingestor
            .handle_session_event("s1", BrowserEvent::DomMutationBatch { t: 1 })
            .unwrap();
        ingestor
            .handle_session_event("s1", BrowserEvent::DomMutationBatch { t: 2 })
            .unwrap();
        ingestor
            .handle_session_event("s1", BrowserEvent::DomMutationBatch { t: 3 })
            .unwrap();
        ingestor.drain_into_store();
        // only the first event of the burst has been forced through; the
        // rest are coalesced as "pending" until the window elapses.
        assert_eq!(ingestor.facts.by_predicate("dom_updated").len(), 1);
        assert_eq!(ingestor.facts.by_predicate("dom_updated")[0].timestamp, 1);
    }

    #[test]
    fn buffer_drops_oldest_when_over_capacity() {
        let ingestor = ingestor();
        for i in 0..(MAX_BUFFERED_FACTS + 10) {
            ingestor.enqueue(Fact::new("console_event", vec!["s".into(), "info".into(), format!("{i}").into()], i as i64));
        }
        let buffer = ingestor.buffer.lock().unwrap();
        assert_eq!(buffer.len(), MAX_BUFFERED_FACTS);
        assert_eq!(buffer.front().unwrap().timestamp, 10);
    }
}
