//! One live topic connection.
//!
//! The task streams while the push transport works and polls otherwise.
//! Falling back never clears received state: the caches keep whatever was
//! applied, and polling resumes on top of it.

use std::sync::Arc;
use std::time::Instant as StdInstant;

use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::registry::ConnectionRegistry;
use crate::application::ports::{FeedPoller, FeedStream, PushTransport, TickSink, TransportError};
use crate::domain::feed::{
    BackoffConfig, BackoffPolicy, FeedEvent, FeedMode, FeedStateMachine, SubscriptionKey, Topic,
};
use crate::infrastructure::config::FeedSettings;
use crate::infrastructure::metrics::{self, RequestKind};

/// Why a phase ended.
enum PhaseExit {
    Cancelled,
    StreamLost,
    Upgraded(FeedStream),
}

/// Collaborators shared by every connection of a manager.
#[derive(Clone)]
pub(super) struct ConnectionDeps {
    pub push: Option<Arc<dyn PushTransport>>,
    pub poller: Arc<dyn FeedPoller>,
    pub sink: Arc<dyn TickSink>,
    pub registry: Arc<ConnectionRegistry>,
    pub settings: FeedSettings,
}

/// Task driving one connection generation.
pub(super) struct ConnectionTask {
    topic: Topic,
    key: SubscriptionKey,
    generation: u64,
    deps: ConnectionDeps,
    cancel: CancellationToken,
    machine: FeedStateMachine,
}

impl ConnectionTask {
    pub(super) fn new(
        topic: Topic,
        key: SubscriptionKey,
        generation: u64,
        deps: ConnectionDeps,
        cancel: CancellationToken,
    ) -> Self {
        let machine = FeedStateMachine::new(deps.settings.degraded_after_failures);
        Self {
            topic,
            key,
            generation,
            deps,
            cancel,
            machine,
        }
    }

    /// Run until cancelled.
    pub(super) async fn run(mut self) {
        let Some(mut next_stream) = self.start().await else {
            return;
        };

        loop {
            let exit = match (self.machine.mode(), next_stream.take()) {
                (FeedMode::Streaming, Some(stream)) => self.stream_phase(stream).await,
                (FeedMode::Polling, _) => self.poll_phase().await,
                _ => PhaseExit::Cancelled,
            };

            match exit {
                PhaseExit::Cancelled => break,
                PhaseExit::StreamLost => {
                    if self.machine.stream_failed().is_ok() {
                        metrics::record_fallback(self.topic);
                        tracing::warn!(
                            topic = %self.topic,
                            generation = self.generation,
                            "Push transport lost; falling back to polling"
                        );
                        self.report();
                    }
                }
                PhaseExit::Upgraded(stream) => {
                    if self.machine.stream_restored().is_ok() {
                        tracing::info!(topic = %self.topic, "Push transport restored");
                        next_stream = Some(stream);
                        self.report();
                    }
                }
            }
        }

        self.machine.stop();
        tracing::debug!(topic = %self.topic, generation = self.generation, "Connection stopped");
    }

    /// Leave idle. Returns the opened stream slot, or `None` if cancelled
    /// while opening.
    async fn start(&mut self) -> Option<Option<FeedStream>> {
        let Some(push) = self.deps.push.clone() else {
            let _ = self.machine.start(false);
            tracing::info!(topic = %self.topic, key = %self.key, "Push not allowed; polling");
            self.report();
            return Some(None);
        };

        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return None,
            opened = push.open(self.topic, &self.key) => opened,
        };

        let _ = self.machine.start(true);
        match opened {
            Ok(stream) => {
                tracing::info!(topic = %self.topic, key = %self.key, "Streaming");
                self.report();
                Some(Some(stream))
            }
            Err(e) => {
                let _ = self.machine.stream_failed();
                metrics::record_fallback(self.topic);
                tracing::warn!(topic = %self.topic, error = %e, "Push transport unavailable; polling");
                self.report();
                Some(None)
            }
        }
    }

    async fn stream_phase(&self, mut stream: FeedStream) -> PhaseExit {
        let _transport = self.deps.registry.acquire_transport(self.topic);
        let silence = self.deps.settings.heartbeat_timeout;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return PhaseExit::Cancelled,
                next = tokio::time::timeout(silence, stream.next()) => match next {
                    Err(_) => {
                        tracing::warn!(
                            topic = %self.topic,
                            silence_secs = silence.as_secs(),
                            "No heartbeat from push transport"
                        );
                        return PhaseExit::StreamLost;
                    }
                    Ok(None) => {
                        tracing::info!(topic = %self.topic, "Push stream ended");
                        return PhaseExit::StreamLost;
                    }
                    Ok(Some(Err(TransportError::Protocol { message }))) => {
                        tracing::warn!(topic = %self.topic, error = %message, "Skipping malformed frame");
                    }
                    Ok(Some(Err(e))) => {
                        tracing::warn!(topic = %self.topic, error = %e, "Push transport failed");
                        return PhaseExit::StreamLost;
                    }
                    Ok(Some(Ok(event))) => self.deliver(vec![event]),
                },
            }
        }
    }

    async fn poll_phase(&mut self) -> PhaseExit {
        let settings = self.deps.settings;
        let mut retry = BackoffPolicy::new(BackoffConfig::doubling(
            settings.poll_interval,
            settings.poll_backoff_max.max(settings.poll_interval),
        ));
        let mut probe = BackoffPolicy::new(BackoffConfig::doubling(
            settings.push_retry_initial,
            settings.push_retry_max,
        ));

        let mut next_poll = Instant::now();
        let mut next_probe = self
            .deps
            .push
            .as_ref()
            .map(|_| Instant::now() + probe.next_delay());

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return PhaseExit::Cancelled,
                () = tokio::time::sleep_until(next_poll) => {
                    let started = StdInstant::now();
                    let result = tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return PhaseExit::Cancelled,
                        result = self.deps.poller.poll(self.topic, &self.key) => result,
                    };
                    metrics::record_request_duration(RequestKind::Poll, started.elapsed());

                    match result {
                        Ok(events) => {
                            retry.reset();
                            let _ = self.machine.poll_succeeded();
                            if self.deps.registry.is_current(self.topic, self.generation) {
                                self.deps.sink.synced(self.topic);
                            }
                            self.deliver(events);
                            next_poll = Instant::now() + settings.poll_interval;
                        }
                        Err(e) => {
                            let _ = self.machine.poll_failed();
                            metrics::record_poll_failure(self.topic);
                            let delay = retry.next_delay();
                            tracing::warn!(
                                topic = %self.topic,
                                failures = self.machine.consecutive_failures(),
                                retry_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                error = %e,
                                "Poll failed"
                            );
                            next_poll = Instant::now() + delay;
                        }
                    }
                    self.report();
                }
                () = sleep_until(next_probe) => {
                    let Some(push) = self.deps.push.clone() else {
                        next_probe = None;
                        continue;
                    };
                    metrics::record_push_probe(self.topic);
                    let opened = tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return PhaseExit::Cancelled,
                        opened = push.open(self.topic, &self.key) => opened,
                    };
                    match opened {
                        Ok(stream) => return PhaseExit::Upgraded(stream),
                        Err(e) => {
                            tracing::debug!(topic = %self.topic, error = %e, "Push re-probe failed");
                            next_probe = Some(Instant::now() + probe.next_delay());
                        }
                    }
                }
            }
        }
    }

    fn deliver(&self, events: Vec<FeedEvent>) {
        if events.is_empty() {
            return;
        }
        if self.deps.registry.is_current(self.topic, self.generation) {
            self.deps.sink.apply(self.topic, events);
        } else {
            metrics::record_ticks_dropped(self.topic, events.len() as u64);
            tracing::debug!(
                topic = %self.topic,
                generation = self.generation,
                dropped = events.len(),
                "Dropped ticks from superseded connection"
            );
        }
    }

    fn report(&self) {
        if self.deps.registry.is_current(self.topic, self.generation) {
            self.deps
                .sink
                .mode_changed(self.topic, self.machine.mode(), self.machine.status());
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
