//! Conversation state manager.
//!
//! Owns the turn history and the architecture snapshot and drives one request
//! cycle at a time: `Idle -> AwaitingResponse -> Idle`. The state lock is never
//! held across the completion call; the phase flag alone keeps a second
//! submission out while a reply is pending.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use archie_core::{
    merge, parse_response, project, AiSettings, Architecture, Author, KeyValueStore,
    SessionStore, StoreError, TaskDescriptor, Turn, DEFAULT_TIMEOUT_SECS,
};

use crate::{prompt, CompletionError, CompletionService, SessionError};

/// Assistant turn appended when the completion service fails.
pub const FALLBACK_REPLY: &str =
    "Sorry, something went wrong while reaching the assistant. Please send your message again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The reply was appended; a payload was applied if `architecture_changed`.
    Applied { architecture_changed: bool },
    /// The service failed or timed out and the fallback reply was appended.
    Failed,
    /// Nothing to do: the opening cycle already ran, or the last turn is answered.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound on a single completion call.
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &AiSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs()),
        }
    }
}

struct State {
    task: TaskDescriptor,
    turns: Vec<Turn>,
    architecture: Architecture,
    phase: Phase,
    /// Task id whose opening cycle has already been fired.
    opened_for: Option<String>,
}

struct Request {
    system: String,
    turns: Vec<Turn>,
}

/// Treats a cycle whose future is dropped before the reply is applied as a
/// failed one: phase back to `Idle`, fallback turn appended and persisted.
struct InFlight<'a, S: KeyValueStore> {
    state: &'a Mutex<State>,
    store: &'a SessionStore<S>,
    armed: bool,
}

impl<S: KeyValueStore> InFlight<'_, S> {
    fn finish(mut self) {
        self.armed = false;
    }
}

impl<S: KeyValueStore> Drop for InFlight<'_, S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("request cycle abandoned before a reply arrived");
        let turns = {
            let mut state = lock(self.state);
            state.phase = Phase::Idle;
            state.turns.push(Turn::assistant(FALLBACK_REPLY));
            state.turns.clone()
        };
        log_write("turns", self.store.save_turns(&turns));
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// A design session for one task.
pub struct Conversation<C, S> {
    completion: C,
    store: SessionStore<S>,
    config: SessionConfig,
    state: Mutex<State>,
}

impl<C: CompletionService, S: KeyValueStore> Conversation<C, S> {
    /// Resume the stored session for `task`, or start a fresh one seeded with
    /// the task's opening prompt. Stored state for a different task is replaced.
    pub fn new(task: TaskDescriptor, completion: C, store: S, config: SessionConfig) -> Self {
        let store = SessionStore::new(store);
        let stored = store.load();
        let same_task = stored.task.as_ref().is_some_and(|t| t.id == task.id);
        let has_turns = stored.turns.as_ref().is_some_and(|t| !t.is_empty());

        let (turns, architecture) = if same_task && has_turns {
            let turns = stored.turns.unwrap_or_default();
            let architecture = stored.architecture.unwrap_or_default();
            info!(
                task = %task.id,
                turns = turns.len(),
                components = architecture.components.len(),
                "resuming session"
            );
            (turns, architecture)
        } else if same_task {
            // Only the history is lost; the architecture slot stands on its own.
            let turns = vec![Turn::user(task.opening_prompt.clone())];
            let architecture = stored.architecture.unwrap_or_default();
            warn!(
                task = %task.id,
                components = architecture.components.len(),
                "no usable turn history, reseeding conversation"
            );
            log_write("task", store.save_task(&task));
            log_write("turns", store.save_turns(&turns));
            (turns, architecture)
        } else {
            info!(task = %task.id, "starting new session");
            let turns = vec![Turn::user(task.opening_prompt.clone())];
            let architecture = Architecture::default();
            log_write("session", store.save(&task, &turns, &architecture));
            (turns, architecture)
        };

        let state = State {
            task,
            turns,
            architecture,
            phase: Phase::Idle,
            opened_for: None,
        };

        Self {
            completion,
            store,
            config,
            state: Mutex::new(state),
        }
    }

    /// Answer the seed turn. Fires at most once per task for this conversation;
    /// a restored session whose last turn is already answered is left alone.
    pub async fn open(&self) -> Result<CycleOutcome, SessionError> {
        let request = {
            let mut state = lock(&self.state);
            if state.opened_for.as_deref() == Some(state.task.id.as_str()) {
                debug!(task = %state.task.id, "opening cycle already fired");
                return Ok(CycleOutcome::Skipped);
            }
            if state.phase == Phase::AwaitingResponse {
                return Err(SessionError::Busy);
            }
            state.opened_for = Some(state.task.id.clone());
            if state.turns.last().map(|t| t.author) != Some(Author::User) {
                return Ok(CycleOutcome::Skipped);
            }
            begin_cycle(&mut state)
        };
        Ok(self.run_cycle(request).await)
    }

    /// Append a user turn and wait for the assistant's reply. A seed turn that
    /// was never answered gets its reply first so the roles keep alternating.
    pub async fn send(&self, text: &str) -> Result<CycleOutcome, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }
        self.open().await?;
        let request = {
            let mut state = lock(&self.state);
            if state.phase == Phase::AwaitingResponse {
                return Err(SessionError::Busy);
            }
            state.turns.push(Turn::user(text));
            begin_cycle(&mut state)
        };
        log_write("turns", self.store.save_turns(&request.turns));
        Ok(self.run_cycle(request).await)
    }

    async fn run_cycle(&self, request: Request) -> CycleOutcome {
        let in_flight = InFlight {
            state: &self.state,
            store: &self.store,
            armed: true,
        };
        info!(turns = request.turns.len(), "awaiting assistant reply");

        let reply = match tokio::time::timeout(
            self.config.timeout,
            self.completion.complete(&request.system, &request.turns),
        )
        .await
        {
            Ok(reply) => reply,
            Err(_) => Err(CompletionError::Timeout(self.config.timeout)),
        };

        let outcome = self.apply(reply);
        in_flight.finish();
        outcome
    }

    fn apply(&self, reply: Result<String, CompletionError>) -> CycleOutcome {
        let (outcome, turns, architecture) = {
            let mut state = lock(&self.state);
            state.phase = Phase::Idle;
            match reply {
                Ok(text) => {
                    let parsed = parse_response(&text);
                    state.turns.push(Turn::assistant(parsed.display_text));
                    let changed = match parsed.payload {
                        Some(payload) => {
                            let merged = merge(&state.architecture, Some(payload));
                            let changed = merged != state.architecture;
                            state.architecture = merged;
                            changed
                        }
                        None => false,
                    };
                    info!(
                        architecture_changed = changed,
                        components = state.architecture.components.len(),
                        data_flows = state.architecture.data_flows.len(),
                        "applied assistant reply"
                    );
                    (
                        CycleOutcome::Applied {
                            architecture_changed: changed,
                        },
                        state.turns.clone(),
                        changed.then(|| state.architecture.clone()),
                    )
                }
                Err(e) => {
                    warn!(error = %e, "completion failed, architecture left unchanged");
                    state.turns.push(Turn::assistant(FALLBACK_REPLY));
                    (CycleOutcome::Failed, state.turns.clone(), None)
                }
            }
        };

        log_write("turns", self.store.save_turns(&turns));
        if let Some(architecture) = architecture {
            log_write("architecture", self.store.save_architecture(&architecture));
        }
        outcome
    }

    pub fn task(&self) -> TaskDescriptor {
        lock(&self.state).task.clone()
    }

    pub fn turns(&self) -> Vec<Turn> {
        lock(&self.state).turns.clone()
    }

    pub fn architecture(&self) -> Architecture {
        lock(&self.state).architecture.clone()
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase
    }

    /// Mermaid source for the current architecture.
    pub fn diagram(&self) -> String {
        project(&lock(&self.state).architecture)
    }

    /// End the session and wipe everything it persisted. Hands back the
    /// collaborators so a new session can be started with them.
    pub fn restart(self) -> Result<(C, S), StoreError> {
        let Conversation {
            completion, store, ..
        } = self;
        store.reset()?;
        info!("session cleared");
        Ok((completion, store.into_inner()))
    }
}

fn begin_cycle(state: &mut State) -> Request {
    state.phase = Phase::AwaitingResponse;
    Request {
        system: prompt::system_instructions(&state.task, &state.architecture),
        turns: state.turns.clone(),
    }
}

/// Persistence is fire-and-forget: failures are logged, never surfaced.
fn log_write(slot: &str, result: Result<(), StoreError>) {
    if let Err(e) = result {
        warn!(slot, error = %e, "failed to persist session state");
    }
}
