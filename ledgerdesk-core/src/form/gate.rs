use std::fmt;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PersistError, SubmitError};
use crate::models::document::Document;

/// Persistence callback supplied by whoever embeds the form.
#[async_trait]
pub trait DocumentSink<D: Document>: Send + Sync {
    async fn persist(&self, document: &D) -> Result<(), PersistError>;
}

/// Submission gate states.
///
/// - Idle: submit control enabled
/// - Validating: whole-document validation running
/// - Submitting: persistence callback in flight, submit disabled
/// - Succeeded: persisted; the embedding page navigates away (terminal)
///
/// `Invalid` and `Failed` are transient: both fall straight back to Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    Validating,
    Invalid,
    Submitting,
    Succeeded,
    Failed,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Idle => write!(f, "idle"),
            GateState::Validating => write!(f, "validating"),
            GateState::Invalid => write!(f, "invalid"),
            GateState::Submitting => write!(f, "submitting"),
            GateState::Succeeded => write!(f, "succeeded"),
            GateState::Failed => write!(f, "failed"),
        }
    }
}

/// Inputs that drive the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    Submit,
    Valid,
    Invalid,
    Persisted,
    Rejected,
    /// Invalid/Failed shown to the user; re-enable the form
    Settle,
    /// Submission future dropped before the callback resolved
    Abandoned,
}

impl fmt::Display for GateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateEvent::Submit => write!(f, "submit"),
            GateEvent::Valid => write!(f, "valid"),
            GateEvent::Invalid => write!(f, "invalid"),
            GateEvent::Persisted => write!(f, "persisted"),
            GateEvent::Rejected => write!(f, "rejected"),
            GateEvent::Settle => write!(f, "settle"),
            GateEvent::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Transition table for the gate; `None` means the event is not allowed.
pub fn transition(state: GateState, event: GateEvent) -> Option<GateState> {
    match (state, event) {
        (GateState::Idle, GateEvent::Submit) => Some(GateState::Validating),
        (GateState::Validating, GateEvent::Invalid) => Some(GateState::Invalid),
        (GateState::Validating, GateEvent::Valid) => Some(GateState::Submitting),
        (GateState::Submitting, GateEvent::Persisted) => Some(GateState::Succeeded),
        (GateState::Submitting, GateEvent::Rejected) => Some(GateState::Failed),
        (GateState::Invalid, GateEvent::Settle) => Some(GateState::Idle),
        (GateState::Failed, GateEvent::Settle) => Some(GateState::Idle),
        (GateState::Validating | GateState::Submitting, GateEvent::Abandoned) => {
            Some(GateState::Idle)
        }
        _ => None,
    }
}

#[derive(Debug)]
struct Inner {
    state: GateState,
    last_error: Option<String>,
}

/// Validate-then-persist control guarding against invalid and duplicate submits.
///
/// Shared by reference between everything that can trigger a submit; only one
/// submission can be in flight at a time.
#[derive(Debug)]
pub struct SubmissionGate {
    inner: Mutex<Inner>,
}

impl Default for SubmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionGate {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: GateState::Idle,
                last_error: None,
            }),
        }
    }

    pub fn state(&self) -> GateState {
        self.lock().state
    }

    /// Whether the submit control should be enabled.
    pub fn is_enabled(&self) -> bool {
        self.state() == GateState::Idle
    }

    /// Reason of the last rejected persistence attempt, for the page-level message.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Validates `document` and, if valid, hands it to `sink`.
    ///
    /// On `Ok` the caller should leave the form. Every error leaves the gate
    /// Idle again, except `InFlight` (another submit owns it) and
    /// `AlreadySubmitted`.
    ///
    /// # Arguments
    ///
    /// * `document` - Snapshot to validate and persist
    /// * `sink` - Persistence callback
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` once `sink` accepted the document.
    pub async fn submit<D, S>(&self, document: &D, sink: &S) -> Result<(), SubmitError>
    where
        D: Document,
        S: DocumentSink<D> + ?Sized,
    {
        {
            let mut inner = self.lock();
            match inner.state {
                GateState::Succeeded => return Err(SubmitError::AlreadySubmitted),
                GateState::Idle => {}
                _ => {
                    warn!("Ignoring {} submit while gate is {}", D::KIND, inner.state);
                    return Err(SubmitError::InFlight);
                }
            }
            Self::apply(&mut inner, GateEvent::Submit);
        }

        let mut guard = InFlight { gate: self, done: false };

        if let Err(errors) = D::schema().validate(document) {
            info!("{} failed validation on {} field(s)", D::KIND, errors.len());
            guard.finish(&[GateEvent::Invalid, GateEvent::Settle], None);
            return Err(SubmitError::Invalid(errors));
        }
        guard.step(GateEvent::Valid);

        match sink.persist(document).await {
            Ok(()) => {
                info!("{} {:?} persisted", D::KIND, document.id());
                guard.finish(&[GateEvent::Persisted], None);
                Ok(())
            }
            Err(e) => {
                warn!("Persisting {} failed: {}", D::KIND, e);
                guard.finish(&[GateEvent::Rejected, GateEvent::Settle], Some(e.reason.clone()));
                Err(SubmitError::Persist(e))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply(inner: &mut Inner, event: GateEvent) {
        match transition(inner.state, event) {
            Some(next) => inner.state = next,
            None => warn!("Gate event {} not allowed in state {}", event, inner.state),
        }
    }
}

/// Returns the gate to Idle if a submission is dropped mid-flight.
struct InFlight<'a> {
    gate: &'a SubmissionGate,
    done: bool,
}

impl InFlight<'_> {
    fn step(&mut self, event: GateEvent) {
        SubmissionGate::apply(&mut self.gate.lock(), event);
    }

    fn finish(&mut self, events: &[GateEvent], error: Option<String>) {
        let mut inner = self.gate.lock();
        for event in events {
            SubmissionGate::apply(&mut inner, *event);
        }
        if error.is_some() || inner.state == GateState::Succeeded {
            inner.last_error = error;
        }
        self.done = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            SubmissionGate::apply(&mut self.gate.lock(), GateEvent::Abandoned);
        }
    }
}
