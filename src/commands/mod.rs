//! Per-use-case command functions: validate, load write-models, check preconditions and
//! permissions, build events, push atomically, return object-details.
//!
//! Every command is a free function taking an explicit `&Ctx` and `&dyn EventStore`, per the
//! source's dynamic `this`-binding being replaced with a parameter bundle.

pub mod auth_request;
pub mod machine_key;
pub mod oidc_app;
pub mod org;
pub mod policy;
pub mod user;
pub mod webauthn;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::CommandError;
use crate::event::{Event, EventCommand};
use crate::id::Generator;
use crate::permission::{PermissionRequest, PermissionService};
use crate::store::EventStore;
use crate::types::AggregateVersion;

/// Everything a command needs besides the event store itself: tenant scope, the caller, and
/// the two stateless services every step of the template may consult.
#[derive(Clone)]
pub struct Ctx {
    pub instance_id: String,
    pub actor: String,
    pub ids: Arc<Generator>,
    pub permissions: Arc<PermissionService>,
}

impl Ctx {
    pub fn new(
        instance_id: impl Into<String>,
        actor: impl Into<String>,
        ids: Arc<Generator>,
        permissions: Arc<PermissionService>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            actor: actor.into(),
            ids,
            permissions,
        }
    }

    pub fn next_id(&self) -> String {
        self.ids.next_id()
    }

    pub fn check_permission(&self, request: &PermissionRequest, code: &'static str) -> Result<(), CommandError> {
        self.permissions.check(&self.actor, request, code)
    }
}

/// Standard result of every mutating command.
#[derive(Debug, Clone)]
pub struct ObjectDetails {
    pub sequence: AggregateVersion,
    pub event_date: DateTime<Utc>,
    pub resource_owner: String,
}

impl ObjectDetails {
    fn from_last_event(events: &[Event]) -> Self {
        let last = events.last().expect("push always returns at least one event for its own command");
        Self {
            sequence: last.aggregate_version,
            event_date: last.created_at,
            resource_owner: last.owner.clone(),
        }
    }
}

/// Pushes `commands` in one transaction and returns [`ObjectDetails`] derived from the last
/// event in the batch - the common tail of every command implementation.
pub(crate) async fn push_and_finish(store: &dyn EventStore, commands: Vec<EventCommand>) -> Result<(Vec<Event>, ObjectDetails), CommandError> {
    let events = store.push(commands).await.map_err(CommandError::from)?;
    let details = ObjectDetails::from_last_event(&events);
    Ok((events, details))
}

/// One step of a multi-step command: given the context, the store, and the events staged by
/// earlier steps, returns the events this step contributes plus any side value it wants
/// surfaced to the caller once the whole chain succeeds (e.g. a generated client secret).
pub type Step<T> = Box<dyn FnOnce(&Ctx, &dyn EventStore, &[EventCommand]) -> Result<(Vec<EventCommand>, T), CommandError>>;

/// Runs `steps` in order, threading a growing `pending` list of [`EventCommand`]s, then pushes
/// everything as a single transaction. Validation happens before any side effect: if a step
/// returns an error, nothing staged so far (by this call) has been persisted.
pub(crate) async fn run_preparation<T>(ctx: &Ctx, store: &dyn EventStore, steps: Vec<Step<T>>) -> Result<(ObjectDetails, Vec<T>), CommandError> {
    let mut pending: Vec<EventCommand> = Vec::new();
    let mut outcomes: Vec<T> = Vec::with_capacity(steps.len());

    for step in steps {
        let (mut new_commands, outcome) = step(ctx, store, &pending)?;
        pending.append(&mut new_commands);
        outcomes.push(outcome);
    }

    let (_events, details) = push_and_finish(store, pending).await?;
    Ok((details, outcomes))
}

pub(crate) fn require_non_empty(value: &str, field: &str, code: &'static str) -> Result<(), CommandError> {
    if value.trim().is_empty() {
        Err(CommandError::invalid_argument(code, format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

pub(crate) fn map_not_found<T>(opt: Option<T>, code: &'static str, message: impl Into<String>) -> Result<T, CommandError> {
    opt.ok_or_else(|| CommandError::not_found(code, message))
}

pub(crate) fn precondition(ok: bool, code: &'static str, message: impl Into<String>) -> Result<(), CommandError> {
    if ok {
        Ok(())
    } else {
        Err(CommandError::precondition_failed(code, message))
    }
}
