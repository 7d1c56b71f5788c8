//! Machine-key state machine.
//!
//! A machine key is a sub-entity of the `user` aggregate: many keys can exist per user, each
//! identified by its own id carried in the event payload. The write-model filters the user's
//! event stream down to the one key it's asked about, while still letting `sequence` advance
//! past events belonging to sibling keys.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::CommandError;
use crate::event::{Event, EventCommand};
use crate::permission::PermissionRequest;
use crate::store::EventStore;
use crate::write_model::{AggregateWriteModel, WriteModel};

use super::user::AGGREGATE_TYPE as USER_AGGREGATE_TYPE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineKeyState {
    Unspecified,
    Active,
    Removed,
}

/// Tracks one machine key inside a user aggregate's event stream. `key_id` is the sub-entity
/// filter: `reduce` ignores `*.key.*` events for any other key while still being called for
/// every event on the aggregate (so `sequence` still reflects the aggregate's tail).
#[derive(Debug, Clone)]
pub struct MachineKeyWriteModelState {
    key_id: String,
    pub state: MachineKeyState,
    pub expiration_date: Option<DateTime<Utc>>,
}

impl MachineKeyWriteModelState {
    pub fn for_key(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            state: MachineKeyState::Unspecified,
            expiration_date: None,
        }
    }
}

impl Default for MachineKeyWriteModelState {
    fn default() -> Self {
        Self::for_key(String::new())
    }
}

impl WriteModel for MachineKeyWriteModelState {
    fn reduce(&mut self, event: &Event) {
        #[derive(Deserialize)]
        struct KeyPayload {
            key_id: String,
            #[serde(default)]
            expiration_date: Option<DateTime<Utc>>,
        }

        match event.event_type.as_str() {
            "user.machine.key.added" => {
                if let Ok(payload) = event.payload_as::<KeyPayload>() {
                    if payload.key_id == self.key_id {
                        self.expiration_date = payload.expiration_date;
                        self.state = MachineKeyState::Active;
                    }
                }
            }
            "user.machine.key.removed" => {
                if let Ok(payload) = event.payload_as::<KeyPayload>() {
                    if payload.key_id == self.key_id {
                        self.state = MachineKeyState::Removed;
                    }
                }
            }
            _ => {}
        }
    }
}

pub type MachineKeyWriteModel = AggregateWriteModel<MachineKeyWriteModelState>;

async fn load_key(store: &dyn EventStore, instance_id: &str, user_id: &str, key_id: &str) -> Result<MachineKeyWriteModel, CommandError> {
    MachineKeyWriteModel::load_with_state(
        store,
        instance_id,
        USER_AGGREGATE_TYPE,
        user_id,
        MachineKeyWriteModelState::for_key(key_id),
    )
    .await
    .map_err(CommandError::from)
}

/// `addMachineKey(userID, expiresAt)` - fails with `COMMAND-MachineKey10` if `expires_at` is not
/// strictly in the future.
pub async fn add_machine_key(
    ctx: &super::Ctx,
    store: &dyn EventStore,
    user_id: &str,
    expires_at: DateTime<Utc>,
) -> Result<(String, super::ObjectDetails), CommandError> {
    super::precondition(expires_at > Utc::now(), "COMMAND-MachineKey10", "expiration must be strictly in the future")?;
    ctx.check_permission(
        &PermissionRequest {
            resource: "machine_key",
            action: "create",
            scope: &ctx.instance_id,
        },
        "COMMAND-MachineKey11",
    )?;

    // A key id that can never match a real key: only `sequence`/`resource_owner` are read here,
    // never `state`, so any non-matching filter works to get the aggregate's current tail.
    let model = load_key(store, &ctx.instance_id, user_id, "").await?;

    let key_id = ctx.next_id();

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        USER_AGGREGATE_TYPE,
        user_id,
        "user.machine.key.added",
        json!({ "key_id": key_id, "expiration_date": expires_at }),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok((key_id, details))
}

/// `removeMachineKey(userID, keyID)` - requires the key to currently be ACTIVE.
pub async fn remove_machine_key(ctx: &super::Ctx, store: &dyn EventStore, user_id: &str, key_id: &str) -> Result<super::ObjectDetails, CommandError> {
    ctx.check_permission(
        &PermissionRequest {
            resource: "machine_key",
            action: "remove",
            scope: &ctx.instance_id,
        },
        "COMMAND-MachineKey21",
    )?;

    let model = load_key(store, &ctx.instance_id, user_id, key_id).await?;

    super::precondition(
        model.state().state == MachineKeyState::Active,
        "COMMAND-MachineKey20",
        format!("machine key {key_id} is not active"),
    )?;

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        USER_AGGREGATE_TYPE,
        user_id,
        "user.machine.key.removed",
        json!({ "key_id": key_id }),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok(details)
}
