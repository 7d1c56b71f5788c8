//! Authentication request state machine.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CommandError;
use crate::event::{Event, EventCommand};
use crate::store::EventStore;
use crate::write_model::{AggregateWriteModel, WriteModel};

pub const AGGREGATE_TYPE: &str = "auth_request";

/// Minimum accepted password length for the simplified check.
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthRequestState {
    #[default]
    Unspecified,
    Added,
    UserSelected,
    PasswordChecked,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct AuthRequestWriteModelState {
    pub user_id: String,
    pub state: AuthRequestState,
}

impl WriteModel for AuthRequestWriteModelState {
    fn reduce(&mut self, event: &Event) {
        match event.event_type.as_str() {
            "auth_request.added" => self.state = AuthRequestState::Added,
            "auth_request.user.selected" => {
                #[derive(Deserialize)]
                struct Payload {
                    user_id: String,
                }
                if let Ok(payload) = event.payload_as::<Payload>() {
                    self.user_id = payload.user_id;
                }
                self.state = AuthRequestState::UserSelected;
            }
            "auth_request.password.checked" => self.state = AuthRequestState::PasswordChecked,
            // password.failed deliberately does not advance state.
            "auth_request.succeeded" => self.state = AuthRequestState::Succeeded,
            "auth_request.failed" => self.state = AuthRequestState::Failed,
            _ => {}
        }
    }
}

pub type AuthRequestWriteModel = AggregateWriteModel<AuthRequestWriteModelState>;

async fn load(store: &dyn EventStore, instance_id: &str, auth_request_id: &str) -> Result<AuthRequestWriteModel, CommandError> {
    AuthRequestWriteModel::load(store, instance_id, AGGREGATE_TYPE, auth_request_id)
        .await
        .map_err(CommandError::from)
}

/// `addAuthRequest()` → state ADDED.
pub async fn add_auth_request(ctx: &super::Ctx, store: &dyn EventStore) -> Result<(String, super::ObjectDetails), CommandError> {
    let auth_request_id = ctx.next_id();

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        AGGREGATE_TYPE,
        auth_request_id.clone(),
        "auth_request.added",
        json!({}),
        ctx.instance_id.clone(),
        ctx.actor.clone(),
    )
    .with_required_sequence(0);

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok((auth_request_id, details))
}

/// `selectUser(authRequestID, userID)` → state USER_SELECTED. Requires state ADDED.
pub async fn select_user(
    ctx: &super::Ctx,
    store: &dyn EventStore,
    auth_request_id: &str,
    user_id: &str,
) -> Result<super::ObjectDetails, CommandError> {
    let model = load(store, &ctx.instance_id, auth_request_id).await?;

    super::precondition(
        model.state().state == AuthRequestState::Added,
        "COMMAND-Auth20",
        format!("auth request {auth_request_id} is not in state ADDED"),
    )?;

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        AGGREGATE_TYPE,
        auth_request_id,
        "auth_request.user.selected",
        json!({ "user_id": user_id }),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok(details)
}

/// `checkPassword(authRequestID, password)`: a too-short password emits
/// `auth_request.password.failed` and the caller still receives success details, but the
/// write-model does not advance to PASSWORD_CHECKED. A long-enough password advances normally.
pub async fn check_password(
    ctx: &super::Ctx,
    store: &dyn EventStore,
    auth_request_id: &str,
    password: &str,
) -> Result<super::ObjectDetails, CommandError> {
    let model = load(store, &ctx.instance_id, auth_request_id).await?;

    super::precondition(
        model.state().state == AuthRequestState::UserSelected,
        "COMMAND-Auth21",
        format!("auth request {auth_request_id} is not in state USER_SELECTED"),
    )?;

    let event_type = if password.len() < MIN_PASSWORD_LENGTH {
        "auth_request.password.failed"
    } else {
        "auth_request.password.checked"
    };

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        AGGREGATE_TYPE,
        auth_request_id,
        event_type,
        json!({}),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok(details)
}

/// `succeedAuthRequest(authRequestID, responseType)` → returns `authCode`, state SUCCEEDED.
/// A second call on an already-terminal request raises `COMMAND-Auth41`.
pub async fn succeed_auth_request(
    ctx: &super::Ctx,
    store: &dyn EventStore,
    auth_request_id: &str,
    response_type: &str,
) -> Result<(String, super::ObjectDetails), CommandError> {
    let model = load(store, &ctx.instance_id, auth_request_id).await?;

    super::precondition(
        model.state().state == AuthRequestState::PasswordChecked,
        "COMMAND-Auth41",
        format!("auth request {auth_request_id} is not in state PASSWORD_CHECKED"),
    )?;

    let auth_code = ctx.next_id();

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        AGGREGATE_TYPE,
        auth_request_id,
        "auth_request.succeeded",
        json!({ "response_type": response_type, "auth_code": auth_code }),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok((auth_code, details))
}
