//! WebAuthn token state machine. Sub-entity of the `user` aggregate, same sub-filtering pattern as
//! [`crate::commands::machine_key`].

use serde::Deserialize;
use serde_json::json;

use crate::error::CommandError;
use crate::event::{Event, EventCommand};
use crate::permission::PermissionRequest;
use crate::store::EventStore;
use crate::write_model::{AggregateWriteModel, WriteModel};

use super::user::AGGREGATE_TYPE as USER_AGGREGATE_TYPE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebAuthnTokenState {
    Unspecified,
    NotReady,
    Ready,
    Removed,
}

#[derive(Debug, Clone)]
pub struct WebAuthnWriteModelState {
    token_id: String,
    pub state: WebAuthnTokenState,
    pub challenge: String,
    pub key_id: String,
    pub public_key: String,
}

impl WebAuthnWriteModelState {
    pub fn for_token(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            state: WebAuthnTokenState::Unspecified,
            challenge: String::new(),
            key_id: String::new(),
            public_key: String::new(),
        }
    }
}

impl Default for WebAuthnWriteModelState {
    fn default() -> Self {
        Self::for_token(String::new())
    }
}

impl WriteModel for WebAuthnWriteModelState {
    fn reduce(&mut self, event: &Event) {
        #[derive(Deserialize)]
        struct AddedPayload {
            token_id: String,
            challenge: String,
        }
        #[derive(Deserialize)]
        struct VerifiedPayload {
            token_id: String,
            key_id: String,
            public_key: String,
        }
        #[derive(Deserialize)]
        struct TokenIdPayload {
            token_id: String,
        }

        match event.event_type.as_str() {
            "user.human.webauthn.added" => {
                if let Ok(payload) = event.payload_as::<AddedPayload>() {
                    if payload.token_id == self.token_id {
                        self.challenge = payload.challenge;
                        self.state = WebAuthnTokenState::NotReady;
                    }
                }
            }
            "user.human.webauthn.verified" => {
                if let Ok(payload) = event.payload_as::<VerifiedPayload>() {
                    if payload.token_id == self.token_id {
                        self.key_id = payload.key_id;
                        self.public_key = payload.public_key;
                        self.state = WebAuthnTokenState::Ready;
                    }
                }
            }
            "user.human.webauthn.removed" => {
                if let Ok(payload) = event.payload_as::<TokenIdPayload>() {
                    if payload.token_id == self.token_id {
                        self.state = WebAuthnTokenState::Removed;
                    }
                }
            }
            _ => {}
        }
    }
}

pub type WebAuthnWriteModel = AggregateWriteModel<WebAuthnWriteModelState>;

async fn load_token(store: &dyn EventStore, instance_id: &str, user_id: &str, token_id: &str) -> Result<WebAuthnWriteModel, CommandError> {
    WebAuthnWriteModel::load_with_state(
        store,
        instance_id,
        USER_AGGREGATE_TYPE,
        user_id,
        WebAuthnWriteModelState::for_token(token_id),
    )
    .await
    .map_err(CommandError::from)
}

/// `addWebAuthnToken(userID)` → state NOT_READY, returns the generated challenge the caller
/// passes to the client's WebAuthn ceremony.
pub async fn add_webauthn_token(ctx: &super::Ctx, store: &dyn EventStore, user_id: &str) -> Result<(String, String, super::ObjectDetails), CommandError> {
    ctx.check_permission(
        &PermissionRequest {
            resource: "webauthn_token",
            action: "create",
            scope: &ctx.instance_id,
        },
        "COMMAND-WebAuthN11",
    )?;

    let model = load_token(store, &ctx.instance_id, user_id, "").await?;

    let token_id = ctx.next_id();
    let challenge = uuid::Uuid::new_v4().to_string();

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        USER_AGGREGATE_TYPE,
        user_id,
        "user.human.webauthn.added",
        json!({ "token_id": token_id, "challenge": challenge }),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok((token_id, challenge, details))
}

/// `verifyWebAuthnToken(userID, tokenID, keyID, publicKey)` → state READY. Requires NOT_READY.
pub async fn verify_webauthn_token(
    ctx: &super::Ctx,
    store: &dyn EventStore,
    user_id: &str,
    token_id: &str,
    key_id: &str,
    public_key: &str,
) -> Result<super::ObjectDetails, CommandError> {
    ctx.check_permission(
        &PermissionRequest {
            resource: "webauthn_token",
            action: "verify",
            scope: &ctx.instance_id,
        },
        "COMMAND-WebAuthN12",
    )?;

    let model = load_token(store, &ctx.instance_id, user_id, token_id).await?;

    super::precondition(
        model.state().state == WebAuthnTokenState::NotReady,
        "COMMAND-WebAuthN10",
        format!("webauthn token {token_id} is not in state NOT_READY"),
    )?;

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        USER_AGGREGATE_TYPE,
        user_id,
        "user.human.webauthn.verified",
        json!({ "token_id": token_id, "key_id": key_id, "public_key": public_key }),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok(details)
}

/// `removeWebAuthnToken(userID, tokenID)` - requires the token to currently be READY.
pub async fn remove_webauthn_token(ctx: &super::Ctx, store: &dyn EventStore, user_id: &str, token_id: &str) -> Result<super::ObjectDetails, CommandError> {
    ctx.check_permission(
        &PermissionRequest {
            resource: "webauthn_token",
            action: "remove",
            scope: &ctx.instance_id,
        },
        "COMMAND-WebAuthN21",
    )?;

    let model = load_token(store, &ctx.instance_id, user_id, token_id).await?;

    super::precondition(
        model.state().state == WebAuthnTokenState::Ready,
        "COMMAND-WebAuthN20",
        format!("webauthn token {token_id} is not in state READY"),
    )?;

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        USER_AGGREGATE_TYPE,
        user_id,
        "user.human.webauthn.removed",
        json!({ "token_id": token_id }),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok(details)
}
