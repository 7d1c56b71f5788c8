//! Human user creation, covering the unique-username scenario.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CommandError;
use crate::event::{Event, EventCommand, UniqueConstraintIntent};
use crate::permission::PermissionRequest;
use crate::store::EventStore;
use crate::write_model::{AggregateWriteModel, WriteModel};

pub const AGGREGATE_TYPE: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UserState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

#[derive(Debug, Clone, Default)]
pub struct HumanUserState {
    pub username: String,
    pub email: String,
    pub state: UserState,
}

impl WriteModel for HumanUserState {
    fn reduce(&mut self, event: &Event) {
        #[derive(Deserialize)]
        struct AddedPayload {
            username: String,
            email: String,
        }

        match event.event_type.as_str() {
            "user.human.added" => {
                if let Ok(payload) = event.payload_as::<AddedPayload>() {
                    self.username = payload.username;
                    self.email = payload.email;
                }
                self.state = UserState::Active;
            }
            "user.removed" => self.state = UserState::Removed,
            _ => {}
        }
    }
}

pub type HumanUserWriteModel = AggregateWriteModel<HumanUserState>;

fn username_constraint(instance_id: &str, username: &str) -> UniqueConstraintIntent {
    UniqueConstraintIntent::Add {
        constraint_type: "user.username".to_string(),
        value: username.to_lowercase(),
        error_message: "a user with this username already exists".to_string(),
        instance_id: Some(instance_id.to_string()),
    }
}

fn email_constraint(instance_id: &str, email: &str) -> UniqueConstraintIntent {
    UniqueConstraintIntent::Add {
        constraint_type: "user.email".to_string(),
        value: email.to_lowercase(),
        error_message: "a user with this email already exists".to_string(),
        instance_id: Some(instance_id.to_string()),
    }
}

/// `addHumanUser(org_id, username, email)`. Username and email are each
/// exclusive within `instance_id`; a second add of either within the same instance fails with
/// `COMMAND-User11`/`COMMAND-User12`.
pub async fn add_human_user(
    ctx: &super::Ctx,
    store: &dyn EventStore,
    org_id: &str,
    username: &str,
    email: &str,
) -> Result<(String, super::ObjectDetails), CommandError> {
    super::require_non_empty(username, "username", "COMMAND-User1")?;
    super::require_non_empty(email, "email", "COMMAND-User2")?;
    ctx.check_permission(
        &PermissionRequest {
            resource: "user",
            action: "create",
            scope: org_id,
        },
        "COMMAND-User3",
    )?;

    let user_id = ctx.next_id();

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        AGGREGATE_TYPE,
        user_id.clone(),
        "user.human.added",
        json!({ "username": username, "email": email }),
        org_id,
        ctx.actor.clone(),
    )
    .with_required_sequence(0)
    .with_unique_constraint(username_constraint(&ctx.instance_id, username))
    .with_unique_constraint(email_constraint(&ctx.instance_id, email));

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok((user_id, details))
}

/// `removeUser(userID)` - releases both unique constraints in the same transaction as the
/// removal event.
pub async fn remove_user(ctx: &super::Ctx, store: &dyn EventStore, user_id: &str) -> Result<super::ObjectDetails, CommandError> {
    let model = HumanUserWriteModel::load(store, &ctx.instance_id, AGGREGATE_TYPE, user_id)
        .await
        .map_err(CommandError::from)?;

    super::map_not_found(
        (model.state().state == UserState::Active).then_some(()),
        "COMMAND-User10",
        format!("user {user_id} not found or already removed"),
    )?;

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        AGGREGATE_TYPE,
        user_id,
        "user.removed",
        json!({}),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence())
    .with_unique_constraint(UniqueConstraintIntent::Remove {
        constraint_type: "user.username".to_string(),
        value: model.state().username.to_lowercase(),
        instance_id: Some(ctx.instance_id.clone()),
    })
    .with_unique_constraint(UniqueConstraintIntent::Remove {
        constraint_type: "user.email".to_string(),
        value: model.state().email.to_lowercase(),
        instance_id: Some(ctx.instance_id.clone()),
    });

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok(details)
}
