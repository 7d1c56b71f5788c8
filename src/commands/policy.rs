//! Policy write-models.
//!
//! This crate implements one concrete policy family, the login policy, as the template every
//! other policy (password complexity, privacy, label) follows identically - only the event
//! type names and payload shape differ.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CommandError;
use crate::event::{Event, EventCommand};
use crate::permission::PermissionRequest;
use crate::store::EventStore;
use crate::write_model::{AggregateWriteModel, WriteModel};

use super::org::AGGREGATE_TYPE as ORG_AGGREGATE_TYPE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginPolicyWriteModelState {
    /// `true` until an org-specific policy is added; flips back to `true` if later removed.
    pub is_default: bool,
    pub allow_username_password: bool,
    pub mfa_required: bool,
}

impl Default for LoginPolicyWriteModelState {
    fn default() -> Self {
        Self {
            is_default: true,
            allow_username_password: true,
            mfa_required: false,
        }
    }
}

impl WriteModel for LoginPolicyWriteModelState {
    fn reduce(&mut self, event: &Event) {
        #[derive(Deserialize)]
        struct Payload {
            allow_username_password: bool,
            mfa_required: bool,
        }

        match event.event_type.as_str() {
            "org.policy.login.added" => {
                if let Ok(payload) = event.payload_as::<Payload>() {
                    self.allow_username_password = payload.allow_username_password;
                    self.mfa_required = payload.mfa_required;
                }
                self.is_default = false;
            }
            "org.policy.login.changed" => {
                if let Ok(payload) = event.payload_as::<Payload>() {
                    self.allow_username_password = payload.allow_username_password;
                    self.mfa_required = payload.mfa_required;
                }
            }
            "org.policy.login.removed" => {
                *self = Self::default();
            }
            _ => {}
        }
    }
}

pub type LoginPolicyWriteModel = AggregateWriteModel<LoginPolicyWriteModelState>;

async fn load(store: &dyn EventStore, instance_id: &str, org_id: &str) -> Result<LoginPolicyWriteModel, CommandError> {
    LoginPolicyWriteModel::load(store, instance_id, ORG_AGGREGATE_TYPE, org_id)
        .await
        .map_err(CommandError::from)
}

/// `addLoginPolicy(orgID, allowUsernamePassword, mfaRequired)` - fails with
/// `COMMAND-LoginPolicy10` if the org already has a non-default policy.
pub async fn add_login_policy(
    ctx: &super::Ctx,
    store: &dyn EventStore,
    org_id: &str,
    allow_username_password: bool,
    mfa_required: bool,
) -> Result<super::ObjectDetails, CommandError> {
    ctx.check_permission(
        &PermissionRequest {
            resource: "login_policy",
            action: "create",
            scope: org_id,
        },
        "COMMAND-LoginPolicy11",
    )?;

    let model = load(store, &ctx.instance_id, org_id).await?;

    super::precondition(
        model.state().is_default,
        "COMMAND-LoginPolicy10",
        format!("org {org_id} already has a custom login policy"),
    )?;

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        ORG_AGGREGATE_TYPE,
        org_id,
        "org.policy.login.added",
        json!({ "allow_username_password": allow_username_password, "mfa_required": mfa_required }),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok(details)
}

/// `removeLoginPolicy(orgID)` - reverts the org to the instance default. Fails with
/// `COMMAND-LoginPolicy20` if the org has no custom policy to remove.
pub async fn remove_login_policy(ctx: &super::Ctx, store: &dyn EventStore, org_id: &str) -> Result<super::ObjectDetails, CommandError> {
    ctx.check_permission(
        &PermissionRequest {
            resource: "login_policy",
            action: "remove",
            scope: org_id,
        },
        "COMMAND-LoginPolicy21",
    )?;

    let model = load(store, &ctx.instance_id, org_id).await?;

    super::precondition(
        !model.state().is_default,
        "COMMAND-LoginPolicy20",
        format!("org {org_id} has no custom login policy"),
    )?;

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        ORG_AGGREGATE_TYPE,
        org_id,
        "org.policy.login.removed",
        json!({}),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok(details)
}
