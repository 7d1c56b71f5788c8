//! Organization lifecycle commands: the template the rest of `commands` follows.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CommandError;
use crate::event::{Event, EventCommand, UniqueConstraintIntent};
use crate::permission::PermissionRequest;
use crate::store::EventStore;
use crate::write_model::{AggregateWriteModel, WriteModel};

pub const AGGREGATE_TYPE: &str = "org";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrgState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

#[derive(Debug, Clone, Default)]
pub struct OrgWriteModelState {
    pub name: String,
    pub state: OrgState,
}

impl WriteModel for OrgWriteModelState {
    fn reduce(&mut self, event: &Event) {
        match event.event_type.as_str() {
            "org.added" => {
                #[derive(Deserialize)]
                struct Payload {
                    name: String,
                }
                if let Ok(payload) = event.payload_as::<Payload>() {
                    self.name = payload.name;
                }
                self.state = OrgState::Active;
            }
            "org.deactivated" => self.state = OrgState::Inactive,
            "org.reactivated" => self.state = OrgState::Active,
            "org.removed" => self.state = OrgState::Removed,
            _ => {}
        }
    }
}

pub type OrgWriteModel = AggregateWriteModel<OrgWriteModelState>;

async fn load(store: &dyn EventStore, instance_id: &str, org_id: &str) -> Result<OrgWriteModel, CommandError> {
    OrgWriteModel::load(store, instance_id, AGGREGATE_TYPE, org_id)
        .await
        .map_err(CommandError::from)
}

fn unique_name_constraint(instance_id: &str, name: &str) -> UniqueConstraintIntent {
    UniqueConstraintIntent::Add {
        constraint_type: "org.name".to_string(),
        value: name.to_lowercase(),
        error_message: "an organization with this name already exists".to_string(),
        instance_id: Some(instance_id.to_string()),
    }
}

/// `addOrg(name)`. Fails with `COMMAND-Org1` on an empty name.
pub async fn add_org(
    ctx: &super::Ctx,
    store: &dyn EventStore,
    name: &str,
) -> Result<(String, super::ObjectDetails), CommandError> {
    super::require_non_empty(name, "name", "COMMAND-Org1")?;
    ctx.check_permission(
        &PermissionRequest {
            resource: "org",
            action: "create",
            scope: &ctx.instance_id,
        },
        "COMMAND-Org2",
    )?;

    let org_id = ctx.next_id();

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        AGGREGATE_TYPE,
        org_id.clone(),
        "org.added",
        json!({ "name": name }),
        org_id.clone(),
        ctx.actor.clone(),
    )
    .with_required_sequence(0)
    .with_unique_constraint(unique_name_constraint(&ctx.instance_id, name));

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok((org_id, details))
}

/// `deactivateOrg(orgID)`. Requires state ACTIVE; double-deactivate raises `COMMAND-Org31`.
pub async fn deactivate_org(ctx: &super::Ctx, store: &dyn EventStore, org_id: &str) -> Result<super::ObjectDetails, CommandError> {
    ctx.check_permission(
        &PermissionRequest {
            resource: "org",
            action: "deactivate",
            scope: &ctx.instance_id,
        },
        "COMMAND-Org3",
    )?;

    let model = load(store, &ctx.instance_id, org_id).await?;

    super::map_not_found(
        (model.state().state != OrgState::Unspecified).then_some(()),
        "COMMAND-Org30",
        format!("org {org_id} not found"),
    )?;
    super::precondition(
        model.state().state == OrgState::Active,
        "COMMAND-Org31",
        format!("org {org_id} is not active"),
    )?;

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        AGGREGATE_TYPE,
        org_id,
        "org.deactivated",
        json!({}),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok(details)
}

/// `reactivateOrg(orgID)`. Requires state INACTIVE.
pub async fn reactivate_org(ctx: &super::Ctx, store: &dyn EventStore, org_id: &str) -> Result<super::ObjectDetails, CommandError> {
    ctx.check_permission(
        &PermissionRequest {
            resource: "org",
            action: "reactivate",
            scope: &ctx.instance_id,
        },
        "COMMAND-Org4",
    )?;

    let model = load(store, &ctx.instance_id, org_id).await?;

    super::map_not_found(
        (model.state().state != OrgState::Unspecified).then_some(()),
        "COMMAND-Org30",
        format!("org {org_id} not found"),
    )?;
    super::precondition(
        model.state().state == OrgState::Inactive,
        "COMMAND-Org32",
        format!("org {org_id} is not inactive"),
    )?;

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        AGGREGATE_TYPE,
        org_id,
        "org.reactivated",
        json!({}),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence());

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok(details)
}

/// `removeOrg(orgID)` - transitions ACTIVE or INACTIVE to REMOVED and releases the org's name.
pub async fn remove_org(ctx: &super::Ctx, store: &dyn EventStore, org_id: &str) -> Result<super::ObjectDetails, CommandError> {
    ctx.check_permission(
        &PermissionRequest {
            resource: "org",
            action: "remove",
            scope: &ctx.instance_id,
        },
        "COMMAND-Org5",
    )?;

    let model = load(store, &ctx.instance_id, org_id).await?;

    super::map_not_found(
        (model.state().state != OrgState::Unspecified).then_some(()),
        "COMMAND-Org30",
        format!("org {org_id} not found"),
    )?;
    super::precondition(
        matches!(model.state().state, OrgState::Active | OrgState::Inactive),
        "COMMAND-Org33",
        format!("org {org_id} is already removed"),
    )?;

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        AGGREGATE_TYPE,
        org_id,
        "org.removed",
        json!({}),
        model.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(model.sequence())
    .with_unique_constraint(UniqueConstraintIntent::Remove {
        constraint_type: "org.name".to_string(),
        value: model.state().name.to_lowercase(),
        instance_id: Some(ctx.instance_id.clone()),
    });

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok(details)
}
