//! OIDC application provisioning, covering the project-precondition scenario.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CommandError;
use crate::event::{Event, EventCommand};
use crate::store::EventStore;
use crate::write_model::{AggregateWriteModel, WriteModel};

pub const AGGREGATE_TYPE: &str = "app";
const PROJECT_AGGREGATE_TYPE: &str = "project";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectState {
    #[default]
    Unspecified,
    Active,
    Inactive,
}

/// Just enough of the project write-model to check the referential precondition - the project
/// must be ACTIVE to add an app - the project aggregate's full lifecycle is otherwise out of
/// this crate's command-template scope.
#[derive(Debug, Clone, Default)]
pub struct ProjectWriteModelState {
    pub state: ProjectState,
}

impl WriteModel for ProjectWriteModelState {
    fn reduce(&mut self, event: &Event) {
        match event.event_type.as_str() {
            "project.added" => self.state = ProjectState::Active,
            "project.deactivated" => self.state = ProjectState::Inactive,
            "project.reactivated" => self.state = ProjectState::Active,
            _ => {}
        }
    }
}

pub type ProjectWriteModel = AggregateWriteModel<ProjectWriteModelState>;

/// `addOIDCApp(projectID, name, redirectURIs)`:
/// - empty `redirectURIs` → `InvalidArgument` `COMMAND-App10`.
/// - project not ACTIVE → `NotFound` `COMMAND-App11`.
pub async fn add_oidc_app(
    ctx: &super::Ctx,
    store: &dyn EventStore,
    project_id: &str,
    name: &str,
    redirect_uris: &[String],
) -> Result<(OidcAppCreated, super::ObjectDetails), CommandError> {
    super::require_non_empty(name, "name", "COMMAND-App1")?;

    if redirect_uris.is_empty() {
        return Err(CommandError::invalid_argument("COMMAND-App10", "redirectURIs must not be empty"));
    }

    let project = ProjectWriteModel::load(store, &ctx.instance_id, PROJECT_AGGREGATE_TYPE, project_id)
        .await
        .map_err(CommandError::from)?;

    super::map_not_found(
        (project.state().state == ProjectState::Active).then_some(()),
        "COMMAND-App11",
        format!("project {project_id} is not active"),
    )?;

    let app_id = ctx.next_id();
    let client_id = ctx.next_id();
    // One-time secret: only returned here, never stored in the clear, never re-readable.
    // A real deployment hashes this before persisting it.
    let client_secret = uuid::Uuid::new_v4().to_string();

    let command = EventCommand::new(
        ctx.instance_id.clone(),
        AGGREGATE_TYPE,
        app_id.clone(),
        "app.oidc.added",
        json!({
            "projectID": project_id,
            "name": name,
            "redirectURIs": redirect_uris,
            "clientID": client_id,
        }),
        project.resource_owner().to_string(),
        ctx.actor.clone(),
    )
    .with_required_sequence(0);

    let (_events, details) = super::push_and_finish(store, vec![command]).await?;
    Ok((OidcAppCreated { app_id, client_id, client_secret }, details))
}

/// Result of [`add_oidc_app`]. `client_secret` is a one-time secret the caller must capture
/// immediately, since it is never readable again.
#[derive(Debug, Clone)]
pub struct OidcAppCreated {
    pub app_id: String,
    pub client_id: String,
    pub client_secret: String,
}
