use std::sync::Arc;

use identity_eventstore::commands::Ctx;
use identity_eventstore::{IdGenerator, PermissionService};

/// Every `(resource, action)` pair any command in this crate checks, granted to one role so
/// tests don't have to enumerate them per scenario.
const ALL_PERMISSIONS: &[(&str, &str)] = &[
    ("org", "create"),
    ("org", "deactivate"),
    ("org", "reactivate"),
    ("org", "remove"),
    ("user", "create"),
    ("login_policy", "create"),
    ("login_policy", "remove"),
    ("machine_key", "create"),
    ("machine_key", "remove"),
    ("webauthn_token", "create"),
    ("webauthn_token", "verify"),
    ("webauthn_token", "remove"),
];

/// Builds a [`Ctx`] whose actor holds every known permission in each of `scopes`. Tests whose
/// commands check a scope only known after an earlier command (e.g. a freshly created org id)
/// build a second `Ctx` once that id is in hand.
pub fn ctx(instance_id: &str, actor: &str, scopes: &[&str]) -> Ctx {
    let mut permissions = PermissionService::new();
    permissions.define_role(
        "test-admin",
        ALL_PERMISSIONS.iter().map(|(r, a)| (r.to_string(), a.to_string())),
    );
    for scope in scopes {
        permissions.grant_role(*scope, actor, "test-admin");
    }

    Ctx::new(instance_id, actor, Arc::new(IdGenerator::new(1)), Arc::new(permissions))
}

/// A [`Ctx`] whose actor holds nothing, for asserting a command's permission check actually
/// rejects an unauthorized caller.
pub fn powerless_ctx(instance_id: &str, actor: &str) -> Ctx {
    Ctx::new(instance_id, actor, Arc::new(IdGenerator::new(1)), Arc::new(PermissionService::new()))
}
