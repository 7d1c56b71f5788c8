//! RBAC check used by the command pipeline's step 3.

use std::collections::{HashMap, HashSet};

use crate::error::CommandError;

/// `(resource, action, scope)` triple checked before a command is allowed to proceed.
/// `scope` is typically the instance id or resource-owner id the caller is acting within.
#[derive(Debug, Clone)]
pub struct PermissionRequest<'a> {
    pub resource: &'a str,
    pub action: &'a str,
    pub scope: &'a str,
}

/// A minimal in-memory RBAC service: a caller (subject) holds a set of roles, each role grants
/// a set of `(resource, action)` pairs within a scope. Storage/assignment of roles themselves
/// (another aggregate family) is out of scope; this type only performs the check, grounded in
/// the same shape a real role-grant projection would expose.
#[derive(Default)]
pub struct PermissionService {
    /// scope -> subject -> roles held in that scope.
    grants: HashMap<String, HashMap<String, HashSet<String>>>,
    /// role -> permissions it carries.
    role_permissions: HashMap<String, HashSet<(String, String)>>,
}

impl PermissionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_role(&mut self, role: impl Into<String>, permissions: impl IntoIterator<Item = (String, String)>) {
        self.role_permissions
            .entry(role.into())
            .or_default()
            .extend(permissions);
    }

    pub fn grant_role(&mut self, scope: impl Into<String>, subject: impl Into<String>, role: impl Into<String>) {
        self.grants
            .entry(scope.into())
            .or_default()
            .entry(subject.into())
            .or_default()
            .insert(role.into());
    }

    /// Returns `Ok(())` if `subject` holds a role in `request.scope` that grants
    /// `(request.resource, request.action)`; otherwise a `PermissionDenied` [`CommandError`]
    /// carrying `code`.
    pub fn check(&self, subject: &str, request: &PermissionRequest, code: &'static str) -> Result<(), CommandError> {
        let roles = self
            .grants
            .get(request.scope)
            .and_then(|subjects| subjects.get(subject));

        let allowed = roles.is_some_and(|roles| {
            roles.iter().any(|role| {
                self.role_permissions
                    .get(role)
                    .is_some_and(|perms| perms.contains(&(request.resource.to_string(), request.action.to_string())))
            })
        });

        if allowed {
            Ok(())
        } else {
            Err(CommandError::permission_denied(
                code,
                format!(
                    "subject {subject} lacks permission {}:{} in scope {}",
                    request.resource, request.action, request.scope
                ),
            ))
        }
    }
}
