//! Role Assignment Reconciler
//!
//! Finds the principal holding a prefixed custom role directly on the
//! resource group and grants it the elevated role on the storage account.
//!
//! 1. List role assignments for the resource group
//! 2. Keep those scoped exactly to the group (not inherited, not sub-scopes)
//! 3. Resolve each candidate's role definition in listing order
//! 4. First non-built-in definition whose name has the prefix wins
//! 5. Create one assignment at the resource scope and stop

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::authorization::{AuthorizationApi, RoleAssignment, RoleAssignmentCreate, RoleDefinition};
use crate::config::ReconciliationTarget;
use crate::context::CallContext;
use crate::error::Result;

/// What a reconciliation run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new assignment was created for `principal_id`
    Assigned {
        principal_id: String,
        assignment: RoleAssignment,
    },
    /// No candidate matched; nothing was changed
    NoMatch,
}

/// Reconciles elevated access for one resource group
pub struct Reconciler<'a, A: ?Sized> {
    api: &'a A,
    target: ReconciliationTarget,
    role_prefix: String,
}

impl<'a, A: AuthorizationApi + ?Sized> Reconciler<'a, A> {
    pub fn new(api: &'a A, target: ReconciliationTarget, role_prefix: impl Into<String>) -> Self {
        Self {
            api,
            target,
            role_prefix: role_prefix.into(),
        }
    }

    /// Whether `definition` marks its principal for elevation
    pub fn is_match(&self, definition: &RoleDefinition) -> bool {
        !definition.role_type.is_built_in() && definition.name.starts_with(&self.role_prefix)
    }

    /// Run one reconciliation pass; performs at most one creation call
    pub async fn reconcile(&self, ctx: &CallContext) -> Result<ReconcileOutcome> {
        let assignments = ctx
            .call(
                "list role assignments",
                self.api.list_role_assignments_for_resource_group(
                    &self.target.subscription_id,
                    &self.target.resource_group,
                ),
            )
            .await?;

        let candidates: Vec<&RoleAssignment> = assignments
            .iter()
            .filter(|a| a.scope == self.target.resource_group_scope)
            .collect();

        info!(
            listed = assignments.len(),
            candidates = candidates.len(),
            scope = %self.target.resource_group_scope,
            "Evaluating role assignments"
        );

        for candidate in candidates {
            let definition = ctx
                .call(
                    "get role definition",
                    self.api.get_role_definition(&candidate.role_definition_id),
                )
                .await?;

            if !self.is_match(&definition) {
                debug!(
                    assignment = %candidate.name,
                    role_name = %definition.name,
                    role_type = %definition.role_type,
                    "Skipping role assignment"
                );
                continue;
            }

            info!(
                assignment = %serde_json::to_string(candidate)?,
                definition = %serde_json::to_string(&definition)?,
                "Found matching role assignment"
            );

            return self.assign(candidate, ctx).await;
        }

        warn!(
            scope = %self.target.resource_group_scope,
            prefix = %self.role_prefix,
            "Did not find matching role assignment"
        );

        Ok(ReconcileOutcome::NoMatch)
    }

    async fn assign(&self, candidate: &RoleAssignment, ctx: &CallContext) -> Result<ReconcileOutcome> {
        let assignment_id = Uuid::new_v4().to_string();
        let request = RoleAssignmentCreate {
            principal_id: candidate.principal_id.clone(),
            role_definition_id: self.target.owner_role_definition_id.clone(),
        };

        // Logged before the call: a deadline or cancellation mid-request may
        // still leave the assignment created server-side.
        info!(
            principal_id = %request.principal_id,
            role_definition_id = %request.role_definition_id,
            scope = %self.target.resource_scope,
            assignment_id = %assignment_id,
            "Creating role assignment"
        );

        let created = ctx
            .call(
                "create role assignment",
                self.api
                    .create_role_assignment(&self.target.resource_scope, &assignment_id, &request),
            )
            .await?;

        info!(
            principal_id = %candidate.principal_id,
            role_definition_id = %self.target.owner_role_definition_id,
            scope = %self.target.resource_scope,
            assignment_id = %assignment_id,
            "Assigned principal to role"
        );

        Ok(ReconcileOutcome::Assigned {
            principal_id: candidate.principal_id.clone(),
            assignment: created,
        })
    }
}
