//! Azure Authorization Management Client
//!
//! Thin wrapper over the `Microsoft.Authorization` REST API: list role
//! assignments for a resource group, resolve role definitions, and create
//! role assignments. Every request carries the bearer token read from
//! Key Vault via [`attach_auth`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{attach_auth, BearerToken};
use crate::error::Result;
use crate::http::read_json;

const AUTHORIZATION_API_VERSION: &str = "2022-04-01";

// ============================================================
// Domain Types
// ============================================================

/// Binding of a principal to a role definition at a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub id: String,
    pub name: String,
    pub principal_id: String,
    pub role_definition_id: String,
    pub scope: String,
}

/// Whether a role definition is provider-defined or custom
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RoleType {
    BuiltInRole,
    CustomRole,
    Other(String),
}

impl RoleType {
    fn parse(value: &str) -> Self {
        match value {
            "BuiltInRole" => RoleType::BuiltInRole,
            "CustomRole" => RoleType::CustomRole,
            other => RoleType::Other(other.to_string()),
        }
    }

    pub fn is_built_in(&self) -> bool {
        matches!(self, RoleType::BuiltInRole)
    }
}

impl std::fmt::Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleType::BuiltInRole => write!(f, "BuiltInRole"),
            RoleType::CustomRole => write!(f, "CustomRole"),
            RoleType::Other(other) => write!(f, "{}", other),
        }
    }
}

/// Named set of permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinition {
    pub id: String,
    /// Display name, e.g. `cal-role-dev`
    pub name: String,
    pub role_type: RoleType,
}

/// Body of a role assignment creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentCreate {
    pub principal_id: String,
    pub role_definition_id: String,
}

// ============================================================
// API Response Types
// ============================================================

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleAssignmentResource {
    id: String,
    name: String,
    properties: RoleAssignmentProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleAssignmentProperties {
    scope: String,
    role_definition_id: String,
    principal_id: String,
}

impl From<RoleAssignmentResource> for RoleAssignment {
    fn from(resource: RoleAssignmentResource) -> Self {
        Self {
            id: resource.id,
            name: resource.name,
            principal_id: resource.properties.principal_id,
            role_definition_id: resource.properties.role_definition_id,
            scope: resource.properties.scope,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleDefinitionResource {
    id: String,
    properties: RoleDefinitionProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleDefinitionProperties {
    role_name: String,
    #[serde(rename = "type")]
    role_type: String,
}

impl From<RoleDefinitionResource> for RoleDefinition {
    fn from(resource: RoleDefinitionResource) -> Self {
        Self {
            id: resource.id,
            name: resource.properties.role_name,
            role_type: RoleType::parse(&resource.properties.role_type),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateRoleAssignmentRequest<'a> {
    properties: &'a RoleAssignmentCreate,
}

// ============================================================
// Collaborator Trait
// ============================================================

/// Authorization management collaborator
#[async_trait]
pub trait AuthorizationApi: Send + Sync {
    /// List role assignments visible on a resource group, including inherited ones
    async fn list_role_assignments_for_resource_group(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<Vec<RoleAssignment>>;

    /// Resolve a role definition by its full resource id
    async fn get_role_definition(&self, role_definition_id: &str) -> Result<RoleDefinition>;

    /// Create a role assignment named `assignment_id` at `scope`
    async fn create_role_assignment(
        &self,
        scope: &str,
        assignment_id: &str,
        assignment: &RoleAssignmentCreate,
    ) -> Result<RoleAssignment>;
}

// ============================================================
// Client Implementation
// ============================================================

/// Azure Resource Manager authorization client
pub struct AuthorizationClient {
    http_client: reqwest::Client,
    base_url: String,
    token: BearerToken,
}

impl AuthorizationClient {
    /// Create a client against `base_url` (normally `https://management.azure.com`)
    pub fn new(base_url: &str, token: BearerToken) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("role-provisioner/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a URL from a resource path that starts with `/`
    fn url(&self, resource_path: &str) -> String {
        format!("{}{}", self.base_url, resource_path)
    }
}

#[async_trait]
impl AuthorizationApi for AuthorizationClient {
    async fn list_role_assignments_for_resource_group(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<Vec<RoleAssignment>> {
        let url = self.url(&format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Authorization/roleAssignments",
            urlencoding::encode(subscription_id),
            urlencoding::encode(resource_group)
        ));

        debug!(resource_group = %resource_group, "Listing role assignments");

        let request = self
            .http_client
            .get(&url)
            .query(&[("api-version", AUTHORIZATION_API_VERSION)]);
        let response = attach_auth(request, &self.token).send().await?;
        let list: ListResponse<RoleAssignmentResource> =
            read_json(response, "list role assignments").await?;

        Ok(list.value.into_iter().map(RoleAssignment::from).collect())
    }

    async fn get_role_definition(&self, role_definition_id: &str) -> Result<RoleDefinition> {
        let url = self.url(role_definition_id);

        debug!(role_definition_id = %role_definition_id, "Fetching role definition");

        let request = self
            .http_client
            .get(&url)
            .query(&[("api-version", AUTHORIZATION_API_VERSION)]);
        let response = attach_auth(request, &self.token).send().await?;
        let definition: RoleDefinitionResource =
            read_json(response, "get role definition").await?;

        Ok(definition.into())
    }

    async fn create_role_assignment(
        &self,
        scope: &str,
        assignment_id: &str,
        assignment: &RoleAssignmentCreate,
    ) -> Result<RoleAssignment> {
        let url = self.url(&format!(
            "{}/providers/Microsoft.Authorization/roleAssignments/{}",
            scope,
            urlencoding::encode(assignment_id)
        ));

        debug!(scope = %scope, assignment_id = %assignment_id, "Creating role assignment");

        let request = self
            .http_client
            .put(&url)
            .query(&[("api-version", AUTHORIZATION_API_VERSION)])
            .json(&CreateRoleAssignmentRequest {
                properties: assignment,
            });
        let response = attach_auth(request, &self.token).send().await?;
        let created: RoleAssignmentResource =
            read_json(response, "create role assignment").await?;

        Ok(created.into())
    }
}
