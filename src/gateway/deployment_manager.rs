//! Google Cloud Deployment Manager backend.
//!
//! Talks to the Deployment Manager v2 REST API with `reqwest`. A deployment
//! plays the role of a stack and a deployment preview plays the role of a
//! change set. Change-set ids have the form `<deployment>/<change set name>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::config::{Configuration, Template, TemplateHasher};
use crate::error::{BackendError, KilnError, Result};
use crate::poller::Poller;

use super::provider::ProviderGateway;
use super::types::{Change, ChangeAction, ChangeSet, ChangeSetStatus, Stack, StackParameters, StackStatus};
use super::wait;

/// Deployment Manager API base URL.
pub const DEPLOYMENT_MANAGER_API_URL: &str = "https://deploymentmanager.googleapis.com/deploymentmanager/v2";

/// Environment variable holding the OAuth access token.
pub const ACCESS_TOKEN_VAR: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Deployment Manager implementation of the provider gateway.
#[derive(Debug)]
pub struct DeploymentManagerGateway {
    /// HTTP client.
    client: Client,
    /// API base URL, without a trailing slash.
    base_url: String,
    /// Project owning the deployments.
    project: String,
    /// OAuth access token.
    access_token: String,
    /// Poller backing the wait primitives.
    poller: Poller,
    /// Hasher for change-set names.
    hasher: TemplateHasher,
}

/// Deployment resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Deployment {
    name: String,
    id: Option<String>,
    fingerprint: Option<String>,
    insert_time: Option<String>,
    operation: Option<Operation>,
}

/// Long-running operation attached to a deployment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    operation_type: Option<String>,
    status: Option<String>,
    target_id: Option<String>,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    errors: Vec<OperationErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorEntry {
    message: Option<String>,
}

/// One page of `resources.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourcesPage {
    #[serde(default)]
    resources: Vec<Resource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    name: String,
    #[serde(rename = "type")]
    resource_type: Option<String>,
    id: Option<String>,
    update: Option<ResourceUpdate>,
}

#[derive(Debug, Deserialize)]
struct ResourceUpdate {
    intent: Option<String>,
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Body of `deployments.insert` and `deployments.update`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<TargetConfiguration<'a>>,
}

#[derive(Debug, Serialize)]
struct TargetConfiguration<'a> {
    config: ConfigFile<'a>,
}

#[derive(Debug, Serialize)]
struct ConfigFile<'a> {
    content: &'a str,
}

impl DeploymentManagerGateway {
    /// Creates a gateway for the project of `config`, authenticating with
    /// the token in `GOOGLE_OAUTH_ACCESS_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns an error if no project or token is available or the HTTP
    /// client cannot be created.
    pub fn from_config(config: &Configuration, poller: Poller) -> Result<Self> {
        let project = config.main.project.clone().ok_or_else(|| connect_error("main.project is not set"))?;
        let access_token = std::env::var(ACCESS_TOKEN_VAR)
            .map_err(|_| connect_error(format!("{ACCESS_TOKEN_VAR} is not set")))?;

        Self::new(DEPLOYMENT_MANAGER_API_URL, project, access_token, poller)
    }

    /// Creates a gateway against an explicit API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        base_url: impl Into<String>,
        project: impl Into<String>,
        access_token: impl Into<String>,
        poller: Poller,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| connect_error(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project: project.into(),
            access_token: access_token.into(),
            poller,
            hasher: TemplateHasher::new(),
        })
    }

    fn deployments_url(&self) -> String {
        format!("{}/projects/{}/global/deployments", self.base_url, self.project)
    }

    fn deployment_url(&self, name: &str) -> String {
        format!("{}/{name}", self.deployments_url())
    }

    /// Sends a request and decodes a successful JSON response.
    async fn send<T: DeserializeOwned>(&self, operation: &'static str, request: RequestBuilder) -> Result<T> {
        trace!("Calling {operation}");
        let response = request
            .bearer_auth(&self.access_token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| BackendError::api(operation, format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::api(operation, api_message(status, &body)).into());
        }

        response.json().await.map_err(|e| {
            BackendError::invalid_response(operation, format!("Failed to parse response: {e}")).into()
        })
    }

    /// Fetches a deployment, `None` if it does not exist.
    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>> {
        let response = self
            .client
            .get(self.deployment_url(name))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| BackendError::api("deployments.get", format!("Request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Deployment {name} does not exist");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::api("deployments.get", api_message(status, &body)).into());
        }

        response.json().await.map(Some).map_err(|e| {
            BackendError::invalid_response("deployments.get", format!("Failed to parse response: {e}")).into()
        })
    }

    /// Fetches a deployment that must exist.
    async fn existing_deployment(&self, name: &str) -> Result<Deployment> {
        self.get_deployment(name)
            .await?
            .ok_or_else(|| BackendError::StackNotFound { name: name.to_string() }.into())
    }

    /// Lists the deployment's resources, following pagination.
    async fn list_resources(&self, name: &str) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(format!("{}/resources", self.deployment_url(name)));
            if let Some(token) = page_token.take() {
                request = request.query(&[("pageToken", token)]);
            }

            let page: ResourcesPage = self.send("resources.list", request).await?;
            resources.extend(page.resources);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(resources),
            }
        }
    }
}

#[async_trait]
impl ProviderGateway for DeploymentManagerGateway {
    async fn validate_template(&self, template: &Template) -> Result<()> {
        debug!("Validating configuration ({} bytes)", template.size());
        check_config(template.body())
    }

    async fn create_change_set(
        &self,
        stack_name: &str,
        template: &Template,
        params: &StackParameters,
    ) -> Result<ChangeSet> {
        warn_unsupported(params);
        let deployment = self.existing_deployment(stack_name).await?;
        let name = self.hasher.change_set_name(template, Utc::now());
        info!("Previewing {name} for deployment {stack_name}");

        let body = DeploymentRequest {
            name: stack_name,
            fingerprint: deployment.fingerprint.as_deref(),
            description: Some(name.as_str()),
            target: Some(TargetConfiguration {
                config: ConfigFile {
                    content: template.body(),
                },
            }),
        };
        let request = self
            .client
            .put(self.deployment_url(stack_name))
            .query(&[("preview", "true")])
            .json(&body);
        let _: Operation = self.send("deployments.update", request).await?;

        Ok(ChangeSet::pending(
            change_set_id(stack_name, &name),
            name,
            deployment.id.unwrap_or_default(),
            stack_name,
        ))
    }

    async fn describe_change_set(&self, change_set_id: &str) -> Result<ChangeSet> {
        let (deployment_name, name) = split_change_set_id(change_set_id);
        let deployment = self.existing_deployment(deployment_name).await?;

        let mut change_set = ChangeSet::pending(
            change_set_id,
            name,
            deployment.id.unwrap_or_default(),
            deployment_name,
        );
        change_set.status = preview_status(deployment.operation.as_ref());
        if change_set.status == ChangeSetStatus::Ready {
            change_set.changes = self
                .list_resources(deployment_name)
                .await?
                .into_iter()
                .filter_map(resource_change)
                .collect();
        }

        Ok(change_set)
    }

    async fn execute_change_set(&self, change_set_id: &str) -> Result<()> {
        let (deployment_name, _) = split_change_set_id(change_set_id);
        let deployment = self.existing_deployment(deployment_name).await?;
        info!("Applying preview of deployment {deployment_name}");

        // An update without a target applies the pending preview.
        let body = DeploymentRequest {
            name: deployment_name,
            fingerprint: deployment.fingerprint.as_deref(),
            description: None,
            target: None,
        };
        let request = self
            .client
            .put(self.deployment_url(deployment_name))
            .query(&[("preview", "false")])
            .json(&body);
        let _: Operation = self.send("deployments.update", request).await?;
        Ok(())
    }

    async fn describe_stack(&self, stack_name: &str) -> Result<Option<Stack>> {
        let Some(deployment) = self.get_deployment(stack_name).await? else {
            return Ok(None);
        };

        let (status, raw_status, reason) = deployment_status(deployment.operation.as_ref());
        Ok(Some(Stack {
            name: deployment.name,
            id: deployment.id,
            status,
            raw_status,
            status_reason: reason,
            created_at: deployment
                .insert_time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
            outputs: Vec::new(),
        }))
    }

    async fn create_stack(
        &self,
        stack_name: &str,
        template: &Template,
        params: &StackParameters,
    ) -> Result<String> {
        warn_unsupported(params);
        info!("Creating deployment {stack_name}");

        let body = DeploymentRequest {
            name: stack_name,
            fingerprint: None,
            description: None,
            target: Some(TargetConfiguration {
                config: ConfigFile {
                    content: template.body(),
                },
            }),
        };
        let request = self.client.post(self.deployments_url()).json(&body);
        let operation: Operation = self.send("deployments.insert", request).await?;

        Ok(operation.target_id.unwrap_or_else(|| stack_name.to_string()))
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<()> {
        info!("Deleting deployment {stack_name}");
        let request = self.client.delete(self.deployment_url(stack_name));
        let _: Operation = self.send("deployments.delete", request).await?;
        Ok(())
    }

    async fn wait_until_stack_stable(&self, stack_name: &str, targets: &[StackStatus]) -> Result<()> {
        wait::stack_stable(self, &self.poller, stack_name, targets).await
    }

    async fn wait_until_change_set_ready(&self, change_set_id: &str) -> Result<()> {
        wait::change_set_ready(self, &self.poller, change_set_id).await
    }

    fn backend_type(&self) -> &'static str {
        "deployment-manager"
    }
}

fn connect_error(message: impl Into<String>) -> KilnError {
    BackendError::Connect {
        backend: String::from("deployment-manager"),
        message: message.into(),
    }
    .into()
}

/// Extracts the service message from an error response, else the raw body.
fn api_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body.to_string(),
    }
}

fn warn_unsupported(params: &StackParameters) {
    if !params.values.is_empty() || !params.capabilities.is_empty() {
        warn!("Parameters and capabilities are not used by the deployment-manager backend");
    }
}

/// Checks that a configuration is YAML with a `resources` list.
fn check_config(body: &str) -> Result<()> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(body).map_err(|e| BackendError::validation(format!("Invalid configuration: {e}")))?;

    match value.get("resources") {
        Some(serde_yaml::Value::Sequence(_)) => Ok(()),
        Some(_) => Err(BackendError::validation("Invalid configuration: 'resources' must be a list").into()),
        None => Err(BackendError::validation("Invalid configuration: missing 'resources'").into()),
    }
}

fn change_set_id(deployment: &str, name: &str) -> String {
    format!("{deployment}/{name}")
}

fn split_change_set_id(id: &str) -> (&str, &str) {
    id.split_once('/').unwrap_or((id, id))
}

fn operation_errors(operation: &Operation) -> Option<String> {
    let messages: Vec<&str> = operation
        .error
        .as_ref()?
        .errors
        .iter()
        .filter_map(|e| e.message.as_deref())
        .collect();
    (!messages.is_empty()).then(|| messages.join("; "))
}

/// Maps the preview operation to a change-set computation status.
fn preview_status(operation: Option<&Operation>) -> ChangeSetStatus {
    let Some(operation) = operation else {
        return ChangeSetStatus::Pending;
    };
    if operation.status.as_deref() != Some("DONE") {
        return ChangeSetStatus::Pending;
    }
    match operation_errors(operation) {
        Some(reason) => ChangeSetStatus::Failed(reason),
        None => ChangeSetStatus::Ready,
    }
}

/// Maps the latest deployment operation to a stack status, the raw
/// `<TYPE>_<STATUS>` string and the error text.
fn deployment_status(operation: Option<&Operation>) -> (StackStatus, String, Option<String>) {
    let Some(operation) = operation else {
        return (StackStatus::Available, String::from("DONE"), None);
    };

    let op_type = operation.operation_type.as_deref().unwrap_or("update");
    let done = operation.status.as_deref() == Some("DONE");
    let errors = operation_errors(operation);

    let status = match (op_type, done, errors.is_some()) {
        ("insert", false, _) => StackStatus::Creating,
        ("delete", false, _) => StackStatus::Deleting,
        ("preview" | "cancelPreview", _, _) => StackStatus::Available,
        (_, false, _) => StackStatus::Updating,
        ("insert", true, true) => StackStatus::CreateFailed,
        ("delete", true, true) => StackStatus::DeleteFailed,
        (_, true, true) => StackStatus::UpdateFailed,
        (_, true, false) => StackStatus::Available,
    };

    let raw_status = if errors.is_some() {
        format!("{}_FAILED", op_type.to_ascii_uppercase())
    } else {
        format!(
            "{}_{}",
            op_type.to_ascii_uppercase(),
            operation.status.as_deref().unwrap_or("PENDING")
        )
    };

    (status, raw_status, errors)
}

/// Turns a previewed resource into a change; resources without a pending
/// update are unchanged.
fn resource_change(resource: Resource) -> Option<Change> {
    let intent = resource.update?.intent.unwrap_or_default();
    let action = match intent.as_str() {
        "CREATE_OR_ACQUIRE" | "CREATE" | "ACQUIRE" => ChangeAction::Add,
        "UPDATE" => ChangeAction::Modify,
        "DELETE" | "ABANDON" => ChangeAction::Remove,
        _ => ChangeAction::Other(intent),
    };

    Some(Change {
        action,
        logical_id: resource.name,
        physical_id: resource.id,
        resource_type: resource.resource_type.unwrap_or_default(),
        replacement: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEPLOYMENTS: &str = "/projects/infra-prod/global/deployments";

    fn gateway(server: &MockServer) -> DeploymentManagerGateway {
        DeploymentManagerGateway::new(server.uri(), "infra-prod", "token-1", Poller::new(Duration::ZERO))
            .expect("client")
    }

    fn done(op_type: &str) -> serde_json::Value {
        json!({ "operationType": op_type, "status": "DONE" })
    }

    #[tokio::test]
    async fn test_missing_deployment_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DEPLOYMENTS}/web")))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "message": "The object 'projects/infra-prod/global/deployments/web' is not found." }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let stack = gateway(&server).describe_stack("web").await.expect("describe failed");
        assert!(stack.is_none());
    }

    #[tokio::test]
    async fn test_describe_deployment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DEPLOYMENTS}/web")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "web",
                "id": "4711",
                "fingerprint": "abc=",
                "insertTime": "2024-03-01T10:00:00.000-08:00",
                "operation": { "operationType": "update", "status": "RUNNING" }
            })))
            .mount(&server)
            .await;

        let stack = gateway(&server)
            .describe_stack("web")
            .await
            .expect("describe failed")
            .expect("deployment exists");

        assert_eq!(stack.id.as_deref(), Some("4711"));
        assert_eq!(stack.status, StackStatus::Updating);
        assert_eq!(stack.raw_status, "UPDATE_RUNNING");
        assert!(stack.created_at.is_some());
    }

    #[tokio::test]
    async fn test_service_error_message_is_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEPLOYMENTS))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": { "code": 409, "message": "The resource 'projects/infra-prod/global/deployments/web' already exists" }
            })))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .create_stack("web", &Template::inline("resources: []"), &StackParameters::default())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "The resource 'projects/infra-prod/global/deployments/web' already exists"
        );
    }

    #[tokio::test]
    async fn test_create_sends_config_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEPLOYMENTS))
            .and(body_partial_json(json!({
                "name": "web",
                "target": { "config": { "content": "resources: []" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "operationType": "insert", "status": "PENDING", "targetId": "4711"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = gateway(&server)
            .create_stack("web", &Template::inline("resources: []"), &StackParameters::default())
            .await
            .expect("create failed");
        assert_eq!(id, "4711");
    }

    #[tokio::test]
    async fn test_preview_then_describe_changes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DEPLOYMENTS}/web")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "web", "id": "4711", "fingerprint": "abc=", "operation": done("preview")
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("{DEPLOYMENTS}/web")))
            .and(query_param("preview", "true"))
            .and(body_partial_json(json!({ "name": "web", "fingerprint": "abc=" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "operationType": "preview", "status": "PENDING"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{DEPLOYMENTS}/web/resources")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resources": [
                    { "name": "bucket", "type": "storage.v1.bucket", "update": { "intent": "CREATE_OR_ACQUIRE" } },
                    { "name": "vm", "type": "compute.v1.instance", "id": "99", "update": { "intent": "UPDATE" } },
                    { "name": "network", "type": "compute.v1.network", "id": "98" }
                ]
            })))
            .mount(&server)
            .await;

        let gateway = gateway(&server);
        let created = gateway
            .create_change_set("web", &Template::inline("resources: []"), &StackParameters::default())
            .await
            .expect("preview failed");
        assert!(created.id.starts_with("web/kiln-"));

        gateway
            .wait_until_change_set_ready(&created.id)
            .await
            .expect("preview not ready");
        let change_set = gateway.describe_change_set(&created.id).await.expect("describe failed");

        assert_eq!(change_set.name, created.name);
        assert_eq!(change_set.change_count(), 2);
        assert_eq!(change_set.count_action(&ChangeAction::Add), 1);
        assert_eq!(change_set.count_action(&ChangeAction::Modify), 1);
    }

    #[tokio::test]
    async fn test_failed_preview_ends_the_wait() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DEPLOYMENTS}/web")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "web",
                "operation": {
                    "operationType": "preview",
                    "status": "DONE",
                    "error": { "errors": [ { "code": "RESOURCE_ERROR", "message": "Invalid value for field 'zone'" } ] }
                }
            })))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .wait_until_change_set_ready("web/kiln-1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid value for field 'zone'"));
    }

    #[tokio::test]
    async fn test_execute_applies_preview_without_target() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DEPLOYMENTS}/web")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "web", "fingerprint": "def=", "operation": done("preview")
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("{DEPLOYMENTS}/web")))
            .and(query_param("preview", "false"))
            .and(body_partial_json(json!({ "name": "web", "fingerprint": "def=" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "operationType": "update", "status": "PENDING"
            })))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server)
            .execute_change_set("web/kiln-1")
            .await
            .expect("execute failed");
    }

    #[tokio::test]
    async fn test_delete_waits_until_gone() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("{DEPLOYMENTS}/web")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "operationType": "delete", "status": "PENDING"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{DEPLOYMENTS}/web")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "web", "operation": { "operationType": "delete", "status": "RUNNING" }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{DEPLOYMENTS}/web")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gateway = gateway(&server);
        gateway.delete_stack("web").await.expect("delete failed");
        gateway
            .wait_until_stack_stable("web", &[StackStatus::Absent])
            .await
            .expect("wait failed");
    }

    #[test]
    fn test_check_config() {
        assert!(check_config("resources:\n- name: vm\n  type: compute.v1.instance\n").is_ok());

        let err = check_config("imports: []").unwrap_err();
        assert_eq!(err.to_string(), "Invalid configuration: missing 'resources'");
        assert!(check_config("resources: [").is_err());
    }

    #[test]
    fn test_deployment_status_mapping() {
        let op = |t: &str, s: &str| Operation {
            operation_type: Some(t.to_string()),
            status: Some(s.to_string()),
            target_id: None,
            error: None,
        };
        assert_eq!(deployment_status(Some(&op("insert", "RUNNING"))).0, StackStatus::Creating);
        assert_eq!(deployment_status(Some(&op("insert", "DONE"))).0, StackStatus::Available);
        assert_eq!(deployment_status(Some(&op("delete", "PENDING"))).0, StackStatus::Deleting);
        assert_eq!(deployment_status(Some(&op("preview", "RUNNING"))).0, StackStatus::Available);

        let mut failed = op("update", "DONE");
        failed.error = Some(OperationError {
            errors: vec![OperationErrorEntry {
                message: Some(String::from("Quota exceeded")),
            }],
        });
        let (status, raw, reason) = deployment_status(Some(&failed));
        assert_eq!(status, StackStatus::UpdateFailed);
        assert_eq!(raw, "UPDATE_FAILED");
        assert_eq!(reason.as_deref(), Some("Quota exceeded"));
    }

    #[test]
    fn test_api_message() {
        assert_eq!(
            api_message(StatusCode::FORBIDDEN, r#"{"error":{"code":403,"message":"Permission denied"}}"#),
            "Permission denied"
        );
        assert_eq!(api_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
        assert_eq!(api_message(StatusCode::BAD_GATEWAY, ""), "502 Bad Gateway");
    }

    #[test]
    fn test_change_set_id_round_trip() {
        assert_eq!(split_change_set_id(&change_set_id("web", "kiln-1")), ("web", "kiln-1"));
    }
}
