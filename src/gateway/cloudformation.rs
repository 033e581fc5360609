//! AWS CloudFormation backend.
//!
//! Implements [`ProviderGateway`] on top of `aws-sdk-cloudformation`. Error
//! messages returned by the service are carried through unchanged.

use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::types::{
    Capability, ChangeSetStatus as CfnChangeSetStatus, ChangeSetType, Parameter,
};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{Configuration, Template, TemplateHasher};
use crate::error::{BackendError, KilnError, Result};
use crate::poller::Poller;

use super::provider::ProviderGateway;
use super::types::{
    Change, ChangeAction, ChangeSet, ChangeSetStatus, Stack, StackOutput, StackParameters,
    StackStatus,
};
use super::wait;

/// Largest template body the service accepts inline.
pub const MAX_INLINE_TEMPLATE_BYTES: usize = 51_200;

/// Key prefix for uploaded templates.
const TEMPLATE_KEY_PREFIX: &str = "kiln";

/// Status reasons of a change set that failed only because it was empty.
const NO_CHANGES_REASONS: [&str; 2] = ["didn't contain changes", "No updates are to be performed"];

/// Where the service reads a template from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePlacement {
    /// Template body sent with the request.
    Inline(String),
    /// Template uploaded to a bucket and referenced by URL.
    Uploaded {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// URL passed to the service.
        url: String,
    },
}

impl TemplatePlacement {
    /// Decides how a template is sent to the service.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the template is too large to send
    /// inline and no upload bucket is configured.
    pub fn for_template(
        template: &Template,
        bucket: Option<&str>,
        hasher: &TemplateHasher,
    ) -> Result<Self> {
        if template.size() <= MAX_INLINE_TEMPLATE_BYTES {
            return Ok(Self::Inline(template.body().to_string()));
        }

        let Some(bucket) = bucket else {
            return Err(BackendError::validation(format!(
                "template is {} bytes, larger than the {MAX_INLINE_TEMPLATE_BYTES} byte inline limit; \
                 set main.template_bucket to upload it",
                template.size()
            ))
            .into());
        };

        let key = format!("{TEMPLATE_KEY_PREFIX}/{}.template", hasher.hash_template(template));
        let url = format!("https://{bucket}.s3.amazonaws.com/{key}");
        Ok(Self::Uploaded {
            bucket: bucket.to_string(),
            key,
            url,
        })
    }

    fn body(&self) -> Option<String> {
        match self {
            Self::Inline(body) => Some(body.clone()),
            Self::Uploaded { .. } => None,
        }
    }

    fn url(&self) -> Option<String> {
        match self {
            Self::Inline(_) => None,
            Self::Uploaded { url, .. } => Some(url.clone()),
        }
    }
}

/// CloudFormation implementation of the provider gateway.
#[derive(Debug)]
pub struct CloudFormationGateway {
    /// CloudFormation client.
    client: Client,
    /// S3 client for oversized templates.
    s3: aws_sdk_s3::Client,
    /// Bucket for oversized templates.
    template_bucket: Option<String>,
    /// Poller backing the wait primitives.
    poller: Poller,
    /// Hasher for change-set names and upload keys.
    hasher: TemplateHasher,
    /// Templates already uploaded by this gateway.
    uploads: UploadLedger,
}

impl CloudFormationGateway {
    /// Creates a gateway using the region and credentials profile of `config`.
    ///
    /// Credentials come from the standard AWS provider chain.
    pub async fn from_config(config: &Configuration, poller: Poller) -> Self {
        let mut loader = aws_config::from_env();
        if let Some(region) = &config.main.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(profile) = &config.main.profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;

        Self {
            client: Client::new(&sdk_config),
            s3: aws_sdk_s3::Client::new(&sdk_config),
            template_bucket: config.main.template_bucket.clone(),
            poller,
            hasher: TemplateHasher::new(),
            uploads: UploadLedger::default(),
        }
    }

    /// Places a template, uploading it first if it is too large to inline.
    ///
    /// A given template body is uploaded at most once per gateway; validation
    /// and the following mutation share the object.
    async fn stage_template(&self, template: &Template) -> Result<TemplatePlacement> {
        let placement =
            TemplatePlacement::for_template(template, self.template_bucket.as_deref(), &self.hasher)?;

        if let TemplatePlacement::Uploaded { bucket, key, .. } = &placement {
            self.uploads
                .upload_once(key, || async {
                    debug!("Uploading template to s3://{bucket}/{key}");
                    self.s3
                        .put_object()
                        .bucket(bucket)
                        .key(key)
                        .body(template.body().as_bytes().to_vec().into())
                        .send()
                        .await
                        .map_err(|e| api_error("PutObject", &e))?;
                    Ok(())
                })
                .await?;
        }

        Ok(placement)
    }
}

/// Object keys uploaded during this invocation.
#[derive(Debug, Default)]
struct UploadLedger {
    keys: Mutex<HashSet<String>>,
}

impl UploadLedger {
    /// Runs `upload` unless `key` was already uploaded successfully.
    async fn upload_once<F, Fut>(&self, key: &str, upload: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut keys = self.keys.lock().await;
        if keys.contains(key) {
            debug!("Template {key} already uploaded");
            return Ok(());
        }

        upload().await?;
        keys.insert(key.to_string());
        Ok(())
    }
}

#[async_trait]
impl ProviderGateway for CloudFormationGateway {
    async fn validate_template(&self, template: &Template) -> Result<()> {
        let placement = self.stage_template(template).await?;
        debug!("Validating template ({} bytes)", template.size());

        self.client
            .validate_template()
            .set_template_body(placement.body())
            .set_template_url(placement.url())
            .send()
            .await
            .map_err(|e| validation_error(&e))?;

        Ok(())
    }

    async fn create_change_set(
        &self,
        stack_name: &str,
        template: &Template,
        params: &StackParameters,
    ) -> Result<ChangeSet> {
        let placement = self.stage_template(template).await?;
        let name = self.hasher.change_set_name(template, Utc::now());
        info!("Creating change set {name} for stack {stack_name}");

        let output = self
            .client
            .create_change_set()
            .stack_name(stack_name)
            .change_set_name(&name)
            .change_set_type(ChangeSetType::Update)
            .set_template_body(placement.body())
            .set_template_url(placement.url())
            .set_parameters(Some(parameters(params)))
            .set_capabilities(Some(capabilities(params)))
            .client_token(Uuid::new_v4().to_string())
            .description(change_set_description())
            .send()
            .await
            .map_err(|e| api_error("CreateChangeSet", &e))?;

        let id = output.id().ok_or_else(|| {
            BackendError::invalid_response("CreateChangeSet", "response has no change set id")
        })?;
        let stack_id = output.stack_id().unwrap_or_default();

        Ok(ChangeSet::pending(id, name, stack_id, stack_name))
    }

    async fn describe_change_set(&self, change_set_id: &str) -> Result<ChangeSet> {
        let mut next_token: Option<String> = None;
        let mut changes = Vec::new();

        loop {
            let output = self
                .client
                .describe_change_set()
                .change_set_name(change_set_id)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| api_error("DescribeChangeSet", &e))?;

            changes.extend(
                output
                    .changes()
                    .iter()
                    .filter_map(|c| c.resource_change())
                    .map(|rc| Change {
                        action: ChangeAction::parse(rc.action().map_or("", |a| a.as_str())),
                        logical_id: rc.logical_resource_id().unwrap_or_default().to_string(),
                        physical_id: rc.physical_resource_id().map(str::to_string),
                        resource_type: rc.resource_type().unwrap_or_default().to_string(),
                        replacement: rc.replacement().map(|r| r.as_str().to_string()),
                    }),
            );

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                let status = change_set_status(
                    output.status().field().map(CfnChangeSetStatus::as_str),
                    output.status_reason(),
                );
                let mut change_set = ChangeSet::pending(
                    output.change_set_id().unwrap_or(change_set_id),
                    output.change_set_name().unwrap_or_default(),
                    output.stack_id().unwrap_or_default(),
                    output.stack_name().unwrap_or_default(),
                );
                change_set.status = status;
                change_set.changes = changes;
                return Ok(change_set);
            }
        }
    }

    async fn execute_change_set(&self, change_set_id: &str) -> Result<()> {
        info!("Executing change set {change_set_id}");
        self.client
            .execute_change_set()
            .change_set_name(change_set_id)
            .client_request_token(Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| api_error("ExecuteChangeSet", &e))?;
        Ok(())
    }

    async fn describe_stack(&self, stack_name: &str) -> Result<Option<Stack>> {
        let output = match self.client.describe_stacks().stack_name(stack_name).send().await {
            Ok(output) => output,
            Err(e) if is_missing_stack(&e) => {
                debug!("Stack {stack_name} does not exist");
                return Ok(None);
            }
            Err(e) => return Err(api_error("DescribeStacks", &e)),
        };

        let Some(stack) = output.stacks().first() else {
            return Ok(None);
        };

        let raw_status = stack
            .stack_status()
            .field()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();

        Ok(Some(Stack {
            name: stack_name.to_string(),
            id: stack.stack_id().map(str::to_string),
            status: stack_status(&raw_status),
            status_reason: stack.stack_status_reason().map(str::to_string),
            created_at: stack
                .creation_time()
                .field()
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
            outputs: stack
                .outputs()
                .iter()
                .map(|o| StackOutput {
                    key: o.output_key().unwrap_or_default().to_string(),
                    value: o.output_value().unwrap_or_default().to_string(),
                    description: o.description().map(str::to_string),
                })
                .collect(),
            raw_status,
        }))
    }

    async fn create_stack(
        &self,
        stack_name: &str,
        template: &Template,
        params: &StackParameters,
    ) -> Result<String> {
        let placement = self.stage_template(template).await?;
        info!("Creating stack {stack_name}");

        let output = self
            .client
            .create_stack()
            .stack_name(stack_name)
            .set_template_body(placement.body())
            .set_template_url(placement.url())
            .set_parameters(Some(parameters(params)))
            .set_capabilities(Some(capabilities(params)))
            .client_request_token(Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| api_error("CreateStack", &e))?;

        output
            .stack_id()
            .map(str::to_string)
            .ok_or_else(|| BackendError::invalid_response("CreateStack", "response has no stack id").into())
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<()> {
        info!("Deleting stack {stack_name}");
        self.client
            .delete_stack()
            .stack_name(stack_name)
            .client_request_token(Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(|e| api_error("DeleteStack", &e))?;
        Ok(())
    }

    async fn wait_until_stack_stable(&self, stack_name: &str, targets: &[StackStatus]) -> Result<()> {
        wait::stack_stable(self, &self.poller, stack_name, targets).await
    }

    async fn wait_until_change_set_ready(&self, change_set_id: &str) -> Result<()> {
        wait::change_set_ready(self, &self.poller, change_set_id).await
    }

    fn backend_type(&self) -> &'static str {
        "cloudformation"
    }
}

/// Normalises SDK getters that return either `&T` or `Option<&T>`.
trait Field<'a, T: ?Sized> {
    fn field(self) -> Option<&'a T>;
}

impl<'a, T: ?Sized> Field<'a, T> for &'a T {
    fn field(self) -> Option<&'a T> {
        Some(self)
    }
}

impl<'a, T: ?Sized> Field<'a, T> for Option<&'a T> {
    fn field(self) -> Option<&'a T> {
        self
    }
}

fn service_message<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    err.message()
        .map_or_else(|| DisplayErrorContext(err).to_string(), str::to_string)
}

fn api_error<E, R>(operation: &'static str, err: &SdkError<E, R>) -> KilnError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    BackendError::api(operation, service_message(err)).into()
}

fn validation_error<E, R>(err: &SdkError<E, R>) -> KilnError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    BackendError::validation(service_message(err)).into()
}

/// True for the error `DescribeStacks` returns for an unknown stack name.
fn is_missing_stack<E: ProvideErrorMetadata>(err: &E) -> bool {
    err.code() == Some("ValidationError")
        && err.message().is_some_and(|m| m.contains("does not exist"))
}

fn parameters(params: &StackParameters) -> Vec<Parameter> {
    params
        .values
        .iter()
        .map(|(key, value)| {
            Parameter::builder()
                .parameter_key(key)
                .parameter_value(value)
                .build()
        })
        .collect()
}

fn capabilities(params: &StackParameters) -> Vec<Capability> {
    params
        .capabilities
        .iter()
        .map(|c| Capability::from(c.as_str()))
        .collect()
}

fn change_set_description() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from("unknown host"));
    format!("Created by kiln on {host}")
}

/// Maps a CloudFormation change-set status to a computation status.
fn change_set_status(status: Option<&str>, reason: Option<&str>) -> ChangeSetStatus {
    let reason = reason.unwrap_or_default();
    match status {
        Some("CREATE_COMPLETE") => ChangeSetStatus::Ready,
        Some("FAILED") if NO_CHANGES_REASONS.iter().any(|r| reason.contains(r)) => {
            ChangeSetStatus::Ready
        }
        Some(
            "FAILED" | "DELETE_PENDING" | "DELETE_COMPLETE" | "DELETE_FAILED" | "DELETE_IN_PROGRESS",
        ) => {
            ChangeSetStatus::Failed(reason.to_string())
        }
        _ => ChangeSetStatus::Pending,
    }
}

/// Maps a CloudFormation stack status to a normalised status.
fn stack_status(raw: &str) -> StackStatus {
    match raw {
        "CREATE_IN_PROGRESS" | "REVIEW_IN_PROGRESS" => StackStatus::Creating,
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "IMPORT_COMPLETE" => StackStatus::Available,
        "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"
        | "UPDATE_ROLLBACK_IN_PROGRESS"
        | "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
        | "IMPORT_ROLLBACK_IN_PROGRESS" => StackStatus::UpdatingInProgress,
        "UPDATE_FAILED"
        | "UPDATE_ROLLBACK_FAILED"
        | "UPDATE_ROLLBACK_COMPLETE"
        | "IMPORT_ROLLBACK_COMPLETE"
        | "IMPORT_ROLLBACK_FAILED" => StackStatus::UpdateFailed,
        "CREATE_FAILED" | "ROLLBACK_IN_PROGRESS" | "ROLLBACK_COMPLETE" | "ROLLBACK_FAILED" => {
            StackStatus::CreateFailed
        }
        "DELETE_IN_PROGRESS" => StackStatus::Deleting,
        "DELETE_FAILED" => StackStatus::DeleteFailed,
        "DELETE_COMPLETE" => StackStatus::Absent,
        _ => StackStatus::Updating,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudformation::error::ErrorMetadata;
    use aws_sdk_cloudformation::operation::describe_stacks::DescribeStacksError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_small_template_is_inline() {
        let template = Template::inline("Resources: {}");
        let placement =
            TemplatePlacement::for_template(&template, None, &TemplateHasher::new()).expect("placement");
        assert_eq!(placement, TemplatePlacement::Inline(String::from("Resources: {}")));
        assert!(placement.url().is_none());
    }

    #[test]
    fn test_large_template_needs_bucket() {
        let template = Template::inline("x".repeat(MAX_INLINE_TEMPLATE_BYTES + 1));
        let err = TemplatePlacement::for_template(&template, None, &TemplateHasher::new()).unwrap_err();
        assert!(err.to_string().contains("template_bucket"));
    }

    #[test]
    fn test_large_template_is_uploaded() {
        let template = Template::inline("x".repeat(MAX_INLINE_TEMPLATE_BYTES + 1));
        let hasher = TemplateHasher::new();
        let placement =
            TemplatePlacement::for_template(&template, Some("infra-templates"), &hasher).expect("placement");

        let expected_key = format!("kiln/{}.template", hasher.hash_template(&template));
        match &placement {
            TemplatePlacement::Uploaded { bucket, key, url } => {
                assert_eq!(bucket, "infra-templates");
                assert_eq!(key, &expected_key);
                assert_eq!(url, &format!("https://infra-templates.s3.amazonaws.com/{expected_key}"));
            }
            TemplatePlacement::Inline(_) => panic!("expected upload"),
        }
        assert!(placement.body().is_none());
    }

    #[test]
    fn test_change_set_status_mapping() {
        assert_eq!(change_set_status(Some("CREATE_PENDING"), None), ChangeSetStatus::Pending);
        assert_eq!(change_set_status(Some("CREATE_IN_PROGRESS"), None), ChangeSetStatus::Pending);
        assert_eq!(change_set_status(Some("CREATE_COMPLETE"), None), ChangeSetStatus::Ready);
        assert_eq!(
            change_set_status(
                Some("FAILED"),
                Some("The submitted information didn't contain changes. Submit different information to create a change set.")
            ),
            ChangeSetStatus::Ready
        );
        assert_eq!(
            change_set_status(Some("FAILED"), Some("Template format error")),
            ChangeSetStatus::Failed(String::from("Template format error"))
        );
    }

    #[test]
    fn test_deleted_change_set_is_failed() {
        for status in ["DELETE_PENDING", "DELETE_IN_PROGRESS", "DELETE_COMPLETE", "DELETE_FAILED"] {
            assert_eq!(
                change_set_status(Some(status), Some("deleted by another user")),
                ChangeSetStatus::Failed(String::from("deleted by another user")),
                "{status}"
            );
        }
    }

    #[test]
    fn test_missing_stack_detection() {
        let missing = DescribeStacksError::generic(
            ErrorMetadata::builder()
                .code("ValidationError")
                .message("Stack with id MyStack does not exist")
                .build(),
        );
        assert!(is_missing_stack(&missing));

        let throttled = DescribeStacksError::generic(
            ErrorMetadata::builder()
                .code("Throttling")
                .message("Rate exceeded")
                .build(),
        );
        assert!(!is_missing_stack(&throttled));

        let other_validation = DescribeStacksError::generic(
            ErrorMetadata::builder()
                .code("ValidationError")
                .message("1 validation error detected")
                .build(),
        );
        assert!(!is_missing_stack(&other_validation));
    }

    #[tokio::test]
    async fn test_template_uploaded_once() {
        let ledger = UploadLedger::default();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            ledger
                .upload_once("kiln/abc.template", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .expect("upload failed");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_upload_is_retried_on_next_use() {
        let ledger = UploadLedger::default();
        let calls = AtomicUsize::new(0);

        let first = ledger
            .upload_once("kiln/abc.template", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::api("PutObject", "Access Denied").into())
            })
            .await;
        assert_eq!(first.unwrap_err().to_string(), "Access Denied");

        ledger
            .upload_once("kiln/abc.template", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .expect("upload failed");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stack_status_mapping() {
        assert_eq!(stack_status("CREATE_COMPLETE"), StackStatus::Available);
        assert_eq!(stack_status("UPDATE_COMPLETE"), StackStatus::Available);
        assert_eq!(stack_status("UPDATE_IN_PROGRESS"), StackStatus::Updating);
        assert_eq!(
            stack_status("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"),
            StackStatus::UpdatingInProgress
        );
        assert_eq!(stack_status("UPDATE_ROLLBACK_COMPLETE"), StackStatus::UpdateFailed);
        assert_eq!(stack_status("ROLLBACK_COMPLETE"), StackStatus::CreateFailed);
        assert_eq!(stack_status("DELETE_IN_PROGRESS"), StackStatus::Deleting);
        assert_eq!(stack_status("DELETE_FAILED"), StackStatus::DeleteFailed);
        assert_eq!(stack_status("DELETE_COMPLETE"), StackStatus::Absent);
    }
}
