// Copyright 2024, The Tremor Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The three provider services the delivery client talks to.
//!
//! The traits are implemented for the AWS SDK clients in [`aws`]. Hosts and tests
//! can hand in their own implementations via [`Clients`].

use crate::errors::ApiError;
use std::{future::Future, time::Duration};

/// AWS SDK implementations
pub mod aws;

/// Status of a delivery stream as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// being created, not yet accepting records
    Creating,
    /// accepting records
    Active,
    /// being deleted
    Deleting,
    /// creation or deletion failed
    Failed,
    /// any status this client does not know about
    Other(String),
}

impl StreamStatus {
    /// maps the provider status string
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status {
            "CREATING" => Self::Creating,
            "ACTIVE" => Self::Active,
            "DELETING" => Self::Deleting,
            "CREATING_FAILED" | "DELETING_FAILED" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Description of an existing delivery stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescription {
    /// stream name
    pub name: String,
    /// current status
    pub status: StreamStatus,
}

/// Everything needed to create a delivery stream with an S3 destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationDefinition {
    /// delivery stream name
    pub stream_name: String,
    /// ARN of the role firehose assumes to write into the bucket
    pub role_arn: String,
    /// ARN of the destination bucket
    pub bucket_arn: String,
    /// buffer size hint in MB
    pub buffer_size_mb: i32,
    /// buffer interval hint in seconds
    pub buffer_interval_sec: i32,
    /// KMS key ARN used to encrypt delivered objects
    pub kms_key_arn: Option<String>,
}

/// Outcome of a role creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleCreation {
    /// the role was created by this call
    Created,
    /// a role with this name already existed
    AlreadyExisted,
}

/// Provider acknowledgement of a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReceipt {
    /// record id assigned by the provider
    pub record_id: String,
    /// whether server side encryption was applied
    pub encrypted: bool,
}

/// Object storage
#[async_trait::async_trait]
pub trait StorageApi: Send + Sync {
    /// checks if `bucket` exists and is accessible
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ApiError>;
}

/// Identity and access management
#[async_trait::async_trait]
pub trait RoleApi: Send + Sync {
    /// Creates a role with the given trust policy.
    ///
    /// An existing role with the same name is not an error.
    async fn create_role(&self, role: &str, trust_policy: &str) -> Result<RoleCreation, ApiError>;

    /// attaches (or replaces) an inline policy on `role`
    async fn put_role_policy(
        &self,
        role: &str,
        policy_name: &str,
        policy: &str,
    ) -> Result<(), ApiError>;
}

/// Stream ingestion
#[async_trait::async_trait]
pub trait StreamApi: Send + Sync {
    /// Describes the delivery stream `name`, `None` if it does not exist.
    async fn describe_stream(&self, name: &str) -> Result<Option<StreamDescription>, ApiError>;

    /// creates a direct put delivery stream
    async fn create_stream(&self, definition: &DestinationDefinition) -> Result<(), ApiError>;

    /// puts a single record into the delivery stream
    async fn put_record(&self, stream: &str, data: Vec<u8>) -> Result<RecordReceipt, ApiError>;
}

/// The service clients of one invocation
pub struct Clients {
    /// object storage
    pub storage: Box<dyn StorageApi>,
    /// identity and access management
    pub roles: Box<dyn RoleApi>,
    /// stream ingestion
    pub streams: Box<dyn StreamApi>,
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients").finish_non_exhaustive()
    }
}

/// Bounds a single provider call by `timeout`.
pub(crate) async fn timed<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| Err(ApiError::timeout(operation, timeout)))
}
