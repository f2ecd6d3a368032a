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

use super::{
    Clients, DestinationDefinition, RecordReceipt, RoleApi, RoleCreation, StorageApi, StreamApi,
    StreamDescription, StreamStatus,
};
use crate::{
    auth,
    config::Config,
    errors::{ApiError, ApiErrorKind},
};
use aws_sdk_firehose::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::Blob,
    types::{
        BufferingHints, CompressionFormat, DeliveryStreamType, EncryptionConfiguration,
        ExtendedS3DestinationConfiguration, KmsEncryptionConfig, Record,
    },
    Client as FirehoseClient,
};
use aws_sdk_iam::Client as IamClient;
use aws_sdk_s3::Client as S3Client;
use log::debug;

impl Clients {
    /// Builds the AWS clients for `config`, each in its configured region.
    pub async fn from_config(config: &Config) -> Self {
        let s3_config = auth::make_config(config, config.storage_region()).await;
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&s3_config);
        if config.behaviour().endpoint_url.is_some() {
            // S3 compatible endpoints like localstack don't do virtual host style
            s3_builder = s3_builder.force_path_style(true);
        }
        let iam_config = auth::make_config(config, config.role_region()).await;
        let firehose_config = auth::make_config(config, config.stream_region()).await;

        Self {
            storage: Box::new(S3Client::from_conf(s3_builder.build())),
            roles: Box::new(IamClient::new(&iam_config)),
            streams: Box::new(FirehoseClient::new(&firehose_config)),
        }
    }
}

/// error codes signalling throttling, across S3, IAM and firehose
const THROTTLED: [&str; 5] = [
    "Throttling",
    "ThrottlingException",
    "SlowDown",
    "RequestLimitExceeded",
    "TooManyRequestsException",
];

/// Maps an SDK error onto the provider neutral classification.
///
/// Transport level failures (timeouts, dispatch failures, unparseable responses)
/// count as `Unavailable`, service errors are classified by their error code.
fn classify<E, R>(operation: &'static str, e: &SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let kind = match e {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ApiErrorKind::Unavailable
        }
        SdkError::ServiceError(service_error) => match service_error.err().code() {
            Some(code) if THROTTLED.contains(&code) => ApiErrorKind::Throttled,
            Some(
                "ServiceUnavailableException"
                | "ServiceUnavailable"
                | "ServiceFailure"
                | "InternalFailure"
                | "InternalError",
            ) => ApiErrorKind::Unavailable,
            Some("ResourceNotFoundException" | "NoSuchEntity" | "NotFound" | "NoSuchBucket") => {
                ApiErrorKind::NotFound
            }
            Some("EntityAlreadyExists") => ApiErrorKind::AlreadyExists,
            Some("ResourceInUseException" | "ConcurrentModification") => ApiErrorKind::InUse,
            Some(
                "InvalidArgumentException"
                | "InvalidKMSResourceException"
                | "InvalidSourceException"
                | "MalformedPolicyDocument"
                | "InvalidInput"
                | "ValidationError"
                | "LimitExceeded"
                | "LimitExceededException",
            ) => ApiErrorKind::InvalidArgument,
            _ => ApiErrorKind::Other,
        },
        _ => ApiErrorKind::Other,
    };
    ApiError::new(kind, operation, &DisplayErrorContext(e))
}

/// A missing bucket is an answer, not a failure.
fn missing_bucket(e: ApiError) -> Result<bool, ApiError> {
    if e.kind == ApiErrorKind::NotFound {
        Ok(false)
    } else {
        Err(e)
    }
}

/// A role of the same name counts as created.
fn existing_role(role: &str, e: ApiError) -> Result<RoleCreation, ApiError> {
    if e.kind == ApiErrorKind::AlreadyExists {
        debug!("Role {role} already exists");
        Ok(RoleCreation::AlreadyExisted)
    } else {
        Err(e)
    }
}

/// A missing stream is described as `None`.
fn missing_stream(e: ApiError) -> Result<Option<StreamDescription>, ApiError> {
    if e.kind == ApiErrorKind::NotFound {
        Ok(None)
    } else {
        Err(e)
    }
}

#[async_trait::async_trait]
impl StorageApi for S3Client {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, ApiError> {
        match self.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => missing_bucket(classify("HeadBucket", &e)),
        }
    }
}

#[async_trait::async_trait]
impl RoleApi for IamClient {
    async fn create_role(&self, role: &str, trust_policy: &str) -> Result<RoleCreation, ApiError> {
        let res = self
            .create_role()
            .role_name(role)
            .assume_role_policy_document(trust_policy)
            .send()
            .await;
        match res {
            Ok(_) => Ok(RoleCreation::Created),
            Err(e) => existing_role(role, classify("CreateRole", &e)),
        }
    }

    async fn put_role_policy(
        &self,
        role: &str,
        policy_name: &str,
        policy: &str,
    ) -> Result<(), ApiError> {
        self.put_role_policy()
            .role_name(role)
            .policy_name(policy_name)
            .policy_document(policy)
            .send()
            .await
            .map_err(|e| classify("PutRolePolicy", &e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StreamApi for FirehoseClient {
    async fn describe_stream(&self, name: &str) -> Result<Option<StreamDescription>, ApiError> {
        match self
            .describe_delivery_stream()
            .delivery_stream_name(name)
            .send()
            .await
        {
            Ok(out) => Ok(out.delivery_stream_description().map(|d| StreamDescription {
                name: d.delivery_stream_name().to_string(),
                status: StreamStatus::from_provider(d.delivery_stream_status().as_str()),
            })),
            Err(e) => missing_stream(classify("DescribeDeliveryStream", &e)),
        }
    }

    async fn create_stream(&self, definition: &DestinationDefinition) -> Result<(), ApiError> {
        const OP: &str = "CreateDeliveryStream";
        let invalid = |e: aws_sdk_firehose::error::BuildError| {
            ApiError::new(ApiErrorKind::InvalidArgument, OP, &e)
        };

        let encryption = definition
            .kms_key_arn
            .as_ref()
            .map(|key_arn| {
                KmsEncryptionConfig::builder()
                    .awskms_key_arn(key_arn)
                    .build()
                    .map(|kms| {
                        EncryptionConfiguration::builder()
                            .kms_encryption_config(kms)
                            .build()
                    })
            })
            .transpose()
            .map_err(invalid)?;
        let destination = ExtendedS3DestinationConfiguration::builder()
            .role_arn(&definition.role_arn)
            .bucket_arn(&definition.bucket_arn)
            .buffering_hints(
                BufferingHints::builder()
                    .size_in_mbs(definition.buffer_size_mb)
                    .interval_in_seconds(definition.buffer_interval_sec)
                    .build(),
            )
            .compression_format(CompressionFormat::Uncompressed)
            .set_encryption_configuration(encryption)
            .build()
            .map_err(invalid)?;

        self.create_delivery_stream()
            .delivery_stream_name(&definition.stream_name)
            .delivery_stream_type(DeliveryStreamType::DirectPut)
            .extended_s3_destination_configuration(destination)
            .send()
            .await
            .map_err(|e| classify(OP, &e))?;
        Ok(())
    }

    async fn put_record(&self, stream: &str, data: Vec<u8>) -> Result<RecordReceipt, ApiError> {
        const OP: &str = "PutRecord";
        let record = Record::builder()
            .data(Blob::new(data))
            .build()
            .map_err(|e| ApiError::new(ApiErrorKind::InvalidArgument, OP, &e))?;
        let out = self
            .put_record()
            .delivery_stream_name(stream)
            .record(record)
            .send()
            .await
            .map_err(|e| classify(OP, &e))?;
        Ok(RecordReceipt {
            record_id: out.record_id().to_string(),
            encrypted: out.encrypted().unwrap_or_default(),
        })
    }
}
