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

//! Connection configuration, built from the flat parameter map handed over by the host.

use crate::errors::Error;
use serde::{de::value::MapDeserializer, Deserialize};
use std::{collections::HashMap, fmt::Display, ops::RangeInclusive, str::FromStr, time::Duration};

/// Region used for IAM when no `role-region` is given. IAM is a global service.
pub const DEFAULT_ROLE_REGION: &str = "us-east-1";

/// Raw parameters, everything is a string and empty strings count as absent.
///
/// The camel case aliases keep older parameter maps working.
#[derive(Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
struct Params {
    #[serde(alias = "awsKey")]
    credential_key: String,
    #[serde(alias = "awsSecret")]
    credential_secret: String,
    #[serde(alias = "s3BucketName")]
    storage_bucket_name: String,
    #[serde(alias = "s3RegionName")]
    storage_region: String,
    #[serde(alias = "accountId")]
    account_id: String,
    #[serde(alias = "deliveryStreamName")]
    stream_name: String,
    #[serde(alias = "firehoseRegion")]
    stream_region: String,
    #[serde(alias = "iamRoleName")]
    role_name: String,
    #[serde(alias = "iamRegion")]
    role_region: String,
    #[serde(alias = "s3DestinationAWSKMSKeyId")]
    encryption_key_id: String,
    #[serde(alias = "s3DestinationSizeInMBs")]
    buffer_size_mb: String,
    #[serde(alias = "s3DestinationIntervalInSeconds")]
    buffer_interval_sec: String,

    auto_provision: String,
    endpoint_url: String,
    max_attempts: String,
    retry_interval_ms: String,
    retry_jitter: String,
    request_timeout_ms: String,
    provision_timeout_sec: String,
    poll_interval_ms: String,
    role_settle_sec: String,
}

impl std::fmt::Debug for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Params")
            .field("stream_name", &self.stream_name)
            .finish_non_exhaustive()
    }
}

/// Static AWS credentials. Neither part is ever printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl Credentials {
    /// constructor
    #[must_use]
    pub fn new(access_key_id: String, secret_access_key: String) -> Self {
        Self {
            access_key_id,
            secret_access_key,
        }
    }
    pub(crate) fn access_key_id(&self) -> &str {
        &self.access_key_id
    }
    pub(crate) fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// S3 destination settings, only used when the delivery stream gets provisioned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Tuning {
    /// KMS key id (or full key ARN) to encrypt delivered objects with
    pub kms_key_id: Option<String>,
    /// buffer size hint in MB
    pub buffer_size_mb: i32,
    /// buffer interval hint in seconds
    pub buffer_interval_sec: i32,
}

impl S3Tuning {
    const SIZE_RANGE: RangeInclusive<i32> = 1..=128;
    const INTERVAL_RANGE: RangeInclusive<i32> = 0..=900;

    fn default_buffer_size_mb() -> i32 {
        5
    }
    fn default_buffer_interval_sec() -> i32 {
        300
    }
}

impl Default for S3Tuning {
    fn default() -> Self {
        Self {
            kms_key_id: None,
            buffer_size_mb: Self::default_buffer_size_mb(),
            buffer_interval_sec: Self::default_buffer_interval_sec(),
        }
    }
}

/// How the client behaves: provisioning, endpoints, retries and timeouts
#[derive(Debug, Clone, PartialEq)]
pub struct Behaviour {
    /// create role and stream when the stream does not exist
    pub auto_provision: bool,
    /// optional endpoint override for all services
    pub endpoint_url: Option<url::Url>,
    /// number of submission attempts, including the first one
    pub max_attempts: u32,
    /// first backoff interval
    pub retry_interval: Duration,
    /// randomize backoff intervals
    pub retry_jitter: bool,
    /// timeout for a single provider call
    pub request_timeout: Duration,
    /// upper bound for waiting on the stream to become active
    pub provision_timeout: Duration,
    /// interval between two readiness checks while waiting
    pub poll_interval: Duration,
    /// time to wait after a role was freshly created
    pub role_settle: Duration,
}

impl Behaviour {
    const MAX_ATTEMPTS_RANGE: RangeInclusive<u32> = 1..=10;
    const RETRY_INTERVAL_MS_RANGE: RangeInclusive<u64> = 0..=30_000;
    const REQUEST_TIMEOUT_MS_RANGE: RangeInclusive<u64> = 1..=300_000;
    const PROVISION_TIMEOUT_SEC_RANGE: RangeInclusive<u64> = 1..=3_600;
    const POLL_INTERVAL_MS_RANGE: RangeInclusive<u64> = 10..=60_000;
    const ROLE_SETTLE_SEC_RANGE: RangeInclusive<u64> = 0..=300;

    fn validate(p: &Params) -> Result<Self, Error> {
        let dflt = Self::default();
        let endpoint_url = optional(p.endpoint_url.clone())
            .map(|u| url::Url::parse(&u).map_err(|e| Error::config("endpoint-url", &e)))
            .transpose()?;
        if let Some(url) = &endpoint_url {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::config("endpoint-url", "scheme must be http or https"));
            }
        }
        let max_attempts = in_range(
            "max-attempts",
            parse("max-attempts", &p.max_attempts, dflt.max_attempts)?,
            &Self::MAX_ATTEMPTS_RANGE,
        )?;
        Ok(Self {
            auto_provision: parse("auto-provision", &p.auto_provision, dflt.auto_provision)?,
            endpoint_url,
            max_attempts,
            retry_interval: millis(
                "retry-interval-ms",
                &p.retry_interval_ms,
                dflt.retry_interval,
                &Self::RETRY_INTERVAL_MS_RANGE,
            )?,
            retry_jitter: parse("retry-jitter", &p.retry_jitter, dflt.retry_jitter)?,
            request_timeout: millis(
                "request-timeout-ms",
                &p.request_timeout_ms,
                dflt.request_timeout,
                &Self::REQUEST_TIMEOUT_MS_RANGE,
            )?,
            provision_timeout: secs(
                "provision-timeout-sec",
                &p.provision_timeout_sec,
                dflt.provision_timeout,
                &Self::PROVISION_TIMEOUT_SEC_RANGE,
            )?,
            poll_interval: millis(
                "poll-interval-ms",
                &p.poll_interval_ms,
                dflt.poll_interval,
                &Self::POLL_INTERVAL_MS_RANGE,
            )?,
            role_settle: secs(
                "role-settle-sec",
                &p.role_settle_sec,
                dflt.role_settle,
                &Self::ROLE_SETTLE_SEC_RANGE,
            )?,
        })
    }
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            auto_provision: false,
            endpoint_url: None,
            max_attempts: 3,
            retry_interval: Duration::from_millis(100),
            retry_jitter: true,
            request_timeout: Duration::from_secs(10),
            provision_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
            role_settle: Duration::from_secs(10),
        }
    }
}

/// Validated, immutable connection configuration of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub(crate) credentials: Credentials,
    pub(crate) bucket: String,
    pub(crate) storage_region: String,
    pub(crate) account_id: String,
    pub(crate) stream_name: String,
    pub(crate) stream_region: String,
    pub(crate) role_name: String,
    pub(crate) role_region: String,
    pub(crate) s3: S3Tuning,
    pub(crate) behaviour: Behaviour,
}

impl Config {
    /// Builds and validates the configuration from the host supplied parameters.
    ///
    /// # Errors
    /// if a required parameter is missing or empty, or an optional one is malformed
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, Error> {
        let deserializer = MapDeserializer::<_, serde::de::value::Error>::new(
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        let raw = Params::deserialize(deserializer).map_err(|e| Error::config("parameters", &e))?;
        Self::validate(raw)
    }

    /// name of the delivery stream
    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }
    /// region of the delivery stream
    #[must_use]
    pub fn stream_region(&self) -> &str {
        &self.stream_region
    }
    /// region of the S3 bucket
    #[must_use]
    pub fn storage_region(&self) -> &str {
        &self.storage_region
    }
    /// region used for IAM
    #[must_use]
    pub fn role_region(&self) -> &str {
        &self.role_region
    }
    /// S3 bucket the stream delivers into
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
    /// AWS account id
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }
    /// name of the access role
    #[must_use]
    pub fn role_name(&self) -> &str {
        &self.role_name
    }
    /// S3 destination tuning
    #[must_use]
    pub fn s3(&self) -> &S3Tuning {
        &self.s3
    }
    /// client behaviour
    #[must_use]
    pub fn behaviour(&self) -> &Behaviour {
        &self.behaviour
    }
    pub(crate) fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

impl Config {
    fn validate(p: Params) -> Result<Self, Error> {
        let behaviour = Behaviour::validate(&p)?;
        let credentials = Credentials::new(
            required("credential-key", p.credential_key)?,
            required("credential-secret", p.credential_secret)?,
        );
        let bucket = required("storage-bucket-name", p.storage_bucket_name)?;
        let storage_region = required("storage-region", p.storage_region)?;
        let account_id = required("account-id", p.account_id)?;
        if account_id.len() != 12 || !account_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::config("account-id", "must be a 12 digit number"));
        }
        let stream_name = required("stream-name", p.stream_name)?;
        let stream_region = required("stream-region", p.stream_region)?;
        let role_name = required("role-name", p.role_name)?;
        let role_region =
            optional(p.role_region).unwrap_or_else(|| DEFAULT_ROLE_REGION.to_string());

        let s3 = S3Tuning {
            kms_key_id: optional(p.encryption_key_id),
            buffer_size_mb: in_range(
                "buffer-size-mb",
                parse(
                    "buffer-size-mb",
                    &p.buffer_size_mb,
                    S3Tuning::default_buffer_size_mb(),
                )?,
                &S3Tuning::SIZE_RANGE,
            )?,
            buffer_interval_sec: in_range(
                "buffer-interval-sec",
                parse(
                    "buffer-interval-sec",
                    &p.buffer_interval_sec,
                    S3Tuning::default_buffer_interval_sec(),
                )?,
                &S3Tuning::INTERVAL_RANGE,
            )?,
        };

        Ok(Self {
            credentials,
            bucket,
            storage_region,
            account_id,
            stream_name,
            stream_region,
            role_name,
            role_region,
            s3,
            behaviour,
        })
    }
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

fn required(key: &'static str, value: String) -> Result<String, Error> {
    optional(value).ok_or_else(|| Error::config(key, "missing or empty"))
}

fn parse<T>(key: &'static str, value: &str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: Display,
{
    match value.trim() {
        "" => Ok(default),
        v => v
            .parse()
            .map_err(|e: T::Err| Error::config(key, &format!("`{v}` {e}"))),
    }
}

fn in_range<T>(key: &'static str, value: T, range: &RangeInclusive<T>) -> Result<T, Error>
where
    T: PartialOrd + Display,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(Error::config(
            key,
            &format!(
                "{value} is not within {}..={}",
                range.start(),
                range.end()
            ),
        ))
    }
}

fn millis(
    key: &'static str,
    value: &str,
    default: Duration,
    range: &RangeInclusive<u64>,
) -> Result<Duration, Error> {
    let default = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    in_range(key, parse(key, value, default)?, range).map(Duration::from_millis)
}

fn secs(
    key: &'static str,
    value: &str,
    default: Duration,
    range: &RangeInclusive<u64>,
) -> Result<Duration, Error> {
    in_range(key, parse(key, value, default.as_secs())?, range).map(Duration::from_secs)
}
