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

//! Readiness check and auto provisioning of the delivery stream.
//!
//! Provisioning calls are never retried, a failure is surfaced right away.

use crate::{
    api::{timed, Clients, DestinationDefinition, RoleCreation, StreamStatus},
    config::Config,
    errors::{ApiError, ApiErrorKind, Error},
    policy,
};
use log::{debug, info};
use tokio::time::{sleep, Instant};

/// Makes sure the configured delivery stream exists and is active.
///
/// An active stream costs exactly one describe call. A missing stream is
/// provisioned if `auto-provision` is enabled, otherwise this fails with
/// [`Error::DestinationNotFound`].
///
/// # Errors
/// if the stream is missing, can't be provisioned or does not become active in time
pub(crate) async fn ensure_destination_ready(
    ctx: &str,
    config: &Config,
    clients: &Clients,
) -> Result<(), Error> {
    let stream = config.stream_name();
    let described = describe(config, clients).await.map_err(|e| {
        Error::provisioning(stream, "Describing the delivery stream failed", Some(e))
    })?;
    match described {
        Some(StreamStatus::Active) => {
            debug!("{ctx} Delivery stream is active");
            Ok(())
        }
        Some(StreamStatus::Creating) => {
            info!("{ctx} Delivery stream is being created, waiting for it to become active");
            wait_until_active(ctx, config, clients).await
        }
        Some(status) => Err(unusable(stream, &status)),
        None if config.behaviour().auto_provision => provision(ctx, config, clients).await,
        None => Err(Error::DestinationNotFound(stream.to_string())),
    }
}

async fn describe(config: &Config, clients: &Clients) -> Result<Option<StreamStatus>, ApiError> {
    timed(
        "DescribeDeliveryStream",
        config.behaviour().request_timeout,
        clients.streams.describe_stream(config.stream_name()),
    )
    .await
    .map(|d| d.map(|d| d.status))
}

fn unusable(stream: &str, status: &StreamStatus) -> Error {
    Error::provisioning(
        stream,
        &format!("Delivery stream is not usable, status: {status:?}"),
        None,
    )
}

pub(crate) fn destination(config: &Config) -> DestinationDefinition {
    let s3 = config.s3();
    DestinationDefinition {
        stream_name: config.stream_name().to_string(),
        role_arn: policy::role_arn(config.account_id(), config.role_name()),
        bucket_arn: policy::bucket_arn(config.bucket()),
        buffer_size_mb: s3.buffer_size_mb,
        buffer_interval_sec: s3.buffer_interval_sec,
        kms_key_arn: s3.kms_key_id.as_deref().map(|key_id| {
            policy::kms_key_arn(config.storage_region(), config.account_id(), key_id)
        }),
    }
}

async fn provision(ctx: &str, config: &Config, clients: &Clients) -> Result<(), Error> {
    let stream = config.stream_name();
    let bucket = config.bucket();
    let role = config.role_name();
    let timeout = config.behaviour().request_timeout;
    let failed = |what: &str, e: ApiError| Error::provisioning(stream, what, Some(e));

    info!("{ctx} Delivery stream does not exist, provisioning it");

    let exists = timed("HeadBucket", timeout, clients.storage.bucket_exists(bucket))
        .await
        .map_err(|e| failed("Checking the destination bucket failed", e))?;
    if !exists {
        return Err(Error::provisioning(
            stream,
            &format!("Destination bucket {bucket} does not exist"),
            None,
        ));
    }

    let trust_policy = policy::trust_policy(config);
    let creation = timed("CreateRole", timeout, clients.roles.create_role(role, &trust_policy))
        .await
        .map_err(|e| failed("Creating the access role failed", e))?;
    match creation {
        RoleCreation::Created => info!("{ctx} Created access role {role}"),
        RoleCreation::AlreadyExisted => info!("{ctx} Using existing access role {role}"),
    }

    let policy_name = policy::policy_name(config);
    let access_policy = policy::access_policy(config);
    timed(
        "PutRolePolicy",
        timeout,
        clients
            .roles
            .put_role_policy(role, &policy_name, &access_policy),
    )
    .await
    .map_err(|e| failed("Attaching the access policy failed", e))?;

    let settle = config.behaviour().role_settle;
    if creation == RoleCreation::Created && !settle.is_zero() {
        // freshly created roles can't be assumed by firehose right away
        debug!("{ctx} Waiting {}s for role {role} to propagate", settle.as_secs());
        sleep(settle).await;
    }

    let definition = destination(config);
    match timed(
        "CreateDeliveryStream",
        timeout,
        clients.streams.create_stream(&definition),
    )
    .await
    {
        Ok(()) => info!("{ctx} Created delivery stream delivering to {bucket}"),
        Err(e) if e.kind == ApiErrorKind::InUse => {
            info!("{ctx} Delivery stream was created concurrently");
        }
        Err(e) => return Err(failed("Creating the delivery stream failed", e)),
    }

    wait_until_active(ctx, config, clients).await
}

async fn wait_until_active(ctx: &str, config: &Config, clients: &Clients) -> Result<(), Error> {
    let stream = config.stream_name();
    let behaviour = config.behaviour();
    let timed_out = || {
        Error::provisioning(
            stream,
            &format!(
                "Delivery stream did not become active within {}s",
                behaviour.provision_timeout.as_secs()
            ),
            None,
        )
    };
    let deadline = Instant::now()
        .checked_add(behaviour.provision_timeout)
        .ok_or_else(timed_out)?;
    loop {
        let status = describe(config, clients).await.map_err(|e| {
            Error::provisioning(stream, "Describing the delivery stream failed", Some(e))
        })?;
        match status {
            Some(StreamStatus::Active) => {
                info!("{ctx} Delivery stream is active");
                return Ok(());
            }
            // a freshly created stream might not be visible yet
            Some(StreamStatus::Creating) | None => {
                match Instant::now().checked_add(behaviour.poll_interval) {
                    Some(next_poll) if next_poll <= deadline => (),
                    _ => return Err(timed_out()),
                }
                debug!("{ctx} Delivery stream is not active yet");
                sleep(behaviour.poll_interval).await;
            }
            Some(status) => return Err(unusable(stream, &status)),
        }
    }
}
