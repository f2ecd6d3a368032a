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

use super::fake::Fake;
use crate::params;
use tremor_connectors_firehose::{
    api::StreamStatus,
    errors::{ApiError, ApiErrorKind},
    Ack, Config, DeliveryClient, ErrorKind, State, MAX_RECORD_SIZE,
};

fn delivery_client(fake: &Fake, stream: &str) -> anyhow::Result<DeliveryClient> {
    let config = Config::from_params(&params(stream))?;
    Ok(DeliveryClient::new(config, fake.clients()))
}

#[tokio::test]
async fn delivers_one_record() -> anyhow::Result<()> {
    let fake = Fake::new().with_stream("orders-stream", StreamStatus::Active);
    let ack = delivery_client(&fake, "orders-stream")?
        .deliver(b"order-42")
        .await?;
    assert_eq!(
        Ack {
            stream: "orders-stream".to_string(),
            record_id: "orders-stream-1".to_string(),
            encrypted: false,
            attempts: 1,
        },
        ack
    );
    assert_eq!(vec![b"order-42".to_vec()], fake.records("orders-stream"));
    assert_eq!(
        vec![
            "DescribeDeliveryStream:orders-stream".to_string(),
            "PutRecord:orders-stream".to_string()
        ],
        fake.calls()
    );
    Ok(())
}

#[tokio::test]
async fn empty_payload() -> anyhow::Result<()> {
    let fake = Fake::new().with_stream("orders-stream", StreamStatus::Active);
    delivery_client(&fake, "orders-stream")?.deliver(b"").await?;
    assert_eq!(vec![Vec::<u8>::new()], fake.records("orders-stream"));
    Ok(())
}

#[tokio::test]
async fn missing_parameter_fails_before_any_call() {
    let mut p = params("orders-stream");
    p.remove("role-name");
    let e = tremor_connectors_firehose::deliver(&p, "order-42")
        .await
        .expect_err("role-name is required");
    assert_eq!(ErrorKind::Configuration, e.kind());
    assert!(e.to_string().contains("role-name"));
}

#[tokio::test]
async fn oversized_record() -> anyhow::Result<()> {
    let fake = Fake::new().with_stream("orders-stream", StreamStatus::Active);
    let mut client = delivery_client(&fake, "orders-stream")?;
    client.ensure_destination_ready().await?;

    let payload = vec![b'x'; MAX_RECORD_SIZE + 1];
    let e = client.put_record(&payload).await.expect_err("too large");
    assert_eq!(ErrorKind::PermanentDelivery, e.kind());
    assert_eq!(State::Failed(ErrorKind::PermanentDelivery), client.state());
    assert_eq!(0, fake.calls_to("PutRecord"));

    // the limit itself is fine
    let mut client = delivery_client(&fake, "orders-stream")?;
    client.ensure_destination_ready().await?;
    client.put_record(&vec![b'x'; MAX_RECORD_SIZE]).await?;
    assert_eq!(State::Acknowledged, client.state());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() -> anyhow::Result<()> {
    let fake = Fake::new().with_stream("orders-stream", StreamStatus::Active);
    fake.state().put_errors.extend([
        ApiError::new(ApiErrorKind::Throttled, "PutRecord", "slow down"),
        ApiError::new(ApiErrorKind::Unavailable, "PutRecord", "try again"),
    ]);
    let ack = delivery_client(&fake, "orders-stream")?
        .deliver(b"order-42")
        .await?;
    assert_eq!(3, ack.attempts);
    assert_eq!(3, fake.calls_to("PutRecord"));
    assert_eq!(vec![b"order-42".to_vec()], fake.records("orders-stream"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retries_exhausted() -> anyhow::Result<()> {
    let fake = Fake::new().with_stream("orders-stream", StreamStatus::Active);
    fake.state().put_errors.extend(
        std::iter::repeat(ApiError::new(
            ApiErrorKind::Throttled,
            "PutRecord",
            "slow down",
        ))
        .take(5),
    );
    let mut client = delivery_client(&fake, "orders-stream")?;
    client.ensure_destination_ready().await?;
    let e = client.put_record(b"order-42").await.expect_err("throttled");

    assert_eq!(ErrorKind::TransientDelivery, e.kind());
    assert!(e.is_retryable());
    assert_eq!(State::Failed(ErrorKind::TransientDelivery), client.state());
    // default of three attempts
    assert_eq!(3, fake.calls_to("PutRecord"));
    assert!(fake.records("orders-stream").is_empty());
    Ok(())
}

#[tokio::test]
async fn permanent_failures_are_not_retried() -> anyhow::Result<()> {
    let fake = Fake::new().with_stream("orders-stream", StreamStatus::Active);
    fake.state().put_errors.push_back(ApiError::new(
        ApiErrorKind::NotFound,
        "PutRecord",
        "stream was deleted",
    ));
    let e = delivery_client(&fake, "orders-stream")?
        .deliver(b"order-42")
        .await
        .expect_err("not found");
    assert_eq!(ErrorKind::PermanentDelivery, e.kind());
    assert!(!e.is_retryable());
    assert_eq!(1, fake.calls_to("PutRecord"));
    Ok(())
}

#[tokio::test]
async fn credentials_never_leak_into_errors() -> anyhow::Result<()> {
    let fake = Fake::new().with_stream("orders-stream", StreamStatus::Active);
    fake.state().put_errors.push_back(ApiError::new(
        ApiErrorKind::InvalidArgument,
        "PutRecord",
        "signature of AKIDEXAMPLE with SECRET does not match",
    ));
    let config = Config::from_params(&params("orders-stream"))?;
    assert!(!format!("{config:?}").contains("SECRET"));

    let e = DeliveryClient::new(config, fake.clients())
        .deliver(b"order-42")
        .await
        .expect_err("rejected");
    let chain = format!("{e} {e:?}");
    assert!(!chain.contains("AKIDEXAMPLE"));
    assert!(!chain.contains("SECRET"));
    assert!(chain.contains("<redacted>"));
    Ok(())
}

#[tokio::test]
async fn out_of_order_put() -> anyhow::Result<()> {
    let fake = Fake::new().with_stream("orders-stream", StreamStatus::Active);
    let mut client = delivery_client(&fake, "orders-stream")?;
    assert_eq!(State::Configured, client.state());
    let e = client
        .put_record(b"order-42")
        .await
        .expect_err("destination not checked");
    assert_eq!(ErrorKind::PermanentDelivery, e.kind());
    assert_eq!(0, fake.calls_to("PutRecord"));
    Ok(())
}

#[tokio::test]
async fn repeated_readiness_check_is_read_only() -> anyhow::Result<()> {
    let fake = Fake::new().with_stream("orders-stream", StreamStatus::Active);
    let mut client = delivery_client(&fake, "orders-stream")?;
    client.ensure_destination_ready().await?;
    client.ensure_destination_ready().await?;
    assert_eq!(State::DestinationChecked, client.state());
    assert_eq!(
        vec![
            "DescribeDeliveryStream:orders-stream".to_string(),
            "DescribeDeliveryStream:orders-stream".to_string()
        ],
        fake.calls()
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_are_independent() -> anyhow::Result<()> {
    const TASKS: usize = 32;
    let mut fake = Fake::new();
    for i in 0..TASKS {
        fake = fake.with_stream(&format!("stream-{i}"), StreamStatus::Active);
    }

    let handles: Vec<_> = (0..TASKS)
        .map(|i| {
            let fake = fake.clone();
            tokio::spawn(async move {
                let stream = format!("stream-{i}");
                let config = Config::from_params(&params(&stream))?;
                let ack = DeliveryClient::new(config, fake.clients())
                    .deliver(format!("payload-{i}").as_bytes())
                    .await?;
                anyhow::Ok(ack)
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let ack = handle.await??;
        assert_eq!(format!("stream-{i}"), ack.stream);
    }
    for i in 0..TASKS {
        assert_eq!(
            vec![format!("payload-{i}").into_bytes()],
            fake.records(&format!("stream-{i}"))
        );
    }
    assert_eq!(TASKS, fake.calls_to("PutRecord"));
    Ok(())
}

#[tokio::test]
async fn unbounded_retry_settings_are_rejected() {
    for (key, value) in [
        ("max-attempts", "20"),
        ("retry-interval-ms", "18446744073709551615"),
    ] {
        let mut p = params("orders-stream");
        p.insert(key.to_string(), value.to_string());
        let e = Config::from_params(&p).expect_err(key);
        assert_eq!(ErrorKind::Configuration, e.kind(), "{key}={value}");
    }
}

#[tokio::test(start_paused = true)]
async fn longest_backoff_is_bounded() -> anyhow::Result<()> {
    let fake = Fake::new().with_stream("orders-stream", StreamStatus::Active);
    fake.state().put_errors.extend(
        std::iter::repeat(ApiError::new(
            ApiErrorKind::Unavailable,
            "PutRecord",
            "try again",
        ))
        .take(10),
    );
    let mut p = params("orders-stream");
    p.insert("max-attempts".to_string(), "10".to_string());
    p.insert("retry-interval-ms".to_string(), "30000".to_string());
    let start = tokio::time::Instant::now();
    let e = DeliveryClient::new(Config::from_params(&p)?, fake.clients())
        .deliver(b"order-42")
        .await
        .expect_err("unavailable");
    assert_eq!(ErrorKind::TransientDelivery, e.kind());
    assert_eq!(10, fake.calls_to("PutRecord"));
    // nine waits of at most 30s each
    assert!(start.elapsed() < std::time::Duration::from_secs(9 * 30 + 1));
    Ok(())
}
