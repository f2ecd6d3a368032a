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

//! Tremor AWS Kinesis Data Firehose connector
//!
//! Delivers a single payload as one record to a firehose delivery stream:
//!
//! 1. the flat parameter map of the host is validated into a [`Config`]
//! 2. S3, IAM and firehose clients are built with the static credentials from it
//! 3. the delivery stream is checked, and provisioned with an access role and an
//!    S3 destination if `auto-provision` is set
//! 4. the payload is put as one record, transient failures are retried with backoff
//!
//! Nothing is shared between invocations, concurrent calls of [`deliver`] are independent.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(
    clippy::all,
    clippy::unwrap_used,
    clippy::unnecessary_unwrap,
    clippy::pedantic,
    clippy::mod_module_files
)]

use std::collections::HashMap;

/// provider service abstraction
pub mod api;
/// connection configuration
pub mod config;
/// connector errors
pub mod errors;

pub(crate) mod auth;
mod client;
pub(crate) mod policy;
mod provision;
mod retry;

pub use api::Clients;
pub use client::{Ack, DeliveryClient, State, MAX_RECORD_SIZE};
pub use config::Config;
pub use errors::{Error, ErrorKind};

/// Delivers `payload` as a single record, using the connection parameters in `params`.
///
/// # Errors
/// * [`ErrorKind::Configuration`] for missing or invalid parameters
/// * [`ErrorKind::DestinationNotFound`] if the stream does not exist and `auto-provision` is off
/// * [`ErrorKind::Provisioning`] if the stream could not be set up
/// * [`ErrorKind::TransientDelivery`] if all attempts failed with retryable errors
/// * [`ErrorKind::PermanentDelivery`] if the record was rejected
pub async fn deliver(params: &HashMap<String, String>, payload: &str) -> Result<Ack, Error> {
    let config = Config::from_params(params)?;
    let clients = Clients::from_config(&config).await;
    DeliveryClient::new(config, clients)
        .deliver(payload.as_bytes())
        .await
}
