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

use crate::{
    api::{timed, Clients},
    config::{Config, Credentials},
    errors::{ApiError, Error, ErrorKind},
    provision,
    retry::RetryWithBackoff,
};
use log::{debug, error};
use std::fmt::Display;

/// Maximum size of a single record accepted by firehose, 1000 KiB
pub const MAX_RECORD_SIZE: usize = 1000 * 1024;

/// Progress of a single submission
///
/// `Unconfigured -> Configured -> DestinationChecked -> Submitted -> Acknowledged`,
/// every non terminal state may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// no validated configuration yet
    Unconfigured,
    /// configuration validated, clients built
    Configured,
    /// the delivery stream is known to be active
    DestinationChecked,
    /// the record is in flight
    Submitted,
    /// the provider accepted the record
    Acknowledged,
    /// the submission failed
    Failed(ErrorKind),
}

impl State {
    /// `Acknowledged` and `Failed` are final
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Acknowledged | Self::Failed(_))
    }

    fn can_advance_to(self, next: Self) -> bool {
        match next {
            Self::Failed(_) => !self.is_terminal(),
            Self::Configured => self == Self::Unconfigured,
            Self::DestinationChecked => self == Self::Configured,
            Self::Submitted => self == Self::DestinationChecked,
            Self::Acknowledged => self == Self::Submitted,
            Self::Unconfigured => false,
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconfigured => f.write_str("unconfigured"),
            Self::Configured => f.write_str("configured"),
            Self::DestinationChecked => f.write_str("destination checked"),
            Self::Submitted => f.write_str("submitted"),
            Self::Acknowledged => f.write_str("acknowledged"),
            Self::Failed(kind) => write!(f, "failed ({kind})"),
        }
    }
}

/// Acknowledgement of a delivered record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// delivery stream the record went to
    pub stream: String,
    /// record id assigned by firehose
    pub record_id: String,
    /// whether the record was encrypted server side
    pub encrypted: bool,
    /// number of put attempts it took
    pub attempts: u32,
}

/// Delivers a single record to a firehose delivery stream.
///
/// One client serves exactly one submission: configuration, clients and payload
/// are owned by the invocation and never shared.
#[derive(Debug)]
pub struct DeliveryClient {
    config: Config,
    clients: Clients,
    state: State,
    ctx: String,
}

impl DeliveryClient {
    /// Creates a client for a validated configuration and its service clients.
    #[must_use]
    pub fn new(config: Config, clients: Clients) -> Self {
        let ctx = format!("[Firehose::{}]", config.stream_name());
        let mut client = Self {
            config,
            clients,
            state: State::Unconfigured,
            ctx,
        };
        client.advance(State::Configured);
        client
    }

    /// current state of the submission
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// the configuration this client was created with
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn advance(&mut self, next: State) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid transition {} -> {next}",
            self.state
        );
        self.state = next;
    }

    fn fail(&mut self, e: Error) -> Error {
        if !self.state.is_terminal() {
            self.advance(State::Failed(e.kind()));
        }
        e
    }

    fn out_of_order(&self, operation: &str) -> Error {
        Error::PermanentDelivery {
            stream: self.config.stream_name().to_string(),
            reason: format!("{operation} is not possible in state {}", self.state),
            source: None,
        }
    }

    /// Checks the delivery stream and provisions it if configured to do so.
    ///
    /// Calling this again once the destination was checked only repeats the
    /// read-only readiness check.
    ///
    /// # Errors
    /// with [`ErrorKind::DestinationNotFound`] or [`ErrorKind::Provisioning`]
    pub async fn ensure_destination_ready(&mut self) -> Result<(), Error> {
        if !matches!(self.state, State::Configured | State::DestinationChecked) {
            return Err(self.out_of_order("Checking the destination"));
        }
        match provision::ensure_destination_ready(&self.ctx, &self.config, &self.clients).await {
            Ok(()) => {
                if self.state == State::Configured {
                    self.advance(State::DestinationChecked);
                }
                Ok(())
            }
            Err(e) => Err(self.fail(self.redact(e))),
        }
    }

    /// Submits `payload` as one record, retrying transient failures with backoff.
    ///
    /// # Errors
    /// with [`ErrorKind::TransientDelivery`] once all attempts failed or
    /// [`ErrorKind::PermanentDelivery`] for failures a retry can't fix
    pub async fn put_record(&mut self, payload: &[u8]) -> Result<Ack, Error> {
        if self.state != State::DestinationChecked {
            return Err(self.out_of_order("Submitting a record"));
        }
        let stream = self.config.stream_name().to_string();
        if payload.len() > MAX_RECORD_SIZE {
            let e = Error::PermanentDelivery {
                stream,
                reason: format!(
                    "Record of {} bytes exceeds the limit of {MAX_RECORD_SIZE} bytes",
                    payload.len()
                ),
                source: None,
            };
            return Err(self.fail(e));
        }
        self.advance(State::Submitted);
        debug!("{} Putting record of {} bytes", self.ctx, payload.len());

        let mut retry = RetryWithBackoff::from_behaviour(self.config.behaviour());
        let timeout = self.config.behaviour().request_timeout;
        let streams = &self.clients.streams;
        let credentials = self.config.credentials();
        let name = stream.as_str();
        // redacted before the retry loop gets to log it
        let (res, attempts) = retry
            .run(&self.ctx, move || async move {
                timed("PutRecord", timeout, streams.put_record(name, payload.to_vec()))
                    .await
                    .map_err(|e| redact_api(credentials, e))
            })
            .await;

        match res {
            Ok(receipt) => {
                debug!(
                    "{} Record {} acknowledged after {attempts} attempt(s)",
                    self.ctx, receipt.record_id
                );
                self.advance(State::Acknowledged);
                Ok(Ack {
                    stream,
                    record_id: receipt.record_id,
                    encrypted: receipt.encrypted,
                    attempts,
                })
            }
            Err(source) => {
                let e = if source.kind.is_transient() {
                    Error::TransientDelivery {
                        stream,
                        attempts,
                        source,
                    }
                } else {
                    Error::PermanentDelivery {
                        stream,
                        reason: "Record was rejected".to_string(),
                        source: Some(source),
                    }
                };
                Err(self.fail(e))
            }
        }
    }

    /// Runs a whole submission: readiness check, then the put.
    ///
    /// # Errors
    /// any error of [`Self::ensure_destination_ready`] or [`Self::put_record`]
    pub async fn deliver(mut self, payload: &[u8]) -> Result<Ack, Error> {
        let res = match self.ensure_destination_ready().await {
            Ok(()) => self.put_record(payload).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &res {
            error!("{} Delivery failed: {e}", self.ctx);
        }
        res
    }

    fn redact(&self, e: Error) -> Error {
        match e {
            Error::Provisioning {
                stream,
                reason,
                source,
            } => Error::Provisioning {
                stream,
                reason,
                source: source.map(|s| redact_api(self.config.credentials(), s)),
            },
            e => e,
        }
    }
}

fn redact_api(credentials: &Credentials, mut e: ApiError) -> ApiError {
    for secret in [credentials.access_key_id(), credentials.secret_access_key()] {
        if !secret.is_empty() && e.message.contains(secret) {
            e.message = e.message.replace(secret, "<redacted>");
        }
    }
    e
}
