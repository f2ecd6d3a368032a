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

use std::fmt::Display;

/// Kind of an [`Error`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// missing or invalid parameters
    Configuration,
    /// role or stream setup failed
    Provisioning,
    /// the delivery stream does not exist and auto provisioning is disabled
    DestinationNotFound,
    /// delivery failed after all retries were used up
    TransientDelivery,
    /// delivery failed and must not be retried
    PermanentDelivery,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Configuration => "configuration error",
            Self::Provisioning => "provisioning error",
            Self::DestinationNotFound => "destination not found",
            Self::TransientDelivery => "transient delivery error",
            Self::PermanentDelivery => "permanent delivery error",
        };
        f.write_str(s)
    }
}

/// The error type of the firehose connector
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or missing parameter
    #[error("Invalid configuration for `{key}`: {reason}")]
    Configuration {
        /// parameter name
        key: &'static str,
        /// what is wrong with it
        reason: String,
    },
    /// Provisioning of the role or the delivery stream failed
    #[error("[Firehose::{stream}] Provisioning failed: {reason}")]
    Provisioning {
        /// delivery stream name
        stream: String,
        /// what failed
        reason: String,
        /// underlying provider error, if any
        #[source]
        source: Option<ApiError>,
    },
    /// The delivery stream does not exist
    #[error("[Firehose::{0}] Delivery stream not found")]
    DestinationNotFound(String),
    /// Retries exhausted
    #[error("[Firehose::{stream}] Delivery failed after {attempts} attempts: {source}")]
    TransientDelivery {
        /// delivery stream name
        stream: String,
        /// number of attempts made
        attempts: u32,
        /// the last provider error
        #[source]
        source: ApiError,
    },
    /// Non retryable delivery failure
    #[error("[Firehose::{stream}] Delivery failed: {reason}")]
    PermanentDelivery {
        /// delivery stream name
        stream: String,
        /// what failed
        reason: String,
        /// underlying provider error, if any
        #[source]
        source: Option<ApiError>,
    },
}

impl Error {
    /// the kind of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Provisioning { .. } => ErrorKind::Provisioning,
            Self::DestinationNotFound(_) => ErrorKind::DestinationNotFound,
            Self::TransientDelivery { .. } => ErrorKind::TransientDelivery,
            Self::PermanentDelivery { .. } => ErrorKind::PermanentDelivery,
        }
    }

    /// whether a later attempt of the same invocation might succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientDelivery
    }

    pub(crate) fn config<R: ToString + ?Sized>(key: &'static str, reason: &R) -> Self {
        Self::Configuration {
            key,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn provisioning<S, R>(stream: &S, reason: &R, source: Option<ApiError>) -> Self
    where
        S: ToString + ?Sized,
        R: ToString + ?Sized,
    {
        Self::Provisioning {
            stream: stream.to_string(),
            reason: reason.to_string(),
            source,
        }
    }
}

/// Classification of a provider (service) error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// request rate exceeded
    Throttled,
    /// service unavailable, timeouts and transport failures
    Unavailable,
    /// the addressed resource does not exist
    NotFound,
    /// the resource to create already exists
    AlreadyExists,
    /// the resource is in use or being modified
    InUse,
    /// the request was rejected as invalid
    InvalidArgument,
    /// anything else
    Other,
}

impl ApiErrorKind {
    /// whether the same request might succeed later
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Throttled | Self::Unavailable)
    }
}

/// Error returned by the service traits in [`crate::api`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed ({kind:?}): {message}")]
pub struct ApiError {
    /// classification
    pub kind: ApiErrorKind,
    /// the provider operation, e.g. `PutRecord`
    pub operation: &'static str,
    /// provider message
    pub message: String,
}

impl ApiError {
    /// constructor
    #[must_use]
    pub fn new<M>(kind: ApiErrorKind, operation: &'static str, message: &M) -> Self
    where
        M: ToString + ?Sized,
    {
        Self {
            kind,
            operation,
            message: message.to_string(),
        }
    }

    /// error for a call that did not finish within the request timeout
    pub(crate) fn timeout(operation: &'static str, after: std::time::Duration) -> Self {
        Self::new(
            ApiErrorKind::Unavailable,
            operation,
            &format!("timed out after {after:?}"),
        )
    }
}
