// Copyright 2020-2024, The Tremor Team
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
use crate::config::{Config, Credentials};
use aws_config::{BehaviorVersion, ConfigLoader};
use aws_credential_types::{
    provider::{future, ProvideCredentials},
    Credentials as AwsCredentials,
};
use aws_types::{region::Region, SdkConfig};

const PROVIDER_NAME: &str = "tremor-firehose";

/// Provides the static key pair of one invocation.
///
/// No fallback to the environment, profile files or instance metadata.
struct CredentialProvider {
    credentials: Credentials,
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl ProvideCredentials for CredentialProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(async {
            let creds = AwsCredentials::new(
                self.credentials.access_key_id(),
                self.credentials.secret_access_key(),
                None,
                None,
                PROVIDER_NAME,
            );
            Ok(creds)
        })
    }
}

pub(crate) fn resolve(config: &Config, loader: ConfigLoader) -> ConfigLoader {
    let loader = loader.credentials_provider(CredentialProvider {
        credentials: config.credentials().clone(),
    });
    if let Some(url) = &config.behaviour().endpoint_url {
        loader.endpoint_url(url.as_str().trim_end_matches('/'))
    } else {
        loader
    }
}

/// SDK configuration for a single service in `region`
pub(crate) async fn make_config(config: &Config, region: &str) -> SdkConfig {
    let loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    resolve(config, loader).load().await
}
