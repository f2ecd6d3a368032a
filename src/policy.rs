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

//! IAM policy documents and ARNs for the firehose access role

use crate::config::Config;
use simd_json::{json, OwnedValue};
use value_trait::prelude::*;

const POLICY_VERSION: &str = "2012-10-17";
const FIREHOSE_PRINCIPAL: &str = "firehose.amazonaws.com";

/// `arn:aws:s3:::<bucket>`
pub(crate) fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

/// `arn:aws:iam::<account>:role/<role>`
pub(crate) fn role_arn(account_id: &str, role: &str) -> String {
    format!("arn:aws:iam::{account_id}:role/{role}")
}

/// Turns a KMS key id into a key ARN, full ARNs are kept as they are.
pub(crate) fn kms_key_arn(region: &str, account_id: &str, key_id: &str) -> String {
    if key_id.starts_with("arn:") {
        key_id.to_string()
    } else {
        format!("arn:aws:kms:{region}:{account_id}:key/{key_id}")
    }
}

/// name of the inline policy attached to the access role
pub(crate) fn policy_name(config: &Config) -> String {
    format!("{}-s3-delivery", config.stream_name())
}

/// Lets firehose assume the role, on behalf of our own account only.
pub(crate) fn trust_policy(config: &Config) -> String {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": FIREHOSE_PRINCIPAL },
            "Action": "sts:AssumeRole",
            "Condition": {
                "StringEquals": { "sts:ExternalId": config.account_id() }
            }
        }]
    })
    .encode()
}

/// Write access to the destination bucket, and to the KMS key if one is configured.
pub(crate) fn access_policy(config: &Config) -> String {
    let bucket = bucket_arn(config.bucket());
    let mut statements: Vec<OwnedValue> = vec![json!({
        "Effect": "Allow",
        "Action": [
            "s3:AbortMultipartUpload",
            "s3:GetBucketLocation",
            "s3:GetObject",
            "s3:ListBucket",
            "s3:ListBucketMultipartUploads",
            "s3:PutObject"
        ],
        "Resource": [bucket.as_str(), format!("{bucket}/*")]
    })];
    if let Some(key_id) = &config.s3().kms_key_id {
        let region = config.storage_region();
        statements.push(json!({
            "Effect": "Allow",
            "Action": ["kms:Decrypt", "kms:GenerateDataKey"],
            "Resource": [kms_key_arn(region, config.account_id(), key_id)],
            "Condition": {
                "StringEquals": { "kms:ViaService": format!("s3.{region}.amazonaws.com") },
                "StringLike": { "kms:EncryptionContext:aws:s3:arn": format!("{bucket}/*") }
            }
        }));
    }
    json!({
        "Version": POLICY_VERSION,
        "Statement": statements
    })
    .encode()
}
