// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::hash::Hasher;

use scan_model::Labels;
use twox_hash::XxHash64;

/// Hashes a label set into a short stable token. Key order cannot affect
/// the result, so two label maps with the same contents always collide --
/// that is what makes it usable for log dedup.
pub fn digest(labels: &Labels) -> String {
    let mut hasher = XxHash64::with_seed(0);
    for (key, value) in labels {
        hasher.write(key.as_bytes());
        hasher.write(value.as_bytes());
    }
    format!("{:x}", hasher.finish())
}
