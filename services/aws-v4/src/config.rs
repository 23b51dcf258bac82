// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::constants::*;

/// The signature variant to compute.
///
/// The set is closed: every supported variant is known at compile time and
/// selected when the signer is configured, never dispatched dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SigningAlgorithm {
    /// Symmetric SigV4: HMAC-SHA256 with a date/region/service scoped key.
    #[default]
    V4,
    /// Asymmetric SigV4A: ECDSA over P-256 with a key derived from the
    /// credential, valid across regions.
    V4a,
}

impl SigningAlgorithm {
    /// The algorithm identifier used in the string-to-sign and the
    /// `Authorization` header.
    pub fn id(&self) -> &'static str {
        match self {
            SigningAlgorithm::V4 => AWS4_HMAC_SHA256,
            SigningAlgorithm::V4a => AWS4_ECDSA_P256_SHA256,
        }
    }

    /// The payload hash sentinel announcing a streamed, chunk-signed body.
    pub fn streaming_payload(&self, trailer: bool) -> &'static str {
        match (self, trailer) {
            (SigningAlgorithm::V4, false) => STREAMING_AWS4_HMAC_SHA256_PAYLOAD,
            (SigningAlgorithm::V4, true) => STREAMING_AWS4_HMAC_SHA256_PAYLOAD_TRAILER,
            (SigningAlgorithm::V4a, false) => STREAMING_AWS4_ECDSA_P256_SHA256_PAYLOAD,
            (SigningAlgorithm::V4a, true) => STREAMING_AWS4_ECDSA_P256_SHA256_PAYLOAD_TRAILER,
        }
    }
}

/// How the request payload takes part in the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadSigning {
    /// The canonical request carries the SHA-256 of the exact bytes to be
    /// sent.
    #[default]
    Full,
    /// The canonical request carries the `UNSIGNED-PAYLOAD` sentinel; the
    /// body is not covered by the signature.
    Unsigned,
    /// The body is re-framed into `aws-chunked` encoding and every chunk is
    /// signed individually, chained to the header signature.
    Streaming,
}
