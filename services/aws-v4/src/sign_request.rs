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

use std::fmt::Write;
use std::time::Duration;

use http::header::HeaderName;
use http::request::Parts;
use http::{header, HeaderValue};
use log::debug;
use percent_encoding::utf8_percent_encode;

use awsign_core::hash::hex_sha256;
use awsign_core::time::{format_date, format_iso8601, now, DateTime};
use awsign_core::{Error, Result, SigningMethod, SigningRequest};

use crate::canonical::{canonical_request_string, signed_header_names, PathEncoding};
use crate::chunked::{encoded_length, ChecksumAlgorithm, ChunkSigningContext};
use crate::config::{PayloadSigning, SigningAlgorithm};
use crate::constants::{
    AWS_CHUNKED, AWS_QUERY_ENCODE_SET, UNSIGNED_PAYLOAD, X_AMZ_CONTENT_SHA_256, X_AMZ_DATE,
    X_AMZ_DECODED_CONTENT_LENGTH, X_AMZ_REGION_SET, X_AMZ_SECURITY_TOKEN, X_AMZ_TRAILER,
};
use crate::key::SigningKeyCache;
use crate::Credential;

/// The body as the signer sees it.
///
/// Signing never consumes the body; callers describe it instead so large
/// payloads are hashed at most once.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SignableBody<'a> {
    /// The exact bytes that will be sent.
    Bytes(&'a [u8]),
    /// A lower-hex SHA-256 of the body, computed by the caller.
    Precomputed(String),
    /// The body is deliberately left out of the signature.
    UnsignedPayload,
}

/// RequestSigner that implement AWS SigV4 and SigV4A.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
#[derive(Debug)]
pub struct RequestSigner {
    service: String,
    region: String,

    algorithm: SigningAlgorithm,
    payload_signing: PayloadSigning,
    content_sha256_header: bool,
    excluded_headers: Vec<HeaderName>,
    normalize_uri_path: bool,
    double_uri_encode: bool,
    time: Option<DateTime>,

    key_cache: SigningKeyCache,
}

impl RequestSigner {
    /// Create a new builder for AWS V4 signer.
    pub fn new(service: &str, region: &str) -> Self {
        Self {
            service: service.into(),
            region: region.into(),

            algorithm: SigningAlgorithm::default(),
            payload_signing: PayloadSigning::default(),
            content_sha256_header: false,
            excluded_headers: Vec::new(),
            normalize_uri_path: true,
            double_uri_encode: true,
            time: None,

            // Derived keys are cached per signer instance, never globally.
            key_cache: SigningKeyCache::default(),
        }
    }

    /// Select the signature variant. Defaults to symmetric SigV4.
    pub fn with_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Select how the payload takes part in the signature. Defaults to
    /// full payload signing.
    pub fn with_payload_signing(mut self, payload_signing: PayloadSigning) -> Self {
        self.payload_signing = payload_signing;
        self
    }

    /// Also attach the payload hash as `x-amz-content-sha256`. S3 requires
    /// this; most other services ignore the header.
    pub fn with_content_sha256_header(mut self) -> Self {
        self.content_sha256_header = true;
        self
    }

    /// Headers that must not take part in the signature, on top of
    /// `authorization` and `user-agent` which are always excluded.
    pub fn with_excluded_headers(mut self, excluded: Vec<HeaderName>) -> Self {
        self.excluded_headers = excluded;
        self
    }

    /// Disable `.`/`..` segment normalization in the canonical path. S3
    /// requires the path to be taken literally.
    pub fn with_literal_uri_path(mut self) -> Self {
        self.normalize_uri_path = false;
        self
    }

    /// Encode the canonical path exactly once instead of twice. S3
    /// requires single encoding.
    pub fn with_single_uri_encode(mut self) -> Self {
        self.double_uri_encode = false;
        self
    }

    /// Specify the signing time.
    ///
    /// Defaults to the current time. Beyond testing, this is the hook an
    /// external retry layer uses after a clock-skew rejection: re-sign
    /// with the server-corrected timestamp instead of this machine's idea
    /// of "now".
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Sign the request, attaching the signature as an `Authorization`
    /// header.
    ///
    /// Headers are augmented (`host`, `x-amz-date`, optionally
    /// `x-amz-content-sha256` and `x-amz-security-token`) but the body is
    /// never touched.
    pub fn sign(
        &self,
        parts: &mut Parts,
        credential: &Credential,
        body: SignableBody<'_>,
    ) -> Result<()> {
        let payload_hash = match self.payload_signing {
            PayloadSigning::Full => match body {
                SignableBody::Bytes(bytes) => hex_sha256(bytes),
                SignableBody::Precomputed(hash) => hash,
                SignableBody::UnsignedPayload => UNSIGNED_PAYLOAD.to_string(),
            },
            PayloadSigning::Unsigned => UNSIGNED_PAYLOAD.to_string(),
            PayloadSigning::Streaming => {
                return Err(Error::streaming_unsupported(
                    "streaming bodies carry a chunk-signature envelope; use sign_streaming with the body length",
                ))
            }
        };

        self.sign_inner(
            parts,
            credential,
            SigningMethod::Header,
            payload_hash,
            self.content_sha256_header,
        )
        .map(|_| ())
    }

    /// Sign the request into its query string, producing a presigned URL
    /// valid for `expires_in` from the signing time.
    ///
    /// The payload is always `UNSIGNED-PAYLOAD` and no authentication
    /// header is attached; the resulting URI stands alone.
    pub fn presign(
        &self,
        parts: &mut Parts,
        credential: &Credential,
        expires_in: Duration,
    ) -> Result<()> {
        self.sign_inner(
            parts,
            credential,
            SigningMethod::Query(expires_in),
            UNSIGNED_PAYLOAD.to_string(),
            false,
        )
        .map(|_| ())
    }

    /// Sign the request for a streamed body of `decoded_length` bytes.
    ///
    /// Sets the `aws-chunked` framing headers (including the exact framed
    /// `content-length`) and signs them; the returned context seeds a
    /// [`ChunkedSigningStream`] which the caller wraps around its byte
    /// source in place of the original body.
    ///
    /// The body length must be known up front: the framed length goes out
    /// in the headers before any chunk is read.
    ///
    /// [`ChunkedSigningStream`]: crate::ChunkedSigningStream
    pub fn sign_streaming(
        &self,
        parts: &mut Parts,
        credential: &Credential,
        decoded_length: u64,
        trailer: Option<ChecksumAlgorithm>,
    ) -> Result<ChunkSigningContext> {
        if self.algorithm != SigningAlgorithm::V4 {
            return Err(Error::algorithm_unsupported(
                "chunk signing requires the symmetric algorithm: ECDSA signatures vary in length, \
                 so the framed content length cannot be known before streaming starts",
            ));
        }
        credential.check()?;
        if decoded_length == 0 {
            return Err(Error::streaming_unsupported(
                "a zero-length body cannot be chunk signed; sign it as a full payload instead",
            ));
        }

        // Framing headers take part in the signature, so they go in before
        // signing.
        let framed_length = encoded_length(decoded_length, trailer);
        let content_encoding = match parts.headers.get(header::CONTENT_ENCODING) {
            Some(existing) => format!("{AWS_CHUNKED},{}", existing.to_str()?),
            None => AWS_CHUNKED.to_string(),
        };
        parts.headers.insert(
            header::CONTENT_ENCODING,
            HeaderValue::from_str(&content_encoding)?,
        );
        parts.headers.insert(
            X_AMZ_DECODED_CONTENT_LENGTH,
            HeaderValue::from_str(&decoded_length.to_string())?,
        );
        parts.headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from_str(&framed_length.to_string())?,
        );
        if let Some(algorithm) = trailer {
            parts
                .headers
                .insert(X_AMZ_TRAILER, HeaderValue::from_static(algorithm.header_name()));
        }

        let sentinel = self.algorithm.streaming_payload(trailer.is_some());
        let output = self.sign_inner(
            parts,
            credential,
            SigningMethod::Header,
            sentinel.to_string(),
            true,
        )?;

        let key = self.key_cache.get_or_derive(
            credential,
            output.timestamp.date_naive(),
            &self.region,
            &self.service,
            self.algorithm,
        )?;
        // SAFETY: the algorithm was checked to be symmetric above
        let signing_key = key.hmac_secret().unwrap();

        Ok(ChunkSigningContext::new(
            signing_key,
            format_iso8601(output.timestamp),
            output.scope,
            output.signature,
        ))
    }

    fn sign_inner(
        &self,
        parts: &mut Parts,
        credential: &Credential,
        method: SigningMethod,
        payload_hash: String,
        set_content_sha256: bool,
    ) -> Result<SigningOutput> {
        credential.check()?;
        let now = self.time.unwrap_or_else(now);
        let mut signed_req = SigningRequest::build(parts)?;

        // canonicalize context
        self.canonicalize_header(
            &mut signed_req,
            method,
            credential,
            now,
            &payload_hash,
            set_content_sha256,
        )?;
        let signed_headers = signed_header_names(&signed_req.headers, &self.excluded_headers);
        self.canonicalize_query(&mut signed_req, method, credential, now, &signed_headers)?;

        // build canonical request and string to sign.
        let creq = canonical_request_string(
            &signed_req,
            &signed_headers,
            &payload_hash,
            PathEncoding {
                normalize: self.normalize_uri_path,
                double_encode: self.double_uri_encode,
            },
        )?;
        let encoded_req = hex_sha256(creq.as_bytes());

        // Scope: "20220313/<region>/<service>/aws4_request"; SigV4A scopes
        // to the date and service only, the region set travels separately.
        let scope = match self.algorithm {
            SigningAlgorithm::V4 => format!(
                "{}/{}/{}/aws4_request",
                format_date(now),
                self.region,
                self.service
            ),
            SigningAlgorithm::V4a => {
                format!("{}/{}/aws4_request", format_date(now), self.service)
            }
        };
        debug!("calculated scope: {scope}");

        // StringToSign:
        //
        // AWS4-HMAC-SHA256
        // 20220313T072004Z
        // 20220313/<region>/<service>/aws4_request
        // <hashed_canonical_request>
        let string_to_sign = {
            let mut f = String::new();
            writeln!(f, "{}", self.algorithm.id())?;
            writeln!(f, "{}", format_iso8601(now))?;
            writeln!(f, "{}", &scope)?;
            write!(f, "{}", &encoded_req)?;
            f
        };
        debug!("calculated string to sign: {string_to_sign}");

        let signing_key = self.key_cache.get_or_derive(
            credential,
            now.date_naive(),
            &self.region,
            &self.service,
            self.algorithm,
        )?;
        let signature = signing_key.sign(string_to_sign.as_bytes());

        match method {
            SigningMethod::Query(_) => {
                signed_req.query_push("X-Amz-Signature", signature.clone());
            }
            SigningMethod::Header => {
                let mut authorization = HeaderValue::from_str(&format!(
                    "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                    self.algorithm.id(),
                    credential.access_key_id,
                    scope,
                    signed_headers.join(";"),
                    signature
                ))?;
                authorization.set_sensitive(true);

                signed_req
                    .headers
                    .insert(header::AUTHORIZATION, authorization);
            }
        }

        // Apply to the request.
        signed_req.apply(parts)?;

        Ok(SigningOutput {
            signature,
            timestamp: now,
            scope,
        })
    }

    fn canonicalize_header(
        &self,
        ctx: &mut SigningRequest,
        method: SigningMethod,
        credential: &Credential,
        now: DateTime,
        payload_hash: &str,
        set_content_sha256: bool,
    ) -> Result<()> {
        // Header names and values need to be normalized according to Step 4 of https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html
        for (_, value) in ctx.headers.iter_mut() {
            SigningRequest::header_value_normalize(value)
        }

        // Insert HOST header if not present.
        if ctx.headers.get(header::HOST).is_none() {
            ctx.headers
                .insert(header::HOST, ctx.authority.as_str().parse()?);
        }

        if method == SigningMethod::Header {
            // Pin the date header to the signing timestamp so the canonical
            // request and the string-to-sign always agree.
            ctx.headers
                .insert(X_AMZ_DATE, HeaderValue::try_from(format_iso8601(now))?);

            if set_content_sha256 {
                ctx.headers
                    .insert(X_AMZ_CONTENT_SHA_256, HeaderValue::from_str(payload_hash)?);
            }

            // Insert X_AMZ_SECURITY_TOKEN header if security token exists.
            if let Some(token) = &credential.session_token {
                let mut value = HeaderValue::from_str(token)?;
                // Set token value sensitive to avoid leaking.
                value.set_sensitive(true);

                ctx.headers.insert(X_AMZ_SECURITY_TOKEN, value);
            }

            if self.algorithm == SigningAlgorithm::V4a {
                ctx.headers
                    .insert(X_AMZ_REGION_SET, HeaderValue::from_str(&self.region)?);
            }
        }

        Ok(())
    }

    fn canonicalize_query(
        &self,
        ctx: &mut SigningRequest,
        method: SigningMethod,
        credential: &Credential,
        now: DateTime,
        signed_headers: &[String],
    ) -> Result<()> {
        if let SigningMethod::Query(expire) = method {
            // A re-presigned request must not carry its previous signature
            // into the canonical form.
            ctx.query.retain(|(k, _)| k != "X-Amz-Signature");

            ctx.query_push("X-Amz-Algorithm", self.algorithm.id());
            let credential_scope = match self.algorithm {
                SigningAlgorithm::V4 => format!(
                    "{}/{}/{}/{}/aws4_request",
                    credential.access_key_id,
                    format_date(now),
                    self.region,
                    self.service
                ),
                SigningAlgorithm::V4a => format!(
                    "{}/{}/{}/aws4_request",
                    credential.access_key_id,
                    format_date(now),
                    self.service
                ),
            };
            ctx.query_push("X-Amz-Credential", credential_scope);
            ctx.query_push("X-Amz-Date", format_iso8601(now));
            ctx.query_push("X-Amz-Expires", expire.as_secs().to_string());
            ctx.query_push("X-Amz-SignedHeaders", signed_headers.join(";"));

            if self.algorithm == SigningAlgorithm::V4a {
                ctx.query_push("X-Amz-Region-Set", self.region.clone());
            }
            if let Some(token) = &credential.session_token {
                ctx.query_push("X-Amz-Security-Token", token.clone());
            }
        }

        // Return if query is empty.
        if ctx.query.is_empty() {
            return Ok(());
        }

        // Encode, then sort by encoded key and value.
        ctx.query = ctx
            .query
            .iter()
            .map(|(k, v)| {
                (
                    utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string(),
                    utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string(),
                )
            })
            .collect();
        ctx.query.sort();

        Ok(())
    }
}

struct SigningOutput {
    signature: String,
    timestamp: DateTime,
    scope: String,
}
