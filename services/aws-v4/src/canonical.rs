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

use http::header::{HeaderName, AUTHORIZATION, USER_AGENT};
use http::HeaderMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode};

use awsign_core::{Result, SigningRequest};

use crate::constants::AWS_URI_ENCODE_SET;

/// Knobs for URI path canonicalization.
///
/// The general SigV4 rule normalizes dot segments and URI-encodes the
/// (already encoded) path a second time. S3 requires the opposite on both
/// counts: the path is taken literally and encoded exactly once.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PathEncoding {
    pub normalize: bool,
    pub double_encode: bool,
}

/// Produce the canonical URI path: percent-decode, optionally normalize
/// `.`/`..` segments, then re-encode with the AWS unreserved set (`/`
/// preserved), twice when double encoding is requested.
pub(crate) fn canonicalize_path(path: &str, encoding: PathEncoding) -> Result<String> {
    let decoded = percent_decode_str(path).decode_utf8()?;
    let decoded = if encoding.normalize {
        normalize_dot_segments(&decoded)
    } else {
        decoded.into_owned()
    };

    let encoded = utf8_percent_encode(&decoded, &AWS_URI_ENCODE_SET).to_string();
    if encoding.double_encode {
        Ok(utf8_percent_encode(&encoded, &AWS_URI_ENCODE_SET).to_string())
    } else {
        Ok(encoded)
    }
}

/// Remove `.` segments and resolve `..` segments against their parent.
/// Always yields an absolute path; a trailing slash survives.
fn normalize_dot_segments(path: &str) -> String {
    let trailing_slash = path.ends_with('/');

    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    let mut out = String::with_capacity(path.len());
    out.push('/');
    out.push_str(&stack.join("/"));
    if trailing_slash && out.len() > 1 {
        out.push('/');
    }
    out
}

/// The sorted list of header names covered by the signature.
///
/// `authorization` is never signed (a retried request still carries the
/// previous attempt's header), and neither is `user-agent`, which proxies
/// rewrite freely. Callers exclude further headers via the signer's
/// exclusion set.
pub(crate) fn signed_header_names(headers: &HeaderMap, excluded: &[HeaderName]) -> Vec<String> {
    let mut names = headers
        .keys()
        .filter(|name| **name != AUTHORIZATION && **name != USER_AGENT)
        .filter(|name| !excluded.contains(name))
        .map(|name| name.as_str().to_string())
        .collect::<Vec<_>>();
    names.sort_unstable();

    names
}

/// Build the canonical request string.
///
/// The query pairs in `ctx` must already be canonically encoded and sorted
/// (the signer does this before calling); header values must already be
/// normalized. The output is byte-for-byte deterministic for a given
/// logical request.
pub(crate) fn canonical_request_string(
    ctx: &SigningRequest,
    signed_headers: &[String],
    payload_hash: &str,
    encoding: PathEncoding,
) -> Result<String> {
    // 256 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(256);

    writeln!(f, "{}", ctx.method)?;
    writeln!(f, "{}", canonicalize_path(&ctx.path, encoding)?)?;
    writeln!(
        f,
        "{}",
        ctx.query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    )?;
    for name in signed_headers {
        writeln!(f, "{}:{}", name, joined_header_values(&ctx.headers, name)?)?;
    }
    writeln!(f)?;
    writeln!(f, "{}", signed_headers.join(";"))?;
    write!(f, "{payload_hash}")?;

    Ok(f)
}

/// All values of a header, comma-joined in arrival order.
fn joined_header_values(headers: &HeaderMap, name: &str) -> Result<String> {
    let mut out = String::new();
    for (i, value) in headers.get_all(name).iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(value.to_str()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    const SINGLE: PathEncoding = PathEncoding {
        normalize: false,
        double_encode: false,
    };
    const DOUBLE: PathEncoding = PathEncoding {
        normalize: true,
        double_encode: true,
    };

    #[test_case("/", "/"; "root")]
    #[test_case("/test.txt", "/test.txt"; "plain")]
    #[test_case("/test$file.text", "/test%24file.text"; "reserved char")]
    #[test_case("/ሴ", "/%E1%88%B4"; "utf8")]
    #[test_case("/documents%20and%20settings", "/documents%20and%20settings"; "already encoded space")]
    fn test_canonicalize_path_single(path: &str, expected: &str) {
        assert_eq!(canonicalize_path(path, SINGLE).unwrap(), expected);
    }

    #[test_case("/documents%20and%20settings", "/documents%2520and%2520settings"; "percent is re-encoded")]
    #[test_case("/example/..", "/"; "parent segment")]
    #[test_case("/./example", "/example"; "dot segment")]
    #[test_case("/a/b/../c/", "/a/c/"; "trailing slash survives")]
    fn test_canonicalize_path_double(path: &str, expected: &str) {
        assert_eq!(canonicalize_path(path, DOUBLE).unwrap(), expected);
    }

    #[test]
    fn test_signed_header_names_skips_unsignable() {
        let mut headers = HeaderMap::new();
        headers.insert("host", "example.amazonaws.com".parse().unwrap());
        headers.insert("authorization", "AWS4-HMAC-SHA256 ...".parse().unwrap());
        headers.insert("user-agent", "curl/8.0".parse().unwrap());
        headers.insert("x-amz-date", "20150830T123600Z".parse().unwrap());
        headers.insert("x-ignore-me", "1".parse().unwrap());

        let excluded = vec![HeaderName::from_static("x-ignore-me")];
        assert_eq!(
            signed_header_names(&headers, &excluded),
            vec!["host", "x-amz-date"]
        );
    }

    #[test]
    fn test_duplicate_headers_join_in_arrival_order() {
        let mut headers = HeaderMap::new();
        headers.append("my-header", "value2".parse().unwrap());
        headers.append("my-header", "value1".parse().unwrap());

        assert_eq!(
            joined_header_values(&headers, "my-header").unwrap(),
            "value2,value1"
        );
    }
}
