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

use std::mem;
use std::str::FromStr;
use std::time::Duration;

use http::uri::Authority;
use http::uri::PathAndQuery;
use http::uri::Scheme;
use http::HeaderMap;
use http::HeaderValue;
use http::Method;
use http::Uri;

use crate::Error;
use crate::Result;

/// Signing context for request.
///
/// A `SigningRequest` is the decomposed form of an
/// `http::request::Parts`: the pieces a signer canonicalizes, owned and
/// mutable, taken out of the request and returned to it by [`apply`].
///
/// [`apply`]: SigningRequest::apply
#[derive(Debug)]
pub struct SigningRequest {
    /// HTTP method.
    pub method: Method,
    /// HTTP scheme.
    pub scheme: Scheme,
    /// HTTP authority.
    pub authority: Authority,
    /// HTTP path.
    pub path: String,
    /// HTTP query parameters.
    pub query: Vec<(String, String)>,
    /// HTTP headers.
    pub headers: HeaderMap,
}

impl SigningRequest {
    /// Build a signing context from http::request::Parts.
    pub fn build(parts: &mut http::request::Parts) -> Result<Self> {
        let uri = mem::take(&mut parts.uri).into_parts();
        let paq = uri
            .path_and_query
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Ok(SigningRequest {
            method: parts.method.clone(),
            scheme: uri.scheme.unwrap_or(Scheme::HTTP),
            authority: uri.authority.ok_or_else(|| {
                Error::request_malformed("request without authority is invalid for signing")
            })?,
            path: paq.path().to_string(),
            query: paq
                .query()
                .map(|v| {
                    form_urlencoded::parse(v.as_bytes())
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect()
                })
                .unwrap_or_default(),

            // Take the headers out of the request to avoid copy.
            // We will return it back when apply the context.
            headers: mem::take(&mut parts.headers),
        })
    }

    /// Apply the signing context back to http::request::Parts.
    pub fn apply(mut self, parts: &mut http::request::Parts) -> Result<()> {
        let query_size = self.query_size();

        // Return headers back.
        mem::swap(&mut parts.headers, &mut self.headers);
        parts.method = self.method;
        parts.uri = {
            let mut uri_parts = mem::take(&mut parts.uri).into_parts();
            uri_parts.scheme = Some(self.scheme);
            uri_parts.authority = Some(self.authority);
            // Build path and query.
            uri_parts.path_and_query = {
                let paq = if query_size == 0 {
                    self.path
                } else {
                    let mut s = self.path;
                    s.reserve(query_size + 1);

                    s.push('?');
                    for (i, (k, v)) in self.query.iter().enumerate() {
                        if i > 0 {
                            s.push('&');
                        }

                        s.push_str(k);
                        if !v.is_empty() {
                            s.push('=');
                            s.push_str(v);
                        }
                    }

                    s
                };

                Some(PathAndQuery::from_str(&paq)?)
            };
            Uri::from_parts(uri_parts)?
        };

        Ok(())
    }

    /// Get query size.
    #[inline]
    pub fn query_size(&self) -> usize {
        self.query
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum::<usize>()
    }

    /// Push a new query pair into query list.
    #[inline]
    pub fn query_push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    /// Normalize header value the way canonicalization wants it: leading
    /// and trailing whitespace trimmed, internal runs of whitespace
    /// collapsed into a single space. Runs inside a double-quoted section
    /// are preserved.
    pub fn header_value_normalize(v: &mut HeaderValue) {
        let bs = v.as_bytes();

        let mut out = Vec::with_capacity(bs.len());
        let mut in_quotes = false;
        let mut pending_space = false;
        for &b in bs {
            if b == b'"' {
                in_quotes = !in_quotes;
            }
            if !in_quotes && (b == b' ' || b == b'\t') {
                // Leading whitespace never emits.
                pending_space = !out.is_empty();
                continue;
            }
            if pending_space {
                out.push(b' ');
                pending_space = false;
            }
            out.push(b);
        }

        // This can't fail because we started with a valid HeaderValue and then
        // only removed or replaced whitespace
        *v = HeaderValue::from_bytes(&out).expect("invalid header value")
    }

    /// Get header names as sorted vector.
    pub fn header_name_to_vec_sorted(&self) -> Vec<&str> {
        let mut h = self
            .headers
            .keys()
            .map(|k| k.as_str())
            .collect::<Vec<&str>>();
        h.sort_unstable();

        h
    }
}

/// SigningMethod is the method that used in signing.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum SigningMethod {
    /// Signing with header.
    Header,
    /// Signing with query, a.k.a. presigning, valid for the given duration.
    Query(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parts_of(uri: &'static str) -> http::request::Parts {
        let mut req = http::Request::new(());
        *req.uri_mut() = uri.parse().expect("uri must be valid");
        req.into_parts().0
    }

    #[test]
    fn test_build_and_apply_round_trip() {
        let mut parts = parts_of("https://example.amazonaws.com/hello?foo=bar&empty");

        let req = SigningRequest::build(&mut parts).expect("must build");
        assert_eq!(req.path, "/hello");
        assert_eq!(
            req.query,
            vec![
                ("foo".to_string(), "bar".to_string()),
                ("empty".to_string(), "".to_string())
            ]
        );

        req.apply(&mut parts).expect("must apply");
        assert_eq!(
            parts.uri.to_string(),
            "https://example.amazonaws.com/hello?foo=bar&empty"
        );
    }

    #[test]
    fn test_build_without_authority() {
        let mut parts = http::Request::new(()).into_parts().0;
        assert!(SigningRequest::build(&mut parts).is_err());
    }

    #[test]
    fn test_header_value_normalize() {
        let cases = vec![
            ("  a   b  c ", "a b c"),
            ("no-op", "no-op"),
            ("\"  quoted   run \"  after", "\"  quoted   run \" after"),
            ("trailing\t", "trailing"),
        ];

        for (input, expected) in cases {
            let mut v = HeaderValue::from_str(input).expect("must be valid");
            SigningRequest::header_value_normalize(&mut v);
            assert_eq!(v.to_str().unwrap(), expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_header_name_to_vec_sorted() {
        let mut parts = parts_of("https://example.amazonaws.com/");
        parts.headers.insert("x-amz-date", "a".parse().unwrap());
        parts.headers.insert("host", "b".parse().unwrap());
        parts.headers.insert("range", "c".parse().unwrap());

        let req = SigningRequest::build(&mut parts).expect("must build");
        assert_eq!(
            req.header_name_to_vec_sorted(),
            vec!["host", "range", "x-amz-date"]
        );
    }
}
