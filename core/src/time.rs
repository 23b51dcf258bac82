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

//! Time related utils.

use chrono::Utc;

use crate::Error;

/// The timestamp used by signers.
///
/// Signers take the timestamp as an explicit input so that an external
/// retry layer can re-sign with a server-corrected time after a clock-skew
/// rejection; [`now`] is only a convenience default.
pub type DateTime = chrono::DateTime<Utc>;

/// Create a new DateTime with the current UTC time.
pub fn now() -> DateTime {
    Utc::now()
}

/// Format a DateTime to date like `20220301`.
pub fn format_date(t: DateTime) -> String {
    t.format("%Y%m%d").to_string()
}

/// Format a DateTime to ISO8601 basic like `20220301T120000Z`.
pub fn format_iso8601(t: DateTime) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Parse an ISO8601 basic timestamp like `20220301T120000Z`.
pub fn parse_iso8601(s: &str) -> crate::Result<DateTime> {
    let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%SZ")
        .map_err(|e| Error::unexpected(format!("invalid timestamp: {s}")).with_source(e))?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format_round_trip() {
        let t = parse_iso8601("20130524T000000Z").expect("must parse");
        assert_eq!(format_iso8601(t), "20130524T000000Z");
        assert_eq!(format_date(t), "20130524");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_iso8601("2013-05-24 00:00:00").is_err());
    }
}
