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

//! Core components for signing API requests.
//!
//! This crate provides the shared plumbing used by the awsign signer
//! crates: hashing primitives, SigV4-style timestamp formatting, the
//! [`SigningRequest`] decomposition of an `http::request::Parts`, and the
//! common [`Error`] type.
//!
//! Signing itself lives in the service crates (for example
//! `awsign-aws-v4`); everything here is pure, synchronous computation with
//! no I/O. Credential acquisition and the HTTP transport are deliberately
//! out of scope: callers hand the signer an already-resolved credential
//! and an `http` request, and get augmented parts (or a presigned URL)
//! back.

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod error;
pub use error::{Error, ErrorKind, Result};

mod request;
pub use request::{SigningMethod, SigningRequest};
