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

//! AWS SigV4 and SigV4A request signer.
//!
//! Callers bring an already-resolved [`Credential`] and an
//! `http::request::Parts`; [`RequestSigner`] attaches a header signature,
//! a presigned query signature, or (for streamed bodies) the seed of a
//! [`ChunkedSigningStream`] that signs every chunk on the way out.

mod config;
pub use config::PayloadSigning;
pub use config::SigningAlgorithm;

mod credential;
pub use credential::Credential;

mod sign_request;
pub use sign_request::RequestSigner;
pub use sign_request::SignableBody;

mod chunked;
pub use chunked::encoded_length;
pub use chunked::ChecksumAlgorithm;
pub use chunked::ChunkSigningContext;
pub use chunked::ChunkedSigningStream;

mod canonical;
mod constants;
mod key;
