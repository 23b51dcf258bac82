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

//! `aws-chunked` encoding with per-chunk signatures.
//!
//! A streamed body is re-framed into length-prefixed chunks, each carrying
//! an HMAC signature chained to the previous chunk's signature and seeded
//! by the request's header signature:
//!
//! ```text
//! <hex-chunk-size>;chunk-signature=<sig>\r\n
//! <chunk-data>\r\n
//! ...
//! 0;chunk-signature=<final-sig>\r\n
//! \r\n
//! ```
//!
//! With a trailing checksum configured, the terminal chunk is followed by
//! a signed trailer section instead of the bare CRLF:
//!
//! ```text
//! 0;chunk-signature=<final-sig>\r\n
//! x-amz-checksum-<algorithm>:<base64-value>\r\n
//! x-amz-trailer-signature:<trailer-sig>\r\n
//! \r\n
//! ```
//!
//! The wire format uses CRLF line endings, but the trailer
//! string-to-sign hashes the LF-terminated canonical form of the trailer
//! line, per the SigV4 streaming documentation.

use std::fmt::{Debug, Formatter};
use std::io;
use std::io::Read;

use sha1::Digest as _;
use sha1::Sha1;
use sha2::Sha256;

use awsign_core::hash::{base64_encode, hex_hmac_sha256, hex_sha256};

use crate::constants::{
    AWS4_HMAC_SHA256_PAYLOAD, AWS4_HMAC_SHA256_TRAILER, EMPTY_STRING_SHA256,
    X_AMZ_TRAILER_SIGNATURE,
};

/// Size of every data chunk except the last. Fixed by the implementation,
/// not the caller: the framed content length is computed from it before
/// any bytes flow.
const CHUNK_SIZE: usize = 64 * 1024;

/// `";chunk-signature=" + 64 hex chars`, the per-chunk framing overhead
/// beyond the size prefix and CRLFs.
const SIGNATURE_OVERHEAD: u64 = 17 + 64;

/// Checksum computed incrementally while the body streams and emitted as
/// a signed trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// CRC32 (IEEE), 4 byte digest.
    Crc32,
    /// SHA-1, 20 byte digest.
    Sha1,
    /// SHA-256, 32 byte digest.
    Sha256,
}

impl ChecksumAlgorithm {
    /// The trailer header carrying this checksum.
    pub fn header_name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32 => "x-amz-checksum-crc32",
            ChecksumAlgorithm::Sha1 => "x-amz-checksum-sha1",
            ChecksumAlgorithm::Sha256 => "x-amz-checksum-sha256",
        }
    }

    /// Length of the base64 encoded digest.
    fn encoded_value_len(&self) -> u64 {
        match self {
            ChecksumAlgorithm::Crc32 => 8,
            ChecksumAlgorithm::Sha1 => 28,
            ChecksumAlgorithm::Sha256 => 44,
        }
    }

    fn hasher(&self) -> ChecksumHasher {
        match self {
            ChecksumAlgorithm::Crc32 => ChecksumHasher::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgorithm::Sha1 => ChecksumHasher::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => ChecksumHasher::Sha256(Sha256::new()),
        }
    }
}

enum ChecksumHasher {
    Crc32(crc32fast::Hasher),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl ChecksumHasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            ChecksumHasher::Crc32(h) => h.update(data),
            ChecksumHasher::Sha1(h) => h.update(data),
            ChecksumHasher::Sha256(h) => h.update(data),
        }
    }

    fn finalize(self) -> String {
        match self {
            ChecksumHasher::Crc32(h) => base64_encode(&h.finalize().to_be_bytes()),
            ChecksumHasher::Sha1(h) => base64_encode(h.finalize().as_slice()),
            ChecksumHasher::Sha256(h) => base64_encode(h.finalize().as_slice()),
        }
    }
}

/// Everything chunk signing needs from the header signature: the derived
/// key, the formatted timestamp, the credential scope, and the header
/// signature that seeds the chain.
///
/// `Clone` so that an external retry can build a fresh stream for a fresh
/// body source; the retry restarts at chunk 0 from the original seed, it
/// never resumes a chain.
#[derive(Clone)]
pub struct ChunkSigningContext {
    signing_key: [u8; 32],
    date_time: String,
    scope: String,
    seed_signature: String,
}

impl Debug for ChunkSigningContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkSigningContext")
            .field("signing_key", &"***")
            .field("date_time", &self.date_time)
            .field("scope", &self.scope)
            .field("seed_signature", &self.seed_signature)
            .finish()
    }
}

impl ChunkSigningContext {
    /// Assemble a context from its parts. `RequestSigner::sign_streaming`
    /// does this for you.
    pub fn new(
        signing_key: [u8; 32],
        date_time: String,
        scope: String,
        seed_signature: String,
    ) -> Self {
        Self {
            signing_key,
            date_time,
            scope,
            seed_signature,
        }
    }

    /// The header signature seeding chunk 0.
    pub fn seed_signature(&self) -> &str {
        &self.seed_signature
    }

    fn sign_chunk(&self, prev_signature: &str, chunk_hash: &str) -> String {
        let string_to_sign = format!(
            "{AWS4_HMAC_SHA256_PAYLOAD}\n{}\n{}\n{prev_signature}\n{EMPTY_STRING_SHA256}\n{chunk_hash}",
            self.date_time, self.scope,
        );
        hex_hmac_sha256(&self.signing_key, string_to_sign.as_bytes())
    }

    fn sign_trailer(&self, prev_signature: &str, trailer_hash: &str) -> String {
        let string_to_sign = format!(
            "{AWS4_HMAC_SHA256_TRAILER}\n{}\n{}\n{prev_signature}\n{trailer_hash}",
            self.date_time, self.scope,
        );
        hex_hmac_sha256(&self.signing_key, string_to_sign.as_bytes())
    }
}

/// The framed length of a `decoded_length` byte body after `aws-chunked`
/// encoding, including every chunk header, the terminal zero-length chunk
/// and the optional signed trailer.
///
/// This is the value `content-length` must carry, and it is computable
/// before any bytes flow because the chunk size is fixed.
pub fn encoded_length(decoded_length: u64, trailer: Option<ChecksumAlgorithm>) -> u64 {
    fn hex_len(n: u64) -> u64 {
        format!("{n:x}").len() as u64
    }

    let chunk = CHUNK_SIZE as u64;
    let full_chunks = decoded_length / chunk;
    let last_chunk = decoded_length % chunk;

    let mut length = full_chunks * (hex_len(chunk) + SIGNATURE_OVERHEAD + 2 + chunk + 2);
    if last_chunk > 0 {
        length += hex_len(last_chunk) + SIGNATURE_OVERHEAD + 2 + last_chunk + 2;
    }

    // Terminal zero-length chunk.
    length += 1 + SIGNATURE_OVERHEAD + 2;

    match trailer {
        // Encoding terminator.
        None => length += 2,
        Some(algorithm) => {
            // Checksum line, trailer signature line, encoding terminator.
            length += algorithm.header_name().len() as u64 + 1 + algorithm.encoded_value_len() + 2;
            length += X_AMZ_TRAILER_SIGNATURE.len() as u64 + 1 + 64 + 2;
            length += 2;
        }
    }

    length
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Emitting signed data chunks, then the terminal zero-length chunk.
    Streaming,
    /// Emitting the signed checksum trailer.
    Trailer,
    /// Exhausted. Further reads yield end-of-stream.
    Done,
}

/// Wraps a byte source into the signed `aws-chunked` wire format.
///
/// The stream is pull-based, forward-only and single-consumer: each
/// signature is a function of the previous one, so it cannot be restarted
/// or read concurrently. The emitted bytes are independent of how the
/// consumer partitions its reads, because framing is driven entirely by
/// the fixed chunk size and the declared body length.
///
/// Exactly `decoded_length` bytes are pulled from the source; a source
/// that runs dry earlier fails the stream with `UnexpectedEof`.
pub struct ChunkedSigningStream<R> {
    source: R,
    context: ChunkSigningContext,
    prev_signature: String,
    remaining: u64,
    phase: Phase,
    checksum: Option<(ChecksumAlgorithm, ChecksumHasher)>,

    chunk: Vec<u8>,
    out: Vec<u8>,
    pos: usize,
}

impl<R: Read> ChunkedSigningStream<R> {
    /// Wrap `source`, which must yield exactly `decoded_length` bytes,
    /// into the signed chunk envelope seeded by `context`.
    pub fn new(source: R, decoded_length: u64, context: ChunkSigningContext) -> Self {
        Self::with_trailer_opt(source, decoded_length, context, None)
    }

    /// Like [`new`], additionally computing `algorithm` over the body while
    /// it streams and emitting it as a signed trailer.
    ///
    /// [`new`]: ChunkedSigningStream::new
    pub fn with_trailer(
        source: R,
        decoded_length: u64,
        context: ChunkSigningContext,
        algorithm: ChecksumAlgorithm,
    ) -> Self {
        Self::with_trailer_opt(source, decoded_length, context, Some(algorithm))
    }

    fn with_trailer_opt(
        source: R,
        decoded_length: u64,
        context: ChunkSigningContext,
        trailer: Option<ChecksumAlgorithm>,
    ) -> Self {
        let prev_signature = context.seed_signature.clone();
        Self {
            source,
            context,
            prev_signature,
            remaining: decoded_length,
            phase: Phase::Streaming,
            checksum: trailer.map(|a| (a, a.hasher())),

            chunk: Vec::new(),
            out: Vec::new(),
            pos: 0,
        }
    }

    /// Pull the next chunk worth of bytes out of the source. Short reads
    /// are retried until the chunk is complete; only the declared body
    /// length is ever requested.
    fn fill_chunk(&mut self) -> io::Result<()> {
        let want = self.remaining.min(CHUNK_SIZE as u64) as usize;
        self.chunk.resize(want, 0);

        let mut filled = 0;
        while filled < want {
            match self.source.read(&mut self.chunk[filled..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "body ended {} bytes short of its declared length",
                            self.remaining - filled as u64
                        ),
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.remaining -= want as u64;

        Ok(())
    }

    /// Produce the next piece of wire output into `self.out`.
    fn advance(&mut self) -> io::Result<()> {
        self.out.clear();
        self.pos = 0;

        match self.phase {
            Phase::Streaming => {
                self.fill_chunk()?;

                if let Some((_, hasher)) = &mut self.checksum {
                    hasher.update(&self.chunk);
                }

                let chunk_hash = if self.chunk.is_empty() {
                    EMPTY_STRING_SHA256.to_string()
                } else {
                    hex_sha256(&self.chunk)
                };
                let signature = self.context.sign_chunk(&self.prev_signature, &chunk_hash);
                self.prev_signature = signature.clone();

                let header = format!("{:x};chunk-signature={signature}\r\n", self.chunk.len());
                self.out.reserve(header.len() + self.chunk.len() + 2);
                self.out.extend_from_slice(header.as_bytes());
                self.out.extend_from_slice(&self.chunk);

                if self.chunk.is_empty() {
                    // Terminal chunk: either the encoding terminator or the
                    // trailer section follows.
                    if self.checksum.is_some() {
                        self.phase = Phase::Trailer;
                    } else {
                        self.out.extend_from_slice(b"\r\n");
                        self.phase = Phase::Done;
                    }
                } else {
                    self.out.extend_from_slice(b"\r\n");
                }
            }
            Phase::Trailer => {
                let (algorithm, hasher) = self.checksum.take().expect("trailer phase has checksum");
                let line = format!("{}:{}", algorithm.header_name(), hasher.finalize());

                // The canonical form of the trailer is LF terminated even
                // though the wire uses CRLF.
                let trailer_hash = hex_sha256(format!("{line}\n").as_bytes());
                let signature = self.context.sign_trailer(&self.prev_signature, &trailer_hash);
                self.prev_signature = signature.clone();

                self.out
                    .extend_from_slice(format!("{line}\r\n").as_bytes());
                self.out.extend_from_slice(
                    format!("{X_AMZ_TRAILER_SIGNATURE}:{signature}\r\n\r\n").as_bytes(),
                );
                self.phase = Phase::Done;
            }
            Phase::Done => {}
        }

        Ok(())
    }
}

impl<R: Read> Read for ChunkedSigningStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pos >= self.out.len() {
            if self.phase == Phase::Done {
                return Ok(0);
            }
            self.advance()?;
        }

        let n = buf.len().min(self.out.len() - self.pos);
        buf[..n].copy_from_slice(&self.out[self.pos..self.pos + n]);
        self.pos += n;

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // The streaming PUT example from the S3 SigV4 documentation: 66560
    // bytes of 'a' uploaded in 64 KiB chunks with the seed signature below.
    fn docs_context() -> ChunkSigningContext {
        ChunkSigningContext::new(
            // Signing key for
            // wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY/20130524/us-east-1/s3.
            [
                0x98, 0xf1, 0xd8, 0x89, 0xfe, 0xc4, 0xf4, 0x42, 0x1a, 0xdc, 0x52, 0x2b, 0xab,
                0x0c, 0xe1, 0xf8, 0x2c, 0x6c, 0x4e, 0x4e, 0xc3, 0x9a, 0xe1, 0xf6, 0xcc, 0xf2,
                0x0e, 0x8f, 0x40, 0x89, 0x45, 0x65,
            ],
            "20130524T000000Z".to_string(),
            "20130524/us-east-1/s3/aws4_request".to_string(),
            "4f232c4386841ef735655705268965c44a0e4690baa4adea153f7db9fa80a0a9".to_string(),
        )
    }

    fn read_all(stream: &mut impl Read, step: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; step];
        loop {
            let n = stream.read(&mut buf).expect("read must succeed");
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn test_chunk_signatures_match_published_example() {
        let ctx = docs_context();

        let chunk1 = ctx.sign_chunk(
            ctx.seed_signature(),
            &hex_sha256(&vec![b'a'; 64 * 1024]),
        );
        assert_eq!(
            chunk1,
            "ad80c730a21e5b8d04586a2213dd63b9a0e99e0e2307b0ade35a65485a288648"
        );

        let chunk2 = ctx.sign_chunk(&chunk1, &hex_sha256(&vec![b'a'; 1024]));
        assert_eq!(
            chunk2,
            "0055627c9e194cb4542bae2aa5492e3c1575bbb81b612b7d234b86a503ef5497"
        );

        let chunk3 = ctx.sign_chunk(&chunk2, EMPTY_STRING_SHA256);
        assert_eq!(
            chunk3,
            "b6c6ea8a5354eaf15b3cb7646744f4275b71ea724fed81ceb9323e279d449df9"
        );
    }

    #[test]
    fn test_wire_format_of_published_example() {
        let payload = vec![b'a'; 66560];
        let mut stream = ChunkedSigningStream::new(payload.as_slice(), 66560, docs_context());
        let wire = read_all(&mut stream, 8192);

        assert_eq!(wire.len() as u64, encoded_length(66560, None));
        assert_eq!(wire.len(), 66824);

        let text = String::from_utf8_lossy(&wire);
        assert!(text.starts_with(
            "10000;chunk-signature=ad80c730a21e5b8d04586a2213dd63b9a0e99e0e2307b0ade35a65485a288648\r\n"
        ));
        assert!(text.contains(
            "400;chunk-signature=0055627c9e194cb4542bae2aa5492e3c1575bbb81b612b7d234b86a503ef5497\r\n"
        ));
        assert!(text.ends_with(
            "0;chunk-signature=b6c6ea8a5354eaf15b3cb7646744f4275b71ea724fed81ceb9323e279d449df9\r\n\r\n"
        ));
    }

    #[test]
    fn test_output_is_independent_of_consumer_read_size() {
        let payload: Vec<u8> = (0..72 * 1024).map(|i| (i % 251) as u8).collect();

        let mut wires = Vec::new();
        for step in [1usize, 16, 1 << 20] {
            let mut stream =
                ChunkedSigningStream::new(payload.as_slice(), payload.len() as u64, docs_context());
            wires.push(read_all(&mut stream, step));
        }

        assert_eq!(wires[0], wires[1]);
        assert_eq!(wires[1], wires[2]);
        assert_eq!(wires[0].len() as u64, encoded_length(72 * 1024, None));
    }

    #[test]
    fn test_wire_reconstructs_payload() {
        let payload: Vec<u8> = (0..72 * 1024).map(|i| (i % 13) as u8).collect();
        let mut stream =
            ChunkedSigningStream::new(payload.as_slice(), payload.len() as u64, docs_context());
        let wire = read_all(&mut stream, 4096);

        // Parse the framing back: every chunk is `<hex>;chunk-signature=<sig>\r\n<data>\r\n`.
        let mut reconstructed = Vec::new();
        let mut rest = &wire[..];
        loop {
            let header_end = rest.windows(2).position(|w| w == b"\r\n").unwrap();
            let header = std::str::from_utf8(&rest[..header_end]).unwrap();
            let (size, signature) = header.split_once(";chunk-signature=").unwrap();
            let size = usize::from_str_radix(size, 16).unwrap();
            assert_eq!(signature.len(), 64);

            rest = &rest[header_end + 2..];
            reconstructed.extend_from_slice(&rest[..size]);
            rest = &rest[size + 2..];
            if size == 0 {
                break;
            }
        }
        assert_eq!(reconstructed, payload);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_tampering_is_detected_from_that_chunk_onward() {
        let ctx = docs_context();
        let chunk1_data = vec![b'x'; 1000];
        let chunk2_data = vec![b'y'; 1000];

        let chunk1 = ctx.sign_chunk(ctx.seed_signature(), &hex_sha256(&chunk1_data));
        let chunk2 = ctx.sign_chunk(&chunk1, &hex_sha256(&chunk2_data));

        // Altering chunk 2 leaves chunk 1's signature intact but changes
        // chunk 2's.
        let mut tampered = chunk2_data.clone();
        tampered[0] ^= 1;
        let chunk1_again = ctx.sign_chunk(ctx.seed_signature(), &hex_sha256(&chunk1_data));
        let chunk2_tampered = ctx.sign_chunk(&chunk1_again, &hex_sha256(&tampered));

        assert_eq!(chunk1, chunk1_again);
        assert_ne!(chunk2, chunk2_tampered);
    }

    #[test]
    fn test_short_source_fails_with_unexpected_eof() {
        let payload = vec![b'a'; 100];
        let mut stream = ChunkedSigningStream::new(payload.as_slice(), 200, docs_context());

        let mut buf = vec![0u8; 4096];
        let err = stream.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_trailer_framing_and_length() {
        let payload = b"trailer checksum payload".to_vec();
        let mut stream = ChunkedSigningStream::with_trailer(
            payload.as_slice(),
            payload.len() as u64,
            docs_context(),
            ChecksumAlgorithm::Crc32,
        );
        let wire = read_all(&mut stream, 7);

        assert_eq!(
            wire.len() as u64,
            encoded_length(payload.len() as u64, Some(ChecksumAlgorithm::Crc32))
        );

        let text = String::from_utf8_lossy(&wire);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        let expected = base64_encode(&hasher.finalize().to_be_bytes());

        assert!(text.contains("0;chunk-signature="));
        assert!(text.contains(&format!("x-amz-checksum-crc32:{expected}\r\n")));
        assert!(text.contains("x-amz-trailer-signature:"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_reads_after_done_yield_end_of_stream() {
        let payload = b"done".to_vec();
        let mut stream =
            ChunkedSigningStream::new(payload.as_slice(), payload.len() as u64, docs_context());
        let _ = read_all(&mut stream, 512);

        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_encoded_length_published_example() {
        assert_eq!(encoded_length(66560, None), 66824);
    }

    #[test]
    fn test_encoded_length_exact_chunk_multiple() {
        // 128 KiB: two full chunks, no partial chunk.
        let payload = vec![0u8; 128 * 1024];
        let mut stream =
            ChunkedSigningStream::new(payload.as_slice(), payload.len() as u64, docs_context());
        let wire = read_all(&mut stream, 65536);
        assert_eq!(wire.len() as u64, encoded_length(128 * 1024, None));
    }
}
