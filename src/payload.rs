//! Request payload handling.
//!
//! The payload of a request must be hashed before it can be signed, but
//! a transport consumes its body as a plain reader with no way to rewind
//! it. [`Payload`] describes how the digest is obtained and whether the
//! signer hands a fresh body to the transport afterwards.

use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

use sha2::Digest;
use sha2::Sha256;

use crate::error::{Error, ErrorKind, Result};

/// Readers that can be rewound between the hashing pass and transport.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Body handed to the transport after signing.
pub enum Body {
    /// No body.
    Empty,
    /// In-memory body; the transport knows its length up front.
    Bytes(Vec<u8>),
    /// Streaming body, positioned at offset 0.
    Reader(Box<dyn ReadSeek>),
}

/// How a request body is hashed and subsequently replayed to the
/// transport.
pub enum Payload {
    /// Body known in full; hashed in one shot and replayable at will.
    InMemory(Vec<u8>),
    /// Body is a random-access stream; hashed in one pass, then rewound
    /// for transport.
    Seekable(Box<dyn ReadSeek>),
    /// The caller already computed the digest. The signer leaves the
    /// transport body untouched; supplying it is the caller's business.
    PreHashed([u8; 32]),
}

impl Payload {
    /// Hash the payload.
    ///
    /// When a body is returned it is positioned at offset 0 and its
    /// content hashes to the returned digest.
    pub fn prepare(self) -> Result<(Option<Body>, [u8; 32])> {
        match self {
            Payload::InMemory(bytes) => {
                let digest = Sha256::digest(&bytes).into();
                Ok((Some(Body::Bytes(bytes)), digest))
            }
            Payload::Seekable(mut stream) => {
                stream.seek(SeekFrom::Start(0)).map_err(payload_io)?;

                let mut hasher = Sha256::new();
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let n = stream.read(&mut buf).map_err(payload_io)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }

                stream.seek(SeekFrom::Start(0)).map_err(payload_io)?;
                Ok((Some(Body::Reader(stream)), hasher.finalize().into()))
            }
            Payload::PreHashed(digest) => Ok((None, digest)),
        }
    }
}

fn payload_io(err: std::io::Error) -> Error {
    Error::new(ErrorKind::PayloadIo, "reading payload stream failed")
        .with_operation("payload::prepare")
        .set_source(err)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::hash::sha256;

    #[test]
    fn test_in_memory() {
        let (body, digest) = Payload::InMemory(b"foo=bar".to_vec())
            .prepare()
            .expect("must prepare");

        assert_eq!(digest, sha256(b"foo=bar"));
        match body {
            Some(Body::Bytes(bytes)) => assert_eq!(bytes, b"foo=bar"),
            _ => panic!("in-memory payload must yield a bytes body"),
        }
    }

    #[test]
    fn test_seekable_rewinds() {
        // Start mid-stream; prepare must still hash from offset 0 and
        // hand back a rewound reader.
        let mut cursor = Cursor::new(b"some archive bytes".to_vec());
        cursor.set_position(5);

        let (body, digest) = Payload::Seekable(Box::new(cursor))
            .prepare()
            .expect("must prepare");

        assert_eq!(digest, sha256(b"some archive bytes"));
        match body {
            Some(Body::Reader(mut reader)) => {
                let mut replay = Vec::new();
                reader.read_to_end(&mut replay).expect("read must succeed");
                assert_eq!(replay, b"some archive bytes");
            }
            _ => panic!("seekable payload must yield a reader body"),
        }
    }

    #[test]
    fn test_pre_hashed_yields_no_body() {
        let digest = sha256(b"already hashed");
        let (body, got) = Payload::PreHashed(digest).prepare().expect("must prepare");

        assert_eq!(got, digest);
        assert!(body.is_none());
    }
}
