//! Digests and the digest functions the cache understands.
//!
//! A [`Digest`] is the `(hash, size)` pair clients address blobs by. `hash`
//! is always lowercase hex; `size` is the uncompressed byte length. Which
//! hash function produced `hash` is not encoded in the digest itself — it's
//! carried alongside as a [`DigestFunction`], matching how a Remote
//! Execution API client picks one function per instance.

use sha2::{Digest as _, Sha256, Sha384, Sha512};
use sha1::Sha1;
use md5::Md5;

/// Supported digest functions. Hex length is fixed per function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DigestFunction {
    Sha256,
    Sha384,
    Sha512,
    Sha1,
    Md5,
}

impl DigestFunction {
    /// Hex-encoded length of a hash produced by this function.
    pub fn hex_len(self) -> usize {
        match self {
            DigestFunction::Sha256 => 64,
            DigestFunction::Sha384 => 96,
            DigestFunction::Sha512 => 128,
            DigestFunction::Sha1 => 40,
            DigestFunction::Md5 => 32,
        }
    }

    /// The well-known hash of the empty byte string under this function.
    /// Empty blobs are never materialised on disk; this constant is how we
    /// recognise the short-circuit.
    pub fn empty_hash(self) -> &'static str {
        empty_hash(self)
    }

    fn hasher(self) -> IncrementalHasher {
        match self {
            DigestFunction::Sha256 => IncrementalHasher::Sha256(Sha256::new()),
            DigestFunction::Sha384 => IncrementalHasher::Sha384(Sha384::new()),
            DigestFunction::Sha512 => IncrementalHasher::Sha512(Sha512::new()),
            DigestFunction::Sha1 => IncrementalHasher::Sha1(Sha1::new()),
            DigestFunction::Md5 => IncrementalHasher::Md5(Md5::new()),
        }
    }

    /// Hash a full buffer in one shot.
    pub fn hash_bytes(self, data: &[u8]) -> String {
        let mut h = self.hasher();
        h.update(data);
        h.finalize_hex()
    }
}

/// An incremental hasher over one of the supported digest functions, used by
/// the codec to hash chunks as they stream past without buffering the whole
/// blob.
pub enum IncrementalHasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Sha1(Sha1),
    Md5(Md5),
}

impl IncrementalHasher {
    pub fn new(func: DigestFunction) -> Self {
        func.hasher()
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            IncrementalHasher::Sha256(h) => h.update(data),
            IncrementalHasher::Sha384(h) => h.update(data),
            IncrementalHasher::Sha512(h) => h.update(data),
            IncrementalHasher::Sha1(h) => h.update(data),
            IncrementalHasher::Md5(h) => h.update(data),
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            IncrementalHasher::Sha256(h) => hex::encode(h.finalize()),
            IncrementalHasher::Sha384(h) => hex::encode(h.finalize()),
            IncrementalHasher::Sha512(h) => hex::encode(h.finalize()),
            IncrementalHasher::Sha1(h) => hex::encode(h.finalize()),
            IncrementalHasher::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

/// A `(hash, size)` pair identifying a blob. `hash` is lowercase hex;
/// `size` is the uncompressed length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Digest {
    pub hash: String,
    pub size: i64,
}

impl Digest {
    pub fn new(hash: impl Into<String>, size: i64) -> Self {
        Self { hash: hash.into(), size }
    }

    /// Whether this digest names the well-known empty blob under `func`.
    pub fn is_empty_blob(&self, func: DigestFunction) -> bool {
        self.size == 0 && self.hash.eq_ignore_ascii_case(empty_hash(func))
    }
}

/// The well-known empty-input hash for each digest function.
pub fn empty_hash(func: DigestFunction) -> &'static str {
    match func {
        DigestFunction::Sha256 => {
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        }
        DigestFunction::Sha384 => {
            "38b060a751ac96384cd9327eb1b1e36a21fdb71114be07434c0cc7bf63f6e1da274edebfe76f65fbd51ad2f14898b95b"
        }
        DigestFunction::Sha512 => {
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
        }
        DigestFunction::Sha1 => "da39a3ee5e6b4b0d3255bfef95601890afd80709",
        DigestFunction::Md5 => "d41d8cd98f00b204e9800998ecf8427e",
    }
}
