//! Streamed cryptographic digest of file contents (C3).
//!
//! Two algorithms: a 256-bit collision-resistant digest used by default for
//! integrity checks, and a faster 128-bit digest suitable for grouping
//! within a single machine. Reads happen in fixed-size chunks so arbitrarily
//! large files never need to be held in memory at once.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::xxh3_128;

use crate::error::{Error, Result};

/// Baseline chunk size for streamed digest reads.
pub const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Xxh3,
}

impl HashAlgorithm {
    pub const fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Xxh3 => 32,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Xxh3 => "xxh3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "xxh3" | "xxhash" | "xxh128" => Ok(HashAlgorithm::Xxh3),
            other => Err(Error::input(format!("unknown hash algorithm: {other}"))),
        }
    }
}

/// Lets `--algorithm` be a `clap` value-enum flag without the CLI crate
/// needing to implement a foreign trait on a foreign type.
impl clap::ValueEnum for HashAlgorithm {
    fn value_variants<'a>() -> &'a [Self] {
        &[HashAlgorithm::Sha256, HashAlgorithm::Xxh3]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.name()))
    }
}

/// An incremental hasher over one of the two supported algorithms.
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    // xxh3_128 has no streaming API in this crate's feature set; buffer.
    Xxh3(Vec<u8>),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Xxh3 => HasherState::Xxh3(Vec::new()),
        };
        Self { algorithm, state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(h) => h.update(data),
            HasherState::Xxh3(buf) => buf.extend_from_slice(data),
        }
    }

    pub fn finalize(self) -> String {
        match self.state {
            HasherState::Sha256(h) => format!("{:x}", h.finalize()),
            HasherState::Xxh3(buf) => format!("{:032x}", xxh3_128(&buf)),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

/// Compute a digest over an in-memory byte slice.
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Compute a digest over a reader, chunked at [`CHUNK_SIZE`].
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}

/// Digest the bytes of a regular file on disk.
///
/// Returns `Ok(None)` (never an error) on any I/O failure — directories,
/// unreadable files, and vanished paths all produce a digest-failure signal
/// rather than interrupting the executor's happy path.
pub fn digest_file(path: &Path, algorithm: HashAlgorithm) -> Option<String> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return None,
    };
    match file.metadata() {
        Ok(meta) if meta.is_file() => {}
        _ => return None,
    }
    hash_reader(algorithm, &mut file).ok()
}
