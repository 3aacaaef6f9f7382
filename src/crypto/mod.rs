// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Statement Encryption
//!
//! AES-256-GCM under a single static master key, one fresh 96-bit IV per file.
//!
//! ## File Format
//!
//! ```text
//! [12 bytes IV][ciphertext][16-byte GCM tag]
//! ```
//!
//! Every cryptographic or I/O failure is reported as a [`CryptoFailure`];
//! errors from the underlying crates never cross this module.

mod hash;
mod stream;

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub use hash::{compute_content_hash, compute_identifier_hash};
pub use stream::DecryptedStream;

/// GCM initialization vector length (96 bits).
pub const IV_LEN: usize = 12;

/// GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// Master key length (AES-256).
pub const MASTER_KEY_LEN: usize = 32;

// =============================================================================
// Errors
// =============================================================================

/// Category of a [`CryptoFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Reading or writing a file failed.
    Io,
    /// The file is too short to hold an IV.
    Decoding,
    /// Authentication tag mismatch: tampered or truncated ciphertext.
    Integrity,
    /// Encryption itself failed.
    Encryption,
    /// The OS random source failed.
    Random,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Io => "io",
            FailureKind::Decoding => "decoding",
            FailureKind::Integrity => "integrity",
            FailureKind::Encryption => "encryption",
            FailureKind::Random => "random",
        };
        f.write_str(name)
    }
}

/// The single error type for encryption and decryption.
#[derive(Debug, Clone, thiserror::Error)]
#[error("crypto failure ({kind}): {message}")]
pub struct CryptoFailure {
    kind: FailureKind,
    message: String,
}

impl CryptoFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn io(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Io, message)
    }

    pub(crate) fn integrity(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Integrity, message)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Recover a `CryptoFailure` carried inside an `io::Error` from a
    /// [`DecryptedStream`] read.
    pub fn from_io_error(error: &io::Error) -> Option<&CryptoFailure> {
        error.get_ref()?.downcast_ref::<CryptoFailure>()
    }

    pub(crate) fn into_io_error(self) -> io::Error {
        let kind = match self.kind {
            FailureKind::Io => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, self)
    }
}

impl From<io::Error> for CryptoFailure {
    fn from(e: io::Error) -> Self {
        CryptoFailure::io(e.to_string())
    }
}

// =============================================================================
// Master Key
// =============================================================================

/// The process-wide AES-256 master key. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; MASTER_KEY_LEN]);

impl MasterKey {
    pub fn new(bytes: [u8; MASTER_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice; `None` unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; MASTER_KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; MASTER_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Encrypts uploads to disk and opens decrypting streams over them.
pub struct CryptoEngine {
    cipher: Aes256Gcm,
    rng: SystemRandom,
}

impl CryptoEngine {
    pub fn new(master_key: &MasterKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key.as_bytes())),
            rng: SystemRandom::new(),
        }
    }

    /// Fresh 96-bit IV from the OS CSPRNG.
    pub fn generate_iv(&self) -> Result<[u8; IV_LEN], CryptoFailure> {
        let mut iv = [0u8; IV_LEN];
        self.rng
            .fill(&mut iv)
            .map_err(|_| CryptoFailure::new(FailureKind::Random, "system random source failed"))?;
        Ok(iv)
    }

    /// Read `plain` to the end and write `iv || ciphertext || tag` to
    /// `destination`, creating or replacing it.
    ///
    /// The file is written beside the destination and renamed into place, so a
    /// reader never observes a partial file. Returns the plaintext length.
    pub fn encrypt_to_file(
        &self,
        mut plain: impl Read,
        destination: &Path,
        iv: &[u8; IV_LEN],
    ) -> Result<u64, CryptoFailure> {
        let mut buffer = Zeroizing::new(Vec::new());
        plain.read_to_end(&mut buffer)?;
        let plaintext_len = buffer.len() as u64;

        self.cipher
            .encrypt_in_place(Nonce::from_slice(iv), b"", &mut *buffer)
            .map_err(|_| CryptoFailure::new(FailureKind::Encryption, "AES-GCM seal failed"))?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = destination.with_extension("tmp");
        let written = File::create(&temp_path).and_then(|mut file| {
            file.write_all(iv)?;
            file.write_all(&buffer)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&temp_path, destination)
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        Ok(plaintext_len)
    }

    /// Open `source`, read its IV, and return a stream that decrypts the rest.
    ///
    /// The returned stream owns the open file handle. Tag verification happens
    /// on the first read.
    pub fn decrypt_file_to_stream(&self, source: &Path) -> Result<DecryptedStream, CryptoFailure> {
        let mut file = File::open(source)?;

        let mut iv = [0u8; IV_LEN];
        if let Err(e) = file.read_exact(&mut iv) {
            return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
                CryptoFailure::new(
                    FailureKind::Decoding,
                    format!("file shorter than the {IV_LEN}-byte IV"),
                )
            } else {
                e.into()
            });
        }

        Ok(DecryptedStream::new(file, self.cipher.clone(), iv))
    }
}
