// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decrypting reader over an encrypted statement file.
//!
//! [`DecryptedStream`] owns the open source file. Ownership moves to whoever
//! receives the stream; the handle is released when the plaintext is
//! exhausted, on [`DecryptedStream::close`], or on drop.
//!
//! GCM only authenticates a message as a whole, so the ciphertext is read and
//! verified on the first `read` call and no plaintext is handed out before
//! the tag checks.

use std::fs::File;
use std::io::{self, Read};

use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use super::{CryptoFailure, IV_LEN};

enum StreamState {
    /// IV consumed, ciphertext not yet read.
    Sealed,
    Open {
        plaintext: Zeroizing<Vec<u8>>,
        position: usize,
    },
    /// Authentication or I/O failed; every read reports it again.
    Poisoned(CryptoFailure),
}

/// Plaintext reader returned by `CryptoEngine::decrypt_file_to_stream`.
pub struct DecryptedStream {
    source: Option<File>,
    cipher: Aes256Gcm,
    iv: [u8; IV_LEN],
    state: StreamState,
}

impl DecryptedStream {
    pub(super) fn new(source: File, cipher: Aes256Gcm, iv: [u8; IV_LEN]) -> Self {
        Self {
            source: Some(source),
            cipher,
            iv,
            state: StreamState::Sealed,
        }
    }

    /// Whether the backing file handle is still held.
    pub fn is_source_open(&self) -> bool {
        self.source.is_some()
    }

    /// Release the stream and its file handle.
    pub fn close(self) {}

    fn unseal(&mut self) -> io::Result<()> {
        let Some(source) = self.source.as_mut() else {
            return Err(self.poison(CryptoFailure::io("source closed before read")));
        };

        let mut buffer = Zeroizing::new(Vec::new());
        if let Err(e) = source.read_to_end(&mut buffer) {
            return Err(self.poison(CryptoFailure::io(e.to_string())));
        }

        let nonce = Nonce::from_slice(&self.iv);
        if self
            .cipher
            .decrypt_in_place(nonce, b"", &mut *buffer)
            .is_err()
        {
            return Err(self.poison(CryptoFailure::integrity(
                "authentication tag mismatch or truncated ciphertext",
            )));
        }

        self.state = StreamState::Open {
            plaintext: buffer,
            position: 0,
        };
        Ok(())
    }

    fn poison(&mut self, failure: CryptoFailure) -> io::Error {
        self.source = None;
        let error = failure.clone().into_io_error();
        self.state = StreamState::Poisoned(failure);
        error
    }
}

impl Read for DecryptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if matches!(self.state, StreamState::Sealed) {
            self.unseal()?;
        }

        match &mut self.state {
            StreamState::Open {
                plaintext,
                position,
            } => {
                let remaining = &plaintext[*position..];
                let n = remaining.len().min(buf.len());
                buf[..n].copy_from_slice(&remaining[..n]);
                *position += n;
                if *position == plaintext.len() {
                    self.source = None;
                }
                Ok(n)
            }
            StreamState::Poisoned(failure) => Err(failure.clone().into_io_error()),
            StreamState::Sealed => Err(CryptoFailure::io("stream left sealed").into_io_error()),
        }
    }
}

impl std::fmt::Debug for DecryptedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            StreamState::Sealed => "sealed",
            StreamState::Open { .. } => "open",
            StreamState::Poisoned(_) => "poisoned",
        };
        f.debug_struct("DecryptedStream")
            .field("source_open", &self.source.is_some())
            .field("state", &state)
            .finish()
    }
}
