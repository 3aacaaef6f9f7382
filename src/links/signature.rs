// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HMAC-SHA256 link signatures and presented-token parsing.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::Sha256;

use super::SigningSecret;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_VERSION: &str = "v1";

fn mac_for(
    secret: &SigningSecret,
    statement_id: &str,
    nonce: &str,
    expires: i64,
) -> Result<HmacSha256, InvalidLength> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())?;
    let expires = expires.to_string();
    // Length-prefixed fields keep the message unambiguous.
    for field in [
        SIGNATURE_VERSION.as_bytes(),
        statement_id.as_bytes(),
        nonce.as_bytes(),
        expires.as_bytes(),
    ] {
        mac.update(&(field.len() as u64).to_be_bytes());
        mac.update(field);
    }
    Ok(mac)
}

/// Base64url signature for a link.
pub(super) fn sign(
    secret: &SigningSecret,
    statement_id: &str,
    nonce: &str,
    expires: i64,
) -> Result<String, InvalidLength> {
    let tag = mac_for(secret, statement_id, nonce, expires)?
        .finalize()
        .into_bytes();
    Ok(Base64UrlUnpadded::encode_string(&tag))
}

/// A presented token split into its parts.
#[derive(Debug, PartialEq, Eq)]
pub(super) struct PresentedToken<'a> {
    pub statement_id: &'a str,
    pub nonce: &'a str,
    signature: Vec<u8>,
}

impl PresentedToken<'_> {
    /// Constant-time signature check.
    pub fn verify(&self, secret: &SigningSecret, expires: i64) -> bool {
        mac_for(secret, self.statement_id, self.nonce, expires)
            .is_ok_and(|mac| mac.verify_slice(&self.signature).is_ok())
    }
}

/// Split `<statement_id>.<nonce>.<signature>`.
///
/// Splits from the right; the base64url alphabet has no `.`, so the
/// statement id may contain dots. Rejects empty parts and non-canonical
/// base64 so that a mutated character never decodes to the same signature.
pub(super) fn parse_presented(presented: &str) -> Option<PresentedToken<'_>> {
    let mut parts = presented.rsplitn(3, '.');
    let signature_text = parts.next()?;
    let nonce = parts.next()?;
    let statement_id = parts.next()?;

    if statement_id.is_empty() || nonce.is_empty() || signature_text.is_empty() {
        return None;
    }

    let signature = Base64UrlUnpadded::decode_vec(signature_text).ok()?;
    if Base64UrlUnpadded::encode_string(&signature) != signature_text {
        return None;
    }

    Some(PresentedToken {
        statement_id,
        nonce,
        signature,
    })
}
