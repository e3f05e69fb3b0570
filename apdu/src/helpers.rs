// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Shared request-building helpers

/// P2 / P1 marker for a request without an auth token suffix
pub(crate) const FLAG_WITHOUT_TOKEN: u8 = 0x01;
/// P2 / P1 marker for a request carrying a 4-byte auth token suffix
pub(crate) const FLAG_WITH_TOKEN: u8 = 0x02;

/// Flag byte selecting between the token-less and token-carrying forms
pub(crate) fn auth_token_flag(token: Option<u32>) -> u8 {
    match token {
        Some(_) => FLAG_WITH_TOKEN,
        None => FLAG_WITHOUT_TOKEN,
    }
}

/// Append the optional 4-byte big-endian auth token
pub(crate) fn write_auth_token(buf: &mut Vec<u8>, token: Option<u32>) {
    if let Some(t) = token {
        buf.extend_from_slice(&t.to_be_bytes());
    }
}
