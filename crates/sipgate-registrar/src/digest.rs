//! RFC 2617 Digest-MD5 (qop=auth) hash chain.

use md5::{Digest, Md5};

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn ha1(username: &str, realm: &str, password: &str) -> String {
    md5_hex(&format!("{username}:{realm}:{password}"))
}

pub fn ha2(method: &str, uri: &str) -> String {
    md5_hex(&format!("{method}:{uri}"))
}

pub fn response(ha1: &str, nonce: &str, nc: &str, cnonce: &str, qop: &str, ha2: &str) -> String {
    md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}"))
}

/// 32 cryptographically-random bytes, lowercase hex (64 chars).
pub fn fresh_nonce() -> String {
    random_hex(32)
}

/// 5 cryptographically-random bytes, lowercase hex (10 chars), used for the
/// `tag` stamped onto a successful REGISTER's `To`.
pub fn fresh_tag() -> String {
    random_hex(5)
}

fn random_hex(bytes: usize) -> String {
    use rand::RngCore;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}
