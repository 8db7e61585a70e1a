use std::fmt::Write;

use md5::Digest;

pub fn md5(bytes: &[u8]) -> [u8; 16] {
    let mut hasher = md5::Md5::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

pub fn encode_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        let _ = write!(&mut s, "{:02x}", b);
    }
    s
}

/// Default value true for bool on serde
/// use this if you don't want do deal with Option<bool>
/// Use Default::default() for false
pub fn default_bool_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::{encode_hex, md5};

    #[test]
    fn test_md5() {
        assert_ne!(md5(b"proxies: [a]"), md5(b"proxies: [b]"));
        assert_eq!(encode_hex(&md5(b"")), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
