use uuid::Uuid;

/// Generate a stable, short, unique id for a request.
///
/// The only contract callers rely on is that the id is unique and appears
/// both in logs and in the `x-request-id` header. This uses a random UUID,
/// base32-encoded to stay short and header-friendly.
pub fn generate() -> String {
    let uuid = Uuid::new_v4();
    base32_no_padding(uuid.as_bytes())
}

// RFC 4648 base32 without padding; not security sensitive, just a compact
// textual encoding of 16 random bytes.
fn base32_no_padding(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits_in_buffer = 0u32;
    for &byte in bytes {
        buffer = (buffer << 8) | byte as u32;
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = (buffer >> bits_in_buffer) & 0x1F;
            out.push(ALPHABET[index as usize] as char);
        }
    }
    if bits_in_buffer > 0 {
        let index = (buffer << (5 - bits_in_buffer)) & 0x1F;
        out.push(ALPHABET[index as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_short() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
        assert!(a.len() <= 26);
        assert!(a.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
