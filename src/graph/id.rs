use rand::Rng;

const ID_LEN: usize = 14;
const ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a fresh 14-character, URL-safe opaque identifier.
///
/// Drawn from a 62-symbol alphabet; collisions are not checked for here,
/// relying on the keyspace rather than an explicit uniqueness probe.
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    (0..ID_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_fourteen_url_safe_chars() {
        for _ in 0..100 {
            let id = generate_id();
            assert_eq!(id.len(), ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn ids_are_not_trivially_repeated() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }
}
