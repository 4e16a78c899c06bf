use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::Rng;
use serde::{Deserialize, Serialize};

const RANDOM_LEN: usize = 13;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Weak liveness marker for one browser session. Not a credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn mint<R: Rng + ?Sized>(secret: &str, now_ms: i64, rng: &mut R) -> Self {
        let random: String = (0..RANDOM_LEN)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        SessionToken(BASE64.encode(format!("{}_{}_{}", secret, now_ms, random)))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        SessionToken(raw.into())
    }

    /// Checks the embedded `<secret>_<millis>_<random>` layout.
    pub fn is_well_formed(&self, secret: &str) -> bool {
        let Ok(bytes) = BASE64.decode(self.0.as_bytes()) else {
            return false;
        };
        let Ok(text) = String::from_utf8(bytes) else {
            return false;
        };
        let Some(rest) = text.strip_prefix(secret).and_then(|r| r.strip_prefix('_')) else {
            return false;
        };
        let mut parts = rest.split('_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(millis), Some(random), None) => {
                millis.parse::<i64>().is_ok()
                    && !random.is_empty()
                    && random.bytes().all(|b| b.is_ascii_alphanumeric())
            }
            _ => false,
        }
    }

    /// Mint time embedded in the token, if it parses.
    #[cfg(test)]
    pub fn minted_at(&self, secret: &str) -> Option<i64> {
        if !self.is_well_formed(secret) {
            return None;
        }
        let text = String::from_utf8(BASE64.decode(self.0.as_bytes()).ok()?).ok()?;
        text.split('_').nth_back(1)?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SECRET: &str = "KS2024SCRIPT";

    #[test]
    fn minted_token_is_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        let token = SessionToken::mint(SECRET, 1_700_000_000_000, &mut rng);
        assert!(token.is_well_formed(SECRET));
        assert_eq!(token.minted_at(SECRET), Some(1_700_000_000_000));
        assert!(!token.is_well_formed("OTHER"));
    }

    #[test]
    fn tokens_differ_between_mints() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = SessionToken::mint(SECRET, 5, &mut rng);
        let b = SessionToken::mint(SECRET, 5, &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(!SessionToken::from_raw("").is_well_formed(SECRET));
        assert!(!SessionToken::from_raw("not base64!").is_well_formed(SECRET));
        // plain text marker is not enough, it has to be inside the encoding
        assert!(!SessionToken::from_raw(SECRET).is_well_formed(SECRET));
        let wrong_shape = BASE64.encode(format!("{}_abc_def", SECRET));
        assert!(!SessionToken::from_raw(wrong_shape).is_well_formed(SECRET));
        let extra_field = BASE64.encode(format!("{}_12_ab_cd", SECRET));
        assert!(!SessionToken::from_raw(extra_field).is_well_formed(SECRET));
    }
}
