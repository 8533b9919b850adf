use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::GameError;

/// Code alphabet without the easily confused `I` and `O`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
pub const DEFAULT_CODE_LEN: usize = 3;
/// Collisions tolerated at one length before the code grows.
const ATTEMPTS_PER_LEN: usize = 64;

/// Short, case-insensitive join code. Always stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameCode(String);

impl GameCode {
    pub fn parse(raw: &str) -> Result<Self, GameError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.is_empty() || !code.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
            return Err(GameError::GameNotFound);
        }
        Ok(Self(code))
    }

    /// Draws random codes until `is_taken` rejects none of them.
    pub fn generate<R, F>(rng: &mut R, min_len: usize, mut is_taken: F) -> Self
    where
        R: Rng + ?Sized,
        F: FnMut(&GameCode) -> bool,
    {
        let mut len = min_len.max(1);
        loop {
            for _ in 0..ATTEMPTS_PER_LEN {
                let code: String = (0..len)
                    .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                    .collect();
                let code = GameCode(code);
                if !is_taken(&code) {
                    return code;
                }
            }
            len += 1;
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
