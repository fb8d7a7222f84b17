use rand::Rng;
use std::fmt;

const TOKEN_LEN: usize = 8;
const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Short generated name an uploaded object is stored under.
///
/// Not unique: nothing checks the backend for an existing object with the
/// same name, the token is only long enough to make a clash unlikely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKey {
    pub token: String,
    pub extension: String,
}

impl StorageKey {
    pub fn has_extension(&self) -> bool {
        !self.extension.is_empty()
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_extension() {
            write!(f, "{}.{}", self.token, self.extension)
        } else {
            f.write_str(&self.token)
        }
    }
}

/// Lowercased text after the last `.`, or empty when there is none.
pub fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

pub fn generate_key(original_filename: &str) -> StorageKey {
    let mut rng = rand::rng();
    let token = (0..TOKEN_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();

    StorageKey {
        token,
        extension: extension_of(original_filename),
    }
}
