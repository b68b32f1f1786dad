use aes::Aes128;
use anyhow::{Result, anyhow};
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of digits in a generated PAN: BIN + 11 random digits + Luhn check.
pub const PAN_LENGTH: usize = 16;

const CARD_VALIDITY_YEARS: i32 = 5;

/// A 16-byte AES key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AesKey([u8; 16]);

impl AesKey {
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 16 {
            return Err(anyhow!("AES key must be 16 bytes"));
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Derives a key from an arbitrary-length secret string.
    pub fn derive_from_secret(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        let digest = hasher.finalize();
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&digest[..16]);
        Self(arr)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for AesKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AesKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Encrypts a 16-digit PAN into a hex ciphertext. The PAN occupies exactly
/// one AES block, so no padding or chaining mode is involved; the key is
/// process-wide configuration.
pub fn encrypt_pan(key: &AesKey, pan: &str) -> Result<String> {
    let bytes = pan.as_bytes();
    if bytes.len() != PAN_LENGTH {
        return Err(anyhow!("PAN must be {} digits", PAN_LENGTH));
    }

    let cipher = Aes128::new_from_slice(key.as_bytes())
        .map_err(|e| anyhow!("Invalid key length: {:?}", e))?;
    let mut block = [0u8; 16];
    block.copy_from_slice(bytes);

    cipher.encrypt_block((&mut block).into());
    Ok(hex::encode(block))
}

/// Reverses `encrypt_pan`. Fails on corrupt ciphertext or a non-digit
/// plaintext (wrong key), never silently returns a wrong value.
pub fn decrypt_pan(key: &AesKey, ciphertext: &str) -> Result<String> {
    let bytes = hex::decode(ciphertext)?;
    if bytes.len() != 16 {
        return Err(anyhow!("Ciphertext must be 16 bytes"));
    }

    let cipher = Aes128::new_from_slice(key.as_bytes())
        .map_err(|e| anyhow!("Invalid key length: {:?}", e))?;
    let mut block = [0u8; 16];
    block.copy_from_slice(&bytes);

    cipher.decrypt_block((&mut block).into());

    let pan = String::from_utf8(block.to_vec()).map_err(|_| anyhow!("Decryption failed"))?;
    if !pan.bytes().all(|b| b.is_ascii_digit()) {
        return Err(anyhow!("Decryption failed"));
    }
    Ok(pan)
}

/// One-way SHA-256 hex digest of a PAN, used solely for uniqueness checks.
pub fn hash_pan(pan: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pan.as_bytes());
    hex::encode(hasher.finalize())
}

/// Luhn check digit: sum digits right-to-left doubling every second one,
/// subtracting 9 when the doubled value exceeds 9.
pub fn luhn_check_digit(digits: &str) -> u32 {
    let mut sum = 0u32;
    let mut alternate = true;

    for c in digits.chars().rev() {
        let mut digit = c.to_digit(10).unwrap_or(0);
        if alternate {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        alternate = !alternate;
    }

    (10 - sum % 10) % 10
}

/// Validates a full PAN including its trailing check digit.
pub fn luhn_valid(pan: &str) -> bool {
    if pan.len() < 2 || !pan.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let (body, check) = pan.split_at(pan.len() - 1);
    check
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .is_some_and(|d| d == luhn_check_digit(body))
}

/// Generates a random Luhn-valid PAN with the given issuer prefix.
/// Uniqueness against the store is the caller's concern.
pub fn generate_pan(bin: &str) -> String {
    let mut rng = rand::rng();
    let mut pan = String::with_capacity(PAN_LENGTH);
    pan.push_str(bin);

    for _ in 0..(PAN_LENGTH - bin.len() - 1) {
        let digit: u32 = rng.random_range(0..10);
        pan.push(char::from_digit(digit, 10).unwrap());
    }

    let check = luhn_check_digit(&pan);
    pan.push(char::from_digit(check, 10).unwrap());
    pan
}

/// Expiration for a freshly issued card: current month, current year + 5.
pub fn expiration_date() -> (u32, i32) {
    use chrono::Datelike;
    let today = chrono::Utc::now().date_naive();
    (today.month(), today.year() + CARD_VALIDITY_YEARS)
}

/// Whether the expiration month has passed. A card stays usable through the
/// last day of its expiration month.
pub fn is_expired(exp_month: u32, exp_year: i32) -> bool {
    use chrono::Datelike;
    let today = chrono::Utc::now().date_naive();
    (exp_year, exp_month) < (today.year(), today.month())
}

pub fn extract_last4(pan: &str) -> &str {
    &pan[pan.len().saturating_sub(4)..]
}

pub fn mask_pan(last4: &str) -> String {
    format!("**** **** **** {}", last4)
}
