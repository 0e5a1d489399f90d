//! FF1 format-preserving encryption of numeral strings.
//!
//! Inputs are strings over the first `radix` symbols of [`ALPHABET`]. The
//! output has the same length and uses the same symbols, so a nine-digit
//! number encrypts to another nine-digit number.
//!
//! The block cipher is AES-128 or AES-256, selected by key length.
//!
//! The domain must hold at least [`MIN_DOMAIN_SIZE`] values
//! (`radix^len >= 1_000_000`, NIST SP 800-38G Rev. 1): six decimal digits,
//! five hex digits, four base-36 symbols. Shorter inputs are rejected.

use aes::{Aes128, Aes256};
use fpe::ff1::{FlexibleNumeralString, FF1};
use thiserror::Error;

/// Numeral symbols, in value order.
pub const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Smallest supported radix.
pub const MIN_RADIX: u32 = 2;

/// Largest supported radix (`ALPHABET.len()`).
pub const MAX_RADIX: u32 = 36;

/// Smallest accepted `radix^len`.
pub const MIN_DOMAIN_SIZE: u64 = 1_000_000;

/// Errors produced by the FF1 layer.
#[derive(Debug, Error)]
pub enum FpeError {
    #[error("radix {0} is outside the supported range {MIN_RADIX}..={MAX_RADIX}")]
    UnsupportedRadix(u32),

    #[error("character {found:?} is not a valid radix-{radix} numeral")]
    InvalidNumeral { found: char, radix: u32 },

    /// The input is shorter than [`min_len`] for its radix.
    #[error("input length {len} is outside the FF1 domain for radix {radix}")]
    InvalidLength { len: usize, radix: u32 },

    #[error("FF1 key must be 16 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}

enum Ff1Cipher {
    Aes128(FF1<Aes128>),
    Aes256(FF1<Aes256>),
}

impl Ff1Cipher {
    fn new(key: &[u8], radix: u32) -> Result<Self, FpeError> {
        if !(MIN_RADIX..=MAX_RADIX).contains(&radix) {
            return Err(FpeError::UnsupportedRadix(radix));
        }
        match key.len() {
            16 => FF1::<Aes128>::new(key, radix)
                .map(Ff1Cipher::Aes128)
                .map_err(|_| FpeError::UnsupportedRadix(radix)),
            32 => FF1::<Aes256>::new(key, radix)
                .map(Ff1Cipher::Aes256)
                .map_err(|_| FpeError::UnsupportedRadix(radix)),
            other => Err(FpeError::InvalidKeyLength(other)),
        }
    }

    fn apply(
        &self,
        direction: Direction,
        tweak: &[u8],
        numerals: Vec<u16>,
        radix: u32,
    ) -> Result<Vec<u16>, FpeError> {
        let len = numerals.len();
        let input = FlexibleNumeralString::from(numerals);
        let output = match (self, direction) {
            (Ff1Cipher::Aes128(c), Direction::Encrypt) => c.encrypt(tweak, &input),
            (Ff1Cipher::Aes128(c), Direction::Decrypt) => c.decrypt(tweak, &input),
            (Ff1Cipher::Aes256(c), Direction::Encrypt) => c.encrypt(tweak, &input),
            (Ff1Cipher::Aes256(c), Direction::Decrypt) => c.decrypt(tweak, &input),
        }
        .map_err(|_| FpeError::InvalidLength { len, radix })?;
        Ok(output.into())
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Encrypt `input` with FF1 under `key` and `tweak`.
///
/// # Errors
///
/// Returns an [`FpeError`] if the radix, key length, input symbols, or input
/// length are outside what FF1 accepts.
pub fn encrypt(input: &str, radix: u32, key: &[u8], tweak: &[u8]) -> Result<String, FpeError> {
    transform(Direction::Encrypt, input, radix, key, tweak)
}

/// Decrypt `input` with FF1 under `key` and `tweak`.
///
/// # Errors
///
/// Same conditions as [`encrypt`].
pub fn decrypt(input: &str, radix: u32, key: &[u8], tweak: &[u8]) -> Result<String, FpeError> {
    transform(Direction::Decrypt, input, radix, key, tweak)
}

/// Shortest input length accepted for `radix`.
pub fn min_len(radix: u32) -> usize {
    let radix = u64::from(radix.max(MIN_RADIX));
    let mut len = 1;
    let mut domain = radix;
    while domain < MIN_DOMAIN_SIZE {
        domain *= radix;
        len += 1;
    }
    len
}

fn transform(
    direction: Direction,
    input: &str,
    radix: u32,
    key: &[u8],
    tweak: &[u8],
) -> Result<String, FpeError> {
    let cipher = Ff1Cipher::new(key, radix)?;
    let numerals = to_numerals(input, radix)?;
    if numerals.len() < min_len(radix) {
        return Err(FpeError::InvalidLength {
            len: numerals.len(),
            radix,
        });
    }
    let output = cipher.apply(direction, tweak, numerals, radix)?;
    Ok(from_numerals(&output))
}

fn to_numerals(input: &str, radix: u32) -> Result<Vec<u16>, FpeError> {
    let symbols = &ALPHABET[..radix as usize];
    input
        .chars()
        .map(|c| {
            u8::try_from(c)
                .ok()
                .and_then(|b| symbols.iter().position(|&s| s == b))
                .map(|pos| pos as u16)
                .ok_or(FpeError::InvalidNumeral { found: c, radix })
        })
        .collect()
}

fn from_numerals(numerals: &[u16]) -> String {
    numerals
        .iter()
        .map(|&n| ALPHABET[n as usize] as char)
        .collect()
}
