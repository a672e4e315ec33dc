//! Short code generation and validation utilities.
//!
//! Codes are drawn from a 62-symbol alphabet (`[0-9a-zA-Z]`). The encoder is a
//! pure function over arbitrary bytes; [`CodeGenerator`] layers three
//! generation modes on top of it.

use crate::error::AppError;
use rand::Rng;
use serde_json::json;
use sha2::{Digest, Sha256};

/// Base62 alphabet. Index 0 is the padding symbol.
pub const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length used when a requested length falls outside the valid range.
pub const DEFAULT_CODE_LENGTH: usize = 7;
pub const MIN_CODE_LENGTH: usize = 4;
pub const MAX_CODE_LENGTH: usize = 10;

/// Attempt index from which collision retries stop hashing and go random.
const RANDOM_FALLBACK_ATTEMPT: u32 = 5;

/// Maximum generation attempts before the code space is considered exhausted.
pub const MAX_GENERATION_ATTEMPTS: u32 = 10;

const MIN_ALIAS_LENGTH: usize = 3;
const MAX_ALIAS_LENGTH: usize = 50;

/// Aliases that collide with service endpoints.
const RESERVED_ALIASES: &[&str] = &["api", "admin", "health", "stats", "static"];

fn clamp_length(length: usize) -> usize {
    if (MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&length) {
        length
    } else {
        DEFAULT_CODE_LENGTH
    }
}

/// Encodes `bytes` as a base62 string of exactly `length` characters.
///
/// The input is read as a big-endian unsigned integer and divided by 62
/// repeatedly; the least significant `length` digits are kept. Short results
/// are left-padded with `'0'`. A `length` outside `[4, 10]` is clamped to
/// [`DEFAULT_CODE_LENGTH`].
///
/// # Examples
///
/// ```
/// use shortlink::utils::code_generator::encode;
///
/// assert_eq!(encode(&[], 6), "000000");
/// assert_eq!(encode(&[62], 4), "0010");
/// ```
pub fn encode(bytes: &[u8], length: usize) -> String {
    let length = clamp_length(length);

    let mut number: Vec<u8> = bytes.to_vec();
    let mut digits: Vec<u8> = Vec::with_capacity(length);

    while digits.len() < length && number.iter().any(|&b| b != 0) {
        let mut remainder: u32 = 0;
        for byte in number.iter_mut() {
            let acc = (remainder << 8) | u32::from(*byte);
            *byte = (acc / 62) as u8;
            remainder = acc % 62;
        }
        digits.push(ALPHABET[remainder as usize]);
    }

    while digits.len() < length {
        digits.push(ALPHABET[0]);
    }

    digits.reverse();
    // Alphabet is pure ASCII.
    digits.into_iter().map(char::from).collect()
}

/// How a [`CodeGenerator`] derives codes. Chosen once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationMode {
    /// `encode(sha256(url))`: the same URL always yields the same code.
    Deterministic,
    /// Cryptographically random symbols, independent of the URL.
    Randomized,
    /// Deterministic on attempt 0, salted hashes on attempts 1-4, random
    /// afterwards. The caller checks existence between attempts.
    #[default]
    CollisionRetry,
}

/// Produces candidate short codes of a fixed length.
#[derive(Debug, Clone, Copy)]
pub struct CodeGenerator {
    mode: GenerationMode,
    length: usize,
}

impl CodeGenerator {
    pub fn new(mode: GenerationMode, length: usize) -> Self {
        Self {
            mode,
            length: clamp_length(length),
        }
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Returns the candidate code for `original_url` at retry `attempt`.
    ///
    /// `attempt` is ignored outside [`GenerationMode::CollisionRetry`].
    pub fn generate(&self, original_url: &str, attempt: u32) -> String {
        match self.mode {
            GenerationMode::Deterministic => self.deterministic(original_url),
            GenerationMode::Randomized => self.randomized(),
            GenerationMode::CollisionRetry => self.with_attempt(original_url, attempt),
        }
    }

    pub fn deterministic(&self, original_url: &str) -> String {
        encode(&Sha256::digest(original_url.as_bytes()), self.length)
    }

    pub fn randomized(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
            .collect()
    }

    pub fn with_attempt(&self, original_url: &str, attempt: u32) -> String {
        match attempt {
            0 => self.deterministic(original_url),
            n if n < RANDOM_FALLBACK_ATTEMPT => {
                let salted = format!("{original_url}:attempt:{n}");
                encode(&Sha256::digest(salted.as_bytes()), self.length)
            }
            _ => self.randomized(),
        }
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(GenerationMode::default(), DEFAULT_CODE_LENGTH)
    }
}

/// Returns true for a syntactically valid generated code: 4-10 base62 symbols.
pub fn is_valid_code(code: &str) -> bool {
    (MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&code.len())
        && code.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Returns true for a syntactically valid custom alias: 3-50 of `[A-Za-z0-9_-]`.
pub fn is_valid_custom_alias(alias: &str) -> bool {
    (MIN_ALIAS_LENGTH..=MAX_ALIAS_LENGTH).contains(&alias.len())
        && alias
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Validates a user-provided custom alias.
///
/// # Rules
///
/// - Length: 3-50 characters
/// - Allowed characters: ASCII letters, digits, hyphen, underscore
/// - Cannot be a reserved system alias
///
/// # Errors
///
/// Returns [`AppError::Validation`] if any rule is violated.
pub fn validate_custom_alias(alias: &str) -> Result<(), AppError> {
    if !(MIN_ALIAS_LENGTH..=MAX_ALIAS_LENGTH).contains(&alias.len()) {
        return Err(AppError::bad_request(
            "Custom alias must be 3-50 characters",
            json!({ "provided_length": alias.len() }),
        ));
    }

    if !is_valid_custom_alias(alias) {
        return Err(AppError::bad_request(
            "Custom alias can only contain letters, digits, hyphens and underscores",
            json!({ "alias": alias }),
        ));
    }

    if RESERVED_ALIASES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(alias))
    {
        return Err(AppError::bad_request(
            "This alias is reserved",
            json!({ "alias": alias }),
        ));
    }

    Ok(())
}

/// Rejects strings that can be neither a generated code nor a custom alias,
/// before any cache or store access.
///
/// # Errors
///
/// Returns [`AppError::InvalidShortCode`].
pub fn validate_short_code(code: &str) -> Result<(), AppError> {
    if is_valid_code(code) || is_valid_custom_alias(code) {
        Ok(())
    } else {
        Err(AppError::invalid_short_code(
            "Invalid short code format",
            json!({ "code": code }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_validate_short_code() {
        assert!(validate_short_code("abc12345").is_ok());
        assert!(validate_short_code("my-link_1").is_ok());
        assert!(validate_short_code("ab").is_err());
        assert!(validate_short_code("bad code").is_err());
        assert!(matches!(
            validate_short_code("../etc"),
            Err(AppError::InvalidShortCode { .. })
        ));
    }

    #[test]
    fn test_encode_empty_input_pads_with_zero_symbol() {
        assert_eq!(encode(&[], 7), "0000000");
        assert_eq!(encode(&[0, 0, 0], 5), "00000");
    }

    #[test]
    fn test_encode_small_numbers() {
        assert_eq!(encode(&[1], 4), "0001");
        assert_eq!(encode(&[61], 4), "000Z");
        assert_eq!(encode(&[62], 4), "0010");
        // 0x01_00 = 256 = 4 * 62 + 8
        assert_eq!(encode(&[1, 0], 4), "0048");
    }

    #[test]
    fn test_encode_keeps_least_significant_digits() {
        // 62^4 in base62 is "10000".
        let bytes = 14_776_336u32.to_be_bytes();
        assert_eq!(encode(&bytes, 4), "0000");
        assert_eq!(encode(&bytes, 5), "10000");
    }

    #[test]
    fn test_encode_clamps_out_of_range_length() {
        assert_eq!(encode(b"hello", 2).len(), DEFAULT_CODE_LENGTH);
        assert_eq!(encode(b"hello", 11).len(), DEFAULT_CODE_LENGTH);
        assert_eq!(encode(b"hello", 0).len(), DEFAULT_CODE_LENGTH);
    }

    #[test]
    fn test_encode_output_uses_alphabet() {
        let digest = Sha256::digest(b"https://example.com");
        for length in MIN_CODE_LENGTH..=MAX_CODE_LENGTH {
            let code = encode(&digest, length);
            assert_eq!(code.len(), length);
            assert!(code.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_deterministic_is_stable_across_calls_and_lengths() {
        for length in MIN_CODE_LENGTH..=MAX_CODE_LENGTH {
            let generator = CodeGenerator::new(GenerationMode::Deterministic, length);
            let first = generator.generate("https://example.com/a", 0);
            let second = generator.generate("https://example.com/a", 3);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_deterministic_differs_between_urls() {
        let generator = CodeGenerator::new(GenerationMode::Deterministic, 8);
        assert_ne!(
            generator.deterministic("https://example.com/a"),
            generator.deterministic("https://example.com/b")
        );
    }

    #[test]
    fn test_randomized_produces_unique_codes() {
        let generator = CodeGenerator::new(GenerationMode::Randomized, 8);
        let codes: HashSet<String> = (0..10_000).map(|_| generator.randomized()).collect();
        assert_eq!(codes.len(), 10_000);
    }

    #[test]
    fn test_collision_retry_attempt_zero_matches_deterministic() {
        let generator = CodeGenerator::new(GenerationMode::CollisionRetry, 8);
        assert_eq!(
            generator.generate("https://example.com", 0),
            generator.deterministic("https://example.com")
        );
    }

    #[test]
    fn test_collision_retry_salted_attempts_are_deterministic_and_distinct() {
        let generator = CodeGenerator::new(GenerationMode::CollisionRetry, 8);
        let attempts: Vec<String> = (0..RANDOM_FALLBACK_ATTEMPT)
            .map(|n| generator.generate("https://example.com", n))
            .collect();

        for (n, code) in attempts.iter().enumerate() {
            assert_eq!(code, &generator.generate("https://example.com", n as u32));
        }

        let unique: HashSet<&String> = attempts.iter().collect();
        assert_eq!(unique.len(), attempts.len());
    }

    #[test]
    fn test_collision_retry_salt_format() {
        let generator = CodeGenerator::new(GenerationMode::CollisionRetry, 8);
        let expected = encode(
            &Sha256::digest(b"https://example.com:attempt:2"),
            generator.length(),
        );
        assert_eq!(generator.generate("https://example.com", 2), expected);
    }

    #[test]
    fn test_collision_retry_falls_back_to_random() {
        let generator = CodeGenerator::new(GenerationMode::CollisionRetry, 10);
        let code = generator.generate("https://example.com", RANDOM_FALLBACK_ATTEMPT);
        assert_eq!(code.len(), 10);
        assert!(is_valid_code(&code));
    }

    #[test]
    fn test_generator_clamps_length() {
        assert_eq!(
            CodeGenerator::new(GenerationMode::Randomized, 3).length(),
            DEFAULT_CODE_LENGTH
        );
        assert_eq!(
            CodeGenerator::new(GenerationMode::Randomized, 42).length(),
            DEFAULT_CODE_LENGTH
        );
        assert_eq!(CodeGenerator::new(GenerationMode::Randomized, 4).length(), 4);
    }

    #[test]
    fn test_is_valid_code() {
        assert!(is_valid_code("abcd"));
        assert!(is_valid_code("AbC123xyZ9"));
        assert!(!is_valid_code("abc"));
        assert!(!is_valid_code("abcdefghijk"));
        assert!(!is_valid_code("abc-12"));
        assert!(!is_valid_code("abc_12"));
        assert!(!is_valid_code("ab c12"));
        assert!(!is_valid_code(""));
    }

    #[test]
    fn test_is_valid_custom_alias() {
        assert!(is_valid_custom_alias("abc"));
        assert!(is_valid_custom_alias("My_Promo-2025"));
        assert!(is_valid_custom_alias(&"a".repeat(50)));
        assert!(!is_valid_custom_alias("ab"));
        assert!(!is_valid_custom_alias(&"a".repeat(51)));
        assert!(!is_valid_custom_alias("promo!"));
        assert!(!is_valid_custom_alias("pro/mo"));
    }

    #[test]
    fn test_validate_custom_alias_ok() {
        assert!(validate_custom_alias("summer-sale").is_ok());
        assert!(validate_custom_alias("Launch_2025").is_ok());
    }

    #[test]
    fn test_validate_custom_alias_too_short() {
        let err = validate_custom_alias("ab").unwrap_err();
        assert!(err.to_string().contains("3-50"));
    }

    #[test]
    fn test_validate_custom_alias_bad_characters() {
        let err = validate_custom_alias("my alias").unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_validate_all_reserved_aliases() {
        for &reserved in RESERVED_ALIASES {
            assert!(
                validate_custom_alias(reserved).is_err(),
                "Reserved alias '{}' should be invalid",
                reserved
            );
        }
        assert!(validate_custom_alias("ADMIN").is_err());
    }
}
