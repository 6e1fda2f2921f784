//! Content fingerprinting for near-duplicate detection.
//!
//! Two documents whose bodies differ only in case, whitespace, punctuation,
//! or diacritics are the same document as far as the corpus is concerned.
//! The fingerprint captures that: normalize, hash, truncate.

use sha2::{Digest, Sha256};

/// Number of hex characters in a fingerprint (8 bytes of the SHA-256).
const FINGERPRINT_LEN: usize = 16;

/// Computes the 16-hex-character fingerprint of a document body.
///
/// Normalization: lowercase, fold diacritics to ASCII, then keep only ASCII
/// alphanumeric characters. Whitespace and punctuation drop out entirely, so
/// run-length differences cannot change the digest.
pub fn fingerprint(content: &str) -> String {
    let normalized = normalize(content);
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(&digest[..FINGERPRINT_LEN / 2])
}

fn normalize(content: &str) -> String {
    content
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(fold_diacritic)
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Maps accented characters common in French product copy to their ASCII
/// base letter. Characters outside the table pass through unchanged.
pub fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'â' | 'ä' | 'á' | 'ã' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'î' | 'ï' | 'í' => 'i',
        'ô' | 'ö' | 'ó' | 'õ' => 'o',
        'ù' | 'û' | 'ü' | 'ú' => 'u',
        'ç' => 'c',
        'ÿ' => 'y',
        'ñ' => 'n',
        'œ' => 'o',
        'æ' => 'a',
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_16_hex_chars() {
        let fp = fingerprint("disque de frein ventilé avant");
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn invariant_to_case_whitespace_and_punctuation() {
        assert_eq!(
            fingerprint("Disque de frein, ventilé!"),
            fingerprint("disque   de freinventile")
        );
    }

    #[test]
    fn invariant_to_diacritics() {
        assert_eq!(fingerprint("plaquette cérámique"), fingerprint("plaquette ceramique"));
    }

    #[test]
    fn different_content_differs() {
        assert_ne!(fingerprint("disque de frein"), fingerprint("filtre a huile"));
    }

    #[test]
    fn empty_content_still_hashes() {
        assert_eq!(fingerprint(""), fingerprint("  ,;!  "));
    }
}
