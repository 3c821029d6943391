//! Deterministic BM25-style sparse encoding for hybrid collections.
//!
//! Terms are lowercased alphanumeric runs, hashed into a fixed dimension
//! space; weights saturate with term frequency (the k1 half of BM25 without
//! corpus statistics, which a per-document encoder cannot have). Identical
//! content always encodes to the identical sparse vector.

use std::collections::BTreeMap;

/// Sparse vector dimensionality (hash space).
pub const SPARSE_DIM: u32 = 1 << 20;

const K1: f32 = 1.2;

/// `dimension index -> weight`, sorted by index for deterministic payloads.
pub type SparseVector = BTreeMap<u32, f32>;

/// Encode text into a sparse vector.
#[must_use]
pub fn encode(text: &str) -> SparseVector {
    let mut frequencies: BTreeMap<u32, f32> = BTreeMap::new();
    for term in terms(text) {
        *frequencies.entry(term_index(term)).or_insert(0.0) += 1.0;
    }
    frequencies
        .into_iter()
        .map(|(index, tf)| (index, tf * (K1 + 1.0) / (tf + K1)))
        .collect()
}

fn terms(text: &str) -> impl Iterator<Item = &str> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|term| term.len() > 1)
}

fn term_index(term: &str) -> u32 {
    // FNV-1a over the lowercased term, folded into the hash space.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in term.bytes() {
        hash ^= u64::from(byte.to_ascii_lowercase());
        hash = hash.wrapping_mul(0x1_0000_01b3);
    }
    (hash % u64::from(SPARSE_DIM)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_deterministic() {
        let first = encode("fn parse_config(path: &Path) -> Result<Config>");
        let second = encode("fn parse_config(path: &Path) -> Result<Config>");
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn case_differences_map_to_the_same_terms() {
        assert_eq!(encode("ParseConfig"), encode("parseconfig"));
    }

    #[test]
    fn repeated_terms_saturate_rather_than_grow_linearly() {
        let once = encode("resolver");
        let many = encode("resolver resolver resolver resolver");
        let index = *once.keys().next().expect("one term");

        let single_weight = once[&index];
        let repeated_weight = many[&index];
        assert!(repeated_weight > single_weight);
        assert!(repeated_weight < single_weight * 4.0);
        assert!(repeated_weight < K1 + 1.0, "weights stay bounded");
    }

    #[test]
    fn single_character_noise_is_dropped(){
        assert!(encode("a b c ; { }").is_empty());
    }

    #[test]
    fn indices_stay_in_the_hash_space() {
        let encoded = encode("some representative chunk of source text");
        assert!(encoded.keys().all(|index| *index < SPARSE_DIM));
    }
}
