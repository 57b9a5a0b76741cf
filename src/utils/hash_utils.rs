pub struct MurMurHasher;

impl MurMurHasher {
    pub fn hash_str(str: &str) -> u128 {
        fastmurmur3::murmur3_x64_128(str.as_bytes(), 0)
    }

    /// Map a string onto one of `buckets` slots. Deterministic across runs.
    pub fn bucket(str: &str, buckets: usize) -> usize {
        (MurMurHasher::hash_str(str) % buckets as u128) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_str() {
        assert_eq!(MurMurHasher::hash_str("hello"), MurMurHasher::hash_str("hello"));
        assert_ne!(MurMurHasher::hash_str("hello"), MurMurHasher::hash_str("world"));
        assert_ne!(MurMurHasher::hash_str("hello"), MurMurHasher::hash_str("hello "));
    }

    #[test]
    fn test_bucket() {
        for name in ["thriller", "date-night", "임시완", ""] {
            let bucket = MurMurHasher::bucket(name, 4);
            assert!(bucket < 4);
            assert_eq!(bucket, MurMurHasher::bucket(name, 4));
        }
        assert_eq!(MurMurHasher::bucket("anything", 1), 0);
    }
}
