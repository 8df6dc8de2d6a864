//! Small shared helpers: block rounding and the on-disk filename grammar.

/// Accounting block size used to round `sizeOnDisk` up for budget purposes.
pub const BLOCK_SIZE: u64 = 4096;

/// Round `n` up to the next multiple of [`BLOCK_SIZE`].
pub fn round_up_4k(n: u64) -> u64 {
    let rem = n % BLOCK_SIZE;
    if rem == 0 {
        n
    } else {
        n + (BLOCK_SIZE - rem)
    }
}

/// The two-hex-character bucket a hash falls into, e.g. `"ab"` for
/// `"abcdef..."`. Hashes shorter than 2 characters are not valid inputs;
/// callers are expected to have validated hash length already (frontend
/// responsibility per the design).
pub fn bucket(hash: &str) -> &str {
    &hash[0..2.min(hash.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_block_boundary() {
        assert_eq!(round_up_4k(0), 0);
        assert_eq!(round_up_4k(1), 4096);
        assert_eq!(round_up_4k(4096), 4096);
        assert_eq!(round_up_4k(4097), 8192);
    }

    #[test]
    fn bucket_is_first_two_chars() {
        assert_eq!(bucket("abcdef"), "ab");
    }
}
