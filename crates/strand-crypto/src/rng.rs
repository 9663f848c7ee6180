use rand::RngCore;

/// Fill `buf` with random bytes from a non-blocking source.
///
/// Used for snapshot name tags and ephemeral identities; never for key
/// material.
pub fn fill_nonblocking(buf: &mut [u8]) {
    rand::thread_rng().fill_bytes(buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_the_whole_buffer() {
        let mut buf = [0u8; 64];
        fill_nonblocking(&mut buf);
        // 64 zero bytes from a working RNG is practically impossible.
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn successive_fills_differ() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        fill_nonblocking(&mut a);
        fill_nonblocking(&mut b);
        assert_ne!(a, b);
    }
}
