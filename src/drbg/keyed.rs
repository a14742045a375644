//! Keyed-hash DRBG.
//!
//! Follows the HMAC_DRBG construction of NIST SP 800-90A (key `K`, value
//! `V`, update / generate / reseed) with BLAKE3 in keyed mode as the PRF.
//! Every generate call ends with an update step, which gives backtracking
//! resistance.

use blake3::Hasher;
use zeroize::Zeroize;

pub(crate) const OUT_LEN: usize = 32;
/// Entropy input plus nonce (256-bit strength, 128-bit nonce).
pub(crate) const SEED_LEN: usize = 32 + 16;

pub(crate) struct KeyedHashCore {
    key: [u8; OUT_LEN],
    value: [u8; OUT_LEN],
}

impl KeyedHashCore {
    pub(crate) fn instantiate(seed: &[u8]) -> Self {
        let mut core = Self {
            key: [0x00; OUT_LEN],
            value: [0x01; OUT_LEN],
        };
        core.update(&[seed]);
        core
    }

    pub(crate) fn reseed(&mut self, entropy: &[u8]) {
        self.update(&[entropy]);
    }

    pub(crate) fn generate(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(OUT_LEN) {
            self.value = prf(&self.key, &[&self.value[..]]);
            chunk.copy_from_slice(&self.value[..chunk.len()]);
        }
        self.update(&[]);
    }

    /// SP 800-90A update function. `provided` is treated as one
    /// concatenated string.
    fn update(&mut self, provided: &[&[u8]]) {
        let mut input = provided.concat();

        self.key = prf(&self.key, &[&self.value[..], &[0x00u8][..], &input[..]]);
        self.value = prf(&self.key, &[&self.value[..]]);

        if !input.is_empty() {
            self.key = prf(&self.key, &[&self.value[..], &[0x01u8][..], &input[..]]);
            self.value = prf(&self.key, &[&self.value[..]]);
        }
        input.zeroize();
    }
}

fn prf(key: &[u8; OUT_LEN], parts: &[&[u8]]) -> [u8; OUT_LEN] {
    let mut hasher = Hasher::new_keyed(key);
    for part in parts {
        hasher.update(part);
    }
    let out = *hasher.finalize().as_bytes();
    hasher.zeroize();
    out
}

impl Drop for KeyedHashCore {
    fn drop(&mut self) {
        self.key.zeroize();
        self.value.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(core: &mut KeyedHashCore, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        core.generate(&mut out);
        out
    }

    #[test]
    fn test_deterministic() {
        let mut a = KeyedHashCore::instantiate(&[3u8; SEED_LEN]);
        let mut b = KeyedHashCore::instantiate(&[3u8; SEED_LEN]);
        assert_eq!(output(&mut a, 77), output(&mut b, 77));
    }

    #[test]
    fn test_partial_chunk_lengths() {
        let mut core = KeyedHashCore::instantiate(&[3u8; SEED_LEN]);
        assert_eq!(output(&mut core, 1).len(), 1);
        assert_eq!(output(&mut core, 33).len(), 33);
        assert!(output(&mut core, 0).is_empty());
    }

    #[test]
    fn test_generate_advances_state() {
        let mut core = KeyedHashCore::instantiate(&[3u8; SEED_LEN]);
        assert_ne!(output(&mut core, 32), output(&mut core, 32));
    }

    #[test]
    fn test_reseed_mixes_not_replaces() {
        let mut a = KeyedHashCore::instantiate(&[1u8; SEED_LEN]);
        let mut b = KeyedHashCore::instantiate(&[2u8; SEED_LEN]);
        a.reseed(&[9u8; 32]);
        b.reseed(&[9u8; 32]);
        assert_ne!(output(&mut a, 32), output(&mut b, 32));
    }

    #[test]
    fn test_seed_sensitivity() {
        let mut seed = [5u8; SEED_LEN];
        let mut a = KeyedHashCore::instantiate(&seed);
        seed[SEED_LEN - 1] ^= 1;
        let mut b = KeyedHashCore::instantiate(&seed);
        assert_ne!(output(&mut a, 32), output(&mut b, 32));
    }
}
