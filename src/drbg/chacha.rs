//! ChaCha20 stream-cipher DRBG.
//!
//! # State
//!
//! A 256-bit key and a 64-bit stream id drive `ChaCha20Rng`. Both are
//! derived with BLAKE3 in key-derivation mode:
//!
//! - instantiate: `KDF(INSTANTIATE, seed)`
//! - reseed: `KDF(RESEED, counter || key || stream || word_pos || entropy)`
//!
//! Reseeding therefore mixes fresh input into the current state instead
//! of replacing it. After every generate call the next key is drawn from
//! the keystream itself (fast key erasure), so a later state compromise
//! does not reveal earlier output.

use blake3::Hasher;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use zeroize::Zeroize;

const INSTANTIATE_CONTEXT: &str = "aleamaris 2024 chacha20-drbg instantiate v1";
const RESEED_CONTEXT: &str = "aleamaris 2024 chacha20-drbg reseed v1";

pub(crate) const KEY_LEN: usize = 32;
pub(crate) const NONCE_LEN: usize = 8;
/// Key plus stream nonce.
pub(crate) const SEED_LEN: usize = KEY_LEN + NONCE_LEN;

pub(crate) struct ChaChaCore {
    key: [u8; KEY_LEN],
    stream: u64,
    rng: ChaCha20Rng,
    reseed_counter: u64,
}

impl ChaChaCore {
    pub(crate) fn instantiate(seed: &[u8]) -> Self {
        let mut hasher = Hasher::new_derive_key(INSTANTIATE_CONTEXT);
        hasher.update(&(seed.len() as u64).to_le_bytes());
        hasher.update(seed);
        let core = Self::from_kdf(&hasher, 0);
        hasher.zeroize();
        core
    }

    pub(crate) fn reseed(&mut self, entropy: &[u8]) {
        self.reseed_counter = self.reseed_counter.wrapping_add(1);

        let mut hasher = Hasher::new_derive_key(RESEED_CONTEXT);
        hasher.update(&self.reseed_counter.to_le_bytes());
        hasher.update(&self.key);
        hasher.update(&self.stream.to_le_bytes());
        hasher.update(&self.rng.get_word_pos().to_le_bytes());
        hasher.update(entropy);

        let next = Self::from_kdf(&hasher, self.reseed_counter);
        hasher.zeroize();
        self.key.zeroize();
        *self = next;
    }

    pub(crate) fn generate(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);

        let mut next = [0u8; SEED_LEN];
        self.rng.fill_bytes(&mut next);
        self.key.copy_from_slice(&next[..KEY_LEN]);
        self.stream = u64::from_le_bytes(nonce_bytes(&next));
        self.rng = Self::keyed_rng(&self.key, self.stream);
        next.zeroize();
    }

    fn from_kdf(hasher: &Hasher, reseed_counter: u64) -> Self {
        let mut material = [0u8; SEED_LEN];
        hasher.finalize_xof().fill(&mut material);

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&material[..KEY_LEN]);
        let stream = u64::from_le_bytes(nonce_bytes(&material));
        material.zeroize();

        Self {
            rng: Self::keyed_rng(&key, stream),
            key,
            stream,
            reseed_counter,
        }
    }

    fn keyed_rng(key: &[u8; KEY_LEN], stream: u64) -> ChaCha20Rng {
        let mut rng = ChaCha20Rng::from_seed(*key);
        rng.set_stream(stream);
        rng
    }
}

fn nonce_bytes(material: &[u8; SEED_LEN]) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&material[KEY_LEN..]);
    nonce
}

impl Drop for ChaChaCore {
    fn drop(&mut self) {
        self.key.zeroize();
        self.stream.zeroize();
    }
}
