//! Sample encryption
//!
//! AES-128-CTR with an 8-byte IV and an 8-byte block counter. Every sample is
//! encrypted on its own: sample `i` of a fragment uses IV `base + i` with the
//! counter starting at zero.

use aes::cipher::{KeyIvInit, StreamCipher};

use crate::error::{Error, Result};

type Aes128Ctr = ctr::Ctr64BE<aes::Aes128>;

/// Base IV of a fragment: its timestamp with the track id in the top byte
pub fn fragment_iv(track_id: u32, timestamp: u64) -> u64 {
    timestamp ^ ((track_id as u64) << 56)
}

/// Encrypt the samples of an assembled payload in place.
///
/// `header_len` bytes of `mdat` header are skipped. Returns the per-sample IVs
/// for the fragment's sample-encryption box.
pub fn encrypt_samples(
    key: &[u8; 16],
    base_iv: u64,
    payload: &mut [u8],
    header_len: usize,
    sample_sizes: impl IntoIterator<Item = u32>,
) -> Result<Vec<[u8; 8]>> {
    let mut ivs = Vec::new();
    let mut pos = header_len;

    for (i, size) in sample_sizes.into_iter().enumerate() {
        let end = pos + size as usize;
        let sample = payload
            .get_mut(pos..end)
            .ok_or_else(|| Error::Crypto(format!("sample {} overruns payload", i)))?;

        let iv = base_iv.wrapping_add(i as u64).to_be_bytes();
        let mut nonce = [0u8; 16];
        nonce[..8].copy_from_slice(&iv);
        let mut cipher = Aes128Ctr::new_from_slices(key, &nonce)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        cipher.apply_keystream(sample);

        ivs.push(iv);
        pos = end;
    }
    Ok(ivs)
}
