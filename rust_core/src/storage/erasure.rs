//! Erasure Coding using Reed-Solomon
//!
//! Encodes a block into `n` shards where any `k` reconstruct it. The code is
//! systematic: shards `0..k` are the padded data blocks, `k..n` are parity.
//!
//! Before splitting, a block is padded to a multiple of `k` bytes by appending
//! `padlen = k - (len % k)` copies of the byte `k - padlen`. Decoding reads the
//! last byte back and strips `k - last` bytes.

use super::StorageError;
use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};

/// Largest shard count GF(2^8) supports
pub const MAX_SHARDS: usize = 256;

/// Configuration for erasure coding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureConfig {
    /// Minimum shards needed to reconstruct
    pub k: usize,

    /// Total shards produced per block
    pub n: usize,
}

impl ErasureConfig {
    /// Create a new erasure config
    pub fn new(k: usize, n: usize) -> Self {
        Self { k, n }
    }

    /// Check `1 <= k <= n <= 256`
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.k == 0 {
            return Err(StorageError::InvalidErasureParams(
                "k must be at least 1".into(),
            ));
        }
        if self.k > self.n {
            return Err(StorageError::InvalidErasureParams(format!(
                "k ({}) must not exceed n ({})",
                self.k, self.n
            )));
        }
        if self.n > MAX_SHARDS {
            return Err(StorageError::InvalidErasureParams(format!(
                "n ({}) exceeds the {} shard limit",
                self.n, MAX_SHARDS
            )));
        }
        Ok(())
    }

    /// Number of parity shards
    pub fn parity_shards(&self) -> usize {
        self.n - self.k
    }

    /// Maximum shards that can be lost
    pub fn max_losses(&self) -> usize {
        self.parity_shards()
    }
}

impl Default for ErasureConfig {
    fn default() -> Self {
        // 3 data + 3 parity: any 3 of 6 shards recover the stripe
        Self { k: 3, n: 6 }
    }
}

/// A single shard of encoded data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Shard index (0 to n - 1)
    pub index: usize,

    /// Shard data
    pub data: Vec<u8>,

    /// Is this a parity shard?
    pub is_parity: bool,
}

/// Pad `block` to a multiple of `k` bytes.
///
/// A block whose length is already a multiple of `k` still gains `k` bytes,
/// so the last byte always encodes the pad length.
pub fn pad_block(block: &[u8], k: usize) -> Vec<u8> {
    let padlen = k - (block.len() % k);
    let pad_byte = (k - padlen) as u8;

    let mut padded = Vec::with_capacity(block.len() + padlen);
    padded.extend_from_slice(block);
    padded.resize(block.len() + padlen, pad_byte);
    padded
}

/// Strip padding written by [`pad_block`].
pub fn unpad_block(mut buffer: Vec<u8>, k: usize) -> Result<Vec<u8>, StorageError> {
    let last = *buffer
        .last()
        .ok_or_else(|| StorageError::PaddingCorrupt("recovered buffer is empty".into()))?
        as usize;

    if last >= k {
        return Err(StorageError::PaddingCorrupt(format!(
            "pad marker {} is not below k ({})",
            last, k
        )));
    }

    let padlen = k - last;
    if padlen > buffer.len() {
        return Err(StorageError::PaddingCorrupt(format!(
            "pad length {} exceeds buffer length {}",
            padlen,
            buffer.len()
        )));
    }

    buffer.truncate(buffer.len() - padlen);
    Ok(buffer)
}

/// Reed-Solomon codec for a fixed `(k, n)`
pub struct ErasureCodec {
    config: ErasureConfig,

    /// `None` when `k == n`: there is no parity to compute
    rs: Option<ReedSolomon>,
}

impl ErasureCodec {
    /// Create a new codec
    pub fn new(config: ErasureConfig) -> Result<Self, StorageError> {
        config.validate()?;

        let rs = if config.parity_shards() == 0 {
            None
        } else {
            Some(
                ReedSolomon::new(config.k, config.parity_shards())
                    .map_err(|e| StorageError::ErasureCoding(e.to_string()))?,
            )
        };

        Ok(Self { config, rs })
    }

    /// Get the config
    pub fn config(&self) -> ErasureConfig {
        self.config
    }

    /// Encode a block into `n` shards
    pub fn encode(&self, block: &[u8]) -> Result<Vec<Shard>, StorageError> {
        let k = self.config.k;
        let padded = pad_block(block, k);
        let shard_size = padded.len() / k;

        let mut shards: Vec<Vec<u8>> = padded.chunks(shard_size).map(|c| c.to_vec()).collect();
        shards.resize(self.config.n, vec![0u8; shard_size]);

        if let Some(rs) = &self.rs {
            // Fills the parity shards in place
            rs.encode(&mut shards)
                .map_err(|e| StorageError::ErasureCoding(e.to_string()))?;
        }

        Ok(shards
            .into_iter()
            .enumerate()
            .map(|(index, data)| Shard {
                index,
                data,
                is_parity: index >= k,
            })
            .collect())
    }

    /// Encode text by its UTF-8 bytes
    pub fn encode_text(&self, text: &str) -> Result<Vec<Shard>, StorageError> {
        self.encode(text.as_bytes())
    }

    /// Recover the padded data blocks, concatenated.
    ///
    /// `shards` must hold exactly `n` entries, `None` marking a missing shard.
    /// Only the first `k` present shards (in index order) are used.
    pub fn decode_padded(&self, shards: Vec<Option<Vec<u8>>>) -> Result<Vec<u8>, StorageError> {
        let ErasureConfig { k, n } = self.config;

        if shards.len() != n {
            return Err(StorageError::ShardCountMismatch {
                expected: n,
                got: shards.len(),
            });
        }

        let available = shards.iter().filter(|s| s.is_some()).count();
        if available < k {
            return Err(StorageError::InsufficientShards {
                have: available,
                need: k,
            });
        }

        // Keep the first k present shards, drop the rest
        let mut selected: Vec<Option<Vec<u8>>> = Vec::with_capacity(n);
        let mut taken = 0;
        for shard in shards {
            match shard {
                Some(data) if taken < k => {
                    taken += 1;
                    selected.push(Some(data));
                }
                _ => selected.push(None),
            }
        }

        let shard_size = selected
            .iter()
            .flatten()
            .map(|s| s.len())
            .next()
            .unwrap_or(0);
        if selected.iter().flatten().any(|s| s.len() != shard_size) {
            return Err(StorageError::ErasureCoding(
                "shards have inconsistent lengths".into(),
            ));
        }

        if let Some(rs) = &self.rs {
            rs.reconstruct_data(&mut selected)
                .map_err(|e| StorageError::ErasureCoding(e.to_string()))?;
        }

        let mut result = Vec::with_capacity(shard_size * k);
        for shard in selected.iter().take(k) {
            match shard {
                Some(data) => result.extend_from_slice(data),
                None => {
                    return Err(StorageError::ErasureCoding("Reconstruction failed".into()))
                }
            }
        }

        Ok(result)
    }

    /// Decode shards back to the original block
    pub fn decode(&self, shards: Vec<Option<Vec<u8>>>) -> Result<Vec<u8>, StorageError> {
        let padded = self.decode_padded(shards)?;
        unpad_block(padded, self.config.k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn all_present(shards: &[Shard]) -> Vec<Option<Vec<u8>>> {
        shards.iter().map(|s| Some(s.data.clone())).collect()
    }

    #[test]
    fn test_erasure_config() {
        let config = ErasureConfig::default();

        assert_eq!(config.k, 3);
        assert_eq!(config.n, 6);
        assert_eq!(config.parity_shards(), 3);
        assert_eq!(config.max_losses(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        assert!(ErasureCodec::new(ErasureConfig::new(0, 4)).is_err());
        assert!(ErasureCodec::new(ErasureConfig::new(5, 4)).is_err());
        assert!(ErasureCodec::new(ErasureConfig::new(3, 257)).is_err());
        assert!(matches!(
            ErasureCodec::new(ErasureConfig::new(300, 300)),
            Err(StorageError::InvalidErasureParams(_))
        ));
    }

    #[test]
    fn test_padding_formula() {
        // 16 bytes, k = 3: padlen = 2, pad byte = 1
        let padded = pad_block(&[7u8; 16], 3);
        assert_eq!(padded.len(), 18);
        assert_eq!(&padded[16..], &[1, 1]);

        // Already aligned: a full k bytes of value 0
        let padded = pad_block(&[7u8; 6], 3);
        assert_eq!(padded.len(), 9);
        assert_eq!(&padded[6..], &[0, 0, 0]);

        assert_eq!(unpad_block(pad_block(b"hello", 4), 4).unwrap(), b"hello");
        assert_eq!(unpad_block(pad_block(b"", 5), 5).unwrap(), b"");
    }

    #[test]
    fn test_corrupt_padding() {
        // Marker must be below k
        assert!(matches!(
            unpad_block(vec![1, 2, 9], 3),
            Err(StorageError::PaddingCorrupt(_))
        ));
        // Pad length 4 over a 2-byte buffer
        assert!(matches!(
            unpad_block(vec![0, 0], 4),
            Err(StorageError::PaddingCorrupt(_))
        ));
        assert!(matches!(
            unpad_block(vec![], 4),
            Err(StorageError::PaddingCorrupt(_))
        ));
    }

    #[test]
    fn test_encode_decode_no_loss() {
        let codec = ErasureCodec::new(ErasureConfig::new(4, 6)).unwrap();

        let original = b"Hello, StripeStore! This is test data for erasure coding.";
        let shards = codec.encode(original).unwrap();

        assert_eq!(shards.len(), 6);
        assert_eq!(shards.iter().filter(|s| s.is_parity).count(), 2);

        let decoded = codec.decode(all_present(&shards)).unwrap();
        assert_eq!(decoded, original.to_vec());
    }

    #[test]
    fn test_text_encodes_as_utf8() {
        let codec = ErasureCodec::new(ErasureConfig::new(3, 5)).unwrap();
        let text = "naïve café, stored as text";

        let shards = codec.encode_text(text).unwrap();
        assert_eq!(shards, codec.encode(text.as_bytes()).unwrap());
        assert_eq!(codec.decode(all_present(&shards)).unwrap(), text.as_bytes());
    }

    #[test]
    fn test_systematic_layout() {
        let codec = ErasureCodec::new(ErasureConfig::new(3, 5)).unwrap();
        let block = b"abcdefgh";
        let shards = codec.encode(block).unwrap();

        let data: Vec<u8> = shards[..3].iter().flat_map(|s| s.data.clone()).collect();
        assert_eq!(data, pad_block(block, 3));
    }

    #[test]
    fn test_encode_decode_with_loss() {
        let codec = ErasureCodec::new(ErasureConfig::new(4, 6)).unwrap();

        let original = b"Hello, StripeStore! This is test data for erasure coding.";
        let shards = codec.encode(original).unwrap();

        let mut shard_opts = all_present(&shards);
        shard_opts[1] = None;
        shard_opts[3] = None;

        assert_eq!(codec.decode(shard_opts).unwrap(), original.to_vec());
    }

    #[test]
    fn test_too_many_losses() {
        let codec = ErasureCodec::new(ErasureConfig::new(4, 6)).unwrap();
        let shards = codec.encode(b"Hello, StripeStore!").unwrap();

        let mut shard_opts = all_present(&shards);
        shard_opts[0] = None;
        shard_opts[2] = None;
        shard_opts[4] = None;

        assert!(matches!(
            codec.decode(shard_opts),
            Err(StorageError::InsufficientShards { have: 3, need: 4 })
        ));
    }

    #[test]
    fn test_wrong_shard_count() {
        let codec = ErasureCodec::new(ErasureConfig::new(2, 4)).unwrap();
        let result = codec.decode(vec![Some(vec![1]), Some(vec![2])]);

        assert!(matches!(
            result,
            Err(StorageError::ShardCountMismatch { expected: 4, got: 2 })
        ));
    }

    #[test]
    fn test_no_parity() {
        let codec = ErasureCodec::new(ErasureConfig::new(3, 3)).unwrap();
        let shards = codec.encode(b"no parity here").unwrap();
        assert_eq!(shards.len(), 3);

        assert_eq!(codec.decode(all_present(&shards)).unwrap(), b"no parity here");

        let mut missing = all_present(&shards);
        missing[2] = None;
        assert!(codec.decode(missing).is_err());
    }

    #[test]
    fn test_max_shards() {
        let codec = ErasureCodec::new(ErasureConfig::new(200, 256)).unwrap();
        let original: Vec<u8> = (0..5000).map(|i| (i % 256) as u8).collect();
        let shards = codec.encode(&original).unwrap();

        let mut shard_opts = all_present(&shards);
        for slot in shard_opts.iter_mut().take(56) {
            *slot = None;
        }

        assert_eq!(codec.decode(shard_opts).unwrap(), original);
    }

    #[test]
    fn test_large_data() {
        let codec = ErasureCodec::new(ErasureConfig::new(10, 14)).unwrap();

        let original: Vec<u8> = (0..1_000_000).map(|i| (i % 256) as u8).collect();
        let shards = codec.encode(&original).unwrap();

        let mut shard_opts = all_present(&shards);
        shard_opts[0] = None;
        shard_opts[5] = None;
        shard_opts[10] = None;
        shard_opts[13] = None;

        assert_eq!(codec.decode(shard_opts).unwrap(), original);
    }

    fn params() -> impl Strategy<Value = (usize, usize)> {
        (1usize..=12).prop_flat_map(|k| (Just(k), k..=16))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_any_k_subset_recovers(
            (k, n) in params(),
            block in proptest::collection::vec(any::<u8>(), 0..200),
            seed in any::<u64>(),
        ) {
            use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

            let codec = ErasureCodec::new(ErasureConfig::new(k, n)).unwrap();
            let shards = codec.encode(&block).unwrap();
            prop_assert_eq!(shards.len(), n);

            let mut indices: Vec<usize> = (0..n).collect();
            indices.shuffle(&mut StdRng::seed_from_u64(seed));
            let keep = &indices[..k];

            let subset: Vec<Option<Vec<u8>>> = shards
                .iter()
                .map(|s| keep.contains(&s.index).then(|| s.data.clone()))
                .collect();

            prop_assert_eq!(codec.decode(subset).unwrap(), block);
        }

        #[test]
        fn prop_fewer_than_k_fails(
            (k, n) in params(),
            block in proptest::collection::vec(any::<u8>(), 0..100),
            present in 0usize..12,
        ) {
            let present = present % k;
            let codec = ErasureCodec::new(ErasureConfig::new(k, n)).unwrap();
            let shards = codec.encode(&block).unwrap();

            let subset: Vec<Option<Vec<u8>>> = shards
                .iter()
                .map(|s| (s.index < present).then(|| s.data.clone()))
                .collect();

            let is_insufficient = matches!(
                codec.decode(subset),
                Err(StorageError::InsufficientShards { .. })
            );
            prop_assert!(is_insufficient);
        }
    }
}
