//! File digests and similarity helpers
//!
//! SHA-256 is the only sanctioned key for the summary cache. MD5 exists
//! solely as the duplicate detector's fast pre-filter; the signature /
//! hamming helpers back near-duplicate text comparison.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const READ_BLOCK: usize = 64 * 1024;

/// SHA-256 digest of a file's bytes, hex-encoded (64 chars).
pub fn sha256_file(path: &Path) -> crate::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_BLOCK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// MD5 digest of a file's bytes, hex-encoded (32 chars).
pub fn md5_file(path: &Path) -> crate::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; READ_BLOCK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Sum of per-byte bit differences over the first `n_bytes` of both slices.
pub fn hamming_distance(a: &[u8], b: &[u8], n_bytes: usize) -> u32 {
    let n = n_bytes.min(a.len()).min(b.len());
    a[..n]
        .iter()
        .zip(&b[..n])
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}

/// 64-bit simhash-style signature over character trigrams.
///
/// Similar texts produce signatures with small hamming distances.
pub fn text_signature(text: &str) -> u64 {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 3 {
        return fnv1a(text.as_bytes());
    }

    let mut weights = [0i32; 64];
    for window in chars.windows(3) {
        let mut bytes = [0u8; 12];
        let mut len = 0;
        for c in window {
            len += c.encode_utf8(&mut bytes[len..]).len();
        }
        let h = fnv1a(&bytes[..len]);
        for (bit, weight) in weights.iter_mut().enumerate() {
            if h & (1 << bit) != 0 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }

    let mut sig = 0u64;
    for (bit, weight) in weights.iter().enumerate() {
        if *weight > 0 {
            sig |= 1 << bit;
        }
    }
    sig
}

/// Similarity of two 64-bit signatures in [0, 1].
pub fn signature_similarity(a: u64, b: u64) -> f64 {
    let distance = (a ^ b).count_ones();
    1.0 - (distance as f64 / 64.0)
}

/// Group paths by MD5 digest; groups with more than one member are
/// candidate duplicate sets. Unreadable files are dropped.
pub fn duplicate_candidates(paths: &[PathBuf]) -> HashMap<String, Vec<PathBuf>> {
    let mut groups: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for path in paths {
        if let Ok(digest) = md5_file(path) {
            groups.entry(digest).or_default().push(path.clone());
        }
    }
    groups.retain(|_, v| v.len() > 1);
    groups
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in bytes {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_known_vector() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_md5_known_vector() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(md5_file(&path).unwrap(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_hash_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = sha256_file(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, crate::SkiffError::Io(_)));
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(&[0xFF], &[0x00], 1), 8);
        assert_eq!(hamming_distance(&[0b1010], &[0b0101], 1), 4);
        assert_eq!(hamming_distance(&[1, 2, 3], &[1, 2, 3], 3), 0);
        // Extra bytes past n_bytes are ignored
        assert_eq!(hamming_distance(&[1, 0xFF], &[1, 0x00], 1), 0);
    }

    #[test]
    fn test_text_signature_similarity() {
        let a = "The quick brown fox jumps over the lazy dog";
        let b = "The quick brown fox jumps over the lazy cat";
        let c = "Completely unrelated content about databases";

        let close = signature_similarity(text_signature(a), text_signature(b));
        let far = signature_similarity(text_signature(a), text_signature(c));
        assert!(close > far, "close={close} far={far}");
        assert_eq!(signature_similarity(text_signature(a), text_signature(a)), 1.0);
    }

    #[test]
    fn test_duplicate_candidates_groups_identical_content() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let c = dir.path().join("c.bin");
        fs::write(&a, "same bytes").unwrap();
        fs::write(&b, "same bytes").unwrap();
        fs::write(&c, "other bytes").unwrap();

        let groups = duplicate_candidates(&[a.clone(), b.clone(), c]);
        assert_eq!(groups.len(), 1);
        let group = groups.values().next().unwrap();
        assert!(group.contains(&a) && group.contains(&b));
    }
}
