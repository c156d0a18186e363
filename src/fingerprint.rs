// src/fingerprint.rs
//! Stable identity keys for observed papers.
//!
//! A fingerprint is the first 16 hex chars of a SHA-256 digest over the
//! paper's stable content (title + ordered authors, or the DOI alone).
//! Volatile fields such as citations, altmetric score or rank never enter
//! the hash, so the same paper keeps its key across runs.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::item::ObservedItem;

/// Number of hex characters kept from the digest.
pub const FINGERPRINT_LEN: usize = 16;

const FIELD_SEP: u8 = 0x1f;
const AUTHOR_SEP: u8 = 0x1e;

/// Which stable fields identify a paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    #[default]
    TitleAuthors,
    Doi,
}

/// Fixed-width lowercase hex identity of a paper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Accepts exactly 16 hex chars (either case; stored lowercase).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() == FINGERPRINT_LEN && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(s.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Fingerprint::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid fingerprint: {raw:?}")))
    }
}

/// Fingerprint of an observed item under the given mode.
pub fn fingerprint(item: &ObservedItem, mode: FingerprintMode) -> Fingerprint {
    match mode {
        FingerprintMode::TitleAuthors => fingerprint_title_authors(&item.title, &item.authors),
        FingerprintMode::Doi => fingerprint_doi(item.doi.as_deref().unwrap_or_default()),
    }
}

pub fn fingerprint_title_authors<S: AsRef<str>>(title: &str, authors: &[S]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([FIELD_SEP]);
    for a in authors {
        hasher.update(a.as_ref().as_bytes());
        hasher.update([AUTHOR_SEP]);
    }
    finish(hasher)
}

/// DOIs are case-insensitive, so the key is taken over the lowercased form.
pub fn fingerprint_doi(doi: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(doi.trim().to_ascii_lowercase().as_bytes());
    finish(hasher)
}

fn finish(hasher: Sha256) -> Fingerprint {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(FINGERPRINT_LEN);
    for b in digest.iter().take(FINGERPRINT_LEN / 2) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    Fingerprint(out)
}
