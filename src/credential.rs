//! One-way password hashing.
//!
//! Passwords are pre-hashed with SHA-256 (bcrypt only consumes 72 bytes) and
//! then run through bcrypt with a per-password random salt. The stored form is
//! `$bcs$<cost>$<salt>$<digest>` with URL-safe base64 segments.

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use ::crypto::bcrypt::bcrypt;
use ::crypto::util::fixed_time_eq;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::util::base64_engine;

pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;
pub const DEFAULT_COST: u32 = 10;

const SCHEME: &str = "bcs";

pub type Salt = [u8; 16];
type Digest24 = [u8; 24];

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("entropy source failed: {0}")]
    Entropy(#[from] rand::Error),
    #[error("bcrypt cost {0} is outside of {MIN_COST}..={MAX_COST}")]
    Cost(u32),
    #[error("stored password hash is malformed")]
    Malformed,
}

#[derive(Clone, Eq, PartialEq)]
pub struct PasswordHash {
    cost: u32,
    salt: Salt,
    digest: Digest24,
}

fn derive(password: &[u8], cost: u32, salt: &Salt) -> Digest24 {
    let mut digest: Digest24 = [0; 24];

    let mut sha = Sha256::new();
    sha2::Digest::update(&mut sha, password);

    bcrypt(cost, salt, sha.finalize().as_slice(), &mut digest);

    digest
}

impl PasswordHash {
    pub fn new(password: impl AsRef<str>, cost: u32) -> Result<PasswordHash, CredentialError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(CredentialError::Cost(cost));
        }

        let mut salt: Salt = [0; 16];
        OsRng.try_fill_bytes(&mut salt)?;

        Ok(PasswordHash {
            cost,
            salt,
            digest: derive(password.as_ref().as_bytes(), cost, &salt),
        })
    }

    /// Never fails: a mismatch is simply `false`.
    pub fn verify(&self, password: impl AsRef<str>) -> bool {
        let candidate = derive(password.as_ref().as_bytes(), self.cost, &self.salt);
        fixed_time_eq(&candidate, &self.digest)
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Debug for PasswordHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PasswordHash(cost: {}, ..)", self.cost)
    }
}

impl Display for PasswordHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let engine = base64_engine();
        write!(
            f,
            "${}${}${}${}",
            SCHEME,
            self.cost,
            engine.encode(self.salt),
            engine.encode(self.digest)
        )
    }
}

impl FromStr for PasswordHash {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('$').collect();
        let (cost, salt, digest) = match parts.as_slice() {
            ["", scheme, cost, salt, digest] if *scheme == SCHEME => (cost, salt, digest),
            _ => return Err(CredentialError::Malformed),
        };

        let cost: u32 = cost.parse().map_err(|_| CredentialError::Malformed)?;
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(CredentialError::Cost(cost));
        }

        let engine = base64_engine();
        let salt: Salt = engine
            .decode(salt)
            .ok()
            .and_then(|it| it.try_into().ok())
            .ok_or(CredentialError::Malformed)?;
        let digest: Digest24 = engine
            .decode(digest)
            .ok()
            .and_then(|it| it.try_into().ok())
            .ok_or(CredentialError::Malformed)?;

        Ok(PasswordHash { cost, salt, digest })
    }
}

impl Serialize for PasswordHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PasswordHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        PasswordHash::from_str(&value).map_err(D::Error::custom)
    }
}
