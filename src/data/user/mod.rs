use chrono::{DateTime, Utc};
use crypto::bcrypt::bcrypt;
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::convert::TryInto;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::role::Role;
use crate::util::normalize_email;

pub mod db;

pub static USER_COLLECTION_NAME: &str = "user";

/// Irreversible password credential: bcrypt over a SHA-256 pre-hash with
/// the process-wide salt. Stored as BSON generic binary.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PasswordHash([u8; 24]);

impl PasswordHash {
    pub fn new(password: impl AsRef<str>) -> PasswordHash {
        let mut pw_hash: [u8; 24] = [0; 24];

        let mut sha = Sha256::new();
        sha2::Digest::update(&mut sha, password.as_ref().as_bytes());

        bcrypt(
            15,
            &crate::SECURITY.salt,
            sha.finalize().as_slice(),
            &mut pw_hash,
        );

        PasswordHash(pw_hash)
    }

    pub fn matches(&self, password: impl AsRef<str>) -> bool {
        self == &PasswordHash::new(password)
    }
}

impl Serialize for PasswordHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for PasswordHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HashVisitor;

        impl<'de> de::Visitor<'de> for HashVisitor {
            type Value = PasswordHash;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("24 bytes of bcrypt output")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                v.try_into()
                    .map(PasswordHash)
                    .map_err(|_| E::invalid_length(v.len(), &self))
            }
        }

        deserializer.deserialize_bytes(HashVisitor)
    }
}

/// An account with a role. The stored email is always trimmed and
/// lowercased; `role` is only ever written by account-creation paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub pw_hash: PasswordHash,
    pub role: Role,
    #[serde(
        default = "Utc::now",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    pub created: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: impl AsRef<str>,
        full_name: impl ToString,
        password: impl AsRef<str>,
        role: Role,
    ) -> User {
        let id = Uuid::new_v4();
        tracing::info!("Creating a new {} account with UUID: {}", role, id);

        User {
            id,
            email: normalize_email(email),
            full_name: full_name.to_string(),
            pw_hash: PasswordHash::new(password),
            role,
            created: Utc::now(),
        }
    }
}

/// Presentation shape of an account; never carries the credential.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub created: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            created: user.created,
        }
    }
}
