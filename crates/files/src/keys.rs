//! Deterministic identity derivation.
//!
//! A stored file is identified by the SHA-256 digest of its *identity tuple*: owner key,
//! special flag, public flag, logical folder, target year, external reference (or
//! [`EXTERNAL_REF_PLACEHOLDER`]) and original filename, joined with `/`.
//!
//! The same digest is rendered twice:
//!
//! - [`FileKey`]: URL-safe base64 without padding (43 characters), the public identifier
//! - [`StorageName`]: uppercase hexadecimal (64 characters), used only to name physical files
//!
//! Both are pure functions of the tuple, so depositing the same logical file twice under the
//! same classification derives the same keys and collides on purpose.

use crate::constants::{EXTERNAL_REF_PLACEHOLDER, IDENTITY_DELIMITER};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::fmt;

const FILE_KEY_LEN: usize = 43;
const STORAGE_NAME_LEN: usize = 64;

/// Public, URL-safe identity of a stored file.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileKey(String);

impl FileKey {
    /// Validates an externally supplied file key.
    ///
    /// A valid key is exactly 43 characters from the URL-safe base64 alphabet.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `input` cannot be a derived key.
    pub fn parse(input: &str) -> Result<Self, String> {
        if input.len() != FILE_KEY_LEN {
            return Err(format!(
                "file key must be {FILE_KEY_LEN} characters, got {}",
                input.len()
            ));
        }
        if !input
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err("file key must use the URL-safe base64 alphabet".into());
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FileKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FileKey> for String {
    fn from(value: FileKey) -> Self {
        value.0
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hexadecimal identity used to name physical files.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageName(String);

impl StorageName {
    /// Validates a storage name: 64 uppercase hexadecimal characters.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `input` is not in canonical form.
    pub fn parse(input: &str) -> Result<Self, String> {
        let canonical = input.len() == STORAGE_NAME_LEN
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'F'));
        if canonical {
            Ok(Self(input.to_owned()))
        } else {
            Err(format!(
                "storage name must be {STORAGE_NAME_LEN} uppercase hex characters, got '{input}'"
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StorageName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StorageName> for String {
    fn from(value: StorageName) -> Self {
        value.0
    }
}

impl fmt::Display for StorageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The classification attributes whose digest is a file's identity.
#[derive(Clone, Copy, Debug)]
pub struct IdentityTuple<'a> {
    pub owner_key: &'a str,
    pub is_special: bool,
    pub is_public: bool,
    pub folder: &'a str,
    pub target_year: i32,
    pub external_ref: Option<&'a str>,
    pub original_file_name: &'a str,
}

impl IdentityTuple<'_> {
    /// Joins the tuple into the composite string that gets hashed.
    pub fn composite(&self) -> String {
        let d = IDENTITY_DELIMITER;
        format!(
            "{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}",
            self.owner_key,
            self.is_special,
            self.is_public,
            self.folder,
            self.target_year,
            self.external_ref.unwrap_or(EXTERNAL_REF_PLACEHOLDER),
            self.original_file_name,
        )
    }

    /// Derives both renderings of the identity digest.
    pub fn derive(&self) -> (FileKey, StorageName) {
        let digest: [u8; 32] = Sha256::digest(self.composite().as_bytes()).into();
        (
            FileKey(URL_SAFE_NO_PAD.encode(digest)),
            StorageName(hex::encode_upper(digest)),
        )
    }
}

/// Computes `(fileKey, storageHashedFileName)` for a classification tuple.
pub fn derive(
    owner_key: &str,
    is_special: bool,
    is_public: bool,
    folder: &str,
    target_year: i32,
    external_ref: Option<&str>,
    original_file_name: &str,
) -> (FileKey, StorageName) {
    IdentityTuple {
        owner_key,
        is_special,
        is_public,
        folder,
        target_year,
        external_ref,
        original_file_name,
    }
    .derive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme_report() -> IdentityTuple<'static> {
        IdentityTuple {
            owner_key: "ACME",
            is_special: false,
            is_public: false,
            folder: "DOCS",
            target_year: 2024,
            external_ref: None,
            original_file_name: "report.pdf",
        }
    }

    #[test]
    fn composite_uses_placeholder_for_missing_external_ref() {
        assert_eq!(
            acme_report().composite(),
            "ACME/false/false/DOCS/2024/-/report.pdf"
        );

        let with_ref = IdentityTuple {
            external_ref: Some("EXT-42"),
            is_special: true,
            ..acme_report()
        };
        assert_eq!(
            with_ref.composite(),
            "ACME/true/false/DOCS/2024/EXT-42/report.pdf"
        );
    }

    #[test]
    fn derive_is_deterministic() {
        let first = acme_report().derive();
        let second = derive("ACME", false, false, "DOCS", 2024, None, "report.pdf");
        assert_eq!(first, second);
    }

    #[test]
    fn both_renderings_encode_the_same_digest() {
        let (key, name) = acme_report().derive();

        let expected = Sha256::digest(b"ACME/false/false/DOCS/2024/-/report.pdf");
        assert_eq!(name.as_str(), hex::encode_upper(expected));
        assert_eq!(key.as_str(), URL_SAFE_NO_PAD.encode(expected));

        assert_eq!(key.as_str().len(), 43);
        assert!(!key.as_str().contains(['+', '/', '=']));
        assert_eq!(name.as_str().len(), 64);
    }

    #[test]
    fn every_tuple_field_changes_the_identity() {
        let base = acme_report().derive();
        let variants = [
            IdentityTuple {
                owner_key: "ACME2",
                ..acme_report()
            },
            IdentityTuple {
                is_special: true,
                ..acme_report()
            },
            IdentityTuple {
                is_public: true,
                ..acme_report()
            },
            IdentityTuple {
                folder: "INVOICES",
                ..acme_report()
            },
            IdentityTuple {
                target_year: 2025,
                ..acme_report()
            },
            IdentityTuple {
                external_ref: Some("EXT-1"),
                ..acme_report()
            },
            IdentityTuple {
                original_file_name: "report2.pdf",
                ..acme_report()
            },
        ];

        for variant in variants {
            let derived = variant.derive();
            assert_ne!(derived.0, base.0, "{}", variant.composite());
            assert_ne!(derived.1, base.1, "{}", variant.composite());
        }
    }

    #[test]
    fn file_key_parse_rejects_foreign_alphabets() {
        let (key, _) = acme_report().derive();
        assert_eq!(FileKey::parse(key.as_str()).unwrap(), key);

        assert!(FileKey::parse("short").is_err());
        let padded = format!("{}=", &key.as_str()[..42]);
        assert!(FileKey::parse(&padded).is_err());
    }

    #[test]
    fn storage_name_parse_requires_uppercase_hex() {
        let (_, name) = acme_report().derive();
        assert_eq!(StorageName::parse(name.as_str()).unwrap(), name);
        assert!(StorageName::parse(&name.as_str().to_lowercase()).is_err());
        assert!(StorageName::parse("ABC").is_err());
    }

    #[test]
    fn keys_serialize_as_plain_strings() {
        let (key, name) = acme_report().derive();
        let json = serde_json::to_string(&(key.clone(), name.clone())).unwrap();
        let back: (FileKey, StorageName) = serde_json::from_str(&json).unwrap();
        assert_eq!(back, (key, name));

        assert!(serde_json::from_str::<FileKey>("\"not a key\"").is_err());
    }
}
