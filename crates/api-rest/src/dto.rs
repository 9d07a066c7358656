//! Request and response bodies.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bsfm_core::constants::API_PREFIX;
use bsfm_core::{FileAttributes, FileRecord, NonEmptyText, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// A file submitted for storage. `fileContent` is standard base64.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepositReq {
    pub original_file_name: String,
    /// Detected from the content when omitted.
    #[serde(default)]
    pub content_type: Option<String>,
    pub owner_key: String,
    pub target_year: i32,
    #[serde(default)]
    pub external_ref: Option<String>,
    /// Defaults to `true`.
    #[serde(default)]
    pub is_attachment: Option<bool>,
    pub file_content: String,
}

impl DepositReq {
    /// Decodes the content and validates the attributes.
    pub fn into_parts(self) -> StoreResult<(FileAttributes, Vec<u8>)> {
        let content = STANDARD
            .decode(self.file_content.trim())
            .map_err(|e| StoreError::InvalidInput(format!("fileContent is not valid base64: {e}")))?;

        let content_type = match self.content_type.as_deref().map(str::trim) {
            Some(ct) if !ct.is_empty() => ct.to_owned(),
            _ => bsfm_files::detect_content_type(&content).to_owned(),
        };

        let attributes = FileAttributes {
            original_file_name: required("originalFileName", &self.original_file_name)?,
            content_type: required("contentType", &content_type)?,
            owner_key: required("ownerKey", &self.owner_key)?,
            target_year: self.target_year,
            external_ref: self.external_ref,
            is_attachment: self.is_attachment.unwrap_or(true),
        };
        Ok((attributes, content))
    }
}

fn required(field: &str, value: &str) -> StoreResult<NonEmptyText> {
    NonEmptyText::new(value).map_err(|e| StoreError::InvalidInput(format!("{field}: {e}")))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetMultipleReq {
    pub file_keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusReq {
    #[serde(default)]
    pub status: Option<i32>,
    #[serde(default)]
    pub status_linked_data: Option<String>,
}

/// A stored file's metadata as presented to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoRes {
    pub file_key: String,
    pub original_file_name: String,
    pub content_type: String,
    pub content_size: u64,
    pub content_hash: String,
    pub logical_folder: String,
    pub owner_key: String,
    pub target_year: i32,
    pub external_ref: Option<String>,
    /// `YYYY-MM-DD`
    pub storage_date: String,
    pub status: i32,
    pub status_linked_data: Option<String>,
    pub is_special: bool,
    pub is_public: bool,
    pub is_attachment: bool,
    pub content_uri: String,
    pub infos_uri: String,
}

impl From<&FileRecord> for FileInfoRes {
    fn from(record: &FileRecord) -> Self {
        let key = record.file_key().as_str();
        let content_uri = if record.is_public() {
            format!("{API_PREFIX}/publicContent/{key}")
        } else {
            format!("{API_PREFIX}/fileInfos/{key}/getContent")
        };

        Self {
            file_key: key.to_owned(),
            original_file_name: record.original_file_name().to_owned(),
            content_type: record.content_type().to_owned(),
            content_size: record.content_size(),
            content_hash: record.content_hash().to_owned(),
            logical_folder: record.logical_folder().to_string(),
            owner_key: record.owner_key().to_owned(),
            target_year: record.target_year(),
            external_ref: record.external_ref().map(str::to_owned),
            storage_date: record.storage_date().format("%Y-%m-%d").to_string(),
            status: record.status().code(),
            status_linked_data: record.status_linked_data().map(str::to_owned),
            is_special: record.is_special(),
            is_public: record.is_public(),
            is_attachment: record.is_attachment(),
            content_uri,
            infos_uri: format!("{API_PREFIX}/fileInfos/{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: &str) -> DepositReq {
        DepositReq {
            original_file_name: "report.pdf".into(),
            content_type: None,
            owner_key: "ACME".into(),
            target_year: 2024,
            external_ref: Some("  ".into()),
            is_attachment: None,
            file_content: content.into(),
        }
    }

    #[test]
    fn content_type_is_detected_when_omitted() {
        // 1x1 GIF header
        let gif = STANDARD.encode(b"GIF89a\x01\x00\x01\x00\x00\x00\x00");
        let (attrs, bytes) = request(&gif).into_parts().unwrap();
        assert_eq!(attrs.content_type.as_str(), "image/gif");
        assert!(attrs.is_attachment);
        assert_eq!(bytes.len(), 13);
    }

    #[test]
    fn invalid_base64_is_invalid_input() {
        assert!(matches!(
            request("not base64!").into_parts(),
            Err(StoreError::InvalidInput(msg)) if msg.contains("fileContent")
        ));
    }

    #[test]
    fn blank_owner_is_invalid_input() {
        let mut req = request("aGVsbG8=");
        req.owner_key = " ".into();
        assert!(matches!(
            req.into_parts(),
            Err(StoreError::InvalidInput(msg)) if msg.contains("ownerKey")
        ));
    }

    #[test]
    fn request_uses_camel_case_fields() {
        let json = r#"{"originalFileName":"a.txt","ownerKey":"ACME","targetYear":2024,"fileContent":"aGVsbG8="}"#;
        let req: DepositReq = serde_json::from_str(json).unwrap();
        assert_eq!(req.original_file_name, "a.txt");
        assert!(req.external_ref.is_none());
        assert!(req.content_type.is_none());
    }
}
