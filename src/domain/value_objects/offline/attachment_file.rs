use serde::{Deserialize, Serialize};

const FALLBACK_EXTENSION: &str = "bin";

/// Binary content queued for upload, e.g. an inspection photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentFile {
    pub file_name: String,
    pub content_type: Option<String>,
    #[serde(with = "bytes_as_base64")]
    pub bytes: Vec<u8>,
}

impl AttachmentFile {
    pub fn new(
        file_name: String,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, String> {
        if file_name.trim().is_empty() {
            return Err("Attachment file name cannot be empty".to_string());
        }
        if bytes.is_empty() {
            return Err(format!("{file_name} is empty"));
        }
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lower-cased extension taken from the file name, `bin` when there is none.
    pub fn extension(&self) -> String {
        match self.file_name.rsplit_once('.') {
            Some((stem, ext))
                if !stem.is_empty()
                    && !ext.is_empty()
                    && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                ext.to_ascii_lowercase()
            }
            _ => FALLBACK_EXTENSION.to_string(),
        }
    }
}

mod bytes_as_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
