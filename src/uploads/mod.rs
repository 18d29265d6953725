//! Payment slip intake: image validation and object storage

pub mod image_validator;
pub mod storage;

/// A file received from a multipart upload
#[derive(Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl UploadedFile {
    /// Lower-cased extension of the file name, without the dot
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![],
        }
    }

    #[test]
    fn extension_parsing() {
        assert_eq!(file("slip.PNG").extension().as_deref(), Some("png"));
        assert_eq!(file("my.slip.jpeg").extension().as_deref(), Some("jpeg"));
        assert_eq!(file("slip").extension(), None);
        assert_eq!(file(".png").extension(), None);
        assert_eq!(file("slip.").extension(), None);
    }
}
