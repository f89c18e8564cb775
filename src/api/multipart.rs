//! `multipart/form-data` request bodies for the upload endpoints.

use rand::RngCore;

pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::with_boundary(format!("crowdwatch-{}", hex::encode(bytes)))
    }

    pub fn with_boundary(boundary: String) -> Self {
        Self {
            boundary,
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part();
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", escape(name)).as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.open_part();
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                escape(name),
                escape(filename),
                content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Close the form. Returns the `Content-Type` header value and the body.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }

    fn open_part(&mut self) {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_form_body() {
        let (content_type, body) = MultipartForm::with_boundary("XYZ".to_string())
            .text("confidence", "0.5")
            .file("file", "clip \"1\".mp4", "video/mp4", b"\x00\x01")
            .finish();
        assert_eq!(content_type, "multipart/form-data; boundary=XYZ");
        let expected = b"--XYZ\r\nContent-Disposition: form-data; name=\"confidence\"\r\n\r\n0.5\r\n\
--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"clip \\\"1\\\".mp4\"\r\nContent-Type: video/mp4\r\n\r\n\x00\x01\r\n\
--XYZ--\r\n";
        assert_eq!(body, expected.to_vec());
    }

    #[test]
    fn random_boundaries_differ() {
        let (a, _) = MultipartForm::new().finish();
        let (b, _) = MultipartForm::new().finish();
        assert_ne!(a, b);
    }
}
