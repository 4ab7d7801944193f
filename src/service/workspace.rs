//! Per-request temporary files
//!
//! Every request gets its own id and three file paths derived from it.
//! The files are removed when the workspace is dropped, whatever happened
//! in between; removal errors are ignored.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use tracing::debug;

use crate::utils::image::format_extension;

use super::types::FaceSwapRequest;

pub struct RequestWorkspace {
    request_id: String,
    role_path: PathBuf,
    child_path: PathBuf,
    output_path: PathBuf,
    output_format: ImageFormat,
}

fn input_extension(key: &str) -> &str {
    Path::new(key)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("img")
}

impl RequestWorkspace {
    /// Allocate paths for request `request_id` under `temp_dir`
    pub fn new(
        temp_dir: &Path,
        request_id: String,
        request: &FaceSwapRequest,
        output_format: ImageFormat,
    ) -> Self {
        let role_path = temp_dir.join(format!("role_{}.{}", request_id, input_extension(&request.role.key)));
        let child_path = temp_dir.join(format!("child_{}.{}", request_id, input_extension(&request.child.key)));
        let output_path = temp_dir.join(format!("output_{}.{}", request_id, format_extension(output_format)));

        Self {
            request_id,
            role_path,
            child_path,
            output_path,
            output_format,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn role_path(&self) -> &Path {
        &self.role_path
    }

    pub fn child_path(&self) -> &Path {
        &self.child_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn output_format(&self) -> ImageFormat {
        self.output_format
    }

    pub fn paths(&self) -> [&Path; 3] {
        [&self.role_path, &self.child_path, &self.output_path]
    }
}

impl Drop for RequestWorkspace {
    fn drop(&mut self) {
        for path in self.paths() {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    debug!("Ignoring cleanup failure for {:?}: {}", path, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ImageRef;
    use tempfile::tempdir;

    fn request() -> FaceSwapRequest {
        FaceSwapRequest::new(
            ImageRef::new("b1", "roles/r.jpg"),
            ImageRef::new("b2", "c.png"),
            "out",
        )
        .unwrap()
    }

    #[test]
    fn test_paths_differ_between_requests() {
        let dir = tempdir().unwrap();
        let a = RequestWorkspace::new(dir.path(), "a".into(), &request(), ImageFormat::Jpeg);
        let b = RequestWorkspace::new(dir.path(), "b".into(), &request(), ImageFormat::Jpeg);

        assert_ne!(a.request_id(), b.request_id());
        for (pa, pb) in a.paths().iter().zip(b.paths().iter()) {
            assert_ne!(pa, pb);
        }
    }

    #[test]
    fn test_path_naming() {
        let dir = tempdir().unwrap();
        let ws = RequestWorkspace::new(dir.path(), "abc".into(), &request(), ImageFormat::Png);

        assert_eq!(ws.role_path(), dir.path().join("role_abc.jpg"));
        assert_eq!(ws.child_path(), dir.path().join("child_abc.png"));
        assert_eq!(ws.output_path(), dir.path().join("output_abc.png"));
    }

    #[test]
    fn test_drop_removes_existing_files() {
        let dir = tempdir().unwrap();
        let ws = RequestWorkspace::new(dir.path(), "x".into(), &request(), ImageFormat::Jpeg);
        std::fs::write(ws.role_path(), b"role").unwrap();
        std::fs::write(ws.output_path(), b"out").unwrap();
        let paths: Vec<PathBuf> = ws.paths().iter().map(|p| p.to_path_buf()).collect();

        drop(ws);

        for path in paths {
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_drop_tolerates_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        let ws = RequestWorkspace::new(&missing, "y".into(), &request(), ImageFormat::Jpeg);
        drop(ws);
    }
}
