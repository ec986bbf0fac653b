//! Static assets, served byte-for-byte ahead of the pipeline.

use std::path::{Component, Path, PathBuf};

use http::header;
use tracing::debug;

use crate::response::{ContentType, Response};

pub struct StaticFiles {
    base_dir: PathBuf,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base_dir: base.into() }
    }

    /// Maps a URL path below the base directory. Anything that would climb
    /// out of it maps to nothing.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let decoded = urlencoding::decode(url_path).ok()?;
        let mut pb = self.base_dir.clone();
        for comp in Path::new(decoded.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    fn content_type(path: &Path) -> ContentType {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "html" => ContentType::Html,
            "css" => ContentType::Css,
            "js" => ContentType::Javascript,
            "json" => ContentType::Json,
            "txt" => ContentType::Text,
            _ => ContentType::OctetStream,
        }
    }

    /// The file for `url_path`, or `None` to let the request through to the
    /// pipeline.
    pub async fn serve(&self, url_path: &str) -> Option<Response> {
        let path = self.map_path(url_path)?;
        let meta = tokio::fs::metadata(&path).await.ok()?;
        if !meta.is_file() {
            return None;
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), "static hit");
                Some(
                    Response::builder()
                        .header(header::CACHE_CONTROL, "public, max-age=0")
                        .bytes(Self::content_type(&path), bytes),
                )
            }
            Err(e) => {
                debug!(path = %path.display(), "static read failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/bundle.js"), "console.log(1);\n").unwrap();
        dir
    }

    #[test]
    fn map_path_prevents_traversal() {
        let sf = StaticFiles::new("public");
        assert!(sf.map_path("/../Cargo.toml").is_none());
        assert!(sf.map_path("/%2e%2e/Cargo.toml").is_none());
    }

    #[tokio::test]
    async fn serves_files_verbatim() {
        let dir = site();
        let sf = StaticFiles::new(dir.path());
        let res = sf.serve("/js/bundle.js").await.unwrap();
        assert_eq!(res.body(), b"console.log(1);\n");
        assert_eq!(res.header(header::CONTENT_TYPE), Some("application/javascript; charset=utf-8"));
    }

    #[tokio::test]
    async fn directories_and_misses_fall_through() {
        let dir = site();
        let sf = StaticFiles::new(dir.path());
        assert!(sf.serve("/js").await.is_none());
        assert!(sf.serve("/").await.is_none());
        assert!(sf.serve("/img/missing.png").await.is_none());
    }
}
