// ============================================================================
// SEGMENTATION PROVIDER: opaque `image bytes → mask PNGs` boundary
// ============================================================================
//
// The remote model and its relay live outside this crate.  The core only
// sees the trait below.  Requests run on the rayon pool; responses come
// back over a channel tagged with the session generation that issued them,
// so a reply that lands after a reset/new upload can be recognised and
// dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;

use crate::error::SegmentError;
use crate::{log_info, log_warn};

/// The provider never returns more than this many masks.
pub const MAX_MASKS: usize = 12;

pub trait SegmentationProvider: Send + Sync {
    /// Segment `image` (raw bytes of MIME type `mime`) into an ordered list of
    /// encoded mask rasters.  An empty list or `SegmentError::EmptyResult`
    /// both mean "no objects found".
    fn segment(&self, image: &[u8], mime: &str) -> Result<Vec<Vec<u8>>, SegmentError>;

    fn name(&self) -> &str;
}

/// Serves pre-computed mask PNGs from disk, for offline use and the CLI.
///
/// `source` is either a directory (every `*.png` inside, sorted by name) or
/// a glob pattern.
pub struct DirectoryProvider {
    source: String,
}

impl DirectoryProvider {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into() }
    }

    fn mask_paths(&self) -> Result<Vec<PathBuf>, SegmentError> {
        let dir = Path::new(&self.source);
        let pattern = if dir.is_dir() {
            dir.join("*.png").to_string_lossy().into_owned()
        } else {
            self.source.clone()
        };

        let entries = glob::glob(&pattern)
            .map_err(|e| SegmentError::Provider(format!("invalid mask pattern '{}': {}", pattern, e)))?;
        let mut paths: Vec<PathBuf> = entries.flatten().filter(|p| p.is_file()).collect();
        paths.sort();
        paths.truncate(MAX_MASKS);
        Ok(paths)
    }
}

impl SegmentationProvider for DirectoryProvider {
    fn segment(&self, _image: &[u8], _mime: &str) -> Result<Vec<Vec<u8>>, SegmentError> {
        let paths = self.mask_paths()?;
        if paths.is_empty() {
            return Err(SegmentError::empty());
        }
        let mut masks = Vec::with_capacity(paths.len());
        for path in &paths {
            match std::fs::read(path) {
                Ok(bytes) => masks.push(bytes),
                Err(e) => {
                    log_warn!("Failed to read mask {}: {}", path.display(), e);
                }
            }
        }
        if masks.is_empty() {
            return Err(SegmentError::Provider(format!("no readable masks in '{}'", self.source)));
        }
        Ok(masks)
    }

    fn name(&self) -> &str {
        "directory"
    }
}

/// Guess the MIME type of an uploaded file from its extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// One upload's worth of provider input, stamped with its generation.
#[derive(Clone, Debug)]
pub struct UploadTicket {
    pub generation: u64,
    pub bytes: Arc<Vec<u8>>,
    pub mime: String,
}

/// Provider reply delivered back to the UI thread.
#[derive(Debug)]
pub struct SegmentationResponse {
    pub generation: u64,
    pub result: Result<Vec<Vec<u8>>, SegmentError>,
}

/// Runs provider calls off the UI thread.  No cancellation: a superseded
/// request still completes, and its response is filtered by generation.
pub struct SegmentationWorker {
    provider: Arc<dyn SegmentationProvider>,
    sender: mpsc::Sender<SegmentationResponse>,
    receiver: mpsc::Receiver<SegmentationResponse>,
    in_flight: usize,
}

impl SegmentationWorker {
    pub fn new(provider: Arc<dyn SegmentationProvider>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            provider,
            sender,
            receiver,
            in_flight: 0,
        }
    }

    pub fn set_provider(&mut self, provider: Arc<dyn SegmentationProvider>) {
        self.provider = provider;
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn submit(&mut self, ticket: UploadTicket) {
        let provider = Arc::clone(&self.provider);
        let sender = self.sender.clone();
        self.in_flight += 1;
        log_info!(
            "Segmentation request #{} submitted to '{}' ({} bytes, {})",
            ticket.generation,
            provider.name(),
            ticket.bytes.len(),
            ticket.mime
        );
        rayon::spawn(move || {
            let result = provider.segment(&ticket.bytes, &ticket.mime);
            let _ = sender.send(SegmentationResponse {
                generation: ticket.generation,
                result,
            });
        });
    }

    /// Non-blocking poll for the next finished request.
    pub fn poll(&mut self) -> Option<SegmentationResponse> {
        let response = self.receiver.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(response)
    }

    /// Blocking wait, for headless callers.
    pub fn wait(&mut self) -> Option<SegmentationResponse> {
        if self.in_flight == 0 {
            return None;
        }
        let response = self.receiver.recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(response)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mask::tests::mask_png;

    /// Provider that replays a fixed answer.
    pub(crate) struct FixedProvider(pub Result<Vec<Vec<u8>>, SegmentError>);

    impl SegmentationProvider for FixedProvider {
        fn segment(&self, _image: &[u8], _mime: &str) -> Result<Vec<Vec<u8>>, SegmentError> {
            self.0.clone()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("segmentfe-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn directory_provider_reads_sorted_and_capped() {
        let dir = temp_dir("dirprov");
        for i in 0..14 {
            std::fs::write(dir.join(format!("mask_{:02}.png", i)), mask_png(2, 2, (0, 0, 1, 1))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let provider = DirectoryProvider::new(dir.to_string_lossy());
        let masks = provider.segment(b"", "image/png").unwrap();
        assert_eq!(masks.len(), MAX_MASKS);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_directory_is_empty_result() {
        let dir = temp_dir("emptyprov");
        let err = DirectoryProvider::new(dir.to_string_lossy()).segment(b"", "image/png").unwrap_err();
        assert!(err.is_recoverable());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn worker_tags_responses_with_generation() {
        let provider = Arc::new(FixedProvider(Ok(vec![mask_png(2, 2, (0, 0, 2, 2))])));
        let mut worker = SegmentationWorker::new(provider);
        worker.submit(UploadTicket {
            generation: 7,
            bytes: Arc::new(vec![1, 2, 3]),
            mime: "image/png".into(),
        });
        assert_eq!(worker.in_flight(), 1);
        let response = worker.wait().unwrap();
        assert_eq!(response.generation, 7);
        assert_eq!(response.result.unwrap().len(), 1);
        assert_eq!(worker.in_flight(), 0);
        assert!(worker.wait().is_none());
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for_path(Path::new("a/b.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("x.png")), "image/png");
        assert_eq!(mime_for_path(Path::new("noext")), "application/octet-stream");
    }
}
