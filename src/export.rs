// ============================================================================
// EXPORT: per-segment transparent cutouts of the base image
// ============================================================================
//
// One PNG per VISIBLE layer, in list order, at the base image's native
// resolution.  The cutout is recomputed from the live (edited) mask with
// the same membership rule as compositing; when the mask resolution differs
// from the base, mask coordinates are `floor(x * maskW / baseW)`.
//
// Sinks decide the packaging: `ZipSink` writes `segments.zip`, the
// `DirectorySink` a plain `segments/` folder.

use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use rayon::prelude::*;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ExportError;
use crate::layers::{Layer, LayerModel};
use crate::{log_info, log_warn};

/// Name of the bundle handed to the user.
pub const ARCHIVE_NAME: &str = "segments.zip";

/// Folder name used by `DirectorySink` in place of the archive.
pub const FOLDER_NAME: &str = "segments";

/// One named image blob.
#[derive(Clone, Debug)]
pub struct ExportEntry {
    /// `"<layer name>.png"`
    pub name: String,
    pub png: Vec<u8>,
}

/// Receives the named set of blobs and packages them.
pub trait ExportSink {
    fn write_entries(&mut self, entries: &[ExportEntry]) -> Result<(), ExportError>;
}

/// Writes every entry as a file inside `<root>/segments/`.
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn folder(&self) -> PathBuf {
        self.root.join(FOLDER_NAME)
    }
}

impl ExportSink for DirectorySink {
    fn write_entries(&mut self, entries: &[ExportEntry]) -> Result<(), ExportError> {
        let folder = self.folder();
        std::fs::create_dir_all(&folder)?;
        for entry in entries {
            let path = folder.join(sanitize_file_name(&entry.name));
            std::fs::write(&path, &entry.png)?;
        }
        log_info!("Exported {} segments to {}", entries.len(), folder.display());
        Ok(())
    }
}

/// Bundles every entry into one zip archive (`segments.zip` by default).
pub struct ZipSink {
    path: PathBuf,
}

impl ZipSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<root>/segments.zip`
    pub fn in_dir(root: &Path) -> Self {
        Self::new(root.join(ARCHIVE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExportSink for ZipSink {
    fn write_entries(&mut self, entries: &[ExportEntry]) -> Result<(), ExportError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = File::create(&self.path)?;
        write_zip(file, entries)?;
        log_info!("Exported {} segments to {}", entries.len(), self.path.display());
        Ok(())
    }
}

/// Write `entries` as deflated members of a zip archive and hand the writer
/// back.
pub fn write_zip<W: Write + Seek>(writer: W, entries: &[ExportEntry]) -> Result<W, ExportError> {
    let mut zip = ZipWriter::new(writer);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for entry in entries {
        zip.start_file(sanitize_file_name(&entry.name), options)?;
        zip.write_all(&entry.png)?;
    }
    Ok(zip.finish()?)
}

/// Keeps entries in memory.
#[derive(Default)]
pub struct MemorySink {
    pub entries: Vec<ExportEntry>,
}

impl ExportSink for MemorySink {
    fn write_entries(&mut self, entries: &[ExportEntry]) -> Result<(), ExportError> {
        self.entries.extend_from_slice(entries);
        Ok(())
    }
}

/// Cut one layer out of the base image: base pixels where the mask claims
/// them, fully transparent elsewhere.
pub fn cutout(layer: &Layer, base: &RgbaImage) -> RgbaImage {
    let (bw, bh) = base.dimensions();
    let (mw, mh) = layer.mask.dimensions();
    let scale_x = mw as f64 / bw.max(1) as f64;
    let scale_y = mh as f64 / bh.max(1) as f64;

    let mut out = base.clone();
    let row_bytes = bw as usize * 4;
    if row_bytes == 0 {
        return out;
    }
    let buf: &mut [u8] = &mut out;
    buf.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let my = (y as f64 * scale_y).floor() as u32;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let mx = (x as f64 * scale_x).floor() as u32;
                if !layer.mask.is_member(mx, my) {
                    px[3] = 0;
                }
            }
        });
    out
}

/// Encode cutouts for every visible layer.  A layer that fails to encode is
/// skipped with a warning.
pub fn export_visible(model: &LayerModel, base: &RgbaImage) -> Result<Vec<ExportEntry>, ExportError> {
    if model.visible_count() == 0 {
        return Err(ExportError::NothingToExport);
    }
    let mut entries = Vec::with_capacity(model.visible_count());
    for layer in model.visible_layers() {
        let img = cutout(layer, base);
        match encode_png(img) {
            Ok(png) => entries.push(ExportEntry {
                name: format!("{}.png", layer.name),
                png,
            }),
            Err(e) => {
                log_warn!("Failed to process {}: {}", layer.name, e);
            }
        }
    }
    Ok(entries)
}

/// Export the visible layers into `sink`.  Returns the number of entries.
pub fn export_to(model: &LayerModel, base: &RgbaImage, sink: &mut dyn ExportSink) -> Result<usize, ExportError> {
    let entries = export_visible(model, base)?;
    sink.write_entries(&entries)?;
    Ok(entries.len())
}

pub fn encode_png(img: RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img).write_to(&mut out, ImageOutputFormat::Png)?;
    Ok(out.into_inner())
}

/// Replace path separators and other characters that are unsafe in file
/// names.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// Default export location next to an uploaded file.
pub fn default_export_root(upload: Option<&Path>) -> PathBuf {
    upload
        .and_then(|p| p.parent())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::SegmentMask;
    use crate::palette::color_for_index;
    use image::Rgba;
    use std::io::Read;

    fn layer(id: u32, mask: SegmentMask) -> Layer {
        Layer::new(id, format!("Segment {}", id + 1), color_for_index(id as usize), mask)
    }

    fn base(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, 7, 255]))
    }

    #[test]
    fn two_visible_of_three_gives_two_named_entries() {
        let m = three_with_middle_hidden();
        let mut sink = MemorySink::default();
        let n = export_to(&m, &base(4, 4), &mut sink).unwrap();
        assert_eq!(n, 2);
        let names: Vec<&str> = sink.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Segment 1.png", "Segment 3.png"]);

        let decoded = image::load_from_memory(&sink.entries[0].png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 4));
    }

    #[test]
    fn cutout_uses_live_mask_at_base_resolution() {
        // 2x2 mask over a 4x4 base: mask pixel (1,0) covers base x 2..4, y 0..2
        let mut mask = SegmentMask::new(2, 2);
        mask.set(1, 0, 255);
        mask.set(0, 1, 128); // at threshold: not a member
        let img = cutout(&layer(0, mask), &base(4, 4));
        assert_eq!(img.dimensions(), (4, 4));
        for y in 0..4 {
            for x in 0..4 {
                let alpha = img.get_pixel(x, y).0[3];
                let inside = x >= 2 && y < 2;
                assert_eq!(alpha == 255, inside, "pixel ({x},{y})");
            }
        }
        assert_eq!(img.get_pixel(3, 1).0, [3, 1, 7, 255]);
    }

    #[test]
    fn nothing_visible_is_an_error() {
        let mut m = LayerModel::from_layers(vec![layer(0, SegmentMask::new(1, 1))]);
        m.toggle_visibility(0);
        assert!(matches!(export_visible(&m, &base(1, 1)), Err(ExportError::NothingToExport)));
    }

    #[test]
    fn directory_sink_writes_png_files() {
        let root = std::env::temp_dir().join(format!("segmentfe-export-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let m = LayerModel::from_layers(vec![layer(0, SegmentMask::new(2, 2))]);
        let mut sink = DirectorySink::new(&root);
        export_to(&m, &base(2, 2), &mut sink).unwrap();
        assert!(root.join(FOLDER_NAME).join("Segment 1.png").is_file());
        let _ = std::fs::remove_dir_all(&root);
    }

    fn three_with_middle_hidden() -> LayerModel {
        let mut full = SegmentMask::new(4, 4);
        crate::brush::stamp_circle(&mut full, 2.0, 2.0, 4.0, 255);
        let mut m = LayerModel::from_layers(vec![
            layer(0, full.clone()),
            layer(1, full.clone()),
            layer(2, full),
        ]);
        m.toggle_visibility(1);
        m
    }

    #[test]
    fn zip_sink_bundles_visible_layers() {
        let root = std::env::temp_dir().join(format!("segmentfe-zip-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let mut sink = ZipSink::in_dir(&root);
        assert_eq!(export_to(&three_with_middle_hidden(), &base(4, 4), &mut sink).unwrap(), 2);
        assert_eq!(sink.path().file_name().and_then(|n| n.to_str()), Some(ARCHIVE_NAME));

        let file = File::open(sink.path()).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        assert_eq!(archive.len(), 2);
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&"Segment 1.png".to_string()));
        assert!(names.contains(&"Segment 3.png".to_string()));

        let mut png = Vec::new();
        archive.by_name("Segment 3.png").unwrap().read_to_end(&mut png).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn zip_entries_keep_list_order_and_sanitized_names() {
        let entries = vec![
            ExportEntry {
                name: "b/side.png".into(),
                png: vec![1, 2, 3],
            },
            ExportEntry {
                name: "a.png".into(),
                png: vec![4],
            },
        ];
        let cursor = write_zip(Cursor::new(Vec::new()), &entries).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap();
        assert_eq!(archive.by_index(0).unwrap().name(), "b_side.png");
        let mut data = Vec::new();
        archive.by_index(1).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, vec![4]);
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("a/b:c"), "a_b_c");
        assert_eq!(sanitize_file_name("Segment 4.png"), "Segment 4.png");
    }
}
