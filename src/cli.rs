// ============================================================================
// SegmentFE CLI: headless segmentation export via command-line arguments
// ============================================================================
//
// Usage examples:
//   segmentfe -i photo.jpg --masks masks/
//   segmentfe -i photo.jpg --masks masks/ --out out/ --hide 3 --order 2,0,1
//   segmentfe -i photo.jpg --masks masks/ --paint 120,80,20@0 --paint 40,40,10,eraser@1 --preview
//   segmentfe -i "shots/*.jpg" --masks "masks/{stem}/" --out exports/
//
// No GUI is opened in CLI mode.  Masks come from the directory provider and
// everything runs synchronously on the current thread with the CPU preview
// path (no wgpu).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::brush::Tool;
use crate::export::{encode_png, DirectorySink, ExportSink, ZipSink, ARCHIVE_NAME, FOLDER_NAME};
use crate::layers::LayerId;
use crate::provider::{mime_for_path, DirectoryProvider, SegmentationProvider, SegmentationResponse};
use crate::session::{Session, SessionStatus};
use crate::settings::AppSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// SegmentFE headless segment exporter.
///
/// Turn an image plus its segmentation masks into per-segment transparent
/// PNG cutouts, optionally after hiding, reordering or touching up layers.
#[derive(Parser, Debug)]
#[command(
    name = "segmentfe",
    about = "SegmentFE headless segment exporter",
    long_about = "Build segment layers from pre-computed mask PNGs and export one\n\
                  transparent cutout per visible layer without opening the GUI.\n\n\
                  Example:\n  \
                  segmentfe -i photo.jpg --masks masks/ --out out/ --hide 1 --preview"
)]
pub struct CliArgs {
    /// Input image(s). Glob patterns accepted (e.g. "*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Mask directory or glob. `{stem}` is replaced by each input's file stem.
    /// Falls back to `masks_dir` from the settings file.
    #[arg(short, long, value_name = "DIR")]
    pub masks: Option<String>,

    /// Output root. The cutouts go into `<out>/segments/`.
    /// Defaults to the input's directory; batches get one subfolder per input.
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Hide a layer (by id) before export. Repeatable.
    #[arg(long, value_name = "ID")]
    pub hide: Vec<LayerId>,

    /// New top-to-bottom layer order, e.g. `2,0,1`. Unlisted layers keep
    /// their relative order below the listed ones.
    #[arg(long, value_delimiter = ',', value_name = "ID,ID,...")]
    pub order: Vec<LayerId>,

    /// Brush sample in display coordinates: `X,Y,SIZE[,eraser]@ID`. Repeatable.
    #[arg(long, value_parser = parse_paint, value_name = "X,Y,SIZE[,eraser]@ID")]
    pub paint: Vec<PaintOp>,

    /// Bundle the cutouts into `segments.zip` instead of a `segments/` folder.
    #[arg(long)]
    pub zip: bool,

    /// Also write `preview.png`: the blended display image.
    #[arg(long)]
    pub preview: bool,

    /// Print per-file timing and layer information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

/// One brush sample from `--paint`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaintOp {
    pub x: f32,
    pub y: f32,
    pub size: u32,
    pub tool: Tool,
    pub layer: LayerId,
}

/// Parse `X,Y,SIZE[,eraser|pencil]@ID`.
pub fn parse_paint(s: &str) -> Result<PaintOp, String> {
    let (coords, layer) = s
        .rsplit_once('@')
        .ok_or_else(|| format!("'{}': expected X,Y,SIZE[,eraser]@ID", s))?;
    let layer: LayerId = layer
        .trim()
        .parse()
        .map_err(|_| format!("'{}': invalid layer id", s))?;

    let parts: Vec<&str> = coords.split(',').map(str::trim).collect();
    if parts.len() < 3 || parts.len() > 4 {
        return Err(format!("'{}': expected X,Y,SIZE[,eraser]@ID", s));
    }
    let x: f32 = parts[0].parse().map_err(|_| format!("'{}': invalid X", s))?;
    let y: f32 = parts[1].parse().map_err(|_| format!("'{}': invalid Y", s))?;
    let size: u32 = parts[2].parse().map_err(|_| format!("'{}': invalid SIZE", s))?;
    if !(1..=100).contains(&size) {
        return Err(format!("'{}': SIZE must be 1-100", s));
    }
    let tool = match parts.get(3).map(|t| t.to_lowercase()) {
        None => Tool::Pencil,
        Some(t) if t == "pencil" => Tool::Pencil,
        Some(t) if t == "eraser" => Tool::Eraser,
        Some(t) => return Err(format!("'{}': unknown tool '{}'", s, t)),
    };
    Ok(PaintOp { x, y, size, tool, layer })
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let mut settings = AppSettings::load();
    settings.gpu_acceleration = false;

    let masks_source = match args.masks.clone().filter(|m| !m.is_empty()) {
        Some(m) => m,
        None if !settings.masks_dir.is_empty() => settings.masks_dir.clone(),
        None => {
            eprintln!("error: no mask source given (use --masks or set masks_dir).");
            return ExitCode::FAILURE;
        }
    };

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();
        let out_root = build_output_root(input_path, args.out.as_deref(), multi);
        let masks = masks_for_input(&masks_source, input_path);

        match run_one(input_path, &masks, &out_root, &args, &settings) {
            Ok(count) => {
                if args.verbose || multi {
                    println!(
                        "  → {} segments in {} ({:.0}ms)",
                        count,
                        out_root.join(if args.zip { ARCHIVE_NAME } else { FOLDER_NAME }).display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    masks: &str,
    out_root: &Path,
    args: &CliArgs,
    settings: &AppSettings,
) -> Result<usize, String> {
    // -- Step 1: Upload + segment ----------------------------------------
    let bytes = std::fs::read(input).map_err(|e| format!("load failed: {}", e))?;
    let mut session = Session::new(settings.clone());
    let ticket = session
        .begin_upload(bytes, mime_for_path(input))
        .map_err(|e| format!("load failed: {}", e))?;

    let provider = DirectoryProvider::new(masks);
    let result = provider.segment(&ticket.bytes, &ticket.mime);
    session.apply_segmentation(
        SegmentationResponse {
            generation: ticket.generation,
            result,
        },
        Instant::now(),
    );
    match session.status() {
        SessionStatus::Ready => {}
        status => {
            return Err(status.message().unwrap_or("segmentation did not complete").to_string());
        }
    }
    if args.verbose {
        for layer in session.model().layers() {
            println!(
                "  layer {} '{}' ({} px)",
                layer.id,
                layer.name,
                layer.mask.member_count()
            );
        }
    }

    // -- Step 2: Edits ---------------------------------------------------
    apply_order(&mut session, &args.order)?;
    for &id in &args.hide {
        if session.model().get(id).is_some_and(|l| l.visible) {
            session.toggle_visibility(id);
        } else if !session.model().contains(id) {
            eprintln!("  warning: --hide {}: no such layer", id);
        }
    }
    for op in &args.paint {
        if !session.model().contains(op.layer) {
            eprintln!("  warning: --paint on unknown layer {}", op.layer);
            continue;
        }
        session.select(op.layer);
        session.set_tool(op.tool);
        session.set_brush_size(op.size);
        session.pointer_down(op.x, op.y);
        session.pointer_up();
    }

    // -- Step 3: Export --------------------------------------------------
    let mut sink: Box<dyn ExportSink> = if args.zip {
        Box::new(ZipSink::in_dir(out_root))
    } else {
        Box::new(DirectorySink::new(out_root))
    };
    let count = session
        .export(&mut *sink)
        .map_err(|e| format!("export failed: {}", e))?;

    if args.preview {
        let preview = session
            .preview()
            .ok_or_else(|| "no preview available".to_string())?;
        let png = encode_png(preview).map_err(|e| format!("preview failed: {}", e))?;
        std::fs::create_dir_all(out_root).map_err(|e| format!("preview failed: {}", e))?;
        std::fs::write(out_root.join("preview.png"), png).map_err(|e| format!("preview failed: {}", e))?;
    }

    Ok(count)
}

/// Move each listed id into the slot matching its position in `order`.
fn apply_order(session: &mut Session, order: &[LayerId]) -> Result<(), String> {
    let mut seen = Vec::with_capacity(order.len());
    for (pos, &id) in order.iter().enumerate() {
        if !session.model().contains(id) {
            return Err(format!("--order: no layer with id {}", id));
        }
        if seen.contains(&id) {
            return Err(format!("--order: id {} listed twice", id));
        }
        seen.push(id);
        let target = session.model().ids()[pos];
        session.reorder(id, target);
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

fn masks_for_input(source: &str, input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.replace("{stem}", &stem)
}

/// Output root for one input.
///
/// 1. `--out` (batches get `<out>/<stem>/`)
/// 2. Fallback: the input's directory (batches get `<dir>/<stem>/`)
fn build_output_root(input: &Path, out: Option<&Path>, multi: bool) -> PathBuf {
    let root = match out {
        Some(dir) => dir.to_path_buf(),
        None => input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    if multi {
        let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        root.join(stem)
    } else {
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::tests::mask_png;
    use image::{Rgba, RgbaImage};

    #[test]
    fn paint_op_parsing() {
        assert_eq!(
            parse_paint("10,20.5,15@2").unwrap(),
            PaintOp { x: 10.0, y: 20.5, size: 15, tool: Tool::Pencil, layer: 2 }
        );
        assert_eq!(parse_paint("1,2,3,eraser@0").unwrap().tool, Tool::Eraser);
        assert!(parse_paint("1,2,3").is_err());
        assert!(parse_paint("1,2@0").is_err());
        assert!(parse_paint("1,2,0@0").is_err());
        assert!(parse_paint("1,2,3,spray@0").is_err());
    }

    #[test]
    fn args_parse() {
        let args = CliArgs::try_parse_from([
            "segmentfe", "-i", "a.png", "--masks", "m", "--hide", "1", "--hide", "2",
            "--order", "2,0,1", "--paint", "5,5,10@0", "--preview",
        ])
        .unwrap();
        assert_eq!(args.hide, vec![1, 2]);
        assert_eq!(args.order, vec![2, 0, 1]);
        assert_eq!(args.paint.len(), 1);
        assert!(args.preview);
        assert!(CliArgs::try_parse_from(["segmentfe", "--masks", "m"]).is_err());
    }

    #[test]
    fn output_root_and_mask_placeholders() {
        let input = Path::new("shots/cat.jpg");
        assert_eq!(build_output_root(input, None, false), PathBuf::from("shots"));
        assert_eq!(build_output_root(input, Some(Path::new("out")), true), PathBuf::from("out/cat"));
        assert_eq!(build_output_root(Path::new("cat.jpg"), None, false), PathBuf::from("."));
        assert_eq!(masks_for_input("masks/{stem}", input), "masks/cat");
    }

    #[test]
    fn end_to_end_export() {
        let dir = std::env::temp_dir().join(format!("segmentfe-cli-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let masks = dir.join("masks");
        std::fs::create_dir_all(&masks).unwrap();
        for i in 0..3u32 {
            std::fs::write(masks.join(format!("{i}.png")), mask_png(10, 10, (i * 3, 0, i * 3 + 3, 10))).unwrap();
        }
        let photo = dir.join("photo.png");
        RgbaImage::from_pixel(10, 10, Rgba([9, 9, 9, 255])).save(&photo).unwrap();
        let out = dir.join("out");

        let args = CliArgs::try_parse_from([
            "segmentfe".to_string(),
            "-i".into(),
            photo.to_string_lossy().into_owned(),
            "--masks".into(),
            masks.to_string_lossy().into_owned(),
            "--out".into(),
            out.to_string_lossy().into_owned(),
            "--hide".into(),
            "1".into(),
            "--order".into(),
            "2,0".into(),
            "--preview".into(),
        ])
        .unwrap();
        assert_eq!(run(args), ExitCode::SUCCESS);

        let seg = out.join(FOLDER_NAME);
        assert!(seg.join("Segment 1.png").is_file());
        assert!(seg.join("Segment 3.png").is_file());
        assert!(!seg.join("Segment 2.png").exists());
        assert!(out.join("preview.png").is_file());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn zip_flag_writes_one_archive() {
        let dir = std::env::temp_dir().join(format!("segmentfe-cli-zip-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let masks = dir.join("masks");
        std::fs::create_dir_all(&masks).unwrap();
        for i in 0..3u32 {
            std::fs::write(masks.join(format!("{i}.png")), mask_png(10, 10, (i * 3, 0, i * 3 + 3, 10))).unwrap();
        }
        let photo = dir.join("photo.png");
        RgbaImage::from_pixel(10, 10, Rgba([9, 9, 9, 255])).save(&photo).unwrap();
        let out = dir.join("out");

        let args = CliArgs::try_parse_from([
            "segmentfe".to_string(),
            "-i".into(),
            photo.to_string_lossy().into_owned(),
            "--masks".into(),
            masks.to_string_lossy().into_owned(),
            "--out".into(),
            out.to_string_lossy().into_owned(),
            "--hide".into(),
            "0".into(),
            "--zip".into(),
        ])
        .unwrap();
        assert!(args.zip);
        assert_eq!(run(args), ExitCode::SUCCESS);

        assert!(!out.join(FOLDER_NAME).exists());
        let file = std::fs::File::open(out.join(ARCHIVE_NAME)).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        assert_eq!(archive.len(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
