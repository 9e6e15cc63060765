mod app;
mod components;

use app::SegmentFEApp;
use eframe::egui;
use segmentfe::cli;
use segmentfe::logger;
use segmentfe::settings::AppSettings;

fn main() -> Result<(), eframe::Error> {
    // -- CLI / headless mode ---------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        let code = cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS {
            0
        } else {
            1
        });
    }

    // -- GUI mode -----------------------------------------------------

    // Initialize session log (overwrites previous session log)
    logger::init();

    let settings = AppSettings::load();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1180.0, 860.0])
            .with_title("SegmentFE"),
        ..Default::default()
    };

    eframe::run_native(
        "SegmentFE",
        options,
        Box::new(move |cc| Box::new(SegmentFEApp::new(cc, settings))),
    )
}
