mod api;
mod app;
mod remote;
mod session;

use clap::Parser;
use eframe::egui;

/// Desktop client for an image description queue: draw rectangles over the
/// served images and persist them to the description server.
#[derive(Parser, Debug)]
#[command(name = "annotate-remote", version, about)]
struct Args {
    /// Base URL of the description server.
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server: String,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let api = match api::ApiClient::new(&args.server) {
        Ok(api) => api,
        Err(err) => {
            eprintln!("Cannot set up the HTTP client: {err}");
            std::process::exit(1);
        }
    };

    let title = format!("annotate-remote — {}", args.server);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title(&title),
        ..Default::default()
    };

    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| Ok(Box::new(app::AnnotateApp::new(&cc.egui_ctx, api)))),
    )
    .expect("Failed to run eframe");
}
