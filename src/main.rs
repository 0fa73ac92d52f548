use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pptx_translator_rust::CancelToken;

#[derive(Parser, Debug)]
#[command(
    name = "pptx-translator-rust",
    version,
    about = "Translate PowerPoint decks with a local LLM, keeping their styling"
)]
struct Cli {
    /// Presentation to translate (.pptx)
    input: Option<PathBuf>,

    /// Target language (e.g. ko, ja, zh-Hant)
    #[arg(short = 'l', long = "lang", default_value = "en")]
    lang: String,

    /// Source language. Use "auto" to let the model decide.
    #[arg(short = 'L', long = "source-lang", default_value = "auto")]
    source_lang: String,

    /// Model name on the backend (default from settings [backend])
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Base URL of the local LLM service
    #[arg(long = "backend-url")]
    backend_url: Option<String>,

    /// Leave pictures untouched
    #[arg(long = "no-ocr")]
    no_ocr: bool,

    /// Skip the chart text pass
    #[arg(long = "no-charts")]
    no_charts: bool,

    /// Directory for the translated copy (default: next to the input)
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Show past translation runs and exit
    #[arg(long = "show-history")]
    show_history: bool,

    /// Show models installed on the backend and exit
    #[arg(long = "show-models")]
    show_models: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    pptx_translator_rust::logging::init(cli.verbose)?;

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("stopping after the current unit...");
            on_signal.cancel();
        }
    });

    let output = pptx_translator_rust::run(
        pptx_translator_rust::Config {
            input: cli.input,
            target_lang: cli.lang,
            source_lang: cli.source_lang,
            model: cli.model,
            backend_url: cli.backend_url,
            no_ocr: cli.no_ocr,
            no_charts: cli.no_charts,
            output_dir: cli.output_dir,
            settings_path: cli.read_settings,
            show_history: cli.show_history,
            show_models: cli.show_models,
        },
        cancel,
    )
    .await?;

    println!("{}", output);
    Ok(())
}
