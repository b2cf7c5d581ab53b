use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "overlay-translator-rust",
    version,
    about = "Detect, translate and re-letter text in images"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run detection, translation and inpainting on an image
    Translate {
        /// Image to translate
        #[arg(short = 'i', long = "input")]
        input: PathBuf,

        /// Target language (default from settings)
        #[arg(short = 'l', long = "lang")]
        lang: Option<String>,

        /// Base URL of the detect/translate/inpaint API
        #[arg(long = "api-url")]
        api_url: Option<String>,

        /// Output PNG (default: <input>.translated.png)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Write detected regions as JSON
        #[arg(long = "regions")]
        regions: Option<PathBuf>,

        /// Write the text-free layer as PNG
        #[arg(long = "inpainted")]
        inpainted: Option<PathBuf>,
    },
    /// Render saved regions over an image without detecting again
    Render {
        /// Original image
        #[arg(long = "original")]
        original: PathBuf,

        /// Text-free layer (default: transparent)
        #[arg(long = "inpainted")]
        inpainted: Option<PathBuf>,

        /// Regions JSON written by `translate --regions`
        #[arg(long = "regions")]
        regions: PathBuf,

        /// Output PNG
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    overlay_translator_rust::logging::init(cli.verbose)?;

    let output = match cli.command {
        Command::Translate {
            input,
            lang,
            api_url,
            output,
            regions,
            inpainted,
        } => {
            overlay_translator_rust::run_translate(overlay_translator_rust::TranslateConfig {
                input,
                lang,
                api_url,
                output,
                regions_out: regions,
                inpainted_out: inpainted,
                settings_path: cli.read_settings,
            })
            .await?
        }
        Command::Render {
            original,
            inpainted,
            regions,
            output,
        } => overlay_translator_rust::run_render(overlay_translator_rust::RenderConfig {
            original,
            inpainted,
            regions,
            output,
            settings_path: cli.read_settings,
        })?,
    };

    println!("{}", output);
    Ok(())
}
