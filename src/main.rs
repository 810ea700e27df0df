use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use video_transcriptor::cli::{resolve_cookie_policy, Cli, Commands, OutputFormat};
use video_transcriptor::extractors::is_valid_url;
use video_transcriptor::{output, utils};
use video_transcriptor::{Config, ModelSize, TranscriptionPipeline, TranscriptorError, VideoRequest};

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "video_transcriptor=debug,transcriptor=debug"
    } else {
        "video_transcriptor=info,transcriptor=info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let (text_layer, json_layer) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .init();
}

fn spinner() -> Result<ProgressBar> {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Invalid progress template")?,
    );
    progress.enable_steady_tick(Duration::from_millis(120));
    Ok(progress)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Transcribe {
            url,
            model,
            language,
            output,
            format,
            cookies,
            cookie_file,
            browser,
            cookie_domain,
            no_cookies,
            save_audio,
        } => {
            // Nothing touches the network or the filesystem before this check.
            if !is_valid_url(&url) {
                return Err(TranscriptorError::InvalidUrl(url).into());
            }

            let mut config = Config::load().await?;

            // Check for required external dependencies (non-fatal)
            let missing_deps = utils::check_dependencies(&config).await;
            if !missing_deps.is_empty() {
                eprintln!("{}", style("Dependency check warnings:").yellow());
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - tools may be available)");
            }

            if browser.is_some() {
                config.cookies.browser = browser;
            }
            if cookie_domain.is_some() {
                config.cookies.domain = cookie_domain;
            }
            if save_audio {
                config.app.keep_audio = true;
            }
            config.validate()?;

            let policy = resolve_cookie_policy(
                cookies,
                cookie_file,
                no_cookies,
                config.cookies.cookie_file.as_deref(),
            )?;

            let request = VideoRequest::new(&url)
                .with_cookie_policy(policy)
                .with_language(Some(language.as_str()));
            let model_size = model
                .or(config.whisper.default_model)
                .unwrap_or_else(|| ModelSize::default_for_language(request.language_hint()));
            let request = request.with_model_size(model_size);

            let output_path = output.unwrap_or_else(|| config.app.default_output.clone());
            let format = format
                .or_else(|| OutputFormat::from_config(&config.app.default_output_format))
                .unwrap_or(OutputFormat::Text);

            if let Some(domain) = utils::extract_domain(request.url()) {
                tracing::info!("Source: {}", domain);
            }
            tracing::info!(
                "Model: {}, language: {}",
                model_size,
                request.language_hint().unwrap_or("auto")
            );

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cleaning up...");
                    ctrl_c.cancel();
                }
            });

            let progress = if cli.quiet { None } else { Some(spinner()?) };

            let mut pipeline = TranscriptionPipeline::new(config)?;
            if let Some(progress) = &progress {
                pipeline = pipeline.with_progress(progress.clone());
            }

            let outcome = pipeline.run(&request, &cancel).await;
            if let Some(progress) = &progress {
                progress.finish_and_clear();
            }
            let result = outcome?;

            if output_path == Path::new("-") {
                output::print_to_console(&result, format)?;
            } else {
                output::save_to_file(&result, &output_path, format).await?;
                println!(
                    "{} {}",
                    style("Transcription saved to:").green(),
                    output_path.display()
                );
            }

            if let Some(detected) = &result.detected_language {
                println!("Detected language: {}", style(detected).cyan());
            }

            if let Some(audio_path) = &result.metadata.audio_path {
                println!("Audio saved to: {}", audio_path.display());
            }

            println!(
                "{}",
                style(format!(
                    "Processing time: {:.2} seconds",
                    result.metadata.processing_duration
                ))
                .dim()
            );
        }
        Commands::Config { show } => {
            let path = Config::config_path()?;
            let (config, created) = Config::ensure_at(&path)?;
            if created {
                println!("{} {}", style("Created default config:").green(), path.display());
            } else {
                println!("{} {}", style("Config is valid:").green(), path.display());
            }
            if show {
                config.display();
            }
        }
        Commands::Platforms => {
            println!("Supported platforms:");
            println!("  • YouTube (youtube.com, youtu.be, music.youtube.com, shorts) - direct download");
            println!("  • Anything else yt-dlp supports (Vimeo, Twitter/X, SoundCloud, ...) - via yt-dlp");
            println!();
            println!("Cookie sources: firefox, chrome, chromium, brave, edge, vivaldi, or a Netscape cookie file");
        }
    }

    Ok(())
}
