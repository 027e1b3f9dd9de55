//! cuesync - readable, playback-synchronized subtitle translation
//!
//! Command line entry point: offline re-segmentation of SRT files and a
//! simulated playback that drives the full segmentation and translation
//! session against a local Ollama model.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cuesync::cli::{Args, Commands};
use cuesync::config::Config;
use cuesync::cue::Cue;
use cuesync::measure::LangClass;
use cuesync::ollama::OllamaClient;
use cuesync::playback::{ManualClock, PlaybackEvent, PlaybackFeed};
use cuesync::segment::fallback::fallback_segment;
use cuesync::segment::llm::OllamaSegmenter;
use cuesync::segment::SegmentationPipeline;
use cuesync::session::SubtitleSession;
use cuesync::subtitle::{generate_srt, load_srt};
use cuesync::translate::llm::OllamaTranslator;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Segment {
            input,
            output,
            offline,
        } => {
            let raw = load_srt(&input).await?;
            let segmented = if offline {
                let lang = LangClass::resolve(
                    config.segmentation.source_language.as_deref(),
                    raw.iter().map(|c| c.text.as_str()),
                );
                fallback_segment(&raw, lang)
            } else {
                let client = OllamaClient::new(config.llm.clone())?;
                client.check_availability().await?;
                segment_whole_file(raw, client, &config).await
            };
            generate_srt(&segmented, config.translate.display_mode, &output).await?;
            println!("Wrote {} subtitle lines to {}", segmented.len(), output.display());
        }
        Commands::Play {
            input,
            output,
            target_lang,
            title,
            display_mode,
            speed,
            lockstep,
            seek,
        } => {
            if let Some(target_lang) = target_lang {
                config.translate.target_language = target_lang;
            }
            if let Some(display_mode) = display_mode {
                config.translate.display_mode = display_mode.into();
            }
            if speed <= 0.0 {
                anyhow::bail!("--speed must be positive");
            }

            let title = title.unwrap_or_else(|| {
                input
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default()
            });
            let raw = load_srt(&input).await?;

            let client = OllamaClient::new(config.llm.clone())?;
            client.check_availability().await?;

            let options = PlayOptions {
                speed,
                lockstep,
                start_ms: seek.map(|s| (s * 1000.0) as u64).unwrap_or(0),
            };
            let timeline = play(raw, &title, client, &config, options).await?;

            let untranslated = timeline.iter().filter(|c| !c.is_translated()).count();
            if untranslated > 0 {
                warn!(
                    "{} of {} lines were not translated before playback passed them",
                    untranslated,
                    timeline.len()
                );
            }
            generate_srt(&timeline, config.translate.display_mode, &output).await?;
            println!("Wrote {} subtitle lines to {}", timeline.len(), output.display());
        }
        Commands::InitConfig { output } => {
            info!("Creating default configuration file: {}", output.display());
            Config::default().save_to_file(&output)?;
            println!("Default configuration written to {}", output.display());
        }
    }

    info!("cuesync completed successfully");
    Ok(())
}

/// Walk a clock over the whole file so every chunk passes through the
/// segmenter once.
async fn segment_whole_file(raw: Vec<Cue>, client: OllamaClient, config: &Config) -> Vec<Cue> {
    let last_start = raw.iter().map(|c| c.start).max().unwrap_or(0);
    let clock = ManualClock::new(0);
    let pipeline = SegmentationPipeline::new(
        raw,
        Arc::new(OllamaSegmenter::new(client)),
        clock.clone(),
        config.segmentation.clone(),
    );

    let pb = progress_bar(last_start);
    let mut now = 0;
    loop {
        clock.set(now);
        pb.set_position(now);
        pipeline.run().await;
        if now >= last_start {
            break;
        }
        now = (now + config.segmentation.chunk_window_ms).min(last_start);
    }
    pb.finish_and_clear();

    let failed = pipeline.failed_ai_count().await;
    if failed > 0 {
        warn!("{} cues were segmented by the fallback", failed);
    }
    pipeline.timeline().await
}

struct PlayOptions {
    speed: f64,
    lockstep: bool,
    start_ms: u64,
}

async fn play(
    raw: Vec<Cue>,
    title: &str,
    client: OllamaClient,
    config: &Config,
    options: PlayOptions,
) -> Result<Vec<Cue>> {
    let end_ms = raw.iter().map(|c| c.end).max().unwrap_or(0);
    let clock = ManualClock::new(options.start_ms);
    let translator = OllamaTranslator::new(client.clone(), config.translate.target_language.clone());
    let mut session = SubtitleSession::new(
        raw,
        title,
        Arc::new(OllamaSegmenter::new(client)),
        Arc::new(translator),
        clock.clone(),
        config,
    )
    .await;
    info!("Playing \"{}\" ({}ms) in session {}", title, end_ms, session.id());

    let tick_ms = config.display.tick_ms;
    let pb = progress_bar(end_ms);
    session.start().await;

    if options.lockstep {
        session.settle().await;
        let mut now = options.start_ms;
        let mut first = options.start_ms > 0;
        while now <= end_ms {
            clock.set(now);
            let event = if first {
                PlaybackEvent::Seeked(now)
            } else {
                PlaybackEvent::TimeUpdate(now)
            };
            first = false;
            session.handle_event(event).await;
            session.settle().await;

            let frame = session.current_display(now).await;
            pb.set_message(frame.lines(session.display_mode()).join(" / "));
            pb.set_position(now);
            now += tick_ms;
        }
    } else {
        let feed = PlaybackFeed::new(clock);
        let events = feed.subscribe();
        let interval = Duration::from_secs_f64(tick_ms as f64 / 1000.0 / options.speed);
        let start_ms = options.start_ms;
        let progress = pb.clone();

        // Dropping the feed at the end closes the session loop
        let feeder = tokio::spawn(async move {
            if start_ms > 0 {
                feed.seek(start_ms);
            }
            let mut now = start_ms;
            while now <= end_ms {
                feed.advance_to(now);
                progress.set_position(now);
                tokio::time::sleep(interval).await;
                now += tick_ms;
            }
        });

        session.run(events, CancellationToken::new()).await;
        feeder.await?;
        session.settle().await;
    }
    pb.finish_and_clear();

    session.pipeline().stop().await;
    Ok(session.timeline().await)
}

fn progress_bar(total_ms: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_ms);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}ms {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".cuesync").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "cuesync.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("cuesync.log").display()
    );

    Ok(())
}
