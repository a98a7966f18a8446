use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::EnvFilter;

use banter::api::{ApiServer, ApiState};
use banter::channels::{ChatPlatform, DiscordChannel, VoiceGateway};
use banter::completion::OpenAiCompatClient;
use banter::orchestrator::VoiceStack;
use banter::voice::{
    AudioInput, MicrophoneInput, RemoteRecognizerFactory, SAMPLE_RATE, SpeechSynthesizer,
    VoiceCaptureEngine, VoicePlaybackEngine, WakeEvent, WakePhrase,
};
use banter::{CompletionGateway, Config, ConversationStore, SessionOrchestrator};

/// Banter - Discord conversational bot with wake-word voice replies
#[derive(Parser)]
#[command(name = "banter", version, about)]
struct Cli {
    /// Config file (default: ~/.config/banter/config.toml)
    #[arg(short, long, env = "BANTER_CONFIG")]
    config: Option<PathBuf>,

    /// Health server port (overrides config)
    #[arg(long)]
    health_port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (for headless servers without audio hardware)
    #[arg(long, env = "BANTER_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Synthesize text with the configured TTS provider into a file
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
        /// Where to write the audio
        #[arg(short, long, default_value = "banter-tts-test.mp3")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,banter=info",
        1 => "info,banter=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(cli.config.as_deref(), duration),
            Command::TestTts { text, output } => {
                test_tts(cli.config.as_deref(), &text, &output).await
            }
        };
    }

    tracing::info!(
        config = ?cli.config,
        disable_voice = cli.disable_voice,
        "starting banter"
    );

    let config = Config::load(cli.config.as_deref(), cli.disable_voice)?;
    config.validate()?;
    tracing::debug!(
        model = %config.completion.model,
        max_history = config.completion.max_history,
        voice = config.voice.enabled,
        "loaded configuration"
    );

    let health_port = cli.health_port.unwrap_or(config.health_port);
    let discord_token = config.discord_token.clone().unwrap_or_default();
    let api_key = config.completion.api_key.clone().unwrap_or_default();

    let store = Arc::new(ConversationStore::new(
        config.completion.max_history,
        config.system_prompts(),
    ));
    let backend = OpenAiCompatClient::new(api_key, config.completion.api_base.clone())?;
    let gateway = CompletionGateway::new(store, Arc::new(backend), config.sampling_params());

    let (mut discord, events) = DiscordChannel::with_receiver(discord_token);
    discord.connect().await?;
    let discord = Arc::new(discord);

    let (wake_tx, wake_rx) = mpsc::unbounded_channel();
    let voice = if config.voice.enabled {
        Some(build_voice_stack(&config, &discord, wake_tx)?)
    } else {
        drop(wake_tx);
        None
    };

    let platform: Arc<dyn ChatPlatform> = discord.clone();
    let orchestrator = Arc::new(SessionOrchestrator::new(
        config.bot.clone(),
        gateway,
        platform,
        voice,
    ));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = ApiServer::new(
        ApiState {
            orchestrator: Arc::clone(&orchestrator),
            voice_enabled: config.voice.enabled,
        },
        health_port,
    );
    let server_task = tokio::spawn(server.run(async move {
        let _ = stop_rx.await;
    }));

    if config.voice.enabled {
        tracing::info!(wake_words = ?config.voice.wake_words, "banter ready");
    } else {
        tracing::info!("banter ready (text-only mode, voice disabled)");
    }

    // Run until interrupted
    orchestrator
        .run(events, wake_rx, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    let _ = stop_tx.send(());
    discord.shutdown().await;

    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "health server stopped with error"),
        Err(e) => tracing::warn!(error = %e, "health server task failed"),
    }

    tracing::info!("banter stopped");
    Ok(())
}

fn build_voice_stack(
    config: &Config,
    discord: &Arc<DiscordChannel>,
    wake_tx: mpsc::UnboundedSender<WakeEvent>,
) -> anyhow::Result<VoiceStack> {
    let recognizers = RemoteRecognizerFactory::new(config.stt_provider()?, config.voice.stt_timeout);
    let input = MicrophoneInput::new(config.voice.input_device.clone());
    let wake = WakePhrase::new(config.voice.wake_words.iter().map(String::as_str));

    let capture = VoiceCaptureEngine::new(Arc::new(input), Arc::new(recognizers), wake, wake_tx);
    let playback = VoicePlaybackEngine::new(Arc::new(config.text_to_speech()?))
        .with_timeout(config.voice.playback_timeout);

    let gateway: Arc<dyn VoiceGateway> = discord.clone();
    Ok(VoiceStack {
        gateway,
        capture,
        playback,
    })
}

/// Print microphone levels for a few seconds
fn test_mic(config_path: Option<&Path>, duration: u64) -> anyhow::Result<()> {
    let config = Config::load(config_path, false)?;

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");
    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    let (tx, rx) = std::sync::mpsc::sync_channel(32);
    let _guard = MicrophoneInput::new(config.voice.input_device).open(tx)?;

    let deadline = Instant::now() + Duration::from_secs(duration);
    while Instant::now() < deadline {
        let Ok(frame) = rx.recv_timeout(Duration::from_secs(1)) else {
            println!("(no audio)");
            continue;
        };

        let energy = calculate_rms(&frame.samples);
        let peak = frame
            .samples
            .iter()
            .map(|s| f32::from(s.unsigned_abs()) / 32768.0)
            .fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]");
    }

    println!("\nMicrophone test complete!");
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let s = f32::from(s) / 32768.0;
            s * s
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Synthesize with the configured provider and save the audio
async fn test_tts(config_path: Option<&Path>, text: &str, output: &Path) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path, false)?;
    let tts = config.text_to_speech()?;

    println!("Synthesizing speech...");
    let audio = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", audio.len());

    tokio::fs::write(output, &audio).await?;
    println!("Wrote {}", output.display());
    Ok(())
}
