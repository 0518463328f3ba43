use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use secrecy::{ExposeSecret, SecretString};
use tracing_subscriber::EnvFilter;

use voice_chat::api::{ApiServer, ApiState};
use voice_chat::conversation::DEFAULT_MODEL;
use voice_chat::session::synthesizer_from_config;
use voice_chat::voice::PLAYBACK_SAMPLE_RATE;
use voice_chat::{ChatSession, Config, Message, PlaybackSlot, SpeakerPlayer, count_tokens};

/// Voice Chat - spoken chat with an `OpenAI`-compatible model
#[derive(Parser)]
#[command(name = "voice-chat", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/voice-chat/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for the HTTP API
    #[arg(long, env = "VOICE_CHAT_PORT")]
    port: Option<u16>,

    /// Answer with a placeholder instead of calling the completion API
    #[arg(long)]
    debug: bool,

    /// Disable spoken replies (for machines without audio hardware)
    #[arg(long)]
    no_voice: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat in the terminal (default)
    Chat,
    /// Serve chat sessions over HTTP
    Serve,
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "你好，這是語音合成的測試。")]
        text: String,
    },
    /// Count the tokens a JSON message array would consume
    CountTokens {
        /// File holding `[{"role": ..., "content": ...}, ...]`
        file: PathBuf,
        /// Model whose token accounting to use
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,voice_chat=info",
        1 => "info,voice_chat=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
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
    match &cli.command {
        Some(Command::TestSpeaker) => return test_speaker().await,
        Some(Command::CountTokens { file, model }) => return count_file(file, model),
        _ => {}
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.debug |= cli.debug;
    if cli.no_voice {
        config.voice.enabled = false;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    match cli.command {
        None | Some(Command::Chat) => chat(&config).await,
        Some(Command::Serve) => serve(config).await,
        Some(Command::TestTts { text }) => test_tts(&config, &text).await,
        Some(Command::TestSpeaker | Command::CountTokens { .. }) => Ok(()),
    }
}

/// Interactive terminal chat
async fn chat(config: &Config) -> anyhow::Result<()> {
    let default_directive = config.conversation.system_directive.clone();
    let directive = prompt(move || {
        Input::<String>::new()
            .with_prompt("System directive")
            .default(default_directive)
            .allow_empty(true)
            .interact_text()
    })
    .await?;

    let has_configured_key = config.llm.api_key.is_some();
    let entered = prompt(move || {
        let label = if has_configured_key {
            "API key (enter to use configured key)"
        } else {
            "API key"
        };
        Password::new()
            .with_prompt(label)
            .allow_empty_password(true)
            .interact()
    })
    .await?;

    let credential = if entered.is_empty() {
        config
            .llm
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .unwrap_or_default()
    } else {
        entered
    };

    // the typed key also authorizes OpenAI TTS when none is configured
    let tts_key = (!credential.is_empty()).then(|| SecretString::from(credential.clone()));
    let mut session = ChatSession::from_config(config, tts_key)?;

    if session.is_debug() {
        println!("Debug mode: replies are placeholders, the API is not called.");
    }
    println!("Commands: /tokens, /history, /quit\n");

    loop {
        let line = prompt(|| {
            Input::<String>::new()
                .with_prompt("You")
                .allow_empty(true)
                .interact_text()
        })
        .await?;

        match line.trim() {
            "/quit" => break,
            "/tokens" => {
                match session.token_count() {
                    Ok(count) => println!("{count} tokens in the conversation window"),
                    Err(e) => println!("{e}"),
                }
                continue;
            }
            "/history" => {
                println!("{}", session.conversation());
                continue;
            }
            _ => {}
        }

        match session.submit(&directive, &credential, &line).await {
            Ok(history) => {
                if let Some(turn) = history.last() {
                    println!("Assistant: {}\n", turn.assistant);
                }
            }
            Err(e) if e.is_user_error() => println!("{e}"),
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                println!("Request failed: {e}");
            }
        }
    }

    session.wait_for_playback().await;
    Ok(())
}

/// Run a blocking terminal prompt off the async runtime
async fn prompt<T, F>(read: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> dialoguer::Result<T> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(read).await??)
}

/// Serve chat sessions over HTTP until interrupted
async fn serve(config: Config) -> anyhow::Result<()> {
    let port = config.port;
    tracing::info!(
        port,
        model = %config.llm.model,
        voice = config.voice.enabled,
        debug = config.debug,
        "starting voice chat server"
    );

    let state = Arc::new(ApiState::from_config(Arc::new(config)));
    let server = ApiServer::new(state, port).spawn();

    tokio::select! {
        result = server => result??,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}

/// Count tokens in a JSON message file
fn count_file(file: &Path, model: &str) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)?;
    let messages: Vec<Message> = serde_json::from_str(&content)?;
    let count = count_tokens(&messages, model)?;
    println!("{count}");
    Ok(())
}

/// Test speaker output
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    // Generate 2 seconds of 440Hz sine wave
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!(
        "Playing {} samples at {} Hz...",
        samples.len(),
        PLAYBACK_SAMPLE_RATE
    );

    tokio::task::spawn_blocking(move || {
        SpeakerPlayer::new().play_samples(samples, PLAYBACK_SAMPLE_RATE, &AtomicBool::new(false))
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output with the configured provider
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS ({:?}, {})...", config.voice.provider, config.voice.language);

    let synthesizer = synthesizer_from_config(config, None)?;
    let audio = synthesizer.synthesize(text, &config.voice.language).await?;
    println!("Received {} bytes of audio, playing...", audio.len());

    let mut slot = PlaybackSlot::new(Arc::new(SpeakerPlayer::new()));
    slot.dispatch(audio);
    slot.wait().await;

    println!("Done.");
    Ok(())
}
