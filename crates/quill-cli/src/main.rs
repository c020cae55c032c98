//! quill - terminal chat client with typewriter replies

mod commands;
mod config;
mod printer;

use clap::Parser;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use quill_chat::{
    ConversationController, FileSlot, Persistence, RevealConfig, SubmitOutcome, TurnStatus,
};
use quill_relay::RelayClient;

use commands::CommandResult;
use printer::Printer;

/// quill - chat with a relay, replies typed out as they arrive
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Send a single message and exit once the reply is shown
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Relay endpoint (default: http://localhost:3000/chat)
    #[arg(short, long)]
    relay_url: Option<String>,

    /// Characters revealed per step
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Milliseconds between reveal steps
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Reveal in large chunks (24 characters every 28ms)
    #[arg(long)]
    batched: bool,

    /// Directory holding the conversation history
    #[arg(long)]
    storage_dir: Option<String>,

    /// Print the stored conversation and exit
    #[arg(long)]
    history: bool,

    /// Clear the stored conversation and exit
    #[arg(long)]
    clear: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("quill=debug,quill_chat=debug,quill_relay=debug")
            .with_writer(io::stderr)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Command-line flags win over the config file
    let mut cfg = config::Config::load();
    if args.relay_url.is_some() {
        cfg.relay_url = args.relay_url.clone();
    }
    if args.chunk_size.is_some() {
        cfg.chunk_size = args.chunk_size;
    }
    if args.delay_ms.is_some() {
        cfg.delay_ms = args.delay_ms;
    }
    if args.storage_dir.is_some() {
        cfg.storage_dir = args.storage_dir.clone();
    }

    let base_reveal = if args.batched {
        RevealConfig::batched()
    } else {
        RevealConfig::default()
    };
    let relay_config = cfg.relay_config();
    let relay_url = relay_config.url.clone();
    let relay = Arc::new(RelayClient::new(relay_config)?);

    let storage_dir = cfg.storage_dir();
    tracing::debug!("History stored in {}", storage_dir.display());
    let persistence = Persistence::new(FileSlot::new(storage_dir));

    let mut controller =
        ConversationController::new(cfg.controller_config(base_reveal), relay, persistence);

    if args.clear {
        controller.clear_conversation();
        println!("Cleared conversation.");
        return Ok(());
    }

    if args.history {
        println!("{}", commands::format_history(controller.messages()));
        return Ok(());
    }

    if let Some(command) = args.command {
        run_command(&mut controller, &command).await
    } else {
        run_interactive(&mut controller, &relay_url).await
    }
}

async fn run_command(controller: &mut ConversationController, text: &str) -> anyhow::Result<()> {
    println!("quill> {}", text);
    println!();

    let mut receiver = controller.subscribe();
    let mut printer = Printer::new(io::stdout().is_terminal());
    let mut stdout = io::stdout();

    if controller.submit(text) == SubmitOutcome::Empty {
        anyhow::bail!("Nothing to send");
    }

    printer.drain(&mut receiver, &mut stdout)?;
    while controller.step().await {
        printer.drain(&mut receiver, &mut stdout)?;
    }
    printer.drain(&mut receiver, &mut stdout)?;

    if printer.last_status() == Some(TurnStatus::Failed) {
        anyhow::bail!("The relay could not be reached");
    }
    Ok(())
}

async fn run_interactive(
    controller: &mut ConversationController,
    relay_url: &str,
) -> anyhow::Result<()> {
    let is_tty = io::stdout().is_terminal();

    // Show minimal startup info (only if TTY)
    if io::stderr().is_terminal() {
        eprintln!("quill ({})", relay_url);
        eprintln!("Type /help for available commands.");
        eprintln!();
    }

    if !controller.messages().is_empty() {
        println!("{}", commands::format_history(controller.messages()));
        println!();
    }

    let mut receiver = controller.subscribe();
    let mut printer = Printer::new(is_tty);
    let mut stdout = io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut prompt_shown = false;

    loop {
        if !controller.is_busy() && !prompt_shown {
            print!("> ");
            stdout.flush()?;
            prompt_shown = true;
        }

        tokio::select! {
            line = lines.next_line() => {
                // EOF
                let Some(line) = line? else { break };
                prompt_shown = false;

                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                match commands::execute_command(input, controller.messages()) {
                    Some(CommandResult::Clear) => {
                        controller.clear_conversation();
                        printer.drain(&mut receiver, &mut stdout)?;
                        println!("Cleared conversation.");
                    }
                    Some(CommandResult::Exit) => break,
                    Some(CommandResult::Message(msg)) => println!("{}", msg),
                    Some(CommandResult::Unknown(cmd)) => {
                        println!("Unknown command: /{}", cmd);
                        println!("Type /help for available commands.");
                    }
                    None => {
                        if controller.submit(&line) == SubmitOutcome::Busy {
                            println!("Still waiting for the previous reply.");
                        }
                    }
                }
            }
            _ = controller.step(), if controller.is_busy() => {}
        }

        printer.drain(&mut receiver, &mut stdout)?;
    }

    Ok(())
}
