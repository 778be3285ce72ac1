//! # BCP Clock Application Entry Point
//!
//! Wires the library together: configuration, the event data source, the
//! terminal stand-in for the LED matrix, the stdin button, and the scheduler
//! loop. The loop restarts with freshly loaded configuration whenever the
//! configuration portal reports a save.
//!
//! ## Flags
//! - `--demo`: use built-in sample event data instead of the BCP API
//! - `--ascii`: print frames as `#`/`.` instead of truecolor blocks
//! - `--config <path>`: configuration file (default `bcp-clock.toml`)

use anyhow::Context;
use bcp_clock_lib::button::spawn_stdin_button;
use bcp_clock_lib::config::{Config, CONFIG_FILE};
use bcp_clock_lib::display_state::DisplayStateMachine;
use bcp_clock_lib::event::{BcpClient, EventSource, SampleEventSource};
use bcp_clock_lib::framebuffer::FrameBuffer;
use bcp_clock_lib::platform::{FileConfigPortal, SystemPlatform};
use bcp_clock_lib::renderer::{TerminalMode, TerminalStrip};
use bcp_clock_lib::scheduler::{self, Exit, Message};
use chrono::Utc;
use log::info;
use std::env;
use std::io;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

struct Options {
    demo: bool,
    mode: TerminalMode,
    config_path: PathBuf,
}

impl Options {
    fn from_args() -> anyhow::Result<Self> {
        let mut options = Options {
            demo: false,
            mode: TerminalMode::Ansi,
            config_path: PathBuf::from(CONFIG_FILE),
        };
        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--demo" => options.demo = true,
                "--ascii" => options.mode = TerminalMode::Ascii,
                "--config" => {
                    options.config_path = args.next().context("--config needs a path")?.into();
                }
                other => anyhow::bail!("unknown argument {other:?}"),
            }
        }
        Ok(options)
    }
}

/// Run the clock once with `source` until it asks to restart.
async fn run_clock<E: EventSource>(
    config: Config,
    source: E,
    options: &Options,
    tx: &UnboundedSender<Message>,
    rx: &mut UnboundedReceiver<Message>,
) -> Exit {
    let fb = FrameBuffer::new(TerminalStrip::new(io::stdout(), options.mode));
    let portal = FileConfigPortal::new(&options.config_path);
    let mut machine =
        DisplayStateMachine::new(config, fb, source, SystemPlatform, portal, tx.clone());
    scheduler::run(&mut machine, rx).await
}

async fn run(options: Options) -> anyhow::Result<()> {
    let (tx, mut rx) = scheduler::mailbox();
    let _button = spawn_stdin_button(tx.clone());
    info!("Press Enter to open the configuration portal");

    loop {
        let config = Config::load_from_path(&options.config_path);
        let exit = if options.demo {
            info!("Demo mode: using sample event data");
            let source = SampleEventSource::new(Utc::now());
            run_clock(config, source, &options, &tx, &mut rx).await
        } else {
            let source = BcpClient::new(&config.event).context("creating HTTP client")?;
            run_clock(config, source, &options, &tx, &mut rx).await
        };

        match exit {
            Exit::Restart => info!("Restarting with new configuration"),
            Exit::Shutdown => return Ok(()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let options = Options::from_args()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(run(options))
}
