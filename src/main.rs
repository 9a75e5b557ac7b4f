use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use penstream::{
    init_logging, list_ports, Config, ConnectionParams, ControllerEvent, ControllerTrait,
    PlotterController, VirtualDevice, BUILD_DATE,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

/// How long `send` keeps printing replies after the last event
const SEND_QUIET_PERIOD: Duration = Duration::from_millis(1500);

#[derive(Parser)]
#[command(author, version, about = "G-code streamer for GRBL pen plotters")]
struct Cli {
    /// Configuration file (TOML or JSON). Defaults to the per-user config
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a G-code program and report progress
    Stream {
        file: PathBuf,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Send manual commands and print what the firmware answers
    Send {
        #[arg(required = true)]
        lines: Vec<String>,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// List serial ports that look like plotter controllers
    Ports,
}

#[derive(Args)]
struct LinkArgs {
    /// Serial port, overriding the configured one
    #[arg(long)]
    port: Option<String>,
    /// Baud rate, overriding the configured one
    #[arg(long)]
    baud: Option<u32>,
    /// Talk to the built-in firmware emulator instead of a serial port
    #[arg(long, default_value_t = false)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    tracing::debug!("penstream {} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    match cli.command {
        Commands::Ports => print_ports(),
        Commands::Stream { file, link } => {
            let config = load_config(cli.config.as_deref())?;
            let mut controller = build_controller(&config, &link)?;
            stream(&mut controller, &file).await
        }
        Commands::Send { lines, link } => {
            let config = load_config(cli.config.as_deref())?;
            let mut controller = build_controller(&config, &link)?;
            send(&mut controller, &lines).await
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(path) => return Config::load_from_file(path).context("loading configuration"),
        None => Config::default_path()?,
    };
    Config::load_or_default(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))
}

fn build_controller(config: &Config, link: &LinkArgs) -> anyhow::Result<PlotterController> {
    let mut params = config.connection_params();
    if let Some(port) = &link.port {
        params.port = port.clone();
    }
    if let Some(baud) = link.baud {
        params.baud_rate = baud;
    }
    let engine = config.engine_config();

    if link.simulate {
        let params = ConnectionParams {
            port: "virtual".to_string(),
            settle_ms: 0,
            ..params
        };
        return Ok(PlotterController::with_transport(
            Box::new(VirtualDevice::new()),
            params,
            engine,
        ));
    }

    if params.port.is_empty() {
        anyhow::bail!("no serial port configured; pass --port or use --simulate");
    }
    Ok(PlotterController::new(params, engine))
}

fn print_ports() -> anyhow::Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No plotter-like serial ports found");
    }
    for port in ports {
        println!("{:<20} {}", port.port_name, port.description);
    }
    Ok(())
}

async fn stream(controller: &mut PlotterController, file: &Path) -> anyhow::Result<()> {
    let mut events = controller.subscribe();
    controller.connect().await?;

    let id = controller
        .load_file(file)
        .with_context(|| format!("loading {}", file.display()))?;

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted, aborting upload");
                controller.abort()?;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event);
                    match event {
                        ControllerEvent::SessionCompleted { id: done, .. } if done == id => {
                            break Ok(());
                        }
                        ControllerEvent::SessionAborted { id: done, .. } if done == id => {
                            break Err(anyhow::anyhow!("upload aborted"));
                        }
                        ControllerEvent::Disconnected => {
                            break Err(anyhow::anyhow!("link lost during upload"));
                        }
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break Err(anyhow::anyhow!("engine stopped")),
            },
        }
    };

    if let Some(session) = controller.snapshot().session {
        println!(
            "{} of {} lines sent, {} watchdog recoveries",
            session.sent, session.total, session.recoveries
        );
    }
    controller.disconnect().await?;
    outcome
}

async fn send(controller: &mut PlotterController, lines: &[String]) -> anyhow::Result<()> {
    let mut events = controller.subscribe();
    controller.connect().await?;

    for line in lines {
        controller.send_immediate(line)?;
    }

    drain_events(&mut events).await;
    controller.disconnect().await?;
    Ok(())
}

/// Print events until none arrives for [`SEND_QUIET_PERIOD`]
async fn drain_events(events: &mut broadcast::Receiver<ControllerEvent>) {
    loop {
        match tokio::time::timeout(SEND_QUIET_PERIOD, events.recv()).await {
            Ok(Ok(event)) => print_event(&event),
            Ok(Err(RecvError::Lagged(_))) => continue,
            Ok(Err(RecvError::Closed)) | Err(_) => break,
        }
    }
}

fn print_event(event: &ControllerEvent) {
    match event {
        // position reports arrive every poll; keep them out of the console
        ControllerEvent::PositionChanged(pos) => tracing::debug!("Position: {}", pos),
        other => println!("{}", other),
    }
}
