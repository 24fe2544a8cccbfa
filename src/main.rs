//! Termdrive - headless terminal host
//!
//! Connects to a serial port or TCP host and drives the idle core from a
//! single thread: stdin lines are queued as keystrokes, received data is
//! written to stdout, and captures go to the files named on the command line.

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use termdrive_core::config::init_directories;
use termdrive_core::core::logger::generate_log_filename;
use termdrive_core::core::transport::list_ports;
use termdrive_core::{
    exit_code_for, AppConfig, CaptureKind, CommPort, FileCapture, IdleCore, RawTerminal,
    SerialComm, SerialConfig, SerialFlowControl, SerialParity, TcpComm, TcpConfig,
};

/// How long the host waits for input once the core says it is idle
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// Termdrive CLI
#[derive(Parser, Debug)]
#[command(
    name = "termdrive",
    version,
    about = "Headless serial and TCP terminal",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to config.toml in the platform config directory)
    #[arg(long, env = "TERMDRIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Append captured text to this file
    #[arg(short = 'l', long)]
    log: Option<PathBuf>,

    /// Append raw received bytes to this file
    #[arg(long)]
    binary_log: Option<PathBuf>,

    /// Send this file once connected
    #[arg(long)]
    send_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts,

    /// Connect to a serial port
    Serial {
        /// Serial port name (e.g., COM3, /dev/ttyUSB0)
        #[arg(short, long)]
        port: String,

        /// Baud rate
        #[arg(short, long, default_value = "115200")]
        baud: u32,

        /// Data bits (5-8)
        #[arg(long, default_value = "8")]
        data_bits: u8,

        /// Parity (none, odd, even)
        #[arg(long, default_value = "none")]
        parity: String,

        /// Stop bits (1, 2)
        #[arg(long, default_value = "1")]
        stop_bits: u8,

        /// Flow control (none, hw, sw)
        #[arg(long, default_value = "none")]
        flow: String,
    },

    /// Connect to a TCP host
    Tcp {
        /// Host address
        #[arg(short = 'H', long)]
        host: String,

        /// Port number
        #[arg(short, long, default_value = "23")]
        port: u16,

        /// Interpret Telnet commands
        #[arg(short, long)]
        telnet: bool,

        /// Connection timeout (seconds)
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::load().context("loading config")?,
    };

    let port: Box<dyn CommPort> = match &cli.command {
        Commands::ListPorts => {
            for port in list_ports()? {
                println!("{}", port.port_name);
            }
            return Ok(());
        }
        Commands::Serial {
            port,
            baud,
            data_bits,
            parity,
            stop_bits,
            flow,
        } => {
            let serial = SerialConfig::new(port, *baud)
                .data_bits(*data_bits)
                .stop_bits(*stop_bits)
                .parity(parity.parse::<SerialParity>()?)
                .flow_control(flow.parse::<SerialFlowControl>()?);
            Box::new(SerialComm::open(serial).with_context(|| format!("opening {}", port))?)
        }
        Commands::Tcp {
            host,
            port,
            telnet,
            timeout,
        } => {
            config.connection.telnet |= *telnet;
            let tcp = TcpConfig::new(host, *port).timeout(*timeout);
            Box::new(
                TcpComm::connect(tcp).with_context(|| format!("connecting to {}:{}", host, port))?,
            )
        }
    };

    let mut sink = FileCapture::new();
    for (kind, explicit) in [
        (CaptureKind::Text, cli.log.clone()),
        (CaptureKind::Binary, cli.binary_log.clone()),
    ] {
        let enabled = match kind {
            CaptureKind::Text => config.capture.file_log,
            CaptureKind::Binary => config.capture.binary_log,
        };
        let path = match explicit {
            Some(path) => path,
            None if enabled => {
                let dir = config
                    .capture
                    .resolved_log_dir()
                    .context("no directory for capture files")?;
                init_directories()?;
                std::fs::create_dir_all(&dir)?;
                dir.join(generate_log_filename(&config.capture.log_prefix, kind))
            }
            None => continue,
        };
        sink.start(kind, &path)
            .with_context(|| format!("opening capture file {}", path.display()))?;
        match kind {
            CaptureKind::Text => config.capture.file_log = true,
            CaptureKind::Binary => config.capture.binary_log = true,
        }
    }

    let mut core = IdleCore::builder(port)
        .config(config)
        .engines(Box::new(RawTerminal::new(io::stdout())))
        .sink(Box::new(sink))
        .build();

    if let Some(path) = &cli.send_file {
        core.transfers_mut()
            .start_file(path)
            .with_context(|| format!("sending {}", path.display()))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    eprintln!("Connected to {}. Press Ctrl+C to exit.", core.connection_info());
    drive(&mut core, &spawn_stdin_reader(), &running);
    eprintln!("Disconnected.");

    Ok(())
}

/// Forward stdin lines to the host loop
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn queue_line(core: &mut IdleCore, line: &str) {
    let session = core.session_mut();
    session.queue_outbound(line.as_bytes());
    session.queue_outbound(b"\r");
}

/// Call the core while it has work, wait for input while it does not
fn drive(core: &mut IdleCore, input: &Receiver<String>, running: &AtomicBool) {
    let mut budget = 0u32;
    let mut stdin_open = true;

    while running.load(Ordering::SeqCst) && core.session().ready {
        while stdin_open {
            match input.try_recv() {
                Ok(line) => queue_line(core, &line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => stdin_open = false,
            }
        }

        if core.on_idle(budget) {
            budget = budget.saturating_add(1);
            continue;
        }

        budget = 0;
        if stdin_open {
            match input.recv_timeout(IDLE_WAIT) {
                Ok(line) => queue_line(core, &line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => stdin_open = false,
            }
        } else {
            std::thread::sleep(IDLE_WAIT);
        }
    }

    let stats = core.pump().stats();
    tracing::info!(
        sent = stats.bytes_sent,
        received = stats.bytes_received,
        "session ended"
    );
}
