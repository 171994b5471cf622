//! `janus-snap`: connect to a gateway, list its streams, grab snapshots.
//!
//! # Usage
//!
//! ```text
//! janus-snap [OPTIONS]
//!
//! Options:
//!   --host <HOST>          Gateway host [config: gateway.host]
//!   --port <PORT>          Gateway WebSocket port [config: gateway.port]
//!   --insecure             Use ws:// straight away instead of trying wss:// first
//!   --strict-tls           Verify the gateway certificate [config: gateway.accept_invalid_certs]
//!   --capture <IDS>        Comma-separated stream ids to snapshot, e.g. 1,2
//!   --output-dir <DIR>     Where snapshots are written [config: snapshots.output_dir]
//!   --config <FILE>        Config file [default: platform config dir]
//!   --json                 Print results as JSON
//!   --log-level <LEVEL>    Log level when RUST_LOG is unset [config: logging.level]
//! ```
//!
//! Every option except `--insecure`, `--strict-tls` and `--json` can also be
//! set through a `JANUS_*` environment variable (`JANUS_HOST`,
//! `JANUS_CAPTURE`, …).  Command line, then environment, then config file,
//! then built-in defaults.
//!
//! # Threading
//!
//! `main` is an ordinary synchronous function.  The [`JanusClient`] runs the
//! gateway conversation on its own runtime and posts every callback back to
//! this thread, which waits on the completion pump between steps, the same
//! way a GUI event loop would.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use janus_client::application::{GatewayError, SnapshotReport};
use janus_client::infrastructure::capture_backend::HttpCaptureBackend;
use janus_client::infrastructure::storage::config::{
    load_config, load_config_from, AppConfig, ConfigError,
};
use janus_client::infrastructure::storage::FileSnapshotStore;
use janus_client::infrastructure::transport::WebSocketConnector;
use janus_client::infrastructure::ui_bridge::{
    ClientCommandResult, ClientOptions, ClientStatusDto, CompletionPump, JanusClient,
    SnapshotReportDto, SourceDto, StatusCallback,
};
use janus_core::{SourceDescriptor, SourceId};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Janus gateway snapshot client.
#[derive(Debug, Parser)]
#[command(
    name = "janus-snap",
    about = "Lists the streams of a Janus gateway and captures snapshots from them",
    version
)]
struct Cli {
    /// Gateway hostname or IP address.
    #[arg(long, env = "JANUS_HOST")]
    host: Option<String>,

    /// Gateway WebSocket port.
    #[arg(long, env = "JANUS_PORT")]
    port: Option<u16>,

    /// Connect over ws:// without trying wss:// first.
    #[arg(long)]
    insecure: bool,

    /// Reject gateway certificates that do not chain to a trusted root.
    #[arg(long)]
    strict_tls: bool,

    /// Stream ids to capture from, comma separated.
    #[arg(long, value_delimiter = ',', env = "JANUS_CAPTURE")]
    capture: Vec<u64>,

    /// Directory snapshots are written to.
    #[arg(long, env = "JANUS_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Config file to read instead of the platform default.
    #[arg(long, env = "JANUS_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "JANUS_LOG_LEVEL")]
    log_level: Option<String>,
}

/// Everything one run needs, after merging CLI and config file.
#[derive(Debug, Clone, PartialEq)]
struct RunConfig {
    host: String,
    port: u16,
    secure: bool,
    accept_invalid_certs: bool,
    capture: Vec<SourceId>,
    json: bool,
    log_level: String,
    app: AppConfig,
}

impl Cli {
    /// Reads the config file named by `--config`, or the platform default.
    ///
    /// A missing platform config directory is not an error; the defaults
    /// apply.
    fn load_app_config(&self) -> anyhow::Result<AppConfig> {
        match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("could not load config from {}", path.display())),
            None => match load_config() {
                Err(ConfigError::NoPlatformConfigDir) => Ok(AppConfig::default()),
                other => other.context("could not load config"),
            },
        }
    }

    /// Merges the parsed arguments over `app`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting host is blank or the port is zero.
    fn into_run_config(self, mut app: AppConfig) -> anyhow::Result<RunConfig> {
        let host = self.host.unwrap_or_else(|| app.gateway.host.clone());
        if host.trim().is_empty() {
            bail!("gateway host must not be empty");
        }
        let port = self.port.unwrap_or(app.gateway.port);
        if port == 0 {
            bail!("gateway port must not be 0");
        }
        if let Some(dir) = self.output_dir {
            app.snapshots.output_dir = dir;
        }

        Ok(RunConfig {
            host: host.trim().to_string(),
            port,
            secure: app.gateway.secure && !self.insecure,
            accept_invalid_certs: app.gateway.accept_invalid_certs && !self.strict_tls,
            capture: self.capture.into_iter().map(SourceId).collect(),
            json: self.json,
            log_level: self.log_level.unwrap_or_else(|| app.logging.level.clone()),
            app,
        })
    }
}

// ── Waiting on callbacks ──────────────────────────────────────────────────────

/// A value filled in by a callback and awaited on the pumping thread.
struct Slot<T>(Arc<Mutex<Option<T>>>);

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    fn fill(&self, value: T) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = Some(value);
    }

    /// Pumps completions until the slot is filled.
    fn wait(&self, pump: &mut CompletionPump) -> anyhow::Result<T> {
        loop {
            if let Some(value) = self.0.lock().unwrap_or_else(|p| p.into_inner()).take() {
                return Ok(value);
            }
            if !pump.pump_blocking() {
                bail!("client stopped before the operation completed");
            }
        }
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_sources(sources: &[SourceDescriptor], json: bool) -> anyhow::Result<()> {
    if json {
        let dtos: Vec<SourceDto> = sources.iter().map(SourceDto::from).collect();
        println!("{}", serde_json::to_string_pretty(&ClientCommandResult::ok(dtos))?);
        return Ok(());
    }
    println!("{} stream(s):", sources.len());
    for source in sources {
        println!("  {:>4}  {}", source.id, source.name);
    }
    Ok(())
}

fn print_report(report: &SnapshotReport, json: bool) -> anyhow::Result<()> {
    if json {
        let dto = SnapshotReportDto::from(report);
        println!("{}", serde_json::to_string_pretty(&ClientCommandResult::ok(dto))?);
        return Ok(());
    }
    for artifact in report.artifacts() {
        println!(
            "saved   {:>4}  {} ({} bytes)",
            artifact.source_id,
            artifact.path.display(),
            artifact.bytes
        );
    }
    for (id, error) in report.failures() {
        println!("failed  {id:>4}  {error}");
    }
    for id in &report.skipped {
        println!("skipped {id:>4}  not offered by this gateway");
    }
    Ok(())
}

fn print_error(error: &GatewayError, json: bool) -> anyhow::Result<()> {
    if json {
        let envelope: ClientCommandResult<()> = ClientCommandResult::err(error.to_string());
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app = cli.load_app_config()?;
    let run = cli.into_run_config(app)?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&run.log_level)),
        )
        .init();

    let session_config = run.app.session_config();
    let mut backend = HttpCaptureBackend::new(
        run.app.snapshots.url_template.clone(),
        run.app.snapshots.backend_host.clone(),
        session_config.capture_timeout,
    )
    .context("could not build the HTTP capture backend")?
    .with_default_port(run.app.snapshots.default_port);
    for (id, port) in run.app.snapshots.source_ports()? {
        backend = backend.with_port(id, port);
    }

    let connector = WebSocketConnector::from_config(run.accept_invalid_certs)
        .context("could not set up TLS")?;

    let quiet = run.json;
    let on_status: StatusCallback = Arc::new(move |status: ClientStatusDto| {
        if !quiet {
            eprintln!("[{}] {}", status.connection_status, status.message);
        }
    });
    let (client, mut pump) = JanusClient::start(ClientOptions {
        session: session_config,
        connector: Arc::new(connector),
        capture: Arc::new(backend),
        sink: Arc::new(FileSnapshotStore::new(run.app.snapshots.output_dir.clone())),
        on_status: Some(on_status),
        on_event: None,
    })
    .context("could not start the client runtime")?;

    info!(
        "janus-snap starting: gateway={}:{} secure={}",
        run.host, run.port, run.secure
    );

    // ── Connect ───────────────────────────────────────────────────────────────
    let connected = Slot::new();
    let (ok, err) = (connected.clone(), connected.clone());
    client.connect(
        run.host.clone(),
        run.port,
        run.secure,
        move |sources| ok.fill(Ok(sources)),
        move |e| err.fill(Err(e)),
    );
    let sources = match connected.wait(&mut pump)? {
        Ok(sources) => sources,
        Err(e) => {
            print_error(&e, run.json)?;
            client.shutdown();
            return Err(e).with_context(|| format!("could not connect to {}:{}", run.host, run.port));
        }
    };
    print_sources(&sources, run.json)?;

    // ── Capture ───────────────────────────────────────────────────────────────
    let mut outcome = Ok(());
    if !run.capture.is_empty() {
        let captured = Slot::new();
        let (ok, err) = (captured.clone(), captured.clone());
        client.take_snapshot(
            run.capture.clone(),
            move |report| ok.fill(Ok(report)),
            move |e| err.fill(Err(e)),
        );
        match captured.wait(&mut pump)? {
            Ok(report) => {
                print_report(&report, run.json)?;
                if report.failures().next().is_some() {
                    warn!("some snapshots failed");
                }
            }
            Err(e) => {
                print_error(&e, run.json)?;
                outcome = Err(anyhow::Error::new(e).context("capture failed"));
            }
        }
    }

    // ── Disconnect ────────────────────────────────────────────────────────────
    client.shutdown();
    pump.pump();
    info!("janus-snap stopped");
    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_leave_overrides_unset() {
        // Arrange / Act
        let cli = Cli::parse_from(["janus-snap"]);

        // Assert
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.capture.is_empty());
        assert!(!cli.insecure);
    }

    #[test]
    fn test_cli_capture_list_is_comma_separated() {
        let cli = Cli::parse_from(["janus-snap", "--capture", "1,2,7"]);
        assert_eq!(cli.capture, vec![1, 2, 7]);
    }

    #[test]
    fn test_cli_rejects_non_numeric_capture_id() {
        let result = Cli::try_parse_from(["janus-snap", "--capture", "1,bow"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_into_run_config_falls_back_to_config_file_values() {
        // Arrange
        let cli = Cli::parse_from(["janus-snap"]);
        let mut app = AppConfig::default();
        app.gateway.host = "gw.local".to_string();
        app.gateway.port = 8989;

        // Act
        let run = cli.into_run_config(app).unwrap();

        // Assert
        assert_eq!(run.host, "gw.local");
        assert_eq!(run.port, 8989);
        assert!(run.secure);
        assert!(run.accept_invalid_certs);
        assert_eq!(run.log_level, "info");
    }

    #[test]
    fn test_into_run_config_strict_tls_overrides_config_file() {
        // Arrange
        let cli = Cli::parse_from(["janus-snap", "--strict-tls"]);

        // Act
        let run = cli.into_run_config(AppConfig::default()).unwrap();

        // Assert
        assert!(!run.accept_invalid_certs);
        assert!(run.secure);
    }

    #[test]
    fn test_into_run_config_cli_overrides_config_file() {
        // Arrange
        let cli = Cli::parse_from([
            "janus-snap",
            "--host",
            "10.1.1.1",
            "--port",
            "9000",
            "--insecure",
            "--output-dir",
            "/tmp/shots",
            "--capture",
            "3",
        ]);

        // Act
        let run = cli.into_run_config(AppConfig::default()).unwrap();

        // Assert
        assert_eq!(run.host, "10.1.1.1");
        assert_eq!(run.port, 9000);
        assert!(!run.secure);
        assert_eq!(run.app.snapshots.output_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(run.capture, vec![SourceId(3)]);
    }

    #[test]
    fn test_into_run_config_blank_host_returns_error() {
        let cli = Cli::parse_from(["janus-snap", "--host", "  "]);
        assert!(cli.into_run_config(AppConfig::default()).is_err());
    }

    #[test]
    fn test_into_run_config_port_zero_returns_error() {
        let cli = Cli::parse_from(["janus-snap", "--port", "0"]);
        assert!(cli.into_run_config(AppConfig::default()).is_err());
    }

    #[test]
    fn test_slot_wait_fails_when_queue_is_gone() {
        // Arrange
        let (queue, mut pump) = janus_client::infrastructure::ui_bridge::completion_channel();
        drop(queue);
        let slot: Slot<u8> = Slot::new();

        // Act / Assert
        assert!(slot.wait(&mut pump).is_err());
    }
}
