//! vpnkit-bridge binary entry point.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vpnkit_bridge::{telemetry, BridgeConfig, Config, DnsServer, HostNetwork};

/// Bridge a TAP interface to a host-side virtual network and serve its DNS.
#[derive(Parser, Debug)]
#[command(name = "vpnkit-bridge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "vpnkit-bridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pump frames between the TAP interface and the configured transport.
    Bridge,
    /// Serve DNS from the configured zones and delegate resolver.
    Dns,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()).required(false))
        .add_source(
            config::Environment::with_prefix("VPNKIT_BRIDGE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    config.validate()?;

    // Initialize telemetry
    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        command = ?args.command,
        "Starting vpnkit-bridge"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let result = match args.command {
        Command::Bridge => run_bridge(&config.bridge, shutdown).await,
        Command::Dns => match DnsServer::new(config.dns) {
            Ok(server) => server.run(&HostNetwork, shutdown).await,
            Err(e) => Err(e),
        },
    };

    // Shutdown telemetry
    telemetry::shutdown();

    if let Err(e) = result {
        error!("vpnkit-bridge error: {}", e);
        return Err(e.into());
    }

    info!("vpnkit-bridge shutdown complete");
    Ok(())
}

#[cfg(all(target_os = "linux", feature = "tap"))]
async fn run_bridge(
    config: &BridgeConfig,
    shutdown: CancellationToken,
) -> Result<(), vpnkit_bridge::Error> {
    use vpnkit_bridge::tap::TapDevice;
    use vpnkit_bridge::{link, transport, Bridge};

    link::verify_interface_absent(&config.iface).await?;

    let stream = transport::connect(&config.effective_transport()).await?;
    let device = TapDevice::create(&config.iface, config.mtu)?;
    link::link_up(device.name(), config.mac).await?;

    let handle = Bridge::new(device, config.mtu as usize)
        .with_debug(config.debug)
        .start(stream, shutdown);
    handle.wait().await?;
    Ok(())
}

#[cfg(not(all(target_os = "linux", feature = "tap")))]
async fn run_bridge(
    config: &BridgeConfig,
    _shutdown: CancellationToken,
) -> Result<(), vpnkit_bridge::Error> {
    Err(vpnkit_bridge::ConfigError::Invalid(format!(
        "cannot create TAP interface {}: built without TAP support",
        config.iface
    ))
    .into())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    let _ = tokio::signal::ctrl_c().await;

    info!("signal caught, shutting down");
    shutdown.cancel();
}
