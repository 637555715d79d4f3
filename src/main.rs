// Operator CLI for out-of-band power control
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, Result, WrapErr};
use std::io::stderr;
use std::path::PathBuf;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

use dragonfly_power::{
    relay_target_from_mac, BackendConfig, DesiredState, DeviceProfile, PduConfig, PowerDriver,
    PowerState, ProfileSpec, RelayConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Dragonfly out-of-band power control", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the current power state
    Status(DeviceArgs),
    /// Power the device on and verify it
    On(DeviceArgs),
    /// Power the device off and verify it
    Off(DeviceArgs),
    /// Power cycle the device
    Reboot(DeviceArgs),
    /// Check the device profile without running any command
    Validate(DeviceArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Relay,
    Pdu,
}

#[derive(Args, Debug)]
struct DeviceArgs {
    /// Backend hardware family
    #[arg(long, value_enum, default_value_t = Backend::Relay)]
    backend: Backend,

    /// Relay device id or PDU-attached node address
    #[arg(long, default_value = "")]
    target: String,

    /// Derive the relay device id from the switched port's MAC address
    #[arg(long, conflicts_with = "target")]
    mac: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Relay tool or PDU manager script
    #[arg(long)]
    program: Option<PathBuf>,

    /// PDU address handed to the manager script
    #[arg(long)]
    pdu_address: Option<String>,

    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    #[arg(long, default_value_t = 9_000)]
    settle_ms: u64,

    #[arg(long, default_value_t = 2)]
    retries: u32,

    #[arg(long, default_value_t = 500)]
    backoff_ms: u64,

    /// Print the result as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl DeviceArgs {
    fn profile(&self) -> Result<DeviceProfile> {
        let backend = match self.backend {
            Backend::Relay => {
                let mut config = RelayConfig::default();
                if let Some(program) = &self.program {
                    config = config.with_program(program);
                }
                BackendConfig::Relay(config)
            }
            Backend::Pdu => {
                let mut config = PduConfig::default();
                if let Some(program) = &self.program {
                    config = config.with_manager(program);
                }
                if let Some(address) = &self.pdu_address {
                    config = config.with_pdu_address(address);
                }
                BackendConfig::Pdu(config)
            }
        };

        let target = match (&self.mac, self.backend) {
            (Some(mac), Backend::Relay) => relay_target_from_mac(mac)?,
            (Some(_), Backend::Pdu) => bail!("--mac only applies to the relay backend"),
            (None, _) => self.target.clone(),
        };

        let spec = ProfileSpec {
            target,
            username: self.username.clone(),
            password: self.password.clone(),
            backend,
            command_timeout_ms: self.timeout_ms,
            settle_delay_ms: self.settle_ms,
            max_retries: self.retries,
            retry_backoff_ms: self.backoff_ms,
        };

        DeviceProfile::try_from(spec).wrap_err("invalid device profile")
    }
}

fn print_state(state: PowerState, json: bool) {
    if json {
        println!("{}", serde_json::json!({ "state": state }));
    } else {
        println!("{}", state);
    }
}

async fn run(command: Commands) -> Result<()> {
    let driver = PowerDriver::default();

    match command {
        Commands::Status(args) => {
            let profile = args.profile()?;
            let state = driver.get_power_state(&profile).await?;
            print_state(state, args.json);
        }
        Commands::On(args) => {
            let profile = args.profile()?;
            let state = driver.set_power_state(&profile, DesiredState::On).await?;
            print_state(state, args.json);
        }
        Commands::Off(args) => {
            let profile = args.profile()?;
            let state = driver.set_power_state(&profile, DesiredState::Off).await?;
            print_state(state, args.json);
        }
        Commands::Reboot(args) => {
            let profile = args.profile()?;
            let state = driver.reboot(&profile).await?;
            print_state(state, args.json);
        }
        Commands::Validate(args) => {
            let profile = args.profile()?;
            driver.validate(&profile)?;
            println!("ok");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Respect RUST_LOG, fall back to info (or debug with -v) for our crates
    let level = if cli.verbose { "debug" } else { "info" };
    let default_directives = format!(
        "dragonfly_power={level},dragonfly_powerctl={level}",
        level = level
    );
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    registry().with(filter).with(fmt::layer().with_writer(stderr)).init();

    debug!(verbose = cli.verbose, "Logger initialized");

    if let Err(e) = run(cli.command).await {
        error!("Power operation failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}
