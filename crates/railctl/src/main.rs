use std::path::PathBuf;

use anyhow::Result;
use camcaps::Attribute;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use dccex::Direction;
use tracing_subscriber::EnvFilter;

use railctl::cmd_camera::{self, DemoArgs};
use railctl::cmd_dcc::{self, Action};
use railctl::cmd_loco;
use railctl::cmd_monitor;
use railctl::cmd_ports;
use railctl::config::{Overrides, Settings};

#[derive(Parser, Debug)]
#[command(name = "railctl", version, about = "DCC-EX throttle and webcam control CLI")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Output JSON where applicable
    #[arg(long)]
    json: bool,
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial device of the command station
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    baud: Option<u32>,
    /// File holding the persisted locomotive states
    #[arg(long)]
    state_file: Option<PathBuf>,
    /// Use an in-process simulated command station
    #[arg(long)]
    simulate: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Heading {
    Forward,
    Backward,
    Toggle,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List serial ports
    Ports,
    /// Switch track power
    Power {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Set locomotive speed (0-126)
    Speed {
        #[arg(long)]
        address: Option<i64>,
        #[arg(allow_negative_numbers = true)]
        speed: i64,
    },
    /// Set or reverse locomotive direction
    Direction {
        #[arg(long)]
        address: Option<i64>,
        #[arg(value_enum)]
        heading: Heading,
    },
    /// Toggle a locomotive function (F0-F28)
    Function {
        #[arg(long)]
        address: Option<i64>,
        function: u8,
    },
    /// Ask the station for its status
    Status,
    /// Emergency stop all locomotives
    Estop,
    /// Send a raw DCC-EX command such as "<D CABS>"
    Send { command: String },
    /// Print station output
    Monitor {
        /// Request status once connected
        #[arg(long)]
        status: bool,
        /// Stop after this many seconds (0 = until Ctrl-C)
        #[arg(long, default_value_t = 0)]
        duration_s: u64,
    },
    /// Stored locomotive records
    Loco {
        #[command(subcommand)]
        cmd: LocoCmd,
    },
    /// Exposure stop table
    Exposure {
        #[command(subcommand)]
        cmd: ExposureCmd,
    },
    /// Capture resolution rules
    Resolution {
        #[command(subcommand)]
        cmd: ResolutionCmd,
    },
    /// Show whether a camera label gets manual control
    Trust { label: String },
    /// Camera controls against a simulated device
    Camera {
        #[command(subcommand)]
        cmd: CameraCmd,
    },
}

#[derive(Subcommand, Debug)]
enum LocoCmd {
    Show {
        #[arg(long)]
        address: Option<u16>,
    },
}

#[derive(Subcommand, Debug)]
enum ExposureCmd {
    /// List the stops
    Stops,
    /// Shutter fraction for a time in microseconds
    Label { microseconds: f64 },
    /// Nearest stop for a time in microseconds
    Snap { microseconds: f64 },
}

#[derive(Subcommand, Debug)]
enum ResolutionCmd {
    /// Default pick among supported WIDTHxHEIGHT values
    Pick {
        #[arg(required = true)]
        supported: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CameraCmd {
    Demo {
        #[arg(long, default_value = "Trust Webcam")]
        label: String,
        /// Resolutions the simulated device delivers
        #[arg(long, value_delimiter = ',')]
        supported: Vec<String>,
        /// Attributes the simulated device refuses
        #[arg(long, value_delimiter = ',')]
        reject: Vec<Attribute>,
        #[arg(long)]
        resolution: Option<String>,
        #[arg(long)]
        focus: Option<f64>,
        #[arg(long)]
        exposure: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        brightness: Option<f64>,
        #[arg(long)]
        contrast: Option<f64>,
        #[arg(long)]
        compensation: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        verbose,
        json,
        config,
        port,
        baud,
        state_file,
        simulate,
        cmd,
    } = Cli::parse();

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
        ))
        .with_target(false)
        .init();

    let overrides = Overrides {
        port,
        baud_rate: baud,
        state_file,
        simulate,
    };
    let settings = || Settings::load(config.as_deref(), overrides.clone());

    match cmd {
        Cmd::Ports => cmd_ports::run(json)?,
        Cmd::Power { state } => {
            cmd_dcc::run(&settings()?, None, Action::Power(state == Switch::On), json).await?
        }
        Cmd::Speed { address, speed } => {
            cmd_dcc::run(&settings()?, address, Action::Speed(speed), json).await?
        }
        Cmd::Direction { address, heading } => {
            let action = match heading {
                Heading::Forward => Action::Direction(Direction::Forward),
                Heading::Backward => Action::Direction(Direction::Backward),
                Heading::Toggle => Action::ToggleDirection,
            };
            cmd_dcc::run(&settings()?, address, action, json).await?
        }
        Cmd::Function { address, function } => {
            cmd_dcc::run(&settings()?, address, Action::Function(function), json).await?
        }
        Cmd::Status => cmd_dcc::run(&settings()?, None, Action::Status, json).await?,
        Cmd::Estop => cmd_dcc::run(&settings()?, None, Action::EmergencyStop, json).await?,
        Cmd::Send { command } => {
            cmd_dcc::run(&settings()?, None, Action::Send(command), json).await?
        }
        Cmd::Monitor { status, duration_s } => {
            cmd_monitor::run(&settings()?, status, duration_s, json).await?
        }
        Cmd::Loco {
            cmd: LocoCmd::Show { address },
        } => cmd_loco::run(&settings()?, address, json)?,
        Cmd::Exposure { cmd } => match cmd {
            ExposureCmd::Stops => cmd_camera::run_stops(json)?,
            ExposureCmd::Label { microseconds } => cmd_camera::run_label(microseconds, json)?,
            ExposureCmd::Snap { microseconds } => cmd_camera::run_snap(microseconds, json)?,
        },
        Cmd::Resolution {
            cmd: ResolutionCmd::Pick { supported },
        } => cmd_camera::run_pick(&supported, json)?,
        Cmd::Trust { label } => cmd_camera::run_trust(&label, json)?,
        Cmd::Camera {
            cmd:
                CameraCmd::Demo {
                    label,
                    supported,
                    reject,
                    resolution,
                    focus,
                    exposure,
                    brightness,
                    contrast,
                    compensation,
                },
        } => {
            let args = DemoArgs {
                label,
                supported,
                reject,
                resolution,
                focus,
                exposure,
                brightness,
                contrast,
                compensation,
            };
            cmd_camera::run_demo(args, json).await?
        }
    };

    Ok(())
}
