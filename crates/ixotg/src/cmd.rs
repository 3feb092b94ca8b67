use clap::{Parser, Subcommand, ValueEnum};
use ixotg_lib::remote::TrafficAction;

#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Transmit {
    Start,
    Stop,
    Pause,
    Resume,
}

impl From<Transmit> for TrafficAction {
    fn from(t: Transmit) -> Self {
        match t {
            Transmit::Start => TrafficAction::Start,
            Transmit::Stop => TrafficAction::Stop,
            Transmit::Pause => TrafficAction::Pause,
            Transmit::Resume => TrafficAction::Resume,
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Parse a configuration file and check that its names are consistent
    Validate {
        #[arg(short, long, required = true, help = "Configuration file (YAML or JSON)")]
        config: String,
    },
    /// Apply a configuration to a simulated controller session
    Simulate {
        #[arg(short, long, required = true, help = "Configuration file (YAML or JSON)")]
        config: String,
        #[arg(
            short,
            long,
            default_value_t = 1,
            help = "Number of times the configuration is applied. Every pass after the first should make no change."
        )]
        passes: u32,
        #[arg(short, long, default_value = None, help = "Transmit state to set on every flow after the configuration")]
        transmit: Option<Transmit>,
        #[arg(
            short,
            long,
            default_value_t = false,
            help = "Print the flow and port results as JSON"
        )]
        results: bool,
        #[arg(short, long, default_value = None, help = "Write the simulated object tree as JSON into this file")]
        dump: Option<String>,
        #[arg(long, default_value = None, help = "Port to capture on. The capture is armed when traffic starts.")]
        capture_port: Option<String>,
        #[arg(
            long,
            default_value = "capture.pcap",
            help = "Pcap file receiving the capture of --capture-port"
        )]
        capture_file: String,
        #[arg(long, default_value = "30s", help = "How long to wait for a stopped capture, in human-friendly time such as \"1min 30s\"")]
        capture_timeout: String,
        #[arg(
            long,
            default_value = "500ms",
            help = "Delay between two checks that a stopped capture can be read"
        )]
        capture_poll_interval: String,
    },
}
