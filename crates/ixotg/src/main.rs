use ixotg_lib::remote::memory::InMemoryStore;
use ixotg_lib::*;
mod cmd;

use std::error::Error;
use std::fs;
use std::process;
use std::time::Instant;

use clap::Parser;

fn load_config(path: &str) -> Result<config::Config, Box<dyn Error>> {
    let content = fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;
    Ok(import_config(&content)?)
}

#[allow(clippy::too_many_arguments)]
fn simulate(
    config: &str,
    passes: u32,
    transmit: Option<cmd::Transmit>,
    results: bool,
    dump: Option<String>,
    capture_port: Option<String>,
    capture_file: String,
    options: ApiOptions,
) -> Result<(), Box<dyn Error>> {
    let config = load_config(config)?;
    let mut api = IxNetworkApi::with_options(InMemoryStore::new(), options);

    for pass in 1..=passes {
        let before = api.store().mutations();
        let start = Instant::now();
        api.apply_configuration(Some(config.clone()))?;
        let mutations = api.store().mutations() - before;
        log::info!("Pass {pass} applied in {:?}", start.elapsed());
        println!("pass {pass}: {mutations} mutations");
    }

    if let Some(port) = &capture_port {
        api.set_capture_state(CaptureState {
            port_names: vec![port.clone()],
            state: CaptureAction::Start,
        })?;
    }
    if let Some(transmit) = transmit {
        api.set_transmit_state(&TransmitState {
            flow_names: vec![],
            state: transmit.into(),
        })?;
    }

    if results {
        let flows = api.get_flow_results(&FlowRequest::default())?;
        let ports = api.get_port_results(&PortRequest::default())?;
        let output = serde_json::json!({ "flows": flows, "ports": ports });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    if let Some(port) = capture_port {
        let bytes = api.get_capture_results(&CaptureRequest { port_name: port })?;
        fs::write(&capture_file, bytes)?;
        log::info!("Capture written to {capture_file}");
    }

    if let Some(dump) = dump {
        fs::write(&dump, serde_json::to_string_pretty(&api.store().to_json())?)?;
        log::info!(
            "Object tree of {} nodes written to {dump}",
            api.store().node_count()
        );
    }
    Ok(())
}

fn parse_duration(name: &str, value: &str) -> Result<std::time::Duration, Box<dyn Error>> {
    humantime::parse_duration(value)
        .map_err(|e| format!("{name} could not be parsed: {e}").into())
}

/// The entry point of the application.
///
/// Errors are logged and end the process with a non-zero status.
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cmd::Args::parse();

    let outcome = match args.command {
        cmd::Command::Validate { config: path } => load_config(&path).map(|config| {
            println!(
                "{path}: {} ports, {} devices, {} flows",
                config.ports.len(),
                config.devices.len(),
                config.flows.len()
            );
        }),
        cmd::Command::Simulate {
            config,
            passes,
            transmit,
            results,
            dump,
            capture_port,
            capture_file,
            capture_timeout,
            capture_poll_interval,
        } => parse_duration("--capture-timeout", &capture_timeout)
            .and_then(|timeout| {
                Ok(ApiOptions {
                    capture_timeout: timeout,
                    capture_poll_interval: parse_duration(
                        "--capture-poll-interval",
                        &capture_poll_interval,
                    )?,
                })
            })
            .and_then(|options| {
                simulate(
                    &config,
                    passes,
                    transmit,
                    results,
                    dump,
                    capture_port,
                    capture_file,
                    options,
                )
            }),
    };

    if let Err(e) = outcome {
        log::error!("{e}");
        process::exit(1);
    }
}
