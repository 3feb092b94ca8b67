use crate::capture;
use crate::config::Config;
use crate::context::{ReconcileContext, Registry};
use crate::device;
use crate::error::Error;
use crate::port;
use crate::remote::RemoteStore;
use crate::results;
use crate::structs::*;
use crate::traffic_item;
use crate::transmit;
use std::time::{Duration, Instant};

/// Runtime options of the backend
#[derive(Debug, Clone, PartialEq)]
pub struct ApiOptions {
    /// Delay between two checks that a stopped capture can be read
    pub capture_poll_interval: Duration,
    /// How long to wait for a stopped capture before giving up
    pub capture_timeout: Duration,
}

impl Default for ApiOptions {
    fn default() -> Self {
        ApiOptions {
            capture_poll_interval: Duration::from_millis(500),
            capture_timeout: Duration::from_secs(30),
        }
    }
}

/// The traffic generator, driven through a controller session.
///
/// It keeps the running configuration, the remote href of every configured name and
/// the capture request waiting for traffic to start.
pub struct IxNetworkApi<S: RemoteStore> {
    store: S,
    options: ApiOptions,
    config: Option<Config>,
    registry: Registry,
    capture_request: Option<CaptureState>,
}

impl<S: RemoteStore> IxNetworkApi<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, ApiOptions::default())
    }

    pub fn with_options(store: S, options: ApiOptions) -> Self {
        IxNetworkApi {
            store,
            options,
            config: None,
            registry: Registry::default(),
            capture_request: None,
        }
    }

    /// Make the session match a configuration: ports, then devices, then flows.
    ///
    /// `None` clears the session. Remote failures do not stop the pass; they are
    /// returned together at the end.
    pub fn apply_configuration(&mut self, config: Option<Config>) -> Result<(), Error> {
        self.capture_request = None;
        self.registry = Registry::default();
        let Some(config) = config else {
            log::info!("Clearing the session");
            self.config = None;
            self.store.new_config()?;
            return Ok(());
        };
        config.validate()?;
        traffic_item::check(&config)?;
        let mut ctx = ReconcileContext::new();

        let start = Instant::now();
        if let Err(e) = port::configure(&mut self.store, &config, &mut ctx) {
            ctx.record(e);
        }
        log::info!("Ports configured in {:?}", start.elapsed());

        let start = Instant::now();
        if let Err(e) = device::configure(&mut self.store, &config, &mut ctx) {
            ctx.record(e);
        }
        log::info!("Devices configured in {:?}", start.elapsed());

        let start = Instant::now();
        traffic_item::configure(&mut self.store, &config, &mut ctx)?;
        log::info!("Flows configured in {:?}", start.elapsed());

        self.registry = ctx.registry.clone();
        self.config = Some(config);
        ctx.finish().map(|_| ())
    }

    pub fn set_transmit_state(&mut self, request: &TransmitState) -> Result<(), Error> {
        transmit::set_transmit_state(&mut self.store, request, self.capture_request.as_ref())
    }

    /// A started capture is armed when traffic next starts
    pub fn set_capture_state(&mut self, request: CaptureState) -> Result<(), Error> {
        match request.state {
            CaptureAction::Start => {
                log::debug!("Capture requested on {:?}", request.port_names);
                self.capture_request = Some(request);
                Ok(())
            }
            CaptureAction::Stop => {
                self.capture_request = None;
                capture::stop(&mut self.store, &self.registry, &request.port_names)
            }
        }
    }

    pub fn get_flow_results(&mut self, request: &FlowRequest) -> Result<Vec<ResultRow>, Error> {
        results::flow_results(&mut self.store, self.config.as_ref(), request)
    }

    pub fn get_port_results(&mut self, request: &PortRequest) -> Result<Vec<ResultRow>, Error> {
        results::port_results(&mut self.store, request)
    }

    /// The capture of a port, as a pcap stream
    pub fn get_capture_results(&mut self, request: &CaptureRequest) -> Result<Vec<u8>, Error> {
        capture::retrieve(&mut self.store, &self.registry, &request.port_name, &self.options)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}
