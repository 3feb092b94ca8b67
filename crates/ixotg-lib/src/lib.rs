//! Backend of a vendor-neutral traffic generator API for IxNetwork-style controllers.
//! Ports, devices and flows of a configuration are reconciled onto the object tree of
//! the controller, and its statistics are read back as vendor-neutral result rows.

/// The public entry point
pub mod api;
/// Configuration of a test
pub mod config;
/// Errors of the backend
pub mod error;
/// Packet definition of flows
pub mod flow;
/// The controller object tree
pub mod remote;

#[doc(hidden)]
/// Requests and results of the api
pub mod structs;

#[doc(inline)]
pub use structs::*;

pub mod fields;

/// Name to href registry and per-pass state
pub mod context;

/// Value patterns written into fields
pub mod pattern;
/// Protocol stacks of traffic items
pub mod stack;
/// Traffic items
pub mod traffic_item;

/// Vports
pub mod port;
/// Topologies and device groups
pub mod device;

/// Start and stop of flows
pub mod transmit;
/// Port captures
pub mod capture;
/// Flow and port results
pub mod results;

pub use api::{ApiOptions, IxNetworkApi};
pub use config::import_config;
pub use error::Error;
