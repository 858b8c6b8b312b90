//! `tw2002_swarm`: fleet supervision over many Bot Runtimes — status
//! aggregation and timeseries, the shared-knowledge broker, hijack
//! leases, and the REST control plane that exposes all three.

pub mod clock;
pub mod error;
pub mod http;
pub mod knowledge_broker;
pub mod lease;
pub mod manager;
pub mod state;
