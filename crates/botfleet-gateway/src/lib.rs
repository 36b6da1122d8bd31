//! botfleet-gateway — access to the backend bot hosts.
//!
//! The controller only ever needs three things from a host: the names of
//! the workers it knows about, and a way to start or stop a batch of them.
//! `HostGateway` captures that contract; `AsfGateway` implements it over
//! the hosts' HTTP IPC interface.
//!
//! # Host IPC calls
//!
//! ```text
//! POST {url}/Command          {"Command": "status ASF"}  → Result text with <name> tokens
//! POST {url}/Bot/{a,b,c}/Start
//! POST {url}/Bot/{a,b,c}/Stop
//! GET  {url}/ASF              → host status document
//! ```
//!
//! Every request carries `Authentication: <password>`.

pub mod asf;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod gateway;

pub use asf::{AsfGateway, HostEndpoint};
pub use error::{GatewayError, GatewayResult};
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeGateway, GatewayCall};
pub use gateway::{HostGateway, parse_worker_names};
