//! Wire types, key codecs and state-file schemas shared by every Hopbox
//! process. This crate performs no I/O of its own: every module here is
//! pure data plus (de)serialization.

pub mod cidr;
pub mod connectivity;
pub mod control_protocol;
pub mod daemon_state;
pub mod global_config;
pub mod helper_protocol;
pub mod host_record;
pub mod keys;
pub mod manifest;
pub mod paths;
pub mod rpc;
pub mod tunnel_config;

pub use cidr::CidrAddr;
pub use connectivity::{ConnectivityEvent, ConnectivityState};
pub use control_protocol::{ControlRequest, ControlResponse, ControlStateView};
pub use daemon_state::{DaemonState, ForwardedPort};
pub use global_config::GlobalConfig;
pub use helper_protocol::{HelperRequest, HelperResponse};
pub use host_record::{validate_host_name, HostNameError, HostRecord};
pub use keys::{KeyError, KeyPair};
pub use manifest::{BackendKind, Manifest, ServiceDef, ServiceRunState, ServiceStatus};
pub use rpc::{RpcError, RpcRequest, RpcResponse};
pub use tunnel_config::{TunnelConfig, TunnelStatus};
