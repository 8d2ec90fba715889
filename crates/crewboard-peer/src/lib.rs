//! Peer-side synchronization: the outbound connector with reconnect
//! backoff, the offline queue replayed on reconnect, the local-hub
//! discovery file, and leader-or-client startup.

mod connector;
mod discovery;
mod leader;
mod offline;
mod reducer;

pub use connector::{build_ws_url, Connection, Connector, ConnectorError};
pub use discovery::{
    read_server_info, read_server_info_in, remove_server_info, remove_server_info_in,
    write_server_info, write_server_info_in, ServerInfo, SERVER_INFO_PATH,
};
pub use leader::{start_or_connect, PeerError, PeerState, Role};
pub use offline::{OfflineQueue, QueuedMessage};
pub use reducer::BoardReducer;
