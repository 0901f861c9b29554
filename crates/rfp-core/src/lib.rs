pub mod config;
pub mod logging;

pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod group;
pub mod pool;
pub mod protocol;
pub mod scheduler;
pub mod transfer;

pub use client::Client;
pub use connection::{Connection, ConnectionContext, ConnectionStatus, EntryKind, RemoteEntry};
pub use error::{Error, OperationAborted, Result};
pub use events::{ClientEvent, EventBus};
pub use group::Group;
pub use protocol::{ConnectConfig, Endpoint, PoolOptions, ProtocolRegistry};
pub use scheduler::{Scheduler, TaskHandle, TaskId};
pub use transfer::{TransferDescriptor, TransferEvent, TransferOutcome, TransferProgress, TransferReport};
