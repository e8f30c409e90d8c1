pub mod config;
pub mod db;
pub mod node;
pub mod peers;
pub mod quota;
pub mod secrets;
pub mod tasks;

pub use config::NodeConfig;
pub use node::{Node, NodeError};
pub use quota::DiskQuota;
