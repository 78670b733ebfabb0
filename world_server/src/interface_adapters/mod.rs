// Interface adapters: wire protocol, network handling and outbound clients.

pub mod broadcast;
pub mod clients;
pub mod event_log;
pub mod http;
pub mod net;
pub mod protocol;
pub mod state;
pub mod utils;
