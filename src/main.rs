#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]

mod config;
mod dispatch;
mod error;
mod media;
mod net;
mod protocol;
mod session;
mod state;
mod util;

use std::sync::Arc;

use config::Config;
use tracing::{error, info};
use util::logging::init_logging;

use crate::dispatch::Dispatcher;
use crate::media::playout::FilePlayoutFactory;
use crate::net::outbound::ChannelOutbound;
use crate::state::registry::new_registry;

#[tokio::main]
async fn main() {
    init_logging();
    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(error = %e, "Bad configuration");
            std::process::exit(2);
        }
    };
    info!(
        config.port,
        frame_size = config.default_frame_size.get(),
        config.bytes_per_second,
        "Call relay starting up"
    );

    let (outbound, outbox) = ChannelOutbound::new();
    let outbound = Arc::new(outbound);
    let factory = Arc::new(FilePlayoutFactory::new(Arc::clone(&config), outbound.clone()));
    let dispatcher = Dispatcher::new(new_registry(), factory, outbound);

    if let Err(e) = net::listener::start_listening(config, dispatcher, outbox).await {
        error!(error = %e, "Listener stopped");
        std::process::exit(1);
    }
}
