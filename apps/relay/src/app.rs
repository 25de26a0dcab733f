use std::time::Duration;

use dropline_relay_server::{Relay, RelayServer};

use crate::config::Config;

/// Runs the relay until Ctrl-C or a fatal server error.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let server = RelayServer::new(config.server_config(), Relay::new());
    let runner = server.clone();
    let mut serving = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        res = &mut serving => {
            res??;
            return Ok(());
        }
        addr = wait_for_bind(&server) => {
            tracing::info!(%addr, "signaling relay listening");
        }
    }

    tokio::select! {
        res = &mut serving => res??,
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!(
                connections = server.connection_count(),
                rooms = server.handler().room_count().await,
                "shutdown requested"
            );
            server.shutdown();
            serving.await??;
        }
    }
    Ok(())
}

async fn wait_for_bind(server: &RelayServer) -> std::net::SocketAddr {
    loop {
        if let Some(addr) = server.local_addr().await {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
