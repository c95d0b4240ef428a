pub mod app;
pub mod config;
pub mod routes;

#[cfg(test)]
mod test_util;

use std::net::SocketAddr;

pub async fn serve(router: axum::Router, listen_addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router).await?;

    Ok(())
}
