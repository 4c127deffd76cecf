//! TCP accept loop for the inline-script protocol
//!
//! One task per accepted connection, the same shape as the management
//! transport's accept loop: a panic or protocol error in one session
//! closes that socket and nothing else.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::domain::shared::Result;

use super::protocol::AgiSession;

#[async_trait]
pub trait AgiHandler: Send + Sync + 'static {
    async fn handle(&self, session: AgiSession);
}

pub struct AgiServer;

impl AgiServer {
    pub async fn serve(
        bind_addr: &str,
        handler: Arc<dyn AgiHandler>,
        mut stop: tokio::sync::watch::Receiver<bool>,
    ) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(crate::domain::shared::EngineError::Io)?;
        info!("agi server listening on {bind_addr}");

        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("agi server stopping");
                        return Ok(());
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let handler = handler.clone();
                            tokio::spawn(async move {
                                match AgiSession::accept(stream).await {
                                    Ok(session) => handler.handle(session).await,
                                    Err(e) => warn!("agi preamble error from {peer}: {e}"),
                                }
                            });
                        }
                        Err(e) => {
                            error!("failed to accept agi connection: {e}");
                        }
                    }
                }
            }
        }
    }
}
