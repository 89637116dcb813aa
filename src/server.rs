use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::protocol::{CommandFactory, ParseError, Parser, Value};
use crate::store::Store;

/// TCP server exposing a [`Store`] over RESP
pub struct Server {
  listener: TcpListener,
  local_addr: SocketAddr,
  cmd_factory: Arc<CommandFactory>,
  store: Arc<Store>,
}

impl Server {
  /// Create and bind TCP server to specified address
  pub async fn bind(addr: &str, store: Arc<Store>) -> std::io::Result<Self> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("TCP server bound to {}", local_addr);

    Ok(Self {
      listener,
      local_addr,
      cmd_factory: Arc::new(CommandFactory::init()),
      store,
    })
  }

  /// Get local listening address
  pub fn local_addr(&self) -> SocketAddr {
    self.local_addr
  }

  /// Handle a single client connection
  async fn handle_connection(
    self: Arc<Self>,
    mut stream: TcpStream,
    peer_addr: SocketAddr,
  ) -> std::io::Result<()> {
    let mut pending = BytesMut::with_capacity(8192);

    loop {
      // Drain every complete frame before reading more
      loop {
        match Parser::parse(&pending) {
          Ok((value, consumed)) => {
            pending.advance(consumed);
            debug!("Received command from {}: {:?}", peer_addr, value);

            let response = self.cmd_factory.execute(value, &self.store).await;
            stream.write_all(&response.encode()).await?;
          }
          Err(ParseError::Incomplete) => break,
          Err(ParseError::Invalid(reason)) => {
            warn!("Protocol error from {}: {}", peer_addr, reason);
            let reply = Value::error(format!("ERR protocol error: {}", reason));
            stream.write_all(&reply.encode()).await?;
            return Ok(());
          }
        }
      }

      if stream.read_buf(&mut pending).await? == 0 {
        if !pending.is_empty() {
          warn!("Connection from {} closed mid-frame", peer_addr);
        }
        debug!("Connection closed by client: {}", peer_addr);
        return Ok(());
      }
    }
  }

  /// Accept and serve connections until `shutdown` resolves
  pub async fn run(self: Arc<Self>, shutdown: impl Future<Output = ()>) {
    info!("Server started, listening on {}", self.local_addr);
    tokio::pin!(shutdown);

    loop {
      tokio::select! {
        _ = &mut shutdown => {
          info!("Shutdown requested, no longer accepting connections");
          return;
        }
        accepted = self.listener.accept() => match accepted {
          Ok((stream, peer_addr)) => {
            debug!("New connection accepted from {}", peer_addr);

            // Spawn an independent task for each connection
            let server = Arc::clone(&self);
            tokio::spawn(async move {
              if let Err(e) = server.handle_connection(stream, peer_addr).await {
                error!("Error handling connection from {}: {}", peer_addr, e);
              }
            });
          }
          Err(e) => {
            error!("Failed to accept connection: {}", e);
          }
        }
      }
    }
  }
}
