// ABOUTME: Test support utilities.
// ABOUTME: Provides tracing init and a fake transport for tunnel tests.

use async_trait::async_trait;
use graphlink::tunnel::{self, TunnelStream, TunnelTransport};
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("graphlink=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Transport that dials the target over plain TCP instead of an SSH
/// channel, standing in for a connected SSH session.
#[derive(Default)]
pub struct FakeTransport {
    close_calls: AtomicUsize,
}

impl FakeTransport {
    #[allow(dead_code)]
    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TunnelTransport for FakeTransport {
    async fn open_channel(
        &self,
        host: &str,
        port: u16,
    ) -> tunnel::Result<Box<dyn TunnelStream>> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| tunnel::Error::ConnectionFailed(e.to_string()))?;
        Ok(Box::new(stream))
    }

    async fn close(&self) -> tunnel::Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Start a TCP echo server standing in for the database endpoint.
/// Returns the port it listens on.
#[allow(dead_code)]
pub async fn spawn_echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("echo server should bind");
    let port = listener.local_addr().expect("local addr").port();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    port
}
