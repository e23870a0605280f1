//! Fetches the same URL twice through an in-memory cache.
//!
//! Starts a tiny origin on a loopback port that counts its requests and marks
//! every response `Cache-Control: max-age=60`. The second fetch is answered
//! from the cache without touching the origin.
//!
//! Run with `RUST_LOG=httpcache=debug cargo run --example cached_client`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use httpcache::cache::{CacheConfig, X_HTTPCACHE};
use httpcache::{CacheTransport, Request, Response, StatusCode, TcpTransport, Transport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let served = Arc::new(AtomicUsize::new(0));
    tokio::spawn(serve(listener, Arc::clone(&served)));

    let client = CacheTransport::in_memory(Arc::new(TcpTransport::new()), CacheConfig::default());
    let url = format!("http://{addr}/greeting");

    for attempt in 1..=2 {
        let response = client.round_trip(Request::get(url.as_str())).await?;
        println!(
            "attempt {attempt}: {} {:?} cached={}",
            response.status(),
            String::from_utf8_lossy(response.body_bytes()),
            response.headers().get(X_HTTPCACHE).unwrap_or("false"),
        );
    }

    println!("origin served {} request(s)", served.load(Ordering::SeqCst));
    println!("{:?}", client.stats());
    Ok(())
}

async fn serve(listener: TcpListener, served: Arc<AtomicUsize>) {
    loop {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let served = Arc::clone(&served);
        tokio::spawn(async move {
            let mut buf = Vec::with_capacity(1024);
            let mut chunk = [0u8; 1024];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
                if Request::parse(&buf).is_ok() {
                    break;
                }
            }

            let count = served.fetch_add(1, Ordering::SeqCst) + 1;
            let body = format!("hello #{count}");
            let response = Response::new(StatusCode::OK)
                .header("Cache-Control", "max-age=60")
                .header("Content-Length", body.len().to_string())
                .header("Connection", "close")
                .body(body);
            let _ = stream.write_all(&response.to_bytes()).await;
        });
    }
}
