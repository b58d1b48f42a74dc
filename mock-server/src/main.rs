use tokio::net::TcpListener;

/// Serves the test endpoints on `MOCK_ADDR` (default `127.0.0.1:3000`).
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let addr = std::env::var("MOCK_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = TcpListener::bind(&addr).await?;
    println!("mock server on http://{}", listener.local_addr()?);
    println!("routes: /echo /items /status/{{code}} /text-error /upload /download/{{size}} /slow/{{millis}}");
    mock_server::run(listener).await
}
