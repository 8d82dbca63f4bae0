use glassmemo::config::Secret;
use glassmemo::{build_router, AppState, Config};
use tokio::net::TcpListener;

pub const TEST_SECRET: &str = "test-bot-secret";

pub async fn spawn_server() -> String {
    let config = Config {
        port: 0,
        qq_secret: Some(Secret::new(TEST_SECRET)),
        ..Config::default()
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let app = build_router(AppState::new(config));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{port}")
}
