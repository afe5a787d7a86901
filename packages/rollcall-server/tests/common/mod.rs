#![allow(dead_code)]

use chrono::{Duration, Utc};
use rollcall_sdk::RollcallClient;
use rollcall_sdk::types::{EventCreateRequest, EventResponse, UserCreateRequest, UserRole};
use rollcall_server::{AppState, AuthConfig, axum_app, db};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const PASSWORD: &str = "secret1";

/// 内存库，单连接
pub async fn spawn_server() -> String {
    spawn_server_at("sqlite::memory:").await
}

pub async fn spawn_server_at(database_url: &str) -> String {
    let db = db::connect(database_url).await.unwrap();
    let auth = AuthConfig::new(
        "integration-secret-0123456789abcdef".to_string(),
        "rollcall".to_string(),
        3600,
        4,
    )
    .unwrap();
    let app = axum_app(Arc::new(AppState::new(db, &auth)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// 临时 SQLite 文件，连接池使用默认的多连接；drop 时删除文件
pub struct TempDatabase {
    path: PathBuf,
}

impl TempDatabase {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("rollcall-{}.db", Uuid::new_v4()));
        Self { path }
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// 注册并登录，返回持有 token 的客户端
pub async fn signed_in(base_url: &str, name: &str, role: UserRole) -> RollcallClient {
    let mut client = RollcallClient::new(base_url);
    let email = format!("{}@example.com", name.to_lowercase());
    client
        .register(&UserCreateRequest {
            name: name.to_string(),
            email: email.clone(),
            password: PASSWORD.to_string(),
            role,
        })
        .await
        .unwrap();
    client.login_and_store(&email, PASSWORD).await.unwrap();
    client
}

pub fn event_request(title: &str, capacity: i32) -> EventCreateRequest {
    let start = Utc::now() + Duration::days(14);
    EventCreateRequest {
        title: title.to_string(),
        description: "An evening of talks and lightning demos".to_string(),
        start_date_time: start,
        end_date_time: start + Duration::hours(3),
        location: "Main hall, floor 2".to_string(),
        capacity,
    }
}

pub async fn create_event(organizer: &RollcallClient, title: &str, capacity: i32) -> EventResponse {
    organizer
        .create_event(&event_request(title, capacity))
        .await
        .unwrap()
}
