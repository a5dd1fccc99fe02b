//! Test server and REST helpers

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Result;
use chat_common::{
    AppConfig, AppSettings, CorsConfig, Environment, JwtConfig, JwtService, RealtimeConfig,
    ServerConfig, SnowflakeConfig, StoreBackend,
};
use chat_core::entities::{Chat, User};
use chat_core::traits::{ChatDirectory, UserRepository};
use chat_core::{ChatId, SnowflakeGenerator, UserId};
use chat_db::{MemoryChatDirectory, MemoryMessageStore, MemoryUserRepository};
use chat_gateway::{create_app, create_gateway_state, Stores};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::ws::WsClient;

const TEST_SECRET: &str = "integration-test-secret";

/// Typing deadline used by test servers, short enough to wait out
pub const TEST_TYPING_TIMEOUT: Duration = Duration::from_millis(300);

fn next_id() -> i64 {
    static GENERATOR: OnceLock<SnowflakeGenerator> = OnceLock::new();
    GENERATOR
        .get_or_init(|| SnowflakeGenerator::new(1000))
        .generate()
        .into_inner()
}

pub fn test_config() -> AppConfig {
    AppConfig {
        app: AppSettings {
            name: "chat-gateway-test".to_string(),
            env: Environment::Development,
        },
        gateway: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        store: StoreBackend::Memory,
        database: None,
        jwt: JwtConfig {
            secret: TEST_SECRET.to_string(),
            access_token_expiry: 900,
        },
        realtime: RealtimeConfig {
            typing_timeout_ms: TEST_TYPING_TIMEOUT.as_millis() as u64,
            ..RealtimeConfig::default()
        },
        cors: CorsConfig::default(),
        snowflake: SnowflakeConfig { worker_id: 1 },
    }
}

/// A user known to the server, with a valid access token
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: UserId,
    pub name: String,
    pub token: String,
}

/// Gateway running on an ephemeral port
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub messages: Arc<MemoryMessageStore>,
    pub chats: Arc<MemoryChatDirectory>,
    pub users: Arc<MemoryUserRepository>,
    jwt: JwtService,
    _handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        Self::start_with_config(test_config()).await
    }

    pub async fn start_with_config(config: AppConfig) -> Result<Self> {
        let messages = Arc::new(MemoryMessageStore::new());
        let chats = Arc::new(MemoryChatDirectory::new());
        let users = Arc::new(MemoryUserRepository::new());
        let stores = Stores {
            messages: messages.clone(),
            chats: chats.clone(),
            users: users.clone(),
        };

        let (state, _engine) = create_gateway_state(stores, &config)?;
        let app = create_app(state, &config);

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            addr,
            client,
            messages,
            chats,
            users,
            jwt: JwtService::new(&config.jwt.secret, config.jwt.access_token_expiry),
            _handle: handle,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn gateway_url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// Register a user directly in the store and mint a token for it.
    pub async fn create_user(&self, name: &str) -> Result<TestUser> {
        let id = UserId::new(next_id());
        self.users.create(&User::new(id, name.to_string())).await?;
        let token = self.jwt.issue_access_token(id)?;
        Ok(TestUser {
            id,
            name: name.to_string(),
            token,
        })
    }

    /// A token for a user the server has never heard of
    pub fn stranger_token(&self) -> Result<String> {
        Ok(self.jwt.issue_access_token(UserId::new(next_id()))?)
    }

    pub async fn create_direct_chat(&self, a: &TestUser, b: &TestUser) -> Result<ChatId> {
        let id = ChatId::new(next_id());
        self.chats.create(&Chat::direct(id, a.id, b.id)).await?;
        Ok(id)
    }

    pub async fn create_group_chat(&self, admin: &TestUser, members: &[&TestUser]) -> Result<ChatId> {
        let id = ChatId::new(next_id());
        let members = members.iter().map(|u| u.id).collect();
        self.chats
            .create(&Chat::group(id, "group".to_string(), admin.id, members))
            .await?;
        Ok(id)
    }

    /// Open a socket, identify and wait for `ready`.
    pub async fn connect(&self, user: &TestUser) -> Result<WsClient> {
        WsClient::connect(&self.gateway_url(), &user.token).await
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).bearer_auth(token).send().await?)
    }

    pub async fn post_auth<T: Serialize>(
        &self,
        path: &str,
        token: &str,
        body: &T,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?)
    }

    pub async fn delete_auth(&self, path: &str, token: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.delete(&url).bearer_auth(token).send().await?)
    }
}

/// Assert response status and parse JSON body
pub async fn assert_json<T: DeserializeOwned>(response: Response, expected_status: StatusCode) -> Result<T> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!("Expected status {expected_status}, got {status}. Body: {body}");
    }
    Ok(response.json().await?)
}

/// Assert response status without parsing body
pub async fn assert_status(response: Response, expected_status: StatusCode) -> Result<()> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!("Expected status {expected_status}, got {status}. Body: {body}");
    }
    Ok(())
}
