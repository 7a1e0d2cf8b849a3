use super::{DeviceSource, EventSource, SourceError, TaskSource, TaskWriter};
use crate::models::{Device, Event, NewTask, Task};
use crate::services::session::SessionStore;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

fn transport(e: reqwest::Error) -> SourceError {
    SourceError::Transport(e.to_string())
}

fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SourceError::NotAuthenticated);
    }
    if !status.is_success() {
        return Err(SourceError::Transport(format!(
            "{} returned {}",
            response.url().path(),
            status
        )));
    }
    Ok(response)
}

/// Client for the scheduling server's REST API.
///
/// The bearer token comes from the session file. When credentials are
/// configured, a missing, expired or rejected token triggers one login.
pub struct RestClient {
    base_url: String,
    http: reqwest::Client,
    session: SessionStore,
    credentials: Option<Credentials>,
    login_lock: Mutex<()>,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            session,
            credentials: None,
            login_lock: Mutex::new(()),
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange username and password for a bearer token.
    pub async fn login(&self, credentials: &Credentials) -> Result<String, SourceError> {
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(credentials)
            .send()
            .await
            .map_err(transport)?;

        let login: LoginResponse = check_status(response)?.json().await.map_err(transport)?;
        log::info!("Logged in as {}", credentials.username);
        Ok(login.token)
    }

    async fn login_and_save(&self) -> Result<String, SourceError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(SourceError::NotAuthenticated)?;

        let token = self.login(credentials).await?;
        if let Err(e) = self.session.save(&token) {
            log::warn!("Could not persist session token: {}", e);
        }
        Ok(token)
    }

    /// A usable token, logging in if the stored one is missing or expired.
    async fn token(&self) -> Result<String, SourceError> {
        if let Some(token) = self.session.valid_token(Utc::now()) {
            return Ok(token);
        }

        // Concurrent fetches share one login
        let _guard = self.login_lock.lock().await;
        if let Some(token) = self.session.valid_token(Utc::now()) {
            return Ok(token);
        }
        self.login_and_save().await
    }

    /// Log in again after the server rejected `rejected`.
    ///
    /// Callers queue on the login lock. If an earlier caller already replaced
    /// the rejected token, its token is reused instead of logging in again.
    async fn relogin(&self, rejected: &str) -> Result<String, SourceError> {
        let _guard = self.login_lock.lock().await;

        if let Some(current) = self.session.valid_token(Utc::now()) {
            if current != rejected {
                return Ok(current);
            }
            if let Err(e) = self.session.clear() {
                log::warn!("Could not clear session file: {}", e);
            }
        }
        self.login_and_save().await
    }

    async fn send<T, B>(
        &self,
        method: &Method,
        path: &str,
        token: &str,
        body: Option<&B>,
    ) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport)?;
        check_status(response)?.json().await.map_err(transport)
    }

    async fn authorized<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let token = self.token().await?;

        match self.send(&method, path, &token, body).await {
            Err(SourceError::NotAuthenticated) if self.credentials.is_some() => {
                log::warn!("Token rejected on {}, logging in again", path);
                let token = self.relogin(&token).await?;
                self.send(&method, path, &token, body).await
            }
            result => result,
        }
    }
}

#[async_trait]
impl DeviceSource for RestClient {
    async fn get_all_devices(&self) -> Result<Vec<Device>, SourceError> {
        self.authorized(Method::GET, "/api/devices", None::<&()>).await
    }
}

#[async_trait]
impl TaskSource for RestClient {
    async fn get_all_tasks(&self) -> Result<Vec<Task>, SourceError> {
        self.authorized(Method::GET, "/api/tasks", None::<&()>).await
    }
}

#[async_trait]
impl TaskWriter for RestClient {
    async fn create_task(&self, task: &NewTask) -> Result<Task, SourceError> {
        self.authorized(Method::POST, "/api/tasks", Some(task)).await
    }
}

#[async_trait]
impl EventSource for RestClient {
    async fn get_all_events(&self) -> Result<Vec<Event>, SourceError> {
        self.authorized(Method::GET, "/api/events", None::<&()>).await
    }
}
