use crate::error::*;
use reqwest::{Client, Method, RequestBuilder};
use rollcall_core::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// rollcall HTTP API 客户端，自动拆开统一响应结构
#[derive(Clone)]
pub struct RollcallClient {
    client: Client,
    pub base_url: String,
    pub timeout: Duration,
    pub token: Option<String>,
}

#[derive(Serialize)]
struct EmailQueryRef<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct NameQueryRef<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct SearchQueryRef<'a> {
    query: &'a str,
    #[serde(flatten)]
    page: PageQuery,
}

impl RollcallClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 拼接路径段并逐段做百分号编码
    pub fn endpoint(&self, segments: &[&str]) -> SdkResult<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| SdkError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> SdkResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        let mut request = self.client.request(method, url).timeout(self.timeout);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }

    async fn send<T>(&self, request: RequestBuilder) -> SdkResult<ApiResponse<T>>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(SdkError::ApiError {
                    status: status.as_u16(),
                    message: body,
                });
            }
            Err(err) => return Err(err.into()),
        };

        if !status.is_success() || !envelope.success {
            return Err(SdkError::ApiError {
                status: status.as_u16(),
                message: envelope
                    .error
                    .unwrap_or_else(|| status.to_string()),
            });
        }
        Ok(envelope)
    }

    async fn data<T>(&self, request: RequestBuilder) -> SdkResult<T>
    where
        T: DeserializeOwned,
    {
        self.send(request).await?.data.ok_or(SdkError::MissingData)
    }

    /// 只返回成功与否的接口
    async fn done(&self, request: RequestBuilder) -> SdkResult<String> {
        let envelope = self.send::<serde_json::Value>(request).await?;
        Ok(envelope.message.unwrap_or_default())
    }

    pub async fn index(&self) -> SdkResult<serde_json::Value> {
        self.data(self.request(Method::GET, &[])?).await
    }

    // 用户

    pub async fn register(&self, request: &UserCreateRequest) -> SdkResult<UserResponse> {
        self.data(self.request(Method::POST, &["users"])?.json(request))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> SdkResult<LoginResponse> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.data(self.request(Method::POST, &["users", "login"])?.json(&body))
            .await
    }

    /// 登录并保存 token 供后续请求使用
    pub async fn login_and_store(&mut self, email: &str, password: &str) -> SdkResult<LoginResponse> {
        let response = self.login(email, password).await?;
        self.set_token(&response.token);
        Ok(response)
    }

    pub async fn logout(&self) -> SdkResult<()> {
        self.done(self.request(Method::POST, &["users", "logout"])?)
            .await
            .map(|_| ())
    }

    /// 邮箱未被占用时返回 true
    pub async fn check_email(&self, email: &str) -> SdkResult<bool> {
        let request = self
            .request(Method::GET, &["users", "check-email"])?
            .query(&EmailQueryRef { email });
        self.data(request).await
    }

    pub async fn list_users(&self, role: Option<UserRole>) -> SdkResult<Vec<UserResponse>> {
        let request = self
            .request(Method::GET, &["users"])?
            .query(&UserListQuery { role });
        self.data(request).await
    }

    pub async fn search_users(&self, name: &str) -> SdkResult<Vec<UserResponse>> {
        let request = self
            .request(Method::GET, &["users", "search"])?
            .query(&NameQueryRef { name });
        self.data(request).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> SdkResult<UserResponse> {
        self.data(self.request(Method::GET, &["users", "email", email])?)
            .await
    }

    pub async fn get_user(&self, id: Uuid) -> SdkResult<UserResponse> {
        let id = id.to_string();
        self.data(self.request(Method::GET, &["users", &id])?).await
    }

    pub async fn update_user(&self, id: Uuid, patch: &UserUpdateRequest) -> SdkResult<UserResponse> {
        let id = id.to_string();
        self.data(self.request(Method::PUT, &["users", &id])?.json(patch))
            .await
    }

    pub async fn delete_user(&self, id: Uuid) -> SdkResult<()> {
        let id = id.to_string();
        self.done(self.request(Method::DELETE, &["users", &id])?)
            .await
            .map(|_| ())
    }

    pub async fn validate_password(&self, id: Uuid, password: &str) -> SdkResult<bool> {
        let id = id.to_string();
        let body = PasswordCheckRequest {
            password: password.to_string(),
        };
        self.data(
            self.request(Method::POST, &["users", &id, "validate-password"])?
                .json(&body),
        )
        .await
    }

    // 活动

    pub async fn list_events(&self, page: PageQuery) -> SdkResult<Page<EventResponse>> {
        self.data(self.request(Method::GET, &["v1", "events"])?.query(&page))
            .await
    }

    pub async fn search_events(&self, query: &str, page: PageQuery) -> SdkResult<Page<EventResponse>> {
        let request = self
            .request(Method::GET, &["v1", "events", "search"])?
            .query(&SearchQueryRef { query, page });
        self.data(request).await
    }

    pub async fn my_events(&self, page: PageQuery) -> SdkResult<Page<EventResponse>> {
        let request = self
            .request(Method::GET, &["v1", "events", "my-events"])?
            .query(&page);
        self.data(request).await
    }

    pub async fn get_event(&self, id: Uuid) -> SdkResult<EventResponse> {
        let id = id.to_string();
        self.data(self.request(Method::GET, &["v1", "events", &id])?)
            .await
    }

    pub async fn event_stats(&self, id: Uuid) -> SdkResult<EventStats> {
        let id = id.to_string();
        self.data(self.request(Method::GET, &["v1", "events", &id, "stats"])?)
            .await
    }

    pub async fn create_event(&self, request: &EventCreateRequest) -> SdkResult<EventResponse> {
        self.data(self.request(Method::POST, &["v1", "events"])?.json(request))
            .await
    }

    pub async fn update_event(&self, id: Uuid, patch: &EventUpdateRequest) -> SdkResult<EventResponse> {
        let id = id.to_string();
        self.data(self.request(Method::PUT, &["v1", "events", &id])?.json(patch))
            .await
    }

    /// 返回服务端的处理说明：已删除或已停用
    pub async fn delete_event(&self, id: Uuid) -> SdkResult<String> {
        let id = id.to_string();
        self.done(self.request(Method::DELETE, &["v1", "events", &id])?)
            .await
    }

    /// 最多转正一条候补记录，没有变化时返回 `None`
    pub async fn process_waiting_list(&self, event_id: Uuid) -> SdkResult<Option<EnrollmentResponse>> {
        let id = event_id.to_string();
        let request = self.request(
            Method::POST,
            &["v1", "events", &id, "waiting-list", "process"],
        )?;
        Ok(self.send(request).await?.data)
    }

    // 报名

    pub async fn enroll(&self, event_id: Uuid) -> SdkResult<EnrollmentResponse> {
        let body = EnrollmentCreateRequest { event_id };
        self.data(self.request(Method::POST, &["v1", "enrollments"])?.json(&body))
            .await
    }

    pub async fn join_waiting_list(&self, event_id: Uuid) -> SdkResult<EnrollmentResponse> {
        let body = EnrollmentCreateRequest { event_id };
        self.data(
            self.request(Method::POST, &["v1", "enrollments", "waiting-list"])?
                .json(&body),
        )
        .await
    }

    pub async fn my_enrollments(&self, page: PageQuery) -> SdkResult<Page<EnrollmentResponse>> {
        let request = self
            .request(Method::GET, &["v1", "enrollments", "my-enrollments"])?
            .query(&page);
        self.data(request).await
    }

    pub async fn event_enrollments(
        &self,
        event_id: Uuid,
        page: PageQuery,
    ) -> SdkResult<Page<EnrollmentResponse>> {
        let id = event_id.to_string();
        let request = self
            .request(Method::GET, &["v1", "enrollments", "event", &id])?
            .query(&page);
        self.data(request).await
    }

    pub async fn enrollment_stats(&self, event_id: Uuid) -> SdkResult<EnrollmentStats> {
        let id = event_id.to_string();
        self.data(self.request(Method::GET, &["v1", "enrollments", "event", &id, "stats"])?)
            .await
    }

    pub async fn confirm_enrollment(&self, id: Uuid) -> SdkResult<EnrollmentResponse> {
        let id = id.to_string();
        self.data(self.request(Method::PUT, &["v1", "enrollments", &id, "confirm"])?)
            .await
    }

    pub async fn reject_enrollment(&self, id: Uuid) -> SdkResult<EnrollmentResponse> {
        let id = id.to_string();
        self.data(self.request(Method::PUT, &["v1", "enrollments", &id, "reject"])?)
            .await
    }

    pub async fn cancel_enrollment(&self, id: Uuid) -> SdkResult<EnrollmentResponse> {
        let id = id.to_string();
        self.data(self.request(Method::DELETE, &["v1", "enrollments", &id])?)
            .await
    }
}
