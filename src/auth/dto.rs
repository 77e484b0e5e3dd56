use serde::{Deserialize, Serialize};

/// Value of `token` in auth responses; the real credential is the session cookie.
pub const SESSION_TOKEN_PLACEHOLDER: &str = "session_active";

/// Request body for user registration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub name: Option<String>,
}

/// Request body for login.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GoogleLoginRequest {
    #[serde(rename = "idToken")]
    pub id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GitHubCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Response returned after register or any login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub subscribed: bool,
    pub token: String,
}

impl AuthResponse {
    pub fn new(message: &str, subscribed: bool) -> Self {
        Self {
            message: message.to_string(),
            subscribed,
            token: SESSION_TOKEN_PLACEHOLDER.to_string(),
        }
    }
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: i32,
    pub name: Option<String>,
    pub email: String,
    pub subscribed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
