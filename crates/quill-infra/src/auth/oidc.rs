//! OAuth2 authorization-code client for the external identity provider.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, Validation, decode};
use reqwest::{Client, Url};
use serde::Deserialize;

use quill_core::ports::{AuthError, ExternalIdentity, IdentityProvider};

const SCOPE: &str = "openid profile email User.Read";
const GRAPH_ME_URL: &str = "https://graph.microsoft.com/v1.0/me";

#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// e.g. `https://login.microsoftonline.com/<tenant>`
    pub authority: String,
    pub client_id: String,
    pub client_secret: String,
    /// Must match the redirect URI registered with the provider.
    pub redirect_url: String,
    pub userinfo_url: String,
}

impl OidcConfig {
    pub fn new(
        authority: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            authority: authority.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: redirect_url.into(),
            userinfo_url: GRAPH_ME_URL.to_string(),
        }
    }

    fn token_url(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    mail: Option<String>,
    user_principal_name: Option<String>,
    display_name: Option<String>,
    given_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    preferred_username: Option<String>,
    email: Option<String>,
    upn: Option<String>,
    name: Option<String>,
    given_name: Option<String>,
    picture: Option<String>,
}

pub struct OidcIdentityProvider {
    client: Client,
    config: OidcConfig,
}

impl OidcIdentityProvider {
    pub fn new(config: OidcConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    async fn fetch_token(&self, code: &str) -> Result<TokenResponse, AuthError> {
        let response = self
            .client
            .post(self.config.token_url())
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("scope", SCOPE),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "Token exchange failed");
            return Err(AuthError::Provider(format!(
                "token exchange failed with status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))
    }

    async fn fetch_graph_user(&self, access_token: &str) -> Option<ExternalIdentity> {
        let response = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "User info lookup failed");
            return None;
        }

        let user: GraphUser = response.json().await.ok()?;
        let email = user.mail.or(user.user_principal_name)?;
        Some(ExternalIdentity {
            email,
            name: user
                .display_name
                .or(user.given_name)
                .unwrap_or_else(|| "User".to_string()),
            avatar: None,
        })
    }
}

/// Read identity claims from an ID token that came straight from the token
/// endpoint over TLS. The signature is not checked.
fn identity_from_id_token(id_token: &str) -> Option<ExternalIdentity> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let claims = decode::<IdTokenClaims>(id_token, &DecodingKey::from_secret(&[]), &validation)
        .ok()?
        .claims;
    let email = claims.preferred_username.or(claims.email).or(claims.upn)?;
    Some(ExternalIdentity {
        email,
        name: claims
            .name
            .or(claims.given_name)
            .unwrap_or_else(|| "User".to_string()),
        avatar: claims.picture,
    })
}

#[async_trait]
impl IdentityProvider for OidcIdentityProvider {
    fn authorize_url(&self) -> String {
        let base = format!("{}/oauth2/v2.0/authorize", self.config.authority);
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("scope", SCOPE),
            ("response_mode", "query"),
        ];
        match Url::parse_with_params(&base, &params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::error!(error = %e, authority = %self.config.authority, "Invalid OIDC authority");
                base
            }
        }
    }

    async fn exchange(&self, code: &str) -> Result<ExternalIdentity, AuthError> {
        let token = self.fetch_token(code).await?;

        if let Some(identity) = self.fetch_graph_user(&token.access_token).await {
            return Ok(identity);
        }

        token
            .id_token
            .as_deref()
            .and_then(identity_from_id_token)
            .ok_or_else(|| AuthError::Provider("no usable identity in token response".to_string()))
    }
}
