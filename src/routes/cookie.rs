//! Refresh token cookie handling.

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponse, ResponseError};

use crate::configuration::{CookieSettings, Environment};
use crate::error::AppError;

/// Attributes of the `HttpOnly` cookie that carries the refresh token
#[derive(Debug, Clone)]
pub struct RefreshCookie {
    name: String,
    domain: Option<String>,
    path: String,
    secure: bool,
    same_site: SameSite,
}

impl RefreshCookie {
    pub fn new(settings: &CookieSettings, environment: Environment) -> Self {
        // Production front-ends live on another origin, which needs SameSite=None;
        // browsers only accept that together with Secure.
        let (secure, same_site) = match environment {
            Environment::Production => (true, SameSite::None),
            Environment::Local => (false, SameSite::Lax),
        };

        Self {
            name: settings.name.clone(),
            domain: settings.domain.clone(),
            path: settings.path.clone(),
            secure,
            same_site,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie carrying `token`, living exactly as long as the refresh TTL.
    pub fn build(&self, token: &str, max_age_secs: i64) -> Cookie<'static> {
        let mut builder = Cookie::build(self.name.clone(), token.to_string())
            .path(self.path.clone())
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .max_age(Duration::seconds(max_age_secs));
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.finish()
    }

    /// Cookie that makes the browser drop the refresh token.
    pub fn removal(&self) -> Cookie<'static> {
        let mut cookie = self.build("", 0);
        cookie.make_removal();
        cookie
    }

    pub fn extract(&self, req: &HttpRequest) -> Option<String> {
        req.cookie(&self.name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Error response that also clears the refresh cookie.
    pub fn reject(&self, err: &AppError) -> HttpResponse {
        let mut response = ResponseError::error_response(err);
        if let Err(e) = response.add_cookie(&self.removal()) {
            tracing::error!(error = %e, "Failed to attach cookie removal");
        }
        response
    }
}
