// src/auth.rs

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::{
    body::MessageBody,
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http, Error, FromRequest, HttpMessage, HttpRequest,
};
use chrono::{DateTime, Utc};
use futures_util::future::{ok, ready, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub fn create_jwt(
    user_id: &str,
    secret: &str,
    ttl: std::time::Duration,
    now: DateTime<Utc>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now.timestamp() as u64).saturating_add(ttl.as_secs()) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// The caller identified by a valid bearer token. Handlers that take this
/// extractor answer 401 when the request carried no token or a bad one.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
}

/// Marks a request whose bearer token failed validation.
#[derive(Debug, Clone, Copy)]
struct RejectedToken;

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let extensions = req.extensions();
        let result = match extensions.get::<AuthUser>() {
            Some(user) => Ok(user.clone()),
            None if extensions.get::<RejectedToken>().is_some() => Err(AppError::Unauthorized(
                "Not authorized, token failed".to_string(),
            )),
            None => Err(AppError::Unauthorized("Not authorized, no token".to_string())),
        };
        ready(result)
    }
}

/// Resolves `Authorization: Bearer <token>` into an [`AuthUser`] request
/// extension. Requests always reach the router; only handlers taking
/// [`AuthUser`] turn a missing or bad token into a 401, so public routes keep
/// working for clients that send a stale token.
#[derive(Debug, Clone)]
pub struct Authentication {
    secret: Rc<str>,
}

impl Authentication {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Rc::from(secret),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: Rc<str>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        if let Some(token) = bearer {
            match validate_jwt(&token, &self.secret) {
                Ok(claims) => {
                    req.extensions_mut().insert(AuthUser { user_id: claims.sub });
                }
                Err(e) => {
                    debug!("Rejected bearer token: {}", e);
                    req.extensions_mut().insert(RejectedToken);
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test as web_test, web, App, HttpResponse};
    use std::time::Duration;

    const SECRET: &str = "test-secret";

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(user.user_id)
    }

    async fn public() -> HttpResponse {
        HttpResponse::Ok().body("open")
    }

    #[test]
    fn issued_tokens_validate_with_the_same_secret_only() {
        let token = create_jwt("user-1", SECRET, Duration::from_secs(3600), Utc::now()).unwrap();
        assert_eq!(validate_jwt(&token, SECRET).unwrap().sub, "user-1");
        assert!(validate_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issued = Utc::now() - chrono::Duration::days(2);
        let token = create_jwt("user-1", SECRET, Duration::from_secs(3600), issued).unwrap();
        assert!(validate_jwt(&token, SECRET).is_err());
    }

    #[actix_web::test]
    async fn middleware_resolves_the_caller() {
        let app = web_test::init_service(
            App::new()
                .wrap(Authentication::new(SECRET))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let token = create_jwt("user-1", SECRET, Duration::from_secs(3600), Utc::now()).unwrap();
        let req = web_test::TestRequest::get()
            .uri("/me")
            .insert_header((http::header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        let body = web_test::call_and_read_body(&app, req).await;
        assert_eq!(body, "user-1");

        let req = web_test::TestRequest::get().uri("/me").to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), http::StatusCode::UNAUTHORIZED);

        let req = web_test::TestRequest::get()
            .uri("/me")
            .insert_header((http::header::AUTHORIZATION, "Bearer garbage"))
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), http::StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = web_test::read_body_json(resp).await;
        assert_eq!(body["message"], "Not authorized, token failed");
    }

    #[actix_web::test]
    async fn bad_tokens_do_not_block_public_routes() {
        let app = web_test::init_service(
            App::new()
                .wrap(Authentication::new(SECRET))
                .route("/open", web::get().to(public)),
        )
        .await;

        let req = web_test::TestRequest::get()
            .uri("/open")
            .insert_header((http::header::AUTHORIZATION, "Bearer stale.expired.token"))
            .to_request();
        let body = web_test::call_and_read_body(&app, req).await;
        assert_eq!(body, "open");
    }
}
