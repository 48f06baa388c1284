use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::TokenCodec;
use crate::configuration::JwtSettings;
use crate::credentials::PgCredentialStore;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::rotation::RotationEngine;
use crate::routes::{
    get_current_user, health_check, login, logout, logout_all, refresh, register, RefreshCookie,
};
use crate::session::PgSessionStore;

/// Wire the rotation engine to PostgreSQL-backed stores sharing one pool.
pub fn build_engine(jwt_config: &JwtSettings, pool: PgPool) -> RotationEngine {
    RotationEngine::new(
        TokenCodec::new(jwt_config),
        Arc::new(PgSessionStore::new(pool.clone())),
        Arc::new(PgCredentialStore::new(pool)),
    )
}

pub fn run(
    listener: TcpListener,
    engine: RotationEngine,
    refresh_cookie: RefreshCookie,
) -> Result<Server, std::io::Error> {
    let codec = Arc::new(engine.codec().clone());
    let engine = web::Data::new(engine);
    let refresh_cookie = web::Data::new(refresh_cookie);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            // Shared state
            .app_data(engine.clone())
            .app_data(refresh_cookie.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    // Public routes
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    // Protected routes (require a bearer access token)
                    .service(
                        web::resource("/logout-all")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::post().to(logout_all)),
                    )
                    .service(
                        web::resource("/me")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::get().to(get_current_user)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
