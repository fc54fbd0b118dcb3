//! A small but complete torii application.
//!
//! Run it with `cargo run --example basic`, then:
//!
//! ```sh
//! curl -i localhost:3000/healthz
//! curl -i localhost:3000/api/users/42
//! curl -i -X POST localhost:3000/api/users -d '{"name":"ada"}'
//! curl -i localhost:3000/panic
//! curl -i localhost:3000/slow
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use torii::{App, Context, StatusCode, health, middleware};

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[derive(Serialize)]
struct User {
    id: u32,
    name: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,torii=debug".into()),
        )
        .init();

    // The logger sits outside recovery so panicking requests are still
    // logged with the 500 recovery produces.
    let mut app = App::new();
    app.use_middleware(middleware::log_requests());
    app.use_middleware(middleware::recovery());
    app.use_middleware(middleware::unique_request_id());
    app.use_middleware(middleware::timeout(
        Duration::from_secs(30),
        "Server request timeout",
    ));

    app.get("/healthz", health::liveness);
    app.get("/readyz", health::readiness);

    let api = app.group("/api");
    api.get("/users/{id}", get_user);
    api.post("/users", create_user);

    // Demonstrates the recovery middleware.
    app.get("/panic", |_ctx: Context| async {
        panic!("something went sideways");
    });

    // Demonstrates the timeout middleware (lower the limit above to see it).
    app.get("/slow", |ctx: Context| async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        ctx.string(StatusCode::OK, "finally");
    });

    app.listen("0.0.0.0:3000").await.unwrap();
}

async fn get_user(ctx: Context) {
    let id: u32 = match ctx.param("id").and_then(|id| id.parse().ok()) {
        Some(id) => id,
        None => {
            ctx.string(StatusCode::BAD_REQUEST, "invalid user id");
            return;
        }
    };
    ctx.json(
        StatusCode::OK,
        &User {
            id,
            name: format!("user-{id}"),
        },
    );
}

async fn create_user(ctx: Context) {
    let Ok(new_user) = serde_json::from_slice::<NewUser>(ctx.request().body()) else {
        ctx.string(StatusCode::UNPROCESSABLE_ENTITY, "invalid payload");
        return;
    };
    ctx.json(
        StatusCode::CREATED,
        &User {
            id: 99,
            name: new_user.name,
        },
    );
}
