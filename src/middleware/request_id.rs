//! Request-id assignment.
//!
//! Every request gets an id: the inbound `x-request-id` header if the
//! client (or an upstream proxy) sent one, otherwise a generated
//! `<prefix>-<counter>` id. The prefix is ten random alphanumeric
//! characters drawn once per process, so ids from different instances never
//! collide while staying cheap to mint.
//!
//! The id is echoed back on the response and stored on the context for
//! downstream handlers, accessible through [`request_id`].

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use rand::Rng;

use crate::context::Context;
use crate::handler::Handler;

/// Header carrying the request id, inbound and outbound.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const REQUEST_ID_KEY: &str = "torii.request-id";

static PREFIX: Lazy<String> = Lazy::new(|| {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
});

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Request-id middleware.
pub fn unique_request_id() -> impl Handler {
    |ctx: Context| async move {
        let id = match ctx.request().header(REQUEST_ID_HEADER) {
            Some(inbound) if !inbound.is_empty() => inbound.to_string(),
            _ => {
                let n = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
                format!("{}-{n}", &*PREFIX)
            }
        };
        ctx.set_header(REQUEST_ID_HEADER, &id);
        ctx.set(REQUEST_ID_KEY, id);
        ctx.next().await;
    }
}

/// The id assigned to this request, if [`unique_request_id`] ran.
pub fn request_id(ctx: &Context) -> Option<String> {
    ctx.get_as::<String>(REQUEST_ID_KEY).map(|s| (*s).clone())
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::chain::Chain;
    use crate::context::Params;
    use crate::request::Request;

    fn pipeline() -> crate::chain::Pipeline {
        Chain::new()
            .append(unique_request_id())
            .then(|_ctx: Context| async {})
    }

    #[tokio::test]
    async fn inbound_ids_pass_through() {
        let request = Request::new(Method::GET, "/").with_header(REQUEST_ID_HEADER, "test-12345");
        let ctx = pipeline().run(request, Params::new()).await;

        assert_eq!(request_id(&ctx).as_deref(), Some("test-12345"));
        ctx.with_response(|r| {
            assert_eq!(r.headers()[REQUEST_ID_HEADER], "test-12345");
        });
    }

    #[tokio::test]
    async fn generated_ids_are_prefixed_and_unique() {
        let first = pipeline()
            .run(Request::new(Method::GET, "/"), Params::new())
            .await;
        let second = pipeline()
            .run(Request::new(Method::GET, "/"), Params::new())
            .await;

        let first = request_id(&first).unwrap();
        let second = request_id(&second).unwrap();
        assert_ne!(first, second);

        let (prefix, counter) = first.rsplit_once('-').unwrap();
        assert_eq!(prefix.len(), 10);
        assert!(prefix.chars().all(|c| c.is_ascii_alphanumeric()));
        counter.parse::<u64>().unwrap();
        assert!(second.starts_with(prefix));
    }

    #[tokio::test]
    async fn empty_inbound_ids_are_replaced() {
        let request = Request::new(Method::GET, "/").with_header(REQUEST_ID_HEADER, "");
        let ctx = pipeline().run(request, Params::new()).await;
        let id = request_id(&ctx).unwrap();
        assert!(!id.is_empty());
        assert!(id.contains('-'));
    }
}
