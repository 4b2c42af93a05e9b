use crate::JwtSecret;
use bytes::Bytes;
use http::{header::AUTHORIZATION, HeaderMap, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use serde_json::Value;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

/// A tower middleware that guards the `engine_` namespace with JWT bearer authentication.
///
/// The listener may multiplex other namespaces on the same port, so the request body is
/// inspected first: calls that do not touch an `engine_` method pass through untouched,
/// everything else needs a valid `Authorization: Bearer` token signed with the shared secret.
pub struct AuthLayer {
    secret: JwtSecret,
}

impl AuthLayer {
    /// Creates the layer around the shared secret.
    pub fn new(secret: JwtSecret) -> Self {
        Self { secret }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService { secret: self.secret.clone(), inner }
    }
}

/// Service produced by [`AuthLayer`].
#[derive(Clone)]
pub struct AuthService<S> {
    secret: JwtSecret,
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AuthService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Body<Data = Bytes> + Send + 'static,
    ResBody: Default,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let secret = self.secret.clone();
        // take the service that was polled ready, leave the clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let Ok(collected) = body.collect().await else {
                return Ok(status_response(StatusCode::BAD_REQUEST))
            };
            let bytes = collected.to_bytes();

            if requires_auth(&bytes) {
                let authorized = bearer_token(&parts.headers)
                    .is_some_and(|token| secret.validate(&token).is_ok());
                if !authorized {
                    warn!(target: "rpc::engine", "Rejecting engine request without a valid bearer token");
                    return Ok(status_response(StatusCode::UNAUTHORIZED))
                }
            }

            inner.call(Request::from_parts(parts, Full::new(bytes))).await
        })
    }
}

/// Returns `true` if the JSON-RPC body names an `engine_` method anywhere. An empty body
/// cannot, and is left for the server to answer; a non-empty body that does not parse is
/// treated as requiring auth.
fn requires_auth(body: &[u8]) -> bool {
    if body.is_empty() {
        return false
    }
    let Ok(value) = serde_json::from_slice::<Value>(body) else { return true };
    match value {
        Value::Array(calls) => calls.iter().any(is_engine_call),
        call => is_engine_call(&call),
    }
}

fn is_engine_call(call: &Value) -> bool {
    call.get("method")
        .and_then(Value::as_str)
        .is_some_and(|method| method.starts_with("engine_"))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
}

fn status_response<B: Default>(status: StatusCode) -> Response<B> {
    let mut response = Response::new(B::default());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use std::{
        convert::Infallible,
        future::{ready, Ready},
    };
    use tower::ServiceExt;

    /// Inner service that answers 200 with the request body echoed back.
    #[derive(Clone)]
    struct Echo;

    impl Service<Request<Full<Bytes>>> for Echo {
        type Response = Response<Full<Bytes>>;
        type Error = Infallible;
        type Future = Ready<Result<Self::Response, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: Request<Full<Bytes>>) -> Self::Future {
            ready(Ok(Response::new(request.into_body())))
        }
    }

    const ENGINE_CALL: &str =
        r#"{"jsonrpc":"2.0","method":"engine_forkchoiceUpdatedV1","params":[],"id":1}"#;
    const ETH_CALL: &str = r#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#;

    fn request(body: &str, token: Option<String>) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Full::new(Bytes::copy_from_slice(body.as_bytes()))).unwrap()
    }

    fn service(secret: JwtSecret) -> AuthService<Echo> {
        AuthLayer::new(secret).layer(Echo)
    }

    #[tokio::test]
    async fn engine_call_without_token_is_unauthorized() {
        let response =
            service(JwtSecret::random()).oneshot(request(ENGINE_CALL, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn engine_call_with_valid_token_reaches_the_server() {
        let secret = JwtSecret::random();
        let token = secret.encode(&Claims::issued_now()).unwrap();

        let response =
            service(secret).oneshot(request(ENGINE_CALL, Some(token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // the collected body is forwarded intact
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(ENGINE_CALL.as_bytes()));
    }

    #[tokio::test]
    async fn non_engine_call_bypasses_auth() {
        let response =
            service(JwtSecret::random()).oneshot(request(ETH_CALL, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn batch_containing_an_engine_call_requires_auth() {
        let batch = format!("[{ETH_CALL},{ENGINE_CALL}]");
        let response =
            service(JwtSecret::random()).oneshot(request(&batch, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stale_token_is_unauthorized() {
        let secret = JwtSecret::random();
        let stale = Claims { iat: 1, exp: None };
        let token = secret.encode(&stale).unwrap();

        let response =
            service(secret).oneshot(request(ENGINE_CALL, Some(token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_signed_with_another_secret_is_unauthorized() {
        let token = JwtSecret::random().encode(&Claims::issued_now()).unwrap();

        let response = service(JwtSecret::random())
            .oneshot(request(ENGINE_CALL, Some(token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
