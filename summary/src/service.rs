use crate::SummaryError;
use crate::handler::{RequestHandler, SummaryResponse};
use crate::metrics_defs::REQUESTS;
use http_body_util::BodyExt;
use hyper::body::{Body, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use serde_json::json;
use shared::counter;
use shared::http::ResponseBody;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Serves the customer summary endpoint on every path of the main listener.
pub struct SummaryService {
    handler: Arc<RequestHandler>,
}

impl SummaryService {
    pub fn new(handler: RequestHandler) -> Self {
        SummaryService {
            handler: Arc::new(handler),
        }
    }
}

impl Service<Request<Incoming>> for SummaryService {
    type Response = Response<ResponseBody>;
    type Error = SummaryError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.handler.clone();

        Box::pin(async move { Ok(respond(&handler, req).await) })
    }
}

/// Produces exactly one response per request, including when the body cannot be read.
async fn respond<B>(handler: &RequestHandler, req: Request<B>) -> Response<ResponseBody>
where
    B: Body,
    B::Error: Display,
{
    let (parts, body) = req.into_parts();

    let response = match body.collect().await {
        Ok(collected) => handler.handle(&parts.method, &collected.to_bytes()).await,
        Err(e) => {
            tracing::warn!(error = %e, "could not read request body");
            let response = SummaryResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: json!({
                    "error": "Internal Server Error",
                    "details": format!("could not read request body: {e}"),
                }),
            };
            counter!(REQUESTS, "status" => response.status.as_u16().to_string()).increment(1);
            response
        }
    };

    tracing::debug!(
        method = %parts.method,
        path = %parts.uri.path(),
        status = %response.status,
        "handled request"
    );

    response.into_http()
}
