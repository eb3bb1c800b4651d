//! Rate limiting middleware.

use actix_web::{
    Error, HttpMessage,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::{
        Method,
        header::{HeaderName, HeaderValue},
    },
};
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use quill_core::ports::RateLimiter;
use quill_core::rate_limit::{KeyExtractor, RequestOrigin};

use super::error::too_many_requests;
use crate::observability::RequestId;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Rate limiting middleware factory.
///
/// Every request counts against the limiter's window for its client key.
/// When the limiter backend fails the request is let through.
pub struct RateLimitMiddleware {
    limiter: Arc<dyn RateLimiter>,
    key_extractor: Arc<dyn KeyExtractor>,
    only_mutating: bool,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<dyn RateLimiter>, key_extractor: Arc<dyn KeyExtractor>) -> Self {
        Self {
            limiter,
            key_extractor,
            only_mutating: false,
        }
    }

    /// Count only requests that change state; reads pass untouched.
    pub fn only_mutating(mut self) -> Self {
        self.only_mutating = true;
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            key_extractor: self.key_extractor.clone(),
            only_mutating: self.only_mutating,
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<dyn RateLimiter>,
    key_extractor: Arc<dyn KeyExtractor>,
    only_mutating: bool,
}

fn is_mutating(method: &Method) -> bool {
    ![Method::GET, Method::HEAD, Method::OPTIONS].contains(method)
}

fn origin_of(req: &ServiceRequest) -> RequestOrigin {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    RequestOrigin {
        forwarded_for: header("x-forwarded-for"),
        real_ip: header("x-real-ip"),
        peer: req.peer_addr().map(|addr| addr.ip().to_string()),
    }
}

/// Whole seconds, rounded up so clients never retry early.
fn retry_after_secs(reset_after: Duration) -> u64 {
    let secs = reset_after.as_secs();
    if reset_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        if self.only_mutating && !is_mutating(req.method()) {
            return Box::pin(async move {
                let res = service.call(req).await?;
                Ok(res.map_into_left_body())
            });
        }

        let limiter = self.limiter.clone();
        let key = self.key_extractor.key(&origin_of(&req));

        Box::pin(async move {
            let decision = match limiter.admit(&key).await {
                Ok(decision) => Some(decision),
                Err(e) => {
                    tracing::error!(
                        policy = limiter.name(),
                        error = %e,
                        "Rate limiter backend failed, letting request through"
                    );
                    None
                }
            };

            match decision {
                Some(decision) if !decision.allowed => {
                    let retry_after = retry_after_secs(decision.reset_after);
                    tracing::warn!(
                        policy = limiter.name(),
                        key = %key,
                        retry_after,
                        "Rate limit exceeded"
                    );

                    let request_id = req.extensions().get::<RequestId>().cloned();
                    let mut response =
                        too_many_requests(retry_after, request_id.as_ref().map(RequestId::as_str));
                    response.headers_mut().insert(
                        HeaderName::from_static(REMAINING_HEADER),
                        HeaderValue::from_static("0"),
                    );

                    let (http_req, _payload) = req.into_parts();
                    Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                }
                decision => {
                    let mut res = service.call(req).await?;
                    if let Some(decision) = decision {
                        res.headers_mut().insert(
                            HeaderName::from_static(REMAINING_HEADER),
                            HeaderValue::from(decision.remaining),
                        );
                    }
                    Ok(res.map_into_left_body())
                }
            }
        })
    }
}
