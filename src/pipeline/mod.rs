//! Proxy request pipeline.
//!
//! # Data Flow
//! ```text
//! request that matched no service route
//!     → context.rs dispatch (proxy URL / referer → destination + session)
//!         none → 404
//!     → FetchProxyRequestBody      buffer the browser's body
//!     → SendDestinationRequest     headers.rs, upload injection, destination.rs
//!     → CheckSameOriginPolicy      XHR only; rejected → connection dropped
//!     → DecideOnProcessingStrategy build_content_info; no processing → piped
//!     → FetchContent               buffer the destination body
//!     → ProcessContent             ContentProcessor
//!     → SendProxyResponse          rewritten headers, body, trailers
//!
//! any fatal error → page: Session::handle_page_error, otherwise 500
//! ```
//!
//! Stages run strictly in order for one request; each stage consumes the
//! previous stage's output, so a stage can never run twice or out of turn.

pub mod context;
pub mod destination;
pub mod error;
pub mod headers;
pub mod same_origin;

use bytes::{Bytes, BytesMut};
use http::{header, HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::http::request::{fetch_body, request_id, BodyError};
use crate::http::response::{respond_404, BoxError, ProxyBody};
use crate::http::ServerInfo;
use crate::net::transport::ConnectionAbort;
use crate::observability::metrics;
use crate::processing::ContentProcessor;
use crate::session::SessionRegistry;
use crate::upload;

pub use context::{ContentInfo, PipelineContext};
pub use destination::{build_client, DestinationRequest, HttpClient};
pub use error::{ErrorCode, PipelineError};

enum Stage {
    FetchProxyRequestBody(Incoming),
    SendDestinationRequest,
    CheckSameOriginPolicy(Incoming),
    DecideOnProcessingStrategy(Incoming),
    FetchContent(Incoming),
    ProcessContent,
    SendProxyResponse,
}

enum Step {
    Next(Stage),
    Respond(Response<ProxyBody>, &'static str),
    Fail(PipelineError),
    Abort,
}

/// Shared collaborators of every pipeline run.
#[derive(Clone)]
pub struct Pipeline {
    pub sessions: SessionRegistry,
    pub client: HttpClient,
    pub processor: Arc<dyn ContentProcessor>,
    pub destination_timeout: Duration,
    pub max_body_size: usize,
}

impl Pipeline {
    /// Drive one request to its response.
    ///
    /// `Err(ConnectionAbort)` asks the listener to close the connection
    /// without a response.
    pub async fn run(&self, req: Request<Incoming>, server_info: ServerInfo) -> Result<Response<ProxyBody>, ConnectionAbort> {
        let start = Instant::now();
        let (parts, body) = req.into_parts();

        let Some(mut ctx) = PipelineContext::dispatch(parts, server_info, &self.sessions) else {
            metrics::record_request("not_found", start);
            return Ok(respond_404());
        };

        let mut stage = Stage::FetchProxyRequestBody(body);
        loop {
            let step = match stage {
                Stage::FetchProxyRequestBody(body) => self.fetch_proxy_request_body(&mut ctx, body).await,
                Stage::SendDestinationRequest => self.send_destination_request(&mut ctx).await,
                Stage::CheckSameOriginPolicy(body) => check_same_origin_policy(&ctx, body),
                Stage::DecideOnProcessingStrategy(body) => decide_on_processing_strategy(&mut ctx, body),
                Stage::FetchContent(body) => self.fetch_content(&mut ctx, body).await,
                Stage::ProcessContent => self.process_content(&mut ctx).await,
                Stage::SendProxyResponse => send_proxy_response(&mut ctx),
            };

            match step {
                Step::Next(next) => stage = next,
                Step::Respond(res, outcome) => {
                    metrics::record_request(outcome, start);
                    return Ok(res);
                }
                Step::Fail(err) => {
                    metrics::record_request("error", start);
                    return Ok(handle_error(&ctx, err));
                }
                Step::Abort => {
                    metrics::record_request("blocked", start);
                    return Err(ConnectionAbort);
                }
            }
        }
    }

    async fn fetch_proxy_request_body(&self, ctx: &mut PipelineContext, body: Incoming) -> Step {
        match fetch_body(body, self.max_body_size).await {
            Ok(bytes) => {
                ctx.req_body = bytes;
                Step::Next(Stage::SendDestinationRequest)
            }
            Err(e) => Step::Fail(PipelineError::RequestBody(e)),
        }
    }

    async fn send_destination_request(&self, ctx: &mut PipelineContext) -> Step {
        let request = create_request(ctx);

        match request.send(&self.client, self.destination_timeout).await {
            Ok(res) => {
                let (parts, body) = res.into_parts();
                ctx.dest_status = parts.status;
                ctx.dest_headers = parts.headers;
                Step::Next(Stage::CheckSameOriginPolicy(body))
            }
            Err(err) => Step::Fail(err),
        }
    }

    async fn fetch_content(&self, ctx: &mut PipelineContext, mut body: Incoming) -> Step {
        let mut buf = BytesMut::new();

        // The destination timeout bounds each read.
        loop {
            let frame = match tokio::time::timeout(self.destination_timeout, body.frame()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(_) => {
                    return Step::Fail(PipelineError::destination(
                        ErrorCode::OriginServerRequestTimeout,
                        ctx.dest.url.clone(),
                    ));
                }
            };

            match frame {
                Ok(frame) => match frame.into_data() {
                    Ok(data) => {
                        if buf.len() + data.len() > self.max_body_size {
                            return Step::Fail(PipelineError::ResponseBody(BodyError::TooLarge {
                                limit: self.max_body_size,
                            }));
                        }
                        buf.extend_from_slice(&data);
                    }
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            ctx.dest_trailers = Some(trailers);
                        }
                    }
                },
                // The socket may fail after a complete body; decided below.
                Err(e) => {
                    tracing::debug!(dest_url = %ctx.dest.url, error = %e, "Destination connection error while reading body");
                    ctx.has_dest_req_err = true;
                    break;
                }
            }
        }

        ctx.dest_res_body = buf.freeze();

        if ctx.has_dest_req_err && is_dest_res_body_malformed(ctx) {
            return Step::Fail(PipelineError::destination(
                ErrorCode::OriginServerConnectionTerminated,
                ctx.dest.url.clone(),
            ));
        }

        Step::Next(Stage::ProcessContent)
    }

    async fn process_content(&self, ctx: &mut PipelineContext) -> Step {
        match self.processor.process(ctx).await {
            Ok(body) => {
                ctx.dest_res_body = body;
                Step::Next(Stage::SendProxyResponse)
            }
            Err(e) => Step::Fail(e.into()),
        }
    }
}

fn check_same_origin_policy(ctx: &PipelineContext, body: Incoming) -> Step {
    if ctx.is_xhr && !same_origin::check(ctx) {
        tracing::debug!(
            dest_url = %ctx.dest.url,
            req_origin = ctx.dest.req_origin.as_deref().unwrap_or(""),
            "Cross-origin XHR rejected"
        );
        return Step::Abort;
    }

    Step::Next(Stage::DecideOnProcessingStrategy(body))
}

fn decide_on_processing_strategy(ctx: &mut PipelineContext, body: Incoming) -> Step {
    ctx.build_content_info();
    if !has_body(&ctx.req.method, ctx.dest_status) {
        ctx.content_info.require_processing = false;
    }

    if ctx.content_info.require_processing {
        return Step::Next(Stage::FetchContent(body));
    }

    // Streamed as received; trailers travel with the body.
    let body = body.map_err(|e| Box::new(e) as BoxError).boxed_unsync();
    Step::Respond(build_response(ctx, body), "piped")
}

fn send_proxy_response(ctx: &mut PipelineContext) -> Step {
    let mut frames: Vec<Result<Frame<Bytes>, BoxError>> = vec![Ok(Frame::data(ctx.dest_res_body.clone()))];
    if let Some(trailers) = ctx.dest_trailers.take() {
        frames.push(Ok(Frame::trailers(trailers)));
    }

    let body = StreamBody::new(futures_util::stream::iter(frames)).boxed_unsync();
    Step::Respond(build_response(ctx, body), "processed")
}

fn build_response(ctx: &PipelineContext, body: ProxyBody) -> Response<ProxyBody> {
    let mut res = Response::new(body);
    *res.status_mut() = ctx.dest_status;
    *res.headers_mut() = headers::for_response(ctx);
    res
}

fn create_request(ctx: &PipelineContext) -> DestinationRequest {
    let content_type = ctx
        .req
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let body = match upload::inject_uploads(content_type, &ctx.req_body) {
        Ok(Some(body)) => Bytes::from(body),
        Ok(None) => ctx.req_body.clone(),
        Err(e) => {
            tracing::warn!(dest_url = %ctx.dest.url, error = %e, "Upload marker ignored");
            ctx.req_body.clone()
        }
    };

    DestinationRequest {
        url: ctx.dest.url.clone(),
        protocol: ctx.dest.protocol.clone(),
        hostname: ctx.dest.hostname.clone(),
        host: ctx.dest.host.clone(),
        port: ctx.dest.port_number(),
        path: ctx.dest.part_after_host.clone(),
        method: ctx.req.method.clone(),
        headers: headers::for_request(ctx),
        credentials: ctx.session.auth_credentials(),
        body,
    }
}

// HEAD answers and bodiless statuses have nothing to process.
fn has_body(method: &Method, status: StatusCode) -> bool {
    method != Method::HEAD
        && !status.is_informational()
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
}

// Only a body whose length matches a declared Content-Length is trusted
// after a connection error.
fn is_dest_res_body_malformed(ctx: &PipelineContext) -> bool {
    let declared = content_length(&ctx.dest_headers);
    declared != Some(ctx.dest_res_body.len())
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn handle_error(ctx: &PipelineContext, err: PipelineError) -> Response<ProxyBody> {
    metrics::record_pipeline_error(err.code());
    tracing::warn!(
        request_id = request_id(&ctx.req.headers),
        session_id = %ctx.session.id(),
        dest_url = %ctx.dest.url,
        code = err.code(),
        error = %err,
        "Pipeline failed"
    );

    if ctx.is_page && !ctx.is_iframe {
        if let Some(res) = ctx.session.handle_page_error(ctx, &err) {
            return res;
        }
    }

    ctx.close_with_error(StatusCode::INTERNAL_SERVER_ERROR, Some(&err.to_string()))
}
