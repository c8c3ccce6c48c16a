//! Request dispatch
//!
//! Resolves a request to a resource, applies the access rules in a fixed
//! order and runs the handler. A failed access check is reported as `404` so
//! that hidden resources are indistinguishable from missing ones.

use http::header::{ETAG, IF_NONE_MATCH};
use http::{Method, StatusCode};

use super::engine::Server;
use super::http::{Request, Response};
use super::onetime::ONETIME_PREFIX;
use super::resource::{Resource, ResourceFlags};
use crate::error::Error;

/// Query parameter carrying the session id
const SESSION_PARAM: &str = "session_id";

impl Server {
    pub(super) fn dispatch(&mut self, req: Request) -> Response {
        tracing::trace!(method = %req.method, path = %req.path, client = req.client.0, "Request");

        // Session ids must never travel in clear text
        if !req.tls {
            if let Some(id) = req.query_param(SESSION_PARAM) {
                if self.sessions.invalidate(id) {
                    tracing::warn!(client = req.client.0, "Session id sent over plain HTTP; invalidated");
                }
            }
        }

        if req.path.starts_with(ONETIME_PREFIX) {
            return self.dispatch_onetime(req);
        }

        let Some(resource) = self.resources.resolve(&req.path).cloned() else {
            return Response::not_found();
        };

        if !self.allowed(&resource, &req) {
            tracing::debug!(path = %req.path, client = req.client.0, "Access denied");
            return Response::not_found();
        }

        if let (Some(etag), Some(seen)) = (&resource.etag, req.header_str(IF_NONE_MATCH.as_str())) {
            if seen == etag {
                return Response::new(StatusCode::NOT_MODIFIED).with_header(ETAG, etag);
            }
        }

        if resource.flags.contains(ResourceFlags::HTTP_ONLY) && req.tls {
            let path = self.onetime.create(resource, req.raw_query.clone());
            return Response::redirect(&format!("{}{}", self.config.base_url, path));
        }

        self.invoke(&resource, &req)
    }

    fn allowed(&self, resource: &Resource, req: &Request) -> bool {
        let flags = resource.flags;
        if flags.contains(ResourceFlags::UI) && !self.config.enable_public_ui && !req.admin_listener {
            return false;
        }
        if flags.contains(ResourceFlags::HTTPS_ONLY) && !req.tls {
            return false;
        }
        if flags.contains(ResourceFlags::ADMIN) {
            let admin = req
                .query_param(SESSION_PARAM)
                .map(|id| self.sessions.is_admin(id))
                .unwrap_or(false);
            if !admin {
                return false;
            }
        }
        true
    }

    fn dispatch_onetime(&mut self, req: Request) -> Response {
        if req.method != Method::GET {
            return Response::not_found();
        }
        let Some(hit) = self.onetime.take(&req.path) else {
            return Response::not_found();
        };

        let mut forwarded = req.clone();
        forwarded.path = hit.target.location.clone();
        forwarded.set_query(hit.raw_query);
        self.invoke(&hit.target, &forwarded)
    }

    fn invoke(&mut self, resource: &Resource, req: &Request) -> Response {
        let Some(handler) = resource.handler(&req.method) else {
            return Response::not_found();
        };

        match handler(self, resource, req) {
            Ok(mut response) => {
                if let Some(etag) = &resource.etag {
                    if let Ok(value) = etag.parse() {
                        response.headers.insert(ETAG, value);
                    }
                }
                response
            }
            Err(e) => {
                match &e {
                    Error::NotFound(_)
                    | Error::Parse(_)
                    | Error::Admission(_)
                    | Error::Disabled
                    | Error::Range(_) => {
                        tracing::debug!(path = %req.path, error = %e, "Request refused")
                    }
                    _ => tracing::warn!(path = %req.path, error = %e, "Request failed"),
                }
                Response::from_error(&e)
            }
        }
    }
}
