// src/router.rs
use crate::http::{Method, Request, Response};

/// One exact-match entry of the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub response: Response,
}

const GREETING: Response = Response::ok("text/html", b"<html><h4>Hello World!!</h4></html>");
const DATA: Response = Response::ok("application/json", br#"{"message": "Hello World!!!"}"#);

/// The fixed table every `GET` is matched against.
pub static ROUTES: &[Route] = &[
    Route {
        path: "/",
        response: GREETING,
    },
    Route {
        path: "/index.html",
        response: GREETING,
    },
    Route {
        path: "/data.json",
        response: DATA,
    },
];

/// Maps a decoded request to one of the canned responses.
#[derive(Debug, Clone, Copy)]
pub struct Router {
    routes: &'static [Route],
}

impl Router {
    pub fn new() -> Self {
        Self { routes: ROUTES }
    }

    pub fn with_routes(routes: &'static [Route]) -> Self {
        Self { routes }
    }

    /// Only `GET` is served; any other method gets 405 whatever the path.
    pub fn route(&self, req: &Request) -> Response {
        if req.method() != Method::Get {
            return Response::method_not_allowed();
        }
        self.match_path(req.path_bytes())
            .unwrap_or_else(Response::not_found)
    }

    pub fn match_path(&self, path: &[u8]) -> Option<Response> {
        self.routes
            .iter()
            .find(|route| route.path.as_bytes() == path)
            .map(|route| route.response)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
