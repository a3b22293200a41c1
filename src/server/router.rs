use crate::{Method, Request, Response};
use std::sync::Arc;
use tracing::warn;

/// A callback that fills in the [`Response`] for a matched request.
///
/// Handlers run synchronously on one of the reactor's worker threads, so a
/// handler that blocks for long delays every connection on that worker.
/// Any `Fn(&Request, &mut Response)` closure is a handler.
///
/// # Examples
///
/// Closure handler
/// ```
/// use oneshot_http::{Method, Request, Response, Server, StatusCode};
///
/// let mut server = Server::new("127.0.0.1", 0);
/// server
///     .register(Method::Get, "/", |_req: &Request, resp: &mut Response| {
///         resp.status(StatusCode::Ok).body("Hello world!");
///     })
///     .unwrap();
/// ```
/// Handler with shared state
/// ```
/// use oneshot_http::{Handler, Request, Response, StatusCode};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct CountingHandler {
///     hits: AtomicUsize,
/// }
///
/// impl Handler for CountingHandler {
///     fn handle(&self, _req: &Request, resp: &mut Response) {
///         let n = self.hits.fetch_add(1, Ordering::Relaxed) + 1;
///         resp.status(StatusCode::Ok).body(format!("Request #{n}"));
///     }
/// }
/// ```
pub trait Handler
where
    Self: Sync + Send + 'static,
{
    /// Processes a request by mutating `response`.
    ///
    /// A panic is caught by the connection and answered with
    /// `500 Internal Server Error`.
    fn handle(&self, request: &Request, response: &mut Response);
}

impl<F> Handler for F
where
    F: Fn(&Request, &mut Response) + Send + Sync + 'static,
{
    #[inline(always)]
    fn handle(&self, request: &Request, response: &mut Response) {
        self(request, response)
    }
}

type Route = (String, Arc<dyn Handler>);

/// Exact-match route table.
///
/// Routes are scanned in registration order per method and the first path
/// equal to the request target wins. No normalization is applied, so
/// `/a`, `/a/` and `/a?x=1` are three different routes.
#[derive(Clone, Default)]
pub(crate) struct Router {
    routes: [Vec<Route>; 4],
}

impl Router {
    pub(crate) fn register<H: Handler>(&mut self, method: Method, path: &str, handler: H) {
        let routes = &mut self.routes[method.index()];

        if routes.iter().any(|(p, _)| p == path) {
            warn!(%method, path, "duplicate route registered, the earlier handler keeps matching");
        }

        routes.push((path.to_owned(), Arc::new(handler)));
    }

    /// Runs the first matching handler; leaves `response` untouched otherwise.
    #[inline]
    pub(crate) fn dispatch(&self, request: &Request, response: &mut Response) -> bool {
        let found = self.routes[request.method().index()]
            .iter()
            .find(|(path, _)| path == request.url());

        match found {
            Some((_, handler)) => {
                handler.handle(request, response);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.iter().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for method in Method::ALL {
            for (path, _) in &self.routes[method.index()] {
                list.entry(&format_args!("{method} {path}"));
            }
        }
        list.finish()
    }
}
