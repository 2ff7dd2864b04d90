//! In-memory [`Transport`] for tests.
//!
//! Routes are keyed by full URL. Unrouted URLs answer 404, which the probes
//! treat as an optional endpoint that is not implemented yet.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::transport::{HttpResponse, Transport, TransportError, TransportFuture};

#[derive(Debug, Clone)]
enum Route {
    Fixed(HttpResponse),
    /// Responses served in order; the last one repeats.
    Sequence(VecDeque<HttpResponse>),
    Error(TransportError),
    Delayed(Duration, HttpResponse),
}

#[derive(Default)]
struct MockState {
    routes: HashMap<String, Route>,
    calls: HashMap<String, usize>,
    log: Vec<(String, String)>,
}

/// Canned-response transport with per-URL call counting.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `status` and an empty body.
    pub fn respond(&self, url: &str, status: u16) -> &Self {
        self.route(url, Route::Fixed(HttpResponse::new(status, Vec::new())))
    }

    /// Answer `url` with `status` and a JSON body.
    pub fn respond_json(&self, url: &str, status: u16, body: serde_json::Value) -> &Self {
        self.route(url, Route::Fixed(HttpResponse::new(status, body.to_string())))
    }

    /// Answer `url` with each status in turn, repeating the last.
    pub fn respond_sequence(&self, url: &str, statuses: &[u16]) -> &Self {
        let responses = statuses
            .iter()
            .map(|&s| HttpResponse::new(s, Vec::new()))
            .collect();
        self.route(url, Route::Sequence(responses))
    }

    /// Fail requests to `url` with a connection error.
    pub fn fail(&self, url: &str, message: &str) -> &Self {
        self.route(url, Route::Error(TransportError::Connect(message.to_string())))
    }

    /// Answer `url` with `status` after `delay`.
    pub fn delay(&self, url: &str, delay: Duration, status: u16) -> &Self {
        self.route(url, Route::Delayed(delay, HttpResponse::new(status, Vec::new())))
    }

    /// Number of requests made to `url` (any method).
    pub fn calls(&self, url: &str) -> usize {
        let state = self.state.lock().expect("mock transport lock");
        state.calls.get(url).copied().unwrap_or(0)
    }

    /// Every request as `(method, url)`, in order.
    pub fn requests(&self) -> Vec<(String, String)> {
        let state = self.state.lock().expect("mock transport lock");
        state.log.clone()
    }

    fn route(&self, url: &str, route: Route) -> &Self {
        let mut state = self.state.lock().expect("mock transport lock");
        state.routes.insert(url.to_string(), route);
        self
    }

    fn next(&self, method: &str, url: &str) -> Route {
        let mut state = self.state.lock().expect("mock transport lock");
        *state.calls.entry(url.to_string()).or_insert(0) += 1;
        state.log.push((method.to_string(), url.to_string()));

        match state.routes.get_mut(url) {
            Some(Route::Sequence(responses)) => {
                let response = if responses.len() > 1 {
                    responses.pop_front()
                } else {
                    responses.front().cloned()
                };
                Route::Fixed(response.unwrap_or_else(|| HttpResponse::new(404, Vec::new())))
            }
            Some(route) => route.clone(),
            None => Route::Fixed(HttpResponse::new(404, Vec::new())),
        }
    }

    fn serve<'a>(&'a self, method: &str, url: &'a str) -> TransportFuture<'a> {
        let route = self.next(method, url);
        Box::pin(async move {
            match route {
                Route::Fixed(response) => Ok(response),
                Route::Error(err) => Err(err),
                Route::Delayed(delay, response) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                Route::Sequence(_) => Err(TransportError::Request("unresolved sequence".to_string())),
            }
        })
    }
}

impl Transport for MockTransport {
    fn get<'a>(&'a self, url: &'a str) -> TransportFuture<'a> {
        self.serve("GET", url)
    }

    fn post_json<'a>(&'a self, url: &'a str, _body: Vec<u8>) -> TransportFuture<'a> {
        self.serve("POST", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unrouted_urls_are_not_found() {
        let mock = MockTransport::new();
        let resp = mock.get("http://x/health").await.unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(mock.calls("http://x/health"), 1);
    }

    #[tokio::test]
    async fn sequences_repeat_last_response() {
        let mock = MockTransport::new();
        mock.respond_sequence("http://x/health", &[500, 200]);

        assert_eq!(mock.get("http://x/health").await.unwrap().status, 500);
        assert_eq!(mock.get("http://x/health").await.unwrap().status, 200);
        assert_eq!(mock.get("http://x/health").await.unwrap().status, 200);
        assert_eq!(mock.calls("http://x/health"), 3);
    }

    #[tokio::test]
    async fn errors_and_log() {
        let mock = MockTransport::new();
        mock.fail("http://x/down", "refused");

        assert!(mock.get("http://x/down").await.is_err());
        mock.post_json("http://x/hook", b"{}".to_vec()).await.unwrap();
        assert_eq!(
            mock.requests(),
            vec![
                ("GET".to_string(), "http://x/down".to_string()),
                ("POST".to_string(), "http://x/hook".to_string()),
            ]
        );
    }
}
