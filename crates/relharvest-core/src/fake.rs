//! In-memory transport for tests and offline dry runs.
//!
//! Responses are routed by exact URL. Each route is a queue: responses are
//! consumed in order and the last one repeats forever. Unrouted URLs answer
//! `404 Not Found`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::error::RequestError;
use crate::http::{ApiResponse, Transport};

type Scripted = Result<ApiResponse, RequestError>;

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `url`
    pub fn push(&self, url: &str, response: ApiResponse) {
        self.push_result(url, Ok(response));
    }

    /// Queue a transport failure for `url`
    pub fn push_error(&self, url: &str, error: RequestError) {
        self.push_result(url, Err(error));
    }

    fn push_result(&self, url: &str, result: Scripted) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default()
            .push_back(result);
    }

    /// Every URL requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests whose URL equals `url`
    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }

    /// Number of requests whose URL contains `fragment`
    pub fn requests_matching(&self, fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|u| u.contains(fragment))
            .count()
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &str) -> Result<ApiResponse, RequestError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(not_found),
            Some(queue) => queue.front().cloned().unwrap_or_else(not_found),
            None => not_found(),
        }
    }
}

fn not_found() -> Scripted {
    Ok(ApiResponse::new(404, r#"{"message":"Not Found"}"#))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_response_repeats() {
        let t = ScriptedTransport::new();
        t.push("u", ApiResponse::new(500, "a"));
        t.push("u", ApiResponse::new(200, "b"));
        assert_eq!(t.get("u").unwrap().status, 500);
        assert_eq!(t.get("u").unwrap().status, 200);
        assert_eq!(t.get("u").unwrap().status, 200);
        assert_eq!(t.request_count("u"), 3);
    }

    #[test]
    fn unrouted_is_not_found() {
        let t = ScriptedTransport::new();
        assert_eq!(t.get("missing").unwrap().status, 404);
        assert_eq!(t.requests(), vec!["missing".to_string()]);
    }
}
