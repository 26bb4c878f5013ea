use std::sync::{Mutex, MutexGuard};

use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Flat cookie set for a single origin. No domain, path or expiry tracking.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    cookies: Vec<Cookie>,
    established: bool,
}

impl SessionState {
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Replaces the value of a cookie with the same name, keeping its position.
    pub fn set_cookie(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => existing.value = cookie.value,
            None => self.cookies.push(cookie),
        }
    }

    /// Value for the `Cookie` request header, `None` when the jar is empty.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Process-wide session shared by every [`ApiClient`](super::ApiClient) clone.
#[derive(Debug, Default)]
pub struct SessionStore {
    state: Mutex<SessionState>,
    /// Held for the whole bootstrap handshake so concurrent callers wait for one run.
    pub(crate) bootstrap_gate: AsyncMutex<()>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // A panic while holding the lock cannot leave the cookie list half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn cookie_header(&self) -> Option<String> {
        self.lock().cookie_header()
    }

    pub fn store_cookie(&self, cookie: Cookie) {
        self.lock().set_cookie(cookie);
    }

    /// Parses one `Set-Cookie` header value and stores it. Returns false when unparseable.
    pub fn store_set_cookie(&self, header: &str) -> bool {
        match parse_set_cookie(header) {
            Some(cookie) => {
                self.store_cookie(cookie);
                true
            }
            None => false,
        }
    }

    pub fn is_established(&self) -> bool {
        self.lock().is_established()
    }

    pub fn mark_established(&self) {
        self.lock().established = true;
    }
}

/// Extracts `name=value` from a `Set-Cookie` header, ignoring every attribute.
pub fn parse_set_cookie(header: &str) -> Option<Cookie> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(Cookie {
        name: name.to_string(),
        value: value.trim().to_string(),
    })
}
