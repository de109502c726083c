// Admin session lifecycle: login, sign-out detection and the single
// re-login retry. The session token and the transport's cookie jar are only
// ever mutated from here; deployment operations go through
// `run_authenticated`.

use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::log::Logger;
use crate::modules::{OperationResult, SIGN_IN_MARKER};
use crate::transport::{prepare, FormRequest, HttpResponse, HttpTransport, Transport};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::OnceLock;

pub const ADMIN_PATH: &str = "/mm5/admin.mvc";
pub const JSON_PATH: &str = "/mm5/json.mvc";

/// Re-login-and-retry attempts after the first try.
pub const MAX_RETRIES: usize = 1;

fn session_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Session_ID\s*=\s*'([^']+)'").expect("session id pattern is valid")
    })
}

/// Pull the token out of `Session_ID = '<token>'` in admin markup.
pub fn extract_session_token(body: &str) -> Option<&str> {
    session_id_pattern()
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Envelope returned by `json.mvc`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonResponse<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

pub struct SessionManager<T: Transport = HttpTransport> {
    credentials: Credentials,
    token: Option<String>,
    transport: T,
    logger: Logger,
    requests: u64,
}

impl SessionManager<HttpTransport> {
    /// Session manager on a fresh cookie-keeping HTTP client.
    pub fn connect(credentials: Credentials, logger: Logger) -> Result<Self> {
        Ok(Self::new(credentials, HttpTransport::new()?, logger))
    }
}

impl<T: Transport> SessionManager<T> {
    pub fn new(credentials: Credentials, transport: T, logger: Logger) -> Self {
        SessionManager {
            credentials,
            token: None,
            transport,
            logger,
            requests: 0,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// POST a form. A body showing the login form while a token is held
    /// means the admin panel dropped the session; the token is cleared
    /// before the body is returned.
    pub fn submit(
        &mut self,
        request: &FormRequest,
        with_credentials: bool,
    ) -> Result<HttpResponse> {
        let prepared = prepare(
            request,
            &self.credentials,
            self.token.as_deref(),
            with_credentials,
        )?;
        self.logger.info(format!("POST: '{}'", prepared.url));
        self.requests += 1;
        let response = self.transport.send(&prepared)?;
        tracing::debug!(status = response.status, bytes = response.body.len(), "admin response");

        if self.token.is_some() && response.body.contains(SIGN_IN_MARKER) {
            self.invalidate();
        }
        Ok(response)
    }

    /// Drop the token so the next call logs in again.
    pub fn invalidate(&mut self) {
        if self.token.take().is_some() {
            self.logger.warn("Session was invalidated by the admin panel");
        }
    }

    pub fn login(&mut self) -> Result<()> {
        let logger = self.logger.child("Sign In");
        logger.info(format!("Signing in as {}...", self.credentials.username));
        self.token = None;

        let request = FormRequest::new(ADMIN_PATH)
            .text("Username", self.credentials.username.clone())
            .text("Password", self.credentials.password.clone());
        let response = self.submit(&request, false)?;

        if response.body.contains(SIGN_IN_MARKER) {
            logger.error("The admin panel rejected the credentials");
            return Err(Error::Auth(format!(
                "credentials for {} were rejected",
                self.credentials.username
            )));
        }
        let Some(token) = extract_session_token(&response.body) else {
            logger.error("No session token in the login response");
            return Err(Error::Auth("no session token in the login response".into()));
        };

        self.token = Some(token.to_string());
        logger.info("Signed in");
        Ok(())
    }

    /// Forget the token and every cookie.
    pub fn logout(&mut self) -> Result<()> {
        self.token = None;
        self.transport.reset()?;
        self.logger.info("Signed out");
        Ok(())
    }

    /// Run `action` with a valid session. A sign-out reported by the action
    /// (as an outcome or an error) costs one re-login and one more attempt;
    /// anything after that goes back to the caller as is.
    pub fn run_authenticated<F>(&mut self, mut action: F) -> Result<OperationResult>
    where
        F: FnMut(&mut Self) -> Result<OperationResult>,
    {
        if !self.is_authenticated() {
            self.login()?;
        }

        let mut attempt = 0;
        loop {
            let result = action(self);
            let signed_out = match &result {
                Ok(outcome) => outcome.is_signed_out(),
                Err(err) => err.is_retryable(),
            };
            if !signed_out || attempt >= MAX_RETRIES {
                return result;
            }

            attempt += 1;
            self.invalidate();
            self.logger
                .warn(format!("Signed out, retrying ({attempt}/{MAX_RETRIES})"));
            self.login()?;
        }
    }

    /// Call a `json.mvc` function. Does not log in by itself; the session
    /// token is echoed back when one is held.
    pub fn json<R: DeserializeOwned>(
        &mut self,
        function: &str,
        query: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> Result<JsonResponse<R>> {
        let path = self
            .credentials
            .json_url
            .clone()
            .unwrap_or_else(|| JSON_PATH.to_string());

        let mut request = FormRequest::new(path).urlencoded();
        for (name, value) in query {
            request = request.query(*name, *value);
        }
        // `r` only busts caches.
        request = request
            .query("Store_Code", self.credentials.store_code.clone())
            .query("Function", function)
            .query("Session_Type", "admin")
            .query("r", (self.requests % 1000).to_string());
        for (name, value) in form {
            request = request.text(*name, *value);
        }
        if let Some(token) = &self.token {
            request = request.text("Session_Id", token.clone());
        }

        let response = self.submit(&request, false)?;
        Ok(serde_json::from_str(&response.body)?)
    }

    /// `Function=Module` call routed to one module's JSON handler.
    pub fn module_json<R: DeserializeOwned>(
        &mut self,
        module_code: &str,
        function: &str,
        query: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> Result<JsonResponse<R>> {
        let mut query = query.to_vec();
        query.extend([
            ("Module_Code", module_code),
            ("Module_Function", function),
        ]);
        self.json("Module", &query, form)
    }
}
