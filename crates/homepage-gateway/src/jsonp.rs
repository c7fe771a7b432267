//! JSONP bridge.
//!
//! Some providers only answer with a script of the form `callback({...})`
//! and no CORS headers. The bridge keeps a private table of pending callback
//! tokens, each owning a one-shot completion handle. A fetch registers its
//! token, loads the script, interprets the callback invocation it contains
//! and resolves its own handle when the script names that token. Any other
//! name is ignored, so one script can never complete another fetch. The
//! token is removed from the table on every exit path, including
//! cancellation of the fetch future.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{GatewayError, JsonpError};

/// Query parameter naming the callback, as `fetch-jsonp` style endpoints expect.
pub const DEFAULT_CALLBACK_PARAM: &str = "callback";

const TOKEN_PREFIX: &str = "jsonpCallback";
const TOKEN_SUFFIX_RANGE: u128 = 100_000;

/// Words that can precede `(` in a wrapper script without being the callback.
const NON_CALLBACK_WORDS: &[&str] = &[
    "try", "catch", "function", "if", "typeof", "return", "while", "for", "switch",
];

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;

/// Name of a single JSONP callback, unique per call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallbackToken(String);

impl CallbackToken {
    /// `jsonpCallback_<unix millis>_<random suffix>`
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix = uuid::Uuid::new_v4().as_u128() % TOKEN_SUFFIX_RANGE;
        Self(format!("{}_{}_{}", TOKEN_PREFIX, millis, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append `<param>=<token>` to `url`, keeping any existing query.
pub fn with_callback_param(
    url: &str,
    param: &str,
    token: &CallbackToken,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(url)?;
    url.query_pairs_mut().append_pair(param, token.as_str());
    Ok(url)
}

#[derive(Clone)]
pub struct JsonpBridge {
    client: reqwest::Client,
    pending: Pending,
}

impl JsonpBridge {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of callbacks currently registered.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, token: &CallbackToken) -> bool {
        self.pending.lock().contains_key(token.as_str())
    }

    /// Load `url`, whose query already names `token` as its callback, and
    /// resolve with the payload the script passes to that callback.
    ///
    /// Fails with [`JsonpError::TokenCollision`] if `token` is already pending.
    pub async fn fetch(&self, url: &str, token: &CallbackToken) -> Result<Value, JsonpError> {
        let (registration, completion) = self.register(token)?;
        self.complete(url, token, registration, completion).await
    }

    /// Register a freshly generated token, build the request URL around it
    /// and fetch. A generated token that happens to be pending already is
    /// replaced by a new one.
    pub async fn fetch_with_token<F>(&self, build_url: F) -> Result<Value, GatewayError>
    where
        F: FnOnce(&CallbackToken) -> Result<Url, url::ParseError>,
    {
        let (token, registration, completion) = self.register_fresh(CallbackToken::generate);
        let url = build_url(&token)?;
        Ok(self
            .complete(url.as_str(), &token, registration, completion)
            .await?)
    }

    /// Generate a token, append it as `callback=<token>` and fetch.
    pub async fn fetch_with_callback_param(&self, url: &str) -> Result<Value, GatewayError> {
        self.fetch_with_token(|token| with_callback_param(url, DEFAULT_CALLBACK_PARAM, token))
            .await
    }

    #[instrument(skip(self, token, registration, completion), fields(token = %token), level = "debug")]
    async fn complete(
        &self,
        url: &str,
        token: &CallbackToken,
        registration: Registration,
        completion: oneshot::Receiver<Value>,
    ) -> Result<Value, JsonpError> {
        let script = self.load_script(url).await?;
        let invocation = parse_invocation(&script)?;
        if invocation.callback != token.as_str() {
            warn!(
                callback = invocation.callback,
                "Script invoked a different callback, ignoring it"
            );
        } else if !self.invoke(token.as_str(), invocation.payload) {
            debug!("Callback was already resolved");
        }

        // Unregistering drops our sender if the script never reached it,
        // which turns the await below into an error instead of a hang.
        drop(registration);

        completion
            .await
            .map_err(|_| JsonpError::CallbackNotInvoked(token.to_string()))
    }

    fn register_fresh(
        &self,
        mut generate: impl FnMut() -> CallbackToken,
    ) -> (CallbackToken, Registration, oneshot::Receiver<Value>) {
        loop {
            let token = generate();
            match self.register(&token) {
                Ok((registration, completion)) => return (token, registration, completion),
                Err(e) => debug!("{}, generating another token", e),
            }
        }
    }

    fn register(
        &self,
        token: &CallbackToken,
    ) -> Result<(Registration, oneshot::Receiver<Value>), JsonpError> {
        let mut pending = self.pending.lock();
        if pending.contains_key(token.as_str()) {
            return Err(JsonpError::TokenCollision(token.to_string()));
        }

        let (sender, receiver) = oneshot::channel();
        pending.insert(token.to_string(), sender);
        debug!(pending = pending.len(), "Registered JSONP callback");

        Ok((
            Registration {
                pending: Arc::clone(&self.pending),
                token: token.to_string(),
            },
            receiver,
        ))
    }

    /// Hand `payload` to the callback registered as `name`. The entry is
    /// consumed, so a second invocation of the same name is a no-op.
    fn invoke(&self, name: &str, payload: Value) -> bool {
        let sender = self.pending.lock().remove(name);
        match sender {
            Some(sender) => sender.send(payload).is_ok(),
            None => false,
        }
    }

    async fn load_script(&self, url: &str) -> Result<String, JsonpError> {
        let load_failed = |reason: String| JsonpError::LoadFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| load_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(load_failed(format!("HTTP {}", status)));
        }

        response.text().await.map_err(|e| load_failed(e.to_string()))
    }
}

impl fmt::Debug for JsonpBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonpBridge")
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Removes its token from the pending table when dropped.
struct Registration {
    pending: Pending,
    token: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        pending.remove(&self.token);
        debug!(token = %self.token, pending = pending.len(), "Unregistered JSONP callback");
    }
}

/// A `name(<json>)` call found in a JSONP script.
#[derive(Debug)]
pub(crate) struct Invocation<'a> {
    pub(crate) callback: &'a str,
    pub(crate) payload: Value,
}

/// Find the first `identifier(<json>)` in `script`.
///
/// Tolerates the usual wrappers (`/**/`, `try{...}catch(e){}`,
/// `typeof cb === 'function' && cb(...)`, `window.cb(...)`).
pub(crate) fn parse_invocation(script: &str) -> Result<Invocation<'_>, JsonpError> {
    let bytes = script.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let at_word_start = is_ident_start(bytes[i]) && (i == 0 || !is_ident_char(bytes[i - 1]));
        if !at_word_start {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && is_ident_char(bytes[i]) {
            i += 1;
        }
        let name = &script[start..i];

        if NON_CALLBACK_WORDS.contains(&name) {
            continue;
        }
        if let Some(args) = script[i..].trim_start().strip_prefix('(') {
            if let Some(payload) = parse_argument(args) {
                return Ok(Invocation {
                    callback: name,
                    payload,
                });
            }
        }
    }

    Err(JsonpError::MalformedScript(
        script.chars().take(80).collect(),
    ))
}

/// Parse one JSON value followed by `)`.
fn parse_argument(args: &str) -> Option<Value> {
    let mut values = serde_json::Deserializer::from_str(args).into_iter::<Value>();
    let value = values.next()?.ok()?;
    let rest = &args[values.byte_offset()..];
    rest.trim_start().starts_with(')').then_some(value)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_char(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}
