// HTTP form transport: turns a `FormRequest` into a concrete POST against
// the store and returns the raw body. The admin panel has no API contract,
// so nothing here interprets bodies; that is left to the session manager
// and the deployment operations.

use crate::config::Credentials;
use crate::error::{Error, Result};
use reqwest::blocking::{multipart, Client};
use reqwest::Url;
use std::fs::File;
use std::path::PathBuf;

/// Query marker asking the admin backend not to keep a long-lived session
/// for a call made without a session token.
pub const TEMPORARY_SESSION: (&str, &str) = ("temporarysession", "1");

/// A file to send as one multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub source_path: PathBuf,
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    File(FileAttachment),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormEncoding {
    #[default]
    Multipart,
    UrlEncoded,
}

/// A form submission, built fresh for every call. Field order is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub fields: Vec<(String, FieldValue)>,
    pub encoding: FormEncoding,
}

impl FormRequest {
    pub fn new(path: impl Into<String>) -> Self {
        FormRequest {
            path: path.into(),
            query: Vec::new(),
            fields: Vec::new(),
            encoding: FormEncoding::default(),
        }
    }

    pub fn urlencoded(mut self) -> Self {
        self.encoding = FormEncoding::UrlEncoded;
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), FieldValue::Text(value.into())));
        self
    }

    pub fn file(mut self, name: impl Into<String>, attachment: FileAttachment) -> Self {
        self.fields.push((name.into(), FieldValue::File(attachment)));
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// What actually goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub url: Url,
    pub encoding: FormEncoding,
    pub fields: Vec<(String, FieldValue)>,
}

impl PreparedRequest {
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|(n, v)| match v {
            FieldValue::Text(t) if n == name => Some(t.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Resolve `path` against the store URL unless it is already absolute, then
/// append the temporary-session marker (only without a token) and `query`.
pub fn build_url(
    store_url: &str,
    path: &str,
    query: &[(String, String)],
    has_token: bool,
) -> Result<Url> {
    let raw = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{}{}", store_url.trim_end_matches('/'), path)
    };
    let mut url = Url::parse(&raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;

    if !has_token || !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        if !has_token {
            pairs.append_pair(TEMPORARY_SESSION.0, TEMPORARY_SESSION.1);
        }
        for (name, value) in query {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

/// Build the wire request. With `with_credentials` and no token, login
/// fields are appended so the admin panel can authenticate the single call.
pub fn prepare(
    request: &FormRequest,
    credentials: &Credentials,
    token: Option<&str>,
    with_credentials: bool,
) -> Result<PreparedRequest> {
    let url = build_url(
        &credentials.store_url,
        &request.path,
        &request.query,
        token.is_some(),
    )?;
    let mut fields = request.fields.clone();
    if with_credentials && token.is_none() {
        fields.push((
            "Username".into(),
            FieldValue::Text(credentials.username.clone()),
        ));
        fields.push((
            "Password".into(),
            FieldValue::Text(credentials.password.clone()),
        ));
        fields.push(("Session_Type".into(), FieldValue::Text("admin".into())));
    }
    Ok(PreparedRequest {
        url,
        encoding: request.encoding,
        fields,
    })
}

/// The wire. Implementations own the cookie jar.
pub trait Transport {
    fn send(&mut self, request: &PreparedRequest) -> Result<HttpResponse>;

    /// Forget all cookies.
    fn reset(&mut self) -> Result<()>;
}

/// Blocking reqwest client with a persistent cookie store.
pub struct HttpTransport {
    client: Client,
}

fn build_client() -> Result<Client> {
    Ok(Client::builder().cookie_store(true).build()?)
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Ok(HttpTransport {
            client: build_client()?,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&mut self, request: &PreparedRequest) -> Result<HttpResponse> {
        let builder = self.client.post(request.url.clone());
        let builder = match request.encoding {
            FormEncoding::UrlEncoded => {
                let mut pairs = Vec::with_capacity(request.fields.len());
                for (name, value) in &request.fields {
                    match value {
                        FieldValue::Text(text) => pairs.push((name.as_str(), text.as_str())),
                        FieldValue::File(_) => {
                            return Err(Error::InvalidRequest(format!(
                                "field {name} is a file but the form is urlencoded"
                            )))
                        }
                    }
                }
                builder.form(&pairs)
            }
            FormEncoding::Multipart => {
                let mut form = multipart::Form::new();
                for (name, value) in &request.fields {
                    form = match value {
                        FieldValue::Text(text) => form.text(name.clone(), text.clone()),
                        FieldValue::File(attachment) => {
                            let file = File::open(&attachment.source_path)?;
                            let part = multipart::Part::reader(file)
                                .file_name(attachment.filename.clone())
                                .mime_str(&attachment.content_type)?;
                            form.part(name.clone(), part)
                        }
                    };
                }
                builder.multipart(form)
            }
        };

        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpResponse { status, body })
    }

    fn reset(&mut self) -> Result<()> {
        self.client = build_client()?;
        Ok(())
    }
}
