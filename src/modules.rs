// Module deployment against the admin panel's file-upload (FUPL) and
// module-edit (UMOD) screens. Neither screen has an error protocol, so the
// response body is sniffed with ordered rules: the first rule that fires
// decides the outcome.

use crate::error::{Error, Result};
use crate::log::{Level, Logger};
use crate::session::{SessionManager, ADMIN_PATH};
use crate::transport::{FileAttachment, FormRequest, Transport};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

/// Shows up in a body whenever the admin panel renders its login form.
pub const SIGN_IN_MARKER: &str = "Sign In";
pub const LICENSE_MARKER: &str = "Insufficient Concurrent User Licenses";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    FieldError,
    SignedOut,
    LicenseLimit,
    UnknownUploadError,
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCode::FieldError => "field error",
            FailureCode::SignedOut => "signed out",
            FailureCode::LicenseLimit => "license limit",
            FailureCode::UnknownUploadError => "unknown upload error",
        };
        f.write_str(s)
    }
}

/// A classified failure. The raw body is kept for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: FailureCode,
    pub message: String,
    pub body: String,
}

impl Failure {
    pub fn new(code: FailureCode, message: impl Into<String>, body: impl Into<String>) -> Self {
        Failure {
            code,
            message: message.into(),
            body: body.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    Success { body: String },
    Failure(Failure),
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success { .. })
    }

    pub fn is_signed_out(&self) -> bool {
        matches!(self, OperationResult::Failure(f) if f.code == FailureCode::SignedOut)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            OperationResult::Failure(f) => Some(f),
            OperationResult::Success { .. } => None,
        }
    }

    /// Success body, or the failure as an [`Error::Operation`] for `module`.
    pub fn into_result(self, module: &str) -> Result<String> {
        match self {
            OperationResult::Success { body } => Ok(body),
            OperationResult::Failure(failure) => Err(Error::Operation {
                module: module.to_string(),
                failure,
            }),
        }
    }
}

/// One body-sniffing rule. `check` returns the failure code and message
/// when the rule fires.
pub struct Rule {
    pub name: &'static str,
    pub check: fn(&str) -> Option<(FailureCode, String)>,
}

fn field_error_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"onload="FieldError\(.*?'\w+', '(.*?)'"#)
            .expect("field error pattern is valid")
    })
}

fn upload_done_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"window\.close\(\);\s*</script>").expect("upload marker pattern is valid")
    })
}

fn field_error(body: &str) -> Option<(FailureCode, String)> {
    let message = field_error_pattern().captures(body)?.get(1)?.as_str();
    Some((FailureCode::FieldError, message.to_string()))
}

fn signed_out(body: &str) -> Option<(FailureCode, String)> {
    body.contains(SIGN_IN_MARKER)
        .then(|| (FailureCode::SignedOut, "You were signed out!".to_string()))
}

fn license_limit(body: &str) -> Option<(FailureCode, String)> {
    body.contains(LICENSE_MARKER)
        .then(|| (FailureCode::LicenseLimit, LICENSE_MARKER.to_string()))
}

fn upload_not_confirmed(body: &str) -> Option<(FailureCode, String)> {
    (!upload_done_pattern().is_match(body)).then(|| {
        (
            FailureCode::UnknownUploadError,
            "the admin panel did not confirm the upload".to_string(),
        )
    })
}

pub const UPLOAD_RULES: &[Rule] = &[
    Rule { name: "field-error", check: field_error },
    Rule { name: "signed-out", check: signed_out },
    Rule { name: "license-limit", check: license_limit },
    Rule { name: "upload-not-confirmed", check: upload_not_confirmed },
];

// The module-edit screen reports nothing but a lost session.
pub const UPDATE_RULES: &[Rule] = &[Rule { name: "signed-out", check: signed_out }];

pub fn classify(rules: &[Rule], body: String) -> OperationResult {
    for rule in rules {
        if let Some((code, message)) = (rule.check)(&body) {
            tracing::debug!(rule = rule.name, "response rule matched");
            return OperationResult::Failure(Failure { code, message, body });
        }
    }
    OperationResult::Success { body }
}

pub fn classify_upload(body: impl Into<String>) -> OperationResult {
    classify(UPLOAD_RULES, body.into())
}

pub fn classify_update(body: impl Into<String>) -> OperationResult {
    classify(UPDATE_RULES, body.into())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidRequest(format!("{} has no file name", path.display())))
}

pub fn upload_request(code: &str, path: &Path) -> Result<FormRequest> {
    let attachment = FileAttachment {
        source_path: path.to_path_buf(),
        filename: file_name(path)?,
        content_type: "application/octet-stream".into(),
    };
    Ok(FormRequest::new(ADMIN_PATH)
        .text("Screen", "FUPL")
        .text("Action", "FUPL")
        .text("Tab", "")
        .text("Have_Fields", "")
        .text("FileUpload_Form", "MODS")
        .text("FileUpload_Field", "Module_Module")
        .text("FileUpload_Type", "Module")
        .text("FileUpload_Data", code)
        .text("FileUpload_Overwrite", "Yes")
        .file("FileUpload_File", attachment)
        .text("mm9_imagepicker_imagepath_path_input", "")
        .text("GeneratedImage_Width", "")
        .text("GeneratedImage_Height", ""))
}

pub fn update_request(code: &str, path: &Path) -> Result<FormRequest> {
    Ok(FormRequest::new(ADMIN_PATH)
        .text("ItemModified", "0")
        .text("Have_Fields", "")
        .text("Action", "UMOD")
        .text("Button_AddMultiple", "0")
        .text("Edit_Module", code)
        .text("Module_Active", "1")
        .text("Module_Module", format!("modules/util/{}", file_name(path)?)))
}

fn report(logger: &Logger, outcome: &OperationResult, what: &str) {
    let Some(failure) = outcome.failure() else {
        return;
    };
    match failure.code {
        FailureCode::SignedOut => logger.warn(&failure.message),
        FailureCode::UnknownUploadError => logger.log_with(
            Level::Error,
            format!("Could not {what}: {}", failure.message),
            Some(serde_json::json!({ "body": failure.body })),
        ),
        FailureCode::FieldError | FailureCode::LicenseLimit => {
            logger.error(format!("Could not {what}: {}", failure.message))
        }
    }
}

/// Upload a compiled module file, overwriting the stored copy.
pub fn upload_module<T: Transport>(
    session: &mut SessionManager<T>,
    code: &str,
    path: &Path,
) -> Result<OperationResult> {
    let logger = session.logger().child("Module Upload");
    logger.info(format!("Uploading {} to {code}...", path.display()));

    let request = upload_request(code, path)?;
    let what = format!("upload {} to {code}", path.display());
    let outcome = session.run_authenticated(|s| {
        let response = s.submit(&request, true)?;
        let outcome = classify_upload(response.body);
        report(&logger, &outcome, &what);
        Ok(outcome)
    })?;

    if outcome.is_success() {
        logger.info(format!("Uploaded {code}!"));
    }
    Ok(outcome)
}

/// Activate a module and point it at `modules/util/<file name>`.
pub fn update_module<T: Transport>(
    session: &mut SessionManager<T>,
    code: &str,
    path: &Path,
) -> Result<OperationResult> {
    let logger = session.logger().child("Module Update");
    logger.info(format!("Updating {code}..."));

    let request = update_request(code, path)?;
    let what = format!("update {code}");
    let outcome = session.run_authenticated(|s| {
        let response = s.submit(&request, true)?;
        let outcome = classify_update(response.body);
        report(&logger, &outcome, &what);
        Ok(outcome)
    })?;

    if outcome.is_success() {
        logger.info(format!("Updated {code}!"));
    }
    Ok(outcome)
}

/// Upload, then update only if the upload went through.
pub fn deploy_module<T: Transport>(
    session: &mut SessionManager<T>,
    code: &str,
    path: &Path,
) -> Result<OperationResult> {
    let uploaded = upload_module(session, code, path)?;
    if !uploaded.is_success() {
        return Ok(uploaded);
    }
    update_module(session, code, path)
}
