use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{Backend, Method, Multipart, unwrap_data};
use crate::notify::message_from_value;
use crate::resources::{Envelope, Resource, decode_items};
use crate::text;

pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "avif", "bmp", "svg"];
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
const SYMBOL_PATTERN: &str = r"[^A-Za-z0-9_\s]";

#[derive(Debug, Error)]
pub enum FormError {
    #[error("{0} field(s) failed validation")]
    Invalid(usize),

    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("`{0}` is not an attachment field")]
    NotAttachment(String),

    #[error("{0}")]
    Rejected(String),
}

/// What an upload endpoint answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadReply {
    /// The stored filename as a bare string.
    Filename,
    /// `{ "data": { "url": "/images/..." } }`, made absolute against the asset host.
    DataUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upload {
    pub path: &'static str,
    pub part: &'static str,
    pub reply: UploadReply,
    pub image_only: bool,
    pub max_bytes: Option<u64>,
}

/// Where a reference field gets its choices from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefSource {
    pub path: &'static str,
    pub envelope: Envelope,
    pub id_keys: &'static [&'static str],
    pub label_key: &'static str,
}

pub type Choices = &'static [(&'static str, &'static str)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Multiline,
    Email,
    Password,
    Number,
    Date,
    DateTime,
    Select(Choices),
    /// A select whose values go over the wire as numbers.
    NumericSelect(Choices),
    Reference(RefSource),
    Flag,
    Tags,
    /// Uploaded on its own; the field holds what the upload returned.
    Attachment(Upload),
    /// A local file sent as part of a multipart submit.
    File,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Multiline => "multiline",
            FieldKind::Email => "email",
            FieldKind::Password => "password",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime",
            FieldKind::Select(_) | FieldKind::NumericSelect(_) => "select",
            FieldKind::Reference(_) => "reference",
            FieldKind::Flag => "flag",
            FieldKind::Tags => "tags",
            FieldKind::Attachment(_) => "attachment",
            FieldKind::File => "file",
        }
    }

    pub fn choices(&self) -> Option<Choices> {
        match self {
            FieldKind::Select(c) | FieldKind::NumericSelect(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derive {
    Slug(&'static str),
    Copy(&'static str),
}

impl Derive {
    fn source(&self) -> &'static str {
        match self {
            Derive::Slug(s) | Derive::Copy(s) => s,
        }
    }

    fn apply(&self, source_value: &str) -> String {
        match self {
            Derive::Slug(_) => text::slugify(source_value),
            Derive::Copy(_) => source_value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: &'static str,
    pub derive: Option<Derive>,
}

impl FieldSpec {
    pub const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            default: "",
            derive: None,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn default(mut self, value: &'static str) -> Self {
        self.default = value;
        self
    }

    pub const fn derive(mut self, derive: Derive) -> Self {
        self.derive = Some(derive);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Edit(i64),
}

/// A form bound to one record of one resource.
#[derive(Debug, Clone)]
pub struct EditDialog {
    title: &'static str,
    schema: &'static [FieldSpec],
    mode: Mode,
    values: BTreeMap<&'static str, String>,
    errors: BTreeMap<&'static str, String>,
    banner: Option<String>,
    open: bool,
}

fn input_value(kind: &FieldKind, value: &Value) -> String {
    let raw = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    };
    match kind {
        FieldKind::Password | FieldKind::File => String::new(),
        FieldKind::Date => text::to_date_input(&raw),
        FieldKind::DateTime => text::to_datetime_input(&raw),
        _ => raw,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "" | "false" | "0" | "no" | "off" => Some(false),
        "true" | "1" | "yes" | "on" => Some(true),
        _ => None,
    }
}

fn number_value(value: &str) -> Option<Value> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(Value::Number(n.into()));
    }
    value
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn password_problem(value: &str) -> Option<&'static str> {
    if value.chars().count() < 6 {
        return Some("Min 6 chars");
    }
    let has_upper = value.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    let has_symbol = Regex::new(SYMBOL_PATTERN)
        .map(|re| re.is_match(value))
        .unwrap_or(false);
    if has_upper && has_digit && has_symbol {
        None
    } else {
        Some("Weak password")
    }
}

impl EditDialog {
    pub fn create<R: Resource>() -> Self {
        let schema = R::schema();
        let values = schema
            .iter()
            .map(|spec| (spec.name, spec.default.to_string()))
            .collect();
        Self {
            title: R::TITLE,
            schema,
            mode: Mode::Create,
            values,
            errors: BTreeMap::new(),
            banner: None,
            open: true,
        }
    }

    pub fn edit<R: Resource>(record: &R) -> Self {
        let schema = R::schema();
        let source = serde_json::to_value(record).unwrap_or(Value::Null);
        let values = schema
            .iter()
            .map(|spec| {
                let value = source.get(spec.name).unwrap_or(&Value::Null);
                (spec.name, input_value(&spec.kind, value))
            })
            .collect();
        Self {
            title: R::TITLE,
            schema,
            mode: Mode::Edit(record.id()),
            values,
            errors: BTreeMap::new(),
            banner: None,
            open: true,
        }
    }

    pub fn heading(&self) -> String {
        match self.mode {
            Mode::Create => format!("Add {}", self.title),
            Mode::Edit(id) => format!("Edit {} #{}", self.title, id),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_edit(&self) -> bool {
        matches!(self.mode, Mode::Edit(_))
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.schema
    }

    fn spec(&self, name: &str) -> Result<&'static FieldSpec, FormError> {
        self.schema
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))
    }

    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    /// Sets a field. Fields derived from it follow along while they are blank
    /// or still hold the previously derived value.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        let spec = self.spec(name)?;
        let previous = self.value(spec.name).to_string();
        for dependent in self.schema {
            let Some(derive) = dependent.derive else { continue };
            if derive.source() != spec.name {
                continue;
            }
            let current = self.value(dependent.name);
            if current.is_empty() || current == derive.apply(&previous) {
                self.values.insert(dependent.name, derive.apply(value));
            }
        }
        self.values.insert(spec.name, value.to_string());
        self.errors.remove(spec.name);
        Ok(())
    }

    pub fn error(&self, name: &str) -> Option<&str> {
        self.errors.get(name).map(String::as_str)
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn set_banner(&mut self, message: impl Into<String>) {
        self.banner = Some(message.into());
    }

    fn check(&self, spec: &FieldSpec) -> Option<&'static str> {
        let value = self.value(spec.name).trim();
        let creating = self.mode == Mode::Create;

        if value.is_empty() {
            let required = match spec.kind {
                FieldKind::Password => spec.required && creating,
                FieldKind::Flag => false,
                _ => spec.required,
            };
            return required.then_some("Required");
        }

        match spec.kind {
            FieldKind::Email => {
                let valid = Regex::new(EMAIL_PATTERN)
                    .map(|re| re.is_match(value))
                    .unwrap_or(false);
                (!valid).then_some("Invalid email")
            }
            FieldKind::Number | FieldKind::Reference(_) => {
                number_value(value).is_none().then_some("Must be a number")
            }
            FieldKind::Password if creating => password_problem(value),
            FieldKind::Date => text::parse_date(value).is_none().then_some("Invalid date"),
            FieldKind::DateTime => text::parse_timestamp(value)
                .is_none()
                .then_some("Invalid date"),
            FieldKind::NumericSelect(choices) => {
                (!choices.iter().any(|(v, _)| *v == value)).then_some("Not an option")
            }
            FieldKind::Flag => parse_flag(value).is_none().then_some("Must be true or false"),
            _ => None,
        }
    }

    /// Re-validates every field. A failing form must not be submitted.
    pub fn validate(&mut self) -> Result<(), FormError> {
        self.errors.clear();
        for spec in self.schema {
            if let Some(problem) = self.check(spec) {
                self.errors.insert(spec.name, problem.to_string());
            }
        }
        if self.errors.is_empty() {
            Ok(())
        } else {
            debug!(form = self.title, errors = self.errors.len(), "form rejected");
            Err(FormError::Invalid(self.errors.len()))
        }
    }

    /// The JSON body for a create or update request.
    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        for spec in self.schema {
            let value = self.value(spec.name).trim();
            let shaped = match spec.kind {
                FieldKind::File => continue,
                FieldKind::Password if value.is_empty() && self.is_edit() => continue,
                FieldKind::Number | FieldKind::Reference(_) | FieldKind::NumericSelect(_) => {
                    number_value(value).unwrap_or(Value::Null)
                }
                FieldKind::DateTime => text::to_mysql_datetime(value)
                    .map(Value::String)
                    .unwrap_or(Value::Null),
                FieldKind::Date => text::parse_date(value)
                    .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(Value::Null),
                FieldKind::Tags => Value::Array(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(|t| Value::String(t.to_string()))
                        .collect(),
                ),
                FieldKind::Flag => Value::Bool(parse_flag(value).unwrap_or(false)),
                _ => Value::String(value.to_string()),
            };
            body.insert(spec.name.to_string(), shaped);
        }
        if let Mode::Edit(id) = self.mode {
            body.insert("id".to_string(), Value::Number(id.into()));
        }
        Value::Object(body)
    }

    /// Text parts for every plain field plus the first selected local file.
    pub fn multipart(&self, part: &str) -> Multipart {
        let mut form = Multipart::default();
        for spec in self.schema {
            let value = self.value(spec.name).trim();
            match spec.kind {
                FieldKind::File => {
                    if !value.is_empty() && form.file.is_none() {
                        form.file = Some((part.to_string(), value.into()));
                    }
                }
                FieldKind::Password if value.is_empty() => {}
                _ => form.text.push((spec.name.to_string(), value.to_string())),
            }
        }
        form
    }

    /// Uploads `path` to the field's upload endpoint and stores the returned
    /// filename or URL. Local checks reject with an error; a failed upload
    /// leaves the field unchanged and returns `Ok(false)`.
    pub fn attach(
        &mut self,
        backend: &dyn Backend,
        field: &str,
        path: &Path,
        asset_base: &str,
    ) -> Result<bool, FormError> {
        let spec = self.spec(field)?;
        let FieldKind::Attachment(upload) = spec.kind else {
            return Err(FormError::NotAttachment(field.to_string()));
        };

        if upload.image_only && !is_image(path) {
            return Err(FormError::Rejected("Please choose an image file".to_string()));
        }
        if let Some(max) = upload.max_bytes {
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            if size > max {
                return Err(FormError::Rejected(format!(
                    "Image must not exceed {} MB",
                    max / (1024 * 1024)
                )));
            }
        }

        let reply = match backend.multipart(Method::Post, upload.path, Multipart::file(upload.part, path)) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(field, path = %path.display(), error = %e, "upload failed");
                return Ok(false);
            }
        };

        let stored = match upload.reply {
            UploadReply::Filename => message_from_value(&reply),
            UploadReply::DataUrl => unwrap_data(reply)
                .get("url")
                .and_then(Value::as_str)
                .map(|url| format!("{}{}", asset_base.trim_end_matches('/'), url))
                .unwrap_or_default(),
        };
        if stored.is_empty() {
            warn!(field, "upload returned no filename");
            return Ok(false);
        }
        self.values.insert(spec.name, stored);
        Ok(true)
    }
}

/// Choices for a reference field as `(id, label)`. A failed fetch yields no
/// choices.
pub fn load_options(backend: &dyn Backend, source: &RefSource) -> Vec<(String, String)> {
    let body = match backend.get(source.path) {
        Ok(body) => body,
        Err(e) => {
            warn!(path = source.path, error = %e, "failed to load options");
            return Vec::new();
        }
    };
    let items = match decode_items::<Value>(body, source.envelope) {
        Ok(items) => items,
        Err(e) => {
            warn!(path = source.path, error = %e, "failed to decode options");
            return Vec::new();
        }
    };
    items
        .iter()
        .filter_map(|item| {
            let id = source
                .id_keys
                .iter()
                .find_map(|k| item.get(*k).filter(|v| !v.is_null()))?;
            let id = input_value(&FieldKind::Text, id);
            let label = item
                .get(source.label_key)
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            Some((id, label))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::api::fake::FakeBackend;
    use crate::models::{Apply, Job, Picture, Post, User};
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_required_and_email_rules() {
        let mut form = EditDialog::create::<User>();
        form.set("email", "not-an-email").unwrap();
        assert!(matches!(form.validate(), Err(FormError::Invalid(_))));
        assert_eq!(form.error("name"), Some("Required"));
        assert_eq!(form.error("email"), Some("Invalid email"));
        assert_eq!(form.error("password"), Some("Required"));
    }

    #[test]
    fn test_password_strength_on_create_only() {
        let mut form = EditDialog::create::<User>();
        form.set("name", "Lan").unwrap();
        form.set("email", "lan@sdu.vn").unwrap();

        form.set("password", "Ab1!").unwrap();
        assert!(form.validate().is_err());
        assert_eq!(form.error("password"), Some("Min 6 chars"));

        form.set("password", "abcdef1!").unwrap();
        assert!(form.validate().is_err());
        assert_eq!(form.error("password"), Some("Weak password"));

        form.set("password", "Abcdef1!").unwrap();
        assert!(form.validate().is_ok());

        let user = User {
            id: 4,
            name: Some("Lan".into()),
            email: Some("lan@sdu.vn".into()),
            ..User::default()
        };
        let mut edit = EditDialog::edit(&user);
        assert_eq!(edit.value("password"), "");
        assert!(edit.validate().is_ok());
        let payload = edit.payload();
        assert!(payload.get("password").is_none());
        assert_eq!(payload["id"], json!(4));
    }

    #[test]
    fn test_job_payload_shapes_numbers_and_dates() {
        let job = Job {
            id: 42,
            name_job: Some("Backend Developer".into()),
            id_company: Some(3),
            id_field: Some(1),
            id_province: Some(79),
            salary_min: Some(1000),
            deadline: Some("2024-06-30T17:00:00.000Z".into()),
            status: Some(0),
            ..Job::default()
        };
        let mut form = EditDialog::edit(&job);
        assert_eq!(form.value("deadline"), "2024-06-30T17:00");
        form.set("salaryMax", "").unwrap();
        form.set("status", "1").unwrap();
        assert!(form.validate().is_ok());

        let payload = form.payload();
        assert_eq!(payload["salaryMin"], json!(1000));
        assert_eq!(payload["salaryMax"], Value::Null);
        assert_eq!(payload["status"], json!(1));
        assert_eq!(payload["deadline"], json!("2024-06-30 17:00:00"));
        assert_eq!(payload["id"], json!(42));
    }

    #[test]
    fn test_reference_must_be_numeric() {
        let mut form = EditDialog::create::<Apply>();
        form.set("idUser", "abc").unwrap();
        assert!(form.validate().is_err());
        assert_eq!(form.error("idUser"), Some("Must be a number"));
        assert_eq!(form.error("idJob"), Some("Required"));
    }

    #[test]
    fn test_unknown_field() {
        let mut form = EditDialog::create::<User>();
        assert!(matches!(form.set("nope", "x"), Err(FormError::UnknownField(_))));
    }

    #[test]
    fn test_post_slug_and_meta_title_follow_title() {
        let mut form = EditDialog::create::<Post>();
        assert_eq!(form.value("category"), "career-guide");
        assert_eq!(form.value("status"), "draft");

        form.set("title", "Hướng dẫn viết CV").unwrap();
        assert_eq!(form.value("slug"), "huong-dan-viet-cv");
        assert_eq!(form.value("meta_title"), "Hướng dẫn viết CV");

        form.set("slug", "custom-slug").unwrap();
        form.set("title", "Phỏng vấn").unwrap();
        assert_eq!(form.value("slug"), "custom-slug");
        assert_eq!(form.value("meta_title"), "Phỏng vấn");

        form.set("tags", "cv, interview,").unwrap();
        form.set("content", "<p>Body</p>").unwrap();
        assert!(form.validate().is_ok());
        assert_eq!(form.payload()["tags"], json!(["cv", "interview"]));
        assert_eq!(form.payload()["is_featured"], json!(false));
    }

    #[test]
    fn test_attach_stores_returned_filename() {
        let backend = FakeBackend::new();
        backend.on("POST", "/uploadFile", Ok(json!("1700000000cv.pdf")));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF").unwrap();

        let mut form = EditDialog::create::<Apply>();
        assert!(form.attach(&backend, "cv", file.path(), "http://localhost:8800").unwrap());
        assert_eq!(form.value("cv"), "1700000000cv.pdf");
    }

    #[test]
    fn test_attach_failure_is_swallowed() {
        let backend = FakeBackend::new();
        backend.on(
            "POST",
            "/upload",
            Err(ApiError::Status { status: 500, body: json!("disk full") }),
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("me.png");
        std::fs::write(&path, b"png").unwrap();

        let mut form = EditDialog::create::<User>();
        assert!(!form.attach(&backend, "avatarPic", &path, "").unwrap());
        assert_eq!(form.value("avatarPic"), "");
    }

    #[test]
    fn test_post_image_checks_and_url() {
        let backend = FakeBackend::new();
        backend.on("POST", "/posts/upload/image", Ok(json!({"data": {"url": "/images/posts/a.png"}})));
        let dir = tempfile::tempdir().unwrap();

        let text_file = dir.path().join("notes.txt");
        std::fs::write(&text_file, b"hi").unwrap();
        let mut form = EditDialog::create::<Post>();
        assert!(matches!(
            form.attach(&backend, "featured_image", &text_file, "http://localhost:8800"),
            Err(FormError::Rejected(_))
        ));
        assert_eq!(backend.call_count(), 0);

        let big = dir.path().join("big.jpg");
        std::fs::write(&big, vec![0u8; (MAX_IMAGE_BYTES + 1) as usize]).unwrap();
        assert!(form.attach(&backend, "featured_image", &big, "").is_err());

        let image = dir.path().join("a.png");
        std::fs::write(&image, b"png").unwrap();
        assert!(form.attach(&backend, "featured_image", &image, "http://localhost:8800").unwrap());
        assert_eq!(form.value("featured_image"), "http://localhost:8800/images/posts/a.png");
    }

    #[test]
    fn test_picture_multipart_parts() {
        let mut form = EditDialog::create::<Picture>();
        form.set("title", "Banner").unwrap();
        form.set("file", "/tmp/banner.png").unwrap();
        let parts = form.multipart("file");
        assert_eq!(parts.text, vec![("title".to_string(), "Banner".to_string())]);
        assert_eq!(parts.file, Some(("file".to_string(), "/tmp/banner.png".into())));
    }

    #[test]
    fn test_load_options_degrades_to_empty() {
        let source = RefSource {
            path: "/fields",
            envelope: Envelope::Bare,
            id_keys: &["fId", "id"],
            label_key: "name",
        };
        let backend = FakeBackend::new();
        backend.on("GET", "/fields", Ok(json!([{"fId": 1, "name": "IT"}, {"id": "2", "name": "Sales"}])));
        assert_eq!(
            load_options(&backend, &source),
            vec![("1".to_string(), "IT".to_string()), ("2".to_string(), "Sales".to_string())]
        );

        let failing = FakeBackend::new();
        failing.fail("GET", "/fields", 500, Value::Null);
        assert!(load_options(&failing, &source).is_empty());
    }
}
