use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::api::{ApiError, Backend, Method, unwrap_data};
use crate::form::{Choices, Derive, FieldKind, FieldSpec, RefSource, Upload, UploadReply, MAX_IMAGE_BYTES};
use crate::models::{Apply, Company, Field, Follow, Job, LookupItem, Picture, Post, Province, Save, User};
use crate::text::{format_date_display, format_salary, strip_html, truncate};

/// How a list endpoint wraps its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// A bare JSON array.
    Bare,
    /// `{ "data": [...] }`
    Data,
    /// `{ "data": { "<category>": [...] } }`
    Grouped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Write {
    pub method: Method,
    pub path: &'static str,
    pub id_in_path: bool,
    /// Submit as multipart with the form's file under this part name.
    pub multipart: Option<&'static str>,
}

impl Write {
    pub const fn json(method: Method, path: &'static str) -> Self {
        Self {
            method,
            path,
            id_in_path: false,
            multipart: None,
        }
    }

    pub const fn with_id(mut self) -> Self {
        self.id_in_path = true;
        self
    }

    pub const fn multipart(mut self, part: &'static str) -> Self {
        self.multipart = Some(part);
        self
    }

    pub fn url(&self, id: Option<i64>) -> String {
        match (self.id_in_path, id) {
            (true, Some(id)) => format!("{}{}", self.path, id),
            _ => self.path.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub list: &'static str,
    pub envelope: Envelope,
    pub create: Option<Write>,
    pub update: Option<Write>,
    /// Prefix; the record id is appended.
    pub delete: Option<&'static str>,
    pub detail: Option<&'static str>,
    pub approve: Option<&'static str>,
    pub reject: Option<&'static str>,
}

impl Endpoints {
    pub const fn list(path: &'static str, envelope: Envelope) -> Self {
        Self {
            list: path,
            envelope,
            create: None,
            update: None,
            delete: None,
            detail: None,
            approve: None,
            reject: None,
        }
    }

    pub const fn create(mut self, write: Write) -> Self {
        self.create = Some(write);
        self
    }

    pub const fn update(mut self, write: Write) -> Self {
        self.update = Some(write);
        self
    }

    pub const fn delete(mut self, prefix: &'static str) -> Self {
        self.delete = Some(prefix);
        self
    }

    pub const fn detail(mut self, prefix: &'static str) -> Self {
        self.detail = Some(prefix);
        self
    }

    pub const fn moderation(mut self, approve: &'static str, reject: &'static str) -> Self {
        self.approve = Some(approve);
        self.reject = Some(reject);
        self
    }
}

/// One entity the console manages: where it lives on the backend, how it is
/// searched and rendered, and what its edit form looks like.
pub trait Resource: DeserializeOwned + Serialize + Clone {
    /// Plural name used on the command line.
    const NAME: &'static str;
    /// Singular name used in messages and dialog titles.
    const TITLE: &'static str;

    fn endpoints() -> Endpoints;
    fn schema() -> &'static [FieldSpec];
    fn headers() -> &'static [&'static str];

    fn id(&self) -> i64;
    fn row(&self) -> Vec<String>;
    fn search_fields(&self) -> Vec<String>;

    fn sort_key(&self) -> String {
        self.search_fields().into_iter().next().unwrap_or_default()
    }

    fn facet(&self, _name: &str) -> Option<String> {
        None
    }

    fn list_path(_status: Option<i64>) -> String {
        Self::endpoints().list.to_string()
    }
}

fn flatten_groups(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        Value::Object(groups) => groups
            .into_iter()
            .flat_map(|(category, items)| {
                let items = match items {
                    Value::Array(items) => items,
                    _ => Vec::new(),
                };
                items.into_iter().map(move |mut item| {
                    if let Value::Object(map) = &mut item {
                        let missing = map
                            .get("category")
                            .and_then(Value::as_str)
                            .is_none_or(str::is_empty);
                        if missing {
                            map.insert("category".to_string(), Value::String(category.clone()));
                        }
                    }
                    item
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub fn decode_items<T: DeserializeOwned>(body: Value, envelope: Envelope) -> Result<Vec<T>, ApiError> {
    let items = match envelope {
        Envelope::Bare if body.is_array() => body,
        Envelope::Bare | Envelope::Data => unwrap_data(body),
        Envelope::Grouped => Value::Array(flatten_groups(unwrap_data(body))),
    };
    if items.is_null() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_value(items)?)
}

pub fn fetch_list<R: Resource>(backend: &dyn Backend, status: Option<i64>) -> Result<Vec<R>, ApiError> {
    let body = backend.get(&R::list_path(status))?;
    decode_items(body, R::endpoints().envelope)
}

/// The full record. Resources with a detail endpoint are fetched from it,
/// everything else is looked up in the list.
pub fn fetch_one<R: Resource>(backend: &dyn Backend, id: i64) -> Result<Option<R>, ApiError> {
    if let Some(prefix) = R::endpoints().detail {
        let body = backend.get(&format!("{}{}", prefix, id))?;
        let record = unwrap_data(body);
        if record.is_null() {
            return Ok(None);
        }
        return Ok(Some(serde_json::from_value(record)?));
    }
    Ok(fetch_list::<R>(backend, None)?
        .into_iter()
        .find(|r| r.id() == id))
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn opt_num(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub const JOB_STATUS: Choices = &[("0", "Pending"), ("1", "Approved"), ("2", "Rejected")];
pub const APPLY_STATUS: Choices = &[("1", "Submitted"), ("2", "Viewed"), ("3", "Contacted"), ("4", "Rejected")];
const SEX: Choices = &[("male", "Male"), ("female", "Female"), ("other", "Other")];
const PRIVILEGE: Choices = &[("user", "User"), ("admin", "Admin")];
const TYPE_WORK: Choices = &[
    ("fulltime", "Full-time"),
    ("parttime", "Part-time"),
    ("intern", "Intern"),
    ("remote", "Remote"),
];
const POST_CATEGORY: Choices = &[
    ("career-guide", "Career guide"),
    ("job-tips", "Job tips"),
    ("industry-insights", "Industry insights"),
];
const POST_STATUS: Choices = &[("draft", "Draft"), ("published", "Published"), ("archived", "Archived")];
const LOOKUP_CATEGORY: Choices = &[
    ("educationJob", "Education level"),
    ("experienceJob", "Work experience"),
    ("typeWorkJob", "Job type"),
    ("salaryJob", "Salary range"),
    ("locationJob", "Work location"),
    ("companySize", "Company size"),
    ("jobLevel", "Job level"),
    ("skillCategory", "Skill category"),
    ("industryType", "Industry"),
    ("workMode", "Work mode"),
    ("scale", "Company scale"),
    ("statusCompany", "Company CV status"),
    ("statusUser", "User CV status"),
    ("typeWorks", "Work types"),
    ("sexData", "Sex"),
];

fn label_of(choices: Choices, value: Option<i64>) -> String {
    let Some(value) = value else {
        return "-".to_string();
    };
    choices
        .iter()
        .find(|(v, _)| v.parse::<i64>().ok() == Some(value))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| format!("Unknown ({})", value))
}

pub fn job_status_label(status: Option<i64>) -> String {
    label_of(JOB_STATUS, status)
}

pub fn apply_status_label(status: Option<i64>) -> String {
    label_of(APPLY_STATUS, status)
}

/// `pending`, `approved`, `rejected` or the numeric code.
pub fn parse_job_status(value: &str) -> Option<i64> {
    match value.trim().to_lowercase().as_str() {
        "pending" | "0" => Some(0),
        "approved" | "1" => Some(1),
        "rejected" | "2" => Some(2),
        _ => None,
    }
}

const USERS_SOURCE: RefSource = RefSource {
    path: "/user/getAllUser",
    envelope: Envelope::Bare,
    id_keys: &["id"],
    label_key: "email",
};

const COMPANIES_SOURCE: RefSource = RefSource {
    path: "/company?limit=200",
    envelope: Envelope::Data,
    id_keys: &["id"],
    label_key: "nameCompany",
};

const JOBS_SOURCE: RefSource = RefSource {
    path: "/job?limit=200",
    envelope: Envelope::Data,
    id_keys: &["id"],
    label_key: "nameJob",
};

const PROVINCES_SOURCE: RefSource = RefSource {
    path: "/provinces",
    envelope: Envelope::Bare,
    id_keys: &["pId", "id"],
    label_key: "name",
};

const FIELDS_SOURCE: RefSource = RefSource {
    path: "/fields",
    envelope: Envelope::Bare,
    id_keys: &["fId", "id"],
    label_key: "name",
};

const AVATAR_UPLOAD: Upload = Upload {
    path: "/upload",
    part: "file",
    reply: UploadReply::Filename,
    image_only: true,
    max_bytes: None,
};

const CV_UPLOAD: Upload = Upload {
    path: "/uploadFile",
    part: "file",
    reply: UploadReply::Filename,
    image_only: false,
    max_bytes: None,
};

const POST_IMAGE_UPLOAD: Upload = Upload {
    path: "/posts/upload/image",
    part: "image",
    reply: UploadReply::DataUrl,
    image_only: true,
    max_bytes: Some(MAX_IMAGE_BYTES),
};

const USER_FORM: &[FieldSpec] = &[
    FieldSpec::new("name", "Name", FieldKind::Text).required(),
    FieldSpec::new("email", "Email", FieldKind::Email).required(),
    FieldSpec::new("password", "Password", FieldKind::Password).required(),
    FieldSpec::new("phone", "Phone", FieldKind::Text),
    FieldSpec::new("birthDay", "Birthday", FieldKind::Date),
    FieldSpec::new("sex", "Sex", FieldKind::Select(SEX)),
    FieldSpec::new("privilege", "Privilege", FieldKind::Select(PRIVILEGE)).default("user"),
    FieldSpec::new("avatarPic", "Avatar", FieldKind::Attachment(AVATAR_UPLOAD)),
    FieldSpec::new("linkSocial", "Social link", FieldKind::Text),
    FieldSpec::new("intro", "Intro", FieldKind::Multiline),
];

impl Resource for User {
    const NAME: &'static str = "users";
    const TITLE: &'static str = "User";

    fn endpoints() -> Endpoints {
        Endpoints::list("/user/getAllUser", Envelope::Bare)
            .create(Write::json(Method::Post, "/user/insertUser"))
            .update(Write::json(Method::Put, "/user/updateUserByAdmin"))
            .delete("/user/delete/")
    }

    fn schema() -> &'static [FieldSpec] {
        USER_FORM
    }

    fn headers() -> &'static [&'static str] {
        &["ID", "Name", "Email", "Phone", "Sex", "Privilege"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            truncate(&opt(&self.name), 24),
            truncate(&opt(&self.email), 30),
            opt(&self.phone),
            opt(&self.sex),
            self.privilege.clone().unwrap_or_else(|| "user".to_string()),
        ]
    }

    fn search_fields(&self) -> Vec<String> {
        vec![opt(&self.name), opt(&self.email), opt(&self.phone), opt(&self.address)]
    }
}

impl Resource for Company {
    const NAME: &'static str = "companies";
    const TITLE: &'static str = "Company";

    fn endpoints() -> Endpoints {
        Endpoints::list("/company", Envelope::Data).delete("/company/delete/")
    }

    fn schema() -> &'static [FieldSpec] {
        &[]
    }

    fn headers() -> &'static [&'static str] {
        &["ID", "Company", "Admin", "Email", "Province", "Scale"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            truncate(&opt(&self.name_company), 28),
            truncate(&opt(&self.name_admin), 20),
            truncate(&opt(&self.email), 28),
            opt(&self.province),
            opt(&self.scale),
        ]
    }

    fn search_fields(&self) -> Vec<String> {
        vec![opt(&self.name_company), opt(&self.name_admin), opt(&self.email)]
    }

    fn sort_key(&self) -> String {
        opt(&self.name_company)
    }

    fn facet(&self, name: &str) -> Option<String> {
        match name {
            "province" => self.province.clone(),
            "scale" => self.scale.clone(),
            _ => None,
        }
    }
}

/// Company-size choices as `(value, label)`. The backend catalog wins; the
/// built-in list is used when it cannot be fetched.
pub fn scale_options(backend: &dyn Backend) -> Vec<(String, String)> {
    match backend
        .get("/lookup-data/category/scale")
        .and_then(|body| decode_items::<LookupItem>(body, Envelope::Data))
    {
        Ok(items) => items
            .into_iter()
            .filter_map(|item| {
                let value = item.name?;
                let label = item.label.filter(|l| !l.is_empty()).unwrap_or_else(|| value.clone());
                Some((value, label))
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "scale catalog unavailable, using built-in list");
            [
                "ít hơn 10",
                "10 - 20",
                "20 - 100",
                "100 - 500",
                "500 - 1000",
                "1000 - 5000",
                "nhiều hơn 5000",
            ]
            .iter()
            .map(|v| (v.to_string(), format!("{} nhân viên", v)))
            .collect()
        }
    }
}

const JOB_FORM: &[FieldSpec] = &[
    FieldSpec::new("nameJob", "Job name", FieldKind::Text).required(),
    FieldSpec::new("idCompany", "Company", FieldKind::Reference(RefSource {
        path: "/company?limit=100",
        ..COMPANIES_SOURCE
    }))
    .required(),
    FieldSpec::new("idProvince", "Province", FieldKind::Reference(PROVINCES_SOURCE)).required(),
    FieldSpec::new("idField", "Field", FieldKind::Reference(FIELDS_SOURCE)).required(),
    FieldSpec::new("typeWork", "Type of work", FieldKind::Select(TYPE_WORK)),
    FieldSpec::new("salaryMin", "Salary min", FieldKind::Number),
    FieldSpec::new("salaryMax", "Salary max", FieldKind::Number),
    FieldSpec::new("request", "Requirements", FieldKind::Multiline),
    FieldSpec::new("desc", "Description", FieldKind::Multiline),
    FieldSpec::new("other", "Other", FieldKind::Multiline),
    FieldSpec::new("education", "Education", FieldKind::Text),
    FieldSpec::new("experience", "Experience", FieldKind::Text),
    FieldSpec::new("deadline", "Deadline", FieldKind::DateTime),
    FieldSpec::new("status", "Status", FieldKind::NumericSelect(JOB_STATUS)).default("0"),
    FieldSpec::new("sex", "Sex", FieldKind::Text),
];

impl Resource for Job {
    const NAME: &'static str = "jobs";
    const TITLE: &'static str = "Job";

    fn endpoints() -> Endpoints {
        Endpoints::list("/job", Envelope::Data)
            .create(Write::json(Method::Post, "/job/admin/insert"))
            .update(Write::json(Method::Put, "/job/admin/update"))
            .delete("/job/admin/delete/")
            .moderation("/job/admin/approve/", "/job/admin/reject/")
    }

    fn schema() -> &'static [FieldSpec] {
        JOB_FORM
    }

    fn headers() -> &'static [&'static str] {
        &["ID", "Title", "Company", "Type", "Salary", "Deadline", "Status"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            truncate(&opt(&self.name_job), 30),
            truncate(&opt(&self.name_company), 22),
            opt(&self.type_work),
            format_salary(self.salary_min, self.salary_max),
            format_date_display(&opt(&self.deadline)),
            job_status_label(self.status),
        ]
    }

    fn search_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            opt(&self.name_job),
            opt(&self.request),
            opt(&self.desc),
            opt(&self.other),
            opt_num(self.id_company),
            opt_num(self.id_field),
            opt_num(self.id_province),
            opt_num(self.salary_min),
            opt_num(self.salary_max),
            opt(&self.sex),
            opt(&self.type_work),
            opt(&self.education),
            opt(&self.experience),
        ]
    }

    fn sort_key(&self) -> String {
        opt(&self.name_job)
    }

    fn list_path(status: Option<i64>) -> String {
        match status {
            Some(status) => format!("/job?status={}&limit=100", status),
            None => "/job?limit=100".to_string(),
        }
    }
}

const APPLY_FORM: &[FieldSpec] = &[
    FieldSpec::new("idUser", "User", FieldKind::Reference(USERS_SOURCE)).required(),
    FieldSpec::new("idJob", "Job", FieldKind::Reference(JOBS_SOURCE)).required(),
    FieldSpec::new("name", "Name", FieldKind::Text).required(),
    FieldSpec::new("email", "Email", FieldKind::Email).required(),
    FieldSpec::new("phone", "Phone", FieldKind::Text).required(),
    FieldSpec::new("status", "Status", FieldKind::NumericSelect(APPLY_STATUS))
        .required()
        .default("1"),
    FieldSpec::new("cv", "CV file", FieldKind::Attachment(CV_UPLOAD)),
    FieldSpec::new("letter", "Letter", FieldKind::Multiline),
    FieldSpec::new("createdAt", "Created at", FieldKind::DateTime),
    FieldSpec::new("deletedAt", "Deleted at", FieldKind::DateTime),
];

impl Resource for Apply {
    const NAME: &'static str = "applies";
    const TITLE: &'static str = "Application";

    fn endpoints() -> Endpoints {
        Endpoints::list("/apply/admin?limit=200", Envelope::Data)
            .create(Write::json(Method::Post, "/apply/admin/insert"))
            .update(Write::json(Method::Put, "/apply/admin/update"))
            .delete("/apply/admin/delete/")
    }

    fn schema() -> &'static [FieldSpec] {
        APPLY_FORM
    }

    fn headers() -> &'static [&'static str] {
        &["ID", "Applicant", "Email", "Job", "Company", "Status", "CV", "Applied"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            truncate(&opt(&self.name), 20),
            truncate(&opt(&self.user_email), 26),
            truncate(&opt(&self.job_name), 24),
            truncate(&opt(&self.company_name), 20),
            apply_status_label(self.status),
            if self.cv.as_deref().is_some_and(|cv| !cv.is_empty()) { "yes" } else { "-" }.to_string(),
            format_date_display(&opt(&self.created_at)),
        ]
    }

    fn search_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            opt(&self.user_email),
            opt(&self.job_name),
            opt(&self.company_name),
            opt_num(self.id_user),
            opt_num(self.id_job),
        ]
    }

    fn sort_key(&self) -> String {
        opt(&self.user_email)
    }
}

const FOLLOW_FORM: &[FieldSpec] = &[
    FieldSpec::new("idUser", "User", FieldKind::Reference(USERS_SOURCE)).required(),
    FieldSpec::new("idCompany", "Company", FieldKind::Reference(COMPANIES_SOURCE)).required(),
    FieldSpec::new("createdAt", "Created at", FieldKind::DateTime),
];

impl Resource for Follow {
    const NAME: &'static str = "follows";
    const TITLE: &'static str = "Follow";

    fn endpoints() -> Endpoints {
        Endpoints::list("/follow/admin?limit=200", Envelope::Data)
            .create(Write::json(Method::Post, "/follow/admin/insert"))
            .update(Write::json(Method::Put, "/follow/admin/update"))
            .delete("/follow/admin/delete/")
    }

    fn schema() -> &'static [FieldSpec] {
        FOLLOW_FORM
    }

    fn headers() -> &'static [&'static str] {
        &["ID", "User", "Company", "Since"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            truncate(&opt(&self.user_email), 30),
            truncate(&opt(&self.company_name), 30),
            format_date_display(&opt(&self.created_at)),
        ]
    }

    fn search_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            opt(&self.user_email),
            opt(&self.company_name),
            opt_num(self.id_user),
            opt_num(self.id_company),
        ]
    }
}

const SAVE_FORM: &[FieldSpec] = &[
    FieldSpec::new("idUser", "User", FieldKind::Reference(USERS_SOURCE)).required(),
    FieldSpec::new("idJob", "Job", FieldKind::Reference(JOBS_SOURCE)).required(),
    FieldSpec::new("createdAt", "Created at", FieldKind::DateTime),
];

impl Resource for Save {
    const NAME: &'static str = "saves";
    const TITLE: &'static str = "Saved job";

    fn endpoints() -> Endpoints {
        Endpoints::list("/save/admin?limit=200", Envelope::Data)
            .create(Write::json(Method::Post, "/save/admin/insert"))
            .update(Write::json(Method::Put, "/save/admin/update"))
            .delete("/save/admin/delete/")
    }

    fn schema() -> &'static [FieldSpec] {
        SAVE_FORM
    }

    fn headers() -> &'static [&'static str] {
        &["ID", "User", "Job", "Company", "Saved"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            truncate(&opt(&self.user_email), 28),
            truncate(&opt(&self.job_name), 28),
            truncate(&opt(&self.company_name), 22),
            format_date_display(&opt(&self.created_at)),
        ]
    }

    fn search_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            opt(&self.user_email),
            opt(&self.job_name),
            opt(&self.company_name),
            opt_num(self.id_user),
            opt_num(self.id_job),
        ]
    }
}

const FIELD_FORM: &[FieldSpec] = &[
    FieldSpec::new("name", "Name", FieldKind::Text).required(),
    FieldSpec::new("typeField", "Type", FieldKind::Text),
];

impl Resource for Field {
    const NAME: &'static str = "fields";
    const TITLE: &'static str = "Field";

    fn endpoints() -> Endpoints {
        Endpoints::list("/fields/admin", Envelope::Bare)
            .create(Write::json(Method::Post, "/fields/admin/insert"))
            .update(Write::json(Method::Put, "/fields/admin/update"))
            .delete("/fields/admin/delete/")
    }

    fn schema() -> &'static [FieldSpec] {
        FIELD_FORM
    }

    fn headers() -> &'static [&'static str] {
        &["ID", "Name", "Type"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn row(&self) -> Vec<String> {
        vec![self.id.to_string(), opt(&self.name), opt(&self.type_field)]
    }

    fn search_fields(&self) -> Vec<String> {
        vec![opt(&self.name), opt(&self.type_field)]
    }
}

const PROVINCE_FORM: &[FieldSpec] = &[
    FieldSpec::new("name", "Name", FieldKind::Text).required(),
    FieldSpec::new("nameWithType", "Full name", FieldKind::Text),
    FieldSpec::new("type", "Type", FieldKind::Text),
];

impl Resource for Province {
    const NAME: &'static str = "provinces";
    const TITLE: &'static str = "Province";

    fn endpoints() -> Endpoints {
        Endpoints::list("/provinces/admin", Envelope::Bare)
            .create(Write::json(Method::Post, "/provinces/admin/insert"))
            .update(Write::json(Method::Put, "/provinces/admin/update"))
            .delete("/provinces/admin/delete/")
    }

    fn schema() -> &'static [FieldSpec] {
        PROVINCE_FORM
    }

    fn headers() -> &'static [&'static str] {
        &["ID", "Name", "Full name", "Type"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            opt(&self.name),
            opt(&self.name_with_type),
            opt(&self.kind),
        ]
    }

    fn search_fields(&self) -> Vec<String> {
        vec![opt(&self.name), opt(&self.kind)]
    }
}

const LOOKUP_FORM: &[FieldSpec] = &[
    FieldSpec::new("category", "Category", FieldKind::Select(LOOKUP_CATEGORY)).required(),
    FieldSpec::new("item_id", "Item id", FieldKind::Text).required(),
    FieldSpec::new("name", "Name", FieldKind::Text).required(),
    FieldSpec::new("value", "Value", FieldKind::Text),
    FieldSpec::new("label", "Label", FieldKind::Text),
    FieldSpec::new("link", "Link", FieldKind::Text),
    FieldSpec::new("icon", "Icon", FieldKind::Text),
    FieldSpec::new("text", "Text", FieldKind::Multiline),
];

impl Resource for LookupItem {
    const NAME: &'static str = "lookup";
    const TITLE: &'static str = "Lookup item";

    fn endpoints() -> Endpoints {
        Endpoints::list("/lookup-data/all", Envelope::Grouped)
            .create(Write::json(Method::Post, "/lookup-data/add"))
            .update(Write::json(Method::Put, "/lookup-data/update/").with_id())
            .delete("/lookup-data/delete/")
    }

    fn schema() -> &'static [FieldSpec] {
        LOOKUP_FORM
    }

    fn headers() -> &'static [&'static str] {
        &["ID", "Category", "Item", "Name", "Value", "Label"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.category.clone(),
            opt(&self.item_id),
            truncate(&opt(&self.name), 24),
            truncate(&opt(&self.value), 20),
            truncate(&opt(&self.label), 24),
        ]
    }

    fn search_fields(&self) -> Vec<String> {
        vec![
            opt(&self.name),
            opt(&self.value),
            opt(&self.label),
            opt(&self.item_id),
            self.category.clone(),
        ]
    }
}

const PICTURE_FORM: &[FieldSpec] = &[
    FieldSpec::new("title", "Title", FieldKind::Text),
    FieldSpec::new("file", "Image file", FieldKind::File),
];

impl Resource for Picture {
    const NAME: &'static str = "pictures";
    const TITLE: &'static str = "Picture";

    fn endpoints() -> Endpoints {
        Endpoints::list("/pictures", Envelope::Bare)
            .create(Write::json(Method::Post, "/pictures/add").multipart("file"))
            .update(Write::json(Method::Put, "/pictures/update/").with_id().multipart("file"))
            .delete("/pictures/delete/")
    }

    fn schema() -> &'static [FieldSpec] {
        PICTURE_FORM
    }

    fn headers() -> &'static [&'static str] {
        &["ID", "Title", "File", "Uploaded"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            truncate(&opt(&self.title), 30),
            truncate(&opt(&self.filename), 30),
            format_date_display(&opt(&self.created_at)),
        ]
    }

    fn search_fields(&self) -> Vec<String> {
        vec![opt(&self.title), opt(&self.filename)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnippetKind {
    Link,
    Html,
}

pub fn picture_url(picture: &Picture, api_url: &str) -> String {
    match picture.url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => url.to_string(),
        None => format!(
            "{}/images/posts/{}",
            api_url.trim_end_matches('/'),
            picture.file_path.as_deref().unwrap_or("")
        ),
    }
}

/// Text to paste into a post body: the bare URL or an `<img>` tag.
pub fn picture_snippet(picture: &Picture, api_url: &str, kind: SnippetKind, width: u32, height: u32) -> String {
    let url = picture_url(picture, api_url);
    match kind {
        SnippetKind::Link => url,
        SnippetKind::Html => {
            let alt = picture.title.as_deref().filter(|t| !t.is_empty()).unwrap_or("Image");
            format!(
                r#"<img src="{}" alt="{}" width="{}" height="{}" style="object-fit: cover;" />"#,
                url, alt, width, height
            )
        }
    }
}

const POST_FORM: &[FieldSpec] = &[
    FieldSpec::new("title", "Title", FieldKind::Text).required(),
    FieldSpec::new("slug", "Slug", FieldKind::Text)
        .required()
        .derive(Derive::Slug("title")),
    FieldSpec::new("excerpt", "Excerpt", FieldKind::Multiline),
    FieldSpec::new("content", "Content", FieldKind::Multiline).required(),
    FieldSpec::new("featured_image", "Featured image", FieldKind::Attachment(POST_IMAGE_UPLOAD)),
    FieldSpec::new("category", "Category", FieldKind::Select(POST_CATEGORY)).default("career-guide"),
    FieldSpec::new("tags", "Tags", FieldKind::Tags),
    FieldSpec::new("status", "Status", FieldKind::Select(POST_STATUS)).default("draft"),
    FieldSpec::new("is_featured", "Featured", FieldKind::Flag).default("false"),
    FieldSpec::new("meta_title", "Meta title", FieldKind::Text).derive(Derive::Copy("title")),
    FieldSpec::new("meta_description", "Meta description", FieldKind::Multiline),
];

impl Resource for Post {
    const NAME: &'static str = "posts";
    const TITLE: &'static str = "Post";

    fn endpoints() -> Endpoints {
        Endpoints::list("/posts?limit=50", Envelope::Data)
            .create(Write::json(Method::Post, "/posts/admin"))
            .update(Write::json(Method::Put, "/posts/admin/").with_id())
            .delete("/posts/admin/")
            .detail("/posts/admin/")
    }

    fn schema() -> &'static [FieldSpec] {
        POST_FORM
    }

    fn headers() -> &'static [&'static str] {
        &["ID", "Title", "Category", "Status", "Featured", "Created"]
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            truncate(&opt(&self.title), 36),
            opt(&self.category),
            opt(&self.status),
            if self.is_featured { "yes" } else { "-" }.to_string(),
            format_date_display(&opt(&self.created_at)),
        ]
    }

    fn search_fields(&self) -> Vec<String> {
        let mut fields = vec![
            opt(&self.title),
            strip_html(&opt(&self.excerpt)),
            opt(&self.category),
        ];
        fields.extend(self.tags.iter().cloned());
        fields
    }

    fn sort_key(&self) -> String {
        opt(&self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeBackend;
    use serde_json::json;

    #[test]
    fn test_grouped_lookup_is_flattened_with_category() {
        let body = json!({"data": {
            "scale": [{"id": 1, "name": "10 - 20", "label": "10 - 20 nhân viên"}],
            "sexData": [{"id": 2, "name": "male", "category": "sexData"}]
        }});
        let items: Vec<LookupItem> = decode_items(body, Envelope::Grouped).unwrap();
        assert_eq!(items.len(), 2);
        let scale = items.iter().find(|i| i.id == 1).unwrap();
        assert_eq!(scale.category, "scale");
        assert!(scale.search_fields().contains(&"scale".to_string()));
    }

    #[test]
    fn test_decode_items_envelopes() {
        let users: Vec<User> = decode_items(json!([{"id": 1}]), Envelope::Bare).unwrap();
        assert_eq!(users.len(), 1);
        let jobs: Vec<Job> = decode_items(json!({"data": [{"id": 1}, {"id": 2}]}), Envelope::Data).unwrap();
        assert_eq!(jobs.len(), 2);
        let none: Vec<Job> = decode_items(json!({"data": null}), Envelope::Data).unwrap();
        assert!(none.is_empty());
        assert!(decode_items::<Job>(json!("oops"), Envelope::Data).is_err());
    }

    #[test]
    fn test_job_list_path_carries_status() {
        assert_eq!(Job::list_path(None), "/job?limit=100");
        assert_eq!(Job::list_path(Some(0)), "/job?status=0&limit=100");
        assert_eq!(parse_job_status("Approved"), Some(1));
        assert_eq!(parse_job_status("closed"), None);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(job_status_label(Some(0)), "Pending");
        assert_eq!(job_status_label(Some(7)), "Unknown (7)");
        assert_eq!(apply_status_label(Some(3)), "Contacted");
        assert_eq!(apply_status_label(None), "-");
    }

    #[test]
    fn test_write_url_appends_id_only_when_in_path() {
        let update = LookupItem::endpoints().update.unwrap();
        assert_eq!(update.url(Some(9)), "/lookup-data/update/9");
        let update = Job::endpoints().update.unwrap();
        assert_eq!(update.url(Some(9)), "/job/admin/update");
        assert!(Company::endpoints().create.is_none());
    }

    #[test]
    fn test_scale_options_fallback() {
        let backend = FakeBackend::new();
        backend.fail("GET", "/lookup-data/category/scale", 500, Value::Null);
        let options = scale_options(&backend);
        assert_eq!(options.len(), 7);
        assert_eq!(options[0], ("ít hơn 10".to_string(), "ít hơn 10 nhân viên".to_string()));

        let backend = FakeBackend::new();
        backend.on(
            "GET",
            "/lookup-data/category/scale",
            Ok(json!({"data": [{"id": 1, "name": "10 - 20", "label": ""}, {"id": 2, "name": "20 - 100", "label": "Medium"}]})),
        );
        assert_eq!(
            scale_options(&backend),
            vec![
                ("10 - 20".to_string(), "10 - 20".to_string()),
                ("20 - 100".to_string(), "Medium".to_string()),
            ]
        );
    }

    #[test]
    fn test_picture_snippets() {
        let picture = Picture {
            id: 1,
            title: Some("Banner".into()),
            file_path: Some("banner.png".into()),
            ..Picture::default()
        };
        let api = "http://localhost:8800/api";
        assert_eq!(
            picture_snippet(&picture, api, SnippetKind::Link, 300, 200),
            "http://localhost:8800/api/images/posts/banner.png"
        );
        assert_eq!(
            picture_snippet(&picture, api, SnippetKind::Html, 300, 200),
            r#"<img src="http://localhost:8800/api/images/posts/banner.png" alt="Banner" width="300" height="200" style="object-fit: cover;" />"#
        );

        let hosted = Picture {
            url: Some("https://cdn.example.com/x.png".into()),
            ..Picture::default()
        };
        assert_eq!(
            picture_snippet(&hosted, api, SnippetKind::Html, 10, 20),
            r#"<img src="https://cdn.example.com/x.png" alt="Image" width="10" height="20" style="object-fit: cover;" />"#
        );
    }

    #[test]
    fn test_fetch_one_prefers_detail_endpoint() {
        let backend = FakeBackend::new();
        backend.on("GET", "/posts/admin/3", Ok(json!({"data": {"id": 3, "title": "Full", "tags": "[\"a\"]"}})));
        let post = fetch_one::<Post>(&backend, 3).unwrap().unwrap();
        assert_eq!(post.title.as_deref(), Some("Full"));
        assert_eq!(post.tags, vec!["a"]);

        backend.on("GET", "/fields/admin", Ok(json!([{"fId": 1, "name": "IT"}, {"fId": 2, "name": "Sales"}])));
        let field = fetch_one::<Field>(&backend, 2).unwrap().unwrap();
        assert_eq!(field.name.as_deref(), Some("Sales"));
        assert!(fetch_one::<Field>(&backend, 9).unwrap().is_none());
    }
}
