use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// The backend is loose with types: ids and statuses arrive as numbers or as
// numeric strings, and optional text may be null.

fn flexible_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn flexible_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(flexible_i64(deserializer)?.unwrap_or_default())
}

fn flexible_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or_default(),
        _ => 0.0,
    })
}

fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(Value::String(s)) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    })
}

/// Tags come back either as an array or as a JSON-encoded string.
fn tag_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => match serde_json::from_str::<Vec<String>>(&s) {
            Ok(tags) => tags,
            Err(_) => s
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        },
        _ => Vec::new(),
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct User {
    #[serde(deserialize_with = "flexible_id")]
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(deserialize_with = "flexible_string")]
    pub phone: Option<String>,
    pub address: Option<String>,
    pub avatar_pic: Option<String>,
    pub birth_day: Option<String>,
    pub intro: Option<String>,
    pub link_social: Option<String>,
    pub sex: Option<String>,
    #[serde(deserialize_with = "flexible_i64")]
    pub id_province: Option<i64>,
    pub privilege: Option<String>, // "user", "admin"
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Company {
    #[serde(deserialize_with = "flexible_id")]
    pub id: i64,
    pub name_company: Option<String>,
    pub name_admin: Option<String>,
    pub email: Option<String>,
    #[serde(deserialize_with = "flexible_string")]
    pub phone: Option<String>,
    pub avatar_pic: Option<String>,
    #[serde(deserialize_with = "flexible_i64")]
    pub id_province: Option<i64>,
    pub province: Option<String>, // denormalized province name
    pub intro: Option<String>,
    pub scale: Option<String>,
    pub web: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Job {
    #[serde(deserialize_with = "flexible_id")]
    pub id: i64,
    #[serde(deserialize_with = "flexible_i64")]
    pub id_company: Option<i64>,
    #[serde(deserialize_with = "flexible_i64")]
    pub id_field: Option<i64>,
    #[serde(deserialize_with = "flexible_i64")]
    pub id_province: Option<i64>,
    pub name_job: Option<String>,
    pub name_company: Option<String>,
    pub request: Option<String>,
    pub desc: Option<String>,
    pub other: Option<String>,
    #[serde(deserialize_with = "flexible_i64")]
    pub salary_min: Option<i64>,
    #[serde(deserialize_with = "flexible_i64")]
    pub salary_max: Option<i64>,
    pub sex: Option<String>,
    pub type_work: Option<String>, // "fulltime", "parttime", "intern", "remote"
    pub education: Option<String>,
    pub experience: Option<String>,
    pub deadline: Option<String>,
    #[serde(deserialize_with = "flexible_i64")]
    pub status: Option<i64>, // 0 pending, 1 approved, 2 rejected
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Apply {
    #[serde(deserialize_with = "flexible_id")]
    pub id: i64,
    #[serde(alias = "user_id", deserialize_with = "flexible_i64")]
    pub id_user: Option<i64>,
    #[serde(alias = "job_id", deserialize_with = "flexible_i64")]
    pub id_job: Option<i64>,
    pub user_email: Option<String>,
    pub job_name: Option<String>,
    pub company_name: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(deserialize_with = "flexible_string")]
    pub phone: Option<String>,
    #[serde(deserialize_with = "flexible_i64")]
    pub status: Option<i64>, // 1 submitted, 2 viewed, 3 contacted, 4 rejected
    pub letter: Option<String>,
    pub cv: Option<String>,
    pub created_at: Option<String>,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Follow {
    #[serde(deserialize_with = "flexible_id")]
    pub id: i64,
    #[serde(alias = "user_id", deserialize_with = "flexible_i64")]
    pub id_user: Option<i64>,
    #[serde(alias = "company_id", deserialize_with = "flexible_i64")]
    pub id_company: Option<i64>,
    pub user_email: Option<String>,
    pub company_name: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Save {
    #[serde(deserialize_with = "flexible_id")]
    pub id: i64,
    #[serde(alias = "user_id", deserialize_with = "flexible_i64")]
    pub id_user: Option<i64>,
    #[serde(alias = "job_id", deserialize_with = "flexible_i64")]
    pub id_job: Option<i64>,
    pub user_email: Option<String>,
    pub job_name: Option<String>,
    pub company_name: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Field {
    #[serde(alias = "fId", deserialize_with = "flexible_id")]
    pub id: i64,
    pub name: Option<String>,
    pub type_field: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Province {
    #[serde(alias = "pId", deserialize_with = "flexible_id")]
    pub id: i64,
    pub name: Option<String>,
    pub name_with_type: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupItem {
    #[serde(deserialize_with = "flexible_id")]
    pub id: i64,
    pub category: String,
    #[serde(deserialize_with = "flexible_string")]
    pub item_id: Option<String>,
    pub name: Option<String>,
    #[serde(deserialize_with = "flexible_string")]
    pub value: Option<String>,
    pub label: Option<String>,
    pub link: Option<String>,
    pub icon: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Picture {
    #[serde(deserialize_with = "flexible_id")]
    pub id: i64,
    pub title: Option<String>,
    pub filename: Option<String>,
    pub file_path: Option<String>,
    pub url: Option<String>,
    #[serde(alias = "createdAt")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Post {
    #[serde(deserialize_with = "flexible_id")]
    pub id: i64,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub featured_image: Option<String>,
    pub category: Option<String>,
    #[serde(deserialize_with = "tag_list")]
    pub tags: Vec<String>,
    pub status: Option<String>, // "draft", "published", "archived"
    #[serde(deserialize_with = "flexible_bool")]
    pub is_featured: bool,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    #[serde(alias = "createdAt")]
    pub created_at: Option<String>,
}

/// One bucket of a pre-aggregated series, e.g. `{"label": "2024-05", "value": 12}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Point {
    #[serde(deserialize_with = "flexible_label")]
    pub label: String,
    #[serde(deserialize_with = "flexible_id")]
    pub value: i64,
}

fn flexible_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(flexible_string(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Totals {
    #[serde(deserialize_with = "flexible_f64")]
    pub users: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub companies: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub jobs_active: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub jobs_expired: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub jobs_expiring_soon: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub applies: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub saves: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub follows: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExpiringJob {
    pub name_job: Option<String>,
    pub name_company: Option<String>,
    pub deadline: Option<String>,
    #[serde(deserialize_with = "flexible_id")]
    pub days_left: i64,
}

/// Response of `GET /admin/stats`. Every series is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Stats {
    pub totals: Totals,
    pub totals_percent: Totals,
    pub users_monthly: Vec<Point>,
    pub companies_monthly: Vec<Point>,
    pub jobs_monthly: Vec<Point>,
    pub applies_monthly: Vec<Point>,
    pub users_daily: Vec<Point>,
    pub companies_daily: Vec<Point>,
    pub jobs_daily: Vec<Point>,
    pub jobs_by_field: Vec<Point>,
    pub jobs_by_province: Vec<Point>,
    pub expiring_jobs_list: Vec<ExpiringJob>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_accepts_string_numbers() {
        let job: Job = serde_json::from_value(json!({
            "id": "42",
            "nameJob": "Backend Developer",
            "status": "1",
            "salaryMin": 1000,
            "salaryMax": null
        }))
        .unwrap();
        assert_eq!(job.id, 42);
        assert_eq!(job.status, Some(1));
        assert_eq!(job.salary_min, Some(1000));
        assert_eq!(job.salary_max, None);
        assert_eq!(job.name_job.as_deref(), Some("Backend Developer"));
    }

    #[test]
    fn test_follow_accepts_snake_case_ids() {
        let follow: Follow = serde_json::from_value(json!({
            "id": 3, "user_id": 7, "company_id": 9, "userEmail": "a@b.vn"
        }))
        .unwrap();
        assert_eq!(follow.id_user, Some(7));
        assert_eq!(follow.id_company, Some(9));
    }

    #[test]
    fn test_post_tags_from_json_string() {
        let post: Post = serde_json::from_value(json!({
            "id": 1, "tags": "[\"cv\",\"interview\"]", "is_featured": 1
        }))
        .unwrap();
        assert_eq!(post.tags, vec!["cv", "interview"]);
        assert!(post.is_featured);

        let post: Post = serde_json::from_value(json!({"id": 2, "tags": ["a"]})).unwrap();
        assert_eq!(post.tags, vec!["a"]);
    }

    #[test]
    fn test_stats_missing_series_default_to_empty() {
        let stats: Stats = serde_json::from_value(json!({"totals": {"users": 5}})).unwrap();
        assert_eq!(stats.totals.users, 5.0);
        assert!(stats.jobs_monthly.is_empty());
        assert!(stats.expiring_jobs_list.is_empty());
    }
}
