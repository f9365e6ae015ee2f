use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::api::{ApiError, Backend};
use crate::controller::Confirm;
use crate::models::Apply;

#[derive(Debug, Error)]
pub enum BulkError {
    #[error("select at least one application")]
    NothingSelected,

    #[error("subject and content are both required")]
    MissingMailFields,

    #[error("none of the selected applications has a CV")]
    NoCvs,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The applications whose ids were picked, in list order.
pub fn selected<'a>(applies: &'a [Apply], ids: &[i64]) -> Vec<&'a Apply> {
    applies.iter().filter(|a| ids.contains(&a.id)).collect()
}

/// Applicant addresses with duplicates and blanks removed, first seen first.
pub fn recipients(selected: &[&Apply]) -> Vec<String> {
    let mut emails: Vec<String> = Vec::new();
    for apply in selected {
        let Some(email) = apply.user_email.as_deref().map(str::trim) else {
            continue;
        };
        if !email.is_empty() && !emails.iter().any(|e| e == email) {
            emails.push(email.to_string());
        }
    }
    emails
}

/// Returns how many distinct addresses the mail went to.
pub fn send_bulk_email(
    backend: &dyn Backend,
    selected: &[&Apply],
    subject: &str,
    content: &str,
) -> Result<usize, BulkError> {
    if selected.is_empty() {
        return Err(BulkError::NothingSelected);
    }
    if subject.trim().is_empty() || content.trim().is_empty() {
        return Err(BulkError::MissingMailFields);
    }
    let emails = recipients(selected);
    backend.post(
        "/admin/send-bulk-email",
        &json!({ "emails": emails, "subject": subject, "content": content }),
    )?;
    info!(count = emails.len(), "bulk email sent");
    Ok(emails.len())
}

/// `None` when the confirmation was declined and nothing was sent.
pub fn hide_applies(
    backend: &dyn Backend,
    ids: &[i64],
    confirm: &mut dyn Confirm,
) -> Result<Option<usize>, BulkError> {
    if ids.is_empty() {
        return Err(BulkError::NothingSelected);
    }
    if !confirm.confirm(&format!("Hide {} selected application(s)?", ids.len())) {
        return Ok(None);
    }
    backend.put("/apply/admin/hide", &json!({ "ids": ids }))?;
    info!(count = ids.len(), "applications hidden");
    Ok(Some(ids.len()))
}

/// Stored CV names are resolved against the asset host.
pub fn cv_url(cv: &str, asset_base: &str) -> String {
    if cv.starts_with("http://") || cv.starts_with("https://") {
        cv.to_string()
    } else {
        format!("{}/images/{}", asset_base.trim_end_matches('/'), cv.trim_start_matches('/'))
    }
}

/// Path separators in the address are replaced so the file stays in the
/// target directory.
pub fn cv_file_name(email: &str, n: usize) -> String {
    let safe: String = email
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    format!("CV_{}_{}.pdf", safe, n)
}

/// Saves every selected CV into `dir` as `CV_<email>_<n>.pdf`, numbering
/// only the applications that have one.
pub fn download_cvs(
    backend: &dyn Backend,
    selected: &[&Apply],
    asset_base: &str,
    dir: &Path,
) -> Result<Vec<PathBuf>, BulkError> {
    if selected.is_empty() {
        return Err(BulkError::NothingSelected);
    }
    let with_cv: Vec<(&Apply, &str)> = selected
        .iter()
        .filter_map(|a| a.cv.as_deref().filter(|cv| !cv.is_empty()).map(|cv| (*a, cv)))
        .collect();
    if with_cv.is_empty() {
        return Err(BulkError::NoCvs);
    }

    fs::create_dir_all(dir).map_err(|source| BulkError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut saved = Vec::new();
    for (n, (apply, cv)) in with_cv.into_iter().enumerate() {
        let bytes = backend.download(&cv_url(cv, asset_base))?;
        let email = apply.user_email.as_deref().unwrap_or("unknown");
        let path = dir.join(cv_file_name(email, n + 1));
        fs::write(&path, bytes).map_err(|source| BulkError::Io {
            path: path.clone(),
            source,
        })?;
        saved.push(path);
    }
    info!(count = saved.len(), dir = %dir.display(), "CVs downloaded");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeBackend;

    fn apply(id: i64, email: &str, cv: Option<&str>) -> Apply {
        Apply {
            id,
            user_email: Some(email.to_string()),
            cv: cv.map(str::to_string),
            ..Apply::default()
        }
    }

    #[test]
    fn test_recipients_are_deduplicated() {
        let applies = vec![
            apply(1, "a@sdu.vn", None),
            apply(2, "b@sdu.vn", None),
            apply(3, "a@sdu.vn", None),
            apply(4, "", None),
        ];
        let picked = selected(&applies, &[1, 3, 4, 2]);
        assert_eq!(recipients(&picked), vec!["a@sdu.vn", "b@sdu.vn"]);
    }

    #[test]
    fn test_send_bulk_email_requires_subject_and_content() {
        let backend = FakeBackend::new();
        let applies = vec![apply(1, "a@sdu.vn", None)];
        let picked = selected(&applies, &[1]);
        assert!(matches!(
            send_bulk_email(&backend, &picked, " ", "Hello"),
            Err(BulkError::MissingMailFields)
        ));
        assert!(matches!(
            send_bulk_email(&backend, &[], "Hi", "Hello"),
            Err(BulkError::NothingSelected)
        ));
        assert_eq!(backend.call_count(), 0);

        backend.on("POST", "/admin/send-bulk-email", Ok(json!({"message": "sent"})));
        assert_eq!(send_bulk_email(&backend, &picked, "Hi", "Hello").unwrap(), 1);
        assert_eq!(
            backend.calls_to("POST")[0].body,
            json!({"emails": ["a@sdu.vn"], "subject": "Hi", "content": "Hello"})
        );
    }

    #[test]
    fn test_hide_sends_ids() {
        let backend = FakeBackend::new();
        backend.on("PUT", "/apply/admin/hide", Ok(json!("ok")));
        let mut yes = |_: &str| true;
        assert_eq!(hide_applies(&backend, &[3, 5], &mut yes).unwrap(), Some(2));
        assert_eq!(backend.calls_to("PUT")[0].body, json!({"ids": [3, 5]}));
        assert!(hide_applies(&backend, &[], &mut yes).is_err());
    }

    #[test]
    fn test_declined_hide_sends_nothing() {
        let backend = FakeBackend::new();
        backend.on("PUT", "/apply/admin/hide", Ok(json!("ok")));
        let mut asked = Vec::new();
        let mut no = |prompt: &str| {
            asked.push(prompt.to_string());
            false
        };
        assert_eq!(hide_applies(&backend, &[3, 5], &mut no).unwrap(), None);
        assert!(backend.calls_to("PUT").is_empty());
        assert_eq!(asked, vec!["Hide 2 selected application(s)?"]);
    }

    #[test]
    fn test_cv_file_name_stays_in_directory() {
        assert_eq!(cv_file_name("a@sdu.vn", 1), "CV_a@sdu.vn_1.pdf");
        assert_eq!(cv_file_name("../../etc/x", 2), "CV_.._.._etc_x_2.pdf");
        assert_eq!(cv_file_name("a\\b:c", 3), "CV_a_b_c_3.pdf");

        let dir = Path::new("/tmp/cvs");
        let joined = dir.join(cv_file_name("../evil", 1));
        assert_eq!(joined.parent(), Some(dir));
    }

    #[test]
    fn test_download_cvs_names_files_by_applicant() {
        let backend = FakeBackend::new();
        backend.on("DOWNLOAD", "http://localhost:8800/images/cv1.pdf", Ok(json!("PDF-1")));
        backend.on("DOWNLOAD", "https://cdn.example.com/cv3.pdf", Ok(json!("PDF-3")));
        let applies = vec![
            apply(1, "a@sdu.vn", Some("cv1.pdf")),
            apply(2, "b@sdu.vn", None),
            apply(3, "c@sdu.vn", Some("https://cdn.example.com/cv3.pdf")),
        ];
        let dir = tempfile::tempdir().unwrap();
        let picked = selected(&applies, &[1, 2, 3]);
        let saved = download_cvs(&backend, &picked, "http://localhost:8800", dir.path()).unwrap();

        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0], dir.path().join("CV_a@sdu.vn_1.pdf"));
        assert_eq!(saved[1], dir.path().join("CV_c@sdu.vn_2.pdf"));
        assert_eq!(fs::read_to_string(&saved[1]).unwrap(), "PDF-3");

        let none = selected(&applies, &[2]);
        assert!(matches!(
            download_cvs(&backend, &none, "", dir.path()),
            Err(BulkError::NoCvs)
        ));
    }
}
