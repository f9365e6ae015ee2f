use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, Backend};
use crate::form::{EditDialog, FormError, Mode};
use crate::notify::Notifier;
use crate::resources::{Resource, fetch_list};
use crate::text::collate;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{0} cannot be {1} from the console")]
    Unsupported(&'static str, &'static str),

    #[error(transparent)]
    Form(#[from] FormError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Default,
    NameAsc,
    NameDesc,
}

impl SortOrder {
    pub fn next(self) -> Self {
        match self {
            SortOrder::Default => SortOrder::NameAsc,
            SortOrder::NameAsc => SortOrder::NameDesc,
            SortOrder::NameDesc => SortOrder::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Default => "default",
            SortOrder::NameAsc => "a-z",
            SortOrder::NameDesc => "z-a",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" | "" => Ok(SortOrder::Default),
            "a-z" | "asc" | "name" => Ok(SortOrder::NameAsc),
            "z-a" | "desc" => Ok(SortOrder::NameDesc),
            other => Err(format!("unknown sort order '{}' (use default, a-z or z-a)", other)),
        }
    }
}

/// Asked before anything destructive. Closures work directly.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Declined,
    Failed(String),
}

/// Fetch, filter, sort and mutate one resource list. The backend stays the
/// source of truth: every successful write is followed by a refetch and the
/// local items are never patched.
pub struct ResourceList<'a, R: Resource> {
    backend: &'a dyn Backend,
    notifier: Notifier,
    items: Vec<R>,
    state: LoadState,
    search: String,
    facets: Vec<(String, String)>,
    sort: SortOrder,
    status: Option<i64>,
}

impl<'a, R: Resource> ResourceList<'a, R> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self {
            backend,
            notifier: Notifier::new(),
            items: Vec::new(),
            state: LoadState::Loading,
            search: String::new(),
            facets: Vec::new(),
            sort: SortOrder::Default,
            status: None,
        }
    }

    pub fn notifier(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn status(&self) -> Option<i64> {
        self.status
    }

    /// One list request; replaces the items on success. On failure the
    /// previous items stay and the state records the error.
    pub fn load(&mut self) -> Result<(), ApiError> {
        if self.state != LoadState::Ready {
            self.state = LoadState::Loading;
        }
        match fetch_list::<R>(self.backend, self.status) {
            Ok(items) => {
                info!(resource = R::NAME, count = items.len(), "list loaded");
                self.items = items;
                self.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                warn!(resource = R::NAME, error = %e, "list load failed");
                self.state = LoadState::Failed(e.user_message(&format!("Failed to load {}", R::NAME)));
                Err(e)
            }
        }
    }

    fn refetch(&mut self) {
        if let Err(e) = self.load() {
            self.notifier
                .error(e.user_message(&format!("Failed to reload {}", R::NAME)));
        }
    }

    pub fn set_search(&mut self, term: &str) {
        self.search = term.to_string();
    }

    /// `None` clears the facet.
    pub fn set_facet(&mut self, name: &str, value: Option<&str>) {
        self.facets.retain(|(n, _)| n != name);
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.facets.push((name.to_string(), value.to_string()));
        }
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
    }

    /// Server-side status filter; changing it refetches.
    pub fn set_status(&mut self, status: Option<i64>) -> Result<(), ApiError> {
        if self.status == status && self.state == LoadState::Ready {
            return Ok(());
        }
        self.status = status;
        self.load()
    }

    /// Search, then facets, then sort. Never touches the backend. Only an
    /// empty term disables the search; whitespace is matched literally.
    pub fn view(&self) -> Vec<&R> {
        let term = self.search.to_lowercase();
        let mut view: Vec<&R> = self
            .items
            .iter()
            .filter(|item| {
                term.is_empty()
                    || item
                        .search_fields()
                        .iter()
                        .any(|field| field.to_lowercase().contains(&term))
            })
            .filter(|item| {
                self.facets
                    .iter()
                    .all(|(name, value)| item.facet(name).as_deref() == Some(value.as_str()))
            })
            .collect();

        match self.sort {
            SortOrder::Default => {}
            SortOrder::NameAsc => view.sort_by(|a, b| collate(&a.sort_key(), &b.sort_key())),
            SortOrder::NameDesc => view.sort_by(|a, b| collate(&b.sort_key(), &a.sort_key())),
        }
        view
    }

    fn mutate(
        &mut self,
        confirm: &mut dyn Confirm,
        prompt: String,
        fallback: &str,
        done: String,
        request: impl FnOnce(&dyn Backend) -> Result<serde_json::Value, ApiError>,
    ) -> Outcome {
        if !confirm.confirm(&prompt) {
            return Outcome::Declined;
        }
        match request(self.backend) {
            Ok(_) => {
                self.refetch();
                self.notifier.success(done);
                Outcome::Done
            }
            Err(e) => {
                let message = e.user_message(fallback);
                warn!(resource = R::NAME, error = %e, "{}", fallback);
                self.notifier.error(message.clone());
                Outcome::Failed(message)
            }
        }
    }

    pub fn delete(&mut self, id: i64, confirm: &mut dyn Confirm) -> Result<Outcome, ControllerError> {
        let prefix = R::endpoints()
            .delete
            .ok_or(ControllerError::Unsupported(R::TITLE, "deleted"))?;
        let path = format!("{}{}", prefix, id);
        Ok(self.mutate(
            confirm,
            format!("Delete {} #{}?", R::TITLE.to_lowercase(), id),
            "Delete failed",
            format!("{} deleted", R::TITLE),
            |backend| backend.delete(&path),
        ))
    }

    pub fn approve(&mut self, id: i64, confirm: &mut dyn Confirm) -> Result<Outcome, ControllerError> {
        let prefix = R::endpoints()
            .approve
            .ok_or(ControllerError::Unsupported(R::TITLE, "approved"))?;
        let path = format!("{}{}", prefix, id);
        Ok(self.mutate(
            confirm,
            format!("Approve {} #{}?", R::TITLE.to_lowercase(), id),
            "Approve failed",
            format!("{} approved", R::TITLE),
            |backend| backend.put(&path, &serde_json::json!({})),
        ))
    }

    pub fn reject(&mut self, id: i64, confirm: &mut dyn Confirm) -> Result<Outcome, ControllerError> {
        let prefix = R::endpoints()
            .reject
            .ok_or(ControllerError::Unsupported(R::TITLE, "rejected"))?;
        let path = format!("{}{}", prefix, id);
        Ok(self.mutate(
            confirm,
            format!("Reject {} #{}?", R::TITLE.to_lowercase(), id),
            "Reject failed",
            format!("{} rejected", R::TITLE),
            |backend| backend.put(&path, &serde_json::json!({})),
        ))
    }

    /// Validates, then creates or updates. Backend errors go to the dialog
    /// banner rather than to a notification.
    pub fn submit(&mut self, dialog: &mut EditDialog) -> Result<Outcome, ControllerError> {
        let endpoints = R::endpoints();
        let (write, id, verb) = match dialog.mode() {
            Mode::Create => (endpoints.create, None, "created"),
            Mode::Edit(id) => (endpoints.update, Some(id), "updated"),
        };
        let write = write.ok_or(ControllerError::Unsupported(R::TITLE, verb))?;
        dialog.validate()?;

        let path = write.url(id);
        let result = match write.multipart {
            Some(part) => self.backend.multipart(write.method, &path, dialog.multipart(part)),
            None => self.backend.write(write.method, &path, &dialog.payload()),
        };
        match result {
            Ok(_) => {
                self.notifier.success(format!("{} {}", R::TITLE, verb));
                dialog.close();
                self.refetch();
                Ok(Outcome::Done)
            }
            Err(e) => {
                let message = e.user_message("Operation failed");
                warn!(resource = R::NAME, error = %e, "submit failed");
                dialog.set_banner(message.clone());
                Ok(Outcome::Failed(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeBackend;
    use crate::models::{Company, Field, Job, Picture};
    use crate::notify::Severity;
    use serde_json::{Value, json};

    fn yes(_: &str) -> bool {
        true
    }

    fn find<'l, R: Resource>(list: &'l ResourceList<'_, R>, id: i64) -> Option<&'l R> {
        list.items().iter().find(|item| item.id() == id)
    }

    fn companies_backend() -> FakeBackend {
        let backend = FakeBackend::new();
        backend.on(
            "GET",
            "/company",
            Ok(json!({"data": [
                {"id": 1, "nameCompany": "Anvil Co", "province": "Hà Nội", "scale": "10 - 20"},
                {"id": 2, "nameCompany": "Bento", "province": "Đà Nẵng", "scale": "10 - 20"},
                {"id": 3, "nameCompany": "Anchor", "province": "Hà Nội", "scale": "100 - 500"}
            ]})),
        );
        backend
    }

    fn names(view: &[&Company]) -> Vec<String> {
        view.iter().map(|c| c.name_company.clone().unwrap_or_default()).collect()
    }

    #[test]
    fn test_search_filters_case_insensitively() {
        let backend = companies_backend();
        let mut list = ResourceList::<Company>::new(&backend);
        list.load().unwrap();
        assert_eq!(list.state(), &LoadState::Ready);

        list.set_search("an");
        assert_eq!(names(&list.view()), vec!["Anvil Co", "Anchor"]);

        list.set_search("");
        assert_eq!(list.view().len(), 3);
    }

    #[test]
    fn test_search_keeps_surrounding_whitespace() {
        let backend = companies_backend();
        let mut list = ResourceList::<Company>::new(&backend);
        list.load().unwrap();

        list.set_search("co ");
        assert!(list.view().is_empty());

        list.set_search(" an");
        assert!(list.view().is_empty());

        list.set_search("   ");
        assert!(list.view().is_empty());

        list.set_search("l c");
        assert_eq!(names(&list.view()), vec!["Anvil Co"]);
    }

    #[test]
    fn test_filtered_view_is_subset_with_matching_field() {
        let backend = companies_backend();
        let mut list = ResourceList::<Company>::new(&backend);
        list.load().unwrap();
        for term in ["a", "co", "BENTO", "zzz"] {
            list.set_search(term);
            let view = list.view();
            assert!(view.len() <= list.items().len());
            for item in view {
                assert!(list.items().iter().any(|i| i.id == item.id));
                assert!(
                    item.search_fields()
                        .iter()
                        .any(|f| f.to_lowercase().contains(&term.to_lowercase()))
                );
            }
        }
    }

    #[test]
    fn test_facets_and_sort() {
        let backend = companies_backend();
        let mut list = ResourceList::<Company>::new(&backend);
        list.load().unwrap();

        list.set_facet("province", Some("Hà Nội"));
        list.set_sort(SortOrder::NameAsc);
        assert_eq!(names(&list.view()), vec!["Anchor", "Anvil Co"]);

        list.set_facet("scale", Some("10 - 20"));
        assert_eq!(names(&list.view()), vec!["Anvil Co"]);

        list.set_facet("province", None);
        list.set_facet("scale", None);
        list.set_sort(SortOrder::NameDesc);
        assert_eq!(names(&list.view()), vec!["Bento", "Anvil Co", "Anchor"]);

        list.set_sort(SortOrder::Default);
        assert_eq!(names(&list.view()), vec!["Anvil Co", "Bento", "Anchor"]);
        assert_eq!("z-a".parse::<SortOrder>().unwrap(), SortOrder::NameDesc);
    }

    #[test]
    fn test_delete_refetches_from_backend() {
        let backend = FakeBackend::new();
        backend
            .on("GET", "/fields/admin", Ok(json!([{"id": 4, "name": "IT"}, {"id": 5, "name": "Sales"}])))
            .on("GET", "/fields/admin", Ok(json!([{"id": 4, "name": "IT"}])));
        backend.on("DELETE", "/fields/admin/delete/5", Ok(json!("Deleted")));

        let mut list = ResourceList::<Field>::new(&backend);
        list.load().unwrap();
        assert_eq!(list.items().len(), 2);

        let outcome = list.delete(5, &mut yes).unwrap();
        assert_eq!(outcome, Outcome::Done);
        assert!(find(&list, 5).is_none());
        assert_eq!(backend.calls_to("GET").len(), 2);
        let live = list.notifier().pending().to_vec();
        assert_eq!(live.last().unwrap().severity, Severity::Success);
    }

    #[test]
    fn test_declined_confirmation_sends_nothing() {
        let backend = companies_backend();
        let mut list = ResourceList::<Company>::new(&backend);
        list.load().unwrap();
        let mut no = |_: &str| false;
        assert_eq!(list.delete(1, &mut no).unwrap(), Outcome::Declined);
        assert!(backend.calls_to("DELETE").is_empty());
    }

    #[test]
    fn test_failed_delete_keeps_list_and_reports_backend_message() {
        let backend = FakeBackend::new();
        backend.on("GET", "/job?limit=100", Ok(json!({"data": [{"id": 41}, {"id": 42}]})));
        backend.fail("DELETE", "/job/admin/delete/42", 500, json!("Job still has applications"));

        let mut list = ResourceList::<Job>::new(&backend);
        list.load().unwrap();
        let outcome = list.delete(42, &mut yes).unwrap();

        assert_eq!(outcome, Outcome::Failed("Job still has applications".to_string()));
        assert_eq!(list.items().len(), 2);
        assert!(find(&list, 42).is_some());
        assert_eq!(backend.calls_to("GET").len(), 1);
        let last = list.notifier().last().cloned().unwrap();
        assert_eq!(last.severity, Severity::Error);
        assert!(last.message.contains("Job still has applications"));
    }

    #[test]
    fn test_failed_delete_without_body_uses_fallback() {
        let backend = FakeBackend::new();
        backend.on("GET", "/fields/admin", Ok(json!([{"id": 1}])));
        backend.fail("DELETE", "/fields/admin/delete/1", 500, Value::Null);
        let mut list = ResourceList::<Field>::new(&backend);
        list.load().unwrap();
        assert_eq!(
            list.delete(1, &mut yes).unwrap(),
            Outcome::Failed("Delete failed".to_string())
        );
    }

    #[test]
    fn test_approve_and_reject_put_empty_body() {
        let backend = FakeBackend::new();
        backend.on("GET", "/job?status=0&limit=100", Ok(json!({"data": [{"id": 7, "status": 0}]})));
        backend.on("PUT", "/job/admin/approve/7", Ok(json!("ok")));
        backend.fail("PUT", "/job/admin/reject/7", 403, json!({"message": "Forbidden"}));

        let mut list = ResourceList::<Job>::new(&backend);
        list.set_status(Some(0)).unwrap();
        assert_eq!(list.approve(7, &mut yes).unwrap(), Outcome::Done);
        assert_eq!(
            list.reject(7, &mut yes).unwrap(),
            Outcome::Failed("Forbidden".to_string())
        );
        let puts = backend.calls_to("PUT");
        assert_eq!(puts[0].body, json!({}));

        let mut fields = ResourceList::<Field>::new(&backend);
        assert!(matches!(
            fields.approve(1, &mut yes),
            Err(ControllerError::Unsupported(_, _))
        ));
    }

    #[test]
    fn test_load_failure_keeps_previous_items() {
        let backend = FakeBackend::new();
        backend
            .on("GET", "/fields/admin", Ok(json!([{"id": 1, "name": "IT"}])))
            .fail("GET", "/fields/admin", 502, json!("Bad gateway"));
        let mut list = ResourceList::<Field>::new(&backend);
        list.load().unwrap();
        assert!(list.load().is_err());
        assert_eq!(list.items().len(), 1);
        assert_eq!(list.state(), &LoadState::Failed("Bad gateway".to_string()));
    }

    #[test]
    fn test_invalid_form_never_reaches_backend() {
        let backend = FakeBackend::new();
        let mut list = ResourceList::<Field>::new(&backend);
        let mut dialog = EditDialog::create::<Field>();
        assert!(matches!(
            list.submit(&mut dialog),
            Err(ControllerError::Form(FormError::Invalid(1)))
        ));
        assert_eq!(backend.call_count(), 0);
        assert!(dialog.is_open());
    }

    #[test]
    fn test_submit_success_closes_and_refetches() {
        let backend = FakeBackend::new();
        backend.on("POST", "/fields/admin/insert", Ok(json!("Created")));
        backend.on("GET", "/fields/admin", Ok(json!([{"id": 1, "name": "Design"}])));

        let mut list = ResourceList::<Field>::new(&backend);
        let mut dialog = EditDialog::create::<Field>();
        dialog.set("name", "Design").unwrap();
        assert_eq!(list.submit(&mut dialog).unwrap(), Outcome::Done);
        assert!(!dialog.is_open());
        assert_eq!(list.items().len(), 1);
        assert_eq!(
            backend.calls_to("POST")[0].body,
            json!({"name": "Design", "typeField": ""})
        );
    }

    #[test]
    fn test_submit_failure_goes_to_banner() {
        let backend = FakeBackend::new();
        backend.on("GET", "/fields/admin", Ok(json!([{"id": 3, "name": "IT"}])));
        backend.fail("PUT", "/fields/admin/update", 409, json!({"message": "Name already exists"}));

        let mut list = ResourceList::<Field>::new(&backend);
        list.load().unwrap();
        let record = find(&list, 3).cloned().unwrap();
        let mut dialog = EditDialog::edit(&record);
        let outcome = list.submit(&mut dialog).unwrap();

        assert_eq!(outcome, Outcome::Failed("Name already exists".to_string()));
        assert_eq!(dialog.banner(), Some("Name already exists"));
        assert!(dialog.is_open());
        assert!(list.notifier().pending().is_empty());
        assert_eq!(backend.calls_to("PUT")[0].body["id"], json!(3));
    }

    #[test]
    fn test_picture_submit_is_multipart_with_id_in_path() {
        let backend = FakeBackend::new();
        backend.on("GET", "/pictures", Ok(json!([{"id": 8, "title": "Old"}])));
        backend.on("PUT", "/pictures/update/8", Ok(json!({"message": "ok"})));

        let mut list = ResourceList::<Picture>::new(&backend);
        list.load().unwrap();
        let mut dialog = EditDialog::edit(find(&list, 8).unwrap());
        dialog.set("title", "New").unwrap();
        assert_eq!(list.submit(&mut dialog).unwrap(), Outcome::Done);
        assert_eq!(backend.calls_to("PUT")[0].body, json!({"title": "New"}));
    }

    #[test]
    fn test_companies_are_read_only() {
        let backend = FakeBackend::new();
        let mut list = ResourceList::<Company>::new(&backend);
        let mut dialog = EditDialog::create::<Company>();
        assert!(matches!(
            list.submit(&mut dialog),
            Err(ControllerError::Unsupported("Company", "created"))
        ));
    }
}
