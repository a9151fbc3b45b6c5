//! Page arithmetic and link data for paged listings.
//!
//! A [`Paginator`] is built from the current request path (query string
//! included), counts matching rows with the listing's conditions, fetches
//! one page through [`Table::paginate`] and produces link data for
//! first/prev/next/last, page numbers and sort columns. Rendering the links
//! is left to the caller.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::{Fields, OrmError, Params, Record, Select, Table};
use crate::inflect;

/// One navigation link. `url` is `None` when the link is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLink {
    pub label: String,
    pub page: i64,
    pub url: Option<String>,
    pub current: bool,
}

/// Link that re-sorts the listing by a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortLink {
    pub field: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginator {
    here: String,
    params: BTreeMap<String, String>,
    /// Upper bound for the last page; 0 means unbounded.
    pub max_page: i64,
    page: i64,
    limit: i64,
    total: i64,
    last_page: i64,
    order: Option<String>,
}

impl Paginator {
    /// `uri` is the request path relative to the application base, with
    /// its query string.
    pub fn new(uri: &str) -> Self {
        let (here, query) = uri.split_once('?').unwrap_or((uri, ""));
        let params = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self {
            here: here.to_string(),
            params,
            max_page: 0,
            page: 1,
            limit: 20,
            total: 0,
            last_page: 0,
            order: None,
        }
    }

    pub fn with_max_page(mut self, max_page: i64) -> Self {
        self.max_page = max_page;
        self
    }

    /// Count the matching rows, compute page bounds and fetch `page`.
    ///
    /// The count ignores `select.fields` and `select.order`; `select.count`
    /// replaces the counted expression when set.
    pub fn paginate(
        &mut self,
        table: &Table<'_>,
        page: i64,
        limit: i64,
        order: Option<&str>,
        select: &Select,
        params: &Params,
    ) -> Result<Vec<Record>, OrmError> {
        let mut count = select.clone();
        count.order = None;
        count.fields = match &select.count {
            Some(expr) => Fields::Raw(expr.clone()),
            None => Fields::All,
        };
        let total = table.find_count(&count, params)?;
        self.set_bounds(page, limit, total);
        self.order = order.map(str::to_string);

        let mut select = select.clone();
        if let Some(order) = order {
            select.order = Some(order.to_string());
        }
        tracing::debug!(
            model = %table.meta().name,
            page = self.page,
            last_page = self.last_page,
            total,
            "Paginating"
        );
        table.paginate(self.page, self.limit, &select, params)
    }

    fn set_bounds(&mut self, page: i64, limit: i64, total: i64) {
        self.page = page.max(1);
        self.limit = limit.max(1);
        self.total = total;
        self.last_page = total / self.limit + i64::from(total % self.limit != 0);
        if self.max_page > 0 {
            self.last_page = self.last_page.min(self.max_page);
        }
        if self.last_page > 0 {
            self.page = self.page.min(self.last_page);
        }
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn last_page(&self) -> i64 {
        self.last_page
    }

    pub fn order(&self) -> Option<&str> {
        self.order.as_deref()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.last_page
    }

    /// Current path with the request's query merged with `overrides`.
    /// `page` defaults to the current page and is omitted below 2.
    pub fn url(&self, overrides: &[(&str, String)]) -> String {
        let mut params = self.params.clone();
        params.insert("page".to_string(), self.page.to_string());
        for (key, value) in overrides {
            params.insert(key.to_string(), value.clone());
        }
        if params
            .get("page")
            .and_then(|p| p.parse::<i64>().ok())
            .is_some_and(|p| p < 2)
        {
            params.remove("page");
        }

        if params.is_empty() {
            return self.here.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        format!("{}?{}", self.here, query)
    }

    fn link(&self, label: &str, page: i64, enabled: bool) -> PageLink {
        PageLink {
            label: label.to_string(),
            page,
            url: enabled.then(|| self.url(&[("page", page.to_string())])),
            current: page == self.page,
        }
    }

    pub fn first(&self, label: &str) -> PageLink {
        self.link(label, 1, self.has_prev())
    }

    pub fn prev(&self, label: &str) -> PageLink {
        self.link(label, self.page - 1, self.has_prev())
    }

    pub fn next(&self, label: &str) -> PageLink {
        self.link(label, self.page + 1, self.has_next())
    }

    pub fn last(&self, label: &str) -> PageLink {
        self.link(label, self.last_page, self.has_next())
    }

    /// Up to `count + 1` page links around the current page.
    pub fn numbers(&self, count: i64) -> Vec<PageLink> {
        let count = count.max(0);
        let half = count / 2 + count % 2;
        let start = self.page.saturating_sub(half).max(1);
        let end = start.saturating_add(count).min(self.last_page);
        let start = end.saturating_sub(count).max(1);
        (start..=end)
            .map(|page| self.link(&page.to_string(), page, true))
            .collect()
    }

    /// Link ordering the listing by `field`, titled `field` with an
    /// uppercase first letter unless a title is given.
    pub fn sort(&self, field: &str, title: Option<&str>) -> SortLink {
        SortLink {
            field: field.to_string(),
            title: title.map_or_else(|| inflect::ucfirst(field), str::to_string),
            url: self.url(&[("order", field.to_string())]),
        }
    }
}
