use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use catalog::Model;

pub const DEFAULT_LIMIT: usize = 100;
pub const DEFAULT_MAX_RESULTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Parsed query descriptor for the list/search surface.
///
/// Doubles as the JSON body of `POST /models/search`; the query-string form
/// is built by [`ModelFilter::parse_query`]. Invalid numeric/date values
/// silently revert to defaults, unknown parameters are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelFilter {
    pub id: Option<String>,
    pub name: Option<String>,
    pub name_contains: Option<String>,
    pub provider: Option<String>,
    pub modality_input: Vec<String>,
    pub modality_output: Vec<String>,
    /// Capability name → required value.
    pub features: BTreeMap<String, bool>,
    pub tags: Vec<String>,
    /// Tri-state: None = no filter.
    pub open_weights: Option<bool>,
    pub min_context: Option<u64>,
    pub max_context: Option<u64>,
    pub min_output: Option<u64>,
    pub max_output: Option<u64>,
    pub released_after: Option<DateTime<Utc>>,
    pub released_before: Option<DateTime<Utc>>,
    pub sort: Option<String>,
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
    pub max_results: usize,
}

impl Default for ModelFilter {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            name_contains: None,
            provider: None,
            modality_input: Vec::new(),
            modality_output: Vec::new(),
            features: BTreeMap::new(),
            tags: Vec::new(),
            open_weights: None,
            min_context: None,
            max_context: None,
            min_output: None,
            max_output: None,
            released_after: None,
            released_before: None,
            sort: None,
            order: SortOrder::Asc,
            limit: DEFAULT_LIMIT,
            offset: 0,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// Filtered page plus the pre-pagination total.
#[derive(Debug, Clone)]
pub struct FilterResult {
    pub models: Vec<Arc<Model>>,
    pub total: usize,
}

impl ModelFilter {
    /// Build a filter from a raw query string. Repeated keys accumulate
    /// where the option is set-valued, otherwise last one wins.
    pub fn parse_query(raw: &str) -> Self {
        let mut filter = Self::default();

        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let value = value.trim();
            match key.as_ref() {
                "id" => filter.id = non_empty(value),
                "name" => filter.name = non_empty(value),
                "name_contains" => filter.name_contains = non_empty(value),
                "provider" => filter.provider = non_empty(value),
                "modality_input" => push_csv(&mut filter.modality_input, value),
                "modality_output" => push_csv(&mut filter.modality_output, value),
                "feature" => {
                    if !value.is_empty() {
                        filter.features.insert(value.to_ascii_lowercase(), true);
                    }
                }
                "tag" => push_csv(&mut filter.tags, value),
                "open_weights" => filter.open_weights = parse_bool(value),
                "min_context" => filter.min_context = value.parse().ok(),
                "max_context" => filter.max_context = value.parse().ok(),
                "min_output" => filter.min_output = value.parse().ok(),
                "max_output" => filter.max_output = value.parse().ok(),
                "released_after" => filter.released_after = parse_date(value),
                "released_before" => filter.released_before = parse_date(value),
                "sort" => filter.sort = non_empty(value),
                "order" => {
                    filter.order = match value.to_ascii_lowercase().as_str() {
                        "desc" => SortOrder::Desc,
                        _ => SortOrder::Asc,
                    }
                }
                "limit" => filter.limit = value.parse().unwrap_or(DEFAULT_LIMIT),
                "offset" => filter.offset = value.parse().unwrap_or(0),
                "max_results" => {
                    filter.max_results = value.parse().unwrap_or(DEFAULT_MAX_RESULTS)
                }
                key if key.starts_with("feature_") => {
                    let name = key.trim_start_matches("feature_").to_ascii_lowercase();
                    if let Some(want) = parse_bool(value) {
                        filter.features.insert(name, want);
                    }
                }
                _ => {} // unknown parameters are ignored
            }
        }

        filter
    }

    /// Predicate over one model. Checks run in a fixed order and
    /// short-circuit on the first non-match.
    pub fn matches(&self, model: &Model) -> bool {
        self.matches_basic(model)
            && self.matches_modalities(model)
            && self.matches_features(model)
            && self.matches_metadata(model)
            && self.matches_limits(model)
            && self.matches_dates(model)
    }

    fn matches_basic(&self, model: &Model) -> bool {
        if let Some(id) = &self.id {
            if !model.id.eq_ignore_ascii_case(id) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !model.name.eq_ignore_ascii_case(name) {
                return false;
            }
        }
        if let Some(fragment) = &self.name_contains {
            let haystack = model.name.to_ascii_lowercase();
            if !haystack.contains(&fragment.to_ascii_lowercase()) {
                return false;
            }
        }
        if let Some(provider) = &self.provider {
            if !model.provider.eq_ignore_ascii_case(provider) {
                return false;
            }
        }
        true
    }

    fn matches_modalities(&self, model: &Model) -> bool {
        let has_all = |wanted: &[String], present: &[catalog::Modality]| {
            wanted.iter().all(|w| {
                present
                    .iter()
                    .any(|m| m.as_str().eq_ignore_ascii_case(w))
            })
        };
        has_all(&self.modality_input, &model.modalities.input)
            && has_all(&self.modality_output, &model.modalities.output)
    }

    fn matches_features(&self, model: &Model) -> bool {
        self.features
            .iter()
            .all(|(name, want)| model.features.get(name).unwrap_or(false) == *want)
    }

    fn matches_metadata(&self, model: &Model) -> bool {
        if !self.tags.is_empty() {
            let any_tag = self.tags.iter().any(|wanted| {
                model
                    .tags
                    .iter()
                    .any(|tag| tag.eq_ignore_ascii_case(wanted))
            });
            if !any_tag {
                return false;
            }
        }
        if let Some(open) = self.open_weights {
            if model.open_weights != open {
                return false;
            }
        }
        true
    }

    fn matches_limits(&self, model: &Model) -> bool {
        let ctx = model.limits.context_window;
        let out = model.limits.output_tokens;
        if self.min_context.is_some_and(|min| ctx < min) {
            return false;
        }
        if self.max_context.is_some_and(|max| ctx > max) {
            return false;
        }
        if self.min_output.is_some_and(|min| out < min) {
            return false;
        }
        if self.max_output.is_some_and(|max| out > max) {
            return false;
        }
        true
    }

    fn matches_dates(&self, model: &Model) -> bool {
        if self.released_after.is_none() && self.released_before.is_none() {
            return true;
        }
        // Date-filtered queries exclude models without a release date.
        let Some(released) = model.released_at else {
            return false;
        };
        if self.released_after.is_some_and(|after| released < after) {
            return false;
        }
        if self.released_before.is_some_and(|before| released > before) {
            return false;
        }
        true
    }

    /// Filter, sort, cap at `max_results`, paginate. The cap applies in
    /// sort order, so it keeps the best-ranked results, not an arbitrary
    /// slice of the catalog.
    pub fn apply(&self, models: &[Arc<Model>]) -> FilterResult {
        let mut matched: Vec<Arc<Model>> = models
            .iter()
            .filter(|m| self.matches(m))
            .cloned()
            .collect();

        self.sort_models(&mut matched);
        matched.truncate(self.max_results);

        let total = matched.len();
        let start = self.offset.min(total);
        let end = (self.offset.saturating_add(self.limit)).min(total);
        let models = matched[start..end].to_vec();

        FilterResult { models, total }
    }

    fn sort_models(&self, models: &mut [Arc<Model>]) {
        let Some(field) = self.sort.as_deref() else {
            return;
        };

        let compare: fn(&Arc<Model>, &Arc<Model>) -> Ordering = match field {
            "id" => |a, b| a.id.cmp(&b.id),
            "name" => |a, b| a.name.cmp(&b.name),
            "provider" => |a, b| a.provider.cmp(&b.provider),
            "context" => |a, b| a.limits.context_window.cmp(&b.limits.context_window),
            "output" => |a, b| a.limits.output_tokens.cmp(&b.limits.output_tokens),
            "released" => |a, b| a.released_at.cmp(&b.released_at),
            _ => return, // unknown sort field keeps input order
        };

        match self.order {
            SortOrder::Asc => models.sort_by(compare),
            SortOrder::Desc => models.sort_by(|a, b| compare(b, a)),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn push_csv(target: &mut Vec<String>, value: &str) {
    target.extend(
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_ascii_lowercase()),
    );
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// RFC3339 first, then bare dates as midnight UTC.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}
