use std::collections::BTreeMap;

use crate::{
    lifecycle::ConcernStatus,
    models::{AnalyticsSummary, Concern, GroupCount, SdgMetric, StatusCount},
};

/// UN Sustainable Development Goals a concern category can contribute to.
/// Order matters: the first goal whose keywords match a category wins.
const SDG_TABLE: &[(i32, &str, &[&str])] = &[
    (6, "Clean Water and Sanitation", &["water", "sanitation", "drainage", "sewage"]),
    (7, "Affordable and Clean Energy", &["electricity", "energy", "power", "streetlight"]),
    (9, "Industry, Innovation and Infrastructure", &["road", "infrastructure", "transport", "bridge"]),
    (11, "Sustainable Cities and Communities", &["housing", "waste", "garbage", "park"]),
    (3, "Good Health and Well-being", &["health", "hospital", "clinic"]),
    (4, "Quality Education", &["education", "school"]),
    (13, "Climate Action", &["environment", "pollution", "climate"]),
    (16, "Peace, Justice and Strong Institutions", &["safety", "corruption", "police", "governance"]),
];

pub const UNSPECIFIED_REGION: &str = "Unspecified";

/// The SDG goal number and label a category maps to, if any.
pub fn sdg_goal_for(category: &str) -> Option<(i32, &'static str)> {
    let category = category.trim().to_lowercase();
    SDG_TABLE
        .iter()
        .find(|(_, _, keywords)| keywords.iter().any(|k| category.contains(k)))
        .map(|(goal, label, _)| (*goal, *label))
}

/// Folds per-category totals into per-goal totals. Unmapped categories are
/// dropped; goals with no concerns are omitted. Sorted by goal number.
pub fn sdg_metrics(by_category: &[GroupCount]) -> Vec<SdgMetric> {
    let mut goals: BTreeMap<i32, SdgMetric> = BTreeMap::new();
    for group in by_category {
        let Some((goal, label)) = sdg_goal_for(&group.key) else {
            continue;
        };
        let metric = goals.entry(goal).or_insert_with(|| SdgMetric {
            goal,
            label: label.to_string(),
            total: 0,
            resolved: 0,
        });
        metric.total += group.total;
        metric.resolved += group.resolved;
    }
    goals.into_values().collect()
}

/// One entry per status, in lifecycle order, zero-filled.
pub fn status_counts(counts: impl IntoIterator<Item = (ConcernStatus, i64)>) -> Vec<StatusCount> {
    let mut totals: BTreeMap<ConcernStatus, i64> = BTreeMap::new();
    for (status, count) in counts {
        *totals.entry(status).or_default() += count;
    }
    ConcernStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status,
            count: totals.get(&status).copied().unwrap_or(0),
        })
        .collect()
}

/// Largest groups first, ties by key.
pub fn sort_groups(groups: &mut [GroupCount]) {
    groups.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.key.cmp(&b.key)));
}

/// summarize
///
/// Builds the dashboard summary from loaded concerns. A concern counts as
/// resolved once it has a `resolved_at`, which `Closed` concerns keep.
pub fn summarize(concerns: &[Concern], total_users: i64) -> AnalyticsSummary {
    let mut by_category: BTreeMap<String, GroupCount> = BTreeMap::new();
    let mut by_region: BTreeMap<String, GroupCount> = BTreeMap::new();
    let mut resolution_hours = Vec::new();

    for concern in concerns {
        let resolved = i64::from(concern.resolved_at().is_some());
        let region = concern
            .region
            .clone()
            .unwrap_or_else(|| UNSPECIFIED_REGION.to_string());

        for (map, key) in [
            (&mut by_category, concern.category.clone()),
            (&mut by_region, region),
        ] {
            let group = map.entry(key.clone()).or_insert_with(|| GroupCount {
                key,
                total: 0,
                resolved: 0,
            });
            group.total += 1;
            group.resolved += resolved;
        }

        if let Some(resolved_at) = concern.resolved_at() {
            let seconds = (resolved_at - concern.created_at).num_seconds();
            resolution_hours.push(seconds as f64 / 3600.0);
        }
    }

    let mut by_category: Vec<GroupCount> = by_category.into_values().collect();
    let mut by_region: Vec<GroupCount> = by_region.into_values().collect();
    sort_groups(&mut by_category);
    sort_groups(&mut by_region);

    let average_resolution_hours = (!resolution_hours.is_empty())
        .then(|| resolution_hours.iter().sum::<f64>() / resolution_hours.len() as f64);

    AnalyticsSummary {
        total_concerns: concerns.len() as i64,
        total_users,
        resolved_concerns: resolution_hours.len() as i64,
        average_resolution_hours,
        by_status: status_counts(concerns.iter().map(|c| (c.status(), 1))),
        sdg: sdg_metrics(&by_category),
        by_category,
        by_region,
    }
}
