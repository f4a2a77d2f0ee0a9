use std::cmp::{Ordering, Reverse};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RiskLevel;
use crate::domain::{
    BoundingBox, ContractorId, DivisionId, LocationId, RegionId, TaskId, TenantId,
    WorkPackageId, WorkTypeId,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingFilters {
    pub risk_levels: Option<Vec<RiskLevel>>,
    pub bbox: Option<BoundingBox>,
    pub search: Option<String>,
    pub region_ids: Vec<RegionId>,
    pub division_ids: Vec<DivisionId>,
    pub contractor_ids: Vec<ContractorId>,
    pub work_type_ids: Vec<WorkTypeId>,
    pub work_package_ids: Vec<WorkPackageId>,
}

impl RankingFilters {
    pub(crate) fn accepts_level(&self, level: RiskLevel) -> bool {
        self.risk_levels
            .as_ref()
            .map_or(true, |levels| levels.is_empty() || levels.contains(&level))
    }

    /// Lower-cased needle, `None` when the search is blank.
    pub(crate) fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .map(str::to_lowercase)
    }
}

/// An empty filter list means "no restriction".
pub(crate) fn allows<T: PartialEq>(allowed: &[T], value: Option<&T>) -> bool {
    allowed.is_empty() || value.map_or(false, |value| allowed.contains(value))
}

pub(crate) fn matches_search<'a, I>(needle: &str, haystacks: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    haystacks
        .into_iter()
        .any(|haystack| haystack.to_lowercase().contains(needle))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingOrder {
    #[default]
    RiskLevelDesc,
    RiskLevelAsc,
    Name,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pagination {
    /// Strictly increasing ids after the cursor; ordering is by id.
    Seek { after: Option<Uuid>, limit: usize },
    Offset { offset: usize, limit: usize },
}

impl Default for Pagination {
    fn default() -> Self {
        Self::Offset {
            offset: 0,
            limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingQuery {
    pub tenant_id: TenantId,
    pub date: NaiveDate,
    #[serde(default)]
    pub filters: RankingFilters,
    #[serde(default)]
    pub order: RankingOrder,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingPage<T> {
    pub items: Vec<T>,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRanking {
    pub location_id: LocationId,
    pub name: String,
    pub work_package_id: Option<WorkPackageId>,
    pub work_package_name: Option<String>,
    pub supervisor_name: Option<String>,
    pub risk_level: RiskLevel,
    pub risk_level_ordinal: u8,
    pub metric_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkPackageRanking {
    pub work_package_id: WorkPackageId,
    pub name: String,
    pub risk_level: RiskLevel,
    pub risk_level_ordinal: u8,
    pub metric_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRanking {
    pub task_id: TaskId,
    pub location_id: LocationId,
    pub risk_level: RiskLevel,
    pub risk_level_ordinal: u8,
    pub metric_value: Option<f64>,
}

pub(crate) trait RankedRow {
    fn row_id(&self) -> Uuid;
    fn row_name(&self) -> &str;
    fn row_ordinal(&self) -> u8;
}

impl RankedRow for LocationRanking {
    fn row_id(&self) -> Uuid {
        self.location_id.0
    }
    fn row_name(&self) -> &str {
        &self.name
    }
    fn row_ordinal(&self) -> u8 {
        self.risk_level_ordinal
    }
}

impl RankedRow for WorkPackageRanking {
    fn row_id(&self) -> Uuid {
        self.work_package_id.0
    }
    fn row_name(&self) -> &str {
        &self.name
    }
    fn row_ordinal(&self) -> u8 {
        self.risk_level_ordinal
    }
}

fn by_name_then_id<T: RankedRow>(left: &T, right: &T) -> Ordering {
    left.row_name()
        .cmp(right.row_name())
        .then_with(|| left.row_id().cmp(&right.row_id()))
}

/// Sort and slice already-filtered rows. Ties always break on name then id,
/// so every page boundary is stable.
pub(crate) fn paginate<T: RankedRow>(
    mut rows: Vec<T>,
    order: RankingOrder,
    pagination: Pagination,
) -> RankingPage<T> {
    let total = rows.len();
    match pagination {
        Pagination::Seek { after, limit } => {
            rows.sort_by_key(RankedRow::row_id);
            let mut items: Vec<T> = rows
                .into_iter()
                .filter(|row| after.map_or(true, |cursor| row.row_id() > cursor))
                .take(limit + 1)
                .collect();
            let next_cursor = if items.len() > limit {
                items.truncate(limit);
                items.last().map(RankedRow::row_id)
            } else {
                None
            };
            RankingPage {
                items,
                total,
                next_cursor,
            }
        }
        Pagination::Offset { offset, limit } => {
            match order {
                RankingOrder::RiskLevelDesc => rows.sort_by(|left, right| {
                    Reverse(left.row_ordinal())
                        .cmp(&Reverse(right.row_ordinal()))
                        .then_with(|| by_name_then_id(left, right))
                }),
                RankingOrder::RiskLevelAsc => rows.sort_by(|left, right| {
                    left.row_ordinal()
                        .cmp(&right.row_ordinal())
                        .then_with(|| by_name_then_id(left, right))
                }),
                RankingOrder::Name => rows.sort_by(by_name_then_id),
                RankingOrder::Id => rows.sort_by_key(RankedRow::row_id),
            }
            let items = rows.into_iter().skip(offset).take(limit).collect();
            RankingPage {
                items,
                total,
                next_cursor: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, level: RiskLevel) -> WorkPackageRanking {
        WorkPackageRanking {
            work_package_id: WorkPackageId::new(),
            name: name.to_string(),
            risk_level: level,
            risk_level_ordinal: level.ordinal(),
            metric_value: None,
        }
    }

    fn rows() -> Vec<WorkPackageRanking> {
        vec![
            row("b", RiskLevel::Low),
            row("a", RiskLevel::High),
            row("c", RiskLevel::Unknown),
            row("d", RiskLevel::High),
        ]
    }

    #[test]
    fn risk_descending_puts_high_first_and_unknown_last() {
        let page = paginate(
            rows(),
            RankingOrder::RiskLevelDesc,
            Pagination::Offset {
                offset: 0,
                limit: 10,
            },
        );
        let names: Vec<&str> = page.items.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["a", "d", "b", "c"]);
        assert_eq!(page.total, 4);
    }

    #[test]
    fn seek_pages_walk_ids_without_overlap() {
        let all = rows();
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = paginate(
                all.clone(),
                RankingOrder::RiskLevelDesc,
                Pagination::Seek {
                    after: cursor,
                    limit: 3,
                },
            );
            seen.extend(page.items.iter().map(|row| row.work_package_id.0));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        let mut expected: Vec<Uuid> = all.iter().map(|row| row.work_package_id.0).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn empty_filter_lists_allow_everything() {
        let region = RegionId::new();
        assert!(allows::<RegionId>(&[], None));
        assert!(allows(&[region], Some(&region)));
        assert!(!allows(&[region], None));
        assert!(!allows(&[region], Some(&RegionId::new())));
    }
}
