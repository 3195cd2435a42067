//! Staff listing criteria, scope intersection and roll ordering.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use nominalroll_auth::{Principal, Scope};
use nominalroll_core::{FormationId, OfficeId, StaffId};

use crate::rank::Rank;
use crate::staff::{Gender, Staff, StaffStatus};

/// Inclusive date range; either end may be open.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// An open range admits everything; a bounded one requires a date.
    pub fn admits(&self, value: Option<NaiveDate>) -> bool {
        if self.is_open() {
            return true;
        }
        value.is_some_and(|v| self.from.is_none_or(|f| v >= f) && self.to.is_none_or(|t| v <= t))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaffFilter {
    /// Case-insensitive match on names or service number.
    pub search: Option<String>,
    /// Any of these ranks (empty = all).
    pub ranks: Vec<Rank>,
    pub formation_id: Option<FormationId>,
    pub office_id: Option<OfficeId>,
    pub staff_id: Option<StaffId>,
    pub status: Option<StaffStatus>,
    pub gender: Option<Gender>,
    pub dob: DateRange,
    pub dopa: DateRange,
    pub exit_date: DateRange,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl StaffFilter {
    /// Intersect the filter with the principal's scope.
    ///
    /// Returns `None` when the requested criteria fall entirely outside the
    /// scope (the result set is empty).
    pub fn scoped(mut self, principal: &Principal) -> Option<Self> {
        match principal.scope {
            Scope::Global => {}
            Scope::Formation(f) => {
                if self.formation_id.is_some_and(|x| x != f) {
                    return None;
                }
                self.formation_id = Some(f);
            }
            Scope::Office(o) => {
                if self.office_id.is_some_and(|x| x != o) {
                    return None;
                }
                self.office_id = Some(o);
            }
            Scope::OwnRecord(s) => {
                if self.staff_id.is_some_and(|x| x != s) {
                    return None;
                }
                self.staff_id = Some(s);
            }
        }
        Some(self)
    }

    pub fn matches(&self, staff: &Staff) -> bool {
        if let Some(needle) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            let hit = [&staff.surname, &staff.other_names, &staff.nis_no]
                .iter()
                .any(|hay| hay.to_lowercase().contains(&needle))
                || format!("{} {}", staff.surname, staff.other_names)
                    .to_lowercase()
                    .contains(&needle);
            if !hit {
                return false;
            }
        }
        (self.ranks.is_empty() || self.ranks.contains(&staff.rank))
            && self.formation_id.is_none_or(|f| f == staff.formation_id)
            && self.office_id.is_none_or(|o| staff.office_id == Some(o))
            && self.staff_id.is_none_or(|s| s == staff.id)
            && self.status.is_none_or(|s| s == staff.status)
            && self.gender.is_none_or(|g| staff.gender == Some(g))
            && self.dob.admits(staff.dob)
            && self.dopa.admits(staff.dopa)
            && self.exit_date.admits(staff.exit_date)
    }

    /// Apply offset/limit to an already ordered result.
    pub fn page<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Nominal-roll order: most senior rank first, then surname, then other names.
pub fn roll_order(a: &Staff, b: &Staff) -> Ordering {
    b.rank
        .cmp(&a.rank)
        .then_with(|| a.surname.to_lowercase().cmp(&b.surname.to_lowercase()))
        .then_with(|| a.other_names.to_lowercase().cmp(&b.other_names.to_lowercase()))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staff::tests::sample_staff;
    use nominalroll_auth::Role;
    use nominalroll_core::UserId;

    #[test]
    fn office_scope_pins_office_and_rejects_foreign_office() {
        let mine = OfficeId::new();
        let p = Principal::new(UserId::new(), Role::OfficeAdmin, Scope::Office(mine));

        let scoped = StaffFilter::default().scoped(&p).unwrap();
        assert_eq!(scoped.office_id, Some(mine));

        let foreign = StaffFilter {
            office_id: Some(OfficeId::new()),
            ..Default::default()
        };
        assert!(foreign.scoped(&p).is_none());
    }

    #[test]
    fn staff_scope_pins_own_record() {
        let me = StaffId::new();
        let p = Principal::new(UserId::new(), Role::StaffUser, Scope::OwnRecord(me));
        assert_eq!(StaffFilter::default().scoped(&p).unwrap().staff_id, Some(me));
    }

    #[test]
    fn matches_search_rank_and_dates() {
        let s = sample_staff();
        let by_name = StaffFilter {
            search: Some("okafor chidi".into()),
            ..Default::default()
        };
        assert!(by_name.matches(&s));

        let by_nis = StaffFilter {
            search: Some("nis/10".into()),
            ranks: vec![Rank::DeputySuperintendent, Rank::Superintendent],
            ..Default::default()
        };
        assert!(by_nis.matches(&s));

        let wrong_rank = StaffFilter {
            ranks: vec![Rank::Comptroller],
            ..Default::default()
        };
        assert!(!wrong_rank.matches(&s));

        let born_before_1970 = StaffFilter {
            dob: DateRange {
                from: None,
                to: NaiveDate::from_ymd_opt(1970, 1, 1),
            },
            ..Default::default()
        };
        assert!(!born_before_1970.matches(&s));

        let needs_dopa = StaffFilter {
            dopa: DateRange {
                from: NaiveDate::from_ymd_opt(2000, 1, 1),
                to: None,
            },
            ..Default::default()
        };
        assert!(!needs_dopa.matches(&s), "missing date never satisfies a bounded range");
    }

    #[test]
    fn roll_order_is_senior_first_then_surname() {
        let mut a = sample_staff();
        a.rank = Rank::Inspector;
        a.surname = "Adamu".into();
        let mut b = sample_staff();
        b.rank = Rank::Comptroller;
        b.surname = "Zubair".into();
        let mut c = sample_staff();
        c.rank = Rank::Inspector;
        c.surname = "bello".into();

        let mut roll = vec![a.clone(), c.clone(), b.clone()];
        roll.sort_by(roll_order);
        let names: Vec<_> = roll.iter().map(|s| s.surname.as_str()).collect();
        assert_eq!(names, vec!["Zubair", "Adamu", "bello"]);
    }

    #[test]
    fn page_applies_offset_then_limit() {
        let f = StaffFilter {
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        };
        assert_eq!(f.page(vec![1, 2, 3, 4]), vec![2, 3]);
    }
}
