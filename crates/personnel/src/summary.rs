//! Dashboard tallies over a (scoped) staff set.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use nominalroll_core::FormationId;

use crate::leave::LeaveRequest;
use crate::org::Formation;
use crate::rank::{Cadre, Rank};
use crate::staff::{Staff, StaffStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankCount {
    pub rank: Rank,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormationCount {
    pub formation_id: FormationId,
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub active: usize,
    pub on_leave: usize,
    pub due_for_retirement: usize,
    /// Most senior rank first.
    pub by_rank: Vec<RankCount>,
    pub by_cadre: BTreeMap<Cadre, usize>,
    pub by_formation: Vec<FormationCount>,
}

impl DashboardSummary {
    pub fn tally(
        staff: &[Staff],
        formations: &[Formation],
        leaves: &[LeaveRequest],
        today: NaiveDate,
    ) -> Self {
        let mut by_rank: BTreeMap<Rank, usize> = BTreeMap::new();
        let mut by_cadre: BTreeMap<Cadre, usize> = BTreeMap::new();
        let mut by_formation: BTreeMap<FormationId, usize> = BTreeMap::new();

        for s in staff {
            *by_rank.entry(s.rank).or_default() += 1;
            *by_cadre.entry(s.rank.cadre()).or_default() += 1;
            *by_formation.entry(s.formation_id).or_default() += 1;
        }

        let on_leave = staff
            .iter()
            .filter(|s| leaves.iter().any(|l| l.staff_id == s.id && l.covers(today)))
            .count();

        let mut by_formation: Vec<FormationCount> = by_formation
            .into_iter()
            .map(|(formation_id, count)| FormationCount {
                formation_id,
                name: formations
                    .iter()
                    .find(|f| f.id == formation_id)
                    .map(|f| f.name.clone())
                    .unwrap_or_default(),
                count,
            })
            .collect();
        by_formation.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

        Self {
            total: staff.len(),
            active: staff.iter().filter(|s| s.status == StaffStatus::Active).count(),
            on_leave,
            due_for_retirement: staff.iter().filter(|s| s.is_due_for_retirement(today)).count(),
            by_rank: by_rank
                .into_iter()
                .rev()
                .map(|(rank, count)| RankCount { rank, count })
                .collect(),
            by_cadre,
            by_formation,
        }
    }
}
