use std::collections::HashSet;

use serde::Serialize;

/// Which output table a piece of work targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Team,
    Player,
}

impl Aspect {
    pub const ALL: [Aspect; 2] = [Aspect::Team, Aspect::Player];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::Player => "player",
        }
    }
}

/// Match ids already persisted, per aspect, as read from the warehouse at the
/// start of a run.
#[derive(Debug, Clone, Default)]
pub struct ProcessedMatchIndex {
    pub team: HashSet<String>,
    pub player: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub match_id: String,
    pub needs_team: bool,
    pub needs_player: bool,
}

impl PlanEntry {
    pub fn needs(&self, aspect: Aspect) -> bool {
        match aspect {
            Aspect::Team => self.needs_team,
            Aspect::Player => self.needs_player,
        }
    }
}

/// Keeps the listing's order, collapses repeated ids and leaves out matches
/// already done for both aspects. `limit` applies after exclusion.
pub fn plan<S: AsRef<str>>(
    all_match_ids: &[S],
    done: &ProcessedMatchIndex,
    limit: Option<usize>,
) -> Vec<PlanEntry> {
    let cap = limit.unwrap_or(usize::MAX);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in all_match_ids {
        if out.len() >= cap {
            break;
        }
        let id = id.as_ref();
        if !seen.insert(id) {
            continue;
        }
        let needs_team = !done.team.contains(id);
        let needs_player = !done.player.contains(id);
        if !needs_team && !needs_player {
            continue;
        }
        out.push(PlanEntry {
            match_id: id.to_string(),
            needs_team,
            needs_player,
        });
    }
    out
}
