use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub u32);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamEntry {
    pub id: TeamId,
    pub name: String,
    pub abbreviation: String,
}

// (full name, abbreviation); ids are assigned from 132 in this order.
const DEFAULT_TEAMS: [(&str, &str); 30] = [
    ("Atlanta Hawks", "ATL"),
    ("Boston Celtics", "BOS"),
    ("Brooklyn Nets", "BKN"),
    ("Charlotte Hornets", "CHA"),
    ("Chicago Bulls", "CHI"),
    ("Cleveland Cavaliers", "CLE"),
    ("Dallas Mavericks", "DAL"),
    ("Denver Nuggets", "DEN"),
    ("Detroit Pistons", "DET"),
    ("Golden State Warriors", "GSW"),
    ("Houston Rockets", "HOU"),
    ("Indiana Pacers", "IND"),
    ("LA Clippers", "LAC"),
    ("Los Angeles Lakers", "LAL"),
    ("Memphis Grizzlies", "MEM"),
    ("Miami Heat", "MIA"),
    ("Milwaukee Bucks", "MIL"),
    ("Minnesota Timberwolves", "MIN"),
    ("New Orleans Pelicans", "NOP"),
    ("New York Knicks", "NYK"),
    ("Oklahoma City Thunder", "OKC"),
    ("Orlando Magic", "ORL"),
    ("Philadelphia 76ers", "PHI"),
    ("Phoenix Suns", "PHX"),
    ("Portland Trail Blazers", "POR"),
    ("Sacramento Kings", "SAC"),
    ("San Antonio Spurs", "SAS"),
    ("Toronto Raptors", "TOR"),
    ("Utah Jazz", "UTA"),
    ("Washington Wizards", "WAS"),
];

const FIRST_DEFAULT_ID: u32 = 132;

#[derive(Debug, Deserialize)]
struct TeamCsvRow {
    #[serde(rename = "Team")]
    team: String,
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "Abbreviation", default)]
    abbreviation: Option<String>,
}

/// Name/abbreviation lookup for the product's team identifiers.
#[derive(Debug, Clone, Default)]
pub struct TeamDirectory {
    entries: Vec<TeamEntry>,
    by_name: HashMap<String, usize>,
    by_abbreviation: HashMap<String, usize>,
    by_id: HashMap<TeamId, usize>,
}

impl TeamDirectory {
    pub fn builtin() -> Self {
        let entries = DEFAULT_TEAMS
            .iter()
            .enumerate()
            .map(|(idx, (name, abbr))| TeamEntry {
                id: TeamId(FIRST_DEFAULT_ID + idx as u32),
                name: name.to_string(),
                abbreviation: abbr.to_string(),
            })
            .collect();
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<TeamEntry>) -> Self {
        let mut dir = Self::default();
        for entry in entries {
            let idx = dir.entries.len();
            dir.by_name.insert(normalize_name(&entry.name), idx);
            if !entry.abbreviation.is_empty() {
                dir.by_abbreviation
                    .insert(entry.abbreviation.to_ascii_uppercase(), idx);
            }
            dir.by_id.insert(entry.id, idx);
            dir.entries.push(entry);
        }
        // The source data spells the Clippers both ways.
        if let Some(idx) = dir.by_name.get("la clippers").copied() {
            dir.by_name
                .entry("los angeles clippers".to_string())
                .or_insert(idx);
        }
        dir
    }

    /// Loads a `Team,ID[,Abbreviation]` CSV. Missing abbreviations are
    /// filled from the built-in table when the full name matches.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("open team csv {}", path.display()))?;
        let builtin = Self::builtin();
        let mut entries = Vec::new();
        for row in rdr.deserialize::<TeamCsvRow>() {
            let row = row.context("decode team csv row")?;
            let abbreviation = row
                .abbreviation
                .filter(|a| !a.trim().is_empty())
                .or_else(|| builtin.by_name(&row.team).map(|e| e.abbreviation.clone()))
                .unwrap_or_default();
            entries.push(TeamEntry {
                id: TeamId(row.id),
                name: row.team.trim().to_string(),
                abbreviation: abbreviation.trim().to_ascii_uppercase(),
            });
        }
        Ok(Self::from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TeamEntry] {
        &self.entries
    }

    pub fn by_name(&self, name: &str) -> Option<&TeamEntry> {
        self.by_name
            .get(&normalize_name(name))
            .map(|idx| &self.entries[*idx])
    }

    pub fn by_abbreviation(&self, abbr: &str) -> Option<&TeamEntry> {
        self.by_abbreviation
            .get(&abbr.trim().to_ascii_uppercase())
            .map(|idx| &self.entries[*idx])
    }

    pub fn by_id(&self, id: TeamId) -> Option<&TeamEntry> {
        self.by_id.get(&id).map(|idx| &self.entries[*idx])
    }

    pub fn abbreviation(&self, id: TeamId) -> Result<&str, PipelineError> {
        self.by_id(id)
            .map(|e| e.abbreviation.as_str())
            .ok_or_else(|| PipelineError::UnknownTeam(id.to_string()))
    }

    /// Resolves a team by full name first, then abbreviation.
    pub fn resolve(&self, raw: &str) -> Option<TeamId> {
        self.by_name(raw)
            .or_else(|| self.by_abbreviation(raw))
            .map(|e| e.id)
    }
}

fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
