use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::rolling::TeamForm;

/// Fields of the model input, in the order the scoring models were
/// trained against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    HomeAvgPoints,
    AwayAvgPoints,
    HomeHeadToHeadAvgPoints,
    AwayHeadToHeadAvgPoints,
    HomeLast5WinPct,
    AwayLast5WinPct,
    HomeSeasonWinPct,
    AwaySeasonWinPct,
    HomeAdvantage,
    PointsAvgDiff,
    WinrateDiff,
    HomeElo,
    AwayElo,
    EloDiff,
    HomeOffEffL10,
    AwayOffEffL10,
    HomeDefEffL10,
    AwayDefEffL10,
    HomeTsPctL10,
    AwayTsPctL10,
    HomeTovRateL10,
    AwayTovRateL10,
    HomeFgPctL10,
    AwayFgPctL10,
}

pub const FEATURE_COUNT: usize = 24;

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::HomeAvgPoints,
        Feature::AwayAvgPoints,
        Feature::HomeHeadToHeadAvgPoints,
        Feature::AwayHeadToHeadAvgPoints,
        Feature::HomeLast5WinPct,
        Feature::AwayLast5WinPct,
        Feature::HomeSeasonWinPct,
        Feature::AwaySeasonWinPct,
        Feature::HomeAdvantage,
        Feature::PointsAvgDiff,
        Feature::WinrateDiff,
        Feature::HomeElo,
        Feature::AwayElo,
        Feature::EloDiff,
        Feature::HomeOffEffL10,
        Feature::AwayOffEffL10,
        Feature::HomeDefEffL10,
        Feature::AwayDefEffL10,
        Feature::HomeTsPctL10,
        Feature::AwayTsPctL10,
        Feature::HomeTovRateL10,
        Feature::AwayTovRateL10,
        Feature::HomeFgPctL10,
        Feature::AwayFgPctL10,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::HomeAvgPoints => "home_avg_points",
            Feature::AwayAvgPoints => "away_avg_points",
            Feature::HomeHeadToHeadAvgPoints => "home_head_to_head_avg_points",
            Feature::AwayHeadToHeadAvgPoints => "away_head_to_head_avg_points",
            Feature::HomeLast5WinPct => "home_last_5_win_percentage",
            Feature::AwayLast5WinPct => "away_last_5_win_percentage",
            Feature::HomeSeasonWinPct => "home_season_win_percentage",
            Feature::AwaySeasonWinPct => "away_season_win_percentage",
            Feature::HomeAdvantage => "home_advantage",
            Feature::PointsAvgDiff => "points_avg_diff",
            Feature::WinrateDiff => "winrate_diff",
            Feature::HomeElo => "home_elo",
            Feature::AwayElo => "away_elo",
            Feature::EloDiff => "elo_diff",
            Feature::HomeOffEffL10 => "home_off_eff_L10",
            Feature::AwayOffEffL10 => "away_off_eff_L10",
            Feature::HomeDefEffL10 => "home_def_eff_L10",
            Feature::AwayDefEffL10 => "away_def_eff_L10",
            Feature::HomeTsPctL10 => "home_ts_pct_L10",
            Feature::AwayTsPctL10 => "away_ts_pct_L10",
            Feature::HomeTovRateL10 => "home_tov_rate_L10",
            Feature::AwayTovRateL10 => "away_tov_rate_L10",
            Feature::HomeFgPctL10 => "home_fg_pct_L10",
            Feature::AwayFgPctL10 => "away_fg_pct_L10",
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.into_iter().find(|f| f.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Everything the assembler needs for one matchup.
#[derive(Debug, Clone, Copy)]
pub struct MatchupInputs {
    pub home: TeamForm,
    pub away: TeamForm,
    pub home_elo: f64,
    pub away_elo: f64,
    pub home_h2h_avg: f64,
    pub away_h2h_avg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [Option<f64>; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn empty() -> Self {
        Self {
            values: [None; FEATURE_COUNT],
        }
    }

    /// Raw assembly; missing statistics stay `None`.
    pub fn assemble(inputs: &MatchupInputs) -> Self {
        let h = &inputs.home;
        let a = &inputs.away;
        let mut v = Self::empty();
        v.set(Feature::HomeAvgPoints, Some(h.avg_points));
        v.set(Feature::AwayAvgPoints, Some(a.avg_points));
        v.set(Feature::HomeHeadToHeadAvgPoints, Some(inputs.home_h2h_avg));
        v.set(Feature::AwayHeadToHeadAvgPoints, Some(inputs.away_h2h_avg));
        v.set(Feature::HomeLast5WinPct, Some(h.last_5_win_pct));
        v.set(Feature::AwayLast5WinPct, Some(a.last_5_win_pct));
        v.set(Feature::HomeSeasonWinPct, Some(h.season_win_pct));
        v.set(Feature::AwaySeasonWinPct, Some(a.season_win_pct));
        v.set(Feature::HomeAdvantage, Some(1.0));
        v.set(Feature::PointsAvgDiff, Some(h.avg_points - a.avg_points));
        v.set(Feature::WinrateDiff, Some(h.season_win_pct - a.season_win_pct));
        v.set(Feature::HomeElo, Some(inputs.home_elo));
        v.set(Feature::AwayElo, Some(inputs.away_elo));
        v.set(Feature::EloDiff, Some(inputs.home_elo - inputs.away_elo));
        v.set(Feature::HomeOffEffL10, h.off_eff_l10);
        v.set(Feature::AwayOffEffL10, a.off_eff_l10);
        v.set(Feature::HomeDefEffL10, h.def_eff_l10);
        v.set(Feature::AwayDefEffL10, a.def_eff_l10);
        v.set(Feature::HomeTsPctL10, h.ts_pct_l10);
        v.set(Feature::AwayTsPctL10, a.ts_pct_l10);
        v.set(Feature::HomeTovRateL10, h.tov_rate_l10);
        v.set(Feature::AwayTovRateL10, a.tov_rate_l10);
        v.set(Feature::HomeFgPctL10, h.fg_pct_l10);
        v.set(Feature::AwayFgPctL10, a.fg_pct_l10);
        v
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.values[feature.index()]
    }

    pub fn set(&mut self, feature: Feature, value: Option<f64>) {
        self.values[feature.index()] = value.filter(|v| v.is_finite());
    }

    pub fn by_name(&self, name: &str) -> Option<Option<f64>> {
        Feature::from_name(name).map(|f| self.get(f))
    }

    pub fn missing(&self) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    /// Fills missing fields from `medians`. Fields without a median are
    /// left as they are.
    pub fn impute(&self, medians: &FeatureMedians) -> Self {
        let mut out = *self;
        for f in Feature::ALL {
            if out.get(f).is_none()
                && let Some(m) = medians.get(f.name())
            {
                out.set(f, Some(m));
            }
        }
        out
    }

    /// Flat values in [`Feature::ALL`] order; missing fields become NaN.
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
    }

    pub fn named(&self) -> Vec<(&'static str, f64)> {
        Feature::ALL
            .into_iter()
            .map(|f| (f.name(), self.get(f).unwrap_or(f64::NAN)))
            .collect()
    }
}

/// Per-field medians used to fill missing values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMedians {
    medians: BTreeMap<String, f64>,
}

impl FeatureMedians {
    pub fn new(medians: HashMap<String, f64>) -> Self {
        Self {
            medians: medians.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.medians.get(name).copied().filter(|v| v.is_finite())
    }

    pub fn len(&self) -> usize {
        self.medians.len()
    }

    pub fn is_empty(&self) -> bool {
        self.medians.is_empty()
    }

    /// Medians over the present values of each field.
    pub fn from_vectors(rows: &[FeatureVector]) -> Self {
        let mut medians = BTreeMap::new();
        for f in Feature::ALL {
            let mut vals: Vec<f64> = rows.iter().filter_map(|r| r.get(f)).collect();
            if let Some(m) = median(&mut vals) {
                medians.insert(f.name().to_string(), m);
            }
        }
        Self { medians }
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read feature medians {}", path.display()))?;
        let medians = serde_json::from_str::<BTreeMap<String, f64>>(&raw)
            .with_context(|| format!("parse feature medians {}", path.display()))?;
        Ok(Self { medians })
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.medians).context("serialize medians")?;
        fs::write(&tmp, json).context("write feature medians")?;
        fs::rename(&tmp, path).context("swap feature medians")?;
        Ok(())
    }
}

fn median(vals: &mut [f64]) -> Option<f64> {
    if vals.is_empty() {
        return None;
    }
    vals.sort_by(|a, b| a.total_cmp(b));
    let mid = vals.len() / 2;
    if vals.len() % 2 == 0 {
        Some((vals[mid - 1] + vals[mid]) / 2.0)
    } else {
        Some(vals[mid])
    }
}
