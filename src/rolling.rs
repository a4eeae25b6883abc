//! Trailing-window and expanding team statistics.
//!
//! Every value produced for position `i` of a team's chronological game
//! list is computed from positions strictly before `i`. Windows use a
//! minimum period of one: a 10-game window over 3 prior games uses those 3.
//! A window with no usable data, or a ratio whose denominator sums to
//! zero, is missing (`None`).

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::game_log::GameRecord;

pub const DEFAULT_AVG_POINTS: f64 = 150.0;
pub const DEFAULT_WIN_RATE: f64 = 0.5;

pub const SHORT_WINDOW: usize = 5;
pub const LONG_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// The last `n` positions before `i`.
    Trailing(usize),
    /// Every position before `i`.
    Expanding,
}

impl Window {
    pub fn range(self, i: usize) -> Range<usize> {
        match self {
            Window::Trailing(n) => i.saturating_sub(n)..i,
            Window::Expanding => 0..i,
        }
    }
}

/// Mean of the present values in `window` before `i`.
pub fn mean_before(values: &[Option<f64>], window: Window, i: usize) -> Option<f64> {
    let range = window.range(i.min(values.len()));
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values[range].iter().flatten() {
        sum += v;
        n += 1;
    }
    if n == 0 { None } else { Some(sum / n as f64) }
}

/// `scale * Σnum / Σden` over the positions in `window` before `i` where
/// both sides are present.
pub fn ratio_before(
    num: &[Option<f64>],
    den: &[Option<f64>],
    window: Window,
    i: usize,
    scale: f64,
) -> Option<f64> {
    let len = num.len().min(den.len());
    let range = window.range(i.min(len));
    let mut num_sum = 0.0;
    let mut den_sum = 0.0;
    let mut n = 0usize;
    for idx in range {
        let (Some(a), Some(b)) = (num[idx], den[idx]) else {
            continue;
        };
        num_sum += a;
        den_sum += b;
        n += 1;
    }
    if n == 0 || den_sum == 0.0 {
        return None;
    }
    let v = scale * num_sum / den_sum;
    v.is_finite().then_some(v)
}

/// The full shifted series: element `i` is `mean_before(values, window, i)`.
pub fn shifted_mean_series(values: &[Option<f64>], window: Window) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| mean_before(values, window, i))
        .collect()
}

pub fn shifted_ratio_series(
    num: &[Option<f64>],
    den: &[Option<f64>],
    window: Window,
    scale: f64,
) -> Vec<Option<f64>> {
    (0..num.len().min(den.len()))
        .map(|i| ratio_before(num, den, window, i, scale))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Points,
    WinRate,
    OffensiveEfficiency,
    DefensiveEfficiency,
    TrueShooting,
    TurnoverRate,
    FieldGoalPct,
}

impl Stat {
    /// Shifted series of this statistic over a chronological game list.
    pub fn series(self, games: &[&GameRecord], window: Window) -> Vec<Option<f64>> {
        let cols = Columns::new(games);
        (0..games.len())
            .map(|i| cols.value(self, window, i))
            .collect()
    }

    /// Value for position `i`, using positions `< i` only.
    pub fn before(self, games: &[&GameRecord], window: Window, i: usize) -> Option<f64> {
        Columns::new(games).value(self, window, i)
    }
}

struct Columns {
    points: Vec<Option<f64>>,
    wins: Vec<Option<f64>>,
    opp_points: Vec<Option<f64>>,
    possessions: Vec<Option<f64>>,
    fgm: Vec<Option<f64>>,
    fga: Vec<Option<f64>>,
    shooting_den: Vec<Option<f64>>,
    tov: Vec<Option<f64>>,
}

impl Columns {
    fn new(games: &[&GameRecord]) -> Self {
        let col = |f: &dyn Fn(&GameRecord) -> Option<f64>| -> Vec<Option<f64>> {
            games.iter().map(|g| f(*g)).collect()
        };
        Self {
            points: col(&|g| Some(g.points as f64)),
            wins: col(&|g| Some(if g.won { 1.0 } else { 0.0 })),
            opp_points: col(&|g| g.opponent_points.map(|p| p as f64)),
            possessions: col(&|g| Some(g.possessions())),
            fgm: col(&|g| Some(g.fgm as f64)),
            fga: col(&|g| Some(g.fga as f64)),
            shooting_den: col(&|g| Some(2.0 * (g.fga as f64 + 0.44 * g.fta as f64))),
            tov: col(&|g| Some(g.tov as f64)),
        }
    }

    fn value(&self, stat: Stat, window: Window, i: usize) -> Option<f64> {
        match stat {
            Stat::Points => mean_before(&self.points, window, i),
            Stat::WinRate => mean_before(&self.wins, window, i),
            Stat::OffensiveEfficiency => {
                ratio_before(&self.points, &self.possessions, window, i, 100.0)
            }
            Stat::DefensiveEfficiency => {
                ratio_before(&self.opp_points, &self.possessions, window, i, 100.0)
            }
            Stat::TrueShooting => ratio_before(&self.points, &self.shooting_den, window, i, 1.0),
            Stat::TurnoverRate => ratio_before(&self.tov, &self.possessions, window, i, 1.0),
            Stat::FieldGoalPct => ratio_before(&self.fgm, &self.fga, window, i, 1.0),
        }
    }
}

/// A team's form as of one position in its game list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamForm {
    /// Number of prior games the statistics were computed from.
    pub prior_games: usize,
    pub avg_points: f64,
    pub avg_points_l5: Option<f64>,
    pub avg_points_l10: Option<f64>,
    pub last_5_win_pct: f64,
    pub season_win_pct: f64,
    pub off_eff_l10: Option<f64>,
    pub def_eff_l10: Option<f64>,
    pub ts_pct_l10: Option<f64>,
    pub tov_rate_l10: Option<f64>,
    pub fg_pct_l10: Option<f64>,
}

impl TeamForm {
    /// Form of a team with no prior games.
    pub fn empty() -> Self {
        Self {
            prior_games: 0,
            avg_points: DEFAULT_AVG_POINTS,
            avg_points_l5: None,
            avg_points_l10: None,
            last_5_win_pct: DEFAULT_WIN_RATE,
            season_win_pct: DEFAULT_WIN_RATE,
            off_eff_l10: None,
            def_eff_l10: None,
            ts_pct_l10: None,
            tov_rate_l10: None,
            fg_pct_l10: None,
        }
    }

    /// Statistics for position `i`, from positions `< i`.
    ///
    /// Points and win-rate fields fall back to the documented defaults when
    /// no prior game exists; everything else stays missing for imputation.
    pub fn as_of(games: &[&GameRecord], i: usize) -> Self {
        let i = i.min(games.len());
        if i == 0 {
            return Self::empty();
        }
        let cols = Columns::new(games);
        let short = Window::Trailing(SHORT_WINDOW);
        let long = Window::Trailing(LONG_WINDOW);
        Self {
            prior_games: i,
            avg_points: cols
                .value(Stat::Points, Window::Expanding, i)
                .unwrap_or(DEFAULT_AVG_POINTS),
            avg_points_l5: cols.value(Stat::Points, short, i),
            avg_points_l10: cols.value(Stat::Points, long, i),
            last_5_win_pct: cols
                .value(Stat::WinRate, short, i)
                .unwrap_or(DEFAULT_WIN_RATE),
            season_win_pct: cols
                .value(Stat::WinRate, Window::Expanding, i)
                .unwrap_or(DEFAULT_WIN_RATE),
            off_eff_l10: cols.value(Stat::OffensiveEfficiency, long, i),
            def_eff_l10: cols.value(Stat::DefensiveEfficiency, long, i),
            ts_pct_l10: cols.value(Stat::TrueShooting, long, i),
            tov_rate_l10: cols.value(Stat::TurnoverRate, long, i),
            fg_pct_l10: cols.value(Stat::FieldGoalPct, long, i),
        }
    }

    /// The "as of today" value: the last element of the shifted series,
    /// i.e. evaluated at the most recent game and excluding it.
    pub fn latest(games: &[&GameRecord]) -> Self {
        Self::as_of(games, games.len().saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn vals(raw: &[f64]) -> Vec<Option<f64>> {
        raw.iter().copied().map(Some).collect()
    }

    #[test]
    fn trailing_window_is_shifted_by_one() {
        let v = vals(&[10.0, 20.0, 30.0, 40.0]);
        let s = shifted_mean_series(&v, Window::Trailing(2));
        assert_eq!(s[0], None);
        assert_eq!(s[1], Some(10.0));
        assert_eq!(s[2], Some(15.0));
        assert_eq!(s[3], Some(25.0));
    }

    #[test]
    fn expanding_window_uses_every_prior_value() {
        let v = vals(&[1.0, 2.0, 3.0, 4.0]);
        let s = shifted_mean_series(&v, Window::Expanding);
        assert_eq!(s, vec![None, Some(1.0), Some(1.5), Some(2.0)]);
    }

    #[test]
    fn missing_values_are_skipped_not_zeroed() {
        let v = vec![Some(10.0), None, Some(30.0)];
        assert_eq!(mean_before(&v, Window::Expanding, 3), Some(20.0));
    }

    #[test]
    fn ratio_with_zero_denominator_is_missing() {
        let num = vals(&[0.0, 0.0]);
        let den = vals(&[0.0, 0.0]);
        assert_eq!(ratio_before(&num, &den, Window::Expanding, 2, 1.0), None);
    }

    #[test]
    fn ratio_is_of_sums_not_mean_of_ratios() {
        let num = vals(&[1.0, 9.0]);
        let den = vals(&[2.0, 10.0]);
        let r = ratio_before(&num, &den, Window::Expanding, 2, 1.0).unwrap();
        assert_relative_eq!(r, 10.0 / 12.0);
    }

    #[test]
    fn index_past_end_is_clamped() {
        let v = vals(&[4.0, 8.0]);
        assert_eq!(mean_before(&v, Window::Trailing(5), 99), Some(6.0));
    }
}
