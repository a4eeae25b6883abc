use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::features::{Feature, FeatureVector};

/// Half-width of the projected points band around each team's point estimate.
pub const POINTS_RANGE_HALF_WIDTH: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    Identity,
    Logistic,
}

/// A pretrained linear model with its input scaler folded in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    #[serde(default)]
    pub name: String,
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub means: Vec<f64>,
    #[serde(default)]
    pub stds: Vec<f64>,
    pub coeffs: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
    pub link: Link,
}

impl ModelArtifact {
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read model artifact {}", path.display()))?;
        let mut artifact: ModelArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("parse model artifact {}", path.display()))?;
        if artifact.name.is_empty()
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            artifact.name = stem.to_string();
        }
        artifact.validate()?;
        Ok(artifact)
    }

    /// Checks the artifact is internally consistent and that every feature it
    /// names exists. Missing scaler vectors mean "no scaling".
    pub fn validate(&self) -> Result<(), PipelineError> {
        let n = self.feature_names.len();
        let bad = |reason: String| PipelineError::InvalidArtifact {
            model: self.name.clone(),
            reason,
        };
        if self.coeffs.len() != n {
            return Err(bad(format!(
                "{} coefficients for {} features",
                self.coeffs.len(),
                n
            )));
        }
        if !self.means.is_empty() && self.means.len() != n {
            return Err(bad(format!("{} means for {} features", self.means.len(), n)));
        }
        if !self.stds.is_empty() && self.stds.len() != n {
            return Err(bad(format!("{} stds for {} features", self.stds.len(), n)));
        }
        if let Some(name) = self
            .feature_names
            .iter()
            .find(|name| Feature::from_name(name).is_none())
        {
            return Err(PipelineError::UnknownFeature {
                model: self.name.clone(),
                feature: name.clone(),
            });
        }
        Ok(())
    }

    /// The model inputs in artifact order.
    pub fn select(&self, features: &FeatureVector) -> Result<Vec<f64>, PipelineError> {
        self.feature_names
            .iter()
            .map(|name| match features.by_name(name) {
                Some(Some(v)) => Ok(v),
                Some(None) => Err(PipelineError::MissingFeatureValue {
                    model: self.name.clone(),
                    feature: name.clone(),
                }),
                None => Err(PipelineError::UnknownFeature {
                    model: self.name.clone(),
                    feature: name.clone(),
                }),
            })
            .collect()
    }

    pub fn linear_predictor(&self, inputs: &[f64]) -> f64 {
        let mut z = self.intercept;
        for (idx, (x, coeff)) in inputs.iter().zip(&self.coeffs).enumerate() {
            let mean = self.means.get(idx).copied().unwrap_or(0.0);
            let std = match self.stds.get(idx).copied() {
                Some(s) if s > 0.0 && s.is_finite() => s,
                _ => 1.0,
            };
            z += coeff * (x - mean) / std;
        }
        z
    }

    pub fn score(&self, features: &FeatureVector) -> Result<f64, PipelineError> {
        let inputs = self.select(features)?;
        let z = self.linear_predictor(&inputs);
        Ok(match self.link {
            Link::Identity => z,
            Link::Logistic => sigmoid(z),
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SidePair {
    pub home: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointsRange {
    pub min: f64,
    pub max: f64,
}

impl PointsRange {
    pub fn around(points: f64) -> Self {
        Self {
            min: points - POINTS_RANGE_HALF_WIDTH,
            max: points + POINTS_RANGE_HALF_WIDTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointsRanges {
    pub home: PointsRange,
    pub away: PointsRange,
}

/// Prediction payload stored against a scheduled game.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePrediction {
    pub win_probability: SidePair,
    pub points_range: PointsRanges,
    pub expected_margin: f64,
    pub overtime_probability: f64,
}

/// File names the model set is loaded from, relative to the models directory.
pub const WIN_PROB_FILE: &str = "win_probability_model.json";
pub const HOME_POINTS_FILE: &str = "home_points_model.json";
pub const AWAY_POINTS_FILE: &str = "away_points_model.json";
pub const MARGIN_FILE: &str = "expected_margin_model.json";
pub const OVERTIME_FILE: &str = "overtime_model.json";

#[derive(Debug, Clone)]
pub struct ModelSet {
    pub win_prob: ModelArtifact,
    pub home_points: ModelArtifact,
    pub away_points: ModelArtifact,
    pub margin: ModelArtifact,
    pub overtime: ModelArtifact,
}

impl ModelSet {
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let load = |file: &str| -> Result<ModelArtifact> {
            let path: PathBuf = dir.join(file);
            ModelArtifact::load_json(&path)
        };
        let set = Self {
            win_prob: load(WIN_PROB_FILE)?,
            home_points: load(HOME_POINTS_FILE)?,
            away_points: load(AWAY_POINTS_FILE)?,
            margin: load(MARGIN_FILE)?,
            overtime: load(OVERTIME_FILE)?,
        };
        for (artifact, expected) in [
            (&set.win_prob, Link::Logistic),
            (&set.overtime, Link::Logistic),
        ] {
            if artifact.link != expected {
                return Err(PipelineError::InvalidArtifact {
                    model: artifact.name.clone(),
                    reason: "probability models need a logistic link".to_string(),
                }
                .into());
            }
        }
        Ok(set)
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<GamePrediction, PipelineError> {
        let p_home = self.win_prob.score(features)?;
        let home_points = self.home_points.score(features)?;
        let away_points = self.away_points.score(features)?;
        Ok(GamePrediction {
            win_probability: SidePair {
                home: p_home,
                away: 1.0 - p_home,
            },
            points_range: PointsRanges {
                home: PointsRange::around(home_points),
                away: PointsRange::around(away_points),
            },
            expected_margin: self.margin.score(features)?,
            overtime_probability: self.overtime.score(features)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn artifact(names: &[&str], coeffs: &[f64], link: Link) -> ModelArtifact {
        ModelArtifact {
            name: "test".to_string(),
            feature_names: names.iter().map(|s| s.to_string()).collect(),
            means: Vec::new(),
            stds: Vec::new(),
            coeffs: coeffs.to_vec(),
            intercept: 0.0,
            link,
        }
    }

    fn vector(pairs: &[(Feature, f64)]) -> FeatureVector {
        let mut v = FeatureVector::empty();
        for (f, x) in pairs {
            v.set(*f, Some(*x));
        }
        v
    }

    #[test]
    fn standardizes_before_applying_coefficients() {
        let mut m = artifact(&["home_elo"], &[2.0], Link::Identity);
        m.means = vec![1500.0];
        m.stds = vec![50.0];
        m.intercept = 1.0;
        let v = vector(&[(Feature::HomeElo, 1600.0)]);
        assert_relative_eq!(m.score(&v).unwrap(), 1.0 + 2.0 * 2.0);
    }

    #[test]
    fn zero_std_is_treated_as_unit() {
        let mut m = artifact(&["home_advantage"], &[3.0], Link::Identity);
        m.means = vec![0.0];
        m.stds = vec![0.0];
        let v = vector(&[(Feature::HomeAdvantage, 1.0)]);
        assert_relative_eq!(m.score(&v).unwrap(), 3.0);
    }

    #[test]
    fn logistic_link_is_bounded() {
        let m = artifact(&["elo_diff"], &[1.0], Link::Logistic);
        let hi = m.score(&vector(&[(Feature::EloDiff, 800.0)])).unwrap();
        let lo = m.score(&vector(&[(Feature::EloDiff, -800.0)])).unwrap();
        let mid = m.score(&vector(&[(Feature::EloDiff, 0.0)])).unwrap();
        assert!(hi <= 1.0 && hi > 0.99);
        assert!(lo >= 0.0 && lo < 0.01);
        assert_relative_eq!(mid, 0.5);
    }

    #[test]
    fn unknown_feature_fails_validation() {
        let m = artifact(&["home_rebounds"], &[1.0], Link::Identity);
        assert!(matches!(
            m.validate(),
            Err(PipelineError::UnknownFeature { .. })
        ));
    }

    #[test]
    fn coefficient_count_must_match() {
        let m = artifact(&["home_elo", "away_elo"], &[1.0], Link::Identity);
        assert!(matches!(
            m.validate(),
            Err(PipelineError::InvalidArtifact { .. })
        ));
    }

    #[test]
    fn missing_input_value_is_reported() {
        let m = artifact(&["home_ts_pct_L10"], &[1.0], Link::Identity);
        let err = m.score(&FeatureVector::empty()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingFeatureValue { .. }));
    }

    #[test]
    fn prediction_serializes_with_camel_case_keys() {
        let p = GamePrediction {
            win_probability: SidePair {
                home: 0.6,
                away: 0.4,
            },
            points_range: PointsRanges {
                home: PointsRange::around(110.0),
                away: PointsRange::around(104.0),
            },
            expected_margin: 6.0,
            overtime_probability: 0.05,
        };
        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json["winProbability"]["home"], 0.6);
        assert_eq!(json["pointsRange"]["home"]["min"], 100.0);
        assert_eq!(json["pointsRange"]["away"]["max"], 114.0);
        assert_eq!(json["overtimeProbability"], 0.05);
    }
}
