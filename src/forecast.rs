//! Forecast inputs: per-step slices, CSV tables and synthetic demo profiles.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::AgentConfig;
use crate::devices::AssetKind;
use crate::error::ModelError;

/// Named scalar forecasts for one step, keyed `{plant}_{attribute}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastSlice {
    values: BTreeMap<String, f64>,
}

impl ForecastSlice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Looks up `{plant_id}_{attribute}`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingData`] when the key is absent or not a
    /// finite number. Absent values are never defaulted to zero.
    pub fn require(&self, plant_id: &str, attribute: &str) -> Result<f64, ModelError> {
        let key = format!("{plant_id}_{attribute}");
        match self.values.get(&key) {
            Some(v) if v.is_finite() => Ok(*v),
            Some(v) => Err(ModelError::missing(format!(
                "forecast `{key}` is not a number ({v})"
            ))),
            None => Err(ModelError::missing(format!("no forecast for `{key}`"))),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for ForecastSlice {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        let mut slice = Self::new();
        for (k, v) in iter {
            slice.insert(k, v);
        }
        slice
    }
}

/// Forecast time series for a whole run, one column per key.
///
/// Steps past the end of the table repeat it from the start ("tomorrow is
/// today").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastTable {
    keys: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl ForecastTable {
    /// Builds a table from equally long columns.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the columns differ in length.
    pub fn from_columns(columns: BTreeMap<String, Vec<f64>>) -> Result<Self, ModelError> {
        let len = columns.values().map(Vec::len).next().unwrap_or(0);
        if let Some((key, col)) = columns.iter().find(|(_, c)| c.len() != len) {
            return Err(ModelError::configuration(format!(
                "forecast column `{key}` has {} rows, expected {len}",
                col.len()
            )));
        }
        let keys: Vec<String> = columns.keys().cloned().collect();
        let rows = (0..len)
            .map(|i| columns.values().map(|col| col[i]).collect())
            .collect();
        Ok(Self { keys, rows })
    }

    /// Reads a wide CSV: a `timestamp` column (ignored) and one numeric
    /// column per forecast key.
    pub fn from_reader(reader: impl Read) -> Result<Self, ModelError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| ModelError::configuration(format!("forecast csv: {e}")))?
            .clone();

        let columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| *h != "timestamp")
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut rows = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record =
                record.map_err(|e| ModelError::configuration(format!("forecast csv: {e}")))?;
            let mut row = Vec::with_capacity(columns.len());
            for (i, key) in &columns {
                let raw = record.get(*i).unwrap_or("").trim();
                let value = raw.parse::<f64>().map_err(|_| {
                    ModelError::configuration(format!(
                        "forecast csv row {}: `{key}` = \"{raw}\" is not a number",
                        line + 1
                    ))
                })?;
                row.push(value);
            }
            rows.push(row);
        }

        Ok(Self {
            keys: columns.into_iter().map(|(_, k)| k).collect(),
            rows,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path).map_err(|e| {
            ModelError::configuration(format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_reader(file)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The slice for `step`, wrapping around the end of the table.
    pub fn slice(&self, step: usize) -> ForecastSlice {
        if self.rows.is_empty() {
            return ForecastSlice::default();
        }
        let row = &self.rows[step % self.rows.len()];
        self.keys
            .iter()
            .cloned()
            .zip(row.iter().copied())
            .collect()
    }
}

/// Seeded generator of demo forecast series for an agent's plants.
///
/// Loads follow a daily sinusoid, PV a half-cosine between sunrise and
/// sunset, and EVs are away during the working day. Gaussian noise is added
/// via Box-Muller.
#[derive(Debug, Clone)]
pub struct SyntheticProfile {
    steps_per_day: usize,
    rng: StdRng,
}

impl SyntheticProfile {
    pub fn new(step_seconds: f64, seed: u64) -> Self {
        let steps_per_day = ((86_400.0 / step_seconds).round() as usize).max(1);
        Self {
            steps_per_day,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn day_pos(&self, t: usize) -> f64 {
        (t % self.steps_per_day) as f64 / self.steps_per_day as f64
    }

    fn noise(&mut self, std_dev: f64) -> f64 {
        if std_dev <= 0.0 {
            return 0.0;
        }
        let u1: f64 = self.rng.random::<f64>().clamp(1e-9, 1.0);
        let u2: f64 = self.rng.random::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos() * std_dev
    }

    fn sinusoid(&mut self, t: usize, base: f64, amp: f64, phase: f64, std_dev: f64) -> f64 {
        let angle = 2.0 * std::f64::consts::PI * self.day_pos(t) + phase;
        (base + amp * angle.sin() + self.noise(std_dev)).max(0.0).round()
    }

    fn daylight(&mut self, t: usize, peak: f64) -> f64 {
        let hour = self.day_pos(t) * 24.0;
        if !(6.0..18.0).contains(&hour) {
            return 0.0;
        }
        let frac = (std::f64::consts::PI * (hour - 6.0) / 12.0).sin();
        (peak * frac * (1.0 + self.noise(0.05))).max(0.0).round()
    }

    fn at_home(&self, t: usize) -> bool {
        let hour = self.day_pos(t) * 24.0;
        !(8.0..17.0).contains(&hour)
    }

    /// Generates `steps` rows for every forecast key the agent's plants read.
    pub fn table_for(&mut self, agents: &[AgentConfig], steps: usize) -> ForecastTable {
        let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for agent in agents {
            for plant in &agent.plants {
                let Ok(kind) = plant.kind() else {
                    continue;
                };
                let id = &plant.id;
                match kind {
                    AssetKind::InflexibleLoad | AssetKind::FlexibleLoad => {
                        let col = (0..steps)
                            .map(|t| self.sinusoid(t, 800.0, 700.0, 1.2, 50.0))
                            .collect();
                        columns.insert(format!("{id}_power"), col);
                    }
                    AssetKind::Heat => {
                        let col = (0..steps)
                            .map(|t| self.sinusoid(t, 2000.0, 1200.0, 2.0, 100.0))
                            .collect();
                        columns.insert(format!("{id}_heat"), col);
                    }
                    AssetKind::Dhw => {
                        let col = (0..steps)
                            .map(|t| self.sinusoid(t, 300.0, 250.0, 0.5, 40.0))
                            .collect();
                        columns.insert(format!("{id}_dhw"), col);
                    }
                    AssetKind::Pv => {
                        let col = (0..steps).map(|t| self.daylight(t, 5000.0)).collect();
                        columns.insert(format!("{id}_power"), col);
                    }
                    AssetKind::Wind | AssetKind::FixedGen => {
                        let col = (0..steps)
                            .map(|t| self.sinusoid(t, 1500.0, 500.0, 0.0, 300.0))
                            .collect();
                        columns.insert(format!("{id}_power"), col);
                    }
                    AssetKind::HeatPump => {
                        let col = (0..steps)
                            .map(|t| {
                                let angle = 2.0 * std::f64::consts::PI * self.day_pos(t);
                                (3.2 + 0.6 * angle.sin() + self.noise(0.1)).max(1.5)
                            })
                            .collect();
                        columns.insert(format!("{id}_cop"), col);
                    }
                    AssetKind::Ev => {
                        let availability = (0..steps)
                            .map(|t| if self.at_home(t) { 1.0 } else { 0.0 })
                            .collect::<Vec<_>>();
                        // Trip consumption is booked on the step the car returns.
                        let consumed = (0..steps)
                            .map(|t| {
                                let back = t > 0 && self.at_home(t) && !self.at_home(t - 1);
                                if back { 8000.0 } else { 0.0 }
                            })
                            .collect();
                        columns.insert(format!("{id}_availability"), availability);
                        columns.insert(format!("{id}_energy_consumed"), consumed);
                    }
                    AssetKind::Battery
                    | AssetKind::Psh
                    | AssetKind::Hydrogen
                    | AssetKind::HeatStorage => {}
                }
                if kind == AssetKind::Ev {
                    // Overnight charging once back home.
                    let col = (0..steps)
                        .map(|t| {
                            let hour = self.day_pos(t) * 24.0;
                            if !(6.0..22.0).contains(&hour) { 3000.0 } else { 0.0 }
                        })
                        .collect();
                    columns.insert(format!("{id}_target"), col);
                } else if kind.has_storage() {
                    // Day-ahead schedule: charge around midday, discharge in the evening.
                    let col = (0..steps)
                        .map(|t| {
                            let hour = self.day_pos(t) * 24.0;
                            if (10.0..15.0).contains(&hour) {
                                1000.0
                            } else if (18.0..22.0).contains(&hour) {
                                -1000.0
                            } else {
                                0.0
                            }
                        })
                        .collect();
                    columns.insert(format!("{id}_target"), col);
                }
            }
        }

        // All columns have `steps` rows by construction.
        ForecastTable::from_columns(columns).unwrap_or_default()
    }
}
