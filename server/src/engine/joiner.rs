//! Latest-value join of the inverter and weather streams

use indexmap::IndexMap;
use protocol::{Numeric, Snapshot, Source};
use tracing::debug;

/// Union of both sources' latest snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedSnapshot {
    /// `ds` of the most recently observed source
    pub ds: String,
    pub trigger: Source,
    pub values: IndexMap<String, Numeric>,
}

impl CombinedSnapshot {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(|v| v.as_f64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Accepted,
    /// Older than the snapshot already held for the source; nothing changed
    Stale,
}

/// Holds one cell per source, `None` until the first record arrives.
///
/// On a variable-name collision the most recently observed source wins.
#[derive(Debug)]
pub struct StreamJoiner {
    inverter: Option<Snapshot>,
    weather: Option<Snapshot>,
    last_observed: Option<Source>,
    reject_stale: bool,
}

impl StreamJoiner {
    pub fn new(reject_stale: bool) -> Self {
        Self {
            inverter: None,
            weather: None,
            last_observed: None,
            reject_stale,
        }
    }

    fn cell(&mut self, source: Source) -> &mut Option<Snapshot> {
        match source {
            Source::Inverter => &mut self.inverter,
            Source::Weather => &mut self.weather,
        }
    }

    pub fn latest(&self, source: Source) -> Option<&Snapshot> {
        match source {
            Source::Inverter => self.inverter.as_ref(),
            Source::Weather => self.weather.as_ref(),
        }
    }

    /// Replace the source's cell with `snapshot`.
    ///
    /// With stale rejection on, a record whose `ds` parses to an earlier time
    /// than the held one is dropped. Unparseable timestamps are always accepted.
    pub fn observe(&mut self, source: Source, snapshot: Snapshot) -> Observation {
        let reject_stale = self.reject_stale;
        let cell = self.cell(source);

        if reject_stale {
            if let Some(held) = cell.as_ref() {
                if let (Some(new_ts), Some(held_ts)) = (snapshot.timestamp(), held.timestamp()) {
                    if new_ts < held_ts {
                        debug!(
                            source = %source,
                            ds = %snapshot.ds,
                            held = %held.ds,
                            "Rejecting stale record"
                        );
                        return Observation::Stale;
                    }
                }
            }
        }

        *cell = Some(snapshot);
        self.last_observed = Some(source);
        Observation::Accepted
    }

    /// Non-blocking peek: a combined snapshot once both sources have been seen
    pub fn try_combine(&self) -> Option<CombinedSnapshot> {
        let inverter = self.inverter.as_ref()?;
        let weather = self.weather.as_ref()?;
        let trigger = self.last_observed?;

        let (older, newer) = match trigger {
            Source::Inverter => (weather, inverter),
            Source::Weather => (inverter, weather),
        };

        let mut values = older.values.clone();
        for (name, value) in &newer.values {
            values.insert(name.clone(), *value);
        }

        Some(CombinedSnapshot {
            ds: newer.ds.clone(),
            trigger,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inverter(ds: &str, power: i64) -> Snapshot {
        Snapshot::new(ds).with_value("ac_power", power)
    }

    fn weather(ds: &str, irradiance: f64) -> Snapshot {
        Snapshot::new(ds).with_value("irradiance", irradiance)
    }

    #[test]
    fn test_nothing_until_both_sources_seen() {
        let mut joiner = StreamJoiner::new(true);
        assert!(joiner.try_combine().is_none());

        joiner.observe(Source::Inverter, inverter("2024-01-01T00:00:00", 10));
        joiner.observe(Source::Inverter, inverter("2024-01-01T00:01:00", 11));
        assert!(joiner.try_combine().is_none());

        joiner.observe(Source::Weather, weather("2024-01-01T00:01:30", 500.0));
        let combined = joiner.try_combine().unwrap();
        assert_eq!(combined.get("ac_power"), Some(11.0));
        assert_eq!(combined.get("irradiance"), Some(500.0));
        assert_eq!(combined.ds, "2024-01-01T00:01:30");
        assert_eq!(combined.trigger, Source::Weather);
    }

    #[test]
    fn test_latest_pair_regardless_of_arrival_order() {
        let mut joiner = StreamJoiner::new(true);
        joiner.observe(Source::Weather, weather("2024-01-01T00:00:00", 100.0));
        joiner.observe(Source::Inverter, inverter("2024-01-01T00:00:05", 1));
        joiner.observe(Source::Weather, weather("2024-01-01T00:00:10", 200.0));
        joiner.observe(Source::Inverter, inverter("2024-01-01T00:00:15", 2));

        let combined = joiner.try_combine().unwrap();
        assert_eq!(combined.get("ac_power"), Some(2.0));
        assert_eq!(combined.get("irradiance"), Some(200.0));
        assert_eq!(combined.ds, "2024-01-01T00:00:15");
    }

    #[test]
    fn test_collision_goes_to_most_recent_source() {
        let mut joiner = StreamJoiner::new(true);
        joiner.observe(Source::Inverter, Snapshot::new("1").with_value("temp", 60i64));
        joiner.observe(Source::Weather, Snapshot::new("2").with_value("temp", 25.5));
        assert_eq!(joiner.try_combine().unwrap().get("temp"), Some(25.5));

        joiner.observe(Source::Inverter, Snapshot::new("3").with_value("temp", 61i64));
        assert_eq!(joiner.try_combine().unwrap().get("temp"), Some(61.0));
    }

    #[test]
    fn test_stale_records_are_rejected() {
        let mut joiner = StreamJoiner::new(true);
        joiner.observe(Source::Inverter, inverter("2024-01-01T00:10:00", 10));

        let result = joiner.observe(Source::Inverter, inverter("2024-01-01T00:05:00", 99));
        assert_eq!(result, Observation::Stale);
        assert_eq!(joiner.latest(Source::Inverter).unwrap().ds, "2024-01-01T00:10:00");

        let same = joiner.observe(Source::Inverter, inverter("2024-01-01T00:10:00", 12));
        assert_eq!(same, Observation::Accepted);

        let unparseable = joiner.observe(Source::Inverter, inverter("batch-7", 13));
        assert_eq!(unparseable, Observation::Accepted);
    }

    #[test]
    fn test_last_write_wins_without_stale_rejection() {
        let mut joiner = StreamJoiner::new(false);
        joiner.observe(Source::Weather, weather("2024-01-01T00:10:00", 1.0));
        let result = joiner.observe(Source::Weather, weather("2024-01-01T00:05:00", 2.0));
        assert_eq!(result, Observation::Accepted);
        assert_eq!(joiner.latest(Source::Weather).unwrap().get("irradiance"), Some(2.0));
    }

    #[test]
    fn test_stale_record_does_not_change_trigger() {
        let mut joiner = StreamJoiner::new(true);
        joiner.observe(Source::Inverter, inverter("2024-01-01T00:10:00", 1));
        joiner.observe(Source::Weather, weather("2024-01-01T00:11:00", 1.0));
        joiner.observe(Source::Inverter, inverter("2024-01-01T00:01:00", 2));

        assert_eq!(joiner.try_combine().unwrap().trigger, Source::Weather);
    }
}
