// src/motion/planner.rs - Turn target positions into a staggered pin schedule
//
// All surfaces that need to move are energized together; only the moments
// at which each one is released differ. Planning is pure so it can be
// checked without relays or clocks.
use super::{check_fraction, Action, MotionError};
use std::collections::{BTreeMap, BTreeSet};

/// Travels closer than this are released in the same step. Differences of
/// two positions pick up float noise, so exact equality would split groups
/// that are logically identical.
pub const TRAVEL_EPSILON: f64 = 1e-9;

/// How far and which way a single surface has to go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManifestEntry {
    /// Fraction of a full stroke, in `(0, 1]`.
    pub travel: f64,
    pub action: Action,
    pub from: f64,
    pub to: f64,
}

/// Every surface that has to move for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeManifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl ChangeManifest {
    /// Compare targets against current positions.
    ///
    /// Every target is range-checked and every name resolved before anything
    /// is returned, so a rejected request has no partial effect. Surfaces
    /// already at their target are dropped.
    pub fn build(current: &BTreeMap<String, f64>, targets: &BTreeMap<String, f64>) -> Result<Self, MotionError> {
        for (name, target) in targets {
            if !current.contains_key(name) {
                return Err(MotionError::UnknownSurface(name.clone()));
            }
            check_fraction(name, *target)?;
        }

        let mut entries = BTreeMap::new();
        for (name, &to) in targets {
            let from = current[name];
            if from == to {
                tracing::info!("{} already at {}", name, to);
                continue;
            }
            let change = to - from;
            entries.insert(
                name.clone(),
                ManifestEntry {
                    travel: change.abs(),
                    action: if change > 0.0 { Action::Extend } else { Action::Retract },
                    from,
                    to,
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.entries.iter()
    }

    pub fn travels(&self) -> BTreeMap<String, f64> {
        self.entries.iter().map(|(name, e)| (name.clone(), e.travel)).collect()
    }

    pub fn schedule(&self) -> DeactivationSchedule {
        DeactivationSchedule::from_travels(&self.travels())
    }
}

/// Staircase decomposition of a set of travels.
///
/// Repeatedly takes the smallest remaining value and subtracts it from the
/// rest: `{0.1, 0.5, 1.0}` becomes `[0.1, 0.4, 0.5]` and `{0.2, 0.3, 0.4}`
/// becomes `[0.2, 0.1, 0.1]`. Duplicates collapse into one step.
pub fn travel_differences(travels: &[f64]) -> Vec<f64> {
    let mut remaining: Vec<f64> = travels.to_vec();
    remaining.sort_by(|a, b| a.total_cmp(b));
    remaining.dedup_by(|a, b| (*a - *b).abs() <= TRAVEL_EPSILON);

    let mut differences = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let smallest = remaining.remove(0);
        differences.push(smallest);
        for travel in remaining.iter_mut() {
            *travel -= smallest;
        }
    }
    differences
}

/// One leg of a schedule: run `active` for `travel` of a full stroke, then
/// release `deactivate`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleStep {
    pub travel: f64,
    pub active: BTreeSet<String>,
    pub deactivate: BTreeSet<String>,
}

/// Ordered release plan for a set of simultaneously started surfaces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeactivationSchedule {
    steps: Vec<ScheduleStep>,
}

impl DeactivationSchedule {
    /// Example: `{A: 1.0, B: 0.5, C: 0.1}` gives
    /// `[(0.1, {C}), (0.4, {B}), (0.5, {A})]`, while `{A: 0.4, B: 0.2, C: 0.2}`
    /// gives `[(0.2, {B, C}), (0.2, {A})]`.
    pub fn from_travels(travels: &BTreeMap<String, f64>) -> Self {
        let mut ordered: Vec<(&String, f64)> = travels.iter().map(|(n, t)| (n, *t)).collect();
        ordered.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        // Group surfaces that finish together.
        let mut groups: Vec<(f64, BTreeSet<String>)> = Vec::new();
        for (name, travel) in ordered {
            match groups.last_mut() {
                Some((level, names)) if (travel - *level).abs() <= TRAVEL_EPSILON => {
                    names.insert(name.clone());
                }
                _ => groups.push((travel, BTreeSet::from([name.clone()]))),
            }
        }

        let levels: Vec<f64> = groups.iter().map(|(level, _)| *level).collect();
        let deltas = travel_differences(&levels);

        let mut active: BTreeSet<String> = travels.keys().cloned().collect();
        let mut steps = Vec::with_capacity(groups.len());
        for ((_, finished), travel) in groups.into_iter().zip(deltas) {
            steps.push(ScheduleStep {
                travel,
                active: active.clone(),
                deactivate: finished.clone(),
            });
            active.retain(|name| !finished.contains(name));
        }
        Self { steps }
    }

    pub fn steps(&self) -> &[ScheduleStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// `(travel, surfaces released after it)` pairs.
    pub fn releases(&self) -> Vec<(f64, BTreeSet<String>)> {
        self.steps.iter().map(|s| (s.travel, s.deactivate.clone())).collect()
    }

    /// Total stroke a surface is driven for across the whole schedule.
    pub fn travel_for(&self, name: &str) -> f64 {
        self.steps
            .iter()
            .filter(|s| s.active.contains(name))
            .map(|s| s.travel)
            .sum()
    }

    /// Stroke of the longest mover.
    pub fn total_travel(&self) -> f64 {
        self.steps.iter().map(|s| s.travel).sum()
    }
}

impl<'a> IntoIterator for &'a DeactivationSchedule {
    type Item = &'a ScheduleStep;
    type IntoIter = std::slice::Iter<'a, ScheduleStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn travels(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(n, t)| (n.to_string(), *t)).collect()
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_travel_differences() {
        let deltas = travel_differences(&[1.0, 0.5, 0.1]);
        assert_eq!(deltas.len(), 3);
        for (got, want) in deltas.iter().zip([0.1, 0.4, 0.5]) {
            assert_close(*got, want);
        }

        let deltas = travel_differences(&[0.2, 0.3, 0.4]);
        for (got, want) in deltas.iter().zip([0.2, 0.1, 0.1]) {
            assert_close(*got, want);
        }

        assert_eq!(travel_differences(&[0.2, 0.2, 0.4]).len(), 2);
        assert!(travel_differences(&[]).is_empty());
    }

    #[test]
    fn test_schedule_distinct_travels() {
        let schedule = DeactivationSchedule::from_travels(&travels(&[("A", 1.0), ("B", 0.5), ("C", 0.1)]));
        let releases = schedule.releases();
        assert_eq!(releases.len(), 3);
        assert_close(releases[0].0, 0.1);
        assert_eq!(releases[0].1, names(&["C"]));
        assert_close(releases[1].0, 0.4);
        assert_eq!(releases[1].1, names(&["B"]));
        assert_close(releases[2].0, 0.5);
        assert_eq!(releases[2].1, names(&["A"]));

        assert_eq!(schedule.steps()[0].active, names(&["A", "B", "C"]));
        assert_eq!(schedule.steps()[1].active, names(&["A", "B"]));
        assert_eq!(schedule.steps()[2].active, names(&["A"]));
    }

    #[test]
    fn test_schedule_shared_travel_released_together() {
        let schedule = DeactivationSchedule::from_travels(&travels(&[("A", 0.4), ("B", 0.2), ("C", 0.2)]));
        let releases = schedule.releases();
        assert_eq!(releases.len(), 2);
        assert_close(releases[0].0, 0.2);
        assert_eq!(releases[0].1, names(&["B", "C"]));
        assert_close(releases[1].0, 0.2);
        assert_eq!(releases[1].1, names(&["A"]));
    }

    #[test]
    fn test_noisy_equal_travels_grouped() {
        // 0.3 - 0.1 and 0.5 - 0.3 differ in the last bits.
        let schedule = DeactivationSchedule::from_travels(&travels(&[("A", 0.3 - 0.1), ("B", 0.5 - 0.3)]));
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.steps()[0].deactivate, names(&["A", "B"]));
    }

    #[test]
    fn test_each_surface_travels_its_full_distance() {
        let input = travels(&[("A", 0.85), ("B", 0.05), ("C", 0.4), ("D", 0.4), ("E", 1.0)]);
        let schedule = DeactivationSchedule::from_travels(&input);
        for (name, travel) in &input {
            assert_close(schedule.travel_for(name), *travel);
        }
        assert_close(schedule.total_travel(), 1.0);
    }

    #[test]
    fn test_manifest_directions_and_filtering() {
        let current = travels(&[("PORT", 0.1), ("CENTER", 0.5), ("STARBOARD", 0.3)]);
        let targets = travels(&[("PORT", 0.4), ("CENTER", 0.5), ("STARBOARD", 0.0)]);
        let manifest = ChangeManifest::build(&current, &targets).unwrap();

        assert_eq!(manifest.len(), 2);
        assert!(manifest.get("CENTER").is_none());
        let port = manifest.get("PORT").unwrap();
        assert_eq!(port.action, Action::Extend);
        assert_close(port.travel, 0.3);
        let starboard = manifest.get("STARBOARD").unwrap();
        assert_eq!(starboard.action, Action::Retract);
        assert_close(starboard.travel, 0.3);
    }

    #[test]
    fn test_manifest_rejects_before_building() {
        let current = travels(&[("PORT", 0.1), ("STARBOARD", 0.3)]);
        let targets = travels(&[("PORT", 0.4), ("STARBOARD", 1.2)]);
        assert!(matches!(
            ChangeManifest::build(&current, &targets),
            Err(MotionError::OutOfRange { surface, .. }) if surface == "STARBOARD"
        ));

        let targets = travels(&[("BOW", 0.4)]);
        assert!(matches!(
            ChangeManifest::build(&current, &targets),
            Err(MotionError::UnknownSurface(name)) if name == "BOW"
        ));
    }

    #[test]
    fn test_all_satisfied_manifest_is_empty() {
        let current = travels(&[("PORT", 0.5)]);
        let manifest = ChangeManifest::build(&current, &current).unwrap();
        assert!(manifest.is_empty());
        assert!(manifest.schedule().is_empty());
    }
}
