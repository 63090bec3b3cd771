// Integration tests for deactivation scheduling

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::{BTreeMap, BTreeSet};
    use surf_rs::motion::planner::travel_differences;
    use surf_rs::DeactivationSchedule;

    fn travels(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(n, t)| (n.to_string(), *t)).collect()
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    fn assert_releases(schedule: &DeactivationSchedule, expected: &[(f64, &[&str])]) {
        let releases = schedule.releases();
        assert_eq!(releases.len(), expected.len(), "{:?}", releases);
        for ((travel, group), (want_travel, want_group)) in releases.iter().zip(expected) {
            assert!((travel - want_travel).abs() < 1e-9, "{} != {}", travel, want_travel);
            assert_eq!(group, &names(want_group));
        }
    }

    #[test]
    fn test_three_distinct_travels_release_one_by_one() {
        let schedule = DeactivationSchedule::from_travels(&travels(&[("A", 1.0), ("B", 0.5), ("C", 0.1)]));
        assert_releases(&schedule, &[(0.1, &["C"]), (0.4, &["B"]), (0.5, &["A"])]);
    }

    #[test]
    fn test_equal_travels_release_together() {
        let schedule = DeactivationSchedule::from_travels(&travels(&[("A", 0.4), ("B", 0.2), ("C", 0.2)]));
        assert_releases(&schedule, &[(0.2, &["B", "C"]), (0.2, &["A"])]);
    }

    #[test]
    fn test_single_surface_single_step() {
        let schedule = DeactivationSchedule::from_travels(&travels(&[("PORT", 0.35)]));
        assert_releases(&schedule, &[(0.35, &["PORT"])]);
    }

    #[test]
    fn test_empty_input_empty_schedule() {
        assert!(DeactivationSchedule::from_travels(&BTreeMap::new()).is_empty());
        assert!(travel_differences(&[]).is_empty());
    }

    #[test]
    fn test_random_travels_sum_back_to_each_surface() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let count = rng.random_range(1..=6);
            let mut input = BTreeMap::new();
            for i in 0..count {
                // Coarse values so duplicates show up regularly.
                let travel = rng.random_range(1..=20) as f64 / 20.0;
                input.insert(format!("S{}", i), travel);
            }

            let schedule = DeactivationSchedule::from_travels(&input);
            let max = input.values().copied().fold(0.0, f64::max);
            assert!((schedule.total_travel() - max).abs() < 1e-9);

            let mut released = BTreeSet::new();
            for step in &schedule {
                assert!(step.travel > 0.0);
                for name in &step.deactivate {
                    assert!(released.insert(name.clone()), "{} released twice", name);
                }
            }
            assert_eq!(released.len(), input.len());

            for (name, travel) in &input {
                let got = schedule.travel_for(name);
                assert!((got - travel).abs() < 1e-9, "{}: {} != {}", name, got, travel);
            }
        }
    }
}
