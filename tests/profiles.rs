// Integration tests for profile storage against a live controller

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use surf_rs::{Config, Controller, Profile, ProfileStore, SimulatedClock, SimulatedPinDriver};

    const BOAT: &str = r#"
        [[surfaces]]
        name = "PORT"
        goofy = "STARBOARD"
        pins = { extend = 17, retract = 27 }

        [[surfaces]]
        name = "STARBOARD"
        goofy = "PORT"
        pins = { extend = 22, retract = 23 }

        [travel_durations.wet.1]
        deploy = 5.0
        withdraw = 4.0
        [travel_durations.wet.2]
        deploy = 6.0
        withdraw = 5.0
    "#;

    #[tokio::test]
    async fn test_saved_profile_activates_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_toml(BOAT).unwrap();
        let controller = Controller::new(
            &config,
            Arc::new(SimulatedPinDriver::new()),
            Arc::new(SimulatedClock::new()),
        )
        .unwrap();

        let store = ProfileStore::open(dir.path().join("riders")).unwrap();
        let profile = Profile::new("Jo Ride", [("PORT".to_string(), 25), ("STARBOARD".to_string(), 75)].into());
        store.create(&profile, controller.surface_names()).unwrap();

        let reopened = ProfileStore::open(dir.path().join("riders")).unwrap();
        let loaded = reopened.load("jo_ride").unwrap();
        let values = controller.activate(&loaded).await.unwrap();
        assert_eq!(values["PORT"], 25);
        assert_eq!(values["STARBOARD"], 75);
    }

    #[test]
    fn test_unreadable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "name = ").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a profile").unwrap();
        let surfaces = vec!["PORT".to_string(), "STARBOARD".to_string()];
        store
            .create(&Profile::new("Sam", [("PORT".to_string(), 0), ("STARBOARD".to_string(), 10)].into()), &surfaces)
            .unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].username, "sam");
    }

    #[test]
    fn test_profile_rejects_out_of_range_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        let surfaces = vec!["PORT".to_string(), "STARBOARD".to_string()];
        let profile = Profile::new("Max", [("PORT".to_string(), 150), ("STARBOARD".to_string(), 10)].into());
        assert!(store.create(&profile, &surfaces).is_err());
        assert!(!store.exists("max"));
    }
}
