// src/profile.rs - Saved trim settings, one TOML file per rider
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
    #[error("profile '{0}' does not exist")]
    NotFound(String),
    #[error("profile '{0}' already exists")]
    AlreadyExists(String),
    #[error("invalid profile '{username}': {reason}")]
    Invalid { username: String, reason: String },
}

/// Percentage targets for every surface, saved under a rider's name.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    pub name: String,
    pub username: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub goofy: bool,
    pub control_surfaces: BTreeMap<String, i64>,
}

impl Profile {
    pub fn new(name: impl Into<String>, control_surfaces: BTreeMap<String, i64>) -> Self {
        let name = name.into();
        Self {
            username: Self::username_for(&name),
            name,
            created: Utc::now(),
            goofy: false,
            control_surfaces,
        }
    }

    /// `" Big Wave Dave "` -> `"big_wave_dave"`.
    pub fn username_for(name: &str) -> String {
        name.trim().to_lowercase().replace(' ', "_")
    }

    /// Exactly one value per configured surface, each within 0..=100.
    pub fn validate(&self, surface_names: &[String]) -> Result<(), ProfileError> {
        let invalid = |reason: String| ProfileError::Invalid {
            username: self.username.clone(),
            reason,
        };
        if self.username.is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        if self.control_surfaces.len() != surface_names.len() {
            return Err(invalid(format!(
                "expected {} control surfaces, found {}",
                surface_names.len(),
                self.control_surfaces.len()
            )));
        }
        for name in surface_names {
            match self.control_surfaces.get(name) {
                None => return Err(invalid(format!("missing value for {}", name))),
                Some(value) if !(0..=100).contains(value) => {
                    return Err(invalid(format!("{} value {} is outside 0..=100", name, value)));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Directory of `<username>.toml` profile files.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        let dir = dir.into();
        if !dir.is_dir() {
            tracing::info!("creating {}", dir.display());
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, username: &str) -> PathBuf {
        self.dir.join(format!("{}.toml", username))
    }

    pub fn exists(&self, username: &str) -> bool {
        self.path(username).is_file()
    }

    pub fn load(&self, username: &str) -> Result<Profile, ProfileError> {
        let path = self.path(username);
        if !path.is_file() {
            return Err(ProfileError::NotFound(username.to_string()));
        }
        tracing::debug!("reading profile: {}", path.display());
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }

    /// All readable profiles, sorted by display name. Unreadable files are
    /// logged and skipped.
    pub fn list(&self) -> Result<Vec<Profile>, ProfileError> {
        let mut profiles = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            match fs::read_to_string(&path).map_err(ProfileError::from).and_then(|s| Ok(toml::from_str::<Profile>(&s)?)) {
                Ok(profile) => profiles.push(profile),
                Err(e) => tracing::warn!("skipping profile {}: {}", path.display(), e),
            }
        }
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    pub fn count(&self) -> Result<usize, ProfileError> {
        Ok(self.list()?.len())
    }

    pub fn create(&self, profile: &Profile, surface_names: &[String]) -> Result<(), ProfileError> {
        profile.validate(surface_names)?;
        if self.exists(&profile.username) {
            return Err(ProfileError::AlreadyExists(profile.username.clone()));
        }
        tracing::info!("Creating profile for: \"{}\" {:?}", profile.name, profile.control_surfaces);
        self.write(profile)
    }

    pub fn update(&self, profile: &Profile, surface_names: &[String]) -> Result<(), ProfileError> {
        profile.validate(surface_names)?;
        if !self.exists(&profile.username) {
            return Err(ProfileError::NotFound(profile.username.clone()));
        }
        tracing::info!("updating: {}", self.path(&profile.username).display());
        self.write(profile)
    }

    pub fn delete(&self, username: &str) -> Result<(), ProfileError> {
        let path = self.path(username);
        if !path.is_file() {
            return Err(ProfileError::NotFound(username.to_string()));
        }
        fs::remove_file(&path)?;
        tracing::info!("deleted profile: {}", path.display());
        Ok(())
    }

    fn write(&self, profile: &Profile) -> Result<(), ProfileError> {
        let contents = toml::to_string_pretty(profile)?;
        fs::write(self.path(&profile.username), contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surfaces() -> Vec<String> {
        vec!["PORT".to_string(), "CENTER".to_string(), "STARBOARD".to_string()]
    }

    fn values(port: i64, center: i64, starboard: i64) -> BTreeMap<String, i64> {
        BTreeMap::from([
            ("PORT".to_string(), port),
            ("CENTER".to_string(), center),
            ("STARBOARD".to_string(), starboard),
        ])
    }

    #[test]
    fn test_username_normalized() {
        assert_eq!(Profile::username_for("  Big Wave Dave "), "big_wave_dave");
        assert_eq!(Profile::new("Kim", values(0, 0, 0)).username, "kim");
    }

    #[test]
    fn test_validate() {
        assert!(Profile::new("a", values(0, 50, 100)).validate(&surfaces()).is_ok());
        assert!(Profile::new("a", values(0, 50, 101)).validate(&surfaces()).is_err());
        assert!(Profile::new("a", values(-1, 50, 100)).validate(&surfaces()).is_err());

        let mut short = values(10, 10, 10);
        short.remove("CENTER");
        assert!(Profile::new("a", short).validate(&surfaces()).is_err());

        let mut renamed = values(10, 10, 10);
        renamed.remove("CENTER");
        renamed.insert("BOW".to_string(), 10);
        assert!(matches!(
            Profile::new("a", renamed).validate(&surfaces()),
            Err(ProfileError::Invalid { reason, .. }) if reason.contains("CENTER")
        ));
    }

    #[test]
    fn test_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles")).unwrap();
        assert_eq!(store.count().unwrap(), 0);

        let mut profile = Profile::new("Wake Surfer", values(40, 10, 20));
        store.create(&profile, &surfaces()).unwrap();
        assert!(store.exists("wake_surfer"));
        assert!(matches!(
            store.create(&profile, &surfaces()),
            Err(ProfileError::AlreadyExists(_))
        ));

        let loaded = store.load("wake_surfer").unwrap();
        assert_eq!(loaded, profile);

        profile.goofy = true;
        store.update(&profile, &surfaces()).unwrap();
        assert!(store.load("wake_surfer").unwrap().goofy);

        store.create(&Profile::new("Alex", values(0, 0, 0)), &surfaces()).unwrap();
        let names: Vec<String> = store.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Alex", "Wake Surfer"]);

        store.delete("wake_surfer").unwrap();
        assert!(matches!(store.load("wake_surfer"), Err(ProfileError::NotFound(_))));
        assert!(matches!(store.delete("wake_surfer"), Err(ProfileError::NotFound(_))));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_update_missing_profile() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        let profile = Profile::new("Ghost", values(1, 2, 3));
        assert!(matches!(
            store.update(&profile, &surfaces()),
            Err(ProfileError::NotFound(_))
        ));
    }
}
