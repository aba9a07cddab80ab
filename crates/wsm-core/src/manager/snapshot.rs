use std::{collections::HashMap, fs, path::Path};

use wsm_types::Service;

/// Reads the on-disk service map. A missing file means "no services yet";
/// an unreadable or unparsable file is logged and treated the same, since
/// the OS registrar remains the source of truth for run state.
pub(crate) fn load(path: &Path) -> HashMap<String, Service> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(err) => {
            tracing::warn!("failed to read snapshot {}: {err}", path.display());
            return HashMap::new();
        }
    };

    match serde_json::from_slice(&data) {
        Ok(services) => services,
        Err(err) => {
            tracing::warn!("failed to parse snapshot {}: {err}", path.display());
            HashMap::new()
        }
    }
}

/// Overwrites the snapshot wholesale. Single writer, last write wins.
pub(crate) fn save(path: &Path, services: &HashMap<String, Service>) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let data = serde_json::to_vec_pretty(services)?;
    fs::write(path, data)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;
    use wsm_types::ServiceStatus;

    use super::*;

    fn sample(id: &str) -> Service {
        let now = Utc::now();
        Service {
            id: id.to_owned(),
            name: "sample".to_owned(),
            exe_path: PathBuf::from("/usr/bin/env"),
            args: String::new(),
            working_dir: PathBuf::from("/usr/bin"),
            log_path: None,
            status: ServiceStatus::Stopped,
            pid: 0,
            auto_start: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn missing_file_is_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let services = load(&dir.path().join("absent.json"));
        assert!(services.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("services.json");

        let mut services = HashMap::new();
        services.insert("WSM_sample_1".to_owned(), sample("WSM_sample_1"));
        services.insert("WSM_sample_2".to_owned(), sample("WSM_sample_2"));
        save(&path, &services).unwrap();

        assert_eq!(load(&path), services);
    }

    #[test]
    fn corrupt_file_is_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.json");
        fs::write(&path, b"not json").unwrap();
        assert!(load(&path).is_empty());
    }
}
