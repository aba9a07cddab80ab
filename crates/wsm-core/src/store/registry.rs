use std::path::PathBuf;

use winreg::{enums::*, RegKey};
use wsm_types::PersistedConfig;

use crate::{
    error::{Error, Result},
    store::ConfigStore,
};

const SERVICES_KEY: &str = r"SYSTEM\CurrentControlSet\Services";
const PARAMETERS_SUBKEY: &str = "Parameters";

const VALUE_EXE_PATH: &str = "ExePath";
const VALUE_ARGS: &str = "Args";
const VALUE_WORKING_DIR: &str = "WorkingDir";
const VALUE_DISPLAY_NAME: &str = "DisplayName";
const VALUE_STDOUT_LOG: &str = "StdoutLog";

/// Config store backed by the per-service `Parameters` registry key. The
/// key lives under the service's own registry node, so the OS removes it
/// together with the service.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryConfigStore;

impl RegistryConfigStore {
    pub fn new() -> Self {
        Self
    }

    fn parameters_key(service_id: &str, access: u32) -> std::io::Result<RegKey> {
        let service = RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey_with_flags(format!("{SERVICES_KEY}\\{service_id}"), access)?;
        let (parameters, _) = service.create_subkey_with_flags(PARAMETERS_SUBKEY, access)?;
        Ok(parameters)
    }

    fn optional_value(key: &RegKey, name: &str) -> String {
        key.get_value::<String, _>(name).unwrap_or_default()
    }
}

impl ConfigStore for RegistryConfigStore {
    fn write(&self, service_id: &str, config: &PersistedConfig) -> Result<()> {
        // KEY_WRITE covers both creating the Parameters subkey and setting
        // its values.
        let key = Self::parameters_key(service_id, KEY_WRITE)
            .map_err(|err| Error::store(service_id, err))?;

        let set = |name: &str, value: &str| -> Result<()> {
            key.set_value(name, &value)
                .map_err(|err| Error::store(service_id, err))
        };

        set(VALUE_EXE_PATH, &config.exe_path.to_string_lossy())?;
        if !config.args.is_empty() {
            set(VALUE_ARGS, &config.args)?;
        }
        if let Some(dir) = &config.working_dir {
            set(VALUE_WORKING_DIR, &dir.to_string_lossy())?;
        }
        if !config.display_name.is_empty() {
            set(VALUE_DISPLAY_NAME, &config.display_name)?;
        }
        if let Some(log) = &config.log_path {
            set(VALUE_STDOUT_LOG, &log.to_string_lossy())?;
        }
        Ok(())
    }

    fn read(&self, service_id: &str) -> Result<PersistedConfig> {
        let key = RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey(format!(
                "{SERVICES_KEY}\\{service_id}\\{PARAMETERS_SUBKEY}"
            ))
            .map_err(|err| Error::store(service_id, err))?;

        let exe_path: String = key
            .get_value(VALUE_EXE_PATH)
            .map_err(|err| Error::store(service_id, format!("missing {VALUE_EXE_PATH}: {err}")))?;

        let working_dir = Self::optional_value(&key, VALUE_WORKING_DIR);
        let display_name = Self::optional_value(&key, VALUE_DISPLAY_NAME);
        let log_path = Self::optional_value(&key, VALUE_STDOUT_LOG);

        Ok(PersistedConfig {
            exe_path: PathBuf::from(exe_path),
            args: Self::optional_value(&key, VALUE_ARGS),
            working_dir: (!working_dir.is_empty()).then(|| PathBuf::from(working_dir)),
            display_name: if display_name.is_empty() {
                service_id.to_owned()
            } else {
                display_name
            },
            log_path: (!log_path.is_empty()).then(|| PathBuf::from(log_path)),
        })
    }

    fn remove(&self, service_id: &str) -> Result<()> {
        let service = match RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey_with_flags(format!("{SERVICES_KEY}\\{service_id}"), KEY_ALL_ACCESS)
        {
            Ok(key) => key,
            // The OS deletes the whole service node together with the
            // service; nothing left to remove.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(Error::store(service_id, err)),
        };

        match service.delete_subkey_all(PARAMETERS_SUBKEY) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::store(service_id, err)),
        }
    }
}
