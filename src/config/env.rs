use super::ExporterConfig;
use tracing::warn;

impl ExporterConfig {
    /// Apply `VMEXPORT_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("VMEXPORT_HOST") {
            self.endpoint.host = v;
        }
        if let Some(v) = lookup("VMEXPORT_PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.endpoint.port = port,
                Err(_) => warn!(value = %v, "Ignoring invalid VMEXPORT_PORT"),
            }
        }
        if let Some(v) = lookup("VMEXPORT_TOKEN") {
            self.endpoint.token = v;
        }
        if let Some(v) = lookup("VMEXPORT_SSL") {
            if let Ok(b) = v.parse::<bool>() {
                self.endpoint.ssl = b;
            }
        }
        if let Some(v) = lookup("VMEXPORT_VERIFY_SSL") {
            if let Ok(b) = v.parse::<bool>() {
                self.endpoint.verify_ssl = b;
            }
        }
        if let Some(v) = lookup("VMEXPORT_API_LISTEN") {
            self.api.listen = v;
        }
        if let Some(v) = lookup("VMEXPORT_ADMIN_TOKEN") {
            self.api.admin_token = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = ExporterConfig::default();
        config.apply_overrides(lookup(&[
            ("VMEXPORT_HOST", "vm.internal"),
            ("VMEXPORT_PORT", "9000"),
            ("VMEXPORT_TOKEN", "t0k"),
            ("VMEXPORT_SSL", "true"),
            ("VMEXPORT_VERIFY_SSL", "false"),
            ("VMEXPORT_API_LISTEN", "0.0.0.0:1234"),
            ("VMEXPORT_ADMIN_TOKEN", "adm"),
        ]));

        assert_eq!(config.endpoint.base_url(), "https://vm.internal:9000");
        assert_eq!(config.endpoint.token, "t0k");
        assert!(!config.endpoint.verify_ssl);
        assert_eq!(config.api.listen, "0.0.0.0:1234");
        assert_eq!(config.api.admin_token().as_deref(), Some("adm"));
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let mut config = ExporterConfig::default();
        config.apply_overrides(lookup(&[
            ("VMEXPORT_PORT", "not-a-port"),
            ("VMEXPORT_SSL", "maybe"),
        ]));

        assert_eq!(config.endpoint.port, 8428);
        assert!(!config.endpoint.ssl);
    }
}
