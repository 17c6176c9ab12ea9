use std::{collections::HashMap, env, fs};

#[derive(Debug)]
pub struct Settings {
    pub gateway_url: String,
    pub api_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:9000".into(),
            api_url: "http://127.0.0.1:9000".into(),
        }
    }
}

/// Defaults, then `client.toml` in the working directory, then environment
/// overrides. Command-line flags beat all of these.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("client.toml") {
        merge_file(&mut settings, &raw);
    }

    if let Ok(v) = env::var("GATEWAY_URL") {
        settings.gateway_url = v;
    }
    if let Ok(v) = env::var("APP__GATEWAY_URL") {
        settings.gateway_url = v;
    }
    if let Ok(v) = env::var("API_URL") {
        settings.api_url = v;
    }
    if let Ok(v) = env::var("APP__API_URL") {
        settings.api_url = v;
    }

    settings
}

fn merge_file(settings: &mut Settings, raw: &str) {
    if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
        if let Some(v) = file_cfg.get("gateway_url") {
            settings.gateway_url = v.clone();
        }
        if let Some(v) = file_cfg.get("api_url") {
            settings.api_url = v.clone();
        }
    }
}
