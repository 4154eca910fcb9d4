//! Language configuration for compilation and execution
//!
//! The supported language set is closed and loaded once from the embedded
//! TOML table. Adding a language is a deliberate extension: a new table entry
//! plus whatever the sandbox image needs to run it.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Context;
use serde::Deserialize;

/// Configuration for a supported programming language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Name of the source file (e.g., "main.cpp")
    pub source_file: String,
    /// Compile command (None for interpreted languages)
    pub compile_command: Option<Vec<String>>,
    /// Run command
    pub run_command: Vec<String>,
    /// Time limit multiplier and bonus: (multiplier, bonus_seconds)
    /// actual_time = base_time * multiplier + bonus
    pub time_limit: Option<(u32, u32)>,
    /// Memory limit multiplier and bonus: (multiplier, bonus_mb)
    /// actual_memory = base_memory * multiplier + bonus
    pub memory_limit: Option<(u32, u32)>,
}

impl LanguageConfig {
    /// Whether this language needs a compile step before execution
    pub fn is_compiled(&self) -> bool {
        self.compile_command.is_some()
    }

    /// Calculate the actual time limit in milliseconds for this language
    pub fn calculate_time_limit(&self, base_time_ms: u32) -> u32 {
        match self.time_limit {
            Some((multiplier, bonus_seconds)) => base_time_ms * multiplier + bonus_seconds * 1000,
            None => base_time_ms,
        }
    }

    /// Calculate the actual memory limit in MB for this language
    pub fn calculate_memory_limit(&self, base_memory_mb: u32) -> u32 {
        match self.memory_limit {
            Some((multiplier, bonus_mb)) => base_memory_mb * multiplier + bonus_mb,
            None => base_memory_mb,
        }
    }
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    source_file: String,
    compile_command: Option<String>,
    run_command: String,
    #[serde(default)]
    time_limit: Vec<String>,
    #[serde(default)]
    memory_limit: Vec<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Global language configurations
static LANGUAGES: OnceLock<HashMap<String, LanguageConfig>> = OnceLock::new();

/// Initialize language configurations from the embedded TOML table
pub fn init_languages() -> anyhow::Result<()> {
    let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
    let raw_configs: HashMap<String, RawLanguageConfig> = toml::from_str(content)?;

    let mut languages = HashMap::new();

    for (name, raw) in raw_configs {
        let parse_limit =
            |raw_limit: Vec<String>, kind: &str| -> anyhow::Result<Option<(u32, u32)>> {
                if raw_limit.is_empty() {
                    return Ok(None);
                }
                if raw_limit.len() != 2 {
                    anyhow::bail!("Invalid {} limit for {}: {:?}", kind, name, raw_limit);
                }
                let multiplier = raw_limit[0].parse::<u32>().with_context(|| {
                    format!("Invalid {} multiplier for {}: {}", kind, name, raw_limit[0])
                })?;
                let offset = raw_limit[1].parse::<u32>().with_context(|| {
                    format!("Invalid {} offset for {}: {}", kind, name, raw_limit[1])
                })?;
                Ok(Some((multiplier, offset)))
            };

        let config = LanguageConfig {
            source_file: raw.source_file,
            compile_command: raw.compile_command.map(|cmd| into_command(&cmd)),
            run_command: into_command(&raw.run_command),
            time_limit: parse_limit(raw.time_limit, "time")?,
            memory_limit: parse_limit(raw.memory_limit, "memory")?,
        };

        languages.insert(name.to_lowercase(), config.clone());

        for alias in raw.aliases {
            languages.insert(alias.to_lowercase(), config.clone());
        }
    }

    LANGUAGES
        .set(languages)
        .map_err(|_| anyhow::anyhow!("Languages already initialized"))?;

    Ok(())
}

/// Get language configuration by language name or alias
pub fn get_language_config(language: &str) -> Option<LanguageConfig> {
    LANGUAGES.get()?.get(&language.to_lowercase()).cloned()
}

/// Get all supported language names (including aliases)
pub fn get_supported_languages() -> Vec<String> {
    let mut names: Vec<String> = LANGUAGES
        .get()
        .map(|langs| langs.keys().cloned().collect())
        .unwrap_or_default();
    names.sort();
    names
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_init() {
        // OnceLock survives across tests; the second call fails, which is fine
        let _ = init_languages();
    }

    #[test]
    fn test_embedded_table_covers_editor_languages() {
        ensure_init();
        for lang in ["javascript", "python", "java", "cpp"] {
            assert!(get_language_config(lang).is_some(), "missing {}", lang);
        }
    }

    #[test]
    fn test_aliases_resolve() {
        ensure_init();
        let via_alias = get_language_config("js").unwrap();
        let direct = get_language_config("javascript").unwrap();
        assert_eq!(via_alias.run_command, direct.run_command);

        assert!(get_language_config("C++").is_some());
        assert!(get_language_config("py").is_some());
    }

    #[test]
    fn test_compiled_vs_interpreted_split() {
        ensure_init();
        assert!(get_language_config("cpp").unwrap().is_compiled());
        assert!(get_language_config("java").unwrap().is_compiled());
        assert!(!get_language_config("python").unwrap().is_compiled());
        assert!(!get_language_config("javascript").unwrap().is_compiled());
    }

    #[test]
    fn test_limit_adjustment() {
        ensure_init();
        let java = get_language_config("java").unwrap();
        // 2x + 1s as configured in the table
        assert_eq!(java.calculate_time_limit(2000), 5000);
        // 2x + 16MB
        assert_eq!(java.calculate_memory_limit(256), 528);

        let python = get_language_config("python").unwrap();
        assert_eq!(python.calculate_time_limit(2000), 2000);
    }
}
